use super::{utils, P1Error};
use log::debug;

/// One P1 line split into its parts, borrowed from the raw line.
#[derive(Debug, Clone, PartialEq)]
pub struct P1Line<'a> {
    /// Everything before the first `(`
    pub match_key: &'a str,
    pub raw_value: &'a str,
    pub unit: Option<&'a str>,
}

impl P1Line<'_> {
    pub fn value(&self) -> Result<f64, P1Error> {
        utils::parse_number(self.raw_value)
    }
}

pub fn parse_p1_line(line: &str) -> Result<P1Line<'_>, P1Error> {
    // Example formats:
    // 1-0:1.8.0(00001576.782*kWh)
    // 1-0:32.7.0(236.2*V)
    // 0-0:1.0.0(210101120000W)

    let paren_start = line.find('(').ok_or(P1Error::MalformedLine)?;

    let match_key = &line[..paren_start];
    let payload = &line[paren_start + 1..];

    let raw_value = utils::value_slice(payload);
    let unit = utils::unit_slice(payload);

    debug!("Parsed P1 line - Key: {}, Value: {}, Unit: {:?}", match_key, raw_value, unit);

    Ok(P1Line { match_key, raw_value, unit })
}
