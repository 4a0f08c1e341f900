use super::P1Error;
use log::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct MeterIdentification {
    pub manufacturer: String,
    pub identification: String,
}

/// Parses the telegram header line, e.g. `/ELL5\253833635_A`.
pub fn parse_identification_line(line: &str) -> Option<MeterIdentification> {
    let content = line.strip_prefix('/')?;

    // Manufacturer is the first three characters
    let manufacturer = content.get(..3)?.to_string();
    let identification = content.get(3..).unwrap_or("").trim().to_string();

    debug!("Parsed identification - Manufacturer: {}, ID: {}", manufacturer, identification);

    Some(MeterIdentification { manufacturer, identification })
}

/// A telegram ends with `!` followed by an optional CRC.
pub fn is_telegram_end(line: &str) -> bool {
    line.starts_with('!')
}

pub fn strip_line_terminator(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// Value part of `000123.456*kWh)`, stops at the first `*` or `)`.
pub fn value_slice(payload: &str) -> &str {
    let end = payload.find(['*', ')']).unwrap_or(payload.len());
    &payload[..end]
}

/// Unit part of `000123.456*kWh)`, strictly between the first `*` and the next `)`.
pub fn unit_slice(payload: &str) -> Option<&str> {
    let star = payload.find('*')?;
    let rest = &payload[star + 1..];
    let end = rest.find(')').unwrap_or(rest.len());
    Some(&rest[..end])
}

pub fn parse_number(value_str: &str) -> Result<f64, P1Error> {
    value_str
        .trim()
        .parse::<f64>()
        .map_err(|_| P1Error::ValueParse(value_str.to_string()))
}
