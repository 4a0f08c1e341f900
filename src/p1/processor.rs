use super::encoder::encode_measurement;
use super::line_parser::parse_p1_line;
use super::structs::MeasurementDefinition;
use crate::alarm::AlarmEvaluator;
use crate::queue::EventSink;
use crate::store::LastValueCache;
use crate::vscp::Guid;
use log::{debug, error, info, warn};

/// Turns single P1 lines into measurement and alarm events.
///
/// Every definition whose token prefixes the line's key is evaluated, in
/// configuration order. Nothing in here stops the stream: bad lines and
/// failed encodings are logged and skipped.
pub struct LineProcessor<S: EventSink> {
    definitions: Vec<MeasurementDefinition>,
    alarms: AlarmEvaluator,
    cache: LastValueCache,
    guid: Guid,
    sink: S,
    debug: bool,
}

impl<S: EventSink> LineProcessor<S> {
    pub fn new(
        definitions: Vec<MeasurementDefinition>,
        alarms: AlarmEvaluator,
        cache: LastValueCache,
        guid: Guid,
        sink: S,
    ) -> Self {
        LineProcessor {
            definitions,
            alarms,
            cache,
            guid,
            sink,
            debug: false,
        }
    }

    /// Log every matched line at info level.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn definitions(&self) -> &[MeasurementDefinition] {
        &self.definitions
    }

    pub fn alarms(&self) -> &AlarmEvaluator {
        &self.alarms
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Returns the number of events handed to the sink.
    pub fn process_line(&mut self, line: &str) -> usize {
        let parsed = match parse_p1_line(line) {
            Ok(p) => p,
            Err(e) => {
                debug!("Skipping line '{}': {}", line, e);
                return 0;
            }
        };

        let mut emitted = 0;

        for def in &self.definitions {
            if !def.matches(parsed.match_key) {
                continue;
            }

            let value = match parsed.value() {
                Ok(raw) => raw * def.factor,
                Err(e) => {
                    warn!("{}: {}", def.token(), e);
                    continue;
                }
            };

            if self.debug {
                info!("[{}] {} = {} {:?}", def.token(), def.storage_name, value, parsed.unit);
            } else {
                debug!("[{}] {} = {} {:?}", def.token(), def.storage_name, value, parsed.unit);
            }

            self.cache.set(&def.storage_name, value);

            match encode_measurement(def, value, parsed.unit, self.guid) {
                Ok(Some(event)) => match self.sink.push(event) {
                    Ok(_) => emitted += 1,
                    Err(e) => error!("{}: failed to add measurement event to receive queue: {}", def.token(), e),
                },
                Ok(None) => {}
                Err(e) => error!("{}: unable to encode value {}: {}", def.token(), value, e),
            }

            emitted += self
                .alarms
                .evaluate(&def.storage_name, value, self.guid.with_lsb(def.guid_lsb), &self.sink);
        }

        emitted
    }
}
