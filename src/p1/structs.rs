use crate::config::ConfigError;
use crate::vscp::{self, DATACODING_DOUBLE, DATACODING_INTEGER, DATACODING_NORMALIZED, DATACODING_SINGLE, DATACODING_STRING};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unit code used when a meter unit has no mapping. Same bit pattern as -1.
pub const UNIT_UNKNOWN: u8 = 0xFF;

/// Classes a measurement definition may target. 75 is accepted but never encoded.
pub const ALLOWED_CLASSES: [u16; 9] = [
    vscp::CLASS1_PROTOCOL,
    vscp::CLASS1_MEASUREMENT,
    vscp::CLASS1_MEASUREMENT64,
    vscp::CLASS1_MEASUREZONE,
    vscp::CLASS1_MEASUREMENT32,
    75,
    vscp::CLASS1_SETVALUEZONE,
    vscp::CLASS2_MEASUREMENT_STR,
    vscp::CLASS2_MEASUREMENT_FLOAT,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level1Coding {
    #[default]
    String,
    Integer,
    Normalized,
    Single,
    Double,
}

impl Level1Coding {
    pub fn coding_bits(&self) -> u8 {
        match self {
            Level1Coding::String => DATACODING_STRING,
            Level1Coding::Integer => DATACODING_INTEGER,
            Level1Coding::Normalized => DATACODING_NORMALIZED,
            Level1Coding::Single => DATACODING_SINGLE,
            Level1Coding::Double => DATACODING_DOUBLE,
        }
    }
}

/// Maps meter unit suffixes ("kWh", "V") to VSCP unit codes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitTable {
    units: HashMap<String, u8>,
}

impl UnitTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, meter_unit: &str, vscp_unit: u8) {
        self.units.insert(meter_unit.to_string(), vscp_unit);
    }

    /// VSCP unit code for `meter_unit`, `UNIT_UNKNOWN` when absent or unmapped.
    pub fn lookup(&self, meter_unit: Option<&str>) -> u8 {
        meter_unit
            .and_then(|u| self.units.get(u))
            .copied()
            .unwrap_or(UNIT_UNKNOWN)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn as_map(&self) -> &HashMap<String, u8> {
        &self.units
    }
}

impl From<HashMap<String, u8>> for UnitTable {
    fn from(units: HashMap<String, u8>) -> Self {
        UnitTable { units }
    }
}

/// Payload layout selected by a definition's class and Level I coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventEncoding {
    Level1String,
    /// Serves both the INTEGER and NORMALIZED codings.
    Level1Integer,
    Level1Single,
    /// Not implemented, never produces an event.
    Level1Double,
    /// CLASS1.MEASUREMENT64, narrowed to a single precision payload.
    Level1Float64,
    MeasureZone,
    Measurement32,
    SetValueZone,
    Level2String,
    Level2Float,
    /// Any other class, no event.
    Other(u16),
}

impl EventEncoding {
    pub fn select(vscp_class: u16, coding: Level1Coding) -> Self {
        match vscp_class {
            vscp::CLASS1_MEASUREMENT => match coding {
                Level1Coding::String => EventEncoding::Level1String,
                Level1Coding::Integer | Level1Coding::Normalized => EventEncoding::Level1Integer,
                Level1Coding::Single => EventEncoding::Level1Single,
                Level1Coding::Double => EventEncoding::Level1Double,
            },
            vscp::CLASS1_MEASUREMENT64 => EventEncoding::Level1Float64,
            vscp::CLASS1_MEASUREZONE => EventEncoding::MeasureZone,
            vscp::CLASS1_MEASUREMENT32 => EventEncoding::Measurement32,
            vscp::CLASS1_SETVALUEZONE => EventEncoding::SetValueZone,
            vscp::CLASS2_MEASUREMENT_STR => EventEncoding::Level2String,
            vscp::CLASS2_MEASUREMENT_FLOAT => EventEncoding::Level2Float,
            other => EventEncoding::Other(other),
        }
    }

    pub fn produces_event(&self) -> bool {
        matches!(
            self,
            EventEncoding::Level1String
                | EventEncoding::Level1Integer
                | EventEncoding::Level1Single
                | EventEncoding::Level1Float64
                | EventEncoding::Level2String
                | EventEncoding::Level2Float
        )
    }
}

/// One recognised P1 line and how it becomes an event.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementDefinition {
    token: String,
    vscp_class: u16,
    pub description: String,
    pub vscp_type: u16,
    pub level1_coding: Level1Coding,
    pub sensor_index: u8,
    pub zone: u8,
    pub subzone: u8,
    pub guid_lsb: u8,
    pub factor: f64,
    pub storage_name: String,
    pub units: UnitTable,
}

impl MeasurementDefinition {
    pub fn new(token: &str, vscp_class: u16, vscp_type: u16) -> Result<Self, ConfigError> {
        if token.is_empty() {
            return Err(ConfigError::EmptyToken);
        }

        if !ALLOWED_CLASSES.contains(&vscp_class) {
            return Err(ConfigError::InvalidClass(token.to_string(), vscp_class));
        }

        Ok(MeasurementDefinition {
            token: token.to_string(),
            vscp_class,
            description: String::new(),
            vscp_type,
            level1_coding: Level1Coding::default(),
            sensor_index: 0,
            zone: 0,
            subzone: 0,
            guid_lsb: 0,
            factor: 1.0,
            storage_name: token.to_string(),
            units: UnitTable::new(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn vscp_class(&self) -> u16 {
        self.vscp_class
    }

    pub fn encoding(&self) -> EventEncoding {
        EventEncoding::select(self.vscp_class, self.level1_coding)
    }

    /// True if `match_key` (the part of a line before '(') starts with the token.
    pub fn matches(&self, match_key: &str) -> bool {
        match_key.starts_with(&self.token)
    }

    pub fn unit_code(&self, meter_unit: Option<&str>) -> u8 {
        self.units.lookup(meter_unit)
    }
}
