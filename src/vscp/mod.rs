//! Generic VSCP event envelope as produced and consumed by the driver.
//!
//! Only the parts of the VSCP wire format the driver itself needs are
//! modelled here: the header word, class/type, GUID, the microsecond
//! timestamp with its date/time block, and the raw payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod guid;

pub use guid::Guid;

// Header bits
pub const HEADER16_GUID_TYPE_STANDARD: u16 = 0x0000;
pub const PRIORITY_NORMAL: u16 = 0x0060;
pub const HEADER16_DUMB: u16 = 0x8000;

pub const LEVEL1_MAXDATA: usize = 8;
pub const LEVEL2_MAXDATA: usize = 512;

// Classes
pub const CLASS1_PROTOCOL: u16 = 0;
pub const CLASS1_ALARM: u16 = 1;
pub const CLASS1_MEASUREMENT: u16 = 10;
pub const CLASS1_MEASUREMENT64: u16 = 60;
pub const CLASS1_MEASUREZONE: u16 = 65;
pub const CLASS1_MEASUREMENT32: u16 = 70;
pub const CLASS1_SETVALUEZONE: u16 = 85;
pub const CLASS2_PROTOCOL: u16 = 1024;
pub const CLASS2_HLO: u16 = 1027;
pub const CLASS2_MEASUREMENT_STR: u16 = 1040;
pub const CLASS2_MEASUREMENT_FLOAT: u16 = 1060;

// Types
pub const TYPE_ALARM_ALARM: u16 = 2;
pub const TYPE_ALARM_RESET: u16 = 13;
pub const TYPE2_HLO_COMMAND: u16 = 1;
pub const TYPE2_HLO_RESPONSE: u16 = 2;

// Level I data coding, upper three bits of the first payload byte
pub const DATACODING_STRING: u8 = 0x40;
pub const DATACODING_INTEGER: u8 = 0x60;
pub const DATACODING_NORMALIZED: u8 = 0x80;
pub const DATACODING_SINGLE: u8 = 0xA0;
pub const DATACODING_DOUBLE: u8 = 0xC0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VscpEvent {
    pub head: u16,
    pub vscp_class: u16,
    pub vscp_type: u16,
    pub guid: Guid,
    /// Wrapping microsecond counter
    pub timestamp: u32,
    pub datetime: DateTime<Utc>,
    pub data: Vec<u8>,
}

impl VscpEvent {
    /// Event stamped with the current time and the driver's default header.
    pub fn new(vscp_class: u16, vscp_type: u16, guid: Guid, data: Vec<u8>) -> Self {
        let now = Utc::now();
        VscpEvent {
            head: HEADER16_GUID_TYPE_STANDARD | PRIORITY_NORMAL | HEADER16_DUMB,
            vscp_class,
            vscp_type,
            guid,
            timestamp: make_timestamp(&now),
            datetime: now,
            data,
        }
    }

    pub fn size_data(&self) -> usize {
        self.data.len()
    }
}

pub fn make_timestamp(now: &DateTime<Utc>) -> u32 {
    (now.timestamp_micros() as u64 & 0xFFFF_FFFF) as u32
}
