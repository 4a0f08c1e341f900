use super::HloError;
use crate::vscp::{Guid, VscpEvent, CLASS2_HLO, LEVEL2_MAXDATA, TYPE2_HLO_COMMAND, TYPE2_HLO_RESPONSE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HLO_TYPE_JSON: u8 = 2;
pub const HLO_ENCRYPTION_NONE: u8 = 0;

/// GUID, type/encryption byte, JSON body.
const HLO_HEADER_LEN: usize = 17;

// Remote variable type codes
pub const VARIABLE_CODE_STRING: u8 = 1;
pub const VARIABLE_CODE_BOOLEAN: u8 = 2;
pub const VARIABLE_CODE_INTEGER: u8 = 3;
pub const VARIABLE_CODE_DOUBLE: u8 = 5;
pub const VARIABLE_CODE_GUID: u8 = 8;
pub const VARIABLE_CODE_JSON: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HloResult {
    Success = 0,
    Missing = 1,
    InvalidType = 2,
    IndexOutOfBounds = 3,
    ReadOnly = 4,
    NotAllowed = 5,
    UnknownOperation = 6,
    Error = 7,
}

impl HloResult {
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HloFrame {
    pub guid: Guid,
    pub json: Value,
}

impl HloFrame {
    pub fn decode(data: &[u8]) -> Result<Self, HloError> {
        if data.len() < HLO_HEADER_LEN {
            return Err(HloError::TooShort(data.len()));
        }

        let guid = Guid::from_slice(&data[..16]).ok_or(HloError::TooShort(data.len()))?;
        let frame_type = data[16] >> 4;
        let encryption = data[16] & 0x0F;

        if encryption != HLO_ENCRYPTION_NONE {
            return Err(HloError::Encrypted(encryption));
        }
        if frame_type != HLO_TYPE_JSON {
            return Err(HloError::UnsupportedType(frame_type));
        }

        // Senders may pad the body with zeros
        let body = &data[HLO_HEADER_LEN..];
        let end = body.iter().position(|b| *b == 0).unwrap_or(body.len());
        let json = serde_json::from_slice(&body[..end]).map_err(|e| HloError::Json(e.to_string()))?;

        Ok(HloFrame { guid, json })
    }

    pub fn encode(&self) -> Result<Vec<u8>, HloError> {
        let body = serde_json::to_vec(&self.json).map_err(|e| HloError::Json(e.to_string()))?;

        let mut data = Vec::with_capacity(HLO_HEADER_LEN + body.len());
        data.extend_from_slice(self.guid.as_bytes());
        data.push((HLO_TYPE_JSON << 4) | HLO_ENCRYPTION_NONE);
        data.extend(body);

        if data.len() > LEVEL2_MAXDATA {
            return Err(HloError::TooLong(data.len()));
        }
        Ok(data)
    }

    pub fn into_command_event(self, guid: Guid) -> Result<VscpEvent, HloError> {
        Ok(VscpEvent::new(CLASS2_HLO, TYPE2_HLO_COMMAND, guid, self.encode()?))
    }

    pub fn into_response_event(self, guid: Guid) -> Result<VscpEvent, HloError> {
        Ok(VscpEvent::new(CLASS2_HLO, TYPE2_HLO_RESPONSE, guid, self.encode()?))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HloRequest {
    pub op: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arg: Option<Value>,
    #[serde(default)]
    pub index: Option<usize>,
}

impl HloRequest {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_layout() {
        let frame = HloFrame {
            guid: Guid([0x01; 16]),
            json: json!({"op": "noop"}),
        };
        let data = frame.encode().unwrap();
        assert_eq!(&data[..16], &[0x01; 16]);
        assert_eq!(data[16], 0x20);
        assert_eq!(&data[17..], br#"{"op":"noop"}"#);
        assert_eq!(HloFrame::decode(&data).unwrap(), frame);
    }

    #[test]
    fn test_decode_zero_padded() {
        let mut data = vec![0u8; 16];
        data.push(0x20);
        data.extend_from_slice(br#"{"op":"readvar","name":"debug"}"#);
        data.extend_from_slice(&[0, 0, 0]);

        let frame = HloFrame::decode(&data).unwrap();
        let req: HloRequest = serde_json::from_value(frame.json).unwrap();
        assert_eq!(req.op, "readvar");
        assert_eq!(req.name(), "debug");
        assert_eq!(req.index, None);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(HloFrame::decode(&[0u8; 10]), Err(HloError::TooShort(10)));

        let mut data = vec![0u8; 16];
        data.push(0x21);
        data.extend_from_slice(b"{}");
        assert_eq!(HloFrame::decode(&data), Err(HloError::Encrypted(1)));

        data[16] = 0x10;
        assert_eq!(HloFrame::decode(&data), Err(HloError::UnsupportedType(1)));

        data[16] = 0x20;
        data.push(b'x');
        assert!(matches!(HloFrame::decode(&data), Err(HloError::Json(_))));
    }

    #[test]
    fn test_response_event() {
        let frame = HloFrame {
            guid: Guid::default(),
            json: json!({"op": "noop"}),
        };
        let ev = frame.into_response_event(Guid([0x02; 16])).unwrap();
        assert_eq!(ev.vscp_class, CLASS2_HLO);
        assert_eq!(ev.vscp_type, TYPE2_HLO_RESPONSE);
        assert_eq!(ev.guid, Guid([0x02; 16]));
    }

    #[test]
    fn test_frame_too_long() {
        let frame = HloFrame {
            guid: Guid::default(),
            json: json!({"value": "x".repeat(LEVEL2_MAXDATA)}),
        };
        assert!(matches!(frame.encode(), Err(HloError::TooLong(_))));
    }
}
