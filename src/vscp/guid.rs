use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

lazy_static! {
    static ref GUID_RE: Regex = Regex::new(r"^[0-9A-Fa-f]{1,2}(:[0-9A-Fa-f]{1,2}){15}$").unwrap();
}

#[derive(Error, Debug, PartialEq)]
pub enum GuidError {
    #[error("GUID must be 16 colon separated hex bytes, got '{0}'")]
    InvalidFormat(String),
}

/// 16 byte VSCP node identity, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Guid(pub [u8; 16]);

impl Guid {
    pub fn random() -> Self {
        Guid(*Uuid::new_v4().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Copy of this GUID with the least significant byte replaced.
    pub fn with_lsb(&self, lsb: u8) -> Self {
        let mut id = self.0;
        id[15] = lsb;
        Guid(id)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let id: [u8; 16] = bytes.get(..16)?.try_into().ok()?;
        Some(Guid(id))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|b| format!("{:02X}", b)).collect();
        write!(f, "{}", parts.join(":"))
    }
}

impl FromStr for Guid {
    type Err = GuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !GUID_RE.is_match(s) {
            return Err(GuidError::InvalidFormat(s.to_string()));
        }

        let padded: String = s.split(':').map(|part| format!("{:0>2}", part)).collect();
        let bytes = hex::decode(padded).map_err(|_| GuidError::InvalidFormat(s.to_string()))?;
        Guid::from_slice(&bytes).ok_or_else(|| GuidError::InvalidFormat(s.to_string()))
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Guid::from_str(&s).map_err(serde::de::Error::custom)
    }
}
