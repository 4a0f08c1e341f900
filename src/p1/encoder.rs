use super::structs::{EventEncoding, MeasurementDefinition};
use crate::vscp::{
    Guid, VscpEvent, DATACODING_NORMALIZED, DATACODING_SINGLE, DATACODING_STRING, LEVEL1_MAXDATA, LEVEL2_MAXDATA,
};
use log::debug;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum EncodeError {
    #[error("Value {0} can not be represented in the selected coding")]
    NotRepresentable(f64),
    #[error("Payload of {0} bytes exceeds the limit of {1}")]
    PayloadTooLong(usize, usize),
}

/// First byte of a Level I measurement: coding in bits 5..7, unit in bits 3..4, sensor in bits 0..2.
fn level1_datacoding(coding: u8, unit: u8, sensor_index: u8) -> u8 {
    coding | ((unit & 0x03) << 3) | (sensor_index & 0x07)
}

/// Shortest big endian two's complement form of `value`.
fn mantissa_bytes(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let sign_follows = bytes[start + 1] & 0x80 != 0;
        match bytes[start] {
            0x00 if !sign_follows => start += 1,
            0xFF if sign_follows => start += 1,
            _ => break,
        }
    }
    bytes[start..].to_vec()
}

pub fn level1_string_payload(value: f64, unit: u8, sensor_index: u8) -> Vec<u8> {
    let mut data = vec![level1_datacoding(DATACODING_STRING, unit, sensor_index)];
    data.extend(value.to_string().bytes().take(LEVEL1_MAXDATA - 1));
    data
}

/// Truncates to an integer, exponent byte is always zero.
pub fn level1_normalized_payload(value: f64, unit: u8, sensor_index: u8) -> Result<Vec<u8>, EncodeError> {
    let mantissa = mantissa_bytes(value as i64);
    if mantissa.len() > LEVEL1_MAXDATA - 2 {
        return Err(EncodeError::PayloadTooLong(mantissa.len() + 2, LEVEL1_MAXDATA));
    }

    let mut data = vec![level1_datacoding(DATACODING_NORMALIZED, unit, sensor_index), 0];
    data.extend(mantissa);
    Ok(data)
}

pub fn level1_single_payload(value: f64, unit: u8, sensor_index: u8) -> Result<Vec<u8>, EncodeError> {
    let single = value as f32;
    if !single.is_finite() {
        return Err(EncodeError::NotRepresentable(value));
    }

    let mut data = vec![level1_datacoding(DATACODING_SINGLE, unit, sensor_index)];
    data.extend(single.to_be_bytes());
    Ok(data)
}

fn level2_header(def: &MeasurementDefinition, unit: u8) -> Vec<u8> {
    vec![def.sensor_index, def.zone, def.subzone, unit]
}

pub fn level2_string_payload(def: &MeasurementDefinition, value: f64, unit: u8) -> Result<Vec<u8>, EncodeError> {
    let mut data = level2_header(def, unit);
    data.extend(value.to_string().bytes());
    if data.len() > LEVEL2_MAXDATA {
        return Err(EncodeError::PayloadTooLong(data.len(), LEVEL2_MAXDATA));
    }
    Ok(data)
}

pub fn level2_float_payload(def: &MeasurementDefinition, value: f64, unit: u8) -> Result<Vec<u8>, EncodeError> {
    if !value.is_finite() {
        return Err(EncodeError::NotRepresentable(value));
    }

    let mut data = level2_header(def, unit);
    data.extend(value.to_be_bytes());
    Ok(data)
}

/// Builds the measurement event for `def`. `Ok(None)` for encodings that
/// never produce an event.
pub fn encode_measurement(
    def: &MeasurementDefinition,
    value: f64,
    meter_unit: Option<&str>,
    guid: Guid,
) -> Result<Option<VscpEvent>, EncodeError> {
    let unit = def.unit_code(meter_unit);

    let data = match def.encoding() {
        EventEncoding::Level1String => level1_string_payload(value, unit, def.sensor_index),
        EventEncoding::Level1Integer => level1_normalized_payload(value, unit, def.sensor_index)?,
        EventEncoding::Level1Single | EventEncoding::Level1Float64 => {
            level1_single_payload(value, unit, def.sensor_index)?
        }
        EventEncoding::Level2String => level2_string_payload(def, value, unit)?,
        EventEncoding::Level2Float => level2_float_payload(def, value, unit)?,
        other @ (EventEncoding::Level1Double
        | EventEncoding::MeasureZone
        | EventEncoding::Measurement32
        | EventEncoding::SetValueZone
        | EventEncoding::Other(_)) => {
            debug!("{}: encoding {:?} produces no event", def.token(), other);
            return Ok(None);
        }
    };

    Ok(Some(VscpEvent::new(
        def.vscp_class(),
        def.vscp_type,
        guid.with_lsb(def.guid_lsb),
        data,
    )))
}
