use super::hlo::{
    HloRequest, HloResult, VARIABLE_CODE_BOOLEAN, VARIABLE_CODE_DOUBLE, VARIABLE_CODE_GUID, VARIABLE_CODE_INTEGER,
    VARIABLE_CODE_JSON, VARIABLE_CODE_STRING,
};
use crate::config::ConfigHolder;
use crate::store::LastValueCache;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, warn};
use serde::Serialize;
use serde_json::{json, Value};

/// Everything that can be addressed by name through readvar/writevar/delvar.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Debug,
    Write,
    Guid,
    MaxOutQueue,
    MaxInQueue,
    ReconnectTime,
    SerialPort,
    SerialBaudrate,
    DtrOnStart,
    ItemCount,
    AlarmCount,
    Items,
    Alarms,
    /// Last value of a storage name
    Stored(String),
}

impl Variable {
    pub fn lookup(name: &str, cache: &LastValueCache) -> Option<Self> {
        let var = match name {
            "debug" => Variable::Debug,
            "write" => Variable::Write,
            "guid" => Variable::Guid,
            "max-out-queue" => Variable::MaxOutQueue,
            "max-in-queue" => Variable::MaxInQueue,
            "reconnect-time" => Variable::ReconnectTime,
            "serial-port" => Variable::SerialPort,
            "serial-baudrate" => Variable::SerialBaudrate,
            "dtr-on-start" => Variable::DtrOnStart,
            "item-count" => Variable::ItemCount,
            "alarm-count" => Variable::AlarmCount,
            "items" => Variable::Items,
            "alarms" => Variable::Alarms,
            other if cache.contains(other) => Variable::Stored(other.to_string()),
            _ => return None,
        };
        Some(var)
    }

    pub fn type_code(&self) -> u8 {
        match self {
            Variable::Debug | Variable::Write | Variable::DtrOnStart => VARIABLE_CODE_BOOLEAN,
            Variable::Guid => VARIABLE_CODE_GUID,
            Variable::MaxOutQueue
            | Variable::MaxInQueue
            | Variable::ReconnectTime
            | Variable::SerialBaudrate
            | Variable::ItemCount
            | Variable::AlarmCount => VARIABLE_CODE_INTEGER,
            Variable::SerialPort => VARIABLE_CODE_STRING,
            Variable::Items | Variable::Alarms => VARIABLE_CODE_JSON,
            Variable::Stored(_) => VARIABLE_CODE_DOUBLE,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Variable::Guid
                | Variable::ItemCount
                | Variable::AlarmCount
                | Variable::Items
                | Variable::Alarms
                | Variable::Stored(_)
        )
    }
}

fn reply(op: &str, result: HloResult, name: &str, value: Option<(u8, Value)>) -> Value {
    let mut arg = json!({ "name": name });
    if let Some((code, value)) = value {
        arg["type"] = json!(code);
        arg["value"] = value;
    }
    json!({ "op": op, "result": result.code(), "arg": arg })
}

fn indexed<T: Serialize>(list: &[T], index: usize) -> Result<Value, HloResult> {
    let entry = list.get(index).ok_or(HloResult::IndexOutOfBounds)?;
    serde_json::to_string(entry)
        .map(Value::String)
        .map_err(|_| HloResult::Error)
}

fn current_value(var: &Variable, holder: &ConfigHolder, cache: &LastValueCache, index: usize) -> Result<Value, HloResult> {
    let config = &holder.config;

    let value = match var {
        Variable::Debug => json!(config.debug),
        Variable::Write => json!(config.write),
        Variable::Guid => json!(holder.guid.to_string()),
        Variable::MaxOutQueue => json!(config.max_out_queue),
        Variable::MaxInQueue => json!(config.max_in_queue),
        Variable::ReconnectTime => json!(config.reconnect_time),
        Variable::SerialPort => json!(STANDARD.encode(&config.serial.port)),
        Variable::SerialBaudrate => json!(config.serial.baudrate),
        Variable::DtrOnStart => json!(config.serial.dtr_on_start),
        Variable::ItemCount => json!(config.items.len()),
        Variable::AlarmCount => json!(config.alarms.len()),
        Variable::Items => indexed(&config.items, index)?,
        Variable::Alarms => indexed(&config.alarms, index)?,
        Variable::Stored(name) => json!(cache.get(name).ok_or(HloResult::Missing)?),
    };
    Ok(value)
}

pub fn read_variable(req: &HloRequest, holder: &ConfigHolder, cache: &LastValueCache) -> Value {
    let name = req.name();

    let Some(var) = Variable::lookup(name, cache) else {
        warn!("readvar: variable [{}] is unknown", name);
        return reply("readvar", HloResult::Missing, name, None);
    };

    match current_value(&var, holder, cache, req.index.unwrap_or(0)) {
        Ok(value) => reply("readvar", HloResult::Success, name, Some((var.type_code(), value))),
        Err(result) => {
            warn!("readvar: [{}] failed with {:?}", name, result);
            reply("readvar", result, name, None)
        }
    }
}

fn as_bool(arg: Option<&Value>) -> Result<bool, HloResult> {
    arg.and_then(Value::as_bool).ok_or(HloResult::InvalidType)
}

fn as_uint<T: TryFrom<u64>>(arg: Option<&Value>) -> Result<T, HloResult> {
    let n = arg.and_then(Value::as_u64).ok_or(HloResult::InvalidType)?;
    T::try_from(n).map_err(|_| HloResult::InvalidType)
}

fn as_string(arg: Option<&Value>) -> Result<String, HloResult> {
    arg.and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(HloResult::InvalidType)
}

fn assign(var: &Variable, holder: &mut ConfigHolder, arg: Option<&Value>) -> Result<(), HloResult> {
    let config = &mut holder.config;

    match var {
        Variable::Debug => config.debug = as_bool(arg)?,
        Variable::Write => config.write = as_bool(arg)?,
        Variable::DtrOnStart => config.serial.dtr_on_start = as_bool(arg)?,
        Variable::MaxOutQueue => config.max_out_queue = as_uint(arg)?,
        Variable::MaxInQueue => config.max_in_queue = as_uint(arg)?,
        Variable::ReconnectTime => config.reconnect_time = as_uint(arg)?,
        Variable::SerialBaudrate => config.serial.baudrate = as_uint(arg)?,
        Variable::SerialPort => config.serial.port = as_string(arg)?,
        _ => return Err(HloResult::ReadOnly),
    }

    holder.dirty = true;
    Ok(())
}

/// Changes take effect on the next worker restart, or when saved and reloaded.
pub fn write_variable(req: &HloRequest, holder: &mut ConfigHolder, cache: &LastValueCache) -> Value {
    let name = req.name();

    let Some(var) = Variable::lookup(name, cache) else {
        warn!("writevar: variable [{}] is unknown", name);
        return reply("writevar", HloResult::Missing, name, None);
    };

    if let Err(result) = assign(&var, holder, req.arg.as_ref()) {
        warn!("writevar: [{}] failed with {:?}", name, result);
        return reply("writevar", result, name, None);
    }

    debug!("writevar: [{}] updated", name);
    match current_value(&var, holder, cache, 0) {
        Ok(value) => reply("writevar", HloResult::Success, name, Some((var.type_code(), value))),
        Err(result) => reply("writevar", result, name, None),
    }
}

pub fn delete_variable(req: &HloRequest, holder: &mut ConfigHolder, cache: &LastValueCache) -> Value {
    let name = req.name();

    let Some(var) = Variable::lookup(name, cache) else {
        warn!("delvar: variable [{}] is unknown", name);
        return reply("delvar", HloResult::Missing, name, None);
    };

    let index = req.index.unwrap_or(0);
    let result = match &var {
        Variable::Items if index < holder.config.items.len() => {
            holder.config.items.remove(index);
            holder.dirty = true;
            HloResult::Success
        }
        Variable::Alarms if index < holder.config.alarms.len() => {
            holder.config.alarms.remove(index);
            holder.dirty = true;
            HloResult::Success
        }
        Variable::Items | Variable::Alarms => HloResult::IndexOutOfBounds,
        Variable::Stored(storage_name) => {
            cache.remove(storage_name);
            HloResult::Success
        }
        _ => HloResult::NotAllowed,
    };

    debug!("delvar: [{}] -> {:?}", name, result);
    reply("delvar", result, name, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ItemConfig};
    use std::path::Path;

    fn holder() -> ConfigHolder {
        let yaml = r#"
guid: "00:01:02:03:04:05:06:07:08:09:0A:0B:0C:0D:0E:0F"
serial:
  port: /dev/ttyUSB1
items:
  - token: "1-0:1.8.0"
    vscp-type: 13
  - token: "1-0:2.8.0"
    vscp-type: 13
"#;
        let config: Config = serde_yml::from_str(yaml).unwrap();
        ConfigHolder::new(config, Path::new("p1.yaml"))
    }

    fn request(op: &str, name: &str, arg: Option<Value>, index: Option<usize>) -> HloRequest {
        HloRequest {
            op: op.to_string(),
            name: Some(name.to_string()),
            arg,
            index,
        }
    }

    #[test]
    fn test_read_scalars() {
        let h = holder();
        let cache = LastValueCache::new();

        let r = read_variable(&request("readvar", "debug", None, None), &h, &cache);
        assert_eq!(r, json!({"op": "readvar", "result": 0, "arg": {"name": "debug", "type": 2, "value": false}}));

        let r = read_variable(&request("readvar", "max-in-queue", None, None), &h, &cache);
        assert_eq!(r["arg"]["value"], json!(32000));
        assert_eq!(r["arg"]["type"], json!(VARIABLE_CODE_INTEGER));

        let r = read_variable(&request("readvar", "guid", None, None), &h, &cache);
        assert_eq!(r["arg"]["value"], json!("00:01:02:03:04:05:06:07:08:09:0A:0B:0C:0D:0E:0F"));

        let r = read_variable(&request("readvar", "serial-port", None, None), &h, &cache);
        assert_eq!(r["arg"]["value"], json!(STANDARD.encode("/dev/ttyUSB1")));
    }

    #[test]
    fn test_read_items_by_index() {
        let h = holder();
        let cache = LastValueCache::new();

        let r = read_variable(&request("readvar", "item-count", None, None), &h, &cache);
        assert_eq!(r["arg"]["value"], json!(2));

        let r = read_variable(&request("readvar", "items", None, Some(1)), &h, &cache);
        assert_eq!(r["arg"]["type"], json!(VARIABLE_CODE_JSON));
        let item: ItemConfig = serde_json::from_str(r["arg"]["value"].as_str().unwrap()).unwrap();
        assert_eq!(item.token, "1-0:2.8.0");

        let r = read_variable(&request("readvar", "items", None, Some(5)), &h, &cache);
        assert_eq!(r["result"], json!(HloResult::IndexOutOfBounds.code()));
    }

    #[test]
    fn test_read_stored_value() {
        let h = holder();
        let cache = LastValueCache::new();
        cache.set("voltage_l1", 236.2);

        let r = read_variable(&request("readvar", "voltage_l1", None, None), &h, &cache);
        assert_eq!(r["arg"]["type"], json!(VARIABLE_CODE_DOUBLE));
        assert_eq!(r["arg"]["value"], json!(236.2));
    }

    #[test]
    fn test_read_unknown() {
        let r = read_variable(&request("readvar", "nope", None, None), &holder(), &LastValueCache::new());
        assert_eq!(r["result"], json!(HloResult::Missing.code()));
    }

    #[test]
    fn test_write_variables() {
        let mut h = holder();
        let cache = LastValueCache::new();

        let r = write_variable(&request("writevar", "debug", Some(json!(true)), None), &mut h, &cache);
        assert_eq!(r["result"], json!(0));
        assert_eq!(r["arg"]["value"], json!(true));
        assert!(h.config.debug);
        assert!(h.dirty);

        write_variable(&request("writevar", "reconnect-time", Some(json!(5)), None), &mut h, &cache);
        assert_eq!(h.config.reconnect_time, 5);

        write_variable(&request("writevar", "serial-port", Some(json!("/dev/ttyS0")), None), &mut h, &cache);
        assert_eq!(h.config.serial.port, "/dev/ttyS0");
    }

    #[test]
    fn test_write_errors() {
        let mut h = holder();
        let cache = LastValueCache::new();
        cache.set("voltage_l1", 236.2);

        let r = write_variable(&request("writevar", "debug", Some(json!("yes")), None), &mut h, &cache);
        assert_eq!(r["result"], json!(HloResult::InvalidType.code()));

        let r = write_variable(&request("writevar", "serial-baudrate", Some(json!(-1)), None), &mut h, &cache);
        assert_eq!(r["result"], json!(HloResult::InvalidType.code()));

        let r = write_variable(&request("writevar", "guid", Some(json!("x")), None), &mut h, &cache);
        assert_eq!(r["result"], json!(HloResult::ReadOnly.code()));

        let r = write_variable(&request("writevar", "voltage_l1", Some(json!(1.0)), None), &mut h, &cache);
        assert_eq!(r["result"], json!(HloResult::ReadOnly.code()));

        assert!(!h.dirty);
    }

    #[test]
    fn test_delete_variables() {
        let mut h = holder();
        let cache = LastValueCache::new();
        cache.set("voltage_l1", 236.2);

        let r = delete_variable(&request("delvar", "items", None, Some(0)), &mut h, &cache);
        assert_eq!(r["result"], json!(0));
        assert_eq!(h.config.items.len(), 1);
        assert_eq!(h.config.items[0].token, "1-0:2.8.0");

        let r = delete_variable(&request("delvar", "alarms", None, Some(0)), &mut h, &cache);
        assert_eq!(r["result"], json!(HloResult::IndexOutOfBounds.code()));

        let r = delete_variable(&request("delvar", "voltage_l1", None, None), &mut h, &cache);
        assert_eq!(r["result"], json!(0));
        assert!(cache.is_empty());

        let r = delete_variable(&request("delvar", "debug", None, None), &mut h, &cache);
        assert_eq!(r["result"], json!(HloResult::NotAllowed.code()));
    }
}
