use crate::alarm::{AlarmEvaluator, AlarmRule, AlarmSet};
use crate::obis_utils::{get_obis_description, validate_obis_code};
use crate::p1::meter_definitions::get_han_p1_definitions;
use crate::p1::structs::{Level1Coding, MeasurementDefinition, UnitTable};
use crate::vscp::{Guid, CLASS2_MEASUREMENT_FLOAT};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "p1.yaml";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Unable to access config file: {0}")]
    Io(String),
    #[error("Unable to parse config file: {0}")]
    Yaml(String),
    #[error("Item token must not be empty")]
    EmptyToken,
    #[error("Item {0}: VSCP class {1} is not allowed")]
    InvalidClass(String, u16),
    #[error("Alarm variable must not be empty")]
    EmptyVariable,
    #[error("Invalid alarm operator '{0}'")]
    InvalidOperator(String),
    #[error("Invalid alarm type '{0}'")]
    InvalidAlarmType(String),
    #[error("Invalid GUID '{0}'")]
    InvalidGuid(String),
    #[error("Doublet of {0} alarms for variable {1}")]
    DuplicateAlarm(String, String),
    #[error("Writing the configuration is not enabled")]
    WriteDisabled,
}

fn serial_port_default() -> String { return "/dev/ttyUSB0".to_string() }
fn serial_baudrate_default() -> u32 { return 115200 }
fn serial_parity_default() -> String { return "N".to_string() }
fn serial_bits_default() -> u8 { return 8 }
fn serial_stopbits_default() -> u8 { return 1 }
fn serial_dtr_on_start_default() -> bool { return true }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SerialConfig {
    #[serde(default="serial_port_default")]
    pub port: String,
    #[serde(default="serial_baudrate_default")]
    pub baudrate: u32,
    #[serde(default="serial_parity_default")]
    pub parity: String,
    #[serde(default="serial_bits_default")]
    pub bits: u8,
    #[serde(default="serial_stopbits_default")]
    pub stopbits: u8,
    #[serde(default)]
    pub hwflowctrl: bool,
    #[serde(default)]
    pub swflowctrl: bool,
    #[serde(default="serial_dtr_on_start_default")]
    pub dtr_on_start: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: serial_port_default(),
            baudrate: serial_baudrate_default(),
            parity: serial_parity_default(),
            bits: serial_bits_default(),
            stopbits: serial_stopbits_default(),
            hwflowctrl: false,
            swflowctrl: false,
            dtr_on_start: serial_dtr_on_start_default(),
        }
    }
}

fn mqtt_port_default() -> u16 { return 1883 }
fn mqtt_client_name_default() -> String { return "energy-p1".to_string() }
fn mqtt_topic_default() -> String { return "energyp1".to_string() }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default="mqtt_port_default")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default="mqtt_client_name_default")]
    pub client_name: String,
    #[serde(default="mqtt_topic_default")]
    pub topic: String,
}

fn item_class_default() -> u16 { return CLASS2_MEASUREMENT_FLOAT }
fn item_factor_default() -> f64 { return 1.0 }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ItemConfig {
    pub token: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default="item_class_default")]
    pub vscp_class: u16,
    #[serde(default)]
    pub vscp_type: u16,
    #[serde(default, rename = "sensorindex")]
    pub sensor_index: u8,
    #[serde(default)]
    pub guid_lsb: u8,
    #[serde(default)]
    pub zone: u8,
    #[serde(default)]
    pub subzone: u8,
    #[serde(default="item_factor_default")]
    pub factor: f64,
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub level1_coding: Level1Coding,
    #[serde(default)]
    pub units: HashMap<String, u8>,
}

impl ItemConfig {
    pub fn to_definition(&self) -> Result<MeasurementDefinition, ConfigError> {
        let mut def = MeasurementDefinition::new(&self.token, self.vscp_class, self.vscp_type)?;

        if !validate_obis_code(&self.token) {
            warn!("Item token {} is not an OBIS code, matching it as a plain prefix", self.token);
        }

        def.description = match &self.description {
            Some(d) if !d.is_empty() => d.clone(),
            _ => get_obis_description(&self.token).unwrap_or_default().to_string(),
        };
        if let Some(store) = self.store.as_ref().filter(|s| !s.is_empty()) {
            def.storage_name = store.clone();
        }

        def.level1_coding = self.level1_coding;
        def.sensor_index = self.sensor_index;
        def.guid_lsb = self.guid_lsb;
        def.zone = self.zone;
        def.subzone = self.subzone;
        def.factor = self.factor;
        def.units = UnitTable::from(self.units.clone());

        Ok(def)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct AlarmConfig {
    #[serde(rename = "type")]
    pub alarm_type: String,
    pub variable: String,
    pub op: String,
    pub value: f64,
    #[serde(default)]
    pub one_shot: bool,
    #[serde(default)]
    pub alarm_byte: u8,
    #[serde(default)]
    pub zone: u8,
    #[serde(default)]
    pub subzone: u8,
}

impl AlarmConfig {
    pub fn to_rule(&self) -> Result<(AlarmSet, AlarmRule), ConfigError> {
        let set: AlarmSet = self.alarm_type.parse()?;
        let mut rule = AlarmRule::new(&self.variable, self.op.parse()?, self.value)?;
        rule.one_shot = self.one_shot;
        rule.alarm_byte = self.alarm_byte;
        rule.zone = self.zone;
        rule.subzone = self.subzone;
        Ok((set, rule))
    }
}

fn queue_size_default() -> u32 { return 32000 }
fn reconnect_time_default() -> u64 { return 30 }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub guid: Option<String>,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default="queue_size_default")]
    pub max_out_queue: u32,
    #[serde(default="queue_size_default")]
    pub max_in_queue: u32,
    /// Seconds to wait before the serial device is reopened
    #[serde(default="reconnect_time_default")]
    pub reconnect_time: u64,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,
    #[serde(default)]
    pub items: Vec<ItemConfig>,
    #[serde(default)]
    pub alarms: Vec<AlarmConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            guid: None,
            write: false,
            debug: false,
            max_out_queue: queue_size_default(),
            max_in_queue: queue_size_default(),
            reconnect_time: reconnect_time_default(),
            serial: SerialConfig::default(),
            mqtt: None,
            items: Vec::new(),
            alarms: Vec::new(),
        }
    }
}

impl Config {
    /// Valid item definitions in configuration order. Bad records are logged and skipped.
    pub fn definitions(&self) -> Vec<MeasurementDefinition> {
        if self.items.is_empty() {
            info!("No items configured, using the built-in HAN P1 table");
            return get_han_p1_definitions();
        }

        self.items
            .iter()
            .filter_map(|item| match item.to_definition() {
                Ok(def) => {
                    debug!("Item {} -> class={} type={} store={}", def.token(), def.vscp_class(), def.vscp_type, def.storage_name);
                    Some(def)
                }
                Err(e) => {
                    warn!("Skipping item '{}': {}", item.token, e);
                    None
                }
            })
            .collect()
    }

    pub fn alarm_evaluator(&self) -> AlarmEvaluator {
        let mut evaluator = AlarmEvaluator::new();

        for alarm in &self.alarms {
            let added = alarm
                .to_rule()
                .and_then(|(set, rule)| evaluator.add_rule(set, rule));
            if let Err(e) = added {
                warn!("Skipping alarm for '{}': {}", alarm.variable, e);
            }
        }

        evaluator
    }
}

pub struct ConfigHolder {
    pub config: Config,
    pub guid: Guid,
    pub dirty: bool,
    pub path: PathBuf,
}

fn resolve_guid(config: &Config, fallback: Option<Guid>) -> Guid {
    let pick_fallback = || fallback.unwrap_or_else(Guid::random);

    match &config.guid {
        None => {
            let guid = pick_fallback();
            info!("No GUID configured, using {}", guid);
            guid
        }
        Some(s) => match s.parse::<Guid>() {
            Ok(g) => g,
            Err(_) => {
                let guid = pick_fallback();
                warn!("{}, using {}", ConfigError::InvalidGuid(s.clone()), guid);
                guid
            }
        },
    }
}

impl ConfigHolder {
    /// A generated GUID is written into the config so a save keeps it.
    pub fn new(mut config: Config, path: &Path) -> Self {
        let guid = resolve_guid(&config, None);
        config.guid = Some(guid.to_string());
        ConfigHolder {
            config,
            guid,
            dirty: false,
            path: path.to_path_buf(),
        }
    }

    fn read_file(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        serde_yml::from_str(&contents).map_err(|e| ConfigError::Yaml(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        info!("Loaded configuration from {}", path.display());
        Ok(Self::new(config, path))
    }

    /// Re-reads the file this holder was loaded from. An unconfigured GUID keeps its current value.
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        let mut config = Self::read_file(&self.path)?;
        self.guid = resolve_guid(&config, Some(self.guid));
        config.guid = Some(self.guid.to_string());
        self.config = config;
        self.dirty = false;
        info!("Reloaded configuration from {}", self.path.display());
        Ok(())
    }

    pub fn save(&mut self) -> Result<(), ConfigError> {
        if !self.config.write {
            return Err(ConfigError::WriteDisabled);
        }

        /* No need to write config if it's not dirty */
        if !self.dirty {
            debug!("Config is not dirty, nothing to save");
            return Ok(());
        }

        let backup_path = self.path.with_file_name("backup.yaml");
        if let Err(e) = fs::copy(&self.path, &backup_path) {
            error!("Backing up config failed, not replacing it");
            return Err(ConfigError::Io(e.to_string()));
        }

        let x = serde_yml::to_string(&self.config).map_err(|e| ConfigError::Yaml(e.to_string()))?;
        match fs::write(&self.path, x.as_bytes()) {
            Ok(_) => {
                info!("New Config written");
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                error!("Error writing config {e:?}");
                Err(ConfigError::Io(e.to_string()))
            }
        }
    }
}
