//! P1 smart meter driver
//!
//! Reads the P1 telegram of a smart meter line by line, turns configured
//! measurements into VSCP events, evaluates threshold alarms and hands the
//! events to a host. A small remote variable protocol allows reading and
//! changing the configuration at runtime.

pub mod alarm;
pub mod config;
pub mod mqtt;
pub mod obis_utils;
pub mod p1;
pub mod queue;
pub mod remote;
pub mod store;
pub mod vscp;

// Re-export common types for easier access
pub use config::{ConfigHolder, DEFAULT_CONFIG_FILE};
pub use mqtt::{LogDrain, MqttManager};
pub use p1::{P1Manager, WorkerState};
pub use remote::CommandHandler;
pub use store::LastValueCache;
