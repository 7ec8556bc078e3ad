//! LoRaWAN ABP end-device controller.
//!
//! Periodically samples a sensor, sends the reading as an uplink when the
//! EU868 duty-cycle budget allows, and reacts to MAC events: completed
//! uplinks, acknowledgements and downlinks that drive an output.
//!
//! The radio, framing and encryption live behind [`mac::MacLayer`]. Every
//! core operation takes the current [`Timestamp`], so the whole state
//! machine can be tested on the host without hardware.

pub mod actuator;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod lora;
pub mod mac;
pub mod network;
pub mod runtime;
pub mod scheduler;
pub mod sensor;
pub mod time;

// Re-export commonly used items
pub use config::{ConfigError, NodeConfig};
pub use controller::DeviceController;
pub use dispatcher::{dispatch, Reaction};
pub use lora::{AirtimeTracker, BudgetError, DataRate, SubBand};
pub use mac::{MacEvent, MacLayer, SimulatedMac, TxRxReport};
pub use network::{NodeStats, StatsServer};
pub use runtime::{run, Shutdown};
pub use scheduler::{JobId, UplinkError};
pub use time::{MonotonicClock, Timestamp};
