//! Node configuration management.
//!
//! - [`NodeConfig`]: radio, scheduling and output settings loaded from JSON
//! - [`SessionConfig`]: pre-provisioned ABP session (hex encoded)

mod node;

pub use node::{
    ConfigError, NodeConfig, SessionConfig, DEFAULT_STATS_PORT, MAX_APP_PORT, MIN_TX_POWER_DBM,
};
