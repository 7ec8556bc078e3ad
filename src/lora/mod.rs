//! LoRa radio planning.
//!
//! This module contains:
//! - [`config`]: EU868 data rates, sub-bands, channels and timing constants
//! - [`airtime`]: Time-on-air calculation for uplink frames
//! - [`duty_cycle`]: Rolling-window airtime budgets and channel selection
//! - [`session`]: ABP session parameters

mod airtime;
mod config;
mod duty_cycle;
mod session;

pub use airtime::{calculate_airtime_us, uplink_airtime, LoRaParams};
pub use config::{
    Channel, DataRate, SubBand, DEFAULT_PORT, DEFAULT_TX_POWER_DBM, DUTY_CYCLE_WINDOW,
    EU868_CHANNELS_HZ, INDICATOR_BLINK, LORAWAN_OVERHEAD_BYTES, MAX_DOWNLINK_LEN, MAX_EIRP_DBM,
    NET_ID, TX_INTERVAL,
};
pub use duty_cycle::{AirtimeBudget, AirtimeTracker, BudgetError};
pub use session::{SessionKey, SessionParameters};
