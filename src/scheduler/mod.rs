//! Uplink scheduling.
//!
//! - [`JobTable`]: one fire time per logical timer
//! - [`UplinkScheduler`]: the transmit slot and the budget-gated send decision

mod jobs;
mod uplink;

pub use jobs::{JobId, JobTable};
pub use uplink::{Submission, TransmitSlot, UplinkError, UplinkScheduler};
