//! Host-side networking: the HTTP stats endpoint.

mod stats_server;

pub use stats_server::{DownlinkStats, NodeStats, StatsServer, UplinkStats};
