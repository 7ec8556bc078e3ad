//! Boundary to the LoRaWAN MAC layer.
//!
//! Framing, encryption and the radio itself live behind [`MacLayer`]. The
//! controller hands it uplinks and receives [`MacEvent`]s back, either
//! through a channel (see [`crate::runtime`]) or by calling
//! [`crate::DeviceController::handle_event`] directly.

#[cfg(test)]
pub(crate) mod recording;
mod sim;

pub use sim::SimulatedMac;

use crate::lora::{Channel, DataRate, SessionParameters, MAX_DOWNLINK_LEN};
use std::fmt;

/// An uplink handed to the MAC layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UplinkRequest<'a> {
    /// Application port.
    pub port: u8,
    /// Application payload.
    pub payload: &'a [u8],
    /// Request an acknowledgement from the network.
    pub confirmed: bool,
    /// Channel the airtime was budgeted on.
    pub channel: Channel,
    /// Data rate the airtime was estimated for.
    pub data_rate: DataRate,
}

/// MAC layer operations used by the controller.
///
/// Setup calls happen once, in this order, before the first uplink:
/// `reset`, `configure_session`, `set_link_check_mode`,
/// `set_rx2_data_rate`, `set_data_rate_and_power`.
pub trait MacLayer {
    /// Reset MAC state, discarding any session and pending transfer.
    fn reset(&mut self);

    /// Install pre-provisioned ABP session parameters.
    fn configure_session(&mut self, session: &SessionParameters);

    /// Enable or disable link check validation.
    fn set_link_check_mode(&mut self, enabled: bool);

    /// Data rate used in the RX2 receive window.
    fn set_rx2_data_rate(&mut self, data_rate: DataRate);

    /// Uplink data rate and transmit power.
    fn set_data_rate_and_power(&mut self, data_rate: DataRate, tx_power_dbm: i8);

    /// Queue an uplink. Fire and forget: completion arrives as
    /// [`MacEvent::TxComplete`]. Implementations silently drop the request
    /// if they already have a transmission in flight.
    fn submit_uplink(&mut self, request: &UplinkRequest<'_>);
}

/// Transmit/receive status reported with TX_COMPLETE and RX_COMPLETE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxRxReport {
    /// The network acknowledged a confirmed uplink.
    pub ack_received: bool,
    /// Downlink payload length as declared by the MAC layer.
    pub data_len: usize,
    /// Downlink payload bytes.
    pub data: Vec<u8>,
    /// Downlink port, if the frame carried one.
    pub port: Option<u8>,
    /// The downlink was a confirmed frame.
    pub ack_requested: bool,
}

impl TxRxReport {
    /// Report without ack or downlink.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Report carrying a downlink payload.
    pub fn with_downlink(port: u8, data: &[u8]) -> Self {
        Self {
            data_len: data.len(),
            data: data.to_vec(),
            port: Some(port),
            ..Self::default()
        }
    }

    /// Extract the downlink frame, if any.
    ///
    /// A report with `data_len == 0` and no bytes carries no downlink.
    pub fn into_downlink(self) -> Result<Option<DownlinkFrame>, DownlinkError> {
        if self.data_len != self.data.len() {
            return Err(DownlinkError::LengthMismatch {
                declared: self.data_len,
                actual: self.data.len(),
            });
        }
        if self.data_len > MAX_DOWNLINK_LEN {
            return Err(DownlinkError::TooLong { len: self.data_len });
        }
        if self.data.is_empty() {
            return Ok(None);
        }
        Ok(Some(DownlinkFrame {
            data: self.data,
            port: self.port,
            ack_requested: self.ack_requested,
        }))
    }
}

/// Downlink payload delivered in a receive window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownlinkFrame {
    /// Application payload (never empty).
    pub data: Vec<u8>,
    /// Application port.
    pub port: Option<u8>,
    /// The network asked for this frame to be acknowledged.
    pub ack_requested: bool,
}

impl DownlinkFrame {
    /// Payload length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always `false`; empty downlinks are not frames.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// First payload byte, the value applied to the output.
    pub fn first_byte(&self) -> Option<u8> {
        self.data.first().copied()
    }
}

/// Downlink reports that do not describe a usable frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownlinkError {
    /// Declared length disagrees with the bytes delivered.
    LengthMismatch {
        /// Length the MAC layer reported.
        declared: usize,
        /// Bytes actually present.
        actual: usize,
    },
    /// Longer than any valid application payload.
    TooLong {
        /// Declared length.
        len: usize,
    },
}

impl fmt::Display for DownlinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch { declared, actual } => write!(
                f,
                "malformed downlink: declared {} bytes, got {}",
                declared, actual
            ),
            Self::TooLong { len } => write!(
                f,
                "malformed downlink: {} bytes exceeds maximum {}",
                len, MAX_DOWNLINK_LEN
            ),
        }
    }
}

impl std::error::Error for DownlinkError {}

/// MAC events the controller does not act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtherEvent {
    ScanTimeout,
    BeaconFound,
    BeaconMissed,
    BeaconTracked,
    Joining,
    Joined,
    JoinFailed,
    RejoinFailed,
    LostTsync,
    Reset,
    LinkDead,
    LinkAlive,
    TxStart,
    /// Event code this controller does not know.
    Unknown(u8),
}

impl OtherEvent {
    /// Human-readable event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ScanTimeout => "EV_SCAN_TIMEOUT",
            Self::BeaconFound => "EV_BEACON_FOUND",
            Self::BeaconMissed => "EV_BEACON_MISSED",
            Self::BeaconTracked => "EV_BEACON_TRACKED",
            Self::Joining => "EV_JOINING",
            Self::Joined => "EV_JOINED",
            Self::JoinFailed => "EV_JOIN_FAILED",
            Self::RejoinFailed => "EV_REJOIN_FAILED",
            Self::LostTsync => "EV_LOST_TSYNC",
            Self::Reset => "EV_RESET",
            Self::LinkDead => "EV_LINK_DEAD",
            Self::LinkAlive => "EV_LINK_ALIVE",
            Self::TxStart => "EV_TXSTART",
            Self::Unknown(_) => "EV_UNKNOWN",
        }
    }
}

/// Asynchronous event from the MAC layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacEvent {
    /// The uplink and its receive windows have finished.
    TxComplete(TxRxReport),
    /// A frame arrived outside an uplink's receive windows.
    RxComplete(TxRxReport),
    /// Anything else.
    Other(OtherEvent),
}

/// Numeric event codes in the order the classic LMIC stack numbers them.
pub mod codes {
    pub const SCAN_TIMEOUT: u8 = 1;
    pub const BEACON_FOUND: u8 = 2;
    pub const BEACON_MISSED: u8 = 3;
    pub const BEACON_TRACKED: u8 = 4;
    pub const JOINING: u8 = 5;
    pub const JOINED: u8 = 6;
    pub const JOIN_FAILED: u8 = 8;
    pub const REJOIN_FAILED: u8 = 9;
    pub const TX_COMPLETE: u8 = 10;
    pub const LOST_TSYNC: u8 = 11;
    pub const RESET: u8 = 12;
    pub const RX_COMPLETE: u8 = 13;
    pub const LINK_DEAD: u8 = 14;
    pub const LINK_ALIVE: u8 = 15;
    pub const TX_START: u8 = 17;
}

impl MacEvent {
    /// Build an event from a numeric code plus the MAC's status fields.
    ///
    /// The report is only kept for TX_COMPLETE and RX_COMPLETE.
    pub fn from_code(code: u8, report: TxRxReport) -> Self {
        match code {
            codes::TX_COMPLETE => Self::TxComplete(report),
            codes::RX_COMPLETE => Self::RxComplete(report),
            codes::SCAN_TIMEOUT => Self::Other(OtherEvent::ScanTimeout),
            codes::BEACON_FOUND => Self::Other(OtherEvent::BeaconFound),
            codes::BEACON_MISSED => Self::Other(OtherEvent::BeaconMissed),
            codes::BEACON_TRACKED => Self::Other(OtherEvent::BeaconTracked),
            codes::JOINING => Self::Other(OtherEvent::Joining),
            codes::JOINED => Self::Other(OtherEvent::Joined),
            codes::JOIN_FAILED => Self::Other(OtherEvent::JoinFailed),
            codes::REJOIN_FAILED => Self::Other(OtherEvent::RejoinFailed),
            codes::LOST_TSYNC => Self::Other(OtherEvent::LostTsync),
            codes::RESET => Self::Other(OtherEvent::Reset),
            codes::LINK_DEAD => Self::Other(OtherEvent::LinkDead),
            codes::LINK_ALIVE => Self::Other(OtherEvent::LinkAlive),
            codes::TX_START => Self::Other(OtherEvent::TxStart),
            other => Self::Other(OtherEvent::Unknown(other)),
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TxComplete(_) => "EV_TXCOMPLETE",
            Self::RxComplete(_) => "EV_RXCOMPLETE",
            Self::Other(other) => other.name(),
        }
    }
}
