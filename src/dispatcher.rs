//! MAC event state machine.
//!
//! [`dispatch`] turns one [`MacEvent`] into a [`Reaction`] describing the
//! effects to apply. It performs no I/O besides logging; the controller
//! applies the reaction to the slot, job table and outputs.

use crate::mac::{DownlinkError, DownlinkFrame, MacEvent, TxRxReport};
use log::{debug, info, warn};

/// Effects of one MAC event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reaction {
    /// Clear the pending uplink.
    pub completes_uplink: bool,
    /// The network acknowledged the uplink.
    pub ack_received: bool,
    /// Well-formed downlink delivered with the event.
    pub downlink: Option<DownlinkFrame>,
    /// Downlink that was dropped as malformed.
    pub dropped_downlink: Option<DownlinkError>,
    /// Value to apply to the output.
    pub actuator_value: Option<u8>,
    /// Arm the next regular uplink.
    pub reschedule: bool,
    /// Blink the indicator.
    pub blink: bool,
}

impl Reaction {
    /// True if the event has no effect at all.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Decide how to react to `event`.
pub fn dispatch(event: MacEvent) -> Reaction {
    match event {
        MacEvent::TxComplete(report) => {
            info!("EV_TXCOMPLETE (includes waiting for RX windows)");
            let mut reaction = Reaction {
                completes_uplink: true,
                ack_received: report.ack_received,
                reschedule: true,
                blink: true,
                ..Reaction::default()
            };
            if report.ack_received {
                info!("Received ack");
            }
            read_downlink(report, &mut reaction);
            reaction.actuator_value = reaction.downlink.as_ref().and_then(|f| f.first_byte());
            reaction
        }
        MacEvent::RxComplete(report) => {
            info!("EV_RXCOMPLETE");
            let mut reaction = Reaction::default();
            read_downlink(report, &mut reaction);
            reaction
        }
        MacEvent::Other(other) => {
            debug!("{} ignored", other.name());
            Reaction::default()
        }
    }
}

fn read_downlink(report: TxRxReport, reaction: &mut Reaction) {
    match report.into_downlink() {
        Ok(Some(frame)) => {
            info!(
                "Received {} bytes of payload{}",
                frame.len(),
                frame
                    .port
                    .map(|port| format!(" on port {}", port))
                    .unwrap_or_default()
            );
            reaction.downlink = Some(frame);
        }
        Ok(None) => {}
        Err(err) => {
            warn!("Dropping downlink: {}", err);
            reaction.dropped_downlink = Some(err);
        }
    }
}
