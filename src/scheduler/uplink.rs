//! The transmit slot and the decision to send.

use super::jobs::{JobId, JobTable};
use crate::lora::{uplink_airtime, AirtimeTracker, BudgetError, Channel, DataRate};
use crate::mac::{MacLayer, UplinkRequest};
use crate::sensor::{Sensor, SensorSampler};
use crate::time::Timestamp;
use log::{debug, info, warn};
use std::fmt;
use std::time::Duration;

/// Why `trigger` did not submit an uplink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UplinkError {
    /// An uplink is already waiting for TX_COMPLETE.
    Busy,
    /// The sampler produced no bytes.
    EmptyPayload,
    /// `trigger` ran before the MAC session was set up.
    SessionNotConfigured,
    /// The airtime budget denied the uplink.
    Budget(BudgetError),
}

impl UplinkError {
    /// Earliest time the scheduler will retry, for budget denials.
    pub fn retry_at(&self) -> Option<Timestamp> {
        match self {
            Self::Budget(err) => err.retry_at(),
            _ => None,
        }
    }
}

impl fmt::Display for UplinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "uplink already pending"),
            Self::EmptyPayload => write!(f, "refusing to send an empty payload"),
            Self::SessionNotConfigured => write!(f, "session not configured"),
            Self::Budget(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for UplinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Budget(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BudgetError> for UplinkError {
    fn from(err: BudgetError) -> Self {
        Self::Budget(err)
    }
}

/// The single outstanding-uplink slot.
#[derive(Debug, Clone, Default)]
pub struct TransmitSlot {
    pending: bool,
    payload: Vec<u8>,
    port: u8,
    submitted_at: Option<Timestamp>,
    channel: Option<Channel>,
}

impl TransmitSlot {
    pub fn new(port: u8) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Payload of the current or last uplink.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn port(&self) -> u8 {
        self.port
    }

    /// When the pending uplink was handed to the MAC.
    pub fn submitted_at(&self) -> Option<Timestamp> {
        self.submitted_at
    }

    /// Channel of the pending uplink.
    pub fn channel(&self) -> Option<Channel> {
        self.channel
    }

    /// Writable payload buffer; `None` while an uplink is pending.
    fn payload_mut(&mut self) -> Option<&mut Vec<u8>> {
        if self.pending {
            None
        } else {
            Some(&mut self.payload)
        }
    }
}

/// A successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub channel: Channel,
    pub airtime: Duration,
    pub reading: u32,
}

/// Decides when uplinks go out.
#[derive(Debug)]
pub struct UplinkScheduler<S> {
    slot: TransmitSlot,
    tracker: AirtimeTracker,
    sampler: SensorSampler<S>,
    confirmed: bool,
    data_rate: Option<DataRate>,
    tx_interval: Duration,
}

impl<S: Sensor> UplinkScheduler<S> {
    pub fn new(
        sampler: SensorSampler<S>,
        tracker: AirtimeTracker,
        port: u8,
        confirmed: bool,
        tx_interval: Duration,
    ) -> Self {
        Self {
            slot: TransmitSlot::new(port),
            tracker,
            sampler,
            confirmed,
            data_rate: None,
            tx_interval,
        }
    }

    /// Enable `trigger`; uplinks go out at `data_rate`.
    pub fn session_configured(&mut self, data_rate: DataRate) {
        self.data_rate = Some(data_rate);
    }

    pub fn slot(&self) -> &TransmitSlot {
        &self.slot
    }

    pub fn tracker(&self) -> &AirtimeTracker {
        &self.tracker
    }

    pub fn tx_interval(&self) -> Duration {
        self.tx_interval
    }

    /// Try to send one uplink now.
    ///
    /// A budget denial arms a `Send` retry at the earliest time the uplink
    /// can fit (or after the regular interval if waiting cannot help). A
    /// busy slot changes nothing.
    pub fn trigger<M: MacLayer>(
        &mut self,
        now: Timestamp,
        mac: &mut M,
        jobs: &mut JobTable,
    ) -> Result<Submission, UplinkError> {
        if self.slot.pending {
            info!("{}: uplink pending, not sending", now);
            return Err(UplinkError::Busy);
        }
        let data_rate = self.data_rate.ok_or(UplinkError::SessionNotConfigured)?;

        let reading = match self.slot.payload_mut() {
            Some(buf) => self.sampler.sample_into(buf),
            None => return Err(UplinkError::Busy),
        };
        if self.slot.payload.is_empty() {
            warn!("{}: empty payload, not sending", now);
            return Err(UplinkError::EmptyPayload);
        }

        let airtime = uplink_airtime(self.slot.payload.len(), data_rate);
        let channel = match self.tracker.select_channel(airtime, now) {
            Ok(channel) => channel,
            Err(err) => {
                let retry_at = err.retry_at().unwrap_or(now + self.tx_interval);
                jobs.arm(JobId::Send, retry_at);
                warn!("{}: {}; next attempt at {}", now, err, retry_at);
                return Err(err.into());
            }
        };
        self.tracker
            .record_transmission(channel.band, airtime, now)?;

        self.slot.pending = true;
        self.slot.submitted_at = Some(now);
        self.slot.channel = Some(channel);
        mac.submit_uplink(&UplinkRequest {
            port: self.slot.port,
            payload: &self.slot.payload,
            confirmed: self.confirmed,
            channel,
            data_rate,
        });
        info!(
            "{}: packet queued on {} ({} bytes, {}ms airtime)",
            now,
            channel,
            self.slot.payload.len(),
            airtime.as_millis()
        );

        Ok(Submission {
            channel,
            airtime,
            reading,
        })
    }

    /// Arm the next regular uplink at `now + interval`, replacing any
    /// earlier arm. Returns the new fire time.
    pub fn schedule_next(
        &mut self,
        now: Timestamp,
        interval: Duration,
        jobs: &mut JobTable,
    ) -> Timestamp {
        let at = now + interval;
        if let Some(previous) = jobs.arm(JobId::Send, at) {
            debug!("Send rearmed from {} to {}", previous, at);
        }
        at
    }

    /// Free the slot after TX_COMPLETE. Returns `false` if nothing was pending.
    pub fn complete(&mut self, now: Timestamp) -> bool {
        let was_pending = self.slot.pending;
        if let Some(at) = self.slot.submitted_at.take() {
            debug!(
                "Uplink finished after {}ms",
                now.saturating_duration_since(at).as_millis()
            );
        }
        self.slot.pending = false;
        self.slot.channel = None;
        was_pending
    }
}
