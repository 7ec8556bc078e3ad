//! The device controller.
//!
//! [`DeviceController`] owns the transmit slot, the airtime budgets, the
//! job table and the outputs. Timer expiries ([`run_due_jobs`]) and MAC
//! events ([`handle_event`]) both go through `&mut self`, so at most one
//! uplink can ever be pending.
//!
//! [`run_due_jobs`]: DeviceController::run_due_jobs
//! [`handle_event`]: DeviceController::handle_event

use crate::actuator::{Actuator, DimmableOutput, Indicator};
use crate::config::{ConfigError, NodeConfig};
use crate::dispatcher::{dispatch, Reaction};
use crate::lora::{AirtimeTracker, DataRate, SessionParameters};
use crate::mac::{MacEvent, MacLayer};
use crate::network::NodeStats;
use crate::scheduler::{JobId, JobTable, Submission, TransmitSlot, UplinkError, UplinkScheduler};
use crate::sensor::{Sensor, SensorSampler};
use crate::time::Timestamp;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Uplink scheduler and MAC event state machine for one end-device.
pub struct DeviceController<M, S, A, L> {
    mac: M,
    scheduler: UplinkScheduler<S>,
    jobs: JobTable,
    output: DimmableOutput<A>,
    indicator: L,
    session: SessionParameters,
    rx2_data_rate: DataRate,
    tx_interval: Duration,
    blink: Duration,
    startup_delay: Duration,
    stats: Arc<NodeStats>,
    started: bool,
}

impl<M, S, A, L> DeviceController<M, S, A, L>
where
    M: MacLayer,
    S: Sensor,
    A: Actuator,
    L: Indicator,
{
    /// Build a controller from a validated configuration.
    pub fn new(
        config: &NodeConfig,
        mac: M,
        sensor: S,
        actuator: A,
        indicator: L,
        stats: Arc<NodeStats>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let sampler = SensorSampler::new(sensor, config.adc_bits, config.payload_len).map_err(
            |e| ConfigError::InvalidValue {
                field: "payload_len",
                reason: e.to_string(),
            },
        )?;
        let tracker = AirtimeTracker::new(
            config.duty_cycles(),
            config.duty_cycle_window(),
            config.channels()?,
        );
        let scheduler = UplinkScheduler::new(
            sampler,
            tracker,
            config.port,
            config.confirmed,
            config.tx_interval(),
        );

        Ok(Self {
            mac,
            scheduler,
            jobs: JobTable::new(),
            output: DimmableOutput::new(actuator, config.output_range()?),
            indicator,
            session: config.session_parameters()?,
            rx2_data_rate: config.rx2_data_rate,
            tx_interval: config.tx_interval(),
            blink: config.blink(),
            startup_delay: config.startup_delay(),
            stats,
            started: false,
        })
    }

    /// Configure the MAC session and arm the first uplink.
    ///
    /// Returns the time of the first uplink. Calling it again has no effect.
    pub fn start(&mut self, now: Timestamp) -> Timestamp {
        if self.started {
            warn!("Controller already started");
            return self.jobs.deadline(JobId::Init).unwrap_or(now);
        }

        self.mac.reset();
        self.mac.configure_session(&self.session);
        self.mac.set_link_check_mode(false);
        self.mac.set_rx2_data_rate(self.rx2_data_rate);
        self.mac
            .set_data_rate_and_power(self.session.data_rate(), self.session.tx_power_dbm());
        self.scheduler.session_configured(self.session.data_rate());
        self.started = true;

        let first = now + self.startup_delay;
        self.jobs.arm(JobId::Init, first);
        info!(
            "{}: session {:08X} ready at {} / {} dBm, first uplink at {}",
            now,
            self.session.dev_addr(),
            self.session.data_rate(),
            self.session.tx_power_dbm(),
            first
        );
        first
    }

    /// Try to send an uplink now.
    pub fn trigger(&mut self, now: Timestamp) -> Result<Submission, UplinkError> {
        let result = self.scheduler.trigger(now, &mut self.mac, &mut self.jobs);
        match &result {
            Ok(_) => NodeStats::bump(&self.stats.uplink.submitted),
            Err(UplinkError::Busy) => NodeStats::bump(&self.stats.uplink.busy),
            Err(UplinkError::Budget(_)) => NodeStats::bump(&self.stats.uplink.deferred),
            Err(err) => warn!("{}: uplink failed: {}", now, err),
        }
        result
    }

    /// Apply one MAC event.
    pub fn handle_event(&mut self, event: MacEvent, now: Timestamp) -> Reaction {
        let ignored = matches!(event, MacEvent::Other(_));
        let reaction = dispatch(event);
        if ignored {
            NodeStats::bump(&self.stats.ignored_events);
        }
        if reaction.is_noop() {
            return reaction;
        }

        if reaction.completes_uplink {
            if self.scheduler.complete(now) {
                NodeStats::bump(&self.stats.uplink.completed);
            } else {
                warn!("{}: TX_COMPLETE without a pending uplink", now);
            }
        }
        if reaction.ack_received {
            NodeStats::bump(&self.stats.uplink.acked);
        }
        if reaction.downlink.is_some() {
            NodeStats::bump(&self.stats.downlink.received);
        }
        if reaction.dropped_downlink.is_some() {
            NodeStats::bump(&self.stats.downlink.dropped);
        }
        if let Some(value) = reaction.actuator_value {
            let level = self.output.apply(value);
            info!("{}: downlink value {} -> output level {}", now, value, level);
            NodeStats::bump(&self.stats.downlink.applied);
        }
        if reaction.blink {
            self.indicator.set(true);
            self.jobs.arm(JobId::Blink, now + self.blink);
        }
        if reaction.reschedule {
            let next = self
                .scheduler
                .schedule_next(now, self.tx_interval, &mut self.jobs);
            debug!("{}: next uplink at {}", now, next);
        }
        reaction
    }

    /// Run every job due at `now`. Returns the jobs that fired.
    pub fn run_due_jobs(&mut self, now: Timestamp) -> Vec<JobId> {
        let mut fired = Vec::new();
        // Each job fires at most once per call; rearms always land in the future.
        for _ in 0..JobId::COUNT {
            let Some(job) = self.jobs.pop_due(now) else {
                break;
            };
            match job {
                JobId::Init | JobId::Send => {
                    if let Err(err) = self.trigger(now) {
                        debug!("{}: {} job did not send: {}", now, job, err);
                    }
                }
                JobId::Blink => self.indicator.set(false),
            }
            fired.push(job);
        }
        fired
    }

    /// When the next job is due.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.jobs.next_deadline().map(|(_, at)| at)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn slot(&self) -> &TransmitSlot {
        self.scheduler.slot()
    }

    pub fn tracker(&self) -> &AirtimeTracker {
        self.scheduler.tracker()
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn mac(&self) -> &M {
        &self.mac
    }

    pub fn mac_mut(&mut self) -> &mut M {
        &mut self.mac
    }

    pub fn output(&self) -> &DimmableOutput<A> {
        &self.output
    }

    pub fn indicator(&self) -> &L {
        &self.indicator
    }

    pub fn stats(&self) -> &Arc<NodeStats> {
        &self.stats
    }
}
