//! Duty cycle accounting over a rolling window.
//!
//! Each regulatory sub-band owns an [`AirtimeBudget`] that remembers the
//! start time and airtime of every transmission inside the window. A new
//! transmission is allowed only if the airtime already in the window plus
//! the new airtime stays within `duty_cycle * window`. When it does not, the
//! budget reports the earliest instant at which enough old airtime will
//! have left the window.
//!
//! [`AirtimeTracker`] combines the per-band budgets with the uplink channel
//! list and picks a channel whose band currently has room.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use lora_uplink_node::lora::{AirtimeBudget, SubBand};
//! use lora_uplink_node::Timestamp;
//!
//! // 1% duty cycle over 1 hour (EU868 g1)
//! let mut budget = AirtimeBudget::new(SubBand::G1, 0.01, Duration::from_secs(3600));
//! assert_eq!(budget.budget(), Duration::from_secs(36));
//!
//! let now = Timestamp::ZERO;
//! assert!(budget.can_transmit_now(Duration::from_millis(50), now));
//! budget.record_transmission(Duration::from_millis(50), now).unwrap();
//! ```

use super::config::{Channel, SubBand};
use crate::time::Timestamp;
use log::{debug, warn};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Reasons a transmission is not allowed right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetError {
    /// The band has used up its airtime; retry at `retry_at`.
    DutyCycleExceeded {
        /// Band that denied the transmission.
        band: SubBand,
        /// Earliest time the transmission fits into the budget.
        retry_at: Timestamp,
    },
    /// `now` is earlier than a timestamp already seen; deny until the clock catches up.
    ClockWentBackwards {
        /// The offending timestamp.
        now: Timestamp,
        /// Latest timestamp the budget has observed.
        last_seen: Timestamp,
    },
    /// A single transmission is longer than the whole window budget.
    AirtimeExceedsBudget {
        /// Requested airtime.
        airtime: Duration,
        /// Total budget per window.
        budget: Duration,
    },
    /// No uplink channels are configured.
    NoChannels,
}

impl BudgetError {
    /// Earliest time worth trying again, if waiting can help at all.
    pub fn retry_at(&self) -> Option<Timestamp> {
        match self {
            Self::DutyCycleExceeded { retry_at, .. } => Some(*retry_at),
            Self::ClockWentBackwards { last_seen, .. } => Some(*last_seen),
            Self::AirtimeExceedsBudget { .. } | Self::NoChannels => None,
        }
    }
}

impl fmt::Display for BudgetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DutyCycleExceeded { band, retry_at } => {
                write!(f, "duty cycle exceeded on {}, retry at {}", band, retry_at)
            }
            Self::ClockWentBackwards { now, last_seen } => {
                write!(f, "clock went backwards: {} < {}", now, last_seen)
            }
            Self::AirtimeExceedsBudget { airtime, budget } => write!(
                f,
                "airtime {}ms exceeds window budget {}ms",
                airtime.as_millis(),
                budget.as_millis()
            ),
            Self::NoChannels => write!(f, "no uplink channels configured"),
        }
    }
}

impl std::error::Error for BudgetError {}

/// One recorded transmission.
#[derive(Debug, Clone, Copy)]
struct Transmission {
    start: Timestamp,
    airtime: Duration,
}

/// Rolling-window airtime budget for one sub-band.
#[derive(Debug, Clone)]
pub struct AirtimeBudget {
    band: SubBand,
    /// Maximum airtime inside any window.
    budget: Duration,
    /// Window length.
    window: Duration,
    /// Transmissions still inside the window, oldest first.
    records: VecDeque<Transmission>,
    /// Sum of `records` airtime.
    used: Duration,
    /// Latest timestamp passed to any operation.
    last_seen: Option<Timestamp>,
}

impl AirtimeBudget {
    /// Create a budget allowing `duty_cycle` (a fraction, e.g. 0.01) of `window`.
    pub fn new(band: SubBand, duty_cycle: f64, window: Duration) -> Self {
        let duty_cycle = if duty_cycle.is_finite() {
            duty_cycle.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let budget_us = (window.as_micros() as f64 * duty_cycle).round() as u64;
        Self {
            band,
            budget: Duration::from_micros(budget_us),
            window,
            records: VecDeque::new(),
            used: Duration::ZERO,
            last_seen: None,
        }
    }

    /// Sub-band this budget accounts for.
    pub fn band(&self) -> SubBand {
        self.band
    }

    /// Total airtime allowed per window.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Airtime recorded inside the window as of the last operation.
    pub fn used(&self) -> Duration {
        self.used
    }

    /// Airtime still available as of the last operation.
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.used)
    }

    /// Returns `true` if `airtime` fits into the budget at `now`.
    pub fn can_transmit_now(&mut self, airtime: Duration, now: Timestamp) -> bool {
        self.check(airtime, now).is_ok()
    }

    /// Check whether `airtime` fits into the budget at `now`.
    ///
    /// On denial the error carries the earliest time at which it would fit.
    pub fn check(&mut self, airtime: Duration, now: Timestamp) -> Result<(), BudgetError> {
        self.observe(now)?;
        if airtime > self.budget {
            return Err(BudgetError::AirtimeExceedsBudget {
                airtime,
                budget: self.budget,
            });
        }
        if self.used + airtime <= self.budget {
            return Ok(());
        }

        // Walk the window oldest first until enough airtime has expired.
        let mut still_used = self.used;
        for record in &self.records {
            still_used = still_used.saturating_sub(record.airtime);
            if still_used + airtime <= self.budget {
                return Err(BudgetError::DutyCycleExceeded {
                    band: self.band,
                    retry_at: record.start + self.window,
                });
            }
        }
        // Not reached: once every record has expired the airtime fits on its own.
        Err(BudgetError::DutyCycleExceeded {
            band: self.band,
            retry_at: now + self.window,
        })
    }

    /// Account for a transmission that was handed to the MAC layer at `now`.
    ///
    /// Nothing is recorded if the transmission does not fit the budget.
    pub fn record_transmission(
        &mut self,
        airtime: Duration,
        now: Timestamp,
    ) -> Result<(), BudgetError> {
        self.check(airtime, now)?;
        self.records.push_back(Transmission {
            start: now,
            airtime,
        });
        self.used += airtime;
        Ok(())
    }

    /// Reject timestamps older than anything seen, then drop expired records.
    fn observe(&mut self, now: Timestamp) -> Result<(), BudgetError> {
        if let Some(last_seen) = self.last_seen {
            if now < last_seen {
                return Err(BudgetError::ClockWentBackwards { now, last_seen });
            }
        }
        self.last_seen = Some(now);

        while let Some(oldest) = self.records.front() {
            if oldest.start + self.window > now {
                break;
            }
            self.used = self.used.saturating_sub(oldest.airtime);
            self.records.pop_front();
        }
        Ok(())
    }
}

/// Per-band budgets plus the channel list they gate.
#[derive(Debug, Clone)]
pub struct AirtimeTracker {
    bands: [AirtimeBudget; SubBand::COUNT],
    channels: Vec<Channel>,
    /// Round-robin position for the next channel search.
    next_channel: usize,
}

impl AirtimeTracker {
    /// Create a tracker with one duty-cycle limit per sub-band (indexed by
    /// [`SubBand::index`]) sharing a common window.
    pub fn new(
        duty_cycles: [f64; SubBand::COUNT],
        window: Duration,
        channels: Vec<Channel>,
    ) -> Self {
        Self {
            bands: SubBand::ALL
                .map(|band| AirtimeBudget::new(band, duty_cycles[band.index()], window)),
            channels,
            next_channel: 0,
        }
    }

    /// Budget of a single band.
    pub fn band(&self, band: SubBand) -> &AirtimeBudget {
        &self.bands[band.index()]
    }

    /// Configured uplink channels.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Returns `true` if `band` can carry `airtime` at `now`.
    pub fn can_transmit_now(&mut self, band: SubBand, airtime: Duration, now: Timestamp) -> bool {
        self.check(band, airtime, now).is_ok()
    }

    /// Check a single band.
    pub fn check(
        &mut self,
        band: SubBand,
        airtime: Duration,
        now: Timestamp,
    ) -> Result<(), BudgetError> {
        self.bands[band.index()].check(airtime, now)
    }

    /// Record airtime actually handed to the MAC layer on `band`.
    pub fn record_transmission(
        &mut self,
        band: SubBand,
        airtime: Duration,
        now: Timestamp,
    ) -> Result<(), BudgetError> {
        self.bands[band.index()].record_transmission(airtime, now)
    }

    /// Pick the next channel (round-robin) whose band has room for `airtime`.
    ///
    /// When no band has room, returns the denial with the earliest retry
    /// time. A backwards clock on any band wins over everything else.
    pub fn select_channel(
        &mut self,
        airtime: Duration,
        now: Timestamp,
    ) -> Result<Channel, BudgetError> {
        if self.channels.is_empty() {
            return Err(BudgetError::NoChannels);
        }

        let count = self.channels.len();
        let mut denial: Option<BudgetError> = None;
        for offset in 0..count {
            let index = (self.next_channel + offset) % count;
            let channel = self.channels[index];
            match self.check(channel.band, airtime, now) {
                Ok(()) => {
                    self.next_channel = (index + 1) % count;
                    debug!("Selected channel {} for {}ms", channel, airtime.as_millis());
                    return Ok(channel);
                }
                Err(err) => {
                    denial = Some(match denial {
                        None => err,
                        Some(previous) => prefer_denial(previous, err),
                    });
                }
            }
        }

        let denial = denial.unwrap_or(BudgetError::NoChannels);
        warn!("No channel available: {}", denial);
        Err(denial)
    }
}

/// Pick the denial to report when every channel refuses.
fn prefer_denial(a: BudgetError, b: BudgetError) -> BudgetError {
    use BudgetError::*;
    match (a, b) {
        (clock @ ClockWentBackwards { .. }, _) | (_, clock @ ClockWentBackwards { .. }) => clock,
        (
            DutyCycleExceeded {
                band: band_a,
                retry_at: at_a,
            },
            DutyCycleExceeded {
                band: band_b,
                retry_at: at_b,
            },
        ) => {
            if at_b < at_a {
                DutyCycleExceeded {
                    band: band_b,
                    retry_at: at_b,
                }
            } else {
                DutyCycleExceeded {
                    band: band_a,
                    retry_at: at_a,
                }
            }
        }
        (deferred @ DutyCycleExceeded { .. }, _) | (_, deferred @ DutyCycleExceeded { .. }) => {
            deferred
        }
        (first, _) => first,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::config::EU868_CHANNELS_HZ;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn at(millis: u64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    fn eu868_tracker(window: Duration) -> AirtimeTracker {
        let channels = EU868_CHANNELS_HZ
            .iter()
            .filter_map(|&hz| Channel::new(hz))
            .collect();
        AirtimeTracker::new([0.01, 0.001], window, channels)
    }

    #[test]
    fn test_budget_sizes() {
        assert_eq!(
            AirtimeBudget::new(SubBand::G1, 0.01, Duration::from_secs(3600)).budget(),
            Duration::from_secs(36)
        );
        assert_eq!(
            AirtimeBudget::new(SubBand::G2, 0.001, Duration::from_secs(3600)).budget(),
            Duration::from_millis(3600)
        );
    }

    #[test]
    fn test_record_reduces_remaining() {
        let mut budget = AirtimeBudget::new(SubBand::G1, 0.01, Duration::from_secs(100));
        assert_eq!(budget.remaining(), Duration::from_secs(1));

        budget.record_transmission(ms(300), at(0)).unwrap();
        assert_eq!(budget.used(), ms(300));
        assert_eq!(budget.remaining(), ms(700));
    }

    #[test]
    fn test_denial_reports_when_oldest_airtime_expires() {
        // 1s budget per 100s window.
        let mut budget = AirtimeBudget::new(SubBand::G1, 0.01, Duration::from_secs(100));
        budget.record_transmission(ms(600), at(0)).unwrap();
        budget.record_transmission(ms(300), at(10_000)).unwrap();

        assert_eq!(
            budget.check(ms(200), at(20_000)),
            Err(BudgetError::DutyCycleExceeded {
                band: SubBand::G1,
                retry_at: at(100_000),
            })
        );
        assert!(budget.can_transmit_now(ms(100), at(20_000)));
    }

    #[test]
    fn test_retry_time_skips_records_that_free_too_little() {
        let mut budget = AirtimeBudget::new(SubBand::G1, 0.01, Duration::from_secs(100));
        budget.record_transmission(ms(100), at(0)).unwrap();
        budget.record_transmission(ms(900), at(5_000)).unwrap();

        // Freeing the first 100ms is not enough for 500ms more.
        let err = budget.check(ms(500), at(6_000)).unwrap_err();
        assert_eq!(err.retry_at(), Some(at(105_000)));
    }

    #[test]
    fn test_airtime_leaves_window() {
        let mut budget = AirtimeBudget::new(SubBand::G1, 0.01, Duration::from_secs(100));
        budget.record_transmission(ms(1_000), at(0)).unwrap();
        assert!(!budget.can_transmit_now(ms(1), at(99_999)));
        assert!(budget.can_transmit_now(ms(1_000), at(100_000)));
        assert_eq!(budget.used(), Duration::ZERO);
    }

    #[test]
    fn test_denied_transmission_is_not_recorded() {
        let mut budget = AirtimeBudget::new(SubBand::G1, 0.01, Duration::from_secs(100));
        budget.record_transmission(ms(900), at(0)).unwrap();

        assert!(budget.record_transmission(ms(200), at(1_000)).is_err());
        assert_eq!(budget.used(), ms(900));
    }

    #[test]
    fn test_rolling_window_never_exceeds_budget() {
        let window = Duration::from_secs(10);
        let mut budget = AirtimeBudget::new(SubBand::G1, 0.1, window);
        let mut accepted: Vec<(u64, Duration)> = Vec::new();

        // Try a 250ms transmission every 500ms for a minute.
        for step in 0..120u64 {
            let now = step * 500;
            if budget.record_transmission(ms(250), at(now)).is_ok() {
                accepted.push((now, ms(250)));
            }
        }

        for &(end, _) in &accepted {
            let in_window: Duration = accepted
                .iter()
                .filter(|(start, _)| *start + 10_000 > end && *start <= end)
                .map(|(_, airtime)| *airtime)
                .sum();
            assert!(in_window <= budget.budget(), "{:?} at {}", in_window, end);
        }
        assert!(!accepted.is_empty());
    }

    #[test]
    fn test_backwards_clock_denies_until_resync() {
        let mut budget = AirtimeBudget::new(SubBand::G1, 0.01, Duration::from_secs(100));
        budget.record_transmission(ms(10), at(5_000)).unwrap();

        let err = budget.check(ms(10), at(4_000)).unwrap_err();
        assert_eq!(
            err,
            BudgetError::ClockWentBackwards {
                now: at(4_000),
                last_seen: at(5_000),
            }
        );
        assert_eq!(err.retry_at(), Some(at(5_000)));
        assert!(budget.record_transmission(ms(10), at(4_500)).is_err());
        assert_eq!(budget.used(), ms(10));

        assert!(budget.can_transmit_now(ms(10), at(5_000)));
    }

    #[test]
    fn test_oversized_airtime_never_fits() {
        let mut budget = AirtimeBudget::new(SubBand::G1, 0.001, Duration::from_secs(100));
        let err = budget.check(ms(101), at(0)).unwrap_err();
        assert!(matches!(err, BudgetError::AirtimeExceedsBudget { .. }));
        assert_eq!(err.retry_at(), None);
    }

    #[test]
    fn test_zero_duty_cycle_is_safe() {
        let mut budget = AirtimeBudget::new(SubBand::G1, 0.0, Duration::from_secs(3600));
        assert_eq!(budget.budget(), Duration::ZERO);
        assert!(!budget.can_transmit_now(ms(1), at(0)));

        let budget = AirtimeBudget::new(SubBand::G1, f64::NAN, Duration::from_secs(3600));
        assert_eq!(budget.budget(), Duration::ZERO);
    }

    #[test]
    fn test_select_channel_round_robin() {
        let mut tracker = eu868_tracker(Duration::from_secs(3600));
        let picked: Vec<u32> = (0..6)
            .map(|_| tracker.select_channel(ms(50), at(0)).unwrap().frequency_hz)
            .collect();
        assert_eq!(
            picked,
            vec![
                868_100_000,
                868_300_000,
                868_500_000,
                868_850_000,
                869_050_000,
                868_100_000
            ]
        );
    }

    #[test]
    fn test_select_channel_skips_saturated_band() {
        let mut tracker = eu868_tracker(Duration::from_secs(100));
        // g1 budget is 1s; use all of it.
        tracker
            .record_transmission(SubBand::G1, ms(1_000), at(0))
            .unwrap();

        let channel = tracker.select_channel(ms(50), at(0)).unwrap();
        assert_eq!(channel.band, SubBand::G2);
        assert!(!tracker.can_transmit_now(SubBand::G1, ms(1), at(0)));
    }

    #[test]
    fn test_select_channel_reports_earliest_retry() {
        let mut tracker = eu868_tracker(Duration::from_secs(100));
        tracker
            .record_transmission(SubBand::G1, ms(1_000), at(30_000))
            .unwrap();
        tracker
            .record_transmission(SubBand::G2, ms(100), at(10_000))
            .unwrap();

        let err = tracker.select_channel(ms(50), at(40_000)).unwrap_err();
        assert_eq!(
            err,
            BudgetError::DutyCycleExceeded {
                band: SubBand::G2,
                retry_at: at(110_000),
            }
        );
    }

    #[test]
    fn test_select_channel_without_channels() {
        let mut tracker = AirtimeTracker::new([0.01, 0.001], Duration::from_secs(3600), vec![]);
        assert_eq!(
            tracker.select_channel(ms(50), at(0)),
            Err(BudgetError::NoChannels)
        );
    }

    #[test]
    fn test_tracker_reports_band() {
        let mut tracker = eu868_tracker(Duration::from_secs(100));
        tracker
            .record_transmission(SubBand::G2, ms(100), at(0))
            .unwrap();
        let err = tracker.check(SubBand::G2, ms(10), at(0)).unwrap_err();
        assert!(matches!(
            err,
            BudgetError::DutyCycleExceeded {
                band: SubBand::G2,
                ..
            }
        ));
        assert_eq!(tracker.band(SubBand::G2).used(), ms(100));
        assert_eq!(tracker.band(SubBand::G1).used(), Duration::ZERO);
    }
}
