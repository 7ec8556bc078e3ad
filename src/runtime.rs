//! Cooperative run loop.
//!
//! One task owns the [`DeviceController`], waits on the MAC event channel
//! and the earliest job deadline, and handles whichever comes first.
//! Events are handled in arrival order.

use crate::actuator::{Actuator, Indicator};
use crate::controller::DeviceController;
use crate::mac::{MacEvent, MacLayer};
use crate::sensor::Sensor;
use crate::time::MonotonicClock;
use log::{debug, info, warn};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why [`run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// The cancellation token fired.
    Cancelled,
    /// Every MAC event sender was dropped.
    EventsClosed,
}

/// Drive `controller` until cancelled.
///
/// Starts the controller first if that has not happened yet.
pub async fn run<M, S, A, L>(
    controller: &mut DeviceController<M, S, A, L>,
    events: &mut UnboundedReceiver<MacEvent>,
    clock: &MonotonicClock,
    cancel: CancellationToken,
) -> Shutdown
where
    M: MacLayer,
    S: Sensor,
    A: Actuator,
    L: Indicator,
{
    if !controller.is_started() {
        controller.start(clock.now());
    }

    loop {
        let deadline = controller.next_deadline().map(|at| clock.instant_at(at));

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Run loop shutting down");
                return Shutdown::Cancelled;
            }

            event = events.recv() => {
                match event {
                    Some(event) => {
                        let now = clock.now();
                        debug!("{}: {}", now, event.name());
                        controller.handle_event(event, now);
                    }
                    None => {
                        warn!("MAC event channel closed");
                        return Shutdown::EventsClosed;
                    }
                }
            }

            _ = wait_until(deadline) => {
                controller.run_due_jobs(clock.now());
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{LoggingIndicator, LoggingOutput};
    use crate::config::{NodeConfig, SessionConfig};
    use crate::mac::SimulatedMac;
    use crate::network::NodeStats;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn config() -> NodeConfig {
        NodeConfig {
            session: SessionConfig {
                dev_addr: "2601183D".to_string(),
                nwk_skey: "EFFAE5CB14EE8A9EB546A422CC613EB7".to_string(),
                app_skey: "AA215475604FB2CE375826F759185A0A".to_string(),
            },
            ..NodeConfig::default()
        }
    }

    fn reading() -> u32 {
        512
    }

    #[tokio::test(start_paused = true)]
    async fn test_uplinks_follow_completions() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut mac = SimulatedMac::new(tx);
        mac.queue_downlink(1, vec![77]);
        let stats = Arc::new(NodeStats::default());
        let mut controller = DeviceController::new(
            &config(),
            mac,
            reading as fn() -> u32,
            LoggingOutput,
            LoggingIndicator::default(),
            stats.clone(),
        )
        .unwrap();
        let clock = MonotonicClock::new();
        let cancel = CancellationToken::new();

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            stopper.cancel();
        });

        let shutdown = run(&mut controller, &mut rx, &clock, cancel).await;

        // Sends at ~0 s, ~12 s and ~24 s; the third is still in its RX windows.
        assert_eq!(shutdown, Shutdown::Cancelled);
        assert_eq!(controller.mac().uplink_count(), 3);
        assert_eq!(stats.uplink.submitted.load(Ordering::Relaxed), 3);
        assert_eq!(stats.uplink.completed.load(Ordering::Relaxed), 2);
        assert_eq!(stats.uplink.busy.load(Ordering::Relaxed), 0);
        assert_eq!(stats.downlink.applied.load(Ordering::Relaxed), 1);
        assert_eq!(controller.output().level(), Some(77));
        assert_eq!(controller.mac().last_payload(), &[0x02, 0x00]);
        assert!(controller.slot().is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_events_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mac = SimulatedMac::new(tx);
        let mut controller = DeviceController::new(
            &config(),
            mac,
            reading as fn() -> u32,
            LoggingOutput,
            LoggingIndicator::default(),
            Arc::new(NodeStats::default()),
        )
        .unwrap();
        rx.close();

        let shutdown = run(
            &mut controller,
            &mut rx,
            &MonotonicClock::new(),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(shutdown, Shutdown::EventsClosed);
        assert!(controller.is_started());
    }
}
