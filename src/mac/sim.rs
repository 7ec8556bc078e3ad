//! Simulated MAC layer for host runs.
//!
//! Behaves like a class A device stack: an uplink occupies the MAC for its
//! airtime plus both receive windows, then TX_COMPLETE is delivered on the
//! event channel. Confirmed uplinks are always acknowledged and queued
//! downlinks are returned one per uplink. Queued downlinks belong to the
//! network side and survive a MAC reset; an uplink in flight does not.

use super::{MacEvent, MacLayer, OtherEvent, TxRxReport, UplinkRequest};
use crate::lora::{uplink_airtime, DataRate, SessionParameters};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Delay from the end of an uplink to the end of the RX2 window.
pub const RX_WINDOWS_DELAY: Duration = Duration::from_secs(2);

/// MAC layer that completes uplinks on a timer.
#[derive(Debug)]
pub struct SimulatedMac {
    events: UnboundedSender<MacEvent>,
    pending: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    downlinks: VecDeque<(u8, Vec<u8>)>,
    rx_delay: Duration,
    dev_addr: Option<u32>,
    rx2_data_rate: Option<DataRate>,
    uplinks: usize,
    last_payload: Vec<u8>,
}

impl SimulatedMac {
    /// Deliver events on `events`.
    pub fn new(events: UnboundedSender<MacEvent>) -> Self {
        Self {
            events,
            pending: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            downlinks: VecDeque::new(),
            rx_delay: RX_WINDOWS_DELAY,
            dev_addr: None,
            rx2_data_rate: None,
            uplinks: 0,
            last_payload: Vec::new(),
        }
    }

    /// Override the receive window delay.
    pub fn with_rx_delay(mut self, rx_delay: Duration) -> Self {
        self.rx_delay = rx_delay;
        self
    }

    /// Return `data` on `port` with the next completed uplink.
    pub fn queue_downlink(&mut self, port: u8, data: Vec<u8>) {
        self.downlinks.push_back((port, data));
    }

    /// A transmission is in flight.
    pub fn is_busy(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Uplinks accepted so far.
    pub fn uplink_count(&self) -> usize {
        self.uplinks
    }

    /// Payload of the last accepted uplink.
    pub fn last_payload(&self) -> &[u8] {
        &self.last_payload
    }

    /// Address of the configured session.
    pub fn dev_addr(&self) -> Option<u32> {
        self.dev_addr
    }

    fn emit(events: &UnboundedSender<MacEvent>, event: MacEvent) {
        if events.send(event).is_err() {
            debug!("MAC event dropped: receiver closed");
        }
    }
}

impl MacLayer for SimulatedMac {
    fn reset(&mut self) {
        // Completion tasks from before the reset see a stale generation.
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.pending.store(false, Ordering::Release);
        self.dev_addr = None;
        info!("MAC reset");
    }

    fn configure_session(&mut self, session: &SessionParameters) {
        self.dev_addr = Some(session.dev_addr());
        info!(
            "Session configured: net {:#x}, dev addr {:08X}",
            session.net_id(),
            session.dev_addr()
        );
    }

    fn set_link_check_mode(&mut self, enabled: bool) {
        debug!("Link check {}", if enabled { "enabled" } else { "disabled" });
    }

    fn set_rx2_data_rate(&mut self, data_rate: DataRate) {
        self.rx2_data_rate = Some(data_rate);
        debug!("RX2 data rate {}", data_rate);
    }

    fn set_data_rate_and_power(&mut self, data_rate: DataRate, tx_power_dbm: i8) {
        debug!("Uplink data rate {} at {} dBm", data_rate, tx_power_dbm);
    }

    fn submit_uplink(&mut self, request: &UplinkRequest<'_>) {
        if self.pending.swap(true, Ordering::AcqRel) {
            warn!("MAC busy, uplink dropped");
            return;
        }
        self.uplinks += 1;
        self.last_payload = request.payload.to_vec();
        Self::emit(&self.events, MacEvent::Other(OtherEvent::TxStart));

        let mut report = match self.downlinks.pop_front() {
            Some((port, data)) => TxRxReport::with_downlink(port, &data),
            None => TxRxReport::empty(),
        };
        report.ack_received = request.confirmed;

        let delay = uplink_airtime(request.payload.len(), request.data_rate) + self.rx_delay;
        let pending = self.pending.clone();
        let events = self.events.clone();
        let generation = self.generation.clone();
        let submitted_in = generation.load(Ordering::Acquire);
        let complete = move || {
            if generation.load(Ordering::Acquire) != submitted_in {
                debug!("Uplink abandoned by MAC reset");
                return;
            }
            pending.store(false, Ordering::Release);
            Self::emit(&events, MacEvent::TxComplete(report));
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    complete();
                });
            }
            Err(_) => {
                warn!("No runtime for the simulated radio, completing immediately");
                complete();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::{Channel, SessionKey, NET_ID};
    use tokio::sync::mpsc;

    fn request(payload: &[u8], confirmed: bool) -> UplinkRequest<'_> {
        UplinkRequest {
            port: 1,
            payload,
            confirmed,
            channel: Channel::new(868_100_000).unwrap(),
            data_rate: DataRate::Sf7,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_after_airtime_and_rx_windows() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut mac = SimulatedMac::new(tx);
        let start = tokio::time::Instant::now();

        mac.submit_uplink(&request(&[1, 2], false));
        assert!(mac.is_busy());
        assert_eq!(rx.recv().await, Some(MacEvent::Other(OtherEvent::TxStart)));

        let event = rx.recv().await.unwrap();
        assert_eq!(event, MacEvent::TxComplete(TxRxReport::empty()));
        // The timer wheel rounds deadlines up to whole milliseconds.
        let expected = uplink_airtime(2, DataRate::Sf7) + RX_WINDOWS_DELAY;
        let elapsed = start.elapsed();
        assert!(elapsed >= expected, "{:?} < {:?}", elapsed, expected);
        assert!(elapsed < expected + Duration::from_millis(2));
        assert!(!mac.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drops_uplink_while_busy() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut mac = SimulatedMac::new(tx);

        mac.submit_uplink(&request(&[1], false));
        mac.submit_uplink(&request(&[2], false));
        assert_eq!(mac.uplink_count(), 1);
        assert_eq!(mac.last_payload(), &[1]);

        rx.recv().await;
        assert!(matches!(rx.recv().await, Some(MacEvent::TxComplete(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_acked_and_downlink_delivered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut mac = SimulatedMac::new(tx).with_rx_delay(Duration::from_millis(10));
        mac.queue_downlink(3, vec![200]);

        mac.submit_uplink(&request(&[1], true));
        rx.recv().await;
        match rx.recv().await {
            Some(MacEvent::TxComplete(report)) => {
                assert!(report.ack_received);
                assert_eq!(report.data, vec![200]);
                assert_eq!(report.port, Some(3));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_without_runtime_completes_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut mac = SimulatedMac::new(tx);
        mac.submit_uplink(&request(&[1], false));
        assert!(!mac.is_busy());
        assert_eq!(rx.try_recv().ok(), Some(MacEvent::Other(OtherEvent::TxStart)));
        assert!(matches!(rx.try_recv(), Ok(MacEvent::TxComplete(_))));
    }

    #[test]
    fn test_session_and_reset() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut mac = SimulatedMac::new(tx);
        let session = SessionParameters::new(
            NET_ID,
            0x2601_183D,
            SessionKey::new([1; 16]),
            SessionKey::new([2; 16]),
            DataRate::Sf7,
            14,
        );
        mac.configure_session(&session);
        assert_eq!(mac.dev_addr(), Some(0x2601_183D));
        mac.reset();
        assert_eq!(mac.dev_addr(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_downlink_survives_reset() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut mac = SimulatedMac::new(tx).with_rx_delay(Duration::from_millis(10));
        mac.queue_downlink(1, vec![77]);
        mac.reset();

        mac.submit_uplink(&request(&[1], false));
        assert_eq!(rx.recv().await, Some(MacEvent::Other(OtherEvent::TxStart)));
        match rx.recv().await {
            Some(MacEvent::TxComplete(report)) => {
                assert_eq!(report.data, vec![77]);
                assert_eq!(report.port, Some(1));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_abandons_uplink_in_flight() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut mac = SimulatedMac::new(tx).with_rx_delay(Duration::from_millis(10));

        mac.submit_uplink(&request(&[1], false));
        assert_eq!(rx.recv().await, Some(MacEvent::Other(OtherEvent::TxStart)));
        mac.reset();
        assert!(!mac.is_busy());

        // The longer frame outlasts the abandoned one.
        mac.submit_uplink(&request(&[2; 20], false));
        assert!(mac.is_busy());
        assert_eq!(rx.recv().await, Some(MacEvent::Other(OtherEvent::TxStart)));
        assert!(uplink_airtime(20, DataRate::Sf7) > uplink_airtime(1, DataRate::Sf7) + Duration::from_millis(10));
        tokio::time::sleep(uplink_airtime(1, DataRate::Sf7) + Duration::from_millis(15)).await;
        assert!(mac.is_busy());
        assert!(rx.try_recv().is_err());

        assert!(matches!(rx.recv().await, Some(MacEvent::TxComplete(_))));
        assert!(!mac.is_busy());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }
}
