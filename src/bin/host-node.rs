//! Host-based sensor node for development and testing.
//!
//! Runs the controller against the simulated MAC layer and provides an
//! HTTP stats endpoint at http://localhost:8080/stats.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin host-node -- demos/node-config.json
//! ```

use log::{error, info, warn};
use lora_uplink_node::actuator::{LoggingIndicator, LoggingOutput};
use lora_uplink_node::sensor::RampSensor;
use lora_uplink_node::{
    run, DeviceController, MonotonicClock, NodeConfig, NodeStats, SimulatedMac, StatsServer,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== LoRa uplink node starting ===");

    let Some(path) = std::env::args().nth(1) else {
        error!("Usage: host-node <config.json>");
        std::process::exit(2);
    };
    let config = match NodeConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load {}: {}", path, e);
            std::process::exit(1);
        }
    };

    let stats = Arc::new(NodeStats::new(config.session.dev_addr.to_uppercase()));
    let _stats_server = match StatsServer::start(None, config.stats_port, stats.clone()) {
        Ok(server) => Some(server),
        Err(e) => {
            warn!("Failed to start stats server: {}", e);
            warn!("Continuing without stats server");
            None
        }
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut mac = SimulatedMac::new(events_tx);
    // A couple of downlinks so the output path gets exercised.
    mac.queue_downlink(config.port, vec![128]);
    mac.queue_downlink(config.port, vec![255]);

    let sensor_max = (1u32 << config.adc_bits.min(31)) - 1;
    let sensor = RampSensor::new(sensor_max, (sensor_max / 16).max(1));

    let mut controller = match DeviceController::new(
        &config,
        mac,
        sensor,
        LoggingOutput,
        LoggingIndicator::default(),
        stats,
    ) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
        }
        signal_cancel.cancel();
    });

    let clock = MonotonicClock::new();
    let reason = run(&mut controller, &mut events_rx, &clock, cancel).await;
    info!("Shutdown complete ({:?})", reason);
}
