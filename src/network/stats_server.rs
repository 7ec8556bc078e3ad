//! HTTP stats server for node monitoring.
//!
//! Provides a simple `/stats` endpoint that returns node statistics as JSON.
//!
//! # Example Response
//!
//! ```json
//! {
//!   "uptime_secs": 3600,
//!   "dev_addr": "2601183D",
//!   "uplink": {
//!     "submitted": 340, "completed": 340, "busy": 0,
//!     "deferred": 12, "acked": 0
//!   },
//!   "downlink": { "received": 3, "dropped": 1, "applied": 2 },
//!   "events": { "ignored": 340 }
//! }
//! ```

use log::{error, info, warn};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tiny_http::{Header, Method, Response, Server};

/// Uplink counters.
#[derive(Debug, Default)]
pub struct UplinkStats {
    /// Uplinks handed to the MAC layer.
    pub submitted: AtomicUsize,
    /// TX_COMPLETE events that freed a pending uplink.
    pub completed: AtomicUsize,
    /// Triggers refused because an uplink was pending.
    pub busy: AtomicUsize,
    /// Triggers deferred by the airtime budget.
    pub deferred: AtomicUsize,
    /// Acknowledged confirmed uplinks.
    pub acked: AtomicUsize,
}

impl UplinkStats {
    fn to_json(&self) -> String {
        format!(
            r#"{{"submitted":{},"completed":{},"busy":{},"deferred":{},"acked":{}}}"#,
            self.submitted.load(Ordering::Relaxed),
            self.completed.load(Ordering::Relaxed),
            self.busy.load(Ordering::Relaxed),
            self.deferred.load(Ordering::Relaxed),
            self.acked.load(Ordering::Relaxed)
        )
    }
}

/// Downlink counters.
#[derive(Debug, Default)]
pub struct DownlinkStats {
    /// Well-formed downlinks.
    pub received: AtomicUsize,
    /// Malformed downlinks dropped.
    pub dropped: AtomicUsize,
    /// Downlink values written to the output.
    pub applied: AtomicUsize,
}

impl DownlinkStats {
    fn to_json(&self) -> String {
        format!(
            r#"{{"received":{},"dropped":{},"applied":{}}}"#,
            self.received.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed),
            self.applied.load(Ordering::Relaxed)
        )
    }
}

/// Node statistics container.
///
/// Shared between the controller and the stats server thread. All fields
/// are atomics, so no locking is needed.
#[derive(Debug)]
pub struct NodeStats {
    start_time: Instant,
    /// Device address (hex).
    pub dev_addr: String,
    pub uplink: UplinkStats,
    pub downlink: DownlinkStats,
    /// MAC events that had no effect.
    pub ignored_events: AtomicUsize,
}

impl NodeStats {
    pub fn new(dev_addr: String) -> Self {
        Self {
            start_time: Instant::now(),
            dev_addr,
            uplink: UplinkStats::default(),
            downlink: DownlinkStats::default(),
            ignored_events: AtomicUsize::new(0),
        }
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Bump a counter.
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Serialize all statistics to JSON.
    pub fn to_json(&self) -> String {
        format!(
            r#"{{"uptime_secs":{},"dev_addr":"{}","uplink":{},"downlink":{},"events":{{"ignored":{}}}}}"#,
            self.uptime_secs(),
            self.dev_addr,
            self.uplink.to_json(),
            self.downlink.to_json(),
            self.ignored_events.load(Ordering::Relaxed)
        )
    }
}

impl Default for NodeStats {
    fn default() -> Self {
        Self::new("unknown".to_string())
    }
}

/// HTTP stats server.
///
/// Runs in a background thread and serves node statistics as JSON.
pub struct StatsServer {
    local_addr: Option<SocketAddr>,
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl StatsServer {
    /// Start the stats server on `bind_addr` (0.0.0.0 if `None`).
    ///
    /// Drop the returned handle to stop the server.
    pub fn start(
        bind_addr: Option<IpAddr>,
        port: u16,
        stats: Arc<NodeStats>,
    ) -> Result<Self, std::io::Error> {
        let addr = match bind_addr {
            Some(ip) => format!("{}:{}", ip, port),
            None => format!("0.0.0.0:{}", port),
        };

        let server = Server::http(&addr)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::AddrInUse, format!("{}", e)))?;

        let local_addr = server.server_addr().to_ip();
        info!(
            "Stats server listening on http://{}/stats",
            local_addr.map_or(addr, |a| a.to_string())
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let handle = thread::spawn(move || {
            Self::run_server(server, stats, shutdown_clone);
        });

        Ok(Self {
            local_addr,
            handle: Some(handle),
            shutdown,
        })
    }

    /// Address the server is bound to. Resolves port 0 to the assigned port.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn run_server(server: Server, stats: Arc<NodeStats>, shutdown: Arc<AtomicBool>) {
        let (content_type, location, allow_get) = match (
            Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]),
            Header::from_bytes(&b"Location"[..], &b"/stats"[..]),
            Header::from_bytes(&b"Allow"[..], &b"GET"[..]),
        ) {
            (Ok(a), Ok(b), Ok(c)) => (a, b, c),
            _ => {
                error!("Failed to build response headers");
                return;
            }
        };

        loop {
            if shutdown.load(Ordering::Acquire) {
                info!("Stats server shutting down");
                break;
            }

            match server.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(Some(request)) => {
                    if request.method() != &Method::Get {
                        let response = Response::from_string("Method Not Allowed")
                            .with_status_code(405)
                            .with_header(allow_get.clone());
                        let _ = request.respond(response);
                        continue;
                    }

                    let path = request.url();
                    let response = if path == "/stats" || path == "/stats/" {
                        Response::from_string(stats.to_json())
                            .with_header(content_type.clone())
                            .with_status_code(200)
                    } else if path == "/" {
                        Response::from_string("See /stats for node statistics")
                            .with_status_code(302)
                            .with_header(location.clone())
                    } else {
                        Response::from_string("Not Found").with_status_code(404)
                    };

                    if let Err(e) = request.respond(response) {
                        warn!("Failed to send response: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Server error: {}", e);
                    break;
                }
            }
        }
    }

    /// Stop the server. May take up to 100ms due to the polling interval.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatsServer {
    fn drop(&mut self) {
        self.stop();
    }
}
