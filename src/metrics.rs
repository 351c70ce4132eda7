//! Runtime metrics aggregation
//!
//! Tracks heading sample throughput and capture session outcomes over a
//! rolling window, logs a summary per window, and optionally serves the
//! latest snapshot over a tiny hand-rolled HTTP endpoint.

use crate::config::MetricsFormat;
use crate::error::Result;
use serde::Serialize;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tracing::{info, warn};

const MIN_INTERVAL_SECS: u64 = 5;

static METRICS: OnceLock<Arc<Registry>> = OnceLock::new();
static LAST_SNAPSHOT: OnceLock<Mutex<Option<Snapshot>>> = OnceLock::new();

/// Outcome of a finished capture session, for aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent {
    /// Session completed with a detection
    Detected,
    /// Session dismissed by the user
    Cancelled,
    /// Session failed
    Failed,
}

/// Enable periodic metrics emission with the provided interval in seconds.
pub fn enable(interval_secs: u64) {
    let registry = Arc::clone(METRICS.get_or_init(|| Arc::new(Registry::new(interval_secs))));
    registry
        .interval_secs
        .store(interval_secs.max(MIN_INTERVAL_SECS), Ordering::Relaxed);
    registry.spawn_reporter();
}

/// Record a published heading sample magnitude.
pub fn record_heading(magnitude: f64) {
    if let Some(registry) = METRICS.get() {
        let mut window = registry.lock_window();
        window.heading_samples += 1;
        window.heading_last = Some(magnitude);
        if magnitude > window.heading_peak {
            window.heading_peak = magnitude;
        }
    }
}

/// Record the outcome and duration of a capture session.
pub fn record_scan(duration: Duration, event: ScanEvent) {
    if let Some(registry) = METRICS.get() {
        let mut window = registry.lock_window();
        window.scans_total += 1;
        match event {
            ScanEvent::Detected => {
                window.scans_detected += 1;
                window.detect_duration += duration;
            }
            ScanEvent::Cancelled => window.scans_cancelled += 1,
            ScanEvent::Failed => window.scans_failed += 1,
        }
    }
}

/// Spawn a lightweight HTTP endpoint that exposes the latest metrics snapshot.
pub fn spawn_http_endpoint(addr: SocketAddr, format: MetricsFormat) -> Result<()> {
    let std_listener = std::net::TcpListener::bind(addr)?;
    std_listener.set_nonblocking(true)?;
    let listener = TcpListener::from_std(std_listener)?;

    tokio::spawn(async move {
        serve(listener, format).await;
    });

    Ok(())
}

struct Registry {
    window: Mutex<Window>,
    interval_secs: AtomicU64,
    reporter_spawned: AtomicBool,
}

impl Registry {
    fn new(interval_secs: u64) -> Self {
        Self {
            window: Mutex::new(Window::new()),
            interval_secs: AtomicU64::new(interval_secs.max(MIN_INTERVAL_SECS)),
            reporter_spawned: AtomicBool::new(false),
        }
    }

    fn lock_window(&self) -> std::sync::MutexGuard<'_, Window> {
        self.window.lock().expect("metrics mutex poisoned")
    }

    fn snapshot(&self) -> Snapshot {
        self.lock_window().snapshot()
    }

    fn rotate_window(&self) -> Snapshot {
        let mut window = self.lock_window();
        let snapshot = window.snapshot();
        *window = Window::new();
        snapshot
    }

    /// Start the periodic reporter once; later `enable` calls only adjust
    /// the interval.
    fn spawn_reporter(self: &Arc<Self>) {
        if self.reporter_spawned.swap(true, Ordering::SeqCst) {
            return;
        }

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let secs = registry.interval_secs.load(Ordering::Relaxed);
                time::sleep(Duration::from_secs(secs)).await;

                let snapshot = registry.rotate_window();
                store_snapshot(&snapshot);
                snapshot.log();
            }
        });
    }
}

struct Window {
    heading_samples: u64,
    heading_peak: f64,
    heading_last: Option<f64>,
    scans_total: u64,
    scans_detected: u64,
    scans_cancelled: u64,
    scans_failed: u64,
    detect_duration: Duration,
    opened_at: Instant,
}

impl Window {
    fn new() -> Self {
        Self {
            heading_samples: 0,
            heading_peak: 0.0,
            heading_last: None,
            scans_total: 0,
            scans_detected: 0,
            scans_cancelled: 0,
            scans_failed: 0,
            detect_duration: Duration::ZERO,
            opened_at: Instant::now(),
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            elapsed: self.opened_at.elapsed(),
            heading_samples: self.heading_samples,
            heading_peak: self.heading_peak,
            heading_last: self.heading_last,
            scans_total: self.scans_total,
            scans_detected: self.scans_detected,
            scans_cancelled: self.scans_cancelled,
            scans_failed: self.scans_failed,
            detect_duration: self.detect_duration,
        }
    }
}

#[derive(Clone)]
struct Snapshot {
    elapsed: Duration,
    heading_samples: u64,
    heading_peak: f64,
    heading_last: Option<f64>,
    scans_total: u64,
    scans_detected: u64,
    scans_cancelled: u64,
    scans_failed: u64,
    detect_duration: Duration,
}

impl Snapshot {
    fn heading_rate_hz(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.heading_samples as f64 / secs
        } else {
            0.0
        }
    }

    fn avg_detect_latency_ms(&self) -> f64 {
        if self.scans_detected > 0 {
            self.detect_duration.as_secs_f64() * 1_000.0 / self.scans_detected as f64
        } else {
            0.0
        }
    }

    fn log(&self) {
        info!(
            target: "fieldscan::metrics",
            interval_secs = self.elapsed.as_secs(),
            heading_samples = self.heading_samples,
            heading_rate_hz = format_args!("{:.1}", self.heading_rate_hz()),
            heading_peak = self.heading_peak,
            scans_total = self.scans_total,
            scans_detected = self.scans_detected,
            scans_cancelled = self.scans_cancelled,
            scans_failed = self.scans_failed,
            avg_detect_latency_ms = self.avg_detect_latency_ms(),
            "Metrics window"
        );
    }

    fn to_report(&self) -> Report {
        Report {
            window_secs: self.elapsed.as_secs(),
            heading: HeadingReport {
                samples: self.heading_samples,
                rate_hz: self.heading_rate_hz(),
                peak_magnitude: self.heading_peak,
                last_magnitude: self.heading_last,
            },
            scans: ScanReport {
                total: self.scans_total,
                detected: self.scans_detected,
                cancelled: self.scans_cancelled,
                failed: self.scans_failed,
                avg_detect_latency_ms: self.avg_detect_latency_ms(),
            },
        }
    }

    fn to_prometheus(&self) -> String {
        let mut out = String::new();

        expose(
            &mut out,
            "fieldscan_window_seconds",
            "gauge",
            "Duration of the aggregation window in seconds",
            format_args!("{}", self.elapsed.as_secs()),
        );
        expose(
            &mut out,
            "fieldscan_heading_samples_total",
            "counter",
            "Heading samples published during the window",
            format_args!("{}", self.heading_samples),
        );
        expose(
            &mut out,
            "fieldscan_heading_peak_magnitude",
            "gauge",
            "Peak field magnitude in the window",
            format_args!("{:.6}", self.heading_peak),
        );

        let _ = writeln!(
            &mut out,
            "# HELP fieldscan_scans_total Capture sessions finished during the window"
        );
        let _ = writeln!(&mut out, "# TYPE fieldscan_scans_total counter");
        for (outcome, count) in [
            ("detected", self.scans_detected),
            ("cancelled", self.scans_cancelled),
            ("failed", self.scans_failed),
        ] {
            let _ = writeln!(
                &mut out,
                "fieldscan_scans_total{{outcome=\"{outcome}\"}} {count}"
            );
        }

        expose(
            &mut out,
            "fieldscan_detect_latency_avg_seconds",
            "gauge",
            "Average session duration until detection",
            format_args!("{:.6}", self.avg_detect_latency_ms() / 1_000.0),
        );

        out
    }
}

/// JSON shape served by the HTTP endpoint
#[derive(Serialize)]
struct Report {
    window_secs: u64,
    heading: HeadingReport,
    scans: ScanReport,
}

#[derive(Serialize)]
struct HeadingReport {
    samples: u64,
    rate_hz: f64,
    peak_magnitude: f64,
    last_magnitude: Option<f64>,
}

#[derive(Serialize)]
struct ScanReport {
    total: u64,
    detected: u64,
    cancelled: u64,
    failed: u64,
    avg_detect_latency_ms: f64,
}

fn expose(out: &mut String, name: &str, kind: &str, help: &str, value: std::fmt::Arguments<'_>) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    let _ = writeln!(out, "{name} {value}");
}

fn store_snapshot(snapshot: &Snapshot) {
    let slot = LAST_SNAPSHOT.get_or_init(|| Mutex::new(None));
    if let Ok(mut guard) = slot.lock() {
        *guard = Some(snapshot.clone());
    }
}

/// The last full window if one closed already, otherwise the live window.
fn current_snapshot() -> Option<Snapshot> {
    let slot = LAST_SNAPSHOT.get_or_init(|| Mutex::new(None));
    if let Ok(guard) = slot.lock() {
        if let Some(snapshot) = guard.as_ref() {
            return Some(snapshot.clone());
        }
    }

    METRICS.get().map(|registry| registry.snapshot())
}

async fn serve(listener: TcpListener, format: MetricsFormat) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(target: "fieldscan::metrics", error = %err, "metrics accept failed");
                time::sleep(Duration::from_millis(250)).await;
                continue;
            }
        };

        tokio::spawn(async move {
            if let Err(err) = respond(stream, format).await {
                tracing::debug!(target: "fieldscan::metrics", peer = %peer, error = %err, "metrics connection closed");
            }
        });
    }
}

async fn respond(mut stream: TcpStream, format: MetricsFormat) -> Result<()> {
    // Drain the request; every path gets the same answer.
    let mut request = [0u8; 1024];
    let _ = stream.read(&mut request).await?;

    let response = match current_snapshot() {
        Some(snapshot) => {
            let (content_type, body) = match format {
                MetricsFormat::Json => (
                    "application/json",
                    serde_json::to_vec(&snapshot.to_report())?,
                ),
                MetricsFormat::Prometheus => (
                    "text/plain; version=0.0.4",
                    snapshot.to_prometheus().into_bytes(),
                ),
            };

            let mut response = format!(
                "HTTP/1.1 200 OK\r\nConnection: close\r\nCache-Control: no-store\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
                body.len()
            )
            .into_bytes();
            response.extend_from_slice(&body);
            response
        }
        None => {
            b"HTTP/1.1 204 No Content\r\nConnection: close\r\nCache-Control: no-store\r\n\r\n"
                .to_vec()
        }
    };

    stream.write_all(&response).await?;
    stream.shutdown().await?;

    Ok(())
}
