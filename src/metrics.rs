//! Request events, the bounded metric sink, and the histogram aggregator.
//!
//! Workers offer events without blocking; a full sink drops the event rather
//! than stalling request generation, which is the measurement target. A
//! single aggregator task drains the channel, so histogram state has exactly
//! one writer and the reporter only ever takes read locks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use hdrhistogram::Histogram;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Default bound on buffered events. Sized to absorb bursts from a few
/// thousand workers; raise it if drops bias a measurement.
pub const SINK_CAPACITY: usize = 10_000;

/// Histogram range: 1 microsecond to 60 seconds, 3 significant digits.
const LATENCY_MIN_MICROS: u64 = 1;
const LATENCY_MAX_MICROS: u64 = 60_000_000;
const LATENCY_SIGFIGS: u8 = 3;

/// One completed (or failed) HTTP request, as observed by a worker.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    /// Action name; buckets the metric.
    pub name: String,
    pub method: String,
    pub url: String,
    pub start: Instant,
    pub end: Instant,
    /// 0 when no response was received.
    pub status: u16,
    pub bytes_read: u64,
    /// `None` on success; a short human-readable descriptor otherwise.
    pub error: Option<String>,
}

impl RequestEvent {
    /// Success means no error descriptor and a non-redirect-failure status.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..400).contains(&self.status)
    }

    pub fn latency(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }
}

/// Worker-side handle to the metric channel.
#[derive(Debug, Clone)]
pub struct Sink {
    tx: mpsc::Sender<RequestEvent>,
}

impl Sink {
    /// Non-blocking submit; the event is dropped when the channel is full or
    /// the aggregator is gone.
    pub fn offer(&self, event: RequestEvent) {
        let _ = self.tx.try_send(event);
    }
}

/// Create the bounded worker-to-aggregator channel.
pub fn sink(capacity: usize) -> (Sink, mpsc::Receiver<RequestEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Sink { tx }, rx)
}

/// Per-action aggregate. Counters are atomics and the histogram sits behind
/// its own lock, so the aggregator writes and the reporter reads without
/// touching the collector-level map lock.
#[derive(Debug)]
pub struct ActionStats {
    pub name: String,
    total_ok: AtomicU64,
    total_errors: AtomicU64,
    bytes_total: AtomicU64,
    histogram: Mutex<Histogram<u64>>,
}

impl ActionStats {
    fn new(name: String) -> Self {
        let histogram =
            Histogram::new_with_bounds(LATENCY_MIN_MICROS, LATENCY_MAX_MICROS, LATENCY_SIGFIGS)
                .expect("static histogram bounds are valid");
        ActionStats {
            name,
            total_ok: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            bytes_total: AtomicU64::new(0),
            histogram: Mutex::new(histogram),
        }
    }

    fn record(&self, event: &RequestEvent) {
        if event.is_success() {
            self.total_ok.fetch_add(1, Ordering::Relaxed);
            let micros = event.latency().as_micros() as u64;
            // Outliers clamp to the histogram bounds; documented lossy
            // behavior at the extremes.
            self.histogram
                .lock()
                .expect("histogram lock")
                .saturating_record(micros);
        } else {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_total.fetch_add(event.bytes_read, Ordering::Relaxed);
    }

    pub fn total_ok(&self) -> u64 {
        self.total_ok.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total.load(Ordering::Relaxed)
    }

    /// Latency at the given percentile (0-100) among successful requests.
    pub fn percentile(&self, q: f64) -> Duration {
        let micros = self
            .histogram
            .lock()
            .expect("histogram lock")
            .value_at_quantile(q / 100.0);
        Duration::from_micros(micros)
    }
}

/// Central aggregate: lazily-created per-action stats behind a read-write
/// lock. The drain task is the single writer of histogram state.
#[derive(Debug)]
pub struct Collector {
    actions: RwLock<HashMap<String, Arc<ActionStats>>>,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    pub fn new() -> Self {
        Collector {
            actions: RwLock::new(HashMap::new()),
        }
    }

    /// Drain the sink until every [`Sink`] handle has been dropped.
    pub async fn drain(&self, mut rx: mpsc::Receiver<RequestEvent>) {
        while let Some(event) = rx.recv().await {
            self.stats_for(&event.name).record(&event);
        }
    }

    fn stats_for(&self, name: &str) -> Arc<ActionStats> {
        if let Some(stats) = self.actions.read().expect("stats map lock").get(name) {
            return Arc::clone(stats);
        }
        let mut actions = self.actions.write().expect("stats map lock");
        Arc::clone(
            actions
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(ActionStats::new(name.to_owned()))),
        )
    }

    /// Shallow copy of the stats map, sorted by action name.
    pub fn snapshot(&self) -> Vec<Arc<ActionStats>> {
        let mut stats: Vec<_> = self
            .actions
            .read()
            .expect("stats map lock")
            .values()
            .cloned()
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, status: u16, latency: Duration, error: Option<&str>) -> RequestEvent {
        let start = Instant::now();
        RequestEvent {
            name: name.to_owned(),
            method: "GET".to_owned(),
            url: "http://example/ping".to_owned(),
            start,
            end: start + latency,
            status,
            bytes_read: 5,
            error: error.map(str::to_owned),
        }
    }

    #[test]
    fn success_requires_2xx_3xx_and_no_error() {
        assert!(event("a", 200, Duration::ZERO, None).is_success());
        assert!(event("a", 399, Duration::ZERO, None).is_success());
        assert!(!event("a", 400, Duration::ZERO, None).is_success());
        assert!(!event("a", 500, Duration::ZERO, None).is_success());
        assert!(!event("a", 0, Duration::ZERO, Some("connect refused")).is_success());
        assert!(!event("a", 200, Duration::ZERO, Some("expected status 302, got 200")).is_success());
    }

    #[tokio::test]
    async fn counts_partition_into_ok_and_err() {
        let collector = Collector::new();
        let (sink, rx) = sink(64);

        for i in 0..10 {
            let status = if i % 2 == 0 { 200 } else { 500 };
            sink.offer(event("Ping", status, Duration::from_millis(5), None));
        }
        drop(sink);
        collector.drain(rx).await;

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.len(), 1);
        let stats = &snapshot[0];
        assert_eq!(stats.name, "Ping");
        assert_eq!(stats.total_ok(), 5);
        assert_eq!(stats.total_errors(), 5);
        assert_eq!(stats.total_ok() + stats.total_errors(), 10);
        assert_eq!(stats.bytes_total(), 50);
    }

    #[tokio::test]
    async fn overflow_drops_instead_of_blocking() {
        let collector = Collector::new();
        let (sink, rx) = sink(4);

        // Nothing is draining yet, so only the channel capacity survives.
        for _ in 0..100 {
            sink.offer(event("Burst", 200, Duration::from_millis(1), None));
        }
        drop(sink);
        collector.drain(rx).await;

        let stats = collector.snapshot().pop().unwrap();
        assert_eq!(stats.total_ok(), 4);
    }

    #[tokio::test]
    async fn latency_outliers_clamp_to_bounds() {
        let collector = Collector::new();
        let (sink, rx) = sink(4);
        sink.offer(event("Slow", 200, Duration::from_secs(3600), None));
        drop(sink);
        collector.drain(rx).await;

        let stats = collector.snapshot().pop().unwrap();
        assert_eq!(stats.total_ok(), 1);
        let p50 = stats.percentile(50.0);
        assert!(p50 <= Duration::from_secs(61), "{p50:?}");
        assert!(p50 >= Duration::from_secs(59), "{p50:?}");
    }

    #[tokio::test]
    async fn percentiles_order() {
        let collector = Collector::new();
        let (sink, rx) = sink(256);
        for ms in 1..=100u64 {
            sink.offer(event("Sweep", 200, Duration::from_millis(ms), None));
        }
        drop(sink);
        collector.drain(rx).await;

        let stats = collector.snapshot().pop().unwrap();
        let p50 = stats.percentile(50.0);
        let p99 = stats.percentile(99.0);
        assert!(p50 < p99);
        assert!(p99 <= Duration::from_millis(101));
    }
}
