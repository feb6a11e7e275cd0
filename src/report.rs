//! Live progress line, final summary table, and the JSON report file.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Error;
use crate::metrics::{ActionStats, Collector};

pub struct Reporter {
    collector: Arc<Collector>,
    started: Instant,
    started_at: chrono::DateTime<chrono::Utc>,
    verbose: bool,
}

impl Reporter {
    pub fn new(collector: Arc<Collector>, verbose: bool) -> Self {
        Reporter {
            collector,
            started: Instant::now(),
            started_at: chrono::Utc::now(),
            verbose,
        }
    }

    /// Start the once-per-second progress line. Quiet runs get no task.
    pub fn spawn_progress(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.verbose {
            return None;
        }
        let collector = Arc::clone(&self.collector);
        let started = self.started;
        Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval_at(
                Instant::now() + Duration::from_secs(1),
                Duration::from_secs(1),
            );
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = tick.tick() => show_progress(&collector, started),
                    _ = cancel.cancelled() => break,
                }
            }
        }))
    }

    /// The terminal table. Always runs on shutdown, interrupt included.
    pub fn print_final(&self) {
        println!("\n\nFinal Test Results:");
        println!("==================");

        let stats = self.collector.snapshot();
        if stats.is_empty() {
            println!("No requests were made.");
            return;
        }

        println!(
            "{:<15} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
            "Action", "OK", "ERR", "p50", "p90", "p95", "p99", "RPS"
        );
        println!("{}", "─".repeat(88));

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut total_ok = 0u64;
        let mut total_err = 0u64;
        let mut total_bytes = 0u64;

        for stat in &stats {
            println!(
                "{:<15} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8.1}",
                truncate(&stat.name, 15),
                stat.total_ok(),
                stat.total_errors(),
                format_duration(stat.percentile(50.0)),
                format_duration(stat.percentile(90.0)),
                format_duration(stat.percentile(95.0)),
                format_duration(stat.percentile(99.0)),
                stat.total_ok() as f64 / elapsed,
            );
            total_ok += stat.total_ok();
            total_err += stat.total_errors();
            total_bytes += stat.bytes_total();
        }

        println!("{}", "─".repeat(88));

        let total_requests = total_ok + total_err;
        let success_rate = success_rate(total_ok, total_requests);
        println!(
            "\nTotals: {} requests, {:.1}% success, {:.0}s, {:.1} rps, avg {}",
            total_requests,
            success_rate,
            elapsed,
            total_ok as f64 / elapsed,
            format_duration(average_latency(&stats)),
        );

        if total_bytes > 0 {
            let mib = total_bytes as f64 / (1024.0 * 1024.0);
            println!(
                "Data transferred: {:.2} MiB ({:.2} MiB/s)",
                mib,
                mib / elapsed
            );
        }
    }

    /// Write the structured JSON report.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let report = self.build_report();
        let json = serde_json::to_string_pretty(&report).expect("report serializes");
        std::fs::write(path, json).map_err(|source| Error::ReportWrite {
            path: path.to_owned(),
            source,
        })?;
        info!(path = %path.display(), "results saved");
        Ok(())
    }

    fn build_report(&self) -> FileReport {
        let stats = self.collector.snapshot();
        let elapsed = self.started.elapsed().as_secs_f64();

        let mut total_ok = 0u64;
        let mut total_err = 0u64;
        let mut total_bytes = 0u64;
        let mut actions = BTreeMap::new();

        for stat in &stats {
            total_ok += stat.total_ok();
            total_err += stat.total_errors();
            total_bytes += stat.bytes_total();
            actions.insert(
                stat.name.clone(),
                ActionReport {
                    total_ok: stat.total_ok(),
                    total_errors: stat.total_errors(),
                    bytes_total: stat.bytes_total(),
                    p50_ms: stat.percentile(50.0).as_millis() as u64,
                    p90_ms: stat.percentile(90.0).as_millis() as u64,
                    p95_ms: stat.percentile(95.0).as_millis() as u64,
                    p99_ms: stat.percentile(99.0).as_millis() as u64,
                    rps: stat.total_ok() as f64 / elapsed,
                },
            );
        }

        let total_requests = total_ok + total_err;
        FileReport {
            timestamp: self.started_at.to_rfc3339(),
            duration_sec: elapsed,
            actions,
            summary: Summary {
                total_requests,
                total_ok,
                total_errors: total_err,
                success_rate: success_rate(total_ok, total_requests),
                avg_rps: total_ok as f64 / elapsed,
                bytes_total: total_bytes,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct FileReport {
    timestamp: String,
    duration_sec: f64,
    actions: BTreeMap<String, ActionReport>,
    summary: Summary,
}

#[derive(Debug, Serialize)]
struct ActionReport {
    total_ok: u64,
    total_errors: u64,
    bytes_total: u64,
    p50_ms: u64,
    p90_ms: u64,
    p95_ms: u64,
    p99_ms: u64,
    rps: f64,
}

#[derive(Debug, Serialize)]
struct Summary {
    total_requests: u64,
    total_ok: u64,
    total_errors: u64,
    success_rate: f64,
    avg_rps: f64,
    bytes_total: u64,
}

fn show_progress(collector: &Collector, started: Instant) {
    let stats = collector.snapshot();
    let total_ok: u64 = stats.iter().map(|s| s.total_ok()).sum();
    let total_err: u64 = stats.iter().map(|s| s.total_errors()).sum();
    let elapsed = started.elapsed().as_secs_f64();
    let rps = if elapsed > 0.0 {
        total_ok as f64 / elapsed
    } else {
        0.0
    };

    print!(
        "\rElapsed: {:.0}s | Requests: {} | Errors: {} | Success: {:.1}% | RPS: {:.1}",
        elapsed,
        total_ok,
        total_err,
        success_rate(total_ok, total_ok + total_err),
        rps
    );
    let _ = std::io::stdout().flush();
}

fn success_rate(ok: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    ok as f64 / total as f64 * 100.0
}

/// Mean latency approximated by weighting each action's p50 by its success
/// count.
fn average_latency(stats: &[Arc<ActionStats>]) -> Duration {
    let mut weighted_micros = 0u128;
    let mut count = 0u64;
    for stat in stats {
        let ok = stat.total_ok();
        if ok > 0 {
            weighted_micros += stat.percentile(50.0).as_micros() * u128::from(ok);
            count += ok;
        }
    }
    if count == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros((weighted_micros / u128::from(count)) as u64)
}

/// Sub-millisecond prints as µs, sub-second as ms, longer as seconds with
/// one decimal.
fn format_duration(d: Duration) -> String {
    if d < Duration::from_micros(1) {
        "0µs".to_owned()
    } else if d < Duration::from_millis(1) {
        format!("{}µs", d.as_micros())
    } else if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_owned()
    } else {
        format!("{}...", &s[..max - 3])
    }
}
