//! Command-line flag surface.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Scripted HTTP load generator. Simulated users replay a YAML scenario
/// against a target while keeping browser-like session state (cookies, CSRF
/// tokens, persistent headers), and per-action latency percentiles are
/// reported at the end.
#[derive(Debug, Clone, Parser)]
#[command(name = "barrage", version, about)]
pub struct Config {
    /// Number of concurrent simulated users
    #[arg(long, default_value_t = 10)]
    pub users: u32,

    /// Requests per second per user (0 = unlimited)
    #[arg(long, default_value_t = 1)]
    pub rps: u32,

    /// Test duration (e.g. 30s, 5m)
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub duration: Duration,

    /// Path to the scenario script
    #[arg(long)]
    pub script: PathBuf,

    /// Optional login endpoint, POSTed once per worker before the scenario
    #[arg(long)]
    pub login_url: Option<String>,

    /// Authentication header attached to every request (format: name:value)
    #[arg(long = "login-hdr")]
    pub login_hdr: Option<String>,

    /// Write a JSON report to this path
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Show a live progress line
    #[arg(long)]
    pub verbose: bool,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure_tls: bool,

    /// Path to a credentials file (username,password per line)
    #[arg(long)]
    pub credentials: Option<PathBuf>,
}

impl Config {
    /// The `--login-hdr` flag split into a (name, value) pair; a value
    /// without a colon is ignored.
    pub fn login_header(&self) -> Option<(String, String)> {
        let raw = self.login_hdr.as_deref()?;
        let (name, value) = raw.split_once(':')?;
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() {
            return None;
        }
        Some((name.to_owned(), value.to_owned()))
    }
}
