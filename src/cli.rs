use crate::app::{self, PollTimings};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_NUMBER"));

#[derive(Parser, Debug)]
#[command(name = "tcw", version = VERSION, about = "Test Case Watcher TUI")]
pub struct Cli {
    /// Base URL of the test runner backend
    #[arg(
        short,
        long,
        env = "TCW_API_URL",
        default_value = "http://127.0.0.1:8000",
        value_parser = parse_base_url
    )]
    pub url: String,

    /// Path prefix in front of every API route (use "" to reach the backend without a proxy)
    #[arg(long, default_value = "/api")]
    pub api_prefix: String,

    /// Case list poll interval in milliseconds
    #[arg(
        short,
        long,
        default_value_t = app::CASE_POLL_INTERVAL_MS,
        value_parser = clap::value_parser!(u64).range(50..)
    )]
    pub interval_ms: u64,

    /// Log poll interval in milliseconds
    #[arg(
        long,
        default_value_t = app::LOG_POLL_INTERVAL_MS,
        value_parser = clap::value_parser!(u64).range(50..)
    )]
    pub log_interval_ms: u64,

    /// Delay between report readiness checks in milliseconds
    #[arg(
        long,
        default_value_t = app::DOWNLOAD_POLL_INTERVAL_MS,
        value_parser = clap::value_parser!(u64).range(50..)
    )]
    pub download_interval_ms: u64,

    /// Give up on a report after this many checks (0 = keep trying)
    #[arg(long, default_value_t = app::DOWNLOAD_MAX_ATTEMPTS)]
    pub download_attempts: u32,

    /// Directory downloaded reports are written to
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Disable desktop notifications
    #[arg(long)]
    pub no_notify: bool,

    /// Write debug logs to $XDG_STATE_HOME/tcw/debug.log
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn timings(&self) -> PollTimings {
        PollTimings {
            case_interval: Duration::from_millis(self.interval_ms),
            log_interval: Duration::from_millis(self.log_interval_ms),
            download_interval: Duration::from_millis(self.download_interval_ms),
            download_attempts: self.download_attempts,
            ..PollTimings::default()
        }
    }
}

/// Accepts `http://` and `https://` URLs with a host part.
pub fn parse_base_url(s: &str) -> Result<String, String> {
    let trimmed = s.trim().trim_end_matches('/');
    let rest = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .ok_or_else(|| format!("'{s}' must start with http:// or https://"))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(format!("'{s}' has no host"));
    }
    if rest.chars().any(char::is_whitespace) {
        return Err(format!("'{s}' contains whitespace"));
    }
    Ok(trimmed.to_string())
}
