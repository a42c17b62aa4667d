//! Minimal runtime configuration helpers.
//! Everything comes from environment variables with sensible local defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_SOURCE_URL: &str = "https://www.iust.ac.in/";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_INGEST_RETRY_DELAY_SECS: u64 = 30;
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_DASHBOARD_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding `buildings.csv` and `rainfall_log.csv`.
    pub data_dir: PathBuf,
    /// Page the ingestion job scrapes for the day's rainfall figure.
    pub source_url: String,
    /// Timeout on the source fetch.
    pub fetch_timeout: Duration,
    /// Pause before the ingestion job's single retry.
    pub ingest_retry_delay: Duration,
    /// Bind address for the dashboard server.
    pub listen_addr: SocketAddr,
    /// Public base URL embedded in QR-encoded dashboard links.
    pub dashboard_base_url: String,
    /// Where `rainharvest qr` writes the per-building PNGs.
    pub qr_output_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let data_dir = PathBuf::from(
            std::env::var("RAINHARVEST_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string()),
        );

        let source_url =
            std::env::var("RAINFALL_SOURCE_URL").unwrap_or_else(|_| DEFAULT_SOURCE_URL.to_string());

        let fetch_timeout_secs = parse_secs("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?;
        let retry_delay_secs =
            parse_secs("INGEST_RETRY_DELAY_SECS", DEFAULT_INGEST_RETRY_DELAY_SECS)?;

        let listen_raw =
            std::env::var("HTTP_LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr: SocketAddr = listen_raw
            .parse()
            .map_err(|_| format!("HTTP_LISTEN_ADDR is not a socket address: `{}`", listen_raw))?;

        let dashboard_base_url = std::env::var("DASHBOARD_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_DASHBOARD_BASE_URL.to_string());

        let qr_output_dir = std::env::var("QR_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("qr_codes"));

        Ok(Config {
            data_dir,
            source_url,
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            ingest_retry_delay: Duration::from_secs(retry_delay_secs),
            listen_addr,
            dashboard_base_url,
            qr_output_dir,
        })
    }

    pub fn buildings_path(&self) -> PathBuf {
        self.data_dir.join("buildings.csv")
    }

    pub fn rainfall_log_path(&self) -> PathBuf {
        self.data_dir.join("rainfall_log.csv")
    }
}

fn parse_secs(var: &str, default: u64) -> Result<u64, String> {
    match std::env::var(var) {
        Ok(s) if !s.trim().is_empty() => s
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("{} must be a whole number of seconds, got `{}`", var, s)),
        _ => Ok(default),
    }
}
