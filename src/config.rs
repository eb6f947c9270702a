//! Configuration module for plugwatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use chrono_tz::Tz;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::analysis::{AnalysisConfig, DayNightBands, TotalsCombination};

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "plugwatch.db")
    pub db_path: String,
    /// Vendor `thing` endpoint polled for readings
    pub api_endpoint: String,
    /// Bearer token used for devices without their own
    pub api_token: Option<String>,
    pub poll_interval: Duration,
    pub stats_interval: Duration,
    pub request_timeout: Duration,
    /// Zone in which sample timestamps and calendar windows are taken
    pub timezone: Tz,
    pub bands: DayNightBands,
    pub samples_per_hour: f64,
    pub require_positive_power: bool,
    pub legacy_night_totals: bool,
    pub notify_endpoint: Option<String>,
    pub notify_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "plugwatch.db".to_string(),
            api_endpoint: "https://eu-apia.coolkit.cc/v2/device/thing".to_string(),
            api_token: None,
            poll_interval: Duration::from_secs(60),
            stats_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(10),
            timezone: Tz::UTC,
            bands: DayNightBands::default(),
            samples_per_hour: 60.0,
            require_positive_power: true,
            legacy_night_totals: false,
            notify_endpoint: None,
            notify_token: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Every variable is prefixed `PLUGWATCH_`; unparseable values keep the
    /// default.
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = parse(&get, "PLUGWATCH_HTTP_PORT") {
            cfg.http_port = port;
        }
        if let Some(db_path) = get("PLUGWATCH_DB_PATH") {
            cfg.db_path = db_path;
        }
        if let Some(endpoint) = get("PLUGWATCH_API_ENDPOINT") {
            cfg.api_endpoint = endpoint;
        }
        cfg.api_token = get("PLUGWATCH_API_TOKEN");

        if let Some(secs) = parse::<u64, _>(&get, "PLUGWATCH_POLL_INTERVAL_SECS").filter(|s| *s > 0) {
            cfg.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64, _>(&get, "PLUGWATCH_STATS_INTERVAL_SECS").filter(|s| *s > 0) {
            cfg.stats_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64, _>(&get, "PLUGWATCH_REQUEST_TIMEOUT_SECS").filter(|s| *s > 0) {
            cfg.request_timeout = Duration::from_secs(secs);
        }
        if let Some(tz) = parse(&get, "PLUGWATCH_TIMEZONE") {
            cfg.timezone = tz;
        }

        let start = parse(&get, "PLUGWATCH_DAY_START_HOUR").unwrap_or(cfg.bands.day_start_hour);
        let end = parse(&get, "PLUGWATCH_DAY_END_HOUR").unwrap_or(cfg.bands.day_end_hour);
        match DayNightBands::new(start, end) {
            Some(bands) => cfg.bands = bands,
            None => tracing::warn!(
                "Invalid day band {}..{}, using {}..{}",
                start,
                end,
                cfg.bands.day_start_hour,
                cfg.bands.day_end_hour
            ),
        }

        if let Some(n) = parse::<f64, _>(&get, "PLUGWATCH_SAMPLES_PER_HOUR").filter(|n| *n > 0.0) {
            cfg.samples_per_hour = n;
        }
        if let Some(flag) = get("PLUGWATCH_REQUIRE_POSITIVE_POWER").and_then(|v| parse_bool(&v)) {
            cfg.require_positive_power = flag;
        }
        if let Some(flag) = get("PLUGWATCH_LEGACY_NIGHT_TOTALS").and_then(|v| parse_bool(&v)) {
            cfg.legacy_night_totals = flag;
        }

        cfg.notify_endpoint = get("PLUGWATCH_NOTIFY_ENDPOINT");
        cfg.notify_token = get("PLUGWATCH_NOTIFY_TOKEN");

        cfg
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            bands: self.bands,
            samples_per_hour: self.samples_per_hour,
            require_positive_power: self.require_positive_power,
            totals: if self.legacy_night_totals {
                TotalsCombination::LegacyNightDoubled
            } else {
                TotalsCombination::Summed
            },
        }
    }
}

fn parse<T, G>(get: &G, key: &str) -> Option<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
