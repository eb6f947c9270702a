//! Telemetry module for smart-plug polling.
//!
//! Fetches one reading per device from the vendor cloud and posts
//! status-change notifications.

mod client;
mod notify;

pub use client::*;
pub use notify::*;

use chrono::NaiveDateTime;
use std::time::Duration;
use thiserror::Error;

use crate::analysis::{Sample, Status};

/// Telemetry error types.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("bad response: {0}")]
    BadResponse(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TelemetryError {
    fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            TelemetryError::Timeout(timeout)
        } else if e.is_status() || e.is_decode() {
            TelemetryError::BadResponse(e.to_string())
        } else {
            TelemetryError::Network(e.to_string())
        }
    }
}

/// One observation of a plug, before it is stamped and stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub online: Status,
    pub power: f64,
    pub voltage: f64,
    pub current: f64,
}

impl Reading {
    /// What gets recorded when the upstream API could not be reached.
    pub fn connection_lost() -> Self {
        Self {
            online: Status::Disconnected,
            power: 0.0,
            voltage: 0.0,
            current: 0.0,
        }
    }

    pub fn into_sample(self, device_id: &str, timestamp: NaiveDateTime) -> Sample {
        Sample {
            device_id: device_id.to_string(),
            timestamp,
            online: self.online,
            power: self.power,
            voltage: self.voltage,
            current: self.current,
        }
    }
}
