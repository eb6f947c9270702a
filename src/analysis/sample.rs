//! Telemetry sample types and the textual timestamp form.

use chrono::{NaiveDateTime, Timelike};
use serde::{Serialize, Serializer};

use super::AnalysisError;

/// Timestamp pattern shared with the store and the HTTP API.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Serialized label for a device that stopped reporting.
pub const CONNECTION_LOST: &str = "Connection lost";

/// Online state reported by a plug.
///
/// `Disconnected` covers every reading where the upstream API gave no usable
/// `online` flag; it segments like any other status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Online,
    Offline,
    Disconnected,
}

impl Status {
    /// Map the nullable stored flag.
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Status::Online,
            Some(false) => Status::Offline,
            None => Status::Disconnected,
        }
    }

    pub fn as_flag(self) -> Option<bool> {
        match self {
            Status::Online => Some(true),
            Status::Offline => Some(false),
            Status::Disconnected => None,
        }
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Status::Online => serializer.serialize_bool(true),
            Status::Offline => serializer.serialize_bool(false),
            Status::Disconnected => serializer.serialize_str(CONNECTION_LOST),
        }
    }
}

/// A single telemetry reading for one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub device_id: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    pub online: Status,
    pub power: f64,
    pub voltage: f64,
    pub current: f64,
}

impl Sample {
    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }
}

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, AnalysisError> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map_err(|_| AnalysisError::InvalidTimestamp(s.to_string()))
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn serialize_timestamp<S: Serializer>(
    ts: &NaiveDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(ts))
}

pub(crate) fn serialize_opt_timestamp<S: Serializer>(
    ts: &Option<NaiveDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match ts {
        Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
        None => serializer.serialize_none(),
    }
}

/// Stable-sort samples by timestamp, keeping arrival order for ties.
pub fn normalize(samples: &mut [Sample]) {
    samples.sort_by_key(|s| s.timestamp);
}

/// Reject input whose timestamps go backwards.
pub fn ensure_sorted(samples: &[Sample]) -> Result<(), AnalysisError> {
    match samples
        .windows(2)
        .position(|pair| pair[1].timestamp < pair[0].timestamp)
    {
        Some(idx) => Err(AnalysisError::UnsortedInput {
            index: idx + 1,
            timestamp: format_timestamp(&samples[idx + 1].timestamp),
        }),
        None => Ok(()),
    }
}

/// Round half to even at `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round_ties_even() / factor
}
