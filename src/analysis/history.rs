//! Per-run status history as served to clients.

use serde::Serialize;

use super::sample::{Sample, Status};
use super::segment::{segment, StatusDuration};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusTransition {
    pub status: Status,
    pub duration: String,
    pub start_date: String,
    pub start_time: String,
    pub last_updated_date: String,
    pub last_updated_time: String,
}

impl From<&StatusDuration> for StatusTransition {
    fn from(d: &StatusDuration) -> Self {
        Self {
            status: d.status,
            duration: d.elapsed.to_string(),
            start_date: d.start.format("%Y-%m-%d").to_string(),
            start_time: d.start.format("%H:%M:%S").to_string(),
            last_updated_date: d.end.format("%Y-%m-%d").to_string(),
            last_updated_time: d.end.format("%H:%M:%S").to_string(),
        }
    }
}

pub fn status_history(samples: &[Sample]) -> Vec<StatusTransition> {
    segment(samples).iter().map(StatusTransition::from).collect()
}

/// The run the device is currently in, if it ever reported.
pub fn current_status(samples: &[Sample]) -> Option<StatusTransition> {
    segment(samples).last().map(StatusTransition::from)
}
