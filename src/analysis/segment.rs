//! Collapse a sample series into same-status runs.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::sample::{serialize_timestamp, Sample, Status};

/// Whole hours, minutes and seconds of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Elapsed {
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Elapsed {
    pub fn between(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self::from_seconds((end - start).num_seconds())
    }

    pub fn from_seconds(total: i64) -> Self {
        let hours = total / 3600;
        let remainder = total % 3600;
        Self {
            hours,
            minutes: remainder / 60,
            seconds: remainder % 60,
        }
    }

    pub fn total_seconds(&self) -> i64 {
        self.hours * 3600 + self.minutes * 60 + self.seconds
    }
}

impl std::fmt::Display for Elapsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} hours, {} minutes, {} seconds",
            self.hours, self.minutes, self.seconds
        )
    }
}

/// A maximal run of samples sharing one status.
///
/// `end` is the last sample of the run, so `elapsed` leaves out the gap to
/// the next status change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusDuration {
    pub status: Status,
    #[serde(serialize_with = "serialize_timestamp")]
    pub start: NaiveDateTime,
    #[serde(serialize_with = "serialize_timestamp")]
    pub end: NaiveDateTime,
    pub elapsed: Elapsed,
}

impl StatusDuration {
    fn close(status: Status, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            status,
            start,
            end,
            elapsed: Elapsed::between(start, end),
        }
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// Segment `samples` (timestamp ascending) into status runs.
pub fn segment(samples: &[Sample]) -> Vec<StatusDuration> {
    segment_iter(samples.iter())
}

pub(crate) fn segment_iter<'a, I>(samples: I) -> Vec<StatusDuration>
where
    I: IntoIterator<Item = &'a Sample>,
{
    let mut durations = Vec::new();
    let mut run: Option<(Status, NaiveDateTime, NaiveDateTime)> = None;

    for sample in samples {
        run = match run {
            None => Some((sample.online, sample.timestamp, sample.timestamp)),
            Some((status, start, last_seen)) if status != sample.online => {
                durations.push(StatusDuration::close(status, start, last_seen));
                Some((sample.online, sample.timestamp, sample.timestamp))
            }
            Some((status, start, _)) => Some((status, start, sample.timestamp)),
        };
    }

    if let Some((status, start, last_seen)) = run {
        durations.push(StatusDuration::close(status, start, last_seen));
    }

    durations
}
