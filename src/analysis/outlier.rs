//! Detection of hours where power runs above the window average.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use super::energy::mean;
use super::sample::{round_to, serialize_timestamp, Sample, Status};

/// Above-average hours keyed by `YYYY-MM-DD`.
pub type DaysAboveAverage = BTreeMap<String, Vec<HourBucket>>;

/// Readings above the window average within one hour of one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourBucket {
    pub hour: u32,
    /// Sum of gaps between consecutive above-average readings.
    pub duration_seconds: i64,
    /// Mean of the above-average readings in this hour.
    pub power_values: f64,
    /// Window average the readings were compared against.
    pub avg_power: f64,
    #[serde(serialize_with = "serialize_timestamp")]
    pub start_timestamp: NaiveDateTime,
    #[serde(serialize_with = "serialize_timestamp")]
    pub end_timestamp: NaiveDateTime,
}

/// Whether the sample's calendar date falls within the bounds' dates.
pub(crate) fn in_date_range(
    sample: &Sample,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> bool {
    let date = sample.timestamp.date();
    start.map_or(true, |s| date >= s.date()) && end.map_or(true, |e| date <= e.date())
}

pub fn above_average_hours(
    samples: &[Sample],
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> DaysAboveAverage {
    let online: Vec<&Sample> = samples
        .iter()
        .filter(|s| s.online == Status::Online && in_date_range(s, start, end))
        .collect();

    let powers: Vec<f64> = online.iter().map(|s| s.power).collect();
    let avg_power = match mean(&powers) {
        Some(avg) => round_to(avg, 2),
        None => return DaysAboveAverage::new(),
    };

    let mut buckets: BTreeMap<(NaiveDate, u32), Vec<&Sample>> = BTreeMap::new();
    for s in online.into_iter().filter(|s| s.power > avg_power) {
        buckets
            .entry((s.timestamp.date(), s.hour()))
            .or_default()
            .push(s);
    }

    let mut days = DaysAboveAverage::new();
    for ((date, hour), mut members) in buckets {
        members.sort_by_key(|s| s.timestamp);

        let duration_seconds = members
            .windows(2)
            .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_seconds())
            .sum();
        let readings: Vec<f64> = members.iter().map(|s| s.power).collect();
        let (first, last) = match (members.first(), members.last()) {
            (Some(first), Some(last)) => (first.timestamp, last.timestamp),
            _ => continue,
        };

        days.entry(date.format("%Y-%m-%d").to_string())
            .or_default()
            .push(HourBucket {
                hour,
                duration_seconds,
                power_values: mean(&readings).map_or(0.0, |m| round_to(m, 2)),
                avg_power,
                start_timestamp: first,
                end_timestamp: last,
            });
    }

    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::sample::fixtures::*;

    #[test]
    fn test_buckets_by_day_and_hour() {
        let samples = vec![
            sample("2024-07-01 09:00:00", Status::Online, 10.0),
            sample("2024-07-01 09:01:00", Status::Online, 100.0),
            sample("2024-07-01 09:02:00", Status::Online, 100.0),
            sample("2024-07-01 09:04:00", Status::Online, 100.0),
            sample("2024-07-01 10:00:00", Status::Online, 10.0),
            sample("2024-07-02 14:30:00", Status::Online, 80.0),
            sample("2024-07-02 15:00:00", Status::Offline, 900.0),
        ];
        let days = above_average_hours(&samples, None, None);
        // average over online readings: 400 / 6 = 66.67
        assert_eq!(days.len(), 2);

        let first = &days["2024-07-01"];
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].hour, 9);
        assert_eq!(first[0].duration_seconds, 180);
        assert_eq!(first[0].power_values, 100.0);
        assert_eq!(first[0].avg_power, 66.67);
        assert_eq!(first[0].start_timestamp, ts("2024-07-01 09:01:00"));
        assert_eq!(first[0].end_timestamp, ts("2024-07-01 09:04:00"));

        let second = &days["2024-07-02"];
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].hour, 14);
        assert_eq!(second[0].duration_seconds, 0);
    }

    #[test]
    fn test_date_bounds_are_inclusive() {
        let samples = vec![
            sample("2024-07-01 23:59:00", Status::Online, 1.0),
            sample("2024-07-02 00:00:00", Status::Online, 50.0),
            sample("2024-07-02 00:05:00", Status::Online, 10.0),
            sample("2024-07-03 00:00:00", Status::Online, 1000.0),
        ];
        let start = Some(ts("2024-07-02 12:00:00"));
        let end = Some(ts("2024-07-02 12:00:00"));
        let days = above_average_hours(&samples, start, end);
        assert_eq!(days.len(), 1);
        assert_eq!(days["2024-07-02"][0].power_values, 50.0);
        assert_eq!(days["2024-07-02"][0].avg_power, 30.0);
    }

    #[test]
    fn test_flat_power_has_no_outliers() {
        let samples: Vec<_> = (0..10)
            .map(|m| sample(&format!("2024-07-01 09:{:02}:00", m), Status::Online, 42.0))
            .collect();
        assert!(above_average_hours(&samples, None, None).is_empty());
        assert!(above_average_hours(&[], None, None).is_empty());
    }
}
