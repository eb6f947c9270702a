//! Online/offline/disconnected duration totals.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::partition::{partition, DayNightBands};
use super::sample::{serialize_opt_timestamp, Sample, Status};
use super::segment::{segment, Elapsed, StatusDuration};
use super::AnalysisConfig;

/// How the day and night buckets are combined into the totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TotalsCombination {
    /// `total = day + night` for every bucket.
    #[default]
    Summed,
    /// Offline and disconnected totals are twice the night value, as in
    /// snapshots written by the earlier service.
    LegacyNightDoubled,
}

/// Seconds per status bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusTotals {
    pub online_seconds: i64,
    pub offline_seconds: i64,
    pub disconnected_seconds: i64,
}

impl StatusTotals {
    pub fn combine(day: &Self, night: &Self, mode: TotalsCombination) -> Self {
        match mode {
            TotalsCombination::Summed => Self {
                online_seconds: day.online_seconds + night.online_seconds,
                offline_seconds: day.offline_seconds + night.offline_seconds,
                disconnected_seconds: day.disconnected_seconds + night.disconnected_seconds,
            },
            TotalsCombination::LegacyNightDoubled => Self {
                online_seconds: day.online_seconds + night.online_seconds,
                offline_seconds: night.offline_seconds + night.offline_seconds,
                disconnected_seconds: night.disconnected_seconds + night.disconnected_seconds,
            },
        }
    }
}

/// Sum run lengths into status buckets.
pub fn sum_by_status(durations: &[StatusDuration]) -> StatusTotals {
    durations
        .iter()
        .fold(StatusTotals::default(), |mut totals, d| {
            let secs = d.elapsed.total_seconds();
            match d.status {
                Status::Online => totals.online_seconds += secs,
                Status::Offline => totals.offline_seconds += secs,
                Status::Disconnected => totals.disconnected_seconds += secs,
            }
            totals
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationReport {
    pub seconds: i64,
    pub formatted: String,
}

impl From<i64> for DurationReport {
    fn from(seconds: i64) -> Self {
        Self {
            seconds,
            formatted: Elapsed::from_seconds(seconds).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketReport {
    pub online: DurationReport,
    pub offline: DurationReport,
    pub connection_lost: DurationReport,
}

impl From<StatusTotals> for BucketReport {
    fn from(t: StatusTotals) -> Self {
        Self {
            online: t.online_seconds.into(),
            offline: t.offline_seconds.into(),
            connection_lost: t.disconnected_seconds.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    #[serde(serialize_with = "serialize_opt_timestamp")]
    pub start_time: Option<NaiveDateTime>,
    #[serde(serialize_with = "serialize_opt_timestamp")]
    pub end_time: Option<NaiveDateTime>,
    pub daytime: BucketReport,
    pub nighttime: BucketReport,
    pub total: BucketReport,
}

/// Segment, split by band and total a sorted sample window.
pub fn calculate_statistics(
    samples: &[Sample],
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    config: &AnalysisConfig,
) -> StatusReport {
    let (day, night) = day_night_totals(samples, config.bands);
    let total = StatusTotals::combine(&day, &night, config.totals);

    StatusReport {
        start_time: start.or_else(|| samples.first().map(|s| s.timestamp)),
        end_time: end.or_else(|| samples.last().map(|s| s.timestamp)),
        daytime: day.into(),
        nighttime: night.into(),
        total: total.into(),
    }
}

pub fn day_night_totals(samples: &[Sample], bands: DayNightBands) -> (StatusTotals, StatusTotals) {
    let durations = segment(samples);
    let (day, night) = partition(&durations, samples, bands);
    (sum_by_status(&day), sum_by_status(&night))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::sample::fixtures::*;

    fn minutes(day: &str, from: &str, count: u32, status: Status) -> Vec<Sample> {
        let start = ts(&format!("{} {}", day, from));
        (0..count)
            .map(|m| {
                let at = start + chrono::Duration::minutes(m as i64);
                sample(&crate::analysis::format_timestamp(&at), status, 1.0)
            })
            .collect()
    }

    #[test]
    fn test_sum_by_status_scenario() {
        let samples = vec![
            sample("2024-01-01 00:00:00", Status::Online, 10.0),
            sample("2024-01-01 00:01:00", Status::Online, 10.0),
            sample("2024-01-01 00:02:00", Status::Offline, 0.0),
        ];
        let totals = sum_by_status(&segment(&samples));
        assert_eq!(totals.online_seconds, 60);
        assert_eq!(totals.offline_seconds, 0);
        assert_eq!(totals.disconnected_seconds, 0);
    }

    #[test]
    fn test_day_and_night_totals() {
        // online 16:30-17:29, offline 17:30-18:29
        let mut samples = minutes("2024-02-02", "16:30:00", 60, Status::Online);
        samples.extend(minutes("2024-02-02", "17:30:00", 60, Status::Offline));

        let (day, night) = day_night_totals(&samples, DayNightBands::default());
        assert_eq!(day.online_seconds, 29 * 60);
        assert_eq!(night.online_seconds, 29 * 60);
        assert_eq!(night.offline_seconds, 59 * 60);
        assert_eq!(day.offline_seconds, 0);
    }

    #[test]
    fn test_totals_combination_modes() {
        let day = StatusTotals {
            online_seconds: 100,
            offline_seconds: 10,
            disconnected_seconds: 1,
        };
        let night = StatusTotals {
            online_seconds: 200,
            offline_seconds: 20,
            disconnected_seconds: 2,
        };

        let summed = StatusTotals::combine(&day, &night, TotalsCombination::Summed);
        assert_eq!(summed.online_seconds, 300);
        assert_eq!(summed.offline_seconds, 30);
        assert_eq!(summed.disconnected_seconds, 3);

        let legacy = StatusTotals::combine(&day, &night, TotalsCombination::LegacyNightDoubled);
        assert_eq!(legacy.online_seconds, 300);
        assert_eq!(legacy.offline_seconds, 40);
        assert_eq!(legacy.disconnected_seconds, 4);
    }

    #[test]
    fn test_report_bounds_and_format() {
        let samples = minutes("2024-02-02", "08:00:00", 91, Status::Online);
        let report = calculate_statistics(&samples, None, None, &AnalysisConfig::default());
        assert_eq!(report.start_time, Some(ts("2024-02-02 08:00:00")));
        assert_eq!(report.end_time, Some(ts("2024-02-02 09:30:00")));
        assert_eq!(report.total.online.seconds, 90 * 60);
        assert_eq!(report.total.online.formatted, "1 hours, 30 minutes, 0 seconds");

        let empty = calculate_statistics(&[], None, None, &AnalysisConfig::default());
        assert_eq!(empty.start_time, None);
        assert_eq!(empty.total.online.seconds, 0);
    }

    #[test]
    fn test_report_is_deterministic() {
        let mut samples = minutes("2024-02-02", "16:00:00", 120, Status::Online);
        samples.extend(minutes("2024-02-02", "18:00:00", 30, Status::Disconnected));
        let config = AnalysisConfig::default();

        let first = serde_json::to_string(&calculate_statistics(&samples, None, None, &config)).unwrap();
        let second = serde_json::to_string(&calculate_statistics(&samples, None, None, &config)).unwrap();
        assert_eq!(first, second);
    }
}
