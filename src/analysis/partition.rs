//! Day/night partitioning of segmented runs.

use super::sample::Sample;
use super::segment::{segment_iter, StatusDuration};

/// Hour-of-day boundaries of the daytime band.
///
/// Daytime is `[day_start_hour, day_end_hour)`; everything else is night.
/// A start later than the end wraps the day band across midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayNightBands {
    pub day_start_hour: u32,
    pub day_end_hour: u32,
}

impl Default for DayNightBands {
    fn default() -> Self {
        Self {
            day_start_hour: 0,
            day_end_hour: 17,
        }
    }
}

impl DayNightBands {
    /// Build a band pair, rejecting hours past 24 and empty bands.
    pub fn new(day_start_hour: u32, day_end_hour: u32) -> Option<Self> {
        if day_start_hour > 24 || day_end_hour > 24 || day_start_hour == day_end_hour {
            return None;
        }
        Some(Self {
            day_start_hour,
            day_end_hour,
        })
    }

    pub fn is_day(&self, hour: u32) -> bool {
        if self.day_start_hour <= self.day_end_hour {
            self.day_start_hour <= hour && hour < self.day_end_hour
        } else {
            hour >= self.day_start_hour || hour < self.day_end_hour
        }
    }
}

/// Split each run's samples by band and re-segment each band.
///
/// `all_samples` must be the sorted series `durations` was built from. Each
/// run collects every sample in `[start, end]` on its own, so a sample whose
/// timestamp is shared by two adjacent runs is seen by both.
pub fn partition(
    durations: &[StatusDuration],
    all_samples: &[Sample],
    bands: DayNightBands,
) -> (Vec<StatusDuration>, Vec<StatusDuration>) {
    let mut day = Vec::new();
    let mut night = Vec::new();

    for duration in durations {
        let from = all_samples.partition_point(|s| s.timestamp < duration.start);
        let to = all_samples.partition_point(|s| s.timestamp <= duration.end);
        let members = &all_samples[from..to.max(from)];

        day.extend(segment_iter(members.iter().filter(|s| bands.is_day(s.hour()))));
        night.extend(segment_iter(members.iter().filter(|s| !bands.is_day(s.hour()))));
    }

    (day, night)
}

/// Sample-level split by band, in input order.
pub fn split_samples<'a>(
    samples: &'a [Sample],
    bands: DayNightBands,
) -> (Vec<&'a Sample>, Vec<&'a Sample>) {
    samples.iter().partition(|s| bands.is_day(s.hour()))
}
