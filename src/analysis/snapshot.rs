//! Day/week/month/year statistics snapshots.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use super::energy::{calculate_energy_statistics, EnergyReport};
use super::sample::{normalize, Sample};
use super::status::{calculate_statistics, StatusReport};
use super::{AnalysisConfig, AnalysisError, TelemetryStore};

/// Calendar windows ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Day,
    Week,
    Month,
    Year,
}

impl Window {
    pub const ALL: [Window; 4] = [Window::Day, Window::Week, Window::Month, Window::Year];

    pub fn start_date(self, today: NaiveDate) -> NaiveDate {
        match self {
            Window::Day => today,
            Window::Week => today - Duration::days(today.weekday().num_days_from_monday() as i64),
            Window::Month => today - Duration::days(today.day0() as i64),
            Window::Year => today - Duration::days(today.ordinal0() as i64),
        }
    }

    /// `[start 00:00:00, today 23:59:59]`.
    pub fn bounds(self, today: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        (start_of_day(self.start_date(today)), end_of_day(today))
    }
}

pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

pub fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    start_of_day(date) + Duration::seconds(86_399)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSet<T> {
    pub day: T,
    pub week: T,
    pub month: T,
    pub year: T,
}

/// Everything served for one device, recomputed from raw samples each run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub device_id: String,
    pub current_tariff: f64,
    pub energy_statistics: WindowSet<EnergyReport>,
    pub status_statistics: WindowSet<StatusReport>,
}

/// Build a snapshot from the year-to-date samples of one device.
///
/// `samples` must cover at least `Window::Year` and be sorted.
pub fn compute_snapshot(
    device_id: &str,
    tariff: f64,
    samples: &[Sample],
    today: NaiveDate,
    config: &AnalysisConfig,
) -> StatisticsSnapshot {
    let reports = Window::ALL.map(|window| {
        let (start, end) = window.bounds(today);
        let from = samples.partition_point(|s| s.timestamp < start);
        let to = samples.partition_point(|s| s.timestamp <= end);
        let slice = &samples[from..to.max(from)];
        (
            calculate_energy_statistics(slice, Some(start), Some(end), tariff, config),
            calculate_statistics(slice, Some(start), Some(end), config),
        )
    });
    let [day, week, month, year] = reports;

    StatisticsSnapshot {
        device_id: device_id.to_string(),
        current_tariff: tariff,
        energy_statistics: WindowSet {
            day: day.0,
            week: week.0,
            month: month.0,
            year: year.0,
        },
        status_statistics: WindowSet {
            day: day.1,
            week: week.1,
            month: month.1,
            year: year.1,
        },
    }
}

/// Read, analyze and upsert the snapshot for one device.
pub fn build_snapshot<S: TelemetryStore + ?Sized>(
    store: &S,
    device_id: &str,
    today: NaiveDate,
    config: &AnalysisConfig,
) -> Result<StatisticsSnapshot, AnalysisError> {
    let tariff = require_tariff(store, device_id)?;
    let (start, end) = Window::Year.bounds(today);
    let samples = load_window(store, device_id, Some(start), Some(end))?;

    let snapshot = compute_snapshot(device_id, tariff, &samples, today, config);
    store.upsert_snapshot(&snapshot)?;

    tracing::debug!(
        "Stored statistics for {} ({} samples this year)",
        device_id,
        samples.len()
    );
    Ok(snapshot)
}

/// Status statistics for an arbitrary window.
pub fn status_statistics<S: TelemetryStore + ?Sized>(
    store: &S,
    device_id: &str,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    config: &AnalysisConfig,
) -> Result<StatusReport, AnalysisError> {
    let samples = load_window(store, device_id, start, end)?;
    Ok(calculate_statistics(&samples, start, end, config))
}

/// Energy statistics for an arbitrary window, priced at the device tariff.
pub fn energy_statistics<S: TelemetryStore + ?Sized>(
    store: &S,
    device_id: &str,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    config: &AnalysisConfig,
) -> Result<EnergyReport, AnalysisError> {
    let tariff = require_tariff(store, device_id)?;
    let samples = load_window(store, device_id, start, end)?;
    Ok(calculate_energy_statistics(&samples, start, end, tariff, config))
}

/// Fetch a window and restore timestamp order.
pub fn load_window<S: TelemetryStore + ?Sized>(
    store: &S,
    device_id: &str,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Result<Vec<Sample>, AnalysisError> {
    let mut samples = store.samples(device_id, start, end)?;
    normalize(&mut samples);
    Ok(samples)
}

fn require_tariff<S: TelemetryStore + ?Sized>(
    store: &S,
    device_id: &str,
) -> Result<f64, AnalysisError> {
    store
        .tariff(device_id)?
        .ok_or_else(|| AnalysisError::TariffNotFound(device_id.to_string()))
}
