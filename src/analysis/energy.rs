//! Energy totals, pricing and power metrics.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::outlier::{above_average_hours, in_date_range, DaysAboveAverage};
use super::sample::{round_to, serialize_opt_timestamp, Sample, Status};
use super::AnalysisConfig;

/// Energy drawn while online and its price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyUsage {
    pub kwh: f64,
    pub cost: f64,
}

/// Power figures over the online samples of a window.
///
/// All three scalars are `None` when the window holds no online samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerMetrics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub average: Option<f64>,
    pub days_above_average: DaysAboveAverage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyReport {
    #[serde(serialize_with = "serialize_opt_timestamp")]
    pub start_time: Option<NaiveDateTime>,
    #[serde(serialize_with = "serialize_opt_timestamp")]
    pub end_time: Option<NaiveDateTime>,
    pub power_usage: EnergyUsage,
    pub power_metrics: PowerMetrics,
}

/// Convert summed readings to kWh assuming a fixed sampling cadence.
pub fn to_kwh(sum_power_watts: f64, samples_per_hour: f64) -> f64 {
    (sum_power_watts / 1000.0) * (1.0 / samples_per_hour)
}

pub fn energy(samples: &[Sample], tariff: f64, config: &AnalysisConfig) -> EnergyUsage {
    let total_online_power: f64 = samples
        .iter()
        .filter(|s| s.online == Status::Online)
        .filter(|s| !config.require_positive_power || s.power > 0.0)
        .map(|s| s.power)
        .sum();

    let kwh = round_to(to_kwh(total_online_power, config.samples_per_hour), 7);
    EnergyUsage {
        kwh,
        cost: round_to(kwh * tariff, 2),
    }
}

pub fn power_metrics(
    samples: &[Sample],
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> PowerMetrics {
    let readings: Vec<f64> = samples
        .iter()
        .filter(|s| s.online == Status::Online && in_date_range(s, start, end))
        .map(|s| s.power)
        .collect();

    let (min, max, average) = match mean(&readings) {
        Some(avg) => {
            let min = readings.iter().copied().fold(f64::INFINITY, f64::min);
            let max = readings.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (Some(round_to(min, 2)), Some(round_to(max, 2)), Some(round_to(avg, 2)))
        }
        None => (None, None, None),
    };

    PowerMetrics {
        min,
        max,
        average,
        days_above_average: above_average_hours(samples, start, end),
    }
}

/// Full energy report for one window.
pub fn calculate_energy_statistics(
    samples: &[Sample],
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    tariff: f64,
    config: &AnalysisConfig,
) -> EnergyReport {
    EnergyReport {
        start_time: start.or_else(|| samples.first().map(|s| s.timestamp)),
        end_time: end.or_else(|| samples.last().map(|s| s.timestamp)),
        power_usage: energy(samples, tariff, config),
        power_metrics: power_metrics(samples, start, end),
    }
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::sample::fixtures::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_one_hour_at_100_watts() {
        let start = ts("2024-06-01 10:00:00");
        let samples: Vec<_> = (0..60)
            .map(|m| {
                let at = start + chrono::Duration::minutes(m);
                sample(&crate::analysis::format_timestamp(&at), Status::Online, 100.0)
            })
            .collect();

        let usage = energy(&samples, 0.5, &AnalysisConfig::default());
        assert_relative_eq!(usage.kwh, 0.1, epsilon = 1e-9);
        assert_relative_eq!(usage.cost, 0.05, epsilon = 1e-9);
    }

    #[test]
    fn test_only_online_energy_counts() {
        let samples = vec![
            sample("2024-06-01 10:00:00", Status::Online, 600.0),
            sample("2024-06-01 10:01:00", Status::Offline, 600.0),
            sample("2024-06-01 10:02:00", Status::Disconnected, 600.0),
        ];
        let usage = energy(&samples, 10.0, &AnalysisConfig::default());
        assert_relative_eq!(usage.kwh, 0.01, epsilon = 1e-9);
        assert_relative_eq!(usage.cost, 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_negative_readings_follow_positive_power_flag() {
        let samples = vec![
            sample("2024-06-01 10:00:00", Status::Online, 600.0),
            sample("2024-06-01 10:01:00", Status::Online, -60.0),
        ];

        let strict = energy(&samples, 10.0, &AnalysisConfig::default());
        assert_relative_eq!(strict.kwh, 0.01, epsilon = 1e-9);
        assert_relative_eq!(strict.cost, 0.1, epsilon = 1e-9);

        let lenient = AnalysisConfig {
            require_positive_power: false,
            ..Default::default()
        };
        let usage = energy(&samples, 10.0, &lenient);
        assert_relative_eq!(usage.kwh, 0.009, epsilon = 1e-9);
        assert_relative_eq!(usage.cost, 0.09, epsilon = 1e-9);
        assert!(usage.kwh < strict.kwh);
    }

    #[test]
    fn test_samples_per_hour_is_configurable() {
        let samples = vec![sample("2024-06-01 10:00:00", Status::Online, 1000.0)];
        let config = AnalysisConfig {
            samples_per_hour: 12.0,
            ..Default::default()
        };
        let usage = energy(&samples, 1.0, &config);
        assert_relative_eq!(usage.kwh, round_to(1.0 / 12.0, 7), epsilon = 1e-12);
    }

    #[test]
    fn test_no_online_samples() {
        let samples = vec![
            sample("2024-06-01 10:00:00", Status::Offline, 0.0),
            sample("2024-06-01 10:01:00", Status::Disconnected, 0.0),
        ];
        let usage = energy(&samples, 10.0, &AnalysisConfig::default());
        assert_eq!(usage.kwh, 0.0);
        assert_eq!(usage.cost, 0.0);

        let metrics = power_metrics(&samples, None, None);
        assert_eq!((metrics.min, metrics.max, metrics.average), (None, None, None));
        assert!(metrics.days_above_average.is_empty());
    }

    #[test]
    fn test_power_metrics_rounding() {
        let samples = vec![
            sample("2024-06-01 10:00:00", Status::Online, 10.004),
            sample("2024-06-01 10:01:00", Status::Online, 20.0),
            sample("2024-06-01 10:02:00", Status::Online, 30.0),
            sample("2024-06-01 10:03:00", Status::Offline, 500.0),
        ];
        let metrics = power_metrics(&samples, None, None);
        assert_eq!(metrics.min, Some(10.0));
        assert_eq!(metrics.max, Some(30.0));
        assert_eq!(metrics.average, Some(20.0));
    }

    #[test]
    fn test_energy_report_window_bounds() {
        let samples = vec![sample("2024-06-01 10:00:00", Status::Online, 60.0)];
        let start = Some(ts("2024-06-01 00:00:00"));
        let end = Some(ts("2024-06-01 23:59:59"));
        let report = calculate_energy_statistics(&samples, start, end, 2.0, &AnalysisConfig::default());
        assert_eq!(report.start_time, start);
        assert_eq!(report.end_time, end);
        assert_eq!(report.power_usage.kwh, 0.001);
    }
}
