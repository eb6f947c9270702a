//! Periodic statistics refresh for active devices.

use crate::analysis::{build_snapshot, AnalysisConfig, AnalysisError};
use crate::db::Store;

use chrono::NaiveDate;
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use super::local_now;

/// Outcome of one refresh pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Manager that recomputes every active device's snapshot on an interval.
pub struct StatisticsManager {
    store: Arc<Store>,
    config: AnalysisConfig,
    timezone: Tz,
    interval: Duration,
}

impl StatisticsManager {
    pub fn new(store: Arc<Store>, config: AnalysisConfig, timezone: Tz, interval: Duration) -> Self {
        Self {
            store,
            config,
            timezone,
            interval,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Today's date in the configured zone.
    pub fn today(&self) -> NaiveDate {
        local_now(&self.timezone).date()
    }

    /// Start the refresh background task.
    pub fn start(&self) {
        let store = self.store.clone();
        let config = self.config;
        let timezone = self.timezone;
        let period = self.interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                let today = local_now(&timezone).date();
                let summary = refresh_all(&store, config, today).await;
                tracing::info!(
                    "StatisticsManager: refreshed {}, skipped {}, failed {}",
                    summary.refreshed,
                    summary.skipped,
                    summary.failed
                );
            }
        });
    }
}

/// Rebuild snapshots for all active devices concurrently.
pub async fn refresh_all(store: &Arc<Store>, config: AnalysisConfig, today: NaiveDate) -> RefreshSummary {
    let mut summary = RefreshSummary::default();

    let devices = match store.get_active_devices() {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("StatisticsManager: Failed to get devices: {}", e);
            return summary;
        }
    };

    let mut tasks = JoinSet::new();
    for device in devices {
        let store = store.clone();
        tasks.spawn_blocking(move || {
            let result = build_snapshot(store.as_ref(), &device.device_id, today, &config);
            (device.device_id, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(_))) => summary.refreshed += 1,
            Ok((device_id, Err(AnalysisError::TariffNotFound(_)))) => {
                tracing::debug!("No tariff for {}, skipping statistics", device_id);
                summary.skipped += 1;
            }
            Ok((device_id, Err(e))) => {
                tracing::error!("Statistics failed for {}: {}", device_id, e);
                summary.failed += 1;
            }
            Err(e) => {
                tracing::error!("Statistics task panicked: {}", e);
                summary.failed += 1;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{parse_timestamp, Sample, Status};
    use crate::db::Device;
    use tempfile::NamedTempFile;

    fn add(store: &Store, device_id: &str, tariff: Option<f64>, active: bool) {
        store
            .add_device(&Device {
                device_id: device_id.to_string(),
                tariff,
                active,
                ..Default::default()
            })
            .unwrap();
        store
            .add_samples(&[Sample {
                device_id: device_id.to_string(),
                timestamp: parse_timestamp("2024-05-01 08:00:00").unwrap(),
                online: Status::Online,
                power: 120.0,
                voltage: 230.0,
                current: 0.5,
            }])
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_all_active_devices() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        add(&store, "plug-1", Some(0.2), true);
        add(&store, "plug-2", None, true);
        add(&store, "plug-3", Some(0.2), false);

        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let summary = refresh_all(&store, AnalysisConfig::default(), today).await;
        assert_eq!(
            summary,
            RefreshSummary {
                refreshed: 1,
                skipped: 1,
                failed: 0
            }
        );

        assert!(store.get_statistics("plug-1").unwrap().is_some());
        assert!(store.get_statistics("plug-2").unwrap().is_none());
        assert!(store.get_statistics("plug-3").unwrap().is_none());
    }
}
