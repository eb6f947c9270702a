//! Scheduler module for polling plugs and refreshing statistics.

mod statistics;

pub use statistics::*;

use crate::analysis::{format_timestamp, Sample, Status};
use crate::config::ServerConfig;
use crate::db::{Device, Store};
use crate::telemetry::{Notifier, Reading, StatusChange, TelemetryClient, TelemetryError};

use chrono::{NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

/// Shared pieces every poll loop needs.
#[derive(Clone)]
struct PollContext {
    client: TelemetryClient,
    notifier: Option<Notifier>,
    interval: Duration,
    timezone: Tz,
}

/// The main scheduler that orchestrates device polling.
pub struct Scheduler {
    store: Arc<Store>,
    context: PollContext,
    stop_chans: Arc<RwLock<HashMap<String, tokio::sync::broadcast::Sender<()>>>>,
    sample_tx: mpsc::Sender<Sample>,
    statistics_manager: Arc<StatisticsManager>,
}

impl Scheduler {
    /// Create a new scheduler with the given store.
    pub fn new(store: Arc<Store>, cfg: &ServerConfig) -> Result<Self, TelemetryError> {
        let client = TelemetryClient::new(&cfg.api_endpoint, cfg.api_token.clone(), cfg.request_timeout)?;
        let notifier = match &cfg.notify_endpoint {
            Some(endpoint) => Some(Notifier::new(endpoint, cfg.notify_token.clone(), cfg.request_timeout)?),
            None => None,
        };

        let (tx, rx) = mpsc::channel(1000);
        tokio::spawn(run_batch_writer(rx, store.clone()));

        let statistics_manager = Arc::new(StatisticsManager::new(
            store.clone(),
            cfg.analysis_config(),
            cfg.timezone,
            cfg.stats_interval,
        ));

        Ok(Self {
            store,
            context: PollContext {
                client,
                notifier,
                interval: cfg.poll_interval,
                timezone: cfg.timezone,
            },
            stop_chans: Arc::new(RwLock::new(HashMap::new())),
            sample_tx: tx,
            statistics_manager,
        })
    }

    /// Start polling every active device.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let devices = self.store.get_active_devices()?;

        tracing::info!("Starting scheduler with {} active devices", devices.len());

        for device in devices {
            self.add_device(device).await;
        }

        self.statistics_manager.start();

        Ok(())
    }

    pub fn statistics(&self) -> &StatisticsManager {
        &self.statistics_manager
    }

    /// Begin polling a device. Inactive or already running devices are skipped.
    pub async fn add_device(&self, device: Device) {
        if !device.active {
            return;
        }

        let mut stop_chans = self.stop_chans.write().await;

        if stop_chans.contains_key(&device.device_id) {
            return; // Already running
        }

        let (stop_tx, _) = tokio::sync::broadcast::channel(1);
        stop_chans.insert(device.device_id.clone(), stop_tx.clone());
        drop(stop_chans);

        tracing::info!("Scheduler: Adding device {}", device.device_id);

        // Seed change detection with whatever was last recorded
        let previous = match self.store.latest_sample(&device.device_id) {
            Ok(sample) => sample.map(|s| s.online),
            Err(e) => {
                tracing::warn!("Could not read last sample for {}: {}", device.device_id, e);
                None
            }
        };

        let context = self.context.clone();
        let sample_tx = self.sample_tx.clone();
        let device_id = device.device_id.clone();
        let stop_chans = self.stop_chans.clone();
        let stop_rx = stop_tx.subscribe();

        tokio::spawn(async move {
            run_poll_loop(device, previous, context, sample_tx, stop_rx).await;

            // Clean up when done
            let mut chans = stop_chans.write().await;
            chans.remove(&device_id);
        });
    }

    /// Stop polling a device.
    pub async fn remove_device(&self, device_id: &str) {
        let mut stop_chans = self.stop_chans.write().await;

        if let Some(stop_tx) = stop_chans.remove(device_id) {
            let _ = stop_tx.send(());
            tracing::info!("Scheduler: Removed device {}", device_id);
        }
    }

    pub async fn polled_devices(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.stop_chans.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Current wall-clock time in `tz`, truncated to whole seconds.
pub fn local_now(tz: &Tz) -> NaiveDateTime {
    let now = Utc::now().with_timezone(tz).naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// A notification is due when a definite status differs from the last one.
fn status_changed(previous: Option<Status>, current: Status) -> bool {
    current != Status::Disconnected && previous != Some(current)
}

/// Run the poll loop for a single device.
async fn run_poll_loop(
    device: Device,
    mut previous: Option<Status>,
    context: PollContext,
    tx: mpsc::Sender<Sample>,
    mut stop_rx: tokio::sync::broadcast::Receiver<()>,
) {
    // Spread devices out instead of hitting the API all at once
    let jitter = rand::random::<u64>() % 1000;
    tokio::time::sleep(Duration::from_millis(jitter)).await;

    let mut interval = tokio::time::interval(context.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                break;
            }
            _ = interval.tick() => {
                let timestamp = local_now(&context.timezone);
                let reading = match context.client.fetch(&device).await {
                    Ok(reading) => reading,
                    Err(e) => {
                        tracing::warn!("Poll failed for {}: {}", device.device_id, e);
                        Reading::connection_lost()
                    }
                };

                if status_changed(previous, reading.online) {
                    tracing::info!(
                        "Status change for {}: {:?} -> {:?}",
                        device.device_id,
                        previous,
                        reading.online
                    );
                    if let Some(notifier) = &context.notifier {
                        let notifier = notifier.clone();
                        let change = StatusChange {
                            start_time: format_timestamp(&timestamp),
                            device_id: device.device_id.clone(),
                            status: reading.online,
                        };
                        tokio::spawn(async move {
                            if let Err(e) = notifier.send(&change).await {
                                tracing::error!("Failed to notify status change for {}: {}", change.device_id, e);
                            }
                        });
                    }
                }
                previous = Some(reading.online);

                if tx.send(reading.into_sample(&device.device_id, timestamp)).await.is_err() {
                    tracing::error!("Failed to send sample for {}", device.device_id);
                }
            }
        }
    }
}

/// Run the batch writer that accumulates and flushes samples.
async fn run_batch_writer(mut rx: mpsc::Receiver<Sample>, store: Arc<Store>) {
    let mut buffer: Vec<Sample> = Vec::with_capacity(100);
    let mut interval = tokio::time::interval(Duration::from_secs(2));

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Some(s) => {
                        buffer.push(s);
                        if buffer.len() % FLUSH_ROWS == 0 {
                            flush_buffer(&store, &mut buffer);
                        }
                    }
                    None => {
                        // Channel closed, flush remaining and exit
                        flush_buffer(&store, &mut buffer);
                        break;
                    }
                }
            }
            _ = interval.tick() => {
                flush_buffer(&store, &mut buffer);
            }
        }
    }
}

/// Buffered rows that trigger an early flush.
const FLUSH_ROWS: usize = 500;

/// Samples kept for retry while the store is failing.
const MAX_PENDING_SAMPLES: usize = 10_000;

/// Write the buffer out. Failed rows stay buffered for the next tick.
fn flush_buffer(store: &Store, buffer: &mut Vec<Sample>) {
    if buffer.is_empty() {
        return;
    }

    match store.add_samples(buffer) {
        Ok(()) => buffer.clear(),
        Err(e) => {
            tracing::error!("Failed to flush {} samples: {}", buffer.len(), e);
            let dropped = trim_pending(buffer, MAX_PENDING_SAMPLES);
            if dropped > 0 {
                tracing::warn!("Dropped {} oldest pending samples", dropped);
            }
        }
    }
}

/// Drop the oldest samples beyond `cap`, returning how many went.
fn trim_pending(buffer: &mut Vec<Sample>, cap: usize) -> usize {
    let excess = buffer.len().saturating_sub(cap);
    buffer.drain(..excess);
    excess
}
