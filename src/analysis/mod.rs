//! Status and energy analysis over stored telemetry.
//!
//! Everything here is synchronous and works on in-memory sample windows.
//! Storage is reached only through the [`TelemetryStore`] handle passed in
//! by the caller.

mod energy;
mod history;
mod outlier;
mod partition;
mod sample;
mod segment;
mod snapshot;
mod status;

pub use energy::*;
pub use history::*;
pub use outlier::*;
pub use partition::*;
pub use sample::*;
pub use segment::*;
pub use snapshot::*;
pub use status::*;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::db::DbError;

/// Analysis error types.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("invalid timestamp {0:?}, expected YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp(String),
    #[error("no tariff registered for device {0}")]
    TariffNotFound(String),
    #[error("samples out of order at index {index} ({timestamp})")]
    UnsortedInput { index: usize, timestamp: String },
    #[error("storage error: {0}")]
    Store(#[from] DbError),
}

/// Tunables that differ between deployments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisConfig {
    pub bands: DayNightBands,
    /// Assumed polling cadence used for the kWh conversion.
    pub samples_per_hour: f64,
    /// Skip zero readings when summing online energy.
    pub require_positive_power: bool,
    pub totals: TotalsCombination,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bands: DayNightBands::default(),
            samples_per_hour: 60.0,
            require_positive_power: true,
            totals: TotalsCombination::Summed,
        }
    }
}

/// Storage seen by the analysis engine.
pub trait TelemetryStore {
    /// Samples for a device in `[start, end]`, oldest first. Missing bounds
    /// are unbounded.
    fn samples(
        &self,
        device_id: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Sample>, DbError>;

    fn tariff(&self, device_id: &str) -> Result<Option<f64>, DbError>;

    fn upsert_snapshot(&self, snapshot: &StatisticsSnapshot) -> Result<(), DbError>;
}
