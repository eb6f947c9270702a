//! HTTP request handlers.

use super::AppState;
use crate::analysis::{
    build_snapshot, current_status, energy_statistics, load_window, parse_timestamp,
    status_history, status_statistics, AnalysisError, EnergyReport, Sample, StatusReport,
    StatusTransition,
};
use crate::db::{DbError, Device};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced to API clients.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound => ApiError::NotFound("Device not found".to_string()),
            DbError::AlreadyExists(id) => ApiError::Conflict(format!("Device {} already exists", id)),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(e: AnalysisError) -> Self {
        match e {
            AnalysisError::InvalidTimestamp(_) | AnalysisError::UnsortedInput { .. } => {
                ApiError::BadRequest(e.to_string())
            }
            AnalysisError::TariffNotFound(_) => ApiError::NotFound(e.to_string()),
            AnalysisError::Store(db) => db.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Internal(m) => {
                tracing::error!("Request failed: {}", m);
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub devices: i64,
    pub samples: i64,
    pub db_size_bytes: i64,
    pub polling: usize,
}

pub async fn handle_health(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    let stats = state.store.get_sample_stats()?;
    Ok(Json(HealthResponse {
        status: "ok",
        devices: stats.devices,
        samples: stats.samples,
        db_size_bytes: stats.db_size_bytes,
        polling: state.scheduler.polled_devices().await.len(),
    }))
}

// ============================================================================
// API: Devices
// ============================================================================

pub async fn handle_get_devices(State(state): State<AppState>) -> ApiResult<Vec<Device>> {
    Ok(Json(state.store.get_devices()?))
}

#[derive(Debug, Deserialize)]
pub struct CreateDeviceRequest {
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tariff: Option<f64>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

pub async fn handle_create_device(
    State(state): State<AppState>,
    Json(req): Json<CreateDeviceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let device_id = req.device_id.trim().to_string();
    if device_id.is_empty() {
        return Err(ApiError::BadRequest("device_id is required".to_string()));
    }
    validate_tariff(req.tariff)?;

    let device = Device {
        device_id,
        name: req.name,
        tariff: req.tariff,
        api_token: req.api_token,
        active: req.active.unwrap_or(true),
        created_at: String::new(),
    };
    state.store.add_device(&device)?;

    let stored = state.store.get_device(&device.device_id)?;
    state.scheduler.add_device(stored.clone()).await;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Fields left out keep their stored value.
#[derive(Debug, Deserialize)]
pub struct UpdateDeviceRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tariff: Option<f64>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

pub async fn handle_update_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(req): Json<UpdateDeviceRequest>,
) -> ApiResult<Device> {
    validate_tariff(req.tariff)?;
    let existing = state.store.get_device(&device_id)?;

    let updated = Device {
        name: req.name.unwrap_or(existing.name),
        tariff: req.tariff.or(existing.tariff),
        api_token: req.api_token.or(existing.api_token),
        active: req.active.unwrap_or(existing.active),
        ..existing
    };
    state.store.update_device(&updated)?;

    // Restart polling so the loop picks up the new token and active flag
    state.scheduler.remove_device(&device_id).await;
    state.scheduler.add_device(updated.clone()).await;

    Ok(Json(updated))
}

pub async fn handle_delete_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.scheduler.remove_device(&device_id).await;
    state.store.delete_device(&device_id)?;
    Ok(StatusCode::NO_CONTENT)
}

fn validate_tariff(tariff: Option<f64>) -> Result<(), ApiError> {
    match tariff {
        Some(t) if !t.is_finite() || t < 0.0 => {
            Err(ApiError::BadRequest("tariff must be a non-negative number".to_string()))
        }
        _ => Ok(()),
    }
}

// ============================================================================
// API: Samples and status
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: Option<i64>,
}

impl WindowQuery {
    fn bounds(&self) -> Result<(Option<NaiveDateTime>, Option<NaiveDateTime>), ApiError> {
        let start = self.start.as_deref().map(parse_timestamp).transpose()?;
        let end = self.end.as_deref().map(parse_timestamp).transpose()?;
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(ApiError::BadRequest("start must not be after end".to_string()));
            }
        }
        Ok((start, end))
    }
}

pub async fn handle_get_samples(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<Vec<Sample>> {
    let (start, end) = query.bounds()?;
    state.store.get_device(&device_id)?;
    let limit = query.limit.map(|l| l.clamp(1, 100_000));
    Ok(Json(state.store.get_samples(&device_id, start, end, limit)?))
}

pub async fn handle_current_status(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Response, ApiError> {
    let (start, end) = query.bounds()?;
    state.store.get_device(&device_id)?;
    let samples = load_window(state.store.as_ref(), &device_id, start, end)?;

    match current_status(&samples) {
        Some(current) => Ok(Json(current).into_response()),
        None => Err(ApiError::NotFound(format!("No samples for device {}", device_id))),
    }
}

pub async fn handle_status_history(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<Vec<StatusTransition>> {
    let (start, end) = query.bounds()?;
    state.store.get_device(&device_id)?;
    let samples = load_window(state.store.as_ref(), &device_id, start, end)?;
    Ok(Json(status_history(&samples)))
}

// ============================================================================
// API: Statistics
// ============================================================================

/// Stored snapshot, built on first request.
pub async fn handle_get_statistics(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<serde_json::Value> {
    state.store.get_device(&device_id)?;
    if let Some(stored) = state.store.get_statistics(&device_id)? {
        return Ok(Json(stored));
    }
    refresh(&state, &device_id)
}

pub async fn handle_refresh_statistics(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<serde_json::Value> {
    state.store.get_device(&device_id)?;
    refresh(&state, &device_id)
}

fn refresh(state: &AppState, device_id: &str) -> ApiResult<serde_json::Value> {
    let statistics = state.scheduler.statistics();
    let snapshot = build_snapshot(
        state.store.as_ref(),
        device_id,
        statistics.today(),
        statistics.config(),
    )?;
    let value = serde_json::to_value(&snapshot).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(value))
}

pub async fn handle_status_statistics(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<StatusReport> {
    let (start, end) = query.bounds()?;
    state.store.get_device(&device_id)?;
    let config = state.config.analysis_config();
    Ok(Json(status_statistics(state.store.as_ref(), &device_id, start, end, &config)?))
}

pub async fn handle_energy_statistics(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<EnergyReport> {
    let (start, end) = query.bounds()?;
    state.store.get_device(&device_id)?;
    let config = state.config.analysis_config();
    Ok(Json(energy_statistics(state.store.as_ref(), &device_id, start, end, &config)?))
}
