//! Vendor cloud client.

use serde_json::{json, Value};
use std::time::Duration;

use super::{Reading, TelemetryError};
use crate::analysis::Status;
use crate::db::Device;

/// HTTP client for the smart-plug `thing` endpoint.
#[derive(Clone)]
pub struct TelemetryClient {
    http: reqwest::Client,
    endpoint: String,
    default_token: Option<String>,
    timeout: Duration,
}

impl TelemetryClient {
    pub fn new(
        endpoint: &str,
        default_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TelemetryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TelemetryError::Config(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            default_token,
            timeout,
        })
    }

    /// Query the current state of one device.
    pub async fn fetch(&self, device: &Device) -> Result<Reading, TelemetryError> {
        let token = device
            .api_token
            .as_deref()
            .or(self.default_token.as_deref())
            .ok_or_else(|| {
                TelemetryError::Config(format!("no API token for device {}", device.device_id))
            })?;

        let body = json!({
            "thingList": [{ "itemType": 1, "id": device.device_id }]
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| TelemetryError::from_reqwest(e, self.timeout))?
            .error_for_status()
            .map_err(|e| TelemetryError::from_reqwest(e, self.timeout))?;

        let value: Value = response
            .json()
            .await
            .map_err(|e| TelemetryError::from_reqwest(e, self.timeout))?;

        Ok(parse_reading(&value))
    }
}

/// Extract the reading from a `thingList` response.
///
/// Absent structure is tolerated: no `online` flag means the device reported
/// nothing usable, and missing or non-numeric readings become `0.0`.
pub fn parse_reading(response: &Value) -> Reading {
    let item = &response["data"]["thingList"][0]["itemData"];
    let params = &item["params"];

    Reading {
        online: match item.get("online") {
            Some(Value::Bool(flag)) => Status::from_flag(Some(*flag)),
            _ => Status::Disconnected,
        },
        power: number(&params["power"]),
        voltage: number(&params["voltage"]),
        current: number(&params["current"]),
    }
}

fn number(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}
