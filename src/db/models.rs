//! Database model types.

use serde::{Deserialize, Serialize};

/// A registered smart plug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    /// Price per kWh. Statistics cannot be priced without it.
    #[serde(default)]
    pub tariff: Option<f64>,
    /// Upstream bearer token; the global token is used when absent.
    #[serde(default, skip_serializing)]
    pub api_token: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub created_at: String,
}

fn default_active() -> bool {
    true
}

impl Default for Device {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            name: String::new(),
            tariff: None,
            api_token: None,
            active: true,
            created_at: String::new(),
        }
    }
}

/// Sample counts for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SampleStats {
    pub devices: i64,
    pub samples: i64,
    pub db_size_bytes: i64,
}
