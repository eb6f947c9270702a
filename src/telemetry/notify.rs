//! Status-change notifications.

use serde::Serialize;
use std::time::Duration;

use super::TelemetryError;
use crate::analysis::Status;

/// Body posted to the notification endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub start_time: String,
    pub device_id: String,
    pub status: Status,
}

#[derive(Clone)]
pub struct Notifier {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self, TelemetryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TelemetryError::Config(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            token,
            timeout,
        })
    }

    pub async fn send(&self, change: &StatusChange) -> Result<(), TelemetryError> {
        let mut request = self.http.post(&self.endpoint).json(change);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .await
            .map_err(|e| TelemetryError::from_reqwest(e, self.timeout))?
            .error_for_status()
            .map_err(|e| TelemetryError::from_reqwest(e, self.timeout))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    type Received = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn record(State(received): State<Received>, headers: HeaderMap, Json(body): Json<Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        received.lock().unwrap().push((auth, body));
    }

    #[tokio::test]
    async fn test_send_posts_status_change() {
        let received: Received = Arc::default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/notify", post(record))
            .with_state(received.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let notifier = Notifier::new(
            &format!("http://{}/notify", addr),
            Some("secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        notifier
            .send(&StatusChange {
                start_time: "2024-05-01 10:00:00".to_string(),
                device_id: "plug-1".to_string(),
                status: Status::Offline,
            })
            .await
            .unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0.as_deref(), Some("Bearer secret"));
        assert_eq!(received[0].1["status"], false);
        assert_eq!(received[0].1["device_id"], "plug-1");
    }

    #[tokio::test]
    async fn test_send_unreachable_endpoint() {
        let notifier = Notifier::new("http://256.256.256.256/notify", None, Duration::from_millis(100)).unwrap();
        let change = StatusChange {
            start_time: String::new(),
            device_id: "plug-1".to_string(),
            status: Status::Online,
        };
        assert!(notifier.send(&change).await.is_err());
    }
}
