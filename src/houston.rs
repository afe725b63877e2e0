//! Outbound "Houston" notification (spec.md §6, Ambient stack).
//!
//! Grounded in `original_source/api/views.py::_notify_houston`: posts JSON
//! to `HOUSTON_URL` joined with an endpoint path, bearer-token
//! authenticated, TLS verification gated by `ROOT_CERT`. All failures are
//! logged and swallowed — a Houston outage must never fail batch ingest
//! (spec.md §7: "External notification errors — the Houston notifier logs
//! and returns; never fails the ingest"). Built on `reqwest`, the same
//! crate the teacher uses for its own outbound HTTP
//! (`Qovery-engine/Cargo.toml`'s `reqwest` dependency).

use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct HoustonClient {
    base_url: Option<String>,
    token: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
pub struct BatchStatusUpdate {
    pub batch: String,
    pub status: u32,
    pub completed: bool,
}

impl HoustonClient {
    pub fn new(base_url: Option<String>, token: Option<String>, verify_tls: bool) -> Self {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        HoustonClient {
            base_url,
            token,
            client,
        }
    }

    /// Posts to `{HOUSTON_URL}/{endpoint}`. Silently skipped if Houston is
    /// not configured, matching the original's early-return when
    /// `HOUSTON_URL`/`HOUSTON_TOKEN` are unset.
    pub async fn notify(&self, endpoint: &str, data: &BatchStatusUpdate) {
        let (Some(base_url), Some(token)) = (self.base_url.as_ref(), self.token.as_ref()) else {
            warn!("Houston notification was skipped: not configured");
            return;
        };

        let url = match reqwest::Url::parse(base_url).and_then(|u| u.join(endpoint)) {
            Ok(u) => u,
            Err(err) => {
                warn!("Houston request failed: invalid url: {err}");
                return;
            }
        };

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Token {token}"))
            .json(data)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().as_u16() == 201 => {
                info!(batch = %data.batch, status = %data.status, "Houston notified");
            }
            Ok(resp) => {
                warn!("Houston request failed with status {}", resp.status());
            }
            Err(err) => {
                warn!("Houston request failed: {err}");
            }
        }
    }

    /// Notifies Houston twice for a batch (photo status 3, IMU status 4),
    /// matching `BatchList.post`/`BatchDetail.put` in
    /// `original_source/api/views.py`.
    pub async fn notify_batch_statuses(&self, batch_id: &str) {
        self.notify(
            "api/batch_statuses/",
            &BatchStatusUpdate {
                batch: batch_id.to_string(),
                status: 3,
                completed: true,
            },
        )
        .await;
        self.notify(
            "api/batch_statuses/",
            &BatchStatusUpdate {
                batch: batch_id.to_string(),
                status: 4,
                completed: true,
            },
        )
        .await;
    }
}
