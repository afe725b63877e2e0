//! Error taxonomy for the core (spec.md §7).
//!
//! Each module gets a small, focused `thiserror` enum rather than one
//! monolithic error type, the way the teacher splits `CommandError`,
//! `HelmError`, `DockerError`, `TerraformError`, etc. and only unifies them
//! at the boundary that actually needs to (there: `EngineError`; here: the
//! HTTP layer's `IngestError`, which also implements axum's `IntoResponse`
//! so `http::handlers` returns `IngestError` values directly instead of
//! hand-rolling a `(StatusCode, Json<...>)` per branch).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

/// Errors from the Kubernetes-facing adapter (spec.md §4.2, §7).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClusterError {
    /// A job with this name already exists on the cluster.
    #[error("AlreadyExists")]
    AlreadyExists,
    /// The cluster rejected the job body as invalid.
    #[error("Invalid: {0}")]
    Invalid(String),
    /// Any other cluster-reported reason.
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the scheduler's operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced to the ingest/HTTP boundary. Input-validation errors
/// never reach the scheduler (spec.md §7); store errors propagate and are
/// converted to 400/500 here.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Could not parse json request")]
    MalformedJson,
    #[error("Cant find key 'batch_id' in data")]
    MissingBatchId,
    #[error("Invalid batch_id requested")]
    InvalidBatchId,
    #[error("Invalid device_id")]
    InvalidDeviceId,
    #[error("invalid batch detail request")]
    BatchDetailUpdateFailed(#[source] StoreError),
    #[error("Cant find key 'region' in data")]
    MissingRegion,
    #[error("unknown region '{0}'")]
    UnknownRegion(String),
    #[error("Batch doesn't exist")]
    BatchNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        match self {
            IngestError::Store(ref err) => {
                error!("store error handling ingest request: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            IngestError::BatchDetailUpdateFailed(ref err) => {
                error!("invalid batch detail request: {err}");
                (StatusCode::BAD_REQUEST, Json(json!({"Message": self.to_string()}))).into_response()
            }
            _ => (StatusCode::BAD_REQUEST, Json(json!({"Message": self.to_string()}))).into_response(),
        }
    }
}
