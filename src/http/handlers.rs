//! Handlers for the three core-touching endpoints plus the ambient
//! healthcheck/metrics pair (spec.md §6, SPEC_FULL.md).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use crate::errors::IngestError;
use crate::ingest;
use crate::store::model::Batch;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct PostBatchBody {
    pub batch_id: Option<String>,
    pub region: Option<String>,
    pub device_id: Option<String>,
}

/// `POST /api/batches/` (spec.md §6).
pub async fn post_batch(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let parsed: PostBatchBody = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(err) => {
            error!("could not parse json request: {err}");
            return IngestError::MalformedJson.into_response();
        }
    };

    let Some(batch_id_raw) = parsed.batch_id.clone() else {
        return IngestError::MissingBatchId.into_response();
    };

    let Ok(batch_id) = Uuid::parse_str(&batch_id_raw) else {
        return IngestError::InvalidBatchId.into_response();
    };

    let device_id = match parsed.device_id.as_deref() {
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => return IngestError::InvalidDeviceId.into_response(),
        },
        None => None,
    };

    // Update path: batch already exists.
    if state.store.find_batch(batch_id).await.is_ok() {
        if let Err(err) = state.store.touch_batch_updated_at(batch_id).await {
            return IngestError::BatchDetailUpdateFailed(err).into_response();
        }
        state.houston.notify_batch_statuses(&batch_id_raw).await;
        return StatusCode::OK.into_response();
    }

    let Some(region) = parsed.region.clone() else {
        return IngestError::MissingRegion.into_response();
    };

    match state.store.region_exists(&region).await {
        Ok(true) => {}
        Ok(false) => return IngestError::UnknownRegion(region).into_response(),
        Err(err) => return IngestError::Store(err).into_response(),
    }

    let batch = Batch {
        batch_id,
        device_id,
        region,
        created_at: Utc::now(),
        updated_at: None,
    };

    let created = match state.store.upsert_batch(batch).await {
        Ok(created) => created,
        Err(err) => return IngestError::Store(err).into_response(),
    };

    if created {
        state.houston.notify_batch_statuses(&batch_id_raw).await;
        if let Err(err) = ingest::on_batch_created(&state.manager, batch_id, device_id).await {
            warn!("scheduler failed to process new batch {batch_id}: {err}");
        }
    }

    StatusCode::CREATED.into_response()
}

#[derive(Debug, Deserialize)]
pub struct JobsByBatchQuery {
    pub batch_id: String,
}

#[derive(Debug, Serialize)]
struct PrettyJob {
    job_name: String,
    time_started: Option<String>,
}

#[derive(Debug, Serialize, Default)]
struct JobBucket {
    #[serde(rename = "Total")]
    total: usize,
    #[serde(rename = "Job_List")]
    job_list: Vec<PrettyJob>,
}

/// `GET /api/jobs-by-batch/?batch_id=<UUID>` (spec.md §6).
pub async fn jobs_by_batch(State(state): State<Arc<AppState>>, Query(q): Query<JobsByBatchQuery>) -> impl IntoResponse {
    let Ok(batch_id) = Uuid::parse_str(&q.batch_id) else {
        return IngestError::InvalidBatchId.into_response();
    };

    if state.store.find_batch(batch_id).await.is_err() {
        return IngestError::BatchNotFound.into_response();
    }

    let batch_jobs = match state.store.batch_jobs_for_batch(batch_id).await {
        Ok(bjs) => bjs,
        Err(err) => return IngestError::Store(err).into_response(),
    };

    let mut queued = JobBucket::default();
    let mut active = JobBucket::default();
    let mut successful = JobBucket::default();
    let mut failed = JobBucket::default();

    for bj in &batch_jobs {
        let job_name = match state.store.find_job_spec(bj.job_spec_id).await {
            Ok(spec) => state
                .store
                .find_job_definition_name(spec.job_definition_id)
                .await
                .unwrap_or_else(|_| "unknown".to_string()),
            Err(_) => "unknown".to_string(),
        };
        let pretty = PrettyJob {
            job_name,
            time_started: bj.time_started.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
        };

        // Classification per spec.md §6: not scheduled -> queued;
        // succeeded -> successful; scheduled and not finished -> active;
        // else -> failed.
        if !bj.scheduled {
            queued.job_list.push(pretty);
        } else if bj.succeeded {
            successful.job_list.push(pretty);
        } else if !bj.finished {
            active.job_list.push(pretty);
        } else {
            failed.job_list.push(pretty);
        }
    }

    queued.total = queued.job_list.len();
    active.total = active.job_list.len();
    successful.total = successful.job_list.len();
    failed.total = failed.job_list.len();

    let total = queued.total + active.total + successful.total + failed.total;

    Json(json!({
        "Total_Jobs": total,
        "Queued_Jobs": queued,
        "Active_Jobs": active,
        "Successful_Jobs": successful,
        "Failed_Jobs": failed,
    }))
    .into_response()
}

/// `GET /api/jobs-queued/` (spec.md §6).
pub async fn jobs_queued(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.count_queued_batch_jobs().await {
        Ok(n) => Json(json!({"Total Queued Jobs": n})).into_response(),
        Err(err) => IngestError::Store(err).into_response(),
    }
}

/// `GET /healthz` (ambient; SPEC_FULL.md).
pub async fn healthcheck() -> impl IntoResponse {
    (StatusCode::OK, "Ready to serve your needs!")
}

/// `GET /metrics` (ambient; SPEC_FULL.md). Prometheus text exposition
/// format, ported from `original_source/api/views.py::metrics`.
///
/// The `hydra_batch_jobs_videos_total` counter is hard-coded to
/// `job_spec=1` in the original and stays hard-coded here: spec.md §9
/// flags it explicitly as fragile, not something to silently "fix" in a
/// reimplementation.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let batches = state.store.count_batches().await.unwrap_or(0);
    let batch_jobs = state.store.count_batch_jobs().await.unwrap_or(0);
    let failed = state.store.count_failed_batch_jobs().await.unwrap_or(0);
    let running = state.store.count_running_batch_jobs().await.unwrap_or(0);
    let videos = state.store.count_videos_processed().await.unwrap_or(0);

    let body = format!(
        "# TYPE hydra_batches_total counter\n\
         # HELP hydra_batches_total Total batches registered in Hydra.\n\
         hydra_batches_total {batches}\n\
         # TYPE hydra_batch_jobs_total counter\n\
         # HELP hydra_batch_jobs_total Total batch jobs registered in Hydra.\n\
         hydra_batch_jobs_total {batch_jobs}\n\
         # TYPE hydra_batch_jobs_failed_total counter\n\
         # HELP hydra_batch_jobs_failed_total Total failed batch jobs registered in Hydra.\n\
         hydra_batch_jobs_failed_total {failed}\n\
         # TYPE hydra_batch_jobs_running gauge\n\
         # HELP hydra_batch_jobs_running Current running batch jobs registered in Hydra.\n\
         hydra_batch_jobs_running {running}\n\
         # TYPE hydra_batch_jobs_videos_total counter\n\
         # HELP hydra_batch_jobs_videos_total Total videos processed by Hydra. Hard-coded to job_spec=1.\n\
         hydra_batch_jobs_videos_total {videos}\n\
         #EOF\n"
    );
    (StatusCode::OK, [("content-type", "text/plain")], body)
}
