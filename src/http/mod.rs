//! HTTP surface (spec.md §6).
//!
//! spec.md treats the full REST CRUD surface as an external collaborator;
//! only three endpoints participate in the core and are specified here:
//! `POST /api/batches/`, `GET /api/jobs-by-batch/`, `GET /api/jobs-queued/`.
//! The ambient `GET /healthz`/`GET /metrics` endpoints are carried too
//! (SPEC_FULL.md's "Supplemented features") since a deployable service
//! needs them even though the core's test suite doesn't exercise them.
//!
//! Built with `axum`, in the style of the pack's strongest axum user
//! (`TM9657-flow-like`'s `packages/executor/src/router.rs`: a `Router` with
//! a small `Arc<State>` via `.with_state`, handlers taking `State<...>`
//! extractors and returning `Json<...>`/`(StatusCode, Json<...>)`). Request
//! spans come from `tower_http::trace::TraceLayer`, matching the same
//! repo's `tower-http` `trace` feature usage.

pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::houston::HoustonClient;
use crate::scheduler::JobManager;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub manager: Arc<JobManager>,
    pub houston: Arc<HoustonClient>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/batches/", post(handlers::post_batch))
        .route("/api/jobs-by-batch/", get(handlers::jobs_by_batch))
        .route("/api/jobs-queued/", get(handlers::jobs_queued))
        .route("/healthz", get(handlers::healthcheck))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
