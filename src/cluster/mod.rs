//! The Kubernetes Batch API adapter (spec.md §4.2).
//!
//! `ClusterAdapter` is the thin, opaque-to-callers interface the scheduler
//! and watcher consume; [`kube_adapter::KubeClusterAdapter`] is the real
//! `kube`/`k8s-openapi` backed implementation, built the way the teacher
//! builds its own Kubernetes clients
//! (`Qovery-engine/src/infrastructure/models/kubernetes/mod.rs`: `kube::Api`,
//! `kube::Client`, `ListParams`) and the way it reads Job objects
//! (`Qovery-engine/src/deployment_report/job/reporter.rs`:
//! `k8s_openapi::api::batch::v1::Job`).

pub mod fake;
pub mod job_body;
pub mod kube_adapter;

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::ClusterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    Active,
    Failed,
    NonSucceeded,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

/// The Kubernetes-reported status flags a watch event carries; mirrors
/// `V1JobStatus`'s `active`/`succeeded`/`failed` counters closely enough
/// for the watcher's dispatch table (spec.md §4.4) without pulling in the
/// whole `k8s_openapi::JobStatus` shape at this layer.
#[derive(Debug, Clone, Default)]
pub struct JobStatusFlags {
    pub active: Option<i32>,
    pub succeeded: Option<i32>,
    pub failed: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct JobEvent {
    pub event_type: WatchEventType,
    pub job_name: String,
    pub resource_version: Option<String>,
    pub creation_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub status: JobStatusFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupState {
    Finished,
    Active,
}

/// Parameters describing the body of the Kubernetes Job to create
/// (spec.md §4.2, §6).
#[derive(Debug, Clone)]
pub struct CreateJobRequest<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub env: &'a BTreeMap<String, String>,
    pub container_image: &'a str,
    pub init_photo_container: bool,
    pub labels: &'a BTreeMap<String, String>,
}

#[async_trait]
pub trait ClusterAdapter: Send + Sync {
    async fn create_job(&self, req: CreateJobRequest<'_>) -> Result<(), ClusterError>;

    async fn delete_job(&self, name: &str, namespace: &str) -> Result<(), ClusterError>;

    async fn job_exists(&self, name: &str, namespace: &str) -> Result<bool, ClusterError>;

    async fn job_status(&self, name: &str, namespace: &str) -> Result<JobStatus, ClusterError>;

    async fn cleanup_jobs_with_state(
        &self,
        namespace: &str,
        state: CleanupState,
        label_selector: &str,
    ) -> Result<Vec<String>, ClusterError>;

    /// An infinite stream of job events in the given namespace. Errors on
    /// the stream are terminal for that stream instance; the watcher
    /// (spec.md §4.4) is responsible for re-opening it.
    fn watch_jobs(&self, namespace: &str) -> BoxStream<'static, Result<JobEvent, ClusterError>>;
}
