//! A recording fake [`super::ClusterAdapter`] for tests.
//!
//! Mirrors how the teacher's test suite substitutes fakes for real cloud
//! clients rather than mocking at the HTTP layer (see the `faux` dependency
//! in `Qovery-engine/Cargo.toml`'s `[dev-dependencies]`): here we hand-roll
//! a small recorder since the adapter trait is narrow enough not to need a
//! mocking macro.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::ClusterError;

use super::{CleanupState, ClusterAdapter, CreateJobRequest, JobEvent, JobStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedJob {
    pub name: String,
    pub namespace: String,
    pub env: BTreeMap<String, String>,
    pub init_photo_container: bool,
}

#[derive(Default)]
pub struct FakeClusterAdapter {
    pub created: Mutex<Vec<CreatedJob>>,
    pub deleted: Mutex<Vec<String>>,
    /// When set, the next `create_job` call returns this error instead of
    /// recording a success.
    pub next_create_error: Mutex<Option<ClusterError>>,
    pub existing_jobs: Mutex<std::collections::HashSet<String>>,
    /// A scripted queue drained once by `watch_jobs`, for watcher tests
    /// (see `watcher::tests`) that need a stream ending in an error.
    pub watch_events: Mutex<VecDeque<Result<JobEvent, ClusterError>>>,
}

impl FakeClusterAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_job_names(&self) -> Vec<String> {
        self.created.lock().unwrap().iter().map(|j| j.name.clone()).collect()
    }

    pub fn deleted_job_names(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterAdapter for FakeClusterAdapter {
    async fn create_job(&self, req: CreateJobRequest<'_>) -> Result<(), ClusterError> {
        if let Some(err) = self.next_create_error.lock().unwrap().take() {
            return Err(err);
        }
        self.existing_jobs.lock().unwrap().insert(req.name.to_string());
        self.created.lock().unwrap().push(CreatedJob {
            name: req.name.to_string(),
            namespace: req.namespace.to_string(),
            env: req.env.clone(),
            init_photo_container: req.init_photo_container,
        });
        Ok(())
    }

    async fn delete_job(&self, name: &str, _namespace: &str) -> Result<(), ClusterError> {
        self.existing_jobs.lock().unwrap().remove(name);
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn job_exists(&self, name: &str, _namespace: &str) -> Result<bool, ClusterError> {
        Ok(self.existing_jobs.lock().unwrap().contains(name))
    }

    async fn job_status(&self, _name: &str, _namespace: &str) -> Result<JobStatus, ClusterError> {
        Ok(JobStatus::NotFound)
    }

    async fn cleanup_jobs_with_state(
        &self,
        _namespace: &str,
        _state: CleanupState,
        _label_selector: &str,
    ) -> Result<Vec<String>, ClusterError> {
        Ok(Vec::new())
    }

    fn watch_jobs(&self, _namespace: &str) -> BoxStream<'static, Result<JobEvent, ClusterError>> {
        let queued: Vec<_> = self.watch_events.lock().unwrap().drain(..).collect();
        Box::pin(futures::stream::iter(queued))
    }
}
