//! The persistence interface the core depends on.
//!
//! Per spec.md §4.1, the Store's implementation is opaque to the core: the
//! core only ever calls these nine operations. This module defines the
//! trait and ships one concrete, in-process implementation
//! ([`memory::InMemoryStore`]) used by the test suite and suitable as a
//! reference for a real backend. A production deployment is expected to
//! swap in a database-backed implementation without the scheduler or
//! watcher code changing at all.

pub mod memory;
pub mod model;

use async_trait::async_trait;
use thiserror::Error;

use model::{Batch, BatchJob, Id, JobSpec};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("store backend error: {0}")]
    Backend(String),
}

/// The operations the scheduler and ingest trigger rely on (spec.md §4.1).
///
/// The Store is expected to be transactional per call; the core never
/// issues multi-statement transactions across these calls. Races between
/// concurrent callers observing the same pending bucket are tolerated by
/// the set-valued nature of [`Store::attach_batch`] and the idempotence of
/// `start_job` at the scheduler layer (spec.md §4.1, §5).
#[async_trait]
pub trait Store: Send + Sync {
    /// Active job specs for the given parent (`None` = root definitions),
    /// ordered by priority descending, ties broken by insertion order.
    async fn job_specs_for_parent(&self, parent_job_id: Option<Id>) -> Result<Vec<JobSpec>, StoreError>;

    /// Pending (`scheduled = false`) batch-jobs for a spec.
    async fn pending_batch_jobs_for_spec(&self, spec_id: Id) -> Result<Vec<BatchJob>, StoreError>;

    async fn batch_count_for(&self, batch_job_id: Id) -> Result<u32, StoreError>;

    /// Creates a new all-false, zero-tries, empty-batches bucket for `spec`.
    async fn create_batch_job(&self, spec_id: Id) -> Result<BatchJob, StoreError>;

    /// Idempotent set-insert of `batch_id` into the batch-job's batches.
    async fn attach_batch(&self, batch_job_id: Id, batch_id: uuid::Uuid) -> Result<(), StoreError>;

    /// Persists mutations to `batch_job` atomically.
    async fn save(&self, batch_job: &BatchJob) -> Result<(), StoreError>;

    async fn find_batch_job(&self, id: Id) -> Result<BatchJob, StoreError>;

    async fn find_batch(&self, batch_id: uuid::Uuid) -> Result<Batch, StoreError>;

    async fn batch_jobs_for_batch(&self, batch_id: uuid::Uuid) -> Result<Vec<BatchJob>, StoreError>;

    // -- operations needed by the (external, but core-adjacent) HTTP surface --

    async fn find_job_spec(&self, spec_id: Id) -> Result<JobSpec, StoreError>;

    async fn find_job_definition_name(&self, job_definition_id: Id) -> Result<String, StoreError>;

    async fn job_definition_id_for_spec(&self, spec_id: Id) -> Result<Id, StoreError>;

    async fn upsert_batch(&self, batch: Batch) -> Result<bool, StoreError>;

    async fn touch_batch_updated_at(&self, batch_id: uuid::Uuid) -> Result<(), StoreError>;

    async fn region_exists(&self, code: &str) -> Result<bool, StoreError>;

    async fn count_queued_batch_jobs(&self) -> Result<u64, StoreError>;

    // -- metrics-only aggregate counts (spec.md §9 supplemented feature) --

    async fn count_batches(&self) -> Result<u64, StoreError>;

    async fn count_batch_jobs(&self) -> Result<u64, StoreError>;

    /// `tries > 5 && !finished && scheduled && created_on_k8s && !succeeded`,
    /// matching `original_source/api/views.py::metrics`'s failed-job filter.
    async fn count_failed_batch_jobs(&self) -> Result<u64, StoreError>;

    /// `started && created_on_k8s && !finished && !succeeded && tries < 6`.
    async fn count_running_batch_jobs(&self) -> Result<u64, StoreError>;

    /// Batch-jobs for `job_spec_id == 1` that finished successfully. The
    /// hard-coded `1` is carried from the original (spec.md §9) and is not
    /// meant to generalize.
    async fn count_videos_processed(&self) -> Result<u64, StoreError>;
}
