//! An in-process reference implementation of [`super::Store`].
//!
//! Used by the test suite and by any caller that wants to exercise the
//! scheduler/watcher without standing up a database. Internally this is
//! just a handful of `HashMap`s behind a single `RwLock`, which is enough
//! to reproduce the race-tolerance invariants spec.md §5/§8 call out
//! (concurrent `attach_batch` on the same pending bucket, idempotent
//! `start_job`) without pretending to be a real transactional store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{Batch, BatchJob, Id, JobDefinition, JobSpec, Region};
use super::{Store, StoreError};

#[derive(Default)]
struct Inner {
    regions: HashMap<String, Region>,
    batches: HashMap<Uuid, Batch>,
    job_definitions: HashMap<Id, JobDefinition>,
    job_specs: HashMap<Id, JobSpec>,
    /// Insertion order of job specs, used to break priority ties the same
    /// way the original `ORDER BY priority DESC` (stable on insertion order
    /// in a real RDBMS) would.
    job_spec_insertion_order: Vec<Id>,
    batch_jobs: HashMap<Id, BatchJob>,
    batch_job_insertion_order: Vec<Id>,
}

/// In-memory [`Store`]. Cheap to clone (it's an `Arc` internally via
/// `tokio::sync::RwLock` held behind a plain struct field, so callers wrap
/// it in `Arc<InMemoryStore>` rather than cloning the struct itself).
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    next_job_definition_id: AtomicI64,
    next_job_spec_id: AtomicI64,
    next_batch_job_id: AtomicI64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            inner: RwLock::new(Inner::default()),
            next_job_definition_id: AtomicI64::new(1),
            next_job_spec_id: AtomicI64::new(1),
            next_batch_job_id: AtomicI64::new(1),
        }
    }

    pub async fn seed_region(&self, region: Region) {
        let mut inner = self.inner.write().await;
        inner.regions.insert(region.code.clone(), region);
    }

    pub async fn seed_job_definition(&self, name: &str, parent_job_id: Option<Id>) -> Id {
        let id = self.next_job_definition_id.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.write().await;
        inner.job_definitions.insert(
            id,
            JobDefinition {
                id,
                name: name.to_string(),
                description: String::new(),
                parent_job_id,
            },
        );
        id
    }

    pub async fn seed_job_spec(&self, mut spec: JobSpec) -> Id {
        let id = self.next_job_spec_id.fetch_add(1, Ordering::SeqCst);
        spec.id = id;
        let mut inner = self.inner.write().await;
        inner.job_spec_insertion_order.push(id);
        inner.job_specs.insert(id, spec);
        id
    }

    pub async fn seed_batch(&self, batch: Batch) {
        let mut inner = self.inner.write().await;
        inner.batches.insert(batch.batch_id, batch);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn job_specs_for_parent(&self, parent_job_id: Option<Id>) -> Result<Vec<JobSpec>, StoreError> {
        let inner = self.inner.read().await;
        let mut specs: Vec<JobSpec> = inner
            .job_spec_insertion_order
            .iter()
            .filter_map(|id| inner.job_specs.get(id))
            .filter(|s| s.active)
            .filter(|s| {
                inner
                    .job_definitions
                    .get(&s.job_definition_id)
                    .map(|d| d.parent_job_id == parent_job_id)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        // stable_sort preserves insertion order among ties, matching
        // `ORDER BY priority DESC` semantics spec.md §4.1 requires.
        specs.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(specs)
    }

    async fn pending_batch_jobs_for_spec(&self, spec_id: Id) -> Result<Vec<BatchJob>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .batch_job_insertion_order
            .iter()
            .filter_map(|id| inner.batch_jobs.get(id))
            .filter(|bj| bj.job_spec_id == spec_id && !bj.scheduled)
            .cloned()
            .collect())
    }

    async fn batch_count_for(&self, batch_job_id: Id) -> Result<u32, StoreError> {
        let inner = self.inner.read().await;
        let bj = inner.batch_jobs.get(&batch_job_id).ok_or(StoreError::NotFound)?;
        Ok(bj.batches.len() as u32)
    }

    async fn create_batch_job(&self, spec_id: Id) -> Result<BatchJob, StoreError> {
        let id = self.next_batch_job_id.fetch_add(1, Ordering::SeqCst);
        let bj = BatchJob {
            id,
            job_spec_id: spec_id,
            ..Default::default()
        };
        let mut inner = self.inner.write().await;
        inner.batch_job_insertion_order.push(id);
        inner.batch_jobs.insert(id, bj.clone());
        Ok(bj)
    }

    async fn attach_batch(&self, batch_job_id: Id, batch_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let bj = inner.batch_jobs.get_mut(&batch_job_id).ok_or(StoreError::NotFound)?;
        if !bj.batches.contains(&batch_id) {
            bj.batches.push(batch_id);
        }
        Ok(())
    }

    async fn save(&self, batch_job: &BatchJob) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.batch_jobs.insert(batch_job.id, batch_job.clone());
        Ok(())
    }

    async fn find_batch_job(&self, id: Id) -> Result<BatchJob, StoreError> {
        let inner = self.inner.read().await;
        inner.batch_jobs.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn find_batch(&self, batch_id: Uuid) -> Result<Batch, StoreError> {
        let inner = self.inner.read().await;
        inner.batches.get(&batch_id).cloned().ok_or(StoreError::NotFound)
    }

    async fn batch_jobs_for_batch(&self, batch_id: Uuid) -> Result<Vec<BatchJob>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .batch_job_insertion_order
            .iter()
            .filter_map(|id| inner.batch_jobs.get(id))
            .filter(|bj| bj.batches.contains(&batch_id))
            .cloned()
            .collect())
    }

    async fn find_job_spec(&self, spec_id: Id) -> Result<JobSpec, StoreError> {
        let inner = self.inner.read().await;
        inner.job_specs.get(&spec_id).cloned().ok_or(StoreError::NotFound)
    }

    async fn find_job_definition_name(&self, job_definition_id: Id) -> Result<String, StoreError> {
        let inner = self.inner.read().await;
        inner
            .job_definitions
            .get(&job_definition_id)
            .map(|d| d.name.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn job_definition_id_for_spec(&self, spec_id: Id) -> Result<Id, StoreError> {
        let inner = self.inner.read().await;
        inner
            .job_specs
            .get(&spec_id)
            .map(|s| s.job_definition_id)
            .ok_or(StoreError::NotFound)
    }

    async fn upsert_batch(&self, batch: Batch) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let created = !inner.batches.contains_key(&batch.batch_id);
        if created {
            inner.batches.insert(batch.batch_id, batch);
        } else {
            let existing = inner.batches.get_mut(&batch.batch_id).expect("checked above");
            existing.updated_at = Some(Utc::now());
        }
        Ok(created)
    }

    async fn touch_batch_updated_at(&self, batch_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let batch = inner.batches.get_mut(&batch_id).ok_or(StoreError::NotFound)?;
        batch.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn region_exists(&self, code: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.regions.contains_key(code))
    }

    async fn count_queued_batch_jobs(&self) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        let active_specs: std::collections::HashSet<Id> =
            inner.job_specs.values().filter(|s| s.active).map(|s| s.id).collect();
        Ok(inner
            .batch_jobs
            .values()
            .filter(|bj| !bj.scheduled && active_specs.contains(&bj.job_spec_id))
            .count() as u64)
    }

    async fn count_batches(&self) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.batches.len() as u64)
    }

    async fn count_batch_jobs(&self) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.batch_jobs.len() as u64)
    }

    async fn count_failed_batch_jobs(&self) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .batch_jobs
            .values()
            .filter(|bj| bj.tries > 5 && !bj.finished && bj.scheduled && bj.created_on_k8s && !bj.succeeded)
            .count() as u64)
    }

    async fn count_running_batch_jobs(&self) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .batch_jobs
            .values()
            .filter(|bj| bj.started && bj.created_on_k8s && !bj.finished && !bj.succeeded && bj.tries < 6)
            .count() as u64)
    }

    async fn count_videos_processed(&self) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .batch_jobs
            .values()
            .filter(|bj| bj.job_spec_id == 1 && bj.succeeded && bj.finished)
            .count() as u64)
    }
}

/// Convenience used only by tests that want a deterministic view of labels
/// and env maps without depending on iteration order of a `HashMap`.
pub fn sorted(map: &BTreeMap<String, String>) -> Vec<(&String, &String)> {
    map.iter().collect()
}
