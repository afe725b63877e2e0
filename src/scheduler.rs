//! The core scheduling policy (spec.md §4.3): `JobManager`.
//!
//! Grounded in
//! `original_source/hydra/jobmanager/jobmanager.py`, transliterated from
//! the Django singleton (`__new__`-based) into an `Arc`-shared Rust struct
//! behind a resettable process-wide handle, per spec.md §9's design note
//! ("do not leak singleton semantics into tests — a resettable handle is
//! acceptable"). Concurrency-safety for the shared `active_jobs` counter
//! uses `AtomicI64` with saturating decrement, matching spec.md §5's
//! "atomic increment/decrement with saturation at zero; counter drift is
//! tolerated".

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::cluster::{ClusterAdapter, CreateJobRequest};
use crate::errors::SchedulerError;
use crate::store::model::{BatchJob, Id, JobSpec};
use crate::store::Store;

static INSTANCE: OnceCell<Arc<JobManager>> = OnceCell::new();

/// Process-wide JobManager singleton (spec.md §9). `init` must be called
/// exactly once at startup; `instance` panics if called before `init`.
/// Tests should construct their own `JobManager::new(...)` directly instead
/// of touching this global, per the resettable-handle guidance.
pub fn init(store: Arc<dyn Store>, cluster: Arc<dyn ClusterAdapter>, max_active_jobs: i64, cascade_enabled: bool) {
    let manager = Arc::new(JobManager::new(store, cluster, max_active_jobs, cascade_enabled));
    let _ = INSTANCE.set(manager);
}

pub fn instance() -> Arc<JobManager> {
    INSTANCE
        .get()
        .cloned()
        .expect("JobManager singleton accessed before scheduler::init")
}

/// Process-wide job manager: batch accumulation policy, concurrency cap,
/// and the lifecycle hooks the watcher drives (spec.md §4.3).
pub struct JobManager {
    store: Arc<dyn Store>,
    cluster: Arc<dyn ClusterAdapter>,
    max_active_jobs: i64,
    active_jobs: AtomicI64,
    cascade_enabled: bool,
}

impl JobManager {
    pub fn new(store: Arc<dyn Store>, cluster: Arc<dyn ClusterAdapter>, max_active_jobs: i64, cascade_enabled: bool) -> Self {
        JobManager {
            store,
            cluster,
            max_active_jobs,
            active_jobs: AtomicI64::new(0),
            cascade_enabled,
        }
    }

    pub fn active_jobs(&self) -> i64 {
        self.active_jobs.load(Ordering::SeqCst)
    }

    fn increment_active_jobs(&self) {
        self.active_jobs.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrements but never goes below zero (spec.md §5).
    fn decrement_active_jobs(&self) {
        let _ = self
            .active_jobs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some((v - 1).max(0)));
    }

    /// Drives one pass of the matching policy for a newly ingested batch
    /// (spec.md §4.3, operation `on_add_batch`).
    #[instrument(skip(self), fields(batch_id = %batch_id, parent_job = ?parent_job_id))]
    pub async fn on_add_batch(
        &self,
        batch_id: Uuid,
        device_id: Option<Uuid>,
        parent_job_id: Option<Id>,
    ) -> Result<(), SchedulerError> {
        let specs = self.store.job_specs_for_parent(parent_job_id).await?;

        for spec in specs {
            if !device_allowed(&spec, device_id) {
                continue;
            }
            let batch_job = self.add_batch_to_job(&spec, batch_id).await?;
            self.decide_job(&batch_job, &spec).await?;
        }
        Ok(())
    }

    /// Accumulation policy (spec.md §4.3, operation `add_batch_to_job`).
    async fn add_batch_to_job(&self, spec: &JobSpec, batch_id: Uuid) -> Result<BatchJob, SchedulerError> {
        let pending = self.store.pending_batch_jobs_for_spec(spec.id).await?;

        let mut target: Option<BatchJob> = None;
        for candidate in pending {
            if target.is_none() && (candidate.batches.len() as u32) < spec.data_threshold {
                target = Some(candidate);
            } else {
                // Already full: opportunistically decide it now, the same
                // way the source does inside its single pass over
                // unscheduled batch-jobs.
                self.decide_job(&candidate, spec).await?;
            }
        }

        let target = match target {
            Some(t) => t,
            None => self.store.create_batch_job(spec.id).await?,
        };

        // `attach_batch` is the race-safe, set-valued op (spec.md §4.1/§5):
        // it alone persists the relation. Do not also `save()` a local
        // snapshot of `target` here — two concurrent callers attaching
        // different batches to the same pending bucket would otherwise
        // clobber each other's attached batch via a stale full overwrite.
        self.store.attach_batch(target.id, batch_id).await?;
        Ok(target)
    }

    /// Admission gate (spec.md §4.3, operation `decide_job`).
    async fn decide_job(&self, batch_job: &BatchJob, spec: &JobSpec) -> Result<(), SchedulerError> {
        let count = self.store.batch_count_for(batch_job.id).await.unwrap_or(batch_job.batches.len() as u32);
        if self.active_jobs() < self.max_active_jobs && count >= spec.data_threshold {
            self.start_job(batch_job, spec).await?;
        }
        Ok(())
    }

    /// `pending -> scheduled` transition (spec.md §4.3, operation
    /// `start_job`). The only transition not driven by the watcher.
    #[instrument(skip(self, spec), fields(batch_job_id = batch_job.id))]
    async fn start_job(&self, batch_job: &BatchJob, spec: &JobSpec) -> Result<(), SchedulerError> {
        let mut batch_job = batch_job.clone();
        batch_job.scheduled = true;
        self.store.save(&batch_job).await?;
        self.increment_active_jobs();

        let job_definition_name = self.store.find_job_definition_name(spec.job_definition_id).await?;
        let job_name = batch_job.k8s_job_name(&job_definition_name);

        let batch_ids: Vec<String> = batch_job.batches.iter().map(|b| b.to_string()).collect();
        let mut env = spec.environment_variables.clone();
        env.insert("BATCH_IDS".to_string(), batch_ids.join(","));

        let req = CreateJobRequest {
            name: &job_name,
            namespace: &spec.namespace,
            env: &env,
            container_image: &spec.container_image,
            init_photo_container: spec.init_photo_container,
            labels: &spec.k8s_job_labels,
        };

        // Failures here are logged and swallowed: `scheduled` stays true
        // and `active_jobs` stays incremented. The watcher's ADDED event
        // never arrives for a job that was never created, so no further
        // transitions occur. This is the counter leak spec.md §9 flags as
        // an open question; we preserve it rather than "fix" it (see
        // DESIGN.md).
        if let Err(err) = self.cluster.create_job(req).await {
            warn!("job {job_name} was unable to be created: {err}");
        }
        Ok(())
    }

    /// Watcher-driven hook: job object exists on k8s but has no running
    /// pod yet (spec.md §4.3, §4.4).
    #[instrument(skip(self))]
    pub async fn on_job_created(&self, batch_job_id: Id) -> Result<(), SchedulerError> {
        let mut bj = self.store.find_batch_job(batch_job_id).await?;
        bj.started = false;
        bj.created_on_k8s = true;
        self.store.save(&bj).await?;
        Ok(())
    }

    /// Watcher-driven hook: job has an active, non-failing pod.
    #[instrument(skip(self))]
    pub async fn on_job_started(&self, batch_job_id: Id, start_time: DateTime<Utc>) -> Result<(), SchedulerError> {
        let mut bj = self.store.find_batch_job(batch_job_id).await?;
        bj.started = true;
        bj.succeeded = false;
        bj.finished = false;
        bj.time_started = Some(start_time);
        bj.tries = 0;
        self.store.save(&bj).await?;
        Ok(())
    }

    /// Watcher-driven hook: job is active but its pod is failing/retrying.
    #[instrument(skip(self))]
    pub async fn on_job_failure(&self, batch_job_id: Id, tries: u16) -> Result<(), SchedulerError> {
        let mut bj = self.store.find_batch_job(batch_job_id).await?;
        bj.tries = tries;
        self.decrement_active_jobs();
        self.store.save(&bj).await?;
        Ok(())
    }

    /// Watcher-driven hook: job completed successfully. Fires the
    /// parent→child cascade if enabled (spec.md §4.3's
    /// `on_save_batch_job_event`).
    #[instrument(skip(self))]
    pub async fn on_job_success(&self, batch_job_id: Id) -> Result<(), SchedulerError> {
        let mut bj = self.store.find_batch_job(batch_job_id).await?;
        bj.finished = true;
        bj.succeeded = true;
        self.decrement_active_jobs();
        self.store.save(&bj).await?;

        if self.cascade_enabled {
            self.on_save_batch_job_event(&bj).await?;
        }
        Ok(())
    }

    /// Cascade: re-evaluate child specs for every batch the now-successful
    /// parent batch-job consumed (spec.md §4.3). Only fires for a
    /// successful terminal state; a failed terminal state never triggers
    /// children, since this is only called from [`JobManager::on_job_success`].
    async fn on_save_batch_job_event(&self, batch_job: &BatchJob) -> Result<(), SchedulerError> {
        if !(batch_job.finished && batch_job.succeeded) {
            return Ok(());
        }
        let parent_job_id = self.store.job_definition_id_for_spec(batch_job.job_spec_id).await?;
        for batch_id in &batch_job.batches {
            let batch = self.store.find_batch(*batch_id).await?;
            self.on_add_batch(batch.batch_id, batch.device_id, Some(parent_job_id))
                .await?;
        }
        Ok(())
    }
}

/// Whitelist/device acceptance rule (spec.md §4.3). `Store` hands the core
/// an already-typed `JobSpec` with `whitelisted_devices: Vec<Uuid>`; Hydra's
/// own `Store` trait has no operation that writes a `JobSpec` from raw,
/// untyped input (that CRUD surface is out of scope, spec.md §1 Non-goals),
/// so the "coerce to UUID, warn and treat the whole list as empty on any
/// malformed entry" rule the original re-applies on every
/// `on_add_batch_event` call (`jobmanager.py::on_add_batch_event`) is the
/// responsibility of whatever backend implements `Store` for a real
/// deployment, not of this function.
fn device_allowed(spec: &JobSpec, device_id: Option<Uuid>) -> bool {
    if spec.whitelisted_devices.is_empty() {
        return true;
    }
    match device_id {
        Some(id) => spec.whitelisted_devices.contains(&id),
        None => false,
    }
}

