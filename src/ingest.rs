//! The ingest trigger (spec.md §2, §9).
//!
//! spec.md §9 notes the original wires this as a persistence-layer
//! post-save signal (`original_source/hydra/jobmanager/signals.py`) and
//! recommends the "straightforward re-architecture" of calling the
//! scheduler directly from the ingest service once the Store write
//! commits. Hydra takes that recommendation: [`on_batch_created`] is a
//! thin function the HTTP handler calls after a successful
//! `Store::upsert_batch`, with no signal/observer plumbing in between.

use std::sync::Arc;

use uuid::Uuid;

use crate::errors::SchedulerError;
use crate::scheduler::JobManager;

/// Fires the scheduler for a freshly created batch. Per spec.md §2's data
/// flow, this only runs on the *create* path — a re-POST that merely
/// updates `updated_at` (spec.md §6, S6) does not re-trigger matching.
pub async fn on_batch_created(
    manager: &Arc<JobManager>,
    batch_id: Uuid,
    device_id: Option<Uuid>,
) -> Result<(), SchedulerError> {
    manager.on_add_batch(batch_id, device_id, None).await
}
