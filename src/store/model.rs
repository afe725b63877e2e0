//! Domain types shared by the `Store` trait and everything above it.
//!
//! These mirror the entities in the data model: `Region`, `Batch`,
//! `Job_Definition`, `Job_Spec`, `Batch_Job`. Field names are kept close to
//! the original Django model names (snake_case, singular relations as
//! plain ids) so the mapping to a real persistence layer stays obvious.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque auto-incrementing id used by `Job_Definition`, `Job_Spec` and
/// `Batch_Job`. A real store almost certainly backs this with a database
/// sequence; the core only needs it to be a small, comparable, hashable key.
pub type Id = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub code: String,
    pub description: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: Uuid,
    pub device_id: Option<Uuid>,
    pub region: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: Id,
    pub name: String,
    pub description: String,
    /// `None` means this definition is a root (no parent). A definition can
    /// also point at itself to mean the same thing, per spec.md's data
    /// model table ("self-reference = root"); callers normalize that to
    /// `None` when constructing one, `parent_job_id` never reflects a
    /// self-loop once built.
    pub parent_job_id: Option<Id>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEnvironment {
    #[serde(rename = "AWS")]
    Aws,
    #[serde(rename = "AZ")]
    Az,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreatedBy {
    Greg,
    Charlotte,
    Tirtha,
    Anders,
    Jens,
    Chris,
    Kevin,
    John,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: Id,
    pub job_definition_id: Id,
    pub run_environment: RunEnvironment,
    pub container_image: String,
    pub priority: u16,
    pub active: bool,
    pub namespace: String,
    pub time_limit_secs: u64,
    pub trigger_children: bool,
    pub data_threshold: u32,
    pub created_by: CreatedBy,
    pub environment_variables: BTreeMap<String, String>,
    pub k8s_job_labels: BTreeMap<String, String>,
    pub init_photo_container: bool,
    /// Empty means "accept all devices" (spec.md §3, §4.3).
    pub whitelisted_devices: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BatchJob {
    pub id: Id,
    pub job_spec_id: Id,
    pub scheduled: bool,
    pub created_on_k8s: bool,
    pub started: bool,
    pub finished: bool,
    pub succeeded: bool,
    pub time_started: Option<DateTime<Utc>>,
    pub tries: u16,
    pub batches: Vec<Uuid>,
}

impl BatchJob {
    /// The name of the Kubernetes Job this `Batch_Job` maps to once
    /// scheduled, per spec.md §6's job-name grammar:
    /// `<job_definition.name>-<batch_job.id>`.
    pub fn k8s_job_name(&self, job_definition_name: &str) -> String {
        format!("{job_definition_name}-{}", self.id)
    }
}

/// Parses the trailing `-<id>` token of a Kubernetes job name back into a
/// `Batch_Job` id, as the watcher must (spec.md §4.4, §6).
pub fn parse_batch_job_id(job_name: &str) -> Option<Id> {
    job_name.rsplit('-').next()?.parse::<Id>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_name_round_trips_through_last_hyphen_token() {
        let bj = BatchJob {
            id: 42,
            ..Default::default()
        };
        let name = bj.k8s_job_name("photo-to-video");
        assert_eq!(name, "photo-to-video-42");
        assert_eq!(parse_batch_job_id(&name), Some(42));
    }

    #[test]
    fn malformed_trailing_token_fails_to_parse() {
        assert_eq!(parse_batch_job_id("photo-to-video-abc"), None);
    }
}
