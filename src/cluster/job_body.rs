//! Builds the `k8s_openapi` Job body.
//!
//! This is a direct transliteration of
//! `original_source/hydra/jobscheduler/jobscheduler.py::kube_create_job_object`
//! (and its `get_photo_init_container`/`get_shared_volume_mount` helpers)
//! into the typed `k8s_openapi::api::batch::v1::Job` object graph, using
//! the same builder shape the teacher uses when it touches
//! `k8s_openapi::api::batch::v1::Job` directly
//! (`Qovery-engine/src/deployment_report/job/reporter.rs`).

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, LocalObjectReference, PodSpec, PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

const SHARED_VOLUME_NAME: &str = "shared-pod-data";
const SHARED_VOLUME_MOUNT_PATH: &str = "/shared-pod-data";
const IMAGE_PULL_SECRET: &str = "gitlab-registry";
const TTL_SECONDS_AFTER_FINISHED: i32 = 600;
const PHOTO_INIT_CONTAINER_NAME: &str = "init-photo-container";
const PHOTO_INIT_CONTAINER_IMAGE: &str = "s3-image-client:latest";

use super::CreateJobRequest;

fn env_list(vars: &BTreeMap<String, String>) -> Vec<EnvVar> {
    vars.iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect()
}

fn shared_volume_mount() -> VolumeMount {
    VolumeMount {
        name: SHARED_VOLUME_NAME.to_string(),
        mount_path: SHARED_VOLUME_MOUNT_PATH.to_string(),
        ..Default::default()
    }
}

/// The init container that downloads photo data for `BATCH_IDS` into the
/// shared `emptyDir`, per spec.md §6 and the original's
/// `get_photo_init_container`.
fn photo_init_container(env: &BTreeMap<String, String>) -> Container {
    let batch_ids = env.get("BATCH_IDS").cloned().unwrap_or_default();
    let mut secret_env = BTreeMap::new();
    secret_env.insert(
        "AWS_ACCESS_KEY_ID".to_string(),
        "vault:secret/data/hydra#AWS_ACCESS_KEY_ID".to_string(),
    );
    secret_env.insert(
        "AWS_SECRET_ACCESS_KEY".to_string(),
        "vault:secret/data/hydra#AWS_SECRET_ACCESS_KEY".to_string(),
    );

    Container {
        name: PHOTO_INIT_CONTAINER_NAME.to_string(),
        image: Some(PHOTO_INIT_CONTAINER_IMAGE.to_string()),
        env: Some(env_list(&secret_env)),
        args: Some(vec![
            "./image_client.py".to_string(),
            format!("--batch={batch_ids}"),
            "--download".to_string(),
            format!("--download_dir={SHARED_VOLUME_MOUNT_PATH}"),
            "--sequential".to_string(),
            "--print_summary".to_string(),
        ]),
        volume_mounts: Some(vec![shared_volume_mount()]),
        ..Default::default()
    }
}

fn vault_annotations() -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    annotations.insert(
        "vault.security.banzaicloud.io/vault-addr".to_string(),
        "https://vault.vault:8200".to_string(),
    );
    annotations.insert(
        "vault.security.banzaicloud.io/vault-role".to_string(),
        "applications".to_string(),
    );
    annotations.insert(
        "vault.security.banzaicloud.io/vault-tls-secret".to_string(),
        "vault-tls".to_string(),
    );
    annotations
}

/// Builds the full `V1Job`-equivalent body for `create_job` (spec.md §4.2).
pub fn build_job(req: &CreateJobRequest<'_>) -> Job {
    let mut labels = req.labels.clone();
    labels.insert("name".to_string(), req.name.to_string());

    let container = Container {
        name: "jobcontainer".to_string(),
        image: Some(req.container_image.to_string()),
        image_pull_policy: Some("Always".to_string()),
        env: Some(env_list(req.env)),
        volume_mounts: Some(vec![shared_volume_mount()]),
        ..Default::default()
    };

    let init_containers = if req.init_photo_container {
        Some(vec![photo_init_container(req.env)])
    } else {
        None
    };

    let pod_spec = PodSpec {
        containers: vec![container],
        init_containers,
        restart_policy: Some("Never".to_string()),
        image_pull_secrets: Some(vec![LocalObjectReference {
            name: IMAGE_PULL_SECRET.to_string(),
        }]),
        volumes: Some(vec![Volume {
            name: SHARED_VOLUME_NAME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let pod_template = PodTemplateSpec {
        metadata: Some(ObjectMeta {
            annotations: Some(vault_annotations()),
            labels: Some(labels.clone()),
            ..Default::default()
        }),
        spec: Some(pod_spec),
    };

    Job {
        metadata: ObjectMeta {
            name: Some(req.name.to_string()),
            namespace: Some(req.namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(JobSpec {
            ttl_seconds_after_finished: Some(TTL_SECONDS_AFTER_FINISHED),
            template: pod_template,
            ..Default::default()
        }),
        status: None,
    }
}
