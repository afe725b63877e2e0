//! `kube`/`k8s-openapi`-backed [`super::ClusterAdapter`].
//!
//! Connection setup mirrors
//! `original_source/hydra/jobscheduler/jobscheduler.py::_init_instance`:
//! when `K8S_API_URL` is set we build a token-authenticated `kube::Config`
//! with a CA bundle decoded from `K8S_CACERT`; otherwise we infer from the
//! environment (kubeconfig), matching `config.load_kube_config()`. The
//! teacher builds its own `kube::Client`s the same dual-mode way in
//! `Qovery-engine/src/infrastructure/models/kubernetes/mod.rs`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use futures::stream::{BoxStream, StreamExt};
use k8s_openapi::api::batch::v1::Job;
use kube::api::{Api, DeleteParams, ListParams, PostParams, PropagationPolicy, WatchEvent, WatchParams};
use kube::config::{AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext};
use kube::{Client, Config};
use tracing::{debug, info, instrument, warn};

use crate::config::ClusterAuth;
use crate::errors::ClusterError;

use super::{
    CleanupState, ClusterAdapter, CreateJobRequest, JobEvent, JobStatus, JobStatusFlags, WatchEventType,
};

pub struct KubeClusterAdapter {
    client: Client,
    /// Server-side `WatchParams` timeout (`WATCH_K8S_TIMEOUT`, spec.md §4.2).
    watch_timeout: Duration,
    /// Client-side ceiling on a single `api.watch` call, kept slightly above
    /// `watch_timeout` by the operator so it only fires when the server
    /// fails to close the connection itself (`WATCH_K8S_REQUEST_TIMEOUT`).
    watch_request_timeout: Duration,
}

impl KubeClusterAdapter {
    /// Builds the adapter's `kube::Client` from [`ClusterAuth`] (spec.md
    /// §4.2's `K8S_API_URL`/`K8S_CACERT`/`K8S_TOKEN`/kubeconfig rules).
    pub async fn connect(
        auth: &ClusterAuth,
        watch_timeout: Duration,
        watch_request_timeout: Duration,
    ) -> Result<Self, ClusterError> {
        let config = match auth {
            ClusterAuth::Token {
                api_url,
                cacert_base64,
                token,
            } => {
                let cacert_pem = base64::engine::general_purpose::STANDARD
                    .decode(cacert_base64)
                    .map_err(|e| ClusterError::Other(format!("invalid K8S_CACERT: {e}")))?;

                let kubeconfig = Kubeconfig {
                    clusters: vec![NamedCluster {
                        name: "hydra".to_string(),
                        cluster: Some(Cluster {
                            server: Some(api_url.clone()),
                            certificate_authority_data: Some(
                                base64::engine::general_purpose::STANDARD.encode(&cacert_pem),
                            ),
                            ..Default::default()
                        }),
                    }],
                    auth_infos: vec![NamedAuthInfo {
                        name: "hydra".to_string(),
                        auth_info: Some(AuthInfo {
                            token: Some(token.clone().into()),
                            ..Default::default()
                        }),
                    }],
                    contexts: vec![NamedContext {
                        name: "hydra".to_string(),
                        context: Some(Context {
                            cluster: "hydra".to_string(),
                            user: Some("hydra".to_string()),
                            ..Default::default()
                        }),
                    }],
                    current_context: Some("hydra".to_string()),
                    ..Default::default()
                };

                Config::from_custom_kubeconfig(kubeconfig, &Default::default())
                    .await
                    .map_err(|e| ClusterError::Other(format!("failed to build k8s config: {e}")))?
            }
            ClusterAuth::Kubeconfig => {
                info!("loading k8s config from file-system");
                Config::infer()
                    .await
                    .map_err(|e| ClusterError::Other(format!("failed to infer k8s config: {e}")))?
            }
        };

        let client = Client::try_from(config).map_err(|e| ClusterError::Other(format!("failed to build client: {e}")))?;

        Ok(KubeClusterAdapter {
            client,
            watch_timeout,
            watch_request_timeout,
        })
    }

    fn jobs_api(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn status_from_job(job: &Job) -> JobStatus {
    let Some(status) = job.status.as_ref() else {
        return JobStatus::NotFound;
    };
    // Preference order per spec.md §4.2: succeeded > active > failed.
    if status.succeeded.unwrap_or(0) > 0 {
        JobStatus::Succeeded
    } else if status.active.unwrap_or(0) > 0 {
        JobStatus::Active
    } else if status.failed.unwrap_or(0) > 0 {
        JobStatus::Failed
    } else {
        JobStatus::NonSucceeded
    }
}

fn flags_from_job(job: &Job) -> JobStatusFlags {
    let status = job.status.as_ref();
    JobStatusFlags {
        active: status.and_then(|s| s.active),
        succeeded: status.and_then(|s| s.succeeded),
        failed: status.and_then(|s| s.failed),
    }
}

#[async_trait]
impl ClusterAdapter for KubeClusterAdapter {
    #[instrument(skip(self, req), fields(job_name = req.name))]
    async fn create_job(&self, req: CreateJobRequest<'_>) -> Result<(), ClusterError> {
        let body = super::job_body::build_job(&req);
        let api = self.jobs_api(req.namespace);
        match api.create(&PostParams::default(), &body).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 409 => {
                debug!("job {} already exists on k8s", req.name);
                Err(ClusterError::AlreadyExists)
            }
            Err(kube::Error::Api(resp)) if resp.code == 422 || resp.code == 400 => {
                Err(ClusterError::Invalid(resp.message))
            }
            Err(e) => {
                warn!("could not create job {}: {e}", req.name);
                Err(ClusterError::Other(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn delete_job(&self, name: &str, namespace: &str) -> Result<(), ClusterError> {
        let api = self.jobs_api(namespace);
        let dp = DeleteParams {
            grace_period_seconds: Some(0),
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };
        match api.delete(name, &dp).await {
            Ok(_) => {}
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                warn!("job {name} was already deleted");
            }
            Err(e) => {
                warn!("could not delete job {name}: {e}");
            }
        }
        // make sure the job is marked for deletion cluster-side before we
        // move on, matching the short settle delay in the source adapter.
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        Ok(())
    }

    async fn job_exists(&self, name: &str, namespace: &str) -> Result<bool, ClusterError> {
        let api = self.jobs_api(namespace);
        match api.get(name).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(ClusterError::Other(e.to_string())),
        }
    }

    async fn job_status(&self, name: &str, namespace: &str) -> Result<JobStatus, ClusterError> {
        let api = self.jobs_api(namespace);
        match api.get_status(name).await {
            Ok(job) => Ok(status_from_job(&job)),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(JobStatus::NotFound),
            Err(e) => Err(ClusterError::Other(e.to_string())),
        }
    }

    async fn cleanup_jobs_with_state(
        &self,
        namespace: &str,
        state: CleanupState,
        label_selector: &str,
    ) -> Result<Vec<String>, ClusterError> {
        let api = self.jobs_api(namespace);
        let lp = ListParams::default().labels(label_selector).timeout(60);
        let jobs = api
            .list(&lp)
            .await
            .map_err(|e| ClusterError::Other(e.to_string()))?;

        let mut deleted = Vec::new();
        for job in jobs.items {
            let Some(name) = job.metadata.name.clone() else {
                continue;
            };
            let status = job.status.as_ref();
            let should_delete = match state {
                CleanupState::Finished => status.map(|s| s.succeeded.unwrap_or(0) == 1).unwrap_or(false),
                CleanupState::Active => status
                    .map(|s| s.conditions.is_none() && s.active.unwrap_or(0) == 1)
                    .unwrap_or(false),
            };
            if should_delete {
                self.delete_job(&name, namespace).await?;
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    fn watch_jobs(&self, namespace: &str) -> BoxStream<'static, Result<JobEvent, ClusterError>> {
        let api = self.jobs_api(namespace);
        let wp = WatchParams::default().timeout(self.watch_timeout.as_secs() as u32);
        let request_timeout = self.watch_request_timeout;

        async_stream::stream! {
            loop {
                let stream = match tokio::time::timeout(request_timeout, api.watch(&wp, "0")).await {
                    Ok(Ok(s)) => s,
                    Ok(Err(e)) => {
                        yield Err(ClusterError::Other(e.to_string()));
                        return;
                    }
                    Err(_) => {
                        yield Err(ClusterError::Other(format!(
                            "watch request did not open within {}s",
                            request_timeout.as_secs()
                        )));
                        return;
                    }
                };
                futures::pin_mut!(stream);
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(WatchEvent::Added(job)) => {
                            if let Some(event) = to_job_event(WatchEventType::Added, &job) {
                                yield Ok(event);
                            }
                        }
                        Ok(WatchEvent::Modified(job)) => {
                            if let Some(event) = to_job_event(WatchEventType::Modified, &job) {
                                yield Ok(event);
                            }
                        }
                        Ok(WatchEvent::Deleted(job)) => {
                            if let Some(event) = to_job_event(WatchEventType::Deleted, &job) {
                                yield Ok(event);
                            }
                        }
                        Ok(WatchEvent::Bookmark(_)) => {}
                        Ok(WatchEvent::Error(err)) => {
                            yield Err(ClusterError::Other(err.to_string()));
                        }
                        Err(e) => {
                            yield Err(ClusterError::Other(e.to_string()));
                        }
                    }
                }
                // stream ended (timeout or disconnect); caller loop re-enters
                // and re-opens a fresh watch, matching the source's
                // `del w; del job_events_stream; time.sleep(2)` retry.
                return;
            }
        }
        .boxed()
    }
}

fn to_job_event(event_type: WatchEventType, job: &Job) -> Option<JobEvent> {
    let job_name = job.metadata.name.clone()?;
    Some(JobEvent {
        event_type,
        job_name,
        resource_version: job.metadata.resource_version.clone(),
        creation_timestamp: job.metadata.creation_timestamp.clone().map(|t| t.0),
        status: flags_from_job(job),
    })
}
