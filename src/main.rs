//! Hydra service entry point.
//!
//! Qovery-engine ships no binary of its own (it's consumed as a library by
//! a separate CLI crate); Hydra is a standalone service, so this wires the
//! pieces the engine's own `main`-adjacent bootstrap code would: load
//! config, init tracing, build the cluster adapter and store, start the
//! scheduler singleton, optionally spawn the watcher, and serve HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use hydra::cluster::kube_adapter::KubeClusterAdapter;
use hydra::cluster::ClusterAdapter;
use hydra::config::HydraConfig;
use hydra::houston::HoustonClient;
use hydra::http::{router, AppState};
use hydra::scheduler;
use hydra::store::memory::InMemoryStore;
use hydra::store::Store;
use hydra::telemetry;
use hydra::watcher::JobWatcher;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config = HydraConfig::from_env()?;

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let cluster: Arc<dyn ClusterAdapter> = Arc::new(
        KubeClusterAdapter::connect(&config.cluster_auth, config.watch_k8s_timeout, config.watch_k8s_request_timeout).await?,
    );

    scheduler::init(
        store.clone(),
        cluster.clone(),
        config.max_active_k8s_jobs,
        config.cascade_enabled,
    );
    let manager = scheduler::instance();

    if config.watch_k8s {
        let watcher = JobWatcher::new(
            cluster.clone(),
            store.clone(),
            manager.clone(),
            config.watch_k8s_namespace.clone(),
        );
        tokio::spawn(async move {
            watcher.run().await;
        });
        info!("job watcher started");
    } else {
        info!("WATCH_K8S is disabled, not starting the job watcher");
    }

    let houston = Arc::new(HoustonClient::new(
        config.houston_url.clone(),
        config.houston_token.clone(),
        config.root_cert_verify,
    ));

    let state = AppState {
        store,
        manager,
        houston,
    };
    let app = router(state);

    let addr: SocketAddr = "0.0.0.0:8000".parse()?;
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(err) = axum::serve(listener, app).await {
        error!("http server exited: {err}");
    }

    Ok(())
}
