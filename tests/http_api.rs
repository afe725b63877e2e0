//! HTTP surface tests (spec.md §6): batch create/update and the
//! jobs-by-batch round-trip law.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hydra::cluster::fake::FakeClusterAdapter;
use hydra::cluster::ClusterAdapter;
use hydra::houston::HoustonClient;
use hydra::http::{router, AppState};
use hydra::scheduler::JobManager;
use hydra::store::memory::InMemoryStore;
use hydra::store::model::{CreatedBy, JobSpec, Region, RunEnvironment};
use hydra::store::Store;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

async fn test_app() -> (axum::Router, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    store
        .seed_region(Region {
            code: "eu-west".to_string(),
            description: "Europe".to_string(),
            namespace: "processing".to_string(),
        })
        .await;
    let def_id = store.seed_job_definition("photo-to-video", None).await;
    store
        .seed_job_spec(JobSpec {
            id: 0,
            job_definition_id: def_id,
            run_environment: RunEnvironment::Aws,
            container_image: "img:latest".to_string(),
            priority: 0,
            active: true,
            namespace: "processing".to_string(),
            time_limit_secs: 60,
            trigger_children: false,
            data_threshold: 10,
            created_by: CreatedBy::Greg,
            environment_variables: Default::default(),
            k8s_job_labels: Default::default(),
            init_photo_container: false,
            whitelisted_devices: vec![],
        })
        .await;

    let cluster = Arc::new(FakeClusterAdapter::new());
    let manager = Arc::new(JobManager::new(
        store.clone() as Arc<dyn Store>,
        cluster.clone() as Arc<dyn ClusterAdapter>,
        10,
        true,
    ));
    let houston = Arc::new(HoustonClient::new(None, None, true));

    let state = AppState {
        store: store.clone() as Arc<dyn Store>,
        manager,
        houston,
    };
    (router(state), store)
}

async fn post_json(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn missing_batch_id_is_a_bad_request() {
    let (app, _store) = test_app().await;
    let (status, _) = post_json(&app, "/api/batches/", json!({"region": "eu-west"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_region_is_a_bad_request() {
    let (app, _store) = test_app().await;
    let batch_id = Uuid::new_v4();
    let (status, _) = post_json(
        &app,
        "/api/batches/",
        json!({"batch_id": batch_id.to_string(), "region": "nowhere"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// S6: re-POST of the same batch_id is an update, not a second create.
#[tokio::test]
async fn repost_is_update_not_duplicate_create() {
    let (app, store) = test_app().await;
    let batch_id = Uuid::new_v4();
    let body = json!({"batch_id": batch_id.to_string(), "region": "eu-west"});

    let (status, _) = post_json(&app, "/api/batches/", body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);

    let first = store.find_batch(batch_id).await.unwrap();
    assert!(first.updated_at.is_none());

    let (status, _) = post_json(&app, "/api/batches/", body).await;
    assert_eq!(status, StatusCode::OK);

    let second = store.find_batch(batch_id).await.unwrap();
    assert!(second.updated_at.is_some());
}

/// Round-trip law 6: Total_Jobs matches the batch-jobs attached to the
/// batch, partitioned across the four buckets.
#[tokio::test]
async fn jobs_by_batch_reports_total_and_bucket() {
    let (app, _store) = test_app().await;
    let batch_id = Uuid::new_v4();
    let body = json!({"batch_id": batch_id.to_string(), "region": "eu-west"});
    let (status, _) = post_json(&app, "/api/batches/", body).await;
    assert_eq!(status, StatusCode::CREATED);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/api/jobs-by-batch/?batch_id={batch_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(value["Total_Jobs"], 1);
    assert_eq!(value["Queued_Jobs"]["Total"], 1);
    assert_eq!(value["Active_Jobs"]["Total"], 0);
    assert_eq!(value["Successful_Jobs"]["Total"], 0);
    assert_eq!(value["Failed_Jobs"]["Total"], 0);
}
