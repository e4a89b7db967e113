//! Container status monitor

use std::sync::atomic::Ordering;

use api_models::models::ContainerStatus;
use beanstalk::workers::monitor::{server_health, sync_container_statuses};

use crate::common::{upload, FakeCompose, Harness, OWNER, SERVER, WEB_MANIFEST};

#[tokio::test]
async fn test_sweep_follows_engine_state() {
    let mut harness = Harness::new(FakeCompose::succeeding()).await;
    harness.engine.add_container("abc123", "s1_web_1", SERVER, "running");
    harness.engine.add_container("def456", "s1_db_1", SERVER, "running");

    harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    harness.drain().await;

    // registered as CREATED, engine says running
    let updated = sync_container_statuses(harness.store.as_ref(), harness.engine.as_ref())
        .await
        .unwrap();
    assert_eq!(updated, 2);

    harness.engine.set_state("abc123", "exited");
    harness.engine.drop_container("def456");
    sync_container_statuses(harness.store.as_ref(), harness.engine.as_ref())
        .await
        .unwrap();

    let containers = harness.store.list_containers_by_server(SERVER).await.unwrap();
    assert!(containers.iter().all(|c| c.status == ContainerStatus::Stopped));

    let health = server_health(harness.store.as_ref(), SERVER).await.unwrap();
    assert_eq!(health.total_containers, 2);
    assert_eq!(health.running_containers, 0);
    assert_eq!(health.stopped_containers, 2);
    assert_eq!(health.overall_status, "DEGRADED");
}

#[tokio::test]
async fn test_unchanged_status_is_not_rewritten() {
    let mut harness = Harness::new(FakeCompose::succeeding()).await;
    harness.engine.add_container("abc123", "s1_web_1", SERVER, "created");

    harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    harness.drain().await;

    let updated = sync_container_statuses(harness.store.as_ref(), harness.engine.as_ref())
        .await
        .unwrap();
    assert_eq!(updated, 0);

    let health = server_health(harness.store.as_ref(), SERVER).await.unwrap();
    assert_eq!(health.overall_status, "HEALTHY");
}

#[tokio::test]
async fn test_unlisted_container_is_inspected() {
    let mut harness = Harness::new(FakeCompose::succeeding()).await;
    harness.engine.add_container("abc123", "s1_web_1", SERVER, "created");

    harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    harness.drain().await;

    harness.engine.strip_labels("abc123");
    harness.engine.set_state("abc123", "paused");
    let updated = sync_container_statuses(harness.store.as_ref(), harness.engine.as_ref())
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let containers = harness.store.list_containers_by_server(SERVER).await.unwrap();
    assert_eq!(containers[0].status, ContainerStatus::Paused);
}

#[tokio::test]
async fn test_inspect_error_leaves_status_alone() {
    let mut harness = Harness::new(FakeCompose::succeeding()).await;
    harness.engine.add_container("abc123", "s1_web_1", SERVER, "running");

    harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    harness.drain().await;
    sync_container_statuses(harness.store.as_ref(), harness.engine.as_ref())
        .await
        .unwrap();

    harness.engine.strip_labels("abc123");
    harness.engine.fail_inspect.store(true, Ordering::SeqCst);
    let updated = sync_container_statuses(harness.store.as_ref(), harness.engine.as_ref())
        .await
        .unwrap();
    assert_eq!(updated, 0);

    let containers = harness.store.list_containers_by_server(SERVER).await.unwrap();
    assert_eq!(containers[0].status, ContainerStatus::Running);

    let health = server_health(harness.store.as_ref(), SERVER).await.unwrap();
    assert_eq!(health.overall_status, "HEALTHY");
}
