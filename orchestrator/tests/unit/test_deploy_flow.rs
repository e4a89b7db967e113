//! Submission through pipeline, against fake compose and engine

use std::sync::Arc;
use std::time::Duration;

use api_models::models::{ContainerStatus, DeployStatus};
use beanstalk::deploy::executor::DeploymentExecutor;
use beanstalk::deploy::fsm::DeployEvent;
use beanstalk::deploy::pipeline::DeployPipeline;
use beanstalk::deploy::registrar::register_containers;
use beanstalk::deploy::service::DeployUpload;
use beanstalk::errors::PlatformError;
use beanstalk::filesys::file::File;
use beanstalk::models::deploy::NewDeploy;
use beanstalk::storage::layout::COMPOSE_FILE_NAME;
use beanstalk::store::Store;
use serde_yaml::Value;

use crate::common::{
    seed_server, upload, FakeCompose, FakeEngine, Harness, SlowStore, OWNER, SERVER, WEB_MANIFEST,
};

#[tokio::test]
async fn test_successful_deploy_registers_containers() {
    let mut harness = Harness::new(FakeCompose::succeeding()).await;
    harness.engine.add_container("abc123", "s1_web_1", SERVER, "running");

    let deploy = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    assert_eq!(deploy.status(), DeployStatus::Pending);

    // staged manifest carries the tenant binding
    let staged = File::new(&deploy.compose_path).read_string().await.unwrap();
    let doc: Value = serde_yaml::from_str(&staged).unwrap();
    let web = doc.get("services").and_then(|s| s.get("web")).unwrap();
    assert_eq!(
        web.get("labels").and_then(|l| l.get("serverId")),
        Some(&Value::from(SERVER))
    );
    assert_eq!(
        doc.get("networks")
            .and_then(|n| n.get("network-server-s1"))
            .and_then(|n| n.get("external")),
        Some(&Value::Bool(true))
    );

    let outcomes = harness.drain().await;
    assert_eq!(outcomes.len(), 1);
    let outcome = outcomes[0].clone().unwrap();
    assert_eq!(outcome.status, DeployStatus::Success);

    let stored = harness.store.find_deploy(deploy.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), DeployStatus::Success);

    let containers = harness
        .state
        .deploys
        .list_containers(OWNER, SERVER, deploy.id)
        .await
        .unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].id, "abc123");
    assert_eq!(containers[0].name, "s1_web_1");
    assert_eq!(containers[0].image, "s1_web_1");
    assert_eq!(containers[0].status, ContainerStatus::Created);

    let calls = harness.compose.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].starts_with("up app-s1 "));
}

#[tokio::test]
async fn test_failed_compose_records_output() {
    let mut harness = Harness::new(FakeCompose::failing_up(1, "service web failed to start\n")).await;

    let deploy = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    harness.drain().await;

    let stored = harness.store.find_deploy(deploy.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), DeployStatus::Failed);
    assert_eq!(stored.error_message(), Some("service web failed to start"));
    assert!(harness
        .store
        .list_containers_by_deploy(deploy.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_listing_failure_fails_deploy() {
    let mut harness = Harness::new(FakeCompose::succeeding()).await;
    harness
        .engine
        .fail_listing
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let deploy = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    harness.drain().await;

    let stored = harness.store.find_deploy(deploy.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), DeployStatus::Failed);
    assert!(stored.error_message().unwrap().contains("engine unavailable"));
}

#[tokio::test]
async fn test_invalid_manifest_is_rejected_before_recording() {
    let mut harness = Harness::new(FakeCompose::succeeding()).await;

    let err = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", "services:\n  web:\n    ports: [\"80:80\"]\n"))
        .await
        .unwrap_err();
    match err {
        PlatformError::InvalidManifest(errors) => {
            assert_eq!(errors, vec!["service 'web' requires 'image' or 'build'".to_string()]);
        }
        other => panic!("unexpected error: {}", other),
    }

    assert!(harness.store.list_deploys(SERVER).await.unwrap().is_empty());
    assert!(harness.drain().await.is_empty());
    assert!(harness.compose.calls().is_empty());
}

#[tokio::test]
async fn test_foreign_owner_is_refused_without_side_effects() {
    let harness = Harness::new(FakeCompose::succeeding()).await;

    let err = harness
        .state
        .deploys
        .submit_deploy("intruder", SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Unauthorized(_)));
    assert!(!harness.dir.path().join(SERVER).exists());
    assert!(harness.store.list_deploys(SERVER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bad_workspace_name_is_validation_error() {
    let harness = Harness::new(FakeCompose::succeeding()).await;

    for name in ["../escape", "with space", ""] {
        let err = harness
            .state
            .deploys
            .submit_deploy(OWNER, SERVER, upload(name, WEB_MANIFEST))
            .await
            .unwrap_err();
        assert!(err.is_validation(), "{}: {}", name, err);
    }
    assert!(harness.store.list_deploys(SERVER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_and_oversized_uploads_are_refused() {
    let harness = Harness::new(FakeCompose::succeeding()).await;

    let err = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::ValidationError(_)));

    let huge = DeployUpload {
        workspace: "main".to_string(),
        manifest: WEB_MANIFEST.as_bytes().to_vec(),
        env: Some(vec![b'x'; 11 * 1024 * 1024]),
    };
    let err = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, huge)
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::ValidationError(_)));
}

#[tokio::test]
async fn test_env_file_is_staged_next_to_manifest() {
    let harness = Harness::new(FakeCompose::succeeding()).await;

    let with_env = DeployUpload {
        workspace: "main".to_string(),
        manifest: WEB_MANIFEST.as_bytes().to_vec(),
        env: Some(b"PORT=8080\n".to_vec()),
    };
    let deploy = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, with_env)
        .await
        .unwrap();

    let env_path = deploy.env_path.clone().unwrap();
    assert_eq!(env_path.parent(), deploy.compose_path.parent());
    assert_eq!(
        File::new(&env_path).read_string().await.unwrap(),
        "PORT=8080\n"
    );
}

#[tokio::test]
async fn test_full_queue_cancels_submission() {
    let harness = Harness::with_capacity(FakeCompose::succeeding(), 1).await;

    let first = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    let err = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::QueueFull(_)));

    let deploys = harness.store.list_deploys(SERVER).await.unwrap();
    assert_eq!(deploys.len(), 2);
    assert_eq!(deploys[0].id, first.id);
    assert_eq!(deploys[0].status(), DeployStatus::Pending);
    assert_eq!(deploys[1].status(), DeployStatus::Canceled);
    assert!(deploys[1].error_message().unwrap().contains("full"));
}

#[tokio::test]
async fn test_canceled_deploy_is_skipped_by_worker() {
    let mut harness = Harness::new(FakeCompose::succeeding()).await;

    let deploy = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    let canceled = harness
        .state
        .deploys
        .cancel_deploy(OWNER, SERVER, deploy.id)
        .await
        .unwrap();
    assert_eq!(canceled.status(), DeployStatus::Canceled);

    assert_eq!(harness.drain().await, vec![None]);
    assert!(harness.compose.calls().is_empty());
}

#[tokio::test]
async fn test_remove_survives_failed_teardown() {
    let mut harness = Harness::new(FakeCompose::succeeding().with_failing_down()).await;
    harness.engine.add_container("abc123", "s1_web_1", SERVER, "running");

    let deploy = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    harness.drain().await;

    harness
        .state
        .deploys
        .remove_deploy(OWNER, SERVER, deploy.id)
        .await
        .unwrap();

    assert!(harness.store.find_deploy(deploy.id).await.unwrap().is_none());
    assert!(harness
        .store
        .list_containers_by_deploy(deploy.id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(harness.compose.calls().last().unwrap(), "down app-s1");
}

#[tokio::test]
async fn test_remove_survives_missing_compose() {
    let harness = Harness::new(FakeCompose::succeeding().with_missing_down()).await;

    let deploy = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    harness
        .state
        .deploys
        .remove_deploy(OWNER, SERVER, deploy.id)
        .await
        .unwrap();
    assert!(harness.store.find_deploy(deploy.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_while_deploying_conflicts() {
    let harness = Harness::new(FakeCompose::succeeding()).await;

    let deploy = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    harness
        .store
        .transition_deploy(deploy.id, DeployEvent::Dispatch)
        .await
        .unwrap();

    let err = harness
        .state
        .deploys
        .remove_deploy(OWNER, SERVER, deploy.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Conflict(_)));
    assert!(harness.compose.calls().is_empty());
}

#[tokio::test]
async fn test_deploy_of_other_server_is_not_found() {
    let harness = Harness::new(FakeCompose::succeeding()).await;
    crate::common::seed_server(harness.store.as_ref(), "s2", OWNER).await;

    let deploy = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();

    let err = harness
        .state
        .deploys
        .remove_deploy(OWNER, "s2", deploy.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::NotFound(_)));
}

#[tokio::test]
async fn test_mismatched_engine_lists_register_nothing() {
    let harness = Harness::new(FakeCompose::succeeding()).await;
    let deploy = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();

    let ids = vec!["a".to_string(), "b".to_string()];
    let names = vec!["/s1_web_1".to_string()];
    let err = register_containers(harness.store.as_ref(), &deploy, &ids, &names)
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::ConsistencyError(_)));
    assert!(harness
        .store
        .list_containers_by_server(SERVER)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_redeploy_keeps_earlier_rows() {
    let mut harness = Harness::new(FakeCompose::succeeding()).await;
    harness.engine.add_container("abc123", "s1_web_1", SERVER, "running");

    let first = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    harness.drain().await;

    harness.engine.add_container("def456", "s1_worker_1", SERVER, "running");
    let second = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("worker", WEB_MANIFEST))
        .await
        .unwrap();
    harness.drain().await;

    let first_rows = harness.store.list_containers_by_deploy(first.id).await.unwrap();
    let second_rows = harness.store.list_containers_by_deploy(second.id).await.unwrap();
    assert_eq!(first_rows.len(), 1);
    assert_eq!(first_rows[0].id, "abc123");
    assert_eq!(second_rows.len(), 1);
    assert_eq!(second_rows[0].id, "def456");
}

#[tokio::test]
async fn test_recovery_fails_interrupted_and_requeues_pending() {
    let mut harness = Harness::new(FakeCompose::succeeding()).await;

    let interrupted = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    let waiting = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    // simulate a restart: queue contents are lost, one record was mid-flight
    while harness.receiver.try_recv().is_ok() {}
    harness
        .store
        .transition_deploy(interrupted.id, DeployEvent::Dispatch)
        .await
        .unwrap();

    let report = harness.state.deploys.recover().await.unwrap();
    assert_eq!(report.failed, vec![interrupted.id]);
    assert_eq!(report.requeued, vec![waiting.id]);

    let failed = harness.store.find_deploy(interrupted.id).await.unwrap().unwrap();
    assert_eq!(failed.status(), DeployStatus::Failed);

    let outcomes = harness.drain().await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].as_ref().unwrap().status, DeployStatus::Success);
}

#[tokio::test]
async fn test_missing_staged_manifest_fails_deploy() {
    let mut harness = Harness::new(FakeCompose::succeeding()).await;

    let deploy = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    tokio::fs::remove_file(&deploy.compose_path).await.unwrap();

    let outcome = harness.drain().await[0].clone().unwrap();
    assert_eq!(outcome.status, DeployStatus::Failed);
    assert!(outcome.error_message.unwrap().starts_with("manifest not found"));
    assert!(harness.compose.calls().is_empty());
}

#[tokio::test]
async fn test_staged_manifest_replaced_by_directory_fails_deploy() {
    let mut harness = Harness::new(FakeCompose::succeeding()).await;

    let deploy = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    tokio::fs::remove_file(&deploy.compose_path).await.unwrap();
    tokio::fs::create_dir(&deploy.compose_path).await.unwrap();

    let outcome = harness.drain().await[0].clone().unwrap();
    assert_eq!(outcome.status, DeployStatus::Failed);
    assert!(harness.compose.calls().is_empty());
}

#[tokio::test]
async fn test_remove_of_queued_deploy_wins_over_worker() {
    let harness =
        Harness::new(FakeCompose::succeeding().with_slow_down(Duration::from_millis(200))).await;
    harness.engine.add_container("abc123", "s1_web_1", SERVER, "running");

    let deploy = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    let deploy_id = deploy.id;

    let deploys = harness.state.deploys.clone();
    let removal =
        tokio::spawn(async move { deploys.remove_deploy(OWNER, SERVER, deploy_id).await });

    while !harness.compose.calls().iter().any(|c| c == "down app-s1") {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    // the worker dequeues it while teardown is still running
    assert_eq!(harness.state.pipeline.run(deploy_id).await, None);

    removal.await.unwrap().unwrap();
    assert!(harness.store.find_deploy(deploy_id).await.unwrap().is_none());
    assert!(harness
        .store
        .list_containers_by_server(SERVER)
        .await
        .unwrap()
        .is_empty());
    assert!(!harness.compose.calls().iter().any(|c| c.starts_with("up ")));
}

#[tokio::test]
async fn test_remove_of_queued_deploy_cancels_it_first() {
    let harness = Harness::new(FakeCompose::succeeding().with_missing_down()).await;

    let deploy = harness
        .state
        .deploys
        .submit_deploy(OWNER, SERVER, upload("main", WEB_MANIFEST))
        .await
        .unwrap();
    harness
        .state
        .deploys
        .remove_deploy(OWNER, SERVER, deploy.id)
        .await
        .unwrap();

    // the queued id is still handed to a worker, which finds nothing to do
    assert_eq!(harness.state.pipeline.run(deploy.id).await, None);
    assert_eq!(harness.compose.calls(), vec!["down app-s1".to_string()]);
}

#[tokio::test]
async fn test_same_tenant_deploys_register_only_their_own_containers() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join(COMPOSE_FILE_NAME);
    tokio::fs::write(&manifest, WEB_MANIFEST).await.unwrap();

    let store = Arc::new(SlowStore::new(Duration::from_millis(200)));
    let engine = Arc::new(FakeEngine::default());
    let compose = Arc::new(FakeCompose::succeeding().spawning_into(engine.clone()));
    let executor = Arc::new(DeploymentExecutor::new(compose.clone(), engine.clone()));
    let pipeline = Arc::new(DeployPipeline::new(store.clone(), executor));
    seed_server(store.as_ref(), SERVER, OWNER).await;

    let mut ids = Vec::new();
    for workspace in ["first", "second"] {
        let deploy = store
            .insert_deploy(NewDeploy {
                server_id: SERVER.to_string(),
                workspace: workspace.to_string(),
                compose_path: manifest.clone(),
                env_path: None,
            })
            .await
            .unwrap();
        ids.push(deploy.id);
    }

    // the first run registers slowly, the second starts while it does
    let first = {
        let pipeline = pipeline.clone();
        let id = ids[0];
        tokio::spawn(async move { pipeline.run(id).await })
    };
    while compose.calls().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let second = pipeline.run(ids[1]).await.unwrap();
    let first = first.await.unwrap().unwrap();

    assert_eq!(first.status, DeployStatus::Success);
    assert_eq!(second.status, DeployStatus::Success);

    let rows = |id: u64| {
        let store = store.clone();
        async move {
            store
                .list_containers_by_deploy(id)
                .await
                .unwrap()
                .into_iter()
                .map(|c| c.id)
                .collect::<Vec<_>>()
        }
    };
    assert_eq!(rows(ids[0]).await, vec!["c1".to_string()]);
    assert_eq!(rows(ids[1]).await, vec!["c2".to_string()]);
}
