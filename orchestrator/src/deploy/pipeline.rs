//! One queued deployment, from dequeue to terminal status

use std::sync::Arc;

use api_models::models::DeployStatus;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::deploy::executor::{DeploymentExecutor, ExecutionResult};
use crate::deploy::registrar::register_containers;
use crate::deploy::tracker::DeployTracker;
use crate::errors::PlatformError;
use crate::models::deploy::Deploy;
use crate::store::Store;

/// Where a dequeued deployment ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployOutcome {
    pub deploy_id: u64,
    pub status: DeployStatus,
    pub error_message: Option<String>,
}

impl DeployOutcome {
    fn from_record(deploy: &Deploy) -> Self {
        Self {
            deploy_id: deploy.id,
            status: deploy.status(),
            error_message: deploy.error_message().map(str::to_string),
        }
    }
}

pub struct DeployPipeline {
    store: Arc<dyn Store>,
    executor: Arc<DeploymentExecutor>,
    tracker: DeployTracker,
}

impl DeployPipeline {
    pub fn new(store: Arc<dyn Store>, executor: Arc<DeploymentExecutor>) -> Self {
        Self {
            tracker: DeployTracker::new(store.clone()),
            store,
            executor,
        }
    }

    pub fn tracker(&self) -> &DeployTracker {
        &self.tracker
    }

    /// Dispatch, execute and register one deployment.
    ///
    /// Returns `None` when the record was deleted or is no longer `PENDING`
    /// by the time it is dequeued.
    pub async fn run(&self, deploy_id: u64) -> Option<DeployOutcome> {
        let deploy = match self.store.find_deploy(deploy_id).await {
            Ok(Some(deploy)) => deploy,
            Ok(None) => {
                debug!(deploy_id, "Deployment removed before dispatch, skipping");
                return None;
            }
            Err(e) => {
                error!(deploy_id, "Failed to load deployment: {}", e);
                return None;
            }
        };
        if deploy.status() != DeployStatus::Pending {
            debug!(deploy_id, "Deployment is {}, skipping", deploy.status());
            return None;
        }

        // canceled between the read above and now: the transition is refused
        let deploy = self.tracker.mark_deploying(deploy_id).await.ok()?;

        let finished = match self.execute_and_register(&deploy).await {
            Ok(count) => {
                info!(deploy_id, "Deployment succeeded with {} new containers", count);
                self.tracker.mark_succeeded(deploy_id).await
            }
            Err(message) => {
                warn!(deploy_id, "Deployment failed: {}", message);
                self.tracker.mark_failed(deploy_id, message).await
            }
        };

        match finished {
            Ok(deploy) => Some(DeployOutcome::from_record(&deploy)),
            Err(e) => {
                error!(deploy_id, "Failed to record deployment outcome: {}", e);
                None
            }
        }
    }

    /// Mark a deployment whose task died without reporting as `FAILED`
    pub async fn abort(&self, deploy_id: u64, reason: &str) -> Option<DeployOutcome> {
        match self
            .tracker
            .mark_failed(deploy_id, format!("deployment task aborted: {}", reason))
            .await
        {
            Ok(deploy) => Some(DeployOutcome::from_record(&deploy)),
            Err(PlatformError::TransitionError(_)) => None,
            Err(e) => {
                error!(deploy_id, "Failed to record aborted deployment: {}", e);
                None
            }
        }
    }

    /// Executor failure message first, then registration errors. The tenant
    /// stays locked until registration is done, so a later deployment of the
    /// same project cannot claim these containers.
    async fn execute_and_register(&self, deploy: &Deploy) -> Result<usize, String> {
        let guard = self.executor.locks().acquire(&deploy.server_id).await;
        match self.executor.execute(deploy, &guard).await {
            ExecutionResult::Success {
                container_ids,
                container_names,
                ..
            } => register_containers(self.store.as_ref(), deploy, &container_ids, &container_names)
                .await
                .map(|registration| registration.registered.len())
                .map_err(|e| e.to_string()),
            ExecutionResult::Failure { message, .. } => Err(message),
        }
    }
}
