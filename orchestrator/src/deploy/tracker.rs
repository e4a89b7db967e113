//! Deployment record tracker. Every status write goes through the store's
//! atomic transition.

use std::sync::Arc;

use tracing::{info, warn};

use crate::deploy::fsm::DeployEvent;
use crate::errors::PlatformError;
use crate::models::deploy::{Deploy, NewDeploy};
use crate::store::Store;

#[derive(Clone)]
pub struct DeployTracker {
    store: Arc<dyn Store>,
}

impl DeployTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record a new deployment in `PENDING`
    pub async fn create(&self, new: NewDeploy) -> Result<Deploy, PlatformError> {
        let deploy = self.store.insert_deploy(new).await?;
        info!(
            deploy_id = deploy.id,
            server_id = %deploy.server_id,
            "Deployment recorded as {}",
            deploy.status()
        );
        Ok(deploy)
    }

    pub async fn mark_deploying(&self, id: u64) -> Result<Deploy, PlatformError> {
        self.apply(id, DeployEvent::Dispatch).await
    }

    pub async fn mark_succeeded(&self, id: u64) -> Result<Deploy, PlatformError> {
        self.apply(id, DeployEvent::Succeed).await
    }

    pub async fn mark_failed(&self, id: u64, message: impl Into<String>) -> Result<Deploy, PlatformError> {
        self.apply(id, DeployEvent::Fail(message.into())).await
    }

    pub async fn cancel(&self, id: u64, reason: impl Into<String>) -> Result<Deploy, PlatformError> {
        self.apply(id, DeployEvent::Cancel(reason.into())).await
    }

    async fn apply(&self, id: u64, event: DeployEvent) -> Result<Deploy, PlatformError> {
        match self.store.transition_deploy(id, event).await {
            Ok(deploy) => {
                info!(deploy_id = id, "Deployment is now {}", deploy.status());
                Ok(deploy)
            }
            Err(e) => {
                warn!(deploy_id = id, "Deployment transition rejected: {}", e);
                Err(e)
            }
        }
    }
}
