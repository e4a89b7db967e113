//! Operations on single registered containers: stop, start, remove.
//!
//! The engine is changed first and the row second, so a failed engine call
//! leaves the record as it was.

use std::sync::Arc;

use api_models::models::ContainerStatus;
use tracing::info;

use crate::deploy::executor::DeploymentExecutor;
use crate::docker::engine::ContainerEngine;
use crate::errors::PlatformError;
use crate::models::container::Container;
use crate::store::{find_owned_server, Store};

pub struct ContainerManager {
    store: Arc<dyn Store>,
    engine: Arc<dyn ContainerEngine>,
    executor: Arc<DeploymentExecutor>,
}

impl ContainerManager {
    pub fn new(
        store: Arc<dyn Store>,
        engine: Arc<dyn ContainerEngine>,
        executor: Arc<DeploymentExecutor>,
    ) -> Self {
        Self {
            store,
            engine,
            executor,
        }
    }

    /// Every container registered for a server
    pub async fn list_containers(&self, owner_id: &str, server_id: &str) -> Result<Vec<Container>, PlatformError> {
        find_owned_server(self.store.as_ref(), owner_id, server_id).await?;
        self.store.list_containers_by_server(server_id).await
    }

    /// Force-remove the container and delete its row
    pub async fn remove_container(
        &self,
        owner_id: &str,
        server_id: &str,
        container_id: &str,
    ) -> Result<(), PlatformError> {
        let container = self.find_owned_container(owner_id, server_id, container_id).await?;

        // compose must not recreate it halfway through
        let _guard = self.executor.locks().acquire(server_id).await;
        self.engine.remove_container(&container.id).await?;
        self.store.delete_container(&container.id).await?;

        info!(server_id, deploy_id = container.deploy_id, "Container {} removed", container.name);
        Ok(())
    }

    pub async fn stop_container(
        &self,
        owner_id: &str,
        server_id: &str,
        container_id: &str,
    ) -> Result<Container, PlatformError> {
        let container = self.find_owned_container(owner_id, server_id, container_id).await?;
        self.engine.stop_container(&container.id).await?;
        self.set_status(container, ContainerStatus::Stopped).await
    }

    pub async fn start_container(
        &self,
        owner_id: &str,
        server_id: &str,
        container_id: &str,
    ) -> Result<Container, PlatformError> {
        let container = self.find_owned_container(owner_id, server_id, container_id).await?;
        self.engine.start_container(&container.id).await?;
        self.set_status(container, ContainerStatus::Running).await
    }

    async fn set_status(
        &self,
        container: Container,
        status: ContainerStatus,
    ) -> Result<Container, PlatformError> {
        self.store.update_container_status(&container.id, status).await?;
        info!(server_id = %container.server_id, "Container {} is now {:?}", container.name, status);
        self.store
            .find_container(&container.id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("container {}", container.id)))
    }

    async fn find_owned_container(
        &self,
        owner_id: &str,
        server_id: &str,
        container_id: &str,
    ) -> Result<Container, PlatformError> {
        find_owned_server(self.store.as_ref(), owner_id, server_id).await?;
        self.store
            .find_container(container_id)
            .await?
            .filter(|c| c.server_id == server_id)
            .ok_or_else(|| PlatformError::NotFound(format!("container {}", container_id)))
    }
}
