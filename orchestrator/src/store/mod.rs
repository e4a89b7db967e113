//! Durable records for servers, deployments and containers.
//!
//! Deployment status is only ever written through [`Store::transition_deploy`],
//! which re-reads the record under the store lock, runs the state machine and
//! saves in one step. Callers never write back a stale copy of a record.

pub mod memory;

use api_models::models::ContainerStatus;
use async_trait::async_trait;

use crate::deploy::fsm::DeployEvent;
use crate::errors::PlatformError;
use crate::models::container::Container;
use crate::models::deploy::{Deploy, NewDeploy};
use crate::models::server::Server;

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace a server
    async fn save_server(&self, server: Server) -> Result<(), PlatformError>;

    async fn find_server(&self, id: &str) -> Result<Option<Server>, PlatformError>;

    async fn list_servers(&self) -> Result<Vec<Server>, PlatformError>;

    async fn delete_server(&self, id: &str) -> Result<bool, PlatformError>;

    /// Record a new `PENDING` deployment and assign its id
    async fn insert_deploy(&self, new: NewDeploy) -> Result<Deploy, PlatformError>;

    async fn find_deploy(&self, id: u64) -> Result<Option<Deploy>, PlatformError>;

    /// Deployments of one server, oldest first
    async fn list_deploys(&self, server_id: &str) -> Result<Vec<Deploy>, PlatformError>;

    /// Every deployment, oldest first
    async fn list_all_deploys(&self) -> Result<Vec<Deploy>, PlatformError>;

    /// Apply `event` to the stored record atomically and return the result
    async fn transition_deploy(&self, id: u64, event: DeployEvent) -> Result<Deploy, PlatformError>;

    /// Delete a deployment together with its container rows
    async fn delete_deploy(&self, id: u64) -> Result<bool, PlatformError>;

    /// Insert a container row. Returns `false`, leaving the existing row
    /// untouched, when the engine id is already registered, and fails with
    /// `ConsistencyError` when the owning deploy no longer exists.
    async fn insert_container(&self, container: Container) -> Result<bool, PlatformError>;

    async fn find_container(&self, id: &str) -> Result<Option<Container>, PlatformError>;

    async fn list_containers_by_deploy(&self, deploy_id: u64) -> Result<Vec<Container>, PlatformError>;

    async fn list_containers_by_server(&self, server_id: &str) -> Result<Vec<Container>, PlatformError>;

    async fn update_container_status(
        &self,
        id: &str,
        status: ContainerStatus,
    ) -> Result<bool, PlatformError>;

    async fn delete_container(&self, id: &str) -> Result<bool, PlatformError>;
}

/// The server, if it exists and belongs to `owner_id`
pub async fn find_owned_server(
    store: &dyn Store,
    owner_id: &str,
    server_id: &str,
) -> Result<Server, PlatformError> {
    let server = store
        .find_server(server_id)
        .await?
        .ok_or_else(|| PlatformError::NotFound(format!("server {}", server_id)))?;
    if !server.is_owned_by(owner_id) {
        return Err(PlatformError::Unauthorized(format!(
            "server {} does not belong to the caller",
            server_id
        )));
    }
    Ok(server)
}
