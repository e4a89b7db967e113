//! Tenant server provisioning: network, workspace tree and record

use std::collections::HashMap;
use std::sync::Arc;

use api_models::models::{DeployStatus, ServerStatus};
use chrono::Utc;
use tracing::{info, warn};

use crate::deploy::executor::DeploymentExecutor;
use crate::deploy::fsm::DeployEvent;
use crate::deploy::service::staged_workdir;
use crate::docker::engine::ContainerEngine;
use crate::docker::naming::{network_name, MANAGED_BY_LABEL, MANAGED_BY_VALUE, TENANT_LABEL_KEY};
use crate::errors::PlatformError;
use crate::models::server::Server;
use crate::storage::workspace::WorkspaceManager;
use crate::store::{find_owned_server, Store};

pub struct ServerProvisioner {
    store: Arc<dyn Store>,
    engine: Arc<dyn ContainerEngine>,
    executor: Arc<DeploymentExecutor>,
    workspaces: WorkspaceManager,
}

impl ServerProvisioner {
    pub fn new(
        store: Arc<dyn Store>,
        engine: Arc<dyn ContainerEngine>,
        executor: Arc<DeploymentExecutor>,
        workspaces: WorkspaceManager,
    ) -> Self {
        Self {
            store,
            engine,
            executor,
            workspaces,
        }
    }

    /// Create the tenant network (reusing one that already exists) and
    /// persist an `ACTIVE` server bound to it
    pub async fn provision_server(
        &self,
        owner_id: &str,
        name: &str,
        description: Option<String>,
    ) -> Result<Server, PlatformError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PlatformError::ValidationError("server name is required".to_string()));
        }

        let mut server = Server::new(owner_id, name);
        server.description = description;

        let network = network_name(&server.id);
        let network_id = match self.engine.find_network(&network).await? {
            Some(id) => {
                warn!(server_id = %server.id, "Reusing existing network {}", network);
                id
            }
            None => {
                let labels = HashMap::from([
                    (TENANT_LABEL_KEY.to_string(), server.id.clone()),
                    (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
                ]);
                self.engine.create_network(&network, labels).await?
            }
        };

        server.network_id = Some(network_id);
        server.status = ServerStatus::Active;
        server.updated_at = Utc::now();
        self.store.save_server(server.clone()).await?;

        info!(server_id = %server.id, owner_id, "Server provisioned on {}", network);
        Ok(server)
    }

    pub async fn list_servers(&self, owner_id: &str) -> Result<Vec<Server>, PlatformError> {
        let servers = self.store.list_servers().await?;
        Ok(servers.into_iter().filter(|s| s.is_owned_by(owner_id)).collect())
    }

    pub async fn get_server(&self, owner_id: &str, server_id: &str) -> Result<Server, PlatformError> {
        find_owned_server(self.store.as_ref(), owner_id, server_id).await
    }

    /// Tear everything of a tenant down: project, records, network, files.
    /// Refused while one of its deployments is running.
    pub async fn decommission_server(&self, owner_id: &str, server_id: &str) -> Result<(), PlatformError> {
        let server = self.get_server(owner_id, server_id).await?;
        let deploys = self.store.list_deploys(&server.id).await?;

        if let Some(running) = deploys.iter().find(|d| d.status() == DeployStatus::Deploying) {
            return Err(still_deploying(running.id));
        }
        // queued work must not start once teardown is under way
        for deploy in deploys.iter().filter(|d| d.status() == DeployStatus::Pending) {
            match self
                .store
                .transition_deploy(deploy.id, DeployEvent::Cancel("server decommissioned".to_string()))
                .await
            {
                Ok(_) => {}
                Err(PlatformError::TransitionError(_)) => return Err(still_deploying(deploy.id)),
                Err(e) => return Err(e),
            }
        }

        // one project per tenant, so a single down covers every deployment
        let workdir = deploys.last().and_then(staged_workdir);
        self.executor.teardown(&server.id, workdir).await;

        for deploy in &deploys {
            self.store.delete_deploy(deploy.id).await?;
        }
        for container in self.store.list_containers_by_server(&server.id).await? {
            self.store.delete_container(&container.id).await?;
        }

        if let Err(e) = self.engine.remove_network(&network_name(&server.id)).await {
            warn!(server_id = %server.id, "Failed to remove tenant network: {}", e);
        }
        self.workspaces.delete_server_tree(&server.id).await?;
        self.store.delete_server(&server.id).await?;
        self.executor.locks().forget(&server.id);

        info!(server_id = %server.id, "Server decommissioned");
        Ok(())
    }
}

fn still_deploying(deploy_id: u64) -> PlatformError {
    PlatformError::Conflict(format!("deploy {} is still deploying", deploy_id))
}
