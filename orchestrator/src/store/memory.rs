//! In-memory store with optional JSON snapshot persistence

use std::collections::BTreeMap;
use std::path::PathBuf;

use api_models::models::ContainerStatus;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::deploy::fsm::DeployEvent;
use crate::errors::PlatformError;
use crate::filesys::file::File;
use crate::models::container::Container;
use crate::models::deploy::{Deploy, NewDeploy};
use crate::models::server::Server;
use crate::store::Store;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    last_deploy_id: u64,
    servers: BTreeMap<String, Server>,
    deploys: BTreeMap<u64, Deploy>,
    containers: BTreeMap<String, Container>,
}

/// Map-backed store. When opened on a file, every mutation is committed to
/// the snapshot file (temp file + rename) before it becomes visible.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Snapshot>,
    file: Option<File>,
}

impl MemoryStore {
    /// Volatile store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store persisted to `path`, loading the previous snapshot if present
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PlatformError> {
        let file = File::new(path);
        let snapshot = if file.exists().await {
            let snapshot: Snapshot = file.read_json().await.map_err(|e| {
                PlatformError::StorageError(format!("{}: {}", file.path().display(), e))
            })?;
            info!(
                "Loaded {} servers, {} deploys, {} containers from {}",
                snapshot.servers.len(),
                snapshot.deploys.len(),
                snapshot.containers.len(),
                file.path().display()
            );
            snapshot
        } else {
            Snapshot::default()
        };

        Ok(Self {
            data: RwLock::new(snapshot),
            file: Some(file),
        })
    }

    async fn write<T, F>(&self, mutate: F) -> Result<T, PlatformError>
    where
        F: FnOnce(&mut Snapshot) -> Result<T, PlatformError> + Send,
        T: Send,
    {
        let mut data = self.data.write().await;
        let mut working = data.clone();
        let out = mutate(&mut working)?;
        if let Some(file) = &self.file {
            file.write_json(&working).await?;
        }
        *data = working;
        Ok(out)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_server(&self, server: Server) -> Result<(), PlatformError> {
        self.write(|data| {
            data.servers.insert(server.id.clone(), server);
            Ok(())
        })
        .await
    }

    async fn find_server(&self, id: &str) -> Result<Option<Server>, PlatformError> {
        Ok(self.data.read().await.servers.get(id).cloned())
    }

    async fn list_servers(&self) -> Result<Vec<Server>, PlatformError> {
        Ok(self.data.read().await.servers.values().cloned().collect())
    }

    async fn delete_server(&self, id: &str) -> Result<bool, PlatformError> {
        self.write(|data| Ok(data.servers.remove(id).is_some())).await
    }

    async fn insert_deploy(&self, new: NewDeploy) -> Result<Deploy, PlatformError> {
        self.write(|data| {
            data.last_deploy_id += 1;
            let deploy = Deploy::pending(data.last_deploy_id, new);
            data.deploys.insert(deploy.id, deploy.clone());
            Ok(deploy)
        })
        .await
    }

    async fn find_deploy(&self, id: u64) -> Result<Option<Deploy>, PlatformError> {
        Ok(self.data.read().await.deploys.get(&id).cloned())
    }

    async fn list_deploys(&self, server_id: &str) -> Result<Vec<Deploy>, PlatformError> {
        Ok(self
            .data
            .read()
            .await
            .deploys
            .values()
            .filter(|d| d.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn list_all_deploys(&self) -> Result<Vec<Deploy>, PlatformError> {
        Ok(self.data.read().await.deploys.values().cloned().collect())
    }

    async fn transition_deploy(&self, id: u64, event: DeployEvent) -> Result<Deploy, PlatformError> {
        self.write(|data| {
            let deploy = data
                .deploys
                .get_mut(&id)
                .ok_or_else(|| PlatformError::NotFound(format!("deploy {}", id)))?;
            deploy.apply(&event, Utc::now())?;
            Ok(deploy.clone())
        })
        .await
    }

    async fn delete_deploy(&self, id: u64) -> Result<bool, PlatformError> {
        self.write(|data| {
            let removed = data.deploys.remove(&id).is_some();
            data.containers.retain(|_, c| c.deploy_id != id);
            Ok(removed)
        })
        .await
    }

    async fn insert_container(&self, container: Container) -> Result<bool, PlatformError> {
        self.write(|data| {
            if !data.deploys.contains_key(&container.deploy_id) {
                return Err(PlatformError::ConsistencyError(format!(
                    "deploy {} no longer exists",
                    container.deploy_id
                )));
            }
            if data.containers.contains_key(&container.id) {
                return Ok(false);
            }
            data.containers.insert(container.id.clone(), container);
            Ok(true)
        })
        .await
    }

    async fn find_container(&self, id: &str) -> Result<Option<Container>, PlatformError> {
        Ok(self.data.read().await.containers.get(id).cloned())
    }

    async fn list_containers_by_deploy(&self, deploy_id: u64) -> Result<Vec<Container>, PlatformError> {
        Ok(self
            .data
            .read()
            .await
            .containers
            .values()
            .filter(|c| c.deploy_id == deploy_id)
            .cloned()
            .collect())
    }

    async fn list_containers_by_server(&self, server_id: &str) -> Result<Vec<Container>, PlatformError> {
        Ok(self
            .data
            .read()
            .await
            .containers
            .values()
            .filter(|c| c.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn update_container_status(
        &self,
        id: &str,
        status: ContainerStatus,
    ) -> Result<bool, PlatformError> {
        self.write(|data| match data.containers.get_mut(id) {
            Some(container) => {
                container.status = status;
                container.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        })
        .await
    }

    async fn delete_container(&self, id: &str) -> Result<bool, PlatformError> {
        self.write(|data| Ok(data.containers.remove(id).is_some())).await
    }
}
