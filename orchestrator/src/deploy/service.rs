//! Deployment operations exposed to callers: submit, list, cancel, remove.
//!
//! Everything that can be checked synchronously (ownership, workspace name,
//! upload size, manifest validity) is checked here, before a record exists
//! or an external process runs. The compose run itself happens on the
//! deployer pool.

use std::path::Path;
use std::sync::Arc;

use api_models::models::DeployStatus;
use tracing::{info, warn};

use crate::deploy::executor::DeploymentExecutor;
use crate::deploy::manifest::{inject_tenant, parse_manifest, save_manifest, validate_manifest};
use crate::deploy::tracker::DeployTracker;
use crate::errors::PlatformError;
use crate::filesys::file::File;
use crate::models::container::Container;
use crate::models::deploy::{Deploy, NewDeploy};
use crate::models::server::Server;
use crate::storage::layout::{COMPOSE_FILE_NAME, ENV_FILE_NAME};
use crate::storage::workspace::{WorkspaceInfo, WorkspaceManager};
use crate::store::{find_owned_server, Store};
use crate::workers::deployer::DeployQueue;

/// Files uploaded with a deployment request
#[derive(Debug, Clone)]
pub struct DeployUpload {
    pub workspace: String,
    pub manifest: Vec<u8>,
    pub env: Option<Vec<u8>>,
}

/// What startup recovery did with unfinished records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub requeued: Vec<u64>,
    pub failed: Vec<u64>,
}

pub struct DeployService {
    store: Arc<dyn Store>,
    workspaces: WorkspaceManager,
    executor: Arc<DeploymentExecutor>,
    tracker: DeployTracker,
    queue: DeployQueue,
    max_upload_bytes: usize,
}

impl DeployService {
    pub fn new(
        store: Arc<dyn Store>,
        workspaces: WorkspaceManager,
        executor: Arc<DeploymentExecutor>,
        queue: DeployQueue,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            tracker: DeployTracker::new(store.clone()),
            store,
            workspaces,
            executor,
            queue,
            max_upload_bytes,
        }
    }

    /// The server, if it exists and belongs to `owner_id`
    pub async fn authorize(&self, owner_id: &str, server_id: &str) -> Result<Server, PlatformError> {
        find_owned_server(self.store.as_ref(), owner_id, server_id).await
    }

    /// Stage, validate and inject the manifest, record a `PENDING`
    /// deployment and hand it to the pool. Returns as soon as it is queued.
    pub async fn submit_deploy(
        &self,
        owner_id: &str,
        server_id: &str,
        upload: DeployUpload,
    ) -> Result<Deploy, PlatformError> {
        let server = self.authorize(owner_id, server_id).await?;

        self.check_upload("manifest", &upload.manifest)?;
        if let Some(env) = &upload.env {
            self.check_upload("env file", env)?;
        }

        let workdir = self
            .workspaces
            .create_workspace(&server.id, &upload.workspace)
            .await?;

        let text = std::str::from_utf8(&upload.manifest).map_err(|_| {
            PlatformError::InvalidManifest(vec!["manifest is not valid UTF-8".to_string()])
        })?;
        let mut doc = parse_manifest(text)
            .map_err(|e| PlatformError::InvalidManifest(vec![format!("failed to parse manifest: {}", e)]))?;
        let validation = validate_manifest(&doc);
        if !validation.valid {
            info!(server_id = %server.id, "Rejected manifest: {}", validation.errors.join("; "));
            return Err(PlatformError::InvalidManifest(validation.errors));
        }

        inject_tenant(&mut doc, &server.id);
        let compose_path = workdir.join(COMPOSE_FILE_NAME);
        save_manifest(&compose_path, &doc).await?;

        let env_path = match &upload.env {
            Some(env) => {
                let path = workdir.join(ENV_FILE_NAME);
                File::new(&path).write_bytes(env).await?;
                Some(path)
            }
            None => None,
        };

        let deploy = self
            .tracker
            .create(NewDeploy {
                server_id: server.id.clone(),
                workspace: upload.workspace,
                compose_path,
                env_path,
            })
            .await?;

        if let Err(e) = self.queue.try_submit(deploy.id) {
            warn!(deploy_id = deploy.id, "Could not enqueue deployment: {}", e);
            self.tracker.cancel(deploy.id, e.to_string()).await?;
            return Err(e);
        }

        info!(deploy_id = deploy.id, server_id = %server.id, "Deployment queued");
        Ok(deploy)
    }

    /// Deployments of a server, oldest first
    pub async fn list_deploys(&self, owner_id: &str, server_id: &str) -> Result<Vec<Deploy>, PlatformError> {
        self.authorize(owner_id, server_id).await?;
        self.store.list_deploys(server_id).await
    }

    pub async fn get_deploy(
        &self,
        owner_id: &str,
        server_id: &str,
        deploy_id: u64,
    ) -> Result<Deploy, PlatformError> {
        self.authorize(owner_id, server_id).await?;
        self.find_owned_deploy(server_id, deploy_id).await
    }

    /// Containers registered for one deployment
    pub async fn list_containers(
        &self,
        owner_id: &str,
        server_id: &str,
        deploy_id: u64,
    ) -> Result<Vec<Container>, PlatformError> {
        self.authorize(owner_id, server_id).await?;
        self.find_owned_deploy(server_id, deploy_id).await?;
        self.store.list_containers_by_deploy(deploy_id).await
    }

    /// Move a `PENDING` deployment to `CANCELED`
    pub async fn cancel_deploy(
        &self,
        owner_id: &str,
        server_id: &str,
        deploy_id: u64,
    ) -> Result<Deploy, PlatformError> {
        self.authorize(owner_id, server_id).await?;
        self.find_owned_deploy(server_id, deploy_id).await?;
        self.tracker.cancel(deploy_id, "canceled by owner").await
    }

    /// Tear down the tenant's project (best effort) and delete the record and
    /// its containers. A deployment that is still running is refused.
    pub async fn remove_deploy(
        &self,
        owner_id: &str,
        server_id: &str,
        deploy_id: u64,
    ) -> Result<(), PlatformError> {
        self.authorize(owner_id, server_id).await?;
        let deploy = self.find_owned_deploy(server_id, deploy_id).await?;
        match deploy.status() {
            DeployStatus::Deploying => return Err(still_deploying(deploy_id)),
            // a worker may dispatch it while teardown waits for the tenant
            // lock, so take it out of the queue first
            DeployStatus::Pending => match self.tracker.cancel(deploy_id, "removed by owner").await {
                Ok(_) => {}
                Err(PlatformError::TransitionError(_)) => return Err(still_deploying(deploy_id)),
                Err(e) => return Err(e),
            },
            _ => {}
        }

        self.executor
            .teardown(server_id, staged_workdir(&deploy))
            .await;
        self.store.delete_deploy(deploy_id).await?;
        info!(deploy_id, server_id, "Deployment removed");
        Ok(())
    }

    pub async fn list_workspaces(
        &self,
        owner_id: &str,
        server_id: &str,
    ) -> Result<Vec<WorkspaceInfo>, PlatformError> {
        self.authorize(owner_id, server_id).await?;
        self.workspaces.list_workspaces(server_id).await
    }

    pub async fn workspace_info(
        &self,
        owner_id: &str,
        server_id: &str,
        name: &str,
    ) -> Result<WorkspaceInfo, PlatformError> {
        self.authorize(owner_id, server_id).await?;
        self.workspaces.workspace_info(server_id, name).await
    }

    /// Names of the top-level entries of a workspace
    pub async fn workspace_files(
        &self,
        owner_id: &str,
        server_id: &str,
        name: &str,
    ) -> Result<Vec<String>, PlatformError> {
        self.authorize(owner_id, server_id).await?;
        let files = self.workspaces.list_files(server_id, name).await?;
        Ok(files
            .iter()
            .filter_map(|path| path.file_name())
            .map(|file| file.to_string_lossy().into_owned())
            .collect())
    }

    /// Delete a workspace directory. Refused while a queued or running
    /// deployment still needs its manifest.
    pub async fn delete_workspace(
        &self,
        owner_id: &str,
        server_id: &str,
        name: &str,
    ) -> Result<(), PlatformError> {
        self.authorize(owner_id, server_id).await?;
        let in_use = self
            .store
            .list_deploys(server_id)
            .await?
            .into_iter()
            .find(|d| d.workspace == name && !d.status().is_terminal());
        if let Some(deploy) = in_use {
            return Err(PlatformError::Conflict(format!(
                "workspace '{}' is used by deploy {} ({})",
                name,
                deploy.id,
                deploy.status()
            )));
        }
        self.workspaces.delete_workspace(server_id, name).await
    }

    /// Settle records left unfinished by a previous run: `DEPLOYING` ones
    /// lost their worker and fail, `PENDING` ones go back on the queue.
    pub async fn recover(&self) -> Result<RecoveryReport, PlatformError> {
        let mut report = RecoveryReport::default();
        for deploy in self.store.list_all_deploys().await? {
            match deploy.status() {
                DeployStatus::Deploying => {
                    self.tracker
                        .mark_failed(deploy.id, "interrupted by orchestrator restart")
                        .await?;
                    report.failed.push(deploy.id);
                }
                DeployStatus::Pending => match self.queue.try_submit(deploy.id) {
                    Ok(()) => report.requeued.push(deploy.id),
                    Err(e) => {
                        self.tracker.cancel(deploy.id, e.to_string()).await?;
                    }
                },
                _ => {}
            }
        }
        if !report.requeued.is_empty() || !report.failed.is_empty() {
            info!(
                "Recovered deployments: {} requeued, {} failed",
                report.requeued.len(),
                report.failed.len()
            );
        }
        Ok(report)
    }

    fn check_upload(&self, what: &str, bytes: &[u8]) -> Result<(), PlatformError> {
        if bytes.is_empty() {
            return Err(PlatformError::ValidationError(format!("{} is empty", what)));
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(PlatformError::ValidationError(format!(
                "{} is {} bytes, limit is {}",
                what,
                bytes.len(),
                self.max_upload_bytes
            )));
        }
        Ok(())
    }

    async fn find_owned_deploy(&self, server_id: &str, deploy_id: u64) -> Result<Deploy, PlatformError> {
        self.store
            .find_deploy(deploy_id)
            .await?
            .filter(|d| d.server_id == server_id)
            .ok_or_else(|| PlatformError::NotFound(format!("deploy {}", deploy_id)))
    }
}

fn still_deploying(deploy_id: u64) -> PlatformError {
    PlatformError::Conflict(format!("deploy {} is still deploying", deploy_id))
}

/// Workspace directory of a staged manifest
pub fn staged_workdir(deploy: &Deploy) -> Option<&Path> {
    deploy.compose_path.parent()
}
