//! Deployment executor: runs compose for one deployment and reports the
//! containers the engine created for it.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::deploy::compose::ComposeRunner;
use crate::deploy::locks::{TenantGuard, TenantLocks};
use crate::docker::engine::ContainerEngine;
use crate::docker::naming::{project_name, COMPOSE_PROJECT_LABEL};
use crate::filesys::file::File;
use crate::models::deploy::Deploy;

/// Longest failure message kept on a deployment record
pub const MAX_ERROR_LEN: usize = 4000;

/// Result of one compose run. Failures are values; `execute` never errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Compose exited 0. `container_ids[i]` pairs with `container_names[i]`.
    Success {
        container_ids: Vec<String>,
        container_names: Vec<String>,
        output: String,
    },
    Failure {
        exit_code: Option<i32>,
        message: String,
        output: String,
    },
}

impl ExecutionResult {
    fn failure(exit_code: Option<i32>, message: impl Into<String>, output: String) -> Self {
        ExecutionResult::Failure {
            exit_code,
            message: message.into(),
            output,
        }
    }
}

/// Runs compose for deployments, one run per tenant at a time
pub struct DeploymentExecutor {
    runner: Arc<dyn ComposeRunner>,
    engine: Arc<dyn ContainerEngine>,
    locks: TenantLocks,
}

impl DeploymentExecutor {
    pub fn new(runner: Arc<dyn ComposeRunner>, engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            runner,
            engine,
            locks: TenantLocks::new(),
        }
    }

    pub fn locks(&self) -> &TenantLocks {
        &self.locks
    }

    /// Bring the deployment's manifest up and list the project's containers.
    ///
    /// The listing covers the whole project, so the caller keeps `_held` (the
    /// tenant's guard from [`Self::locks`]) until the containers are registered.
    pub async fn execute(&self, deploy: &Deploy, _held: &TenantGuard) -> ExecutionResult {
        let project = project_name(&deploy.server_id);
        let manifest = deploy.compose_path.as_path();

        if !File::new(manifest).exists().await {
            return ExecutionResult::failure(
                None,
                format!("manifest not found: {}", manifest.display()),
                String::new(),
            );
        }
        let workdir = manifest.parent().unwrap_or_else(|| Path::new("."));

        info!(deploy_id = deploy.id, project = %project, "Executing deployment");

        let outcome = match self.runner.up(&project, manifest, workdir).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(deploy_id = deploy.id, "Compose could not be started: {}", e);
                return ExecutionResult::failure(None, e.to_string(), String::new());
            }
        };

        if !outcome.success() {
            let message = failure_message(outcome.exit_code, &outcome.output);
            warn!(deploy_id = deploy.id, "Compose up failed: {}", message);
            return ExecutionResult::failure(outcome.exit_code, message, outcome.output);
        }

        let listed = self
            .engine
            .list_containers(&[(COMPOSE_PROJECT_LABEL, project.as_str())])
            .await;
        match listed {
            Ok(containers) => {
                let (container_ids, container_names) = containers
                    .iter()
                    .map(|c| (c.id.clone(), c.display_name()))
                    .unzip();
                ExecutionResult::Success {
                    container_ids,
                    container_names,
                    output: outcome.output,
                }
            }
            Err(e) => ExecutionResult::failure(
                outcome.exit_code,
                format!("failed to list containers of {}: {}", project, e),
                outcome.output,
            ),
        }
    }

    /// Best-effort `down` of a tenant's project; never fails the caller
    pub async fn teardown(&self, server_id: &str, workdir: Option<&Path>) {
        let project = project_name(server_id);
        let workdir = workdir.filter(|d| d.is_dir());

        let _guard = self.locks.acquire(server_id).await;
        match self.runner.down(&project, workdir).await {
            Ok(outcome) if outcome.success() => {
                info!(project = %project, "Compose project torn down");
            }
            Ok(outcome) => {
                warn!(
                    project = %project,
                    "Compose down exited with {:?}: {}",
                    outcome.exit_code,
                    outcome.output.trim()
                );
            }
            Err(e) => warn!(project = %project, "Compose down could not be started: {}", e),
        }
    }
}

/// Trimmed compose output, or a generic message when compose printed nothing
fn failure_message(exit_code: Option<i32>, output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return match exit_code {
            Some(code) => format!("compose up failed with exit code {}", code),
            None => "compose up was terminated".to_string(),
        };
    }
    tail(trimmed, MAX_ERROR_LEN)
}

/// Last `max` characters of `text`; compose reports the cause at the end
fn tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    text.chars().skip(count - max).collect()
}
