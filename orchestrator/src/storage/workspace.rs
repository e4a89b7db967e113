//! Per-tenant workspace management

use std::path::PathBuf;

use api_models::models::WorkspaceResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::PlatformError;
use crate::storage::layout::StorageLayout;

/// Maximum length of a workspace name
pub const MAX_WORKSPACE_NAME_LEN: usize = 50;

/// Workspace summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub file_count: u64,
    pub modified_at: DateTime<Utc>,
}

impl WorkspaceInfo {
    pub fn to_response(&self) -> WorkspaceResponse {
        WorkspaceResponse {
            name: self.name.clone(),
            size_bytes: self.size_bytes,
            file_count: self.file_count,
            modified_at: self.modified_at,
        }
    }
}

/// Check a workspace name: 1-50 characters of `[A-Za-z0-9_-]`
pub fn validate_workspace_name(name: &str) -> Result<(), PlatformError> {
    if name.trim().is_empty() {
        return Err(PlatformError::ValidationError(
            "workspace name must not be empty".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(PlatformError::ValidationError(format!(
            "workspace name '{}' contains invalid characters",
            name
        )));
    }
    if name.len() > MAX_WORKSPACE_NAME_LEN {
        return Err(PlatformError::ValidationError(format!(
            "workspace name is too long (max {} characters)",
            MAX_WORKSPACE_NAME_LEN
        )));
    }
    Ok(())
}

// server ids are path segments too
fn validate_server_segment(server_id: &str) -> Result<(), PlatformError> {
    if server_id.is_empty()
        || server_id == "."
        || server_id == ".."
        || server_id.contains(['/', '\\', '\0'])
    {
        return Err(PlatformError::ValidationError(format!(
            "invalid server id '{}'",
            server_id
        )));
    }
    Ok(())
}

/// Allocates and inspects `<base>/<serverId>/workspaces/<name>` directories
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    layout: StorageLayout,
}

impl WorkspaceManager {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Resolve a workspace path without touching the filesystem
    pub fn workspace_path(&self, server_id: &str, name: &str) -> Result<PathBuf, PlatformError> {
        validate_server_segment(server_id)?;
        validate_workspace_name(name)?;
        Ok(self.layout.workspace_dir(server_id, name).path().to_path_buf())
    }

    /// Ensure the workspace exists and return its path. Idempotent.
    pub async fn create_workspace(
        &self,
        server_id: &str,
        name: &str,
    ) -> Result<PathBuf, PlatformError> {
        let path = self.workspace_path(server_id, name)?;
        self.layout.workspace_dir(server_id, name).create().await?;
        info!(server_id, workspace = name, "Workspace ready at {}", path.display());
        Ok(path)
    }

    /// All workspaces of a tenant, sorted by name
    pub async fn list_workspaces(&self, server_id: &str) -> Result<Vec<WorkspaceInfo>, PlatformError> {
        validate_server_segment(server_id)?;
        let dir = self.layout.workspaces_dir(server_id);
        if !dir.exists().await {
            return Ok(Vec::new());
        }

        let mut workspaces = Vec::new();
        for path in dir.list_dirs().await? {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                workspaces.push(self.workspace_info(server_id, name).await?);
            }
        }
        Ok(workspaces)
    }

    /// Size, file count and modification time of one workspace
    pub async fn workspace_info(
        &self,
        server_id: &str,
        name: &str,
    ) -> Result<WorkspaceInfo, PlatformError> {
        let path = self.workspace_path(server_id, name)?;
        let dir = self.layout.workspace_dir(server_id, name);
        if !dir.exists().await {
            return Err(PlatformError::NotFound(format!("workspace '{}'", name)));
        }

        let usage = dir.usage().await?;
        let modified_at = DateTime::<Utc>::from(dir.modified().await?);
        Ok(WorkspaceInfo {
            name: name.to_string(),
            path,
            size_bytes: usage.bytes,
            file_count: usage.files,
            modified_at,
        })
    }

    /// Top-level entries of a workspace
    pub async fn list_files(&self, server_id: &str, name: &str) -> Result<Vec<PathBuf>, PlatformError> {
        self.workspace_path(server_id, name)?;
        let dir = self.layout.workspace_dir(server_id, name);
        if !dir.exists().await {
            return Err(PlatformError::NotFound(format!("workspace '{}'", name)));
        }
        dir.list_entries().await
    }

    pub async fn delete_workspace(&self, server_id: &str, name: &str) -> Result<(), PlatformError> {
        self.workspace_path(server_id, name)?;
        let dir = self.layout.workspace_dir(server_id, name);
        if !dir.exists().await {
            return Err(PlatformError::NotFound(format!("workspace '{}'", name)));
        }
        dir.delete().await?;
        info!(server_id, workspace = name, "Workspace deleted");
        Ok(())
    }

    /// Remove the whole tenant tree
    pub async fn delete_server_tree(&self, server_id: &str) -> Result<(), PlatformError> {
        validate_server_segment(server_id)?;
        self.layout.server_dir(server_id).delete().await
    }
}
