//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::dir::Dir;

/// Name of the staged manifest inside a workspace
pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";

/// Name of the staged env file inside a workspace
pub const ENV_FILE_NAME: &str = ".env";

/// Storage layout: `<base>/<serverId>/workspaces/<workspace>`
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all tenant trees
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Root directory of one tenant
    pub fn server_dir(&self, server_id: &str) -> Dir {
        Dir::new(self.base_dir.join(server_id))
    }

    /// Directory holding every workspace of a tenant
    pub fn workspaces_dir(&self, server_id: &str) -> Dir {
        self.server_dir(server_id).subdir("workspaces")
    }

    /// One workspace of a tenant
    pub fn workspace_dir(&self, server_id: &str, workspace: &str) -> Dir {
        self.workspaces_dir(server_id).subdir(workspace)
    }

    /// Setup the storage layout (create the base directory)
    pub async fn setup(&self) -> Result<(), crate::errors::PlatformError> {
        Dir::new(self.base_dir.clone()).create().await
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/var/lib/beanstalk/servers")
    }
}
