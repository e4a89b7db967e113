//! Deployment API models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployStatus {
    Pending,
    Deploying,
    Success,
    Failed,
    Canceled,
}

impl DeployStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeployStatus::Success | DeployStatus::Failed | DeployStatus::Canceled
        )
    }
}

impl std::fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeployStatus::Pending => "PENDING",
            DeployStatus::Deploying => "DEPLOYING",
            DeployStatus::Success => "SUCCESS",
            DeployStatus::Failed => "FAILED",
            DeployStatus::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

/// Container status as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Pending,
    Created,
    Running,
    Stopped,
    Paused,
}

impl ContainerStatus {
    /// Map an engine state string (`running`, `exited`, ...) to a status
    pub fn from_engine_state(state: &str) -> Option<Self> {
        match state.to_lowercase().as_str() {
            "created" => Some(ContainerStatus::Created),
            "running" | "restarting" => Some(ContainerStatus::Running),
            "paused" => Some(ContainerStatus::Paused),
            "exited" | "dead" | "removing" => Some(ContainerStatus::Stopped),
            _ => None,
        }
    }
}

/// Tenant server status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    Created,
    Active,
    Stopped,
}

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// Server provisioning request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServerRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Server response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerResponse {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: ServerStatus,
    pub network_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Deploy submission: manifest and env file contents are sent inline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitDeployRequest {
    pub workspace: String,
    pub manifest: String,
    #[serde(default)]
    pub env: Option<String>,
}

/// Deploy response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
    pub id: u64,
    pub server_id: String,
    pub workspace: String,
    pub status: DeployStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Container response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerResponse {
    pub id: String,
    pub server_id: String,
    pub deploy_id: u64,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
}

/// Workspace summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceResponse {
    pub name: String,
    pub size_bytes: u64,
    pub file_count: u64,
    pub modified_at: DateTime<Utc>,
}

/// Aggregated container health of a server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerHealthResponse {
    pub server_id: String,
    pub total_containers: usize,
    pub running_containers: usize,
    pub stopped_containers: usize,
    pub overall_status: String,
}

/// Manifest validation result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub errors: Vec<String>,
}
