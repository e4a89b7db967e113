//! Container model

use api_models::models::{ContainerResponse, ContainerStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A container the engine created for a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Engine-assigned id, globally unique
    pub id: String,
    pub server_id: String,
    pub deploy_id: u64,
    pub name: String,
    /// Best-effort image label; the sanitized name until the engine says otherwise
    pub image: String,
    pub status: ContainerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Container {
    pub fn to_response(&self) -> ContainerResponse {
        ContainerResponse {
            id: self.id.clone(),
            server_id: self.server_id.clone(),
            deploy_id: self.deploy_id,
            name: self.name.clone(),
            image: self.image.clone(),
            status: self.status,
        }
    }
}
