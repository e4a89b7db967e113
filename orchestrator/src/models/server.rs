//! Tenant server model

use api_models::models::{ServerResponse, ServerStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tenant: one owner, one Docker network, one workspace tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Opaque id, a UUID string
    pub id: String,

    /// Owner reference
    pub owner_id: String,

    pub name: String,

    pub description: Option<String>,

    pub status: ServerStatus,

    /// Engine id of the tenant network, set once provisioned
    pub network_id: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Server {
    /// Create a server in `CREATED` state with a fresh id
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            name: name.into(),
            description: None,
            status: ServerStatus::Created,
            network_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }

    pub fn to_response(&self) -> ServerResponse {
        ServerResponse {
            id: self.id.clone(),
            owner_id: self.owner_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            status: self.status,
            network_id: self.network_id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
