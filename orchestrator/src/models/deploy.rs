//! Deployment record model

use std::path::PathBuf;

use api_models::models::{DeployResponse, DeployStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::{event_message, transition, DeployEvent};
use crate::errors::PlatformError;

/// One attempt to bring a manifest up for a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deploy {
    /// Store-assigned numeric id
    pub id: u64,

    /// Owning server
    pub server_id: String,

    /// Workspace the manifest was staged in
    pub workspace: String,

    /// Staged (label-injected) manifest
    pub compose_path: PathBuf,

    /// Staged env file, when one was uploaded
    pub env_path: Option<PathBuf>,

    status: DeployStatus,

    error_message: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a deployment is first recorded
#[derive(Debug, Clone)]
pub struct NewDeploy {
    pub server_id: String,
    pub workspace: String,
    pub compose_path: PathBuf,
    pub env_path: Option<PathBuf>,
}

impl Deploy {
    /// Build a `PENDING` record with the given id
    pub fn pending(id: u64, new: NewDeploy) -> Self {
        let now = Utc::now();
        Self {
            id,
            server_id: new.server_id,
            workspace: new.workspace,
            compose_path: new.compose_path,
            env_path: new.env_path,
            status: DeployStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> DeployStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Apply a state machine event, stamping `updated_at` on success.
    ///
    /// An illegal transition leaves the record untouched.
    pub fn apply(&mut self, event: &DeployEvent, now: DateTime<Utc>) -> Result<(), PlatformError> {
        let next = transition(&self.status, event).map_err(PlatformError::TransitionError)?;
        if let Some(msg) = event_message(event) {
            self.error_message = Some(msg.to_string());
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn to_response(&self) -> DeployResponse {
        DeployResponse {
            id: self.id,
            server_id: self.server_id.clone(),
            workspace: self.workspace.clone(),
            status: self.status,
            error_message: self.error_message.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
