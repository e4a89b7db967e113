//! HTTP request handlers

use std::sync::Arc;

use api_models::models::{
    ContainerResponse, CreateServerRequest, DeployResponse, ErrorResponse, HealthResponse,
    ServerHealthResponse, ServerResponse, SubmitDeployRequest, VersionResponse, WorkspaceResponse,
};
use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::deploy::service::DeployUpload;
use crate::errors::PlatformError;
use crate::server::state::ServerState;
use crate::utils::version_info;
use crate::workers::monitor::server_health;

/// Header carrying the authenticated caller
pub const OWNER_HEADER: &str = "x-owner-id";

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let status = match &self {
            PlatformError::ValidationError(_) | PlatformError::InvalidManifest(_) => {
                StatusCode::BAD_REQUEST
            }
            PlatformError::Unauthorized(_) => StatusCode::FORBIDDEN,
            PlatformError::NotFound(_) => StatusCode::NOT_FOUND,
            PlatformError::Conflict(_) | PlatformError::TransitionError(_) => StatusCode::CONFLICT,
            PlatformError::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
        }

        let details = match &self {
            PlatformError::InvalidManifest(errors) => errors.clone(),
            _ => Vec::new(),
        };
        let body = ErrorResponse {
            error: self.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

/// Caller identity taken from the [`OWNER_HEADER`] header
#[derive(Debug, Clone)]
pub struct Owner(pub String);

impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match owner {
            Some(owner) => Ok(Owner(owner.to_string())),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: format!("missing {} header", OWNER_HEADER),
                    details: Vec::new(),
                }),
            )),
        }
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "beanstalk".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

// ================================= SERVERS ====================================== //

pub async fn create_server_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Json(request): Json<CreateServerRequest>,
) -> Result<(StatusCode, Json<ServerResponse>), PlatformError> {
    let server = state
        .provisioner
        .provision_server(&owner, &request.name, request.description)
        .await?;
    Ok((StatusCode::CREATED, Json(server.to_response())))
}

pub async fn list_servers_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
) -> Result<Json<Vec<ServerResponse>>, PlatformError> {
    let servers = state.provisioner.list_servers(&owner).await?;
    Ok(Json(servers.iter().map(|s| s.to_response()).collect()))
}

pub async fn get_server_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path(server_id): Path<String>,
) -> Result<Json<ServerResponse>, PlatformError> {
    let server = state.provisioner.get_server(&owner, &server_id).await?;
    Ok(Json(server.to_response()))
}

pub async fn delete_server_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path(server_id): Path<String>,
) -> Result<StatusCode, PlatformError> {
    state
        .provisioner
        .decommission_server(&owner, &server_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn server_health_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path(server_id): Path<String>,
) -> Result<Json<ServerHealthResponse>, PlatformError> {
    state.provisioner.get_server(&owner, &server_id).await?;
    let health = server_health(state.store.as_ref(), &server_id).await?;
    Ok(Json(health))
}

// ================================= DEPLOYS ====================================== //

/// Accepts the deployment and returns once it is queued
pub async fn submit_deploy_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path(server_id): Path<String>,
    Json(request): Json<SubmitDeployRequest>,
) -> Result<(StatusCode, Json<DeployResponse>), PlatformError> {
    let upload = DeployUpload {
        workspace: request.workspace,
        manifest: request.manifest.into_bytes(),
        env: request.env.map(String::into_bytes),
    };
    let deploy = state
        .deploys
        .submit_deploy(&owner, &server_id, upload)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(deploy.to_response())))
}

pub async fn list_deploys_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path(server_id): Path<String>,
) -> Result<Json<Vec<DeployResponse>>, PlatformError> {
    let deploys = state.deploys.list_deploys(&owner, &server_id).await?;
    Ok(Json(deploys.iter().map(|d| d.to_response()).collect()))
}

pub async fn get_deploy_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path((server_id, deploy_id)): Path<(String, u64)>,
) -> Result<Json<DeployResponse>, PlatformError> {
    let deploy = state
        .deploys
        .get_deploy(&owner, &server_id, deploy_id)
        .await?;
    Ok(Json(deploy.to_response()))
}

pub async fn remove_deploy_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path((server_id, deploy_id)): Path<(String, u64)>,
) -> Result<StatusCode, PlatformError> {
    state
        .deploys
        .remove_deploy(&owner, &server_id, deploy_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn cancel_deploy_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path((server_id, deploy_id)): Path<(String, u64)>,
) -> Result<Json<DeployResponse>, PlatformError> {
    let deploy = state
        .deploys
        .cancel_deploy(&owner, &server_id, deploy_id)
        .await?;
    Ok(Json(deploy.to_response()))
}

pub async fn deploy_containers_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path((server_id, deploy_id)): Path<(String, u64)>,
) -> Result<Json<Vec<ContainerResponse>>, PlatformError> {
    let containers = state
        .deploys
        .list_containers(&owner, &server_id, deploy_id)
        .await?;
    Ok(Json(containers.iter().map(|c| c.to_response()).collect()))
}

// ================================ CONTAINERS ==================================== //

pub async fn list_containers_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path(server_id): Path<String>,
) -> Result<Json<Vec<ContainerResponse>>, PlatformError> {
    let containers = state
        .containers
        .list_containers(&owner, &server_id)
        .await?;
    Ok(Json(containers.iter().map(|c| c.to_response()).collect()))
}

pub async fn remove_container_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path((server_id, container_id)): Path<(String, String)>,
) -> Result<StatusCode, PlatformError> {
    state
        .containers
        .remove_container(&owner, &server_id, &container_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stop_container_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path((server_id, container_id)): Path<(String, String)>,
) -> Result<Json<ContainerResponse>, PlatformError> {
    let container = state
        .containers
        .stop_container(&owner, &server_id, &container_id)
        .await?;
    Ok(Json(container.to_response()))
}

pub async fn start_container_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path((server_id, container_id)): Path<(String, String)>,
) -> Result<Json<ContainerResponse>, PlatformError> {
    let container = state
        .containers
        .start_container(&owner, &server_id, &container_id)
        .await?;
    Ok(Json(container.to_response()))
}

// ================================ WORKSPACES ==================================== //

pub async fn list_workspaces_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path(server_id): Path<String>,
) -> Result<Json<Vec<WorkspaceResponse>>, PlatformError> {
    let workspaces = state.deploys.list_workspaces(&owner, &server_id).await?;
    Ok(Json(workspaces.iter().map(|w| w.to_response()).collect()))
}

pub async fn get_workspace_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path((server_id, name)): Path<(String, String)>,
) -> Result<Json<WorkspaceResponse>, PlatformError> {
    let workspace = state
        .deploys
        .workspace_info(&owner, &server_id, &name)
        .await?;
    Ok(Json(workspace.to_response()))
}

pub async fn workspace_files_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path((server_id, name)): Path<(String, String)>,
) -> Result<Json<Vec<String>>, PlatformError> {
    let files = state
        .deploys
        .workspace_files(&owner, &server_id, &name)
        .await?;
    Ok(Json(files))
}

pub async fn delete_workspace_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path((server_id, name)): Path<(String, String)>,
) -> Result<StatusCode, PlatformError> {
    state
        .deploys
        .delete_workspace(&owner, &server_id, &name)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
