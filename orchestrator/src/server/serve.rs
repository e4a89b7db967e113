//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::PlatformError;
use crate::server::handlers::{
    cancel_deploy_handler, create_server_handler, delete_server_handler,
    delete_workspace_handler, deploy_containers_handler, get_deploy_handler, get_server_handler,
    get_workspace_handler, health_handler, list_containers_handler, list_deploys_handler,
    list_servers_handler, list_workspaces_handler, remove_container_handler,
    remove_deploy_handler, server_health_handler, start_container_handler,
    stop_container_handler, submit_deploy_handler, version_handler, workspace_files_handler,
};
use crate::server::state::ServerState;

/// Routes of the deployment API
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Servers
        .route("/servers", get(list_servers_handler).post(create_server_handler))
        .route(
            "/servers/{server_id}",
            get(get_server_handler).delete(delete_server_handler),
        )
        .route("/servers/{server_id}/health", get(server_health_handler))
        // Deploys
        .route(
            "/servers/{server_id}/deploys",
            get(list_deploys_handler).post(submit_deploy_handler),
        )
        .route(
            "/servers/{server_id}/deploys/{deploy_id}",
            get(get_deploy_handler).delete(remove_deploy_handler),
        )
        .route(
            "/servers/{server_id}/deploys/{deploy_id}/cancel",
            post(cancel_deploy_handler),
        )
        .route(
            "/servers/{server_id}/deploys/{deploy_id}/containers",
            get(deploy_containers_handler),
        )
        // Containers
        .route("/servers/{server_id}/containers", get(list_containers_handler))
        .route(
            "/servers/{server_id}/containers/{container_id}",
            delete(remove_container_handler),
        )
        .route(
            "/servers/{server_id}/containers/{container_id}/stop",
            post(stop_container_handler),
        )
        .route(
            "/servers/{server_id}/containers/{container_id}/start",
            post(start_container_handler),
        )
        // Workspaces
        .route("/servers/{server_id}/workspaces", get(list_workspaces_handler))
        .route(
            "/servers/{server_id}/workspaces/{name}",
            get(get_workspace_handler).delete(delete_workspace_handler),
        )
        .route(
            "/servers/{server_id}/workspaces/{name}/files",
            get(workspace_files_handler),
        )
        // State and middleware
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), PlatformError>>, PlatformError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| PlatformError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| PlatformError::ServerError(e.to_string()))
    });

    Ok(handle)
}
