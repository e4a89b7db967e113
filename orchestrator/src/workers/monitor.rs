//! Container status monitor

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use api_models::models::{ContainerStatus, ServerHealthResponse};
use tracing::{debug, error, info, warn};

use crate::docker::engine::ContainerEngine;
use crate::docker::naming::TENANT_LABEL_KEY;
use crate::errors::PlatformError;
use crate::store::Store;

/// Monitor worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Time between two status sweeps
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Run the monitor worker
pub async fn run<S, F>(
    options: &Options,
    store: Arc<dyn Store>,
    engine: Arc<dyn ContainerEngine>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Monitor worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Monitor worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        match sync_container_statuses(store.as_ref(), engine.as_ref()).await {
            Ok(updated) => debug!("Monitor sweep updated {} containers", updated),
            Err(e) => error!("Monitor sweep failed: {}", e),
        }
    }
}

/// Refresh the persisted status of every registered container from the
/// engine. A container the engine no longer knows is `STOPPED`. Returns
/// the number of rows changed.
pub async fn sync_container_statuses(
    store: &dyn Store,
    engine: &dyn ContainerEngine,
) -> Result<usize, PlatformError> {
    let mut updated = 0;

    for server in store.list_servers().await? {
        let listed = match engine
            .list_containers(&[(TENANT_LABEL_KEY, server.id.as_str())])
            .await
        {
            Ok(listed) => listed,
            Err(e) => {
                error!(server_id = %server.id, "Failed to list containers: {}", e);
                continue;
            }
        };
        let states: HashMap<String, Option<String>> =
            listed.into_iter().map(|c| (c.id, c.state)).collect();

        for container in store.list_containers_by_server(&server.id).await? {
            let state = match states.get(&container.id) {
                Some(state) => state.clone(),
                // relabelled or removed since registration
                None => match engine.inspect_container(&container.id).await {
                    Ok(state) => state,
                    Err(e) => {
                        warn!(server_id = %server.id, "Failed to inspect {}: {}", container.id, e);
                        continue;
                    }
                },
            };
            let status = match state {
                Some(state) => match ContainerStatus::from_engine_state(&state) {
                    Some(status) => status,
                    None => continue,
                },
                None => ContainerStatus::Stopped,
            };
            if status != container.status {
                debug!(
                    server_id = %server.id,
                    "Container {} is now {:?}",
                    container.name,
                    status
                );
                store.update_container_status(&container.id, status).await?;
                updated += 1;
            }
        }
    }

    Ok(updated)
}

/// Summarise the persisted container statuses of one server
pub async fn server_health(
    store: &dyn Store,
    server_id: &str,
) -> Result<ServerHealthResponse, PlatformError> {
    let containers = store.list_containers_by_server(server_id).await?;
    let running = containers
        .iter()
        .filter(|c| c.status == ContainerStatus::Running)
        .count();
    let stopped = containers
        .iter()
        .filter(|c| c.status == ContainerStatus::Stopped)
        .count();

    Ok(ServerHealthResponse {
        server_id: server_id.to_string(),
        total_containers: containers.len(),
        running_containers: running,
        stopped_containers: stopped,
        overall_status: if stopped == 0 { "HEALTHY" } else { "DEGRADED" }.to_string(),
    })
}
