//! Container engine client.
//!
//! The orchestrator talks to the engine through [`ContainerEngine`] so that a
//! single client instance can be constructed at startup and handed to every
//! component. [`DockerEngine`] is the bollard-backed implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::models::NetworkCreateRequest;
use bollard::query_parameters::{
    InspectContainerOptionsBuilder, InspectNetworkOptionsBuilder, ListContainersOptionsBuilder,
    RemoveContainerOptionsBuilder, StartContainerOptionsBuilder, StopContainerOptionsBuilder,
};
use bollard::Docker;
use tracing::{debug, info, warn};

use crate::errors::PlatformError;

/// A container as listed by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineContainer {
    pub id: String,
    /// Raw names as reported, usually with a leading slash
    pub names: Vec<String>,
    pub image: Option<String>,
    /// Engine state string (`running`, `exited`, ...)
    pub state: Option<String>,
    pub labels: HashMap<String, String>,
}

impl EngineContainer {
    /// First reported name, or the id when the engine reports none
    pub fn display_name(&self) -> String {
        self.names.first().cloned().unwrap_or_else(|| self.id.clone())
    }
}

/// Operations the orchestrator needs from the container engine.
///
/// Implementations must be safe to share between workers.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// List all containers (running or not) carrying every `key=value` label
    async fn list_containers(
        &self,
        labels: &[(&str, &str)],
    ) -> Result<Vec<EngineContainer>, PlatformError>;

    /// Current engine state of a container, `None` when it no longer exists
    async fn inspect_container(&self, id: &str) -> Result<Option<String>, PlatformError>;

    /// Force-remove a container; a missing container is not an error
    async fn remove_container(&self, id: &str) -> Result<(), PlatformError>;

    /// Stop a container. Stopping a stopped container succeeds.
    async fn stop_container(&self, id: &str) -> Result<(), PlatformError>;

    /// Start a container. Starting a running container succeeds.
    async fn start_container(&self, id: &str) -> Result<(), PlatformError>;

    /// Engine id of a network, `None` when it does not exist
    async fn find_network(&self, name: &str) -> Result<Option<String>, PlatformError>;

    /// Create a bridge network and return its engine id
    async fn create_network(
        &self,
        name: &str,
        labels: HashMap<String, String>,
    ) -> Result<String, PlatformError>;

    /// Remove a network; a missing network is not an error
    async fn remove_network(&self, name: &str) -> Result<(), PlatformError>;
}

/// Bollard-backed engine client
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using the local defaults (unix socket or named pipe)
    pub fn connect() -> Result<Self, PlatformError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }
}

fn label_filters(labels: &[(&str, &str)]) -> HashMap<String, Vec<String>> {
    let values = labels
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    HashMap::from([("label".to_string(), values)])
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn list_containers(
        &self,
        labels: &[(&str, &str)],
    ) -> Result<Vec<EngineContainer>, PlatformError> {
        let filters = label_filters(labels);
        let options = ListContainersOptionsBuilder::new()
            .all(true)
            .filters(&filters)
            .build();

        let summaries = self.docker.list_containers(Some(options)).await?;
        debug!("Engine listed {} containers for {:?}", summaries.len(), labels);

        let containers = summaries
            .into_iter()
            .filter_map(|summary| {
                let id = summary.id?;
                Some(EngineContainer {
                    id,
                    names: summary.names.unwrap_or_default(),
                    image: summary.image,
                    state: summary.state.map(|s| s.to_string()),
                    labels: summary.labels.unwrap_or_default(),
                })
            })
            .collect();
        Ok(containers)
    }

    async fn inspect_container(&self, id: &str) -> Result<Option<String>, PlatformError> {
        let options = InspectContainerOptionsBuilder::new().build();
        match self.docker.inspect_container(id, Some(options)).await {
            Ok(info) => Ok(info
                .state
                .and_then(|state| state.status)
                .map(|status| status.to_string())),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(PlatformError::DockerError(e)),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<(), PlatformError> {
        let options = RemoveContainerOptionsBuilder::new().force(true).build();
        match self.docker.remove_container(id, Some(options)).await {
            Ok(_) => {
                info!("Container {} removed", id);
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                warn!("Container {} not found, skipping removal", id);
                Ok(())
            }
            Err(e) => Err(PlatformError::DockerError(e)),
        }
    }

    async fn stop_container(&self, id: &str) -> Result<(), PlatformError> {
        let options = StopContainerOptionsBuilder::new().t(10).build();
        match self.docker.stop_container(id, Some(options)).await {
            Ok(_) => {
                info!("Container {} stopped", id);
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(PlatformError::NotFound(format!("container {}", id))),
            Err(e) => Err(PlatformError::DockerError(e)),
        }
    }

    async fn start_container(&self, id: &str) -> Result<(), PlatformError> {
        let options = StartContainerOptionsBuilder::new().build();
        match self.docker.start_container(id, Some(options)).await {
            Ok(_) => {
                info!("Container {} started", id);
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(PlatformError::NotFound(format!("container {}", id))),
            Err(e) => Err(PlatformError::DockerError(e)),
        }
    }

    async fn find_network(&self, name: &str) -> Result<Option<String>, PlatformError> {
        let options = InspectNetworkOptionsBuilder::new().build();
        match self.docker.inspect_network(name, Some(options)).await {
            Ok(network) => Ok(Some(network.id.unwrap_or_else(|| name.to_string()))),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(PlatformError::DockerError(e)),
        }
    }

    async fn create_network(
        &self,
        name: &str,
        labels: HashMap<String, String>,
    ) -> Result<String, PlatformError> {
        let request = NetworkCreateRequest {
            name: name.to_string(),
            driver: Some("bridge".to_string()),
            attachable: Some(true),
            labels: Some(labels),
            ..Default::default()
        };
        self.docker.create_network(request).await?;
        info!("Network {} created", name);

        self.find_network(name)
            .await?
            .ok_or_else(|| PlatformError::EngineError(format!("network {} vanished after creation", name)))
    }

    async fn remove_network(&self, name: &str) -> Result<(), PlatformError> {
        match self.docker.remove_network(name).await {
            Ok(_) => {
                info!("Network {} removed", name);
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                warn!("Network {} not found, skipping removal", name);
                Ok(())
            }
            Err(e) => Err(PlatformError::DockerError(e)),
        }
    }
}
