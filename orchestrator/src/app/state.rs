//! Application state management

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::info;

use crate::app::options::AppOptions;
use crate::containers::ContainerManager;
use crate::deploy::compose::{ComposeCli, ComposeRunner};
use crate::deploy::executor::DeploymentExecutor;
use crate::deploy::pipeline::{DeployOutcome, DeployPipeline};
use crate::deploy::service::DeployService;
use crate::docker::engine::ContainerEngine;
use crate::errors::PlatformError;
use crate::provision::ServerProvisioner;
use crate::storage::workspace::WorkspaceManager;
use crate::store::memory::MemoryStore;
use crate::store::Store;
use crate::workers::deployer;

/// Main application state
pub struct AppState {
    /// Record store
    pub store: Arc<dyn Store>,

    /// Container engine client, shared by every component
    pub engine: Arc<dyn ContainerEngine>,

    pub executor: Arc<DeploymentExecutor>,

    /// Work done by the deployer pool
    pub pipeline: Arc<DeployPipeline>,

    pub deploys: Arc<DeployService>,

    pub provisioner: Arc<ServerProvisioner>,

    pub containers: Arc<ContainerManager>,

    /// Terminal outcome of every dispatched deployment
    pub outcomes: broadcast::Sender<DeployOutcome>,
}

impl AppState {
    /// Initialize application state. The returned receiver is the consuming
    /// end of the deployment queue and belongs to the deployer pool.
    pub async fn init(
        options: &AppOptions,
        engine: Arc<dyn ContainerEngine>,
    ) -> Result<(Self, mpsc::Receiver<u64>), PlatformError> {
        info!("Initializing application state...");

        options.storage.layout.setup().await?;

        let store: Arc<dyn Store> = match &options.storage.state_file {
            Some(path) => Arc::new(MemoryStore::open(path).await?),
            None => Arc::new(MemoryStore::new()),
        };

        let runner: Arc<dyn ComposeRunner> = Arc::new(ComposeCli::new(
            options.compose.binary.clone(),
            options.compose.fallback_to_plugin,
            options.compose.timeout,
        ));

        Ok(Self::assemble(options, store, engine, runner))
    }

    /// Wire components around an existing store, engine and compose runner
    pub fn assemble(
        options: &AppOptions,
        store: Arc<dyn Store>,
        engine: Arc<dyn ContainerEngine>,
        runner: Arc<dyn ComposeRunner>,
    ) -> (Self, mpsc::Receiver<u64>) {
        let workspaces = WorkspaceManager::new(options.storage.layout.clone());
        let executor = Arc::new(DeploymentExecutor::new(runner, engine.clone()));
        let pipeline = Arc::new(DeployPipeline::new(store.clone(), executor.clone()));

        let (queue, receiver) = deployer::queue(options.deployer.queue_capacity);
        let deploys = Arc::new(DeployService::new(
            store.clone(),
            workspaces.clone(),
            executor.clone(),
            queue,
            options.max_upload_bytes,
        ));
        let provisioner = Arc::new(ServerProvisioner::new(
            store.clone(),
            engine.clone(),
            executor.clone(),
            workspaces,
        ));
        let containers = Arc::new(ContainerManager::new(
            store.clone(),
            engine.clone(),
            executor.clone(),
        ));
        let (outcomes, _) = broadcast::channel(64);

        let state = Self {
            store,
            engine,
            executor,
            pipeline,
            deploys,
            provisioner,
            containers,
            outcomes,
        };
        (state, receiver)
    }

    /// Subscribe to deployment outcomes
    pub fn subscribe(&self) -> broadcast::Receiver<DeployOutcome> {
        self.outcomes.subscribe()
    }
}
