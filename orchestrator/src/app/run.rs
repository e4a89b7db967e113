//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::docker::engine::ContainerEngine;
use crate::errors::PlatformError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::{deployer, monitor};

/// Run the orchestrator until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    engine: Arc<dyn ContainerEngine>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), PlatformError> {
    info!("Initializing beanstalk orchestrator...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, engine, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start orchestrator: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    engine: Arc<dyn ContainerEngine>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, PlatformError> {
    let (app_state, receiver) = AppState::init(options, engine).await?;
    let app_state = Arc::new(app_state);

    init_deployer_pool(
        options.deployer.clone(),
        app_state.clone(),
        receiver,
        shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    // pool is consuming, so requeued work cannot overflow the queue at once
    app_state.deploys.recover().await?;

    if options.enable_monitor {
        init_monitor_worker(
            options.monitor.clone(),
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    if options.enable_socket_server {
        init_socket_server(
            options,
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;
    }

    Ok(app_state)
}

fn init_deployer_pool(
    options: deployer::Options,
    app_state: Arc<AppState>,
    receiver: mpsc::Receiver<u64>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PlatformError> {
    info!("Initializing deployer pool...");

    let pipeline = app_state.pipeline.clone();
    let outcomes = app_state.outcomes.clone();

    let deployer_handle = tokio::spawn(async move {
        deployer::run(
            &options,
            pipeline,
            receiver,
            outcomes,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_deployer_pool_handle(deployer_handle)
}

fn init_monitor_worker(
    options: monitor::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PlatformError> {
    info!("Initializing monitor worker...");

    let store = app_state.store.clone();
    let engine = app_state.engine.clone();

    let monitor_handle = tokio::spawn(async move {
        monitor::run(
            &options,
            store,
            engine,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_monitor_worker_handle(monitor_handle)
}

async fn init_socket_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PlatformError> {
    info!("Initializing local HTTP server...");

    let server_state = ServerState::new(
        app_state.store.clone(),
        app_state.deploys.clone(),
        app_state.provisioner.clone(),
        app_state.containers.clone(),
    );

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_socket_server_handle(server_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    socket_server_handle: Option<JoinHandle<Result<(), PlatformError>>>,
    monitor_worker_handle: Option<JoinHandle<()>>,
    deployer_pool_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            socket_server_handle: None,
            monitor_worker_handle: None,
            deployer_pool_handle: None,
        }
    }

    pub fn with_deployer_pool_handle(&mut self, handle: JoinHandle<()>) -> Result<(), PlatformError> {
        if self.deployer_pool_handle.is_some() {
            return Err(PlatformError::ShutdownError("deployer_handle already set".to_string()));
        }
        self.deployer_pool_handle = Some(handle);
        Ok(())
    }

    pub fn with_monitor_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), PlatformError> {
        if self.monitor_worker_handle.is_some() {
            return Err(PlatformError::ShutdownError("monitor_handle already set".to_string()));
        }
        self.monitor_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_socket_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), PlatformError>>,
    ) -> Result<(), PlatformError> {
        if self.socket_server_handle.is_some() {
            return Err(PlatformError::ShutdownError("server_handle already set".to_string()));
        }
        self.socket_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), PlatformError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), PlatformError> {
        info!("Shutting down beanstalk orchestrator...");

        // 1. Socket server, so no new deployments arrive
        if let Some(handle) = self.socket_server_handle.take() {
            handle.await.map_err(|e| PlatformError::ShutdownError(e.to_string()))??;
        }

        // 2. Monitor worker
        if let Some(handle) = self.monitor_worker_handle.take() {
            handle.await.map_err(|e| PlatformError::ShutdownError(e.to_string()))?;
        }

        // 3. Deployer pool, draining in-flight deployments
        if let Some(handle) = self.deployer_pool_handle.take() {
            handle.await.map_err(|e| PlatformError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
