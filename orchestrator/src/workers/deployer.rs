//! Deployment worker pool

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::deploy::pipeline::{DeployOutcome, DeployPipeline};
use crate::errors::PlatformError;

/// Deployer pool options
#[derive(Debug, Clone)]
pub struct Options {
    /// Concurrent deployments
    pub workers: usize,

    /// Deployments waiting for a worker before submissions are refused
    pub queue_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_capacity: 50,
        }
    }
}

/// Submission handle of the bounded deployment queue
#[derive(Debug, Clone)]
pub struct DeployQueue {
    tx: mpsc::Sender<u64>,
}

impl DeployQueue {
    /// Enqueue without waiting
    pub fn try_submit(&self, deploy_id: u64) -> Result<(), PlatformError> {
        self.tx.try_send(deploy_id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                PlatformError::QueueFull("deployment queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                PlatformError::QueueFull("deployment pool is shut down".to_string())
            }
        })
    }
}

/// Create the queue; the receiver goes to [`run`]
pub fn queue(capacity: usize) -> (DeployQueue, mpsc::Receiver<u64>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DeployQueue { tx }, rx)
}

/// Run the pool until shutdown. Deployments already dispatched are finished
/// before this returns; queued ones stay `PENDING` for the next start.
pub async fn run(
    options: &Options,
    pipeline: Arc<DeployPipeline>,
    receiver: mpsc::Receiver<u64>,
    outcomes: broadcast::Sender<DeployOutcome>,
    shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Deployer pool starting with {} workers...", options.workers);

    let (stop_tx, stop_rx) = watch::channel(false);
    let receiver = Arc::new(Mutex::new(receiver));

    let mut workers = JoinSet::new();
    for worker_id in 0..options.workers.max(1) {
        workers.spawn(worker_loop(
            worker_id,
            pipeline.clone(),
            receiver.clone(),
            outcomes.clone(),
            stop_rx.clone(),
        ));
    }

    tokio::select! {
        _ = shutdown_signal => {
            info!("Deployer pool shutting down, draining in-flight deployments...");
            let _ = stop_tx.send(true);
        }
        _ = drain_all(&mut workers) => {
            warn!("All deployer workers exited");
            return;
        }
    }

    drain_all(&mut workers).await;
    info!("Deployer pool stopped");
}

async fn drain_all(workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!("Deployer worker crashed: {}", e);
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    pipeline: Arc<DeployPipeline>,
    receiver: Arc<Mutex<mpsc::Receiver<u64>>>,
    outcomes: broadcast::Sender<DeployOutcome>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let next = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                _ = stop.changed() => None,
                id = rx.recv() => id,
            }
        };
        let Some(deploy_id) = next else {
            debug!(worker_id, "Deployer worker exiting");
            return;
        };

        debug!(worker_id, deploy_id, "Picked up deployment");
        if let Some(outcome) = process(&pipeline, deploy_id).await {
            // no subscribers is fine
            let _ = outcomes.send(outcome);
        }
    }
}

/// Run the pipeline on its own task so that a panic is observed here and
/// the record still reaches a terminal status.
async fn process(pipeline: &Arc<DeployPipeline>, deploy_id: u64) -> Option<DeployOutcome> {
    let task = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.run(deploy_id).await })
    };

    match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(deploy_id, "Deployment task failed: {}", e);
            pipeline.abort(deploy_id, &e.to_string()).await
        }
    }
}
