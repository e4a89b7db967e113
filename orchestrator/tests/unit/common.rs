//! Fakes for the compose and engine seams, plus a wired-up harness

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_models::models::ContainerStatus;
use async_trait::async_trait;
use beanstalk::app::options::AppOptions;
use beanstalk::app::state::AppState;
use beanstalk::deploy::compose::{ComposeRunner, ProcessOutcome};
use beanstalk::deploy::fsm::DeployEvent;
use beanstalk::deploy::pipeline::DeployOutcome;
use beanstalk::deploy::service::DeployUpload;
use beanstalk::docker::engine::{ContainerEngine, EngineContainer};
use beanstalk::docker::naming::{project_name, COMPOSE_PROJECT_LABEL, TENANT_LABEL_KEY};
use beanstalk::errors::PlatformError;
use beanstalk::models::container::Container;
use beanstalk::models::deploy::{Deploy, NewDeploy};
use beanstalk::models::server::Server;
use beanstalk::storage::layout::StorageLayout;
use beanstalk::store::memory::MemoryStore;
use beanstalk::store::Store;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const OWNER: &str = "owner-1";
pub const SERVER: &str = "s1";

pub const WEB_MANIFEST: &str = "services:\n  web:\n    image: nginx\n";

// ================================ COMPOSE ======================================= //

pub struct FakeCompose {
    up: Mutex<ProcessOutcome>,
    down: Mutex<Option<ProcessOutcome>>,
    down_delay: Mutex<Duration>,
    spawn_into: Mutex<Option<Arc<FakeEngine>>>,
    spawned: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl FakeCompose {
    pub fn succeeding() -> Self {
        Self {
            up: Mutex::new(outcome(0, "")),
            down: Mutex::new(Some(outcome(0, ""))),
            down_delay: Mutex::new(Duration::ZERO),
            spawn_into: Mutex::new(None),
            spawned: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_up(code: i32, output: &str) -> Self {
        let compose = Self::succeeding();
        *compose.up.lock().unwrap() = outcome(code, output);
        compose
    }

    /// `down` exits non-zero
    pub fn with_failing_down(self) -> Self {
        *self.down.lock().unwrap() = Some(outcome(1, "no such project"));
        self
    }

    /// `down` cannot be started at all
    pub fn with_missing_down(self) -> Self {
        *self.down.lock().unwrap() = None;
        self
    }

    /// `down` takes `delay` before it reports
    pub fn with_slow_down(self, delay: Duration) -> Self {
        *self.down_delay.lock().unwrap() = delay;
        self
    }

    /// Every `up` creates one running container `c<n>` named `<server>_svc_<n>`
    pub fn spawning_into(self, engine: Arc<FakeEngine>) -> Self {
        *self.spawn_into.lock().unwrap() = Some(engine);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn outcome(code: i32, output: &str) -> ProcessOutcome {
    ProcessOutcome {
        exit_code: Some(code),
        output: output.to_string(),
    }
}

#[async_trait]
impl ComposeRunner for FakeCompose {
    async fn up(
        &self,
        project: &str,
        manifest: &Path,
        _workdir: &Path,
    ) -> Result<ProcessOutcome, PlatformError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("up {} {}", project, manifest.display()));
        let engine = self.spawn_into.lock().unwrap().clone();
        if let Some(engine) = engine {
            let n = self.spawned.fetch_add(1, Ordering::SeqCst) + 1;
            let server_id = project.trim_start_matches("app-");
            engine.add_container(
                &format!("c{}", n),
                &format!("{}_svc_{}", server_id, n),
                server_id,
                "running",
            );
        }
        Ok(self.up.lock().unwrap().clone())
    }

    async fn down(
        &self,
        project: &str,
        _workdir: Option<&Path>,
    ) -> Result<ProcessOutcome, PlatformError> {
        self.calls.lock().unwrap().push(format!("down {}", project));
        let delay = *self.down_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.down
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PlatformError::DeployError("compose unavailable".to_string()))
    }
}

// ================================= ENGINE ======================================= //

#[derive(Default)]
pub struct FakeEngine {
    containers: Mutex<Vec<EngineContainer>>,
    networks: Mutex<HashMap<String, String>>,
    pub fail_listing: AtomicBool,
    pub fail_inspect: AtomicBool,
}

impl FakeEngine {
    /// A container of `server_id`'s compose project
    pub fn add_container(&self, id: &str, name: &str, server_id: &str, state: &str) {
        let labels = HashMap::from([
            (COMPOSE_PROJECT_LABEL.to_string(), project_name(server_id)),
            (TENANT_LABEL_KEY.to_string(), server_id.to_string()),
        ]);
        self.containers.lock().unwrap().push(EngineContainer {
            id: id.to_string(),
            names: vec![format!("/{}", name)],
            image: Some("nginx".to_string()),
            state: Some(state.to_string()),
            labels,
        });
    }

    /// Keep the container but drop its labels, so only inspection finds it
    pub fn strip_labels(&self, id: &str) {
        for container in self.containers.lock().unwrap().iter_mut() {
            if container.id == id {
                container.labels.clear();
            }
        }
    }

    pub fn set_state(&self, id: &str, state: &str) {
        for container in self.containers.lock().unwrap().iter_mut() {
            if container.id == id {
                container.state = Some(state.to_string());
            }
        }
    }

    /// Make a container vanish without going through the engine API
    pub fn drop_container(&self, id: &str) {
        self.containers.lock().unwrap().retain(|c| c.id != id);
    }

    pub fn state_of(&self, id: &str) -> Option<String> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .and_then(|c| c.state.clone())
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.networks.lock().unwrap().contains_key(name)
    }

    pub fn add_network(&self, name: &str, id: &str) {
        self.networks
            .lock()
            .unwrap()
            .insert(name.to_string(), id.to_string());
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn list_containers(
        &self,
        labels: &[(&str, &str)],
    ) -> Result<Vec<EngineContainer>, PlatformError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(PlatformError::EngineError("engine unavailable".to_string()));
        }
        let containers = self.containers.lock().unwrap();
        Ok(containers
            .iter()
            .filter(|c| {
                labels
                    .iter()
                    .all(|(key, value)| c.labels.get(*key).map(String::as_str) == Some(*value))
            })
            .cloned()
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<Option<String>, PlatformError> {
        if self.fail_inspect.load(Ordering::SeqCst) {
            return Err(PlatformError::EngineError("engine unavailable".to_string()));
        }
        let containers = self.containers.lock().unwrap();
        Ok(containers
            .iter()
            .find(|c| c.id == id)
            .and_then(|c| c.state.clone()))
    }

    async fn remove_container(&self, id: &str) -> Result<(), PlatformError> {
        self.drop_container(id);
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), PlatformError> {
        if self.state_of(id).is_none() {
            return Err(PlatformError::NotFound(format!("container {}", id)));
        }
        self.set_state(id, "exited");
        Ok(())
    }

    async fn start_container(&self, id: &str) -> Result<(), PlatformError> {
        if self.state_of(id).is_none() {
            return Err(PlatformError::NotFound(format!("container {}", id)));
        }
        self.set_state(id, "running");
        Ok(())
    }

    async fn find_network(&self, name: &str) -> Result<Option<String>, PlatformError> {
        Ok(self.networks.lock().unwrap().get(name).cloned())
    }

    async fn create_network(
        &self,
        name: &str,
        _labels: HashMap<String, String>,
    ) -> Result<String, PlatformError> {
        let id = format!("net-{}", name);
        self.add_network(name, &id);
        Ok(id)
    }

    async fn remove_network(&self, name: &str) -> Result<(), PlatformError> {
        self.networks.lock().unwrap().remove(name);
        Ok(())
    }
}

// ================================= STORE ======================================== //

/// Memory store whose first container insert is held back by `delay`
pub struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
    delayed: AtomicBool,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            delay,
            delayed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Store for SlowStore {
    async fn save_server(&self, server: Server) -> Result<(), PlatformError> {
        self.inner.save_server(server).await
    }

    async fn find_server(&self, id: &str) -> Result<Option<Server>, PlatformError> {
        self.inner.find_server(id).await
    }

    async fn list_servers(&self) -> Result<Vec<Server>, PlatformError> {
        self.inner.list_servers().await
    }

    async fn delete_server(&self, id: &str) -> Result<bool, PlatformError> {
        self.inner.delete_server(id).await
    }

    async fn insert_deploy(&self, new: NewDeploy) -> Result<Deploy, PlatformError> {
        self.inner.insert_deploy(new).await
    }

    async fn find_deploy(&self, id: u64) -> Result<Option<Deploy>, PlatformError> {
        self.inner.find_deploy(id).await
    }

    async fn list_deploys(&self, server_id: &str) -> Result<Vec<Deploy>, PlatformError> {
        self.inner.list_deploys(server_id).await
    }

    async fn list_all_deploys(&self) -> Result<Vec<Deploy>, PlatformError> {
        self.inner.list_all_deploys().await
    }

    async fn transition_deploy(&self, id: u64, event: DeployEvent) -> Result<Deploy, PlatformError> {
        self.inner.transition_deploy(id, event).await
    }

    async fn delete_deploy(&self, id: u64) -> Result<bool, PlatformError> {
        self.inner.delete_deploy(id).await
    }

    async fn insert_container(&self, container: Container) -> Result<bool, PlatformError> {
        if !self.delayed.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.insert_container(container).await
    }

    async fn find_container(&self, id: &str) -> Result<Option<Container>, PlatformError> {
        self.inner.find_container(id).await
    }

    async fn list_containers_by_deploy(&self, deploy_id: u64) -> Result<Vec<Container>, PlatformError> {
        self.inner.list_containers_by_deploy(deploy_id).await
    }

    async fn list_containers_by_server(&self, server_id: &str) -> Result<Vec<Container>, PlatformError> {
        self.inner.list_containers_by_server(server_id).await
    }

    async fn update_container_status(
        &self,
        id: &str,
        status: ContainerStatus,
    ) -> Result<bool, PlatformError> {
        self.inner.update_container_status(id, status).await
    }

    async fn delete_container(&self, id: &str) -> Result<bool, PlatformError> {
        self.inner.delete_container(id).await
    }
}

// ================================ HARNESS ======================================= //

pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<dyn Store>,
    pub engine: Arc<FakeEngine>,
    pub compose: Arc<FakeCompose>,
    pub state: AppState,
    pub receiver: mpsc::Receiver<u64>,
}

impl Harness {
    pub async fn new(compose: FakeCompose) -> Self {
        Self::with_capacity(compose, 50).await
    }

    /// Harness with server [`SERVER`] owned by [`OWNER`] already stored
    pub async fn with_capacity(compose: FakeCompose, capacity: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut options = AppOptions::default();
        options.storage.layout = StorageLayout::new(dir.path());
        options.deployer.queue_capacity = capacity;

        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let engine = Arc::new(FakeEngine::default());
        let compose = Arc::new(compose);

        let (state, receiver) =
            AppState::assemble(&options, store.clone(), engine.clone(), compose.clone());
        seed_server(store.as_ref(), SERVER, OWNER).await;

        Self {
            dir,
            store,
            engine,
            compose,
            state,
            receiver,
        }
    }

    /// Run the pipeline for everything currently queued
    pub async fn drain(&mut self) -> Vec<Option<DeployOutcome>> {
        let mut outcomes = Vec::new();
        while let Ok(id) = self.receiver.try_recv() {
            outcomes.push(self.state.pipeline.run(id).await);
        }
        outcomes
    }
}

pub async fn seed_server(store: &dyn Store, id: &str, owner: &str) -> Server {
    let mut server = Server::new(owner, "demo");
    server.id = id.to_string();
    store.save_server(server.clone()).await.unwrap();
    server
}

pub fn upload(workspace: &str, manifest: &str) -> DeployUpload {
    DeployUpload {
        workspace: workspace.to_string(),
        manifest: manifest.as_bytes().to_vec(),
        env: None,
    }
}
