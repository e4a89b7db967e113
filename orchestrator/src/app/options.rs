//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::{deployer, monitor};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Compose invocation
    pub compose: ComposeOptions,

    /// Largest accepted manifest or env file
    pub max_upload_bytes: usize,

    /// Enable local HTTP server
    pub enable_socket_server: bool,

    /// Enable container status monitor
    pub enable_monitor: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Deployer pool options
    pub deployer: deployer::Options,

    /// Monitor worker options
    pub monitor: monitor::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions::default(),
            compose: ComposeOptions::default(),
            max_upload_bytes: 10 * 1024 * 1024,
            enable_socket_server: true,
            enable_monitor: true,
            server: ServerOptions::default(),
            deployer: deployer::Options::default(),
            monitor: monitor::Options::default(),
        }
    }
}

impl AppOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions {
                layout: StorageLayout::new(settings.storage.base_path.clone()),
                state_file: settings.storage.state_file.clone(),
            },
            compose: ComposeOptions {
                binary: settings.compose.binary.clone(),
                fallback_to_plugin: settings.compose.fallback_to_plugin,
                timeout: settings.compose.timeout_secs.map(Duration::from_secs),
            },
            max_upload_bytes: settings.upload.max_bytes,
            enable_socket_server: settings.server.enabled,
            enable_monitor: settings.monitor.enabled,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            deployer: deployer::Options {
                workers: settings.deployer.workers,
                queue_capacity: settings.deployer.queue_capacity,
            },
            monitor: monitor::Options {
                interval: Duration::from_secs(settings.monitor.interval_secs),
            },
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(60),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Workspace tree
    pub layout: StorageLayout,

    /// Record snapshot; in-memory only when `None`
    pub state_file: Option<PathBuf>,
}

/// Compose runner options
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    pub binary: String,
    pub fallback_to_plugin: bool,
    pub timeout: Option<Duration>,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            binary: "docker-compose".to_string(),
            fallback_to_plugin: true,
            timeout: None,
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
