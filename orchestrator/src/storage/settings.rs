//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::PlatformError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/beanstalk/settings.json";

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Also write daily-rolling log files here
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Workspace and state storage
    #[serde(default)]
    pub storage: StorageSettings,

    /// Compose invocation
    #[serde(default)]
    pub compose: ComposeSettings,

    /// Deployment worker pool
    #[serde(default)]
    pub deployer: DeployerSettings,

    /// Container status monitor
    #[serde(default)]
    pub monitor: MonitorSettings,

    /// Local HTTP server
    #[serde(default)]
    pub server: ServerSettings,

    /// Upload limits
    #[serde(default)]
    pub upload: UploadSettings,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            storage: StorageSettings::default(),
            compose: ComposeSettings::default(),
            deployer: DeployerSettings::default(),
            monitor: MonitorSettings::default(),
            server: ServerSettings::default(),
            upload: UploadSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`; a missing file yields the defaults
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, PlatformError> {
        let file = File::new(path);
        if !file.exists().await {
            return Ok(Self::default());
        }
        file.read_json::<Settings>()
            .await
            .map_err(|e| PlatformError::ConfigError(format!("{}: {}", file.path().display(), e)))
    }
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Root of the `<serverId>/workspaces/<name>` trees
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Snapshot file of the record store; records are kept in memory only when unset
    #[serde(default = "default_state_file")]
    pub state_file: Option<PathBuf>,
}

fn default_base_path() -> PathBuf {
    PathBuf::from("/var/lib/beanstalk/servers")
}

fn default_state_file() -> Option<PathBuf> {
    Some(PathBuf::from("/var/lib/beanstalk/state.json"))
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            state_file: default_state_file(),
        }
    }
}

/// Compose settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeSettings {
    /// Standalone compose binary
    #[serde(default = "default_compose_binary")]
    pub binary: String,

    /// Retry with `docker compose` when the binary cannot be spawned
    #[serde(default = "default_true")]
    pub fallback_to_plugin: bool,

    /// Kill a compose run that takes longer than this
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_compose_binary() -> String {
    "docker-compose".to_string()
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            binary: default_compose_binary(),
            fallback_to_plugin: true,
            timeout_secs: None,
        }
    }
}

/// Deployment pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_workers() -> usize {
    3
}

fn default_queue_capacity() -> usize {
    50
}

impl Default for DeployerSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,
}

fn default_monitor_interval() -> u64 {
    30
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_monitor_interval(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Upload limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
        }
    }
}
