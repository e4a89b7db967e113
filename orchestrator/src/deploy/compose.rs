//! Docker Compose process runner

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::errors::PlatformError;

/// Exit status and combined stdout/stderr of one compose invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `None` when the process was killed or ended by a signal
    pub exit_code: Option<i32>,
    pub output: String,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs compose against a project.
///
/// `Err` means the process could not be started at all; a process that ran
/// and failed is reported through [`ProcessOutcome::exit_code`].
#[async_trait]
pub trait ComposeRunner: Send + Sync {
    /// `up -d` for `manifest`, with `workdir` as the working directory
    async fn up(
        &self,
        project: &str,
        manifest: &Path,
        workdir: &Path,
    ) -> Result<ProcessOutcome, PlatformError>;

    /// `down --volumes --remove-orphans` for the whole project
    async fn down(&self, project: &str, workdir: Option<&Path>)
        -> Result<ProcessOutcome, PlatformError>;
}

/// Compose invoked as an external process
#[derive(Debug, Clone)]
pub struct ComposeCli {
    binary: String,
    fallback_to_plugin: bool,
    timeout: Option<Duration>,
}

impl Default for ComposeCli {
    fn default() -> Self {
        Self {
            binary: "docker-compose".to_string(),
            fallback_to_plugin: true,
            timeout: None,
        }
    }
}

impl ComposeCli {
    pub fn new(binary: impl Into<String>, fallback_to_plugin: bool, timeout: Option<Duration>) -> Self {
        Self {
            binary: binary.into(),
            fallback_to_plugin,
            timeout,
        }
    }

    async fn run(&self, args: Vec<String>, workdir: Option<&Path>) -> Result<ProcessOutcome, PlatformError> {
        let child = match spawn(&self.binary, &args, workdir) {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound && self.fallback_to_plugin => {
                // standalone binary missing, try the `docker compose` plugin
                debug!("{} not found, falling back to 'docker compose'", self.binary);
                let mut plugin_args = vec!["compose".to_string()];
                plugin_args.extend(args);
                spawn("docker", &plugin_args, workdir).map_err(|e| {
                    PlatformError::DeployError(format!("failed to run docker compose: {}", e))
                })?
            }
            Err(e) => {
                return Err(PlatformError::DeployError(format!(
                    "failed to run {}: {}",
                    self.binary, e
                )))
            }
        };

        wait_with_output(child, self.timeout).await
    }
}

#[async_trait]
impl ComposeRunner for ComposeCli {
    async fn up(
        &self,
        project: &str,
        manifest: &Path,
        workdir: &Path,
    ) -> Result<ProcessOutcome, PlatformError> {
        info!(project, "Running compose up for {}", manifest.display());
        let args = vec![
            "--project-name".to_string(),
            project.to_string(),
            "--file".to_string(),
            manifest.display().to_string(),
            "up".to_string(),
            "-d".to_string(),
        ];
        self.run(args, Some(workdir)).await
    }

    async fn down(
        &self,
        project: &str,
        workdir: Option<&Path>,
    ) -> Result<ProcessOutcome, PlatformError> {
        info!(project, "Running compose down");
        let args = vec![
            "--project-name".to_string(),
            project.to_string(),
            "down".to_string(),
            "--volumes".to_string(),
            "--remove-orphans".to_string(),
        ];
        self.run(args, workdir).await
    }
}

fn spawn(program: &str, args: &[String], workdir: Option<&Path>) -> io::Result<Child> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = workdir.filter(|d| d.is_dir()) {
        command.current_dir(dir);
    }
    command.spawn()
}

/// Drain stdout and stderr line by line into one buffer, then reap the child.
/// On timeout the child is killed and the output collected so far is kept.
async fn wait_with_output(
    mut child: Child,
    timeout: Option<Duration>,
) -> Result<ProcessOutcome, PlatformError> {
    let mut output = String::new();

    let exit_code = match timeout {
        Some(limit) => {
            let finished = tokio::time::timeout(limit, collect(&mut child, &mut output)).await;
            match finished {
                Ok(result) => result?,
                Err(_) => {
                    warn!("Compose did not finish within {:?}, killing it", limit);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill compose process: {}", e);
                    }
                    output.push_str(&format!("compose timed out after {}s\n", limit.as_secs()));
                    None
                }
            }
        }
        None => collect(&mut child, &mut output).await?,
    };

    Ok(ProcessOutcome { exit_code, output })
}

async fn collect(child: &mut Child, output: &mut String) -> Result<Option<i32>, PlatformError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| PlatformError::Internal("compose stdout not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| PlatformError::Internal("compose stderr not captured".to_string()))?;

    // raw bytes: compose output is not guaranteed to be UTF-8
    let mut stdout = BufReader::new(stdout);
    let mut stderr = BufReader::new(stderr);
    let (mut stdout_buf, mut stderr_buf) = (Vec::new(), Vec::new());
    let (mut stdout_open, mut stderr_open) = (true, true);

    while stdout_open || stderr_open {
        tokio::select! {
            read = stdout.read_until(b'\n', &mut stdout_buf), if stdout_open => {
                if read? == 0 {
                    stdout_open = false;
                } else {
                    push_line(output, &stdout_buf);
                    stdout_buf.clear();
                }
            }
            read = stderr.read_until(b'\n', &mut stderr_buf), if stderr_open => {
                if read? == 0 {
                    stderr_open = false;
                } else {
                    push_line(output, &stderr_buf);
                    stderr_buf.clear();
                }
            }
        }
    }

    let status = child.wait().await?;
    Ok(status.code())
}

fn push_line(output: &mut String, raw: &[u8]) {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\n', '\r']);
    debug!("compose: {}", line);
    output.push_str(line);
    output.push('\n');
}
