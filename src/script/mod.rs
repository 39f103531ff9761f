// ABOUTME: Shell script execution with captured logs and forceful-kill supervision.
// ABOUTME: Implements the spawn-and-log protocol shared by deploy and lifecycle-event scripts.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Notify};

/// Directory inside a release that holds the user-supplied scripts.
pub const SCRIPT_DIR_NAME: &str = ".easydep";
/// Directory inside a release that collects captured script output.
pub const LOG_DIR_NAME: &str = ".scriptlog";

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script process exited with non-zero exit code: {0}")]
    Exit(i32),

    #[error("unable to spawn script process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("I/O error around script execution: {0}")]
    Io(#[from] std::io::Error),
}

/// Relative path of a script below a release directory.
pub fn script_rel_path(script_name: &str) -> String {
    format!("{SCRIPT_DIR_NAME}/{script_name}")
}

/// Info key under which a script's absolute log path is exposed.
pub fn info_key(script_name: &str) -> String {
    format!("easydep_{}_log", script_name.replace('.', "_"))
}

/// Reads a captured script log and forwards every line to the agent log at
/// INFO, tagged with the given scope. Read failures are ignored; the log is
/// best-effort evidence, not part of the deployment outcome.
pub async fn stream_log(log_path: &Path, scope: &str) {
    match tokio::fs::read_to_string(log_path).await {
        Ok(contents) => {
            for line in contents.lines() {
                tracing::info!("[{scope}]: {line}");
            }
        }
        Err(err) => {
            tracing::debug!("unable to read script log {}: {err}", log_path.display());
        }
    }
}

/// Runs a script detached from any pipeline: the exit status only produces
/// log output and never propagates. Used for lifecycle-event scripts.
pub fn run_detached(dir: &Path, script_name: &str, scope: String) {
    let rel_path = script_rel_path(script_name);
    if !dir.join(&rel_path).is_file() {
        tracing::debug!("unable to execute script at {rel_path}: script is missing");
        return;
    }

    match ProcessSupervisor::spawn(dir, &rel_path) {
        Ok(supervisor) => {
            tokio::spawn(async move {
                let log_path = supervisor.log_path().to_path_buf();
                let status = supervisor.wait().await;
                stream_log(&log_path, &scope).await;
                match status {
                    Ok(status) if status.success() => {}
                    Ok(status) => {
                        tracing::warn!("lifecycle script exited with {status}");
                    }
                    Err(err) => {
                        tracing::warn!("unable to await lifecycle script: {err}");
                    }
                }
            });
        }
        Err(err) => tracing::warn!("unable to start lifecycle script {rel_path}: {err}"),
    }
}

/// Requests immediate termination of a supervised process.
///
/// Cloneable, idempotent, safe from any thread and from inside compensation
/// hooks; killing an already-exited process is a no-op.
#[derive(Clone)]
pub struct KillHandle(Arc<Notify>);

impl KillHandle {
    fn new() -> Self {
        Self(Arc::new(Notify::new()))
    }

    pub fn kill(&self) {
        self.0.notify_one();
    }

    async fn killed(&self) {
        self.0.notified().await;
    }
}

/// Owns a spawned script process and its log file.
///
/// Construction spawns both the process and a watchdog task, so the process
/// can be killed through the [`KillHandle`] even after the supervisor itself
/// was dropped during an early cancel.
pub struct ProcessSupervisor {
    log_path: PathBuf,
    kill: KillHandle,
    exit: oneshot::Receiver<std::io::Result<ExitStatus>>,
}

impl ProcessSupervisor {
    /// Spawns `bash <script>` rooted at `dir`, with stderr merged into
    /// stdout and both captured into a fresh log file under `.scriptlog`.
    pub fn spawn(dir: &Path, script_rel_path: &str) -> Result<Self, ScriptError> {
        let log_path = create_log_file(dir)?;
        let stdout = File::options().append(true).open(&log_path)?;
        let stderr = stdout.try_clone()?;

        let child = Command::new("bash")
            .arg(script_rel_path)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(ScriptError::Spawn)?;

        let kill = KillHandle::new();
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(watch(child, kill.clone(), exit_tx));

        Ok(Self {
            log_path,
            kill,
            exit: exit_rx,
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn kill_handle(&self) -> KillHandle {
        self.kill.clone()
    }

    /// Waits for the process to exit, however that comes about.
    pub async fn wait(self) -> std::io::Result<ExitStatus> {
        self.exit
            .await
            .unwrap_or_else(|_| Err(std::io::Error::other("process watchdog vanished")))
    }
}

async fn watch(
    mut child: Child,
    kill: KillHandle,
    exit_tx: oneshot::Sender<std::io::Result<ExitStatus>>,
) {
    let exited = {
        let wait = child.wait();
        tokio::pin!(wait);
        tokio::select! {
            biased;
            _ = kill.killed() => None,
            status = &mut wait => Some(status),
        }
    };

    let status = match exited {
        Some(status) => status,
        None => {
            // immediate termination: a newer release is already waiting, so
            // there is no point in a graceful shutdown
            if let Err(err) = child.start_kill() {
                tracing::warn!("unable to kill script process: {err}");
            }
            child.wait().await
        }
    };
    let _ = exit_tx.send(status);
}

fn create_log_file(dir: &Path) -> Result<PathBuf, ScriptError> {
    static LOG_COUNTER: AtomicU64 = AtomicU64::new(0);

    let log_dir = dir.join(LOG_DIR_NAME);
    std::fs::create_dir_all(&log_dir)?;

    let sequence = LOG_COUNTER.fetch_add(1, Ordering::Relaxed);
    let log_path = log_dir.join(format!(
        "{}_{sequence}.tmp",
        Utc::now().timestamp_millis()
    ));
    File::create(&log_path)?;
    Ok(log_path)
}
