//! Remote command execution over a multiplexed OpenSSH connection.
//!
//! Each session owns one control master; every command rides on it instead of
//! paying for a new handshake. The session tracks the master's lifecycle and
//! re-establishes it when a command finds it gone.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{BackendError, BackendResult};
use crate::model::{ConnectionState, SshConfig};

/// ssh's own exit status for connection-level failures.
const SSH_TRANSPORT_FAILURE: i32 = 255;
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Something that runs shell commands on the cluster's control host.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn exec(&self, command: &str, stdin: Option<&str>) -> BackendResult<CommandOutput>;

    fn state(&self) -> ConnectionState;

    async fn close(&self);
}

pub struct SshSession {
    label: String,
    config: SshConfig,
    program: PathBuf,
    control_path: PathBuf,
    timeout: Duration,
    state: Mutex<ConnectionState>,
    reconnect: tokio::sync::Mutex<()>,
}

impl SshSession {
    pub fn new(label: &str, config: SshConfig, control_dir: &Path, timeout: Duration) -> Self {
        let control_path = control_dir.join(format!("{}-%C", control_prefix(label)));
        Self {
            label: label.to_string(),
            config,
            program: PathBuf::from("ssh"),
            control_path,
            timeout,
            state: Mutex::new(ConnectionState::Connecting),
            reconnect: tokio::sync::Mutex::new(()),
        }
    }

    /// Swaps the ssh client binary used for key-based sessions.
    #[cfg(test)]
    fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(ConnectionState::Degraded)
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.config.username, self.config.hostname)
    }

    /// Establishes the control master. Leaves the session `ready` or `degraded`.
    pub async fn connect(&self) -> BackendResult<()> {
        self.set_state(ConnectionState::Connecting);
        if let Some(dir) = self.control_path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|error| BackendError::Other(anyhow::anyhow!(
                    "failed to create ssh control directory {}: {error}",
                    dir.display()
                )))?;
        }

        let mut cmd = self.ssh_command();
        cmd.arg("-M")
            .arg("-N")
            .arg("-f")
            .arg("-o")
            .arg("ControlMaster=yes")
            .arg("-o")
            .arg("ControlPersist=yes")
            .arg(self.destination());

        match self.run(cmd, None).await {
            Ok(output) if output.success() => {
                self.set_state(ConnectionState::Ready);
                info!(cluster = %self.label, host = %self.config.hostname, "ssh session established");
                Ok(())
            }
            Ok(output) => {
                self.set_state(ConnectionState::Degraded);
                Err(BackendError::Unavailable(format!(
                    "ssh connection to {} failed: {}",
                    self.destination(),
                    output.stderr.trim()
                )))
            }
            Err(error) => {
                self.set_state(ConnectionState::Degraded);
                Err(error)
            }
        }
    }

    /// Reconnects when the session is degraded or the master went away.
    pub async fn ensure_connected(&self) -> BackendResult<()> {
        let _guard = self.reconnect.lock().await;
        let state = self.state();
        if state.needs_reconnect() || state == ConnectionState::Connecting {
            debug!(cluster = %self.label, %state, "reconnecting ssh session");
            return self.connect().await;
        }

        if self.master_alive().await {
            return Ok(());
        }

        warn!(cluster = %self.label, "ssh control master is gone, reconnecting");
        self.set_state(ConnectionState::Degraded);
        self.connect().await
    }

    /// Runs `command` through the remote shell, feeding `stdin` when given.
    pub async fn exec(&self, command: &str, stdin: Option<&str>) -> BackendResult<CommandOutput> {
        self.ensure_connected().await?;

        let mut cmd = self.ssh_command();
        cmd.arg("-o")
            .arg("ControlMaster=no")
            .arg(self.destination())
            .arg("--")
            .arg(command);

        debug!(cluster = %self.label, command, "ssh exec");
        let output = match self.run(cmd, stdin).await {
            Ok(output) => output,
            Err(error) => {
                if error.is_connection_failure() {
                    self.set_state(ConnectionState::Degraded);
                }
                return Err(error);
            }
        };

        if output.status == Some(SSH_TRANSPORT_FAILURE) {
            self.set_state(ConnectionState::Degraded);
            return Err(BackendError::Unavailable(format!(
                "ssh transport to {} failed: {}",
                self.destination(),
                output.stderr.trim()
            )));
        }

        Ok(output)
    }

    pub async fn close(&self) {
        if self.state() == ConnectionState::Closed {
            return;
        }

        let mut cmd = self.ssh_command();
        cmd.arg("-O").arg("exit").arg(self.destination());
        if let Err(error) = self.run(cmd, None).await {
            debug!(cluster = %self.label, "ssh master exit failed: {error}");
        }
        self.set_state(ConnectionState::Closed);
        info!(cluster = %self.label, "ssh session closed");
    }

    async fn master_alive(&self) -> bool {
        let mut cmd = self.ssh_command();
        cmd.arg("-O").arg("check").arg(self.destination());
        matches!(self.run(cmd, None).await, Ok(output) if output.success())
    }

    fn set_state(&self, next: ConnectionState) {
        if let Ok(mut state) = self.state.lock()
            && *state != next
        {
            debug!(cluster = %self.label, from = %*state, to = %next, "ssh state change");
            *state = next;
        }
    }

    fn ssh_command(&self) -> TokioCommand {
        let mut cmd = match self.config.password.as_deref() {
            Some(password) if !password.is_empty() => {
                let mut cmd = TokioCommand::new("sshpass");
                cmd.arg("-e").arg("ssh").env("SSHPASS", password);
                cmd
            }
            _ => {
                let mut cmd = TokioCommand::new(&self.program);
                cmd.arg("-o").arg("BatchMode=yes");
                cmd
            }
        };
        cmd.args(ssh_options(&self.config, &self.control_path));
        cmd
    }

    async fn run(&self, mut cmd: TokioCommand, stdin: Option<&str>) -> BackendResult<CommandOutput> {
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|error| {
            BackendError::Unavailable(format!("failed to spawn ssh client: {error}"))
        })?;

        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(input.as_bytes()).await.map_err(|error| {
                BackendError::Unavailable(format!("failed to write to ssh stdin: {error}"))
            })?;
            drop(pipe);
        }

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => {
                return Err(BackendError::Unavailable(format!(
                    "ssh client failed: {error}"
                )));
            }
            Err(_) => return Err(BackendError::Timeout(self.timeout.as_secs())),
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code(),
        })
    }
}

#[async_trait]
impl RemoteShell for SshSession {
    async fn exec(&self, command: &str, stdin: Option<&str>) -> BackendResult<CommandOutput> {
        SshSession::exec(self, command, stdin).await
    }

    fn state(&self) -> ConnectionState {
        SshSession::state(self)
    }

    async fn close(&self) {
        SshSession::close(self).await
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if matches!(
            self.state(),
            ConnectionState::Closed | ConnectionState::Connecting
        ) {
            return;
        }
        // Best effort; the master also dies with the remote end.
        let _ = std::process::Command::new(&self.program)
            .args(ssh_options(&self.config, &self.control_path))
            .arg("-O")
            .arg("exit")
            .arg(self.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
    }
}

fn ssh_options(config: &SshConfig, control_path: &Path) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        config.port.to_string(),
        "-o".to_string(),
        format!("ControlPath={}", control_path.display()),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}"),
        "-o".to_string(),
        "ServerAliveInterval=15".to_string(),
    ];
    if let Some(key_path) = config.key_path.as_deref()
        && !key_path.is_empty()
    {
        args.push("-i".to_string());
        args.push(key_path.to_string());
    }
    args
}

/// Filesystem-safe prefix for the control socket; kept short because unix
/// socket paths are length-limited.
fn control_prefix(label: &str) -> String {
    let cleaned = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(16)
        .collect::<String>();
    if cleaned.is_empty() {
        "cluster".to_string()
    } else {
        cleaned
    }
}
