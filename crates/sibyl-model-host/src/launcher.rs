//! Starting and signalling the model process.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::HostError;

pub type WorkerInput = Box<dyn AsyncWrite + Send + Unpin>;
pub type WorkerOutput = Box<dyn AsyncRead + Send + Unpin>;

/// A freshly started model process: its pipes and a handle to control it.
pub struct Worker {
    pub stdin: WorkerInput,
    pub stdout: WorkerOutput,
    pub control: Box<dyn ProcessControl>,
}

/// Polite-stop and hard-kill over a running process.
#[async_trait]
pub trait ProcessControl: Send {
    /// OS process id, if the process is still known to be running.
    fn id(&self) -> Option<u32>;

    /// Ask the process to stop what it is doing.
    fn interrupt(&mut self) -> io::Result<()>;

    /// Forcibly terminate the process.
    fn kill(&mut self) -> io::Result<()>;

    /// Wait for the process to exit.
    async fn wait(&mut self) -> io::Result<()>;
}

/// Starts model processes.
pub trait Launcher: Send + Sync + 'static {
    fn launch(&self, config: &ModelConfig) -> Result<Worker, HostError>;
}

/// Launches the configured executable with piped stdin/stdout.
///
/// Stderr is inherited so model diagnostics end up in our own log output.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLauncher;

impl Launcher for CommandLauncher {
    fn launch(&self, config: &ModelConfig) -> Result<Worker, HostError> {
        let mut child = Command::new(&config.binary_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(HostError::Spawn)?;

        let missing = |what| HostError::Spawn(io::Error::other(format!("no {what} pipe")));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;

        debug!("model process started with PID: {:?}", child.id());

        Ok(Worker {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            control: Box::new(ChildControl { child }),
        })
    }
}

/// [`ProcessControl`] for a real child process.
///
/// The interrupt is `SIGUSR1`, which the model host binary treats as
/// "abandon the current generation". Elsewhere interrupts are a no-op and
/// only the kill fallback applies.
struct ChildControl {
    child: Child,
}

#[async_trait]
impl ProcessControl for ChildControl {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn interrupt(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGUSR1) };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    async fn wait(&mut self) -> io::Result<()> {
        let status = self.child.wait().await?;
        debug!("model process exited with status: {:?}", status);
        Ok(())
    }
}
