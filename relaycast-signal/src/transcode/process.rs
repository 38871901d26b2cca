//! External encoder process control

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, warn};

use relaycast_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub success: bool,
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
        }
    }
}

/// A running encoder
#[async_trait]
pub trait EncoderProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Wait for the process to exit on its own
    async fn wait(&mut self) -> Result<ProcessExit>;

    /// Ask the process to stop, forcing it after `grace`
    async fn terminate(&mut self, grace: Duration) -> Result<ProcessExit>;
}

/// Starts encoder processes
#[async_trait]
pub trait EncoderLauncher: Send + Sync {
    async fn launch(&self, args: &[String]) -> Result<Box<dyn EncoderProcess>>;
}

/// Runs the `ffmpeg` binary
pub struct FfmpegLauncher {
    program: String,
}

impl FfmpegLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl EncoderLauncher for FfmpegLauncher {
    async fn launch(&self, args: &[String]) -> Result<Box<dyn EncoderProcess>> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::SubprocessFault(format!("failed to spawn {}: {e}", self.program)))?;

        let pid = child.id();
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(pid, stderr));
        }

        debug!(pid = ?pid, program = %self.program, "Encoder spawned");
        Ok(Box::new(FfmpegProcess { child, pid }))
    }
}

// ffmpeg reports progress and errors on stderr
async fn forward_stderr(pid: Option<u32>, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(pid = ?pid, "ffmpeg: {line}"),
            Ok(None) => break,
            Err(e) => {
                debug!(pid = ?pid, error = %e, "Encoder stderr closed");
                break;
            }
        }
    }
}

struct FfmpegProcess {
    child: Child,
    pid: Option<u32>,
}

impl FfmpegProcess {
    #[cfg(unix)]
    fn signal_terminate(&mut self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(raw) = self.child.id().and_then(|pid| i32::try_from(pid).ok()) else {
            return;
        };
        if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
            debug!(pid = raw, error = %e, "SIGTERM failed");
        }
    }

    #[cfg(not(unix))]
    fn signal_terminate(&mut self) {
        let _ = self.child.start_kill();
    }
}

#[async_trait]
impl EncoderProcess for FfmpegProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        Ok(self.child.wait().await?.into())
    }

    async fn terminate(&mut self, grace: Duration) -> Result<ProcessExit> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status.into());
        }

        self.signal_terminate();

        if let Ok(status) = tokio::time::timeout(grace, self.child.wait()).await {
            return Ok(status?.into());
        }

        warn!(pid = ?self.pid, "Encoder did not exit after SIGTERM, killing");
        self.child.kill().await?;
        Ok(self.child.wait().await?.into())
    }
}
