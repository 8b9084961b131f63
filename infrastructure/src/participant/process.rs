//! Participant process launching.
//!
//! [`Launcher`] turns a [`SpawnSpec`] into a running participant: its stdio
//! pipes plus a [`ProcessControl`] handle used for teardown. The production
//! [`ProcessLauncher`] spawns real child processes; tests substitute an
//! in-memory launcher.

use crate::rpc::transport::{BoxedReader, BoxedWriter};
use async_trait::async_trait;
use quorum_domain::{ParticipantId, SpawnSpec};
use std::io;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::debug;

/// Control over a launched participant process
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// OS process id, if the process has not been reaped yet
    fn id(&self) -> Option<u32>;

    /// Ask the process to exit (SIGTERM on Unix)
    fn terminate(&mut self) -> io::Result<()>;

    /// Kill the process unconditionally
    fn kill(&mut self) -> io::Result<()>;

    /// Wait for the process to exit, returning its exit code if it had one
    async fn wait(&mut self) -> io::Result<Option<i32>>;
}

/// A participant that has been started but not yet handshaken
pub struct LaunchedParticipant {
    /// The participant's stdout
    pub reader: BoxedReader,
    /// The participant's stdin
    pub writer: BoxedWriter,
    pub process: Box<dyn ProcessControl>,
}

/// Starts participant processes
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, id: &ParticipantId, spec: &SpawnSpec) -> io::Result<LaunchedParticipant>;
}

/// Launcher that spawns child processes with piped stdio
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }

    /// Forward the participant's stderr to the log, line by line
    fn drain_stderr(id: &ParticipantId, stderr: ChildStderr) {
        let id = id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("[{} stderr] {}", id, line);
            }
        });
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, id: &ParticipantId, spec: &SpawnSpec) -> io::Result<LaunchedParticipant> {
        debug!("Spawning participant {}: {}", id, spec.display_command());

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        // Linux: request kernel to send SIGTERM to child when parent dies.
        // This catches cases where Drop doesn't run (SIGKILL, OOM kill).
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        let mut child = cmd.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture stdout"))?;
        if let Some(stderr) = child.stderr.take() {
            Self::drain_stderr(id, stderr);
        }

        debug!("Participant {} started (pid {:?})", id, child.id());

        Ok(LaunchedParticipant {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            process: Box::new(ChildProcess { child }),
        })
    }
}

/// [`ProcessControl`] over a tokio child process
struct ChildProcess {
    child: Child,
}

#[async_trait]
impl ProcessControl for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = libc::pid_t::try_from(pid).map_err(io::Error::other)?;
        // SAFETY: `pid` is our own child and has not been reaped (id() is Some).
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        self.child.wait().await.map(|status| status.code())
    }
}
