//! Worker process spawning.
//!
//! Each job runs in its own OS process so that killing it cannot disturb the
//! poller. The payload goes in on stdin; the exit code is the only result.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

use crate::pipeline::WorkerPayload;

/// Exit code reported when a process ended without one (e.g. killed by a signal).
pub const NO_EXIT_CODE: i32 = -1;

/// Handle to a running worker.
#[async_trait]
pub trait WorkerProcess: Send {
    /// OS process id, if still known.
    fn id(&self) -> Option<u32>;

    /// Waits for the process to exit and returns its exit code. Cancel-safe.
    async fn wait(&mut self) -> io::Result<i32>;

    /// Sends a termination signal without waiting for the exit.
    fn terminate(&mut self) -> io::Result<()>;
}

/// Starts worker processes.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, payload: &WorkerPayload) -> io::Result<Box<dyn WorkerProcess>>;
}

/// Launches `<program> <args..>` and writes the payload as JSON to its stdin.
///
/// Stdout and stderr are inherited so worker logs interleave with the
/// poller's.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-invokes the running binary with the `worker` subcommand.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, vec!["worker".to_string()]))
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, payload: &WorkerPayload) -> io::Result<Box<dyn WorkerProcess>> {
        let body = serde_json::to_vec(payload)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("worker stdin was not captured"))?;
        stdin.write_all(&body).await?;
        stdin.shutdown().await?;
        drop(stdin);

        tracing::info!(
            pid = child.id().unwrap_or_default(),
            todo_id = %payload.todo_id,
            "Worker process spawned"
        );
        Ok(Box::new(ChildProcess { child }))
    }
}

/// [`WorkerProcess`] over a tokio child process.
pub struct ChildProcess {
    child: Child,
}

#[async_trait]
impl WorkerProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> io::Result<i32> {
        let status = self.child.wait().await?;
        Ok(status.code().unwrap_or(NO_EXIT_CODE))
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_code_is_reported() {
        let launcher = ProcessLauncher::new("sh", vec!["-c".to_string(), "cat > /dev/null; exit 3".to_string()]);
        let mut process = launcher.launch(&WorkerPayload::default()).await.unwrap();
        assert_eq!(process.wait().await.unwrap(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_stops_process() {
        let launcher = ProcessLauncher::new("sh", vec!["-c".to_string(), "cat > /dev/null; sleep 30".to_string()]);
        let mut process = launcher.launch(&WorkerPayload::default()).await.unwrap();
        assert!(process.id().is_some());
        process.terminate().unwrap();
        assert_ne!(process.wait().await.unwrap(), 0);
    }
}
