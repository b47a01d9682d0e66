use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chem::ChemToolkit;
use crate::error::TaskError;
use super::backend::RecognitionBackend;
use super::types::{Outcome, Recognition, Task};

/// Exit code a shell reports for a child killed with SIGKILL.
const KILLED_EXIT_CODE: i32 = 137;
const SIGKILL: i32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Code(i32),
    Signal(i32),
    Unknown,
}

impl From<ExitStatus> for ExitKind {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitKind::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitKind::Signal(signal);
            }
        }
        ExitKind::Unknown
    }
}

/// First whitespace-separated candidate the toolkit can parse.
pub fn accept_candidate(stdout: &str, toolkit: &dyn ChemToolkit) -> Outcome {
    stdout
        .split_whitespace()
        .find(|candidate| toolkit.parse(candidate).is_ok())
        .map(Recognition::new)
        .ok_or(TaskError::InvalidStructure)
}

/// Maps a finished process to its outcome.
pub fn interpret_exit(exit: ExitKind, stdout: &str, stderr: &str, toolkit: &dyn ChemToolkit) -> Outcome {
    if exit == ExitKind::Code(0) && !stdout.trim().is_empty() {
        return accept_candidate(stdout, toolkit);
    }
    if matches!(exit, ExitKind::Code(KILLED_EXIT_CODE) | ExitKind::Signal(SIGKILL)) {
        return Err(TaskError::RecognitionCancelled);
    }
    Err(TaskError::from_stderr(stderr))
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!("Failed to read process output: {}", e);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn collect(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

/// Runs the recognition tool for one task and publishes a single outcome.
pub struct RecognitionRunner {
    backend: Arc<dyn RecognitionBackend>,
    toolkit: Arc<dyn ChemToolkit>,
    timeout: Duration,
    stop_timeout: Duration,
}

impl RecognitionRunner {
    pub fn new(
        backend: Arc<dyn RecognitionBackend>,
        toolkit: Arc<dyn ChemToolkit>,
        timeout: Duration,
        stop_timeout: Duration,
    ) -> Self {
        Self { backend, toolkit, timeout, stop_timeout }
    }

    /// Starts the run in the background. The receiver yields the outcome once
    /// the run has fully decided it; the sender is consumed by that single
    /// publish, so a second outcome cannot exist.
    pub fn spawn(self, task: Task, token: CancellationToken) -> (JoinHandle<()>, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let outcome = self.run(&task, &token).await;
            if tx.send(outcome).is_err() {
                debug!(task_id = %task.id, "Stream closed before the outcome was published");
            }
        });
        (handle, rx)
    }

    pub async fn run(&self, task: &Task, token: &CancellationToken) -> Outcome {
        let spec = self.backend.recognize_command(task);
        let mut cmd = spec.command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(task_id = %task.id, program = %spec.program, "Failed to start recognition: {}", e);
                return Err(TaskError::RecognitionFailed(format!(
                    "Failed to start {}: {}",
                    spec.program, e
                )));
            }
        };
        info!(task_id = %task.id, pid = ?child.id(), program = %spec.program, "Recognition started");

        let stdout = child.stdout.take().map(|out| tokio::spawn(read_all(out)));
        let stderr = child.stderr.take().map(|err| tokio::spawn(read_all(err)));

        let status = tokio::select! {
            status = child.wait() => status,
            _ = tokio::time::sleep(self.timeout) => {
                warn!(task_id = %task.id, "Recognition exceeded {}s, killing it", self.timeout.as_secs());
                self.stop(task, &mut child).await;
                return Err(TaskError::RecognitionTimeout { secs: self.timeout.as_secs() });
            }
            _ = token.cancelled() => {
                info!(task_id = %task.id, "Recognition cancelled, killing it");
                self.stop(task, &mut child).await;
                return Err(TaskError::RecognitionCancelled);
            }
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                error!(task_id = %task.id, "Failed to wait for recognition: {}", e);
                return Err(TaskError::RecognitionFailed(e.to_string()));
            }
        };

        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;
        let exit = ExitKind::from(status);
        info!(task_id = %task.id, ?exit, "Recognition finished");

        let outcome = interpret_exit(exit, &stdout, &stderr, self.toolkit.as_ref());
        match &outcome {
            Ok(recognition) => info!(task_id = %task.id, smiles = %recognition.smiles, "Structure accepted"),
            Err(e) => warn!(task_id = %task.id, "Recognition failed: {}", e),
        }
        outcome
    }

    /// Kills the local process, waits until it is reaped, then asks the
    /// backend to stop anything that outlives it (a detached container).
    async fn stop(&self, task: &Task, child: &mut Child) {
        if let Err(e) = child.kill().await {
            warn!(task_id = %task.id, "Failed to kill recognition process: {}", e);
        }
        if let Err(e) = self.backend.terminate(task, self.stop_timeout).await {
            warn!(task_id = %task.id, "Termination command failed: {}", e);
        }
    }
}
