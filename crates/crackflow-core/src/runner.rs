//! Stage process execution with incremental output streaming.

use crate::error::SpawnError;
use crate::stage::StageSpec;
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Signal number sent for a graceful termination request.
pub const SIGTERM: i32 = 15;

const EVENT_BUFFER: usize = 256;

/// How long output may keep flowing after the stage process itself exited.
/// A descendant holding the pipes open must not delay the termination event,
/// which is what clears the session's pid.
pub const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Which pipe a chunk was read from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// How a stage process ended.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerminationEvent {
    /// Exit code, absent when the process was killed by a signal.
    pub code: Option<i32>,

    /// Terminating signal, if any.
    pub signal: Option<i32>,
}

/// Classification of a [`TerminationEvent`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExitClass {
    Success,
    ManuallyTerminated,
    AbnormalExit,
}

impl TerminationEvent {
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signalled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// SIGTERM wins over any exit code; otherwise only code 0 is success.
    pub fn classify(&self) -> ExitClass {
        if self.signal == Some(SIGTERM) {
            ExitClass::ManuallyTerminated
        } else if self.code == Some(0) {
            ExitClass::Success
        } else {
            ExitClass::AbnormalExit
        }
    }
}

impl From<ExitStatus> for TerminationEvent {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for TerminationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<i32>| v.map_or_else(|| "none".to_string(), |v| v.to_string());
        write!(
            f,
            "exit code: {} and signal code: {}",
            show(self.code),
            show(self.signal)
        )
    }
}

/// Event produced by a running stage. `Exited` is always last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    Output { stream: StreamKind, text: String },
    Exited(TerminationEvent),
}

/// A spawned stage process.
pub struct RunningStage {
    /// Live process identifier, valid until `Exited` is observed.
    pub pid: u32,

    /// Output chunks in arrival order, then exactly one `Exited`.
    pub events: BoxStream<'static, StageEvent>,
}

impl RunningStage {
    /// Drain the stream, returning the collected output and termination.
    pub async fn collect(mut self) -> (Vec<(StreamKind, String)>, TerminationEvent) {
        let mut output = Vec::new();
        let mut termination = TerminationEvent::default();
        while let Some(event) = self.events.next().await {
            match event {
                StageEvent::Output { stream, text } => output.push((stream, text)),
                StageEvent::Exited(event) => termination = event,
            }
        }
        (output, termination)
    }
}

/// Spawns one OS process per stage.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn spawn(&self, stage: &StageSpec) -> Result<RunningStage, SpawnError>;
}

/// Runner backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn spawn(&self, stage: &StageSpec) -> Result<RunningStage, SpawnError> {
        let mut cmd = Command::new(&stage.program);
        cmd.args(&stage.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &stage.working_dir {
            cmd.current_dir(dir);
        }

        let spawn_error = |source| SpawnError {
            program: stage.program.clone(),
            source,
        };

        let mut child = cmd.spawn().map_err(spawn_error)?;
        let pid = child.id().ok_or_else(|| {
            spawn_error(std::io::Error::new(
                std::io::ErrorKind::Other,
                "process exited before its pid was observed",
            ))
        })?;

        info!(stage = %stage.name, pid, argv = ?stage.argv(), "Spawned stage process");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(pump(out, StreamKind::Stdout, tx.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(pump(err, StreamKind::Stderr, tx.clone())));

        let stage_name = stage.name.clone();
        tokio::spawn(async move {
            let status = child.wait().await;

            // Readers hit EOF once the pipes close; drain them so every chunk
            // precedes the termination event.
            let readers: Vec<_> = [stdout_task, stderr_task].into_iter().flatten().collect();
            let aborts: Vec<_> = readers.iter().map(|task| task.abort_handle()).collect();
            match tokio::time::timeout(OUTPUT_DRAIN_GRACE, future::join_all(readers)).await {
                Ok(results) => {
                    for result in results {
                        if let Err(e) = result {
                            warn!(stage = %stage_name, "Output reader task failed: {}", e);
                        }
                    }
                }
                Err(_) => {
                    warn!(
                        stage = %stage_name,
                        pid,
                        "Output still open {:?} after exit; detaching readers",
                        OUTPUT_DRAIN_GRACE
                    );
                    for abort in aborts {
                        abort.abort();
                    }
                }
            }

            let termination = match status {
                Ok(status) => TerminationEvent::from(status),
                Err(e) => {
                    warn!(stage = %stage_name, pid, "Failed to wait for process: {}", e);
                    TerminationEvent::default()
                }
            };
            debug!(stage = %stage_name, pid, %termination, "Stage process exited");
            let _ = tx.send(StageEvent::Exited(termination)).await;
        });

        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed();

        Ok(RunningStage { pid, events })
    }
}

async fn pump<R>(reader: R, stream: StreamKind, tx: mpsc::Sender<StageEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf).into_owned();
                debug!(?stream, "{}", text.trim_end());
                // Keep draining even if nobody listens so the child never
                // blocks on a full pipe.
                let _ = tx.send(StageEvent::Output { stream, text }).await;
            }
            Err(e) => {
                warn!(?stream, "Failed to read process output: {}", e);
                break;
            }
        }
    }
}
