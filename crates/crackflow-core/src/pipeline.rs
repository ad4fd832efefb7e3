//! Pipeline coordination: walks a stage plan through the process runner.
//!
//! State machine per session:
//!
//! ```text
//! NotStarted -> Running(0) -> Running(1) -> ... -> Completed
//!                    |             |
//!                    +-------------+--> Cancelled | Failed
//! ```
//!
//! Each stage ends with exactly one termination event, classified as success,
//! manual termination or abnormal exit. Success advances (after any declared
//! artifact is materialized) unless a cancel was requested for a stage that is
//! not the last; anything else stops the pipeline. An abnormal exit after a
//! cancel request counts as cancelled.

use crate::artifact::{ArtifactStore, FsArtifactStore};
use crate::error::{SessionError, StageFailure};
use crate::runner::{
    ExitClass, ProcessRunner, StageEvent, StreamKind, TerminationEvent, TokioProcessRunner,
};
use crate::session::{OutputChunk, SessionHandle, SessionStatus};
use crate::stage::{StagePlan, StageSpec};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Progress notifications for a consumer rendering the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StageStarted {
        stage: usize,
        name: String,
        pid: u32,
    },
    Output(OutputChunk),
    StageExited {
        stage: usize,
        termination: TerminationEvent,
    },
    Finished(SessionStatus),
}

/// Receives session events as they happen.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SessionEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: SessionEvent) {}
}

impl EventSink for mpsc::UnboundedSender<SessionEvent> {
    fn emit(&self, event: SessionEvent) {
        // A consumer that went away does not stop the pipeline.
        let _ = self.send(event);
    }
}

/// Sequences stages, hands artifacts between them and records the outcome.
#[derive(Clone)]
pub struct Pipeline {
    runner: Arc<dyn ProcessRunner>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl Pipeline {
    pub fn new(runner: Arc<dyn ProcessRunner>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { runner, artifacts }
    }

    /// Real processes, real files.
    pub fn local() -> Self {
        Self::new(Arc::new(TokioProcessRunner), Arc::new(FsArtifactStore))
    }

    /// Run every stage of `plan` into `session`, returning its terminal status.
    ///
    /// Fails only when `session` was already used; stage failures are reported
    /// through the returned status.
    pub async fn run(
        &self,
        plan: &StagePlan,
        session: &SessionHandle,
        sink: &dyn EventSink,
    ) -> Result<SessionStatus, SessionError> {
        let session_id = session.id();
        info!(session = %session_id, plan = %plan.short_digest(), stages = plan.len(), "Starting pipeline");

        for (index, stage) in plan.stages().iter().enumerate() {
            session.lock().begin_stage(index)?;
            info!(session = %session_id, stage = index, name = %stage.name, "Executing stage");

            if let Some(artifact) = &stage.output_artifact {
                if let Err(e) = self.artifacts.remove(artifact) {
                    let failure = StageFailure::Handoff {
                        stage: index,
                        artifact: artifact.clone(),
                        reason: format!("could not clear stale artifact: {e}"),
                    };
                    return conclude(session, sink, SessionStatus::Failed { failure });
                }
            }

            let outcome = match self.run_stage(index, stage, session, sink).await {
                Ok(outcome) => outcome,
                Err(failure) => return conclude(session, sink, SessionStatus::Failed { failure }),
            };

            let cancel_requested = session.lock().cancel_requested();
            match (outcome.exit.classify(), cancel_requested) {
                // The stage finished before the signal landed; do not start the next one.
                (ExitClass::Success, true) if !plan.is_last(index) => {
                    warn!(session = %session_id, stage = index, "Cancel requested; not starting next stage");
                    return conclude(session, sink, SessionStatus::Cancelled { stage: index });
                }
                (ExitClass::Success, _) => {
                    if let Some(artifact) = &stage.output_artifact {
                        if let Err(reason) = self.materialize(artifact, &outcome.captured) {
                            let failure = StageFailure::Handoff {
                                stage: index,
                                artifact: artifact.clone(),
                                reason,
                            };
                            return conclude(session, sink, SessionStatus::Failed { failure });
                        }
                        debug!(session = %session_id, artifact = %artifact.display(), "Artifact handed off");
                    }
                }
                (ExitClass::ManuallyTerminated, _) | (ExitClass::AbnormalExit, true) => {
                    return conclude(session, sink, SessionStatus::Cancelled { stage: index });
                }
                (ExitClass::AbnormalExit, false) => {
                    let failure = StageFailure::Exit {
                        stage: index,
                        termination: outcome.exit,
                    };
                    return conclude(session, sink, SessionStatus::Failed { failure });
                }
            }
        }

        conclude(session, sink, SessionStatus::Completed)
    }

    /// Spawn one stage and pump its events into the session until it exits.
    async fn run_stage(
        &self,
        index: usize,
        stage: &StageSpec,
        session: &SessionHandle,
        sink: &dyn EventSink,
    ) -> Result<StageOutcome, StageFailure> {
        let running = self.runner.spawn(stage).await.map_err(|e| {
            warn!(stage = index, "{}", e);
            StageFailure::Spawn {
                stage: index,
                message: e.to_string(),
            }
        })?;

        let pid = running.pid;
        session.lock().attach_pid(pid);
        sink.emit(SessionEvent::StageStarted {
            stage: index,
            name: stage.name.clone(),
            pid,
        });

        let capture = stage.output_artifact.is_some();
        let mut captured = Vec::new();
        let mut exit = None;
        let mut events = running.events;

        while let Some(event) = events.next().await {
            match event {
                StageEvent::Output { stream, text } => {
                    if capture && stream == StreamKind::Stdout {
                        captured.extend_from_slice(text.as_bytes());
                    }
                    let chunk = OutputChunk {
                        stage: index,
                        stream,
                        text,
                    };
                    session.lock().append(chunk.clone());
                    sink.emit(SessionEvent::Output(chunk));
                }
                StageEvent::Exited(termination) => exit = Some(termination),
            }
        }

        let exit = exit.unwrap_or_else(|| {
            warn!(stage = index, pid, "Event stream ended without a termination event");
            TerminationEvent::default()
        });

        session.lock().end_stage(index, exit);
        info!(stage = index, pid, termination = %exit, "Stage exited");
        sink.emit(SessionEvent::StageExited {
            stage: index,
            termination: exit,
        });

        Ok(StageOutcome { exit, captured })
    }

    fn materialize(&self, artifact: &Path, captured: &[u8]) -> Result<(), String> {
        if captured.is_empty() {
            return Err("stage produced no output to hand off".to_string());
        }
        self.artifacts
            .write(artifact, captured)
            .map_err(|e| e.to_string())?;
        if !self.artifacts.exists(artifact) {
            return Err("artifact missing after write".to_string());
        }
        Ok(())
    }
}

struct StageOutcome {
    exit: TerminationEvent,
    captured: Vec<u8>,
}

fn conclude(
    session: &SessionHandle,
    sink: &dyn EventSink,
    status: SessionStatus,
) -> Result<SessionStatus, SessionError> {
    session.lock().finish(status.clone())?;
    match &status {
        SessionStatus::Completed => info!(session = %session.id(), "Pipeline completed"),
        SessionStatus::Cancelled { stage } => {
            warn!(session = %session.id(), stage, "Pipeline cancelled")
        }
        SessionStatus::Failed { failure } => {
            warn!(session = %session.id(), stage = failure.stage(), "Pipeline failed: {}", failure)
        }
        _ => {}
    }
    sink.emit(SessionEvent::Finished(status.clone()));
    Ok(status)
}
