//! Per-submission run state: accumulated output, live pid and terminal status.

use crate::error::{SessionError, StageFailure};
use crate::runner::{StreamKind, TerminationEvent};
use crate::stage::StagePlan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Lifecycle of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    Running { stage: usize },
    Completed,
    Cancelled { stage: usize },
    Failed { failure: StageFailure },
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled { .. } | SessionStatus::Failed { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "not_started",
            SessionStatus::Running { .. } => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled { .. } => "cancelled",
            SessionStatus::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::NotStarted => f.write_str("Not started."),
            SessionStatus::Running { stage } => write!(f, "Running stage {stage}."),
            SessionStatus::Completed => f.write_str("Process completed successfully."),
            SessionStatus::Cancelled { .. } => f.write_str("Process was manually terminated."),
            SessionStatus::Failed {
                failure: StageFailure::Exit { termination, .. },
            } => write!(f, "Process terminated with {termination}"),
            SessionStatus::Failed { failure } => write!(f, "Process failed: {failure}"),
        }
    }
}

/// A piece of process output attributed to its stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputChunk {
    pub stage: usize,
    pub stream: StreamKind,
    pub text: String,
}

/// Termination observed for one stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageExit {
    pub stage: usize,
    pub termination: TerminationEvent,
}

/// Outcome of [`Session::flag_cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelFlag {
    NoProcess,
    AlreadyRequested(u32),
    Flagged(u32),
}

/// Mutable state for one submission.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    id: Uuid,
    plan_digest: String,
    stage_count: usize,
    status: SessionStatus,
    chunks: Vec<OutputChunk>,
    live_pid: Option<u32>,
    cancel_requested: bool,
    exits: Vec<StageExit>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Fresh `NotStarted` session for `plan`.
    pub fn new(plan: &StagePlan) -> Self {
        Self::with_id(plan, Uuid::new_v4())
    }

    /// Like [`Session::new`] with a caller-chosen id, for plans whose
    /// artifact paths were scoped to that id before the session existed.
    pub fn with_id(plan: &StagePlan, id: Uuid) -> Self {
        Self {
            id,
            plan_digest: plan.digest().to_string(),
            stage_count: plan.len(),
            status: SessionStatus::NotStarted,
            chunks: Vec::new(),
            live_pid: None,
            cancel_requested: false,
            exits: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Digest of the plan this session runs.
    pub fn plan_digest(&self) -> &str {
        &self.plan_digest
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Pid of the running stage; `None` between stages and after the end.
    pub fn live_pid(&self) -> Option<u32> {
        self.live_pid
    }

    /// Whether a cancellation was sent to the current stage.
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    /// Output chunks in arrival order.
    pub fn chunks(&self) -> &[OutputChunk] {
        &self.chunks
    }

    /// One entry per stage that ran to termination.
    pub fn exits(&self) -> &[StageExit] {
        &self.exits
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Set when the session reaches a terminal status.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Concatenation of every chunk in arrival order.
    pub fn output(&self) -> String {
        self.chunks.iter().map(|chunk| chunk.text.as_str()).collect()
    }

    fn invalid(&self, requested: impl Into<String>) -> SessionError {
        SessionError::InvalidTransition {
            current: self.status.name().to_string(),
            requested: requested.into(),
        }
    }

    /// Enter stage `index`: `NotStarted -> Running(0)` or `Running(i) -> Running(i+1)`.
    pub(crate) fn begin_stage(&mut self, index: usize) -> Result<(), SessionError> {
        let allowed = match self.status {
            SessionStatus::NotStarted => index == 0,
            SessionStatus::Running { stage } => index == stage + 1 && self.live_pid.is_none(),
            _ => false,
        };
        if !allowed || index >= self.stage_count {
            return Err(self.invalid(format!("running({index})")));
        }
        self.status = SessionStatus::Running { stage: index };
        self.cancel_requested = false;
        Ok(())
    }

    /// Record the live pid of the running stage.
    pub(crate) fn attach_pid(&mut self, pid: u32) {
        self.live_pid = Some(pid);
    }

    pub(crate) fn append(&mut self, chunk: OutputChunk) {
        self.chunks.push(chunk);
    }

    /// The running stage's process is gone: clear the pid and keep its exit.
    pub(crate) fn end_stage(&mut self, stage: usize, termination: TerminationEvent) {
        self.live_pid = None;
        self.exits.push(StageExit { stage, termination });
    }

    /// Move into a terminal status. Terminal states are final.
    pub(crate) fn finish(&mut self, status: SessionStatus) -> Result<(), SessionError> {
        if !status.is_terminal() || self.status.is_terminal() {
            return Err(self.invalid(status.name()));
        }
        self.status = status;
        self.live_pid = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Flag a pending cancellation for the live pid.
    pub(crate) fn flag_cancel(&mut self) -> CancelFlag {
        match self.live_pid {
            None => CancelFlag::NoProcess,
            Some(pid) if self.cancel_requested => CancelFlag::AlreadyRequested(pid),
            Some(pid) => {
                self.cancel_requested = true;
                CancelFlag::Flagged(pid)
            }
        }
    }

    pub(crate) fn unflag_cancel(&mut self) {
        self.cancel_requested = false;
    }

    /// Drop accumulated output. Refused while a stage is running.
    pub(crate) fn clear_output(&mut self) -> Result<(), SessionError> {
        if let SessionStatus::Running { stage } = self.status {
            return Err(SessionError::StageRunning { stage });
        }
        self.chunks.clear();
        Ok(())
    }
}

/// Cloneable shared reference to a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Session>>,
}

impl SessionHandle {
    pub fn new(plan: &StagePlan) -> Self {
        Self::from_session(Session::new(plan))
    }

    pub fn with_id(plan: &StagePlan, id: Uuid) -> Self {
        Self::from_session(Session::with_id(plan, id))
    }

    fn from_session(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Session> {
        // Every mutation is a single field update; poisoned state is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Point-in-time copy of the session.
    pub fn snapshot(&self) -> Session {
        self.lock().clone()
    }

    pub fn id(&self) -> Uuid {
        self.lock().id()
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status().clone()
    }

    pub fn live_pid(&self) -> Option<u32> {
        self.lock().live_pid()
    }

    pub fn output(&self) -> String {
        self.lock().output()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lock().status(), SessionStatus::Running { .. })
    }

    pub fn clear_output(&self) -> Result<(), SessionError> {
        self.lock().clear_output()
    }

    /// Whether two handles point at the same session.
    pub fn same_session(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
