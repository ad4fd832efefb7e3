//! Error taxonomy for plan construction, process execution and cancellation.

use crate::runner::TerminationEvent;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A stage plan could not be constructed. Raised before any process spawns.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("unknown file type: {0} (expected zip, rar or raw)")]
    UnknownFileType(String),

    #[error("unknown attack mode: {0} (expected incremental, dictionary or single)")]
    UnknownAttackMode(String),

    #[error("unknown increment order: {0}")]
    UnknownIncrementOrder(String),

    #[error("{mode} mode requires a {parameter}")]
    MissingParameter {
        mode: &'static str,
        parameter: &'static str,
    },

    #[error("target file path must not be empty")]
    EmptyTarget,

    /// Stage arguments are UTF-8; a lossy conversion would name another file.
    #[error("{role} path is not valid UTF-8: {path:?}")]
    NonUtf8Path { role: &'static str, path: PathBuf },

    #[error("stage plan must contain at least one stage")]
    EmptyPlan,

    #[error("stage {index} has an empty program")]
    EmptyProgram { index: usize },

    #[error("stage {index} consumes {expected:?} but the previous stage produces {produced:?}")]
    BrokenHandoff {
        index: usize,
        expected: PathBuf,
        produced: Option<PathBuf>,
    },
}

/// The operating system refused to start a stage process.
#[derive(Debug, thiserror::Error)]
#[error("failed to spawn {program}: {source}")]
pub struct SpawnError {
    pub program: String,
    #[source]
    pub source: std::io::Error,
}

/// Errors from the single-shot command execution boundary.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code:?}: {stderr}")]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Errors from the artifact filesystem boundary.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact {path:?} has no parent directory")]
    NoParent { path: PathBuf },

    #[error("artifact io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from a cancellation request.
#[derive(Debug, thiserror::Error)]
pub enum CancelError {
    #[error("no active process to cancel")]
    NoActiveProcess,

    #[error("failed to signal process {pid}: {source}")]
    SignalFailed {
        pid: u32,
        #[source]
        source: ProcessError,
    },
}

/// Why a session stopped at a given stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageFailure {
    /// The stage process never started; no pid was ever recorded.
    #[error("stage {stage} could not start: {message}")]
    Spawn { stage: usize, message: String },

    /// The process exited non-zero without a deliberate termination.
    #[error("stage {stage} terminated with {termination}")]
    Exit {
        stage: usize,
        termination: TerminationEvent,
    },

    /// The stage succeeded but its declared artifact was not materialized.
    #[error("stage {stage} did not produce {artifact:?}: {reason}")]
    Handoff {
        stage: usize,
        artifact: PathBuf,
        reason: String,
    },
}

impl StageFailure {
    pub fn stage(&self) -> usize {
        match self {
            StageFailure::Spawn { stage, .. }
            | StageFailure::Exit { stage, .. }
            | StageFailure::Handoff { stage, .. } => *stage,
        }
    }
}

/// Illegal operations on a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("stage {stage} is still running")]
    StageRunning { stage: usize },

    #[error("invalid session transition: {current} -> {requested}")]
    InvalidTransition { current: String, requested: String },
}
