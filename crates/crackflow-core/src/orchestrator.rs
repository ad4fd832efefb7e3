//! Submission lifecycle: one current session, replaced on every submission.

use crate::attack::{AttackMode, CrackParams, InputFileType};
use crate::builder::build_plan;
use crate::cancel::{CancelController, CancelOutcome};
use crate::config::CrackConfig;
use crate::error::{BuildError, CancelError, SessionError};
use crate::pipeline::{EventSink, Pipeline};
use crate::session::{SessionHandle, SessionStatus};
use crate::stage::StagePlan;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// What the user asked to crack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Submission {
    pub file_type: InputFileType,
    pub mode: AttackMode,
    pub params: CrackParams,
}

impl Submission {
    pub fn new(file_type: InputFileType, mode: AttackMode, params: CrackParams) -> Self {
        Self {
            file_type,
            mode,
            params,
        }
    }
}

/// A session started by [`Orchestrator::submit`].
pub struct RunHandle {
    pub plan: StagePlan,
    pub session: SessionHandle,
    pub task: JoinHandle<Result<SessionStatus, SessionError>>,
}

/// Builds plans, starts sessions and routes cancel/clear to the current one.
pub struct Orchestrator {
    config: CrackConfig,
    pipeline: Pipeline,
    cancel: CancelController,
    current: Mutex<Option<SessionHandle>>,
}

impl Orchestrator {
    /// Assemble an orchestrator from explicit boundaries.
    pub fn new(config: CrackConfig, pipeline: Pipeline, cancel: CancelController) -> Self {
        Self {
            config,
            pipeline,
            cancel,
            current: Mutex::new(None),
        }
    }

    /// Orchestrator spawning real processes and writing real files.
    pub fn local(config: CrackConfig) -> Self {
        Self::new(config, Pipeline::local(), CancelController::local())
    }

    pub fn config(&self) -> &CrackConfig {
        &self.config
    }

    fn current_slot(&self) -> MutexGuard<'_, Option<SessionHandle>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the plan for `submission` against the shared configuration.
    ///
    /// Artifacts sit directly in the artifact directory here; [`submit`]
    /// moves them into a directory of their own per session.
    ///
    /// [`submit`]: Orchestrator::submit
    pub fn plan(&self, submission: &Submission) -> Result<StagePlan, BuildError> {
        plan_with(&self.config, submission)
    }

    /// Start a fresh session for `submission` on the tokio runtime.
    ///
    /// Construction errors are returned before anything spawns and leave the
    /// current session untouched. A previous session that is still running
    /// keeps running; it simply stops being current.
    pub fn submit<S>(&self, submission: &Submission, sink: S) -> Result<RunHandle, BuildError>
    where
        S: EventSink + 'static,
    {
        let id = Uuid::new_v4();
        let plan = plan_with(&self.config.for_session(id), submission)?;
        let session = SessionHandle::with_id(&plan, id);
        for artifact in plan.artifacts() {
            debug!(session = %id, artifact = %artifact.display(), "Session artifact");
        }

        let previous = self.current_slot().replace(session.clone());
        if let Some(previous) = previous {
            if previous.is_running() {
                info!(previous = %previous.id(), "Replacing a session that is still running");
            }
        }

        info!(
            session = %session.id(),
            file_type = %submission.file_type,
            mode = %submission.mode,
            "Submitted"
        );

        let pipeline = self.pipeline.clone();
        let task_plan = plan.clone();
        let task_session = session.clone();
        let task = tokio::spawn(async move { pipeline.run(&task_plan, &task_session, &sink).await });

        Ok(RunHandle {
            plan,
            session,
            task,
        })
    }

    /// The most recently submitted session, if any.
    pub fn current(&self) -> Option<SessionHandle> {
        self.current_slot().clone()
    }

    /// Cancel the current session's running stage.
    pub async fn cancel(&self) -> Result<CancelOutcome, CancelError> {
        let session = self.current().ok_or(CancelError::NoActiveProcess)?;
        self.cancel.request_cancel(&session).await
    }

    /// Clear the current session's output. Refused while a stage runs.
    pub fn clear_output(&self) -> Result<(), SessionError> {
        match self.current() {
            Some(session) => session.clear_output(),
            None => Ok(()),
        }
    }
}

fn plan_with(config: &CrackConfig, submission: &Submission) -> Result<StagePlan, BuildError> {
    build_plan(
        config,
        submission.file_type,
        submission.mode,
        &submission.params,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack::ArchiveFormat;
    use crate::pipeline::NullSink;

    fn orchestrator() -> Orchestrator {
        let dir = std::env::temp_dir().join(format!("crackflow-orch-{}", uuid::Uuid::new_v4()));
        Orchestrator::local(
            CrackConfig::default()
                .with_john_bin("echo")
                .with_artifact_dir(dir),
        )
    }

    #[tokio::test]
    async fn test_construction_error_spawns_nothing() {
        let orch = orchestrator();
        let submission = Submission::new(
            InputFileType::Raw,
            AttackMode::Dictionary,
            CrackParams::new("/data/shadow"),
        );

        assert!(matches!(
            orch.submit(&submission, NullSink),
            Err(BuildError::MissingParameter { .. })
        ));
        assert!(orch.current().is_none());
    }

    #[tokio::test]
    async fn test_submit_runs_and_replaces_current() {
        let orch = orchestrator();
        let submission = Submission::new(
            InputFileType::Raw,
            AttackMode::Single,
            CrackParams::new("/data/shadow"),
        );

        let first = orch.submit(&submission, NullSink).unwrap();
        let status = first.task.await.unwrap().unwrap();
        assert_eq!(status, SessionStatus::Completed);
        assert_eq!(first.session.output(), "--single /data/shadow\n");

        let second = orch.submit(&submission, NullSink).unwrap();
        let current = orch.current().unwrap();
        assert!(current.same_session(&second.session));
        assert!(!current.same_session(&first.session));
        second.task.await.unwrap().unwrap();

        // the old session keeps its own output
        assert_eq!(first.session.output(), "--single /data/shadow\n");
    }

    #[tokio::test]
    async fn test_submissions_get_their_own_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::local(
            CrackConfig::default()
                .with_john_bin("echo")
                .with_extractor_dir("/nonexistent")
                .with_artifact_dir(dir.path()),
        );
        let submission = Submission::new(
            InputFileType::Archive(ArchiveFormat::Zip),
            AttackMode::Single,
            CrackParams::new("/data/a.zip"),
        );

        let first = orch.submit(&submission, NullSink).unwrap();
        let second = orch.submit(&submission, NullSink).unwrap();

        let first_artifact = first.plan.stages()[0].output_artifact.clone().unwrap();
        let second_artifact = second.plan.stages()[0].output_artifact.clone().unwrap();
        assert_ne!(first_artifact, second_artifact);
        assert_eq!(
            first_artifact,
            dir.path()
                .join(first.session.id().to_string())
                .join("hash.txt")
        );
        assert_eq!(first.plan.digest(), first.session.snapshot().plan_digest());

        // both extractions fail to spawn; neither touches the other's file
        first.task.await.unwrap().unwrap();
        second.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_without_session() {
        let orch = orchestrator();
        assert!(matches!(
            orch.cancel().await,
            Err(CancelError::NoActiveProcess)
        ));
        assert!(orch.clear_output().is_ok());
    }

    #[tokio::test]
    async fn test_plan_uses_config() {
        let orch = orchestrator();
        let plan = orch
            .plan(&Submission::new(
                InputFileType::Archive(ArchiveFormat::Rar),
                AttackMode::Single,
                CrackParams::new("/data/a.rar"),
            ))
            .unwrap();
        assert_eq!(plan.stages()[0].program, "rar2john");
        assert_eq!(plan.stages()[1].program, "echo");
    }
}
