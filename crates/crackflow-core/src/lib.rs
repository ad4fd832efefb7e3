//! crackflow core - staged John the Ripper orchestration
//!
//! Provides a process orchestration engine that:
//! - Builds stage plans (`<format>2john` extraction, then `john`) per attack mode
//! - Streams stage output incrementally into a session
//! - Hands extracted hash artifacts from one stage to the next
//! - Cancels a running stage with SIGTERM and classifies how it ended

pub mod artifact;
pub mod attack;
pub mod builder;
pub mod cancel;
pub mod config;
pub mod error;
pub mod exec;
pub mod orchestrator;
pub mod pipeline;
pub mod runner;
pub mod session;
pub mod stage;
pub mod telemetry;

// Re-export key types
pub use artifact::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
pub use attack::{ArchiveFormat, AttackMode, CrackParams, IncrementOrder, InputFileType};
pub use builder::{build_plan, build_plan_from_strs};
pub use cancel::{CancelController, CancelOutcome};
pub use config::CrackConfig;
pub use error::{
    ArtifactError, BuildError, CancelError, ProcessError, SessionError, SpawnError, StageFailure,
};
pub use exec::{CommandExecutor, TokioCommandExecutor};
pub use orchestrator::{Orchestrator, RunHandle, Submission};
pub use pipeline::{EventSink, NullSink, Pipeline, SessionEvent};
pub use runner::{
    ExitClass, ProcessRunner, RunningStage, StageEvent, StreamKind, TerminationEvent,
    TokioProcessRunner,
};
pub use session::{OutputChunk, Session, SessionHandle, SessionStatus, StageExit};
pub use stage::{StagePlan, StageSpec};
pub use telemetry::init_tracing;

/// crackflow version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
