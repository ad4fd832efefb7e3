//! Stage definitions and validated stage plans.

use crate::error::BuildError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// One external process invocation within a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageSpec {
    /// Human-readable stage name.
    pub name: String,

    /// Executable to spawn.
    pub program: String,

    /// Discrete arguments, never shell-interpreted.
    pub args: Vec<String>,

    /// Working directory for the process (inherited when `None`).
    pub working_dir: Option<PathBuf>,

    /// File materialized from this stage's stdout on success.
    pub output_artifact: Option<PathBuf>,

    /// File produced by the previous stage that this stage reads.
    pub input_artifact: Option<PathBuf>,
}

impl StageSpec {
    /// Create a stage running `program` with no arguments.
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            output_artifact: None,
            input_artifact: None,
        }
    }

    /// Append one argument; never shell-split.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Declare that this stage's stdout becomes `artifact`.
    pub fn produces(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.output_artifact = Some(artifact.into());
        self
    }

    /// Declare that this stage reads `artifact` from the previous stage.
    pub fn consumes(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.input_artifact = Some(artifact.into());
        self
    }

    /// Program followed by its arguments, for logging.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

/// Ordered, immutable sequence of stages for one submission.
///
/// Construction checks that every declared input artifact matches the output
/// artifact of the stage before it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<StageSpec>,
    digest: String,
}

impl StagePlan {
    /// Validate and seal an ordered list of stages.
    pub fn new(stages: Vec<StageSpec>) -> Result<Self, BuildError> {
        if stages.is_empty() {
            return Err(BuildError::EmptyPlan);
        }

        for (index, stage) in stages.iter().enumerate() {
            if stage.program.trim().is_empty() {
                return Err(BuildError::EmptyProgram { index });
            }

            if let Some(expected) = &stage.input_artifact {
                let produced = index
                    .checked_sub(1)
                    .and_then(|prev| stages[prev].output_artifact.clone());
                if produced.as_deref() != Some(expected.as_path()) {
                    return Err(BuildError::BrokenHandoff {
                        index,
                        expected: expected.clone(),
                        produced,
                    });
                }
            }
        }

        let digest = compute_plan_digest(&stages);
        Ok(Self { stages, digest })
    }

    /// Stages in execution order.
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Stage at `index`, if the plan has one.
    pub fn stage(&self, index: usize) -> Option<&StageSpec> {
        self.stages.get(index)
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn is_last(&self, index: usize) -> bool {
        index + 1 == self.stages.len()
    }

    /// SHA-256 over the ordered argv of every stage.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Short digest (first 12 chars).
    pub fn short_digest(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }

    /// Artifact paths declared as stage outputs.
    pub fn artifacts(&self) -> impl Iterator<Item = &Path> {
        self.stages
            .iter()
            .filter_map(|stage| stage.output_artifact.as_deref())
    }
}

fn compute_plan_digest(stages: &[StageSpec]) -> String {
    let mut hasher = Sha256::new();
    for stage in stages {
        for part in stage.argv() {
            hasher.update(part.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
