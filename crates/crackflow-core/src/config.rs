//! Executable names and filesystem locations used when building plans.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

pub const DEFAULT_JOHN_BIN: &str = "john";
pub const DEFAULT_EXTRACTOR_SUFFIX: &str = "2john";
pub const DEFAULT_WORDLIST: &str = "/usr/share/wordlists/john.lst";
pub const DEFAULT_ARTIFACT_NAME: &str = "hash.txt";

/// Configuration shared by every submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrackConfig {
    /// Crack executable.
    pub john_bin: String,

    /// Suffix appended to the archive format to name its extractor.
    pub extractor_suffix: String,

    /// Directory holding the extractors (john's `run/`); `PATH` lookup when unset.
    pub extractor_dir: Option<PathBuf>,

    /// Wordlist used by archive plans in dictionary mode when none is given.
    pub default_wordlist: PathBuf,

    /// Directory receiving extracted hash artifacts.
    pub artifact_dir: PathBuf,

    /// File name of the extracted hash artifact.
    pub artifact_name: String,
}

impl Default for CrackConfig {
    fn default() -> Self {
        Self {
            john_bin: DEFAULT_JOHN_BIN.to_string(),
            extractor_suffix: DEFAULT_EXTRACTOR_SUFFIX.to_string(),
            extractor_dir: None,
            default_wordlist: PathBuf::from(DEFAULT_WORDLIST),
            artifact_dir: std::env::temp_dir(),
            artifact_name: DEFAULT_ARTIFACT_NAME.to_string(),
        }
    }
}

impl CrackConfig {
    /// Create from environment variables
    ///
    /// Reads (all optional, defaults otherwise):
    /// - CRACKFLOW_JOHN_BIN
    /// - CRACKFLOW_EXTRACTOR_SUFFIX
    /// - CRACKFLOW_EXTRACTOR_DIR
    /// - CRACKFLOW_DEFAULT_WORDLIST
    /// - CRACKFLOW_ARTIFACT_DIR
    /// - CRACKFLOW_ARTIFACT_NAME
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            john_bin: var("CRACKFLOW_JOHN_BIN").unwrap_or(defaults.john_bin),
            extractor_suffix: var("CRACKFLOW_EXTRACTOR_SUFFIX")
                .unwrap_or(defaults.extractor_suffix),
            extractor_dir: var("CRACKFLOW_EXTRACTOR_DIR")
                .map(PathBuf::from)
                .or(defaults.extractor_dir),
            default_wordlist: var("CRACKFLOW_DEFAULT_WORDLIST")
                .map(PathBuf::from)
                .unwrap_or(defaults.default_wordlist),
            artifact_dir: var("CRACKFLOW_ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_dir),
            artifact_name: var("CRACKFLOW_ARTIFACT_NAME").unwrap_or(defaults.artifact_name),
        }
    }

    /// Override the crack executable.
    pub fn with_john_bin(mut self, bin: impl Into<String>) -> Self {
        self.john_bin = bin.into();
        self
    }

    /// Resolve extractors inside `dir` instead of through `PATH`.
    pub fn with_extractor_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extractor_dir = Some(dir.into());
        self
    }

    pub fn with_default_wordlist(mut self, wordlist: impl Into<PathBuf>) -> Self {
        self.default_wordlist = wordlist.into();
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    pub fn with_artifact_name(mut self, name: impl Into<String>) -> Self {
        self.artifact_name = name.into();
        self
    }

    /// Where extracted hash material is handed to the crack stage.
    pub fn hash_artifact(&self) -> PathBuf {
        self.artifact_dir.join(&self.artifact_name)
    }

    /// Extractor executable for an archive format, e.g. `zip2john`.
    pub fn extractor_for(&self, format: &str) -> PathBuf {
        let name = format!("{}{}", format, self.extractor_suffix);
        match &self.extractor_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Copy of this configuration whose artifacts live under
    /// `<artifact_dir>/<session>/`, so concurrent sessions never share a file.
    pub fn for_session(&self, session: Uuid) -> Self {
        Self {
            artifact_dir: self.artifact_dir.join(session.to_string()),
            ..self.clone()
        }
    }
}
