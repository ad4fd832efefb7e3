//! Attack modes, input file types and the user parameters they consume.

use crate::error::BuildError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Cracking strategy handed to the crack executable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttackMode {
    /// Brute force over a character set (`-incremental:<order>`).
    Incremental,

    /// Wordlist attack (`--wordlist=<path>`).
    Dictionary,

    /// Mangling rules derived from account metadata (`--single`).
    Single,
}

impl AttackMode {
    /// Every mode, in form order.
    pub const ALL: [AttackMode; 3] = [
        AttackMode::Incremental,
        AttackMode::Dictionary,
        AttackMode::Single,
    ];

    /// Get the mode name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            AttackMode::Incremental => "incremental",
            AttackMode::Dictionary => "dictionary",
            AttackMode::Single => "single",
        }
    }
}

impl fmt::Display for AttackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AttackMode {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incremental" | "increment" => Ok(AttackMode::Incremental),
            "dictionary" | "wordlist" => Ok(AttackMode::Dictionary),
            "single" => Ok(AttackMode::Single),
            _ => Err(BuildError::UnknownAttackMode(s.to_string())),
        }
    }
}

/// Character set ordering used by incremental mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IncrementOrder {
    #[serde(rename = "ASCII")]
    Ascii,
    #[serde(rename = "LM_ASCII")]
    LmAscii,
    AlNum,
    Alpha,
    LowerNum,
    UpperNum,
    LowerSpace,
    Lower,
    Upper,
    Digits,
}

impl IncrementOrder {
    /// The fixed set of incremental character orders.
    pub const ALL: [IncrementOrder; 10] = [
        IncrementOrder::Ascii,
        IncrementOrder::LmAscii,
        IncrementOrder::AlNum,
        IncrementOrder::Alpha,
        IncrementOrder::LowerNum,
        IncrementOrder::UpperNum,
        IncrementOrder::LowerSpace,
        IncrementOrder::Lower,
        IncrementOrder::Upper,
        IncrementOrder::Digits,
    ];

    /// Spelling understood by john's `-incremental:` option.
    pub fn name(&self) -> &'static str {
        match self {
            IncrementOrder::Ascii => "ASCII",
            IncrementOrder::LmAscii => "LM_ASCII",
            IncrementOrder::AlNum => "AlNum",
            IncrementOrder::Alpha => "Alpha",
            IncrementOrder::LowerNum => "LowerNum",
            IncrementOrder::UpperNum => "UpperNum",
            IncrementOrder::LowerSpace => "LowerSpace",
            IncrementOrder::Lower => "Lower",
            IncrementOrder::Upper => "Upper",
            IncrementOrder::Digits => "Digits",
        }
    }
}

impl fmt::Display for IncrementOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IncrementOrder {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        IncrementOrder::ALL
            .into_iter()
            .find(|order| order.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| BuildError::UnknownIncrementOrder(s.to_string()))
    }
}

/// Archive formats with a `<format>2john` extractor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    Zip,
    Rar,
}

impl ArchiveFormat {
    /// Format prefix of the `<format>2john` extractor.
    pub fn name(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Rar => "rar",
        }
    }
}

/// Kind of file submitted for cracking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InputFileType {
    /// Password-protected archive; hashes must be extracted first.
    Archive(ArchiveFormat),

    /// File that already holds crackable hash material.
    Raw,
}

impl InputFileType {
    /// Get the file type name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            InputFileType::Archive(format) => format.name(),
            InputFileType::Raw => "raw",
        }
    }

    /// Whether a hash-extraction stage precedes the crack stage.
    pub fn needs_extraction(&self) -> bool {
        matches!(self, InputFileType::Archive(_))
    }
}

impl fmt::Display for InputFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InputFileType {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zip" => Ok(InputFileType::Archive(ArchiveFormat::Zip)),
            "rar" => Ok(InputFileType::Archive(ArchiveFormat::Rar)),
            "raw" => Ok(InputFileType::Raw),
            _ => Err(BuildError::UnknownFileType(s.to_string())),
        }
    }
}

/// User parameters for one submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrackParams {
    /// File to crack (archive or hash file).
    pub target: PathBuf,

    /// Hash format hint passed through as `--format=<hint>`.
    pub hash_hint: Option<String>,

    /// Wordlist for dictionary mode.
    pub wordlist: Option<PathBuf>,

    /// Character set order for incremental mode.
    pub increment_order: Option<IncrementOrder>,
}

impl CrackParams {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Pass `hint` to john as `--format=<hint>`.
    pub fn with_hash_hint(mut self, hint: impl Into<String>) -> Self {
        self.hash_hint = Some(hint.into());
        self
    }

    /// Wordlist for dictionary mode.
    pub fn with_wordlist(mut self, wordlist: impl Into<PathBuf>) -> Self {
        self.wordlist = Some(wordlist.into());
        self
    }

    /// Character order for incremental mode.
    pub fn with_increment_order(mut self, order: IncrementOrder) -> Self {
        self.increment_order = Some(order);
        self
    }
}
