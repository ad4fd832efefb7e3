//! crackflow - staged John the Ripper runs from the command line
//!
//! ## Commands
//!
//! - `crack`: extract (for archives) and crack a target, streaming output; Ctrl-C cancels
//! - `plan`: print the stage plan for a submission as JSON without running it

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crackflow_core::{
    AttackMode, CancelError, CancelOutcome, CrackConfig, CrackParams, IncrementOrder,
    InputFileType, Orchestrator, SessionEvent, SessionStatus, StageExit, StreamKind, Submission,
};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "crackflow")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Staged hash extraction and cracking with John the Ripper", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a submission and stream its output
    Crack {
        #[command(flatten)]
        submission: SubmissionArgs,

        #[command(flatten)]
        config: ConfigArgs,

        /// Print the final session report as JSON
        #[arg(long)]
        report_json: bool,
    },

    /// Print the stage plan for a submission as JSON
    ///
    /// `crack` places the extracted hash file in a per-session subdirectory
    /// of the artifact directory; the plan shown here uses the directory itself.
    Plan {
        #[command(flatten)]
        submission: SubmissionArgs,

        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct SubmissionArgs {
    /// Archive or hash file to crack
    #[arg(short, long)]
    file: PathBuf,

    /// Input type: zip, rar or raw
    #[arg(short = 't', long, default_value = "raw")]
    file_type: InputFileType,

    /// Attack mode: incremental, dictionary or single
    #[arg(short, long, default_value = "single")]
    mode: AttackMode,

    /// Wordlist for dictionary mode
    #[arg(short, long)]
    wordlist: Option<PathBuf>,

    /// Character set order for incremental mode (e.g. ASCII, AlNum, Digits)
    #[arg(short, long)]
    increment_order: Option<IncrementOrder>,

    /// Hash format hint passed to john as --format
    #[arg(long = "hash")]
    hash_hint: Option<String>,
}

impl SubmissionArgs {
    fn into_submission(self) -> Submission {
        let mut params = CrackParams::new(self.file);
        params.hash_hint = self.hash_hint.filter(|hint| !hint.trim().is_empty());
        params.wordlist = self.wordlist;
        params.increment_order = self.increment_order;
        Submission::new(self.file_type, self.mode, params)
    }
}

#[derive(Args, Debug, Clone, Default)]
struct ConfigArgs {
    /// john executable
    #[arg(long, env = "CRACKFLOW_JOHN_BIN")]
    john_bin: Option<String>,

    /// Directory holding zip2john and rar2john (looked up on PATH otherwise)
    #[arg(long, env = "CRACKFLOW_EXTRACTOR_DIR")]
    extractor_dir: Option<PathBuf>,

    /// Wordlist used for archives in dictionary mode when --wordlist is absent
    #[arg(long, env = "CRACKFLOW_DEFAULT_WORDLIST")]
    default_wordlist: Option<PathBuf>,

    /// Directory receiving the extracted hash file
    #[arg(long, env = "CRACKFLOW_ARTIFACT_DIR")]
    artifact_dir: Option<PathBuf>,
}

impl ConfigArgs {
    fn resolve(self) -> CrackConfig {
        let mut config = CrackConfig::from_env();
        if let Some(bin) = self.john_bin {
            config = config.with_john_bin(bin);
        }
        if let Some(dir) = self.extractor_dir {
            config = config.with_extractor_dir(dir);
        }
        if let Some(wordlist) = self.default_wordlist {
            config = config.with_default_wordlist(wordlist);
        }
        if let Some(dir) = self.artifact_dir {
            config = config.with_artifact_dir(dir);
        }
        config
    }
}

/// Final session summary for `--report-json`.
#[derive(Debug, Serialize)]
struct CrackReport {
    session_id: String,
    plan_digest: String,
    message: String,
    status: SessionStatus,
    exits: Vec<StageExit>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    crackflow_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Crack {
            submission,
            config,
            report_json,
        } => {
            let status =
                cmd_crack(config.resolve(), submission.into_submission(), report_json).await?;
            check_status(&status)
        }
        Commands::Plan { submission, config } => {
            cmd_plan(config.resolve(), &submission.into_submission())
        }
    }
}

/// Print the stage plan without spawning anything
fn cmd_plan(config: CrackConfig, submission: &Submission) -> Result<()> {
    let orch = Orchestrator::local(config);
    let plan = orch.plan(submission).context("Invalid submission")?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

/// Run a submission to its terminal status
async fn cmd_crack(
    config: CrackConfig,
    submission: Submission,
    report_json: bool,
) -> Result<SessionStatus> {
    let orch = Orchestrator::local(config);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let run = orch
        .submit(&submission, tx)
        .context("Invalid submission")?;
    info!(
        session = %run.session.id(),
        plan = %run.plan.short_digest(),
        stages = run.plan.len(),
        "Cracking {}",
        submission.params.target.display()
    );

    let mut task = run.task;
    let status = loop {
        tokio::select! {
            joined = &mut task => {
                break joined.context("Pipeline task aborted")??;
            }
            Some(event) = rx.recv() => render_event(&event)?,
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                match orch.cancel().await {
                    Ok(CancelOutcome::Signalled { pid }) => info!(pid, "Cancelling"),
                    Ok(CancelOutcome::AlreadyRequested { pid }) => {
                        info!(pid, "Cancellation already in progress")
                    }
                    Err(CancelError::NoActiveProcess) => warn!("No running stage to cancel"),
                    Err(err) => warn!("Cancellation failed: {}", err),
                }
            }
        }
    };

    // Events emitted before the task finished are still queued.
    while let Ok(event) = rx.try_recv() {
        render_event(&event)?;
    }

    println!("{}", status);

    if report_json {
        let session = run.session.snapshot();
        let report = CrackReport {
            session_id: session.id().to_string(),
            plan_digest: session.plan_digest().to_string(),
            message: status.to_string(),
            status: status.clone(),
            exits: session.exits().to_vec(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(status)
}

fn render_event(event: &SessionEvent) -> Result<()> {
    match event {
        SessionEvent::StageStarted { stage, name, pid } => {
            info!(stage, pid, "Started {}", name);
        }
        SessionEvent::Output(chunk) => match chunk.stream {
            StreamKind::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(chunk.text.as_bytes())?;
                out.flush()?;
            }
            StreamKind::Stderr => {
                let mut err = std::io::stderr().lock();
                err.write_all(chunk.text.as_bytes())?;
                err.flush()?;
            }
        },
        SessionEvent::StageExited { stage, termination } => {
            info!(stage, "Stage exited with {}", termination);
        }
        SessionEvent::Finished(_) => {}
    }
    Ok(())
}

/// Map a terminal status onto the process exit status
fn check_status(status: &SessionStatus) -> Result<()> {
    match status {
        SessionStatus::Completed => Ok(()),
        SessionStatus::Cancelled { stage } => anyhow::bail!("Cancelled during stage {}", stage),
        SessionStatus::Failed { failure } => {
            anyhow::bail!("Failed at stage {}: {}", failure.stage(), failure)
        }
        other => anyhow::bail!("Session ended in unexpected state: {}", other.name()),
    }
}
