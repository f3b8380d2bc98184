//! Audible feedback and host control
//!
//! Both shell out to external programs: a sound player for the scan cues
//! and the system shutdown command.

use std::path::PathBuf;

use async_trait::async_trait;
use tapdeck_common::ExecutionError;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Cue played after a scan or press is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackCue {
    Success,
    Failure,
}

impl FeedbackCue {
    pub fn name(self) -> &'static str {
        match self {
            FeedbackCue::Success => "success",
            FeedbackCue::Failure => "failure",
        }
    }

    /// Sound file played for this cue
    pub fn file_name(self) -> &'static str {
        match self {
            FeedbackCue::Success => "success.wav",
            FeedbackCue::Failure => "fail.wav",
        }
    }
}

/// Plays feedback cues. Failures are the implementation's to log.
#[async_trait]
pub trait FeedbackPlayer: Send + Sync {
    async fn play(&self, cue: FeedbackCue);
}

/// Plays cue files with an external player such as `aplay -q`
pub struct CommandFeedback {
    program: String,
    args: Vec<String>,
    sounds_dir: PathBuf,
}

impl CommandFeedback {
    pub fn new(player: &[String], sounds_dir: impl Into<PathBuf>) -> Option<Self> {
        let (program, args) = player.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            sounds_dir: sounds_dir.into(),
        })
    }
}

#[async_trait]
impl FeedbackPlayer for CommandFeedback {
    async fn play(&self, cue: FeedbackCue) {
        let path = self.sounds_dir.join(cue.file_name());
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&path)
            .status()
            .await;

        match status {
            Ok(status) if status.success() => debug!(cue = cue.name(), "Played feedback cue"),
            Ok(status) => warn!(cue = cue.name(), %status, path = %path.display(), "Feedback player failed"),
            Err(e) => warn!(cue = cue.name(), error = %e, "Could not start feedback player"),
        }
    }
}

/// Feedback disabled
pub struct SilentFeedback;

#[async_trait]
impl FeedbackPlayer for SilentFeedback {
    async fn play(&self, cue: FeedbackCue) {
        debug!(cue = cue.name(), "Feedback disabled, skipping cue");
    }
}

/// Host-level operations actions may trigger
#[async_trait]
pub trait SystemControl: Send + Sync {
    /// Power the host off. Irreversible.
    async fn power_off(&self) -> Result<(), ExecutionError>;
}

/// Runs a configured shutdown command
pub struct CommandSystemControl {
    shutdown_command: Vec<String>,
}

impl CommandSystemControl {
    pub fn new(shutdown_command: Vec<String>) -> Self {
        Self { shutdown_command }
    }
}

#[async_trait]
impl SystemControl for CommandSystemControl {
    async fn power_off(&self) -> Result<(), ExecutionError> {
        let (program, args) = self
            .shutdown_command
            .split_first()
            .ok_or_else(|| ExecutionError::System("no shutdown command configured".into()))?;

        info!(command = ?self.shutdown_command, "Shutting down the system");
        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .map_err(|e| ExecutionError::System(format!("could not run {program}: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(ExecutionError::System(format!("{program} exited with {status}")))
        }
    }
}
