//! Local whisper.cpp transcription
//!
//! Runs the `whisper-cli` binary against the request's scratch file. The
//! binary expects 16 kHz WAV input.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use super::{AudioInput, TaskMode, TranscriptionEngine};
use crate::{Error, Result};

/// Transcribes by spawning whisper.cpp
pub struct WhisperCliEngine {
    binary: PathBuf,
    model: PathBuf,
}

impl WhisperCliEngine {
    /// Locate the binary and check the model file
    ///
    /// # Errors
    ///
    /// Returns error if the binary is not on `PATH` or the model file is missing
    pub fn new(binary: &str, model: PathBuf) -> Result<Self> {
        let binary = which::which(binary)
            .map_err(|e| Error::Config(format!("whisper binary {binary:?} not found: {e}")))?;

        if !model.is_file() {
            return Err(Error::Config(format!(
                "whisper model not found: {}",
                model.display()
            )));
        }

        tracing::debug!(binary = %binary.display(), model = %model.display(), "whisper.cpp engine ready");

        Ok(Self { binary, model })
    }

    fn args(&self, path: &Path, language: &str, task: TaskMode) -> Vec<String> {
        let mut args = vec![
            "-m".to_string(),
            self.model.display().to_string(),
            "-l".to_string(),
            language.to_string(),
            "-f".to_string(),
            path.display().to_string(),
            // Plain text only: no timestamps, no progress
            "-nt".to_string(),
            "-np".to_string(),
        ];
        if task == TaskMode::Translate {
            args.push("-tr".to_string());
        }
        args
    }
}

/// Join the non-empty stdout lines into one transcript
fn collect_transcript(stdout: &[u8]) -> String {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl TranscriptionEngine for WhisperCliEngine {
    async fn transcribe(
        &self,
        audio: AudioInput<'_>,
        language: &str,
        task: TaskMode,
    ) -> Result<String> {
        let args = self.args(audio.path, language, task);
        tracing::debug!(binary = %self.binary.display(), ?args, "running whisper.cpp");

        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| Error::Transcription(format!("failed to run whisper.cpp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(status = %output.status, stderr = %stderr, "whisper.cpp failed");
            return Err(Error::Transcription(format!(
                "whisper.cpp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(collect_transcript(&output.stdout))
    }

    fn name(&self) -> &'static str {
        "whisper-cli"
    }
}
