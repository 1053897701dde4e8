//! Per-request scratch space
//!
//! Each request gets its own uniquely named temporary directory, so
//! concurrent requests never share a file. Directory creation and removal
//! run on the blocking pool. [`RequestScratch::close`] is the normal way out;
//! if the value is dropped instead, the directory is still removed, inline.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uuid::Uuid;

use crate::audio::AudioBuffer;
use crate::engines::AudioInput;
use crate::Result;

/// Temporary directory holding one request's input audio
#[derive(Debug)]
pub struct RequestScratch {
    dir: TempDir,
    input: PathBuf,
}

impl RequestScratch {
    /// Write the request's audio into a fresh directory under `root`
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be created
    pub async fn spool(root: &Path, request_id: Uuid, audio: &AudioBuffer) -> Result<Self> {
        let root = root.to_path_buf();
        let prefix = format!("elise-{request_id}-");
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempdir_in(root)
        })
        .await
        .map_err(std::io::Error::other)??;
        let input = dir
            .path()
            .join(format!("input.{}", audio.format().extension()));

        tokio::fs::write(&input, audio.as_bytes()).await?;
        tracing::trace!(path = %input.display(), bytes = audio.len(), "spooled request audio");

        Ok(Self { dir, input })
    }

    /// Remove the directory and everything in it
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be removed
    pub async fn close(self) -> Result<()> {
        let Self { dir, .. } = self;
        tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(std::io::Error::other)??;
        Ok(())
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn input_path(&self) -> &Path {
        &self.input
    }

    /// Pair the spooled file with its in-memory buffer
    #[must_use]
    pub fn input<'a>(&'a self, audio: &'a AudioBuffer) -> AudioInput<'a> {
        AudioInput {
            buffer: audio,
            path: &self.input,
        }
    }
}
