//! Audio payloads received from the request boundary

use std::io::Cursor;
use std::time::Duration;

use axum::body::Bytes;

use crate::{Error, Result};

/// Container format of an audio payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Ogg,
    Webm,
    Flac,
    Unknown,
}

impl AudioFormat {
    /// Resolve a format from a MIME type
    #[must_use]
    pub fn from_mime(mime_type: &str) -> Self {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "audio/wav" | "audio/wave" | "audio/x-wav" | "audio/vnd.wave" => Self::Wav,
            "audio/mpeg" | "audio/mp3" => Self::Mp3,
            "audio/ogg" | "application/ogg" => Self::Ogg,
            "audio/webm" | "video/webm" => Self::Webm,
            "audio/flac" | "audio/x-flac" => Self::Flac,
            _ => Self::Unknown,
        }
    }

    /// Resolve a format from a file name extension
    #[must_use]
    pub fn from_file_name(file_name: &str) -> Self {
        let Some((_, ext)) = file_name.rsplit_once('.') else {
            return Self::Unknown;
        };

        match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Self::Wav,
            "mp3" => Self::Mp3,
            "ogg" | "oga" | "opus" => Self::Ogg,
            "webm" => Self::Webm,
            "flac" => Self::Flac,
            _ => Self::Unknown,
        }
    }

    /// Guess the format from the leading magic bytes
    #[must_use]
    pub fn sniff(data: &[u8]) -> Self {
        match data {
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Self::Wav,
            [b'I', b'D', b'3', ..] => Self::Mp3,
            [0xFF, second, ..] if second & 0xE0 == 0xE0 => Self::Mp3,
            [b'O', b'g', b'g', b'S', ..] => Self::Ogg,
            [0x1A, 0x45, 0xDF, 0xA3, ..] => Self::Webm,
            [b'f', b'L', b'a', b'C', ..] => Self::Flac,
            _ => Self::Unknown,
        }
    }

    /// MIME type used when forwarding the payload
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::Ogg => "audio/ogg",
            Self::Webm => "audio/webm",
            Self::Flac => "audio/flac",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// File extension used for scratch files and uploads
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::Webm => "webm",
            Self::Flac => "flac",
            Self::Unknown => "bin",
        }
    }
}

/// WAV header details, for logging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Duration,
}

/// Immutable audio payload tagged with its container format
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    data: Bytes,
    format: AudioFormat,
}

impl AudioBuffer {
    /// Wrap a payload with a known format
    #[must_use]
    pub const fn new(data: Bytes, format: AudioFormat) -> Self {
        Self { data, format }
    }

    /// Wrap an uploaded payload, resolving its format from the bytes
    /// themselves, then the declared content type, then the file name
    ///
    /// Browsers label `MediaRecorder` blobs with whatever type the page asks
    /// for, so the magic bytes are trusted first.
    #[must_use]
    pub fn from_upload(data: Bytes, content_type: Option<&str>, file_name: Option<&str>) -> Self {
        let format = [
            Some(AudioFormat::sniff(&data)),
            content_type.map(AudioFormat::from_mime),
            file_name.map(AudioFormat::from_file_name),
        ]
        .into_iter()
        .flatten()
        .find(|f| *f != AudioFormat::Unknown)
        .unwrap_or(AudioFormat::Unknown);

        Self { data, format }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Cheap clone of the underlying bytes
    #[must_use]
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    #[must_use]
    pub const fn format(&self) -> AudioFormat {
        self.format
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read the WAV header of a WAV payload
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not WAV or the header is unreadable
    pub fn wav_info(&self) -> Result<WavInfo> {
        if self.format != AudioFormat::Wav {
            return Err(Error::Audio(format!("not a WAV payload: {:?}", self.format)));
        }

        let reader = hound::WavReader::new(Cursor::new(self.data.as_ref()))
            .map_err(|e| Error::Audio(format!("invalid WAV header: {e}")))?;
        let spec = reader.spec();
        let frames = reader.duration();
        let duration = if spec.sample_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(f64::from(frames) / f64::from(spec.sample_rate))
        };

        Ok(WavInfo {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            duration,
        })
    }
}
