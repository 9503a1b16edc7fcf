//! Media transcoding capability
//!
//! The pipeline never decodes or muxes containers itself; it drives a
//! [`MediaCodec`] implementation (ffmpeg subprocess or the pure-Rust
//! fallback) and only cares about sequencing and error semantics.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::MediaInfo;
use crate::services::ToolError;

/// Sample rate every normalized WAV is written at.
pub const NORMALIZED_SAMPLE_RATE: u32 = 48_000;
/// Channel count every normalized WAV is written with.
pub const NORMALIZED_CHANNELS: u16 = 1;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to probe {path:?}: {detail}")]
    Probe { path: PathBuf, detail: String },
    #[error("No audio stream in {0:?}")]
    NoAudio(PathBuf),
    #[error("Decode failed for {path:?}: {detail}")]
    Decode { path: PathBuf, detail: String },
    #[error("Encode failed for {path:?}: {detail}")]
    Encode { path: PathBuf, detail: String },
    #[error("{tool} failed (exit code {code:?}): {stderr}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("Unsupported by this codec backend: {0}")]
    Unsupported(String),
}

impl CodecError {
    /// The tool was killed by a cancel or a timeout rather than failing on its own.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, CodecError::Tool(ToolError::TimedOut { .. } | ToolError::Cancelled { .. }))
    }
}

/// What a transcode should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeTarget {
    /// Mono, 48 kHz, 16-bit PCM WAV, the only input the denoiser accepts.
    NormalizedWav,
    /// Audio-only file in the container named by this extension (wav, mp3, flac, ogg, m4a, ...).
    Container(String),
    /// Audio re-encoded with a specific codec, for later muxing.
    Encoded(AudioCodec),
}

/// Limits applied to a single codec call.
#[derive(Default, Clone, Copy)]
pub struct CodecRun<'a> {
    pub cancel: Option<&'a AtomicBool>,
    pub timeout: Option<Duration>,
}

/// Probe/transcode/mux capability.
pub trait MediaCodec: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    fn probe(&self, path: &Path, run: CodecRun<'_>) -> Result<MediaInfo, CodecError>;

    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        target: &TranscodeTarget,
        run: CodecRun<'_>,
    ) -> Result<(), CodecError>;

    /// Write `output` with the video stream of `video` and the (already encoded)
    /// audio stream of `audio`, re-encoding video with `video_codec`.
    fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        video_codec: VideoCodec,
        run: CodecRun<'_>,
    ) -> Result<(), CodecError>;

    /// Whether an encoder is available at runtime. `None` when the backend cannot tell.
    fn has_encoder(&self, _encoder: &str) -> Option<bool> {
        None
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Mpeg4,
}

impl VideoCodec {
    pub fn ffmpeg_codec(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::Mpeg4 => "mpeg4",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Vorbis,
    Mp3,
}

impl AudioCodec {
    pub fn ffmpeg_codec(&self) -> &'static str {
        match self {
            AudioCodec::Aac => "aac",
            AudioCodec::Vorbis => "libvorbis",
            AudioCodec::Mp3 => "libmp3lame",
        }
    }

    /// Extension for a standalone file holding this codec's stream.
    pub fn scratch_extension(&self) -> &'static str {
        match self {
            AudioCodec::Aac => "m4a",
            AudioCodec::Vorbis => "ogg",
            AudioCodec::Mp3 => "mp3",
        }
    }
}

/// Video/audio codec pair used when rebuilding a container.
///
/// The table decides playback compatibility of exported videos, so it is
/// fixed rather than negotiated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodecPairing {
    pub video: VideoCodec,
    pub audio: AudioCodec,
}

impl CodecPairing {
    pub const DEFAULT: CodecPairing = CodecPairing { video: VideoCodec::H264, audio: AudioCodec::Aac };

    pub fn for_container(container: &str) -> Self {
        match container.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mp4" => Self { video: VideoCodec::H264, audio: AudioCodec::Aac },
            "mkv" => Self { video: VideoCodec::H264, audio: AudioCodec::Vorbis },
            "avi" => Self { video: VideoCodec::Mpeg4, audio: AudioCodec::Mp3 },
            // mov and anything unrecognized
            _ => Self::DEFAULT,
        }
    }
}
