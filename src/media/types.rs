//! Media handle and probe metadata

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Kind as declared (or later determined) for a user-selected file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DeclaredKind {
    Audio,
    Video,
    Unknown,
}

/// Probe result for a media file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    /// Channel count of the first audio stream (0 when there is none)
    pub channels: u32,
    /// Bytes per sample of the first audio stream, when known
    pub sample_width: u32,
    /// Sample rate of the first audio stream in Hz
    pub sample_rate: u32,
    pub duration_secs: f64,
    pub has_audio: bool,
    pub has_video: bool,
    /// Video frame rate, when a video stream with a usable rate exists
    pub frame_rate: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl MediaInfo {
    /// A video track we can rebuild around: dimensions and a frame rate are known.
    pub fn has_usable_video(&self) -> bool {
        self.has_video && self.frame_rate.is_some_and(|fps| fps > 0.0)
    }
}

/// A user-selected file, owned by the controller for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaHandle {
    pub path: PathBuf,
    pub kind: DeclaredKind,
    pub metadata: Option<MediaInfo>,
}

impl MediaHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path = std::path::absolute(&path).unwrap_or(path);
        Self { path, kind: DeclaredKind::Unknown, metadata: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lower-cased extension without the dot.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.path)
    }

    /// Handles are immutable once probed; this returns the classified copy.
    pub(crate) fn with_probe(&self, kind: DeclaredKind, metadata: Option<MediaInfo>) -> Self {
        Self { path: self.path.clone(), kind, metadata }
    }
}

/// Result of classifying an input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Classification {
    Audio,
    Video { has_audio_stream: bool },
    Unsupported { reason: String },
}

impl Classification {
    /// Whether the denoiser may be run on this input.
    pub fn has_audio(&self) -> bool {
        matches!(self, Classification::Audio | Classification::Video { has_audio_stream: true })
    }

    /// Whether the export path may rebuild a video around the cleaned track.
    pub fn can_reconstruct(&self) -> bool {
        matches!(self, Classification::Video { has_audio_stream: true })
    }
}

pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
