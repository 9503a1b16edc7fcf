//! Pipeline error taxonomy
//!
//! Every stage failure is caught at the pipeline boundary and turned into a
//! `Failed` event carrying an [`ErrorKind`] plus a readable detail string.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineError;
use crate::media::CodecError;
use crate::services::ToolError;

#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("Unsupported input {path:?}: {reason}")]
    Unsupported { path: PathBuf, reason: String },
    #[error("No audio stream in {0:?}; nothing to denoise")]
    NoAudioStream(PathBuf),
}

#[derive(Error, Debug)]
pub enum FinalizeError {
    #[error("Engine output {0:?} vanished before it could be finalized")]
    Missing(PathBuf),
    #[error("Failed to move {from:?} to {to:?}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ReconstructError {
    #[error("Video reconstruction needs a video source with an audio stream ({0})")]
    InvalidState(String),
    #[error("Encoder '{encoder}' needed for .{container} output is not available")]
    UnsupportedPairing { container: String, encoder: String },
    #[error("Failed to create scratch file in {dir:?}: {source}")]
    Scratch {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Audio re-encode failed: {0}")]
    Encode(#[source] CodecError),
    #[error("Muxing failed: {0}")]
    Mux(#[source] CodecError),
}

/// Why a submit/export call was refused. No state changes when this is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmitError {
    #[error("A run is already in progress")]
    Busy,
    #[error("The pipeline is shutting down")]
    ShuttingDown,
    #[error("Invalid denoise parameters: {0}")]
    InvalidParams(String),
    #[error("No denoised result to export")]
    NoResult,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Finalize(#[from] FinalizeError),
    #[error(transparent)]
    Reconstruct(#[from] ReconstructError),
    #[error("Run cancelled")]
    Cancelled,
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Pipeline worker stopped unexpectedly: {0}")]
    WorkerLost(String),
}

/// Serializable failure category carried by `Failed` events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Classification,
    Codec,
    EngineNonZeroExit,
    EngineMissingOutput,
    EngineUnavailable,
    Timeout,
    Cancelled,
    Finalize,
    Reconstruct,
    InvalidState,
    InvalidParams,
    Internal,
}

/// Timeouts and cancellations surface under their own kinds whatever stage hit them.
fn interrupted_kind(err: &CodecError) -> Option<ErrorKind> {
    match err {
        CodecError::Tool(ToolError::TimedOut { .. }) => Some(ErrorKind::Timeout),
        CodecError::Tool(ToolError::Cancelled { .. }) => Some(ErrorKind::Cancelled),
        _ => None,
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Classification(_) => ErrorKind::Classification,
            PipelineError::Codec(e) => interrupted_kind(e).unwrap_or(ErrorKind::Codec),
            PipelineError::Engine(e) => match e {
                EngineError::NonZeroExit { .. } => ErrorKind::EngineNonZeroExit,
                EngineError::MissingOutput { .. } => ErrorKind::EngineMissingOutput,
                EngineError::Unavailable { .. } | EngineError::StaleOutput { .. } => ErrorKind::EngineUnavailable,
                EngineError::TimedOut(_) => ErrorKind::Timeout,
                EngineError::Cancelled => ErrorKind::Cancelled,
                EngineError::InvalidParams(_) => ErrorKind::InvalidParams,
            },
            PipelineError::Finalize(_) => ErrorKind::Finalize,
            PipelineError::Reconstruct(e) => match e {
                ReconstructError::InvalidState(_) => ErrorKind::InvalidState,
                ReconstructError::Encode(c) | ReconstructError::Mux(c) => {
                    interrupted_kind(c).unwrap_or(ErrorKind::Reconstruct)
                }
                _ => ErrorKind::Reconstruct,
            },
            PipelineError::Cancelled => ErrorKind::Cancelled,
            PipelineError::InvalidState(_) => ErrorKind::InvalidState,
            PipelineError::WorkerLost(_) => ErrorKind::Internal,
        }
    }

    /// Exit code of the external tool that failed, when one did.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            PipelineError::Engine(EngineError::NonZeroExit { code, .. }) => *code,
            PipelineError::Codec(CodecError::ToolFailed { code, .. }) => *code,
            PipelineError::Reconstruct(ReconstructError::Encode(CodecError::ToolFailed { code, .. }))
            | PipelineError::Reconstruct(ReconstructError::Mux(CodecError::ToolFailed { code, .. })) => *code,
            _ => None,
        }
    }
}
