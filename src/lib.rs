//! voice-scrub: speech denoising for audio files and videos.
//!
//! Inputs are classified, normalized to mono 48 kHz WAV, run through an
//! external DeepFilterNet engine on a background worker, and finally saved
//! as audio or put back into the original video.

pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod presenter;
pub mod services;

#[cfg(test)]
mod testing;

pub use config::AppConfig;
pub use engine::{DeepFilterEngine, DenoiseEngine, DenoiseParams};
pub use error::{ErrorKind, PipelineError, SubmitError};
pub use pipeline::{ControllerOptions, ExportRequest, PipelineController, PipelineEvent, PipelineRequest, PipelineState};
