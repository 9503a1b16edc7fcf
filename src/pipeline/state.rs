use serde::{Deserialize, Serialize};

/// Progress checkpoints reported at stage boundaries.
pub const PROGRESS_ACCEPTED: u8 = 0;
pub const PROGRESS_DENOISE_STARTED: u8 = 10;
pub const PROGRESS_DENOISE_COMPLETE: u8 = 90;
pub const PROGRESS_FINALIZED: u8 = 100;

/// Where the controller is. `Done` and `Failed` are terminal for a run; the
/// controller reports `Idle` again as soon as the terminal event is sent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PipelineState {
    Idle,
    Detecting,
    Normalizing,
    Denoising,
    Finalizing,
    Exporting,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// A run owns the workspace in these states.
    pub fn is_busy(&self) -> bool {
        !matches!(self, PipelineState::Idle | PipelineState::Done | PipelineState::Failed)
    }

    /// Allowed forward moves. Any busy state may fail.
    pub fn can_advance_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Idle, Detecting) | (Idle, Exporting) => true,
            (Detecting, Normalizing) => true,
            (Normalizing, Denoising) => true,
            (Denoising, Finalizing) => true,
            (Finalizing, Done) | (Exporting, Done) => true,
            (from, Failed) => from.is_busy(),
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Detecting => "Detecting media type",
            PipelineState::Normalizing => "Converting to 48 kHz mono WAV",
            PipelineState::Denoising => "Denoising",
            PipelineState::Finalizing => "Finalizing",
            PipelineState::Exporting => "Exporting",
            PipelineState::Done => "Done",
            PipelineState::Failed => "Failed",
        }
    }
}
