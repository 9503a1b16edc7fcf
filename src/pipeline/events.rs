use std::path::PathBuf;

use serde::Serialize;

use super::state::PipelineState;
use super::store::PipelineResult;
use crate::error::{ErrorKind, PipelineError};

/// Notifications sent from the worker to the interactive side, in emission order.
///
/// For each run, `Done`, `Exported` or `Failed` is the last event sent.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PipelineEvent {
    StateChanged {
        run_id: String,
        state: PipelineState,
    },
    Progress {
        run_id: String,
        percent: u8,
    },
    Done {
        run_id: String,
        result: PipelineResult,
    },
    Failed {
        run_id: String,
        kind: ErrorKind,
        detail: String,
        exit_code: Option<i32>,
        /// Set when the run got as far as a normalized source.
        result: Option<PipelineResult>,
    },
    ExportStarted {
        run_id: String,
        output: PathBuf,
        /// Full video re-encode: expect this to take longer than denoising.
        long_running: bool,
    },
    Exported {
        run_id: String,
        output: PathBuf,
    },
}

impl PipelineEvent {
    pub fn run_id(&self) -> &str {
        match self {
            PipelineEvent::StateChanged { run_id, .. }
            | PipelineEvent::Progress { run_id, .. }
            | PipelineEvent::Done { run_id, .. }
            | PipelineEvent::Failed { run_id, .. }
            | PipelineEvent::ExportStarted { run_id, .. }
            | PipelineEvent::Exported { run_id, .. } => run_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineEvent::Done { .. } | PipelineEvent::Failed { .. } | PipelineEvent::Exported { .. }
        )
    }

    /// State a run ends in when this event closes it.
    pub fn terminal_state(&self) -> Option<PipelineState> {
        match self {
            PipelineEvent::Done { .. } | PipelineEvent::Exported { .. } => Some(PipelineState::Done),
            PipelineEvent::Failed { .. } => Some(PipelineState::Failed),
            _ => None,
        }
    }

    pub(crate) fn failed(run_id: &str, error: &PipelineError, result: Option<PipelineResult>) -> Self {
        PipelineEvent::Failed {
            run_id: run_id.to_string(),
            kind: error.kind(),
            detail: error.to_string(),
            exit_code: error.exit_code(),
            result,
        }
    }
}
