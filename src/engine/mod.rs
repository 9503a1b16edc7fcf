//! Denoise engine capability
//!
//! The enhancement model itself is an external executable: it consumes a
//! normalized WAV and writes `<output_dir>/<basename(input)>`. This module
//! defines the request parameters, the outcome and the error split between
//! "the tool reported failure" and "the tool reported success but wrote nothing".

pub mod deep_filter;

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use deep_filter::DeepFilterEngine;

/// Post-filter beta the engine uses when none is passed.
pub const ENGINE_DEFAULT_PF_BETA: f32 = 0.02;
/// Attenuation limit (dB) the engine uses when none is passed.
pub const ENGINE_DEFAULT_ATTEN_LIM_DB: f32 = 100.0;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Denoise engine exited with code {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("Denoise engine reported success but wrote no output at {expected:?}")]
    MissingOutput { expected: PathBuf },
    #[error("Denoise engine could not be started ({program}): {detail}")]
    Unavailable { program: String, detail: String },
    #[error("Could not clear previous engine output {path:?}: {source}")]
    StaleOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Denoise engine did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("Denoise run was cancelled")]
    Cancelled,
    #[error("Invalid denoise parameters: {0}")]
    InvalidParams(String),
}

/// Options passed to the engine. `None` means "unset": the engine's own default applies.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DenoiseParams {
    #[serde(default)]
    pub postfilter: bool,
    #[serde(default)]
    pub pf_beta: Option<f32>,
    #[serde(default)]
    pub atten_lim_db: Option<f32>,
}

/// How an optional numeric option resolves on the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamSetting {
    /// Not given: omit the flag, engine default applies.
    Unset,
    /// Given as 0: a deliberate disable, the flag is omitted.
    Disabled,
    Value(f32),
}

impl ParamSetting {
    fn from_option(value: Option<f32>) -> Self {
        match value {
            None => ParamSetting::Unset,
            Some(v) if v == 0.0 => ParamSetting::Disabled,
            Some(v) => ParamSetting::Value(v),
        }
    }
}

impl DenoiseParams {
    /// The fixed options the desktop window always sent.
    pub fn studio() -> Self {
        Self {
            postfilter: true,
            pf_beta: Some(ENGINE_DEFAULT_PF_BETA),
            atten_lim_db: Some(ENGINE_DEFAULT_ATTEN_LIM_DB),
        }
    }

    pub fn pf_beta_setting(&self) -> ParamSetting {
        ParamSetting::from_option(self.pf_beta)
    }

    pub fn atten_lim_setting(&self) -> ParamSetting {
        ParamSetting::from_option(self.atten_lim_db)
    }

    /// Reject values the engine would misinterpret. Zero is allowed (disable).
    pub fn validate(&self) -> Result<(), EngineError> {
        if let Some(beta) = self.pf_beta {
            if !beta.is_finite() || !(0.0..=1.0).contains(&beta) {
                return Err(EngineError::InvalidParams(format!(
                    "pf_beta must be within [0, 1], got {}",
                    beta
                )));
            }
        }
        if let Some(limit) = self.atten_lim_db {
            if !limit.is_finite() || limit < 0.0 {
                return Err(EngineError::InvalidParams(format!(
                    "atten_lim_db must be >= 0, got {}",
                    limit
                )));
            }
        }
        Ok(())
    }

    /// Overlay values explicitly given in `other` on top of `self`.
    pub fn merged_with(&self, other: &DenoiseParams) -> DenoiseParams {
        DenoiseParams {
            postfilter: self.postfilter || other.postfilter,
            pf_beta: other.pf_beta.or(self.pf_beta),
            atten_lim_db: other.atten_lim_db.or(self.atten_lim_db),
        }
    }
}

/// Successful engine run.
#[derive(Debug, Clone)]
pub struct DenoiseOutcome {
    /// Engine-named output (`<output_dir>/<basename(input)>`), not yet finalized.
    pub output_path: PathBuf,
    pub elapsed: Duration,
}

/// Engine output location for `input` under the engine's naming convention.
pub fn expected_output(input: &Path, output_dir: &Path) -> PathBuf {
    match input.file_name() {
        Some(name) => output_dir.join(name),
        None => output_dir.join("output.wav"),
    }
}

/// Runs the enhancement model. Blocking; call from a worker thread.
pub trait DenoiseEngine: Send + Sync {
    fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        params: &DenoiseParams,
        cancel: &AtomicBool,
    ) -> Result<DenoiseOutcome, EngineError>;
}
