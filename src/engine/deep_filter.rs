//! DeepFilterNet command-line adapter
//!
//! Invocation: `deep-filter <input.wav> -o <output_dir> [--pf] [--pf-beta X] [--atten-lim-db X]`.
//! Success is exit code 0 *and* `<output_dir>/<basename(input)>` existing;
//! the engine offers no other completion signal.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use super::{expected_output, DenoiseEngine, DenoiseOutcome, DenoiseParams, EngineError, ParamSetting};
use crate::services::{run_tool, RunOptions, ToolError};

pub const DEFAULT_PROGRAM: &str = "deep-filter";

const STDERR_TAIL_LINES: usize = 20;

pub struct DeepFilterEngine {
    program: PathBuf,
    /// Arguments placed before the input path (launchers such as `uvx ... deep-filter`).
    base_args: Vec<OsString>,
    timeout: Option<Duration>,
}

impl Default for DeepFilterEngine {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl DeepFilterEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full argument list after the program name.
    pub fn build_args(&self, input: &Path, output_dir: &Path, params: &DenoiseParams) -> Vec<OsString> {
        let mut args = self.base_args.clone();
        args.push(input.into());
        args.push("-o".into());
        args.push(output_dir.into());

        if params.postfilter {
            args.push("--pf".into());
        }

        match params.pf_beta_setting() {
            ParamSetting::Value(beta) => {
                args.push("--pf-beta".into());
                args.push(beta.to_string().into());
            }
            ParamSetting::Disabled => log::debug!("pf_beta explicitly 0: leaving --pf-beta off"),
            ParamSetting::Unset => {}
        }

        match params.atten_lim_setting() {
            ParamSetting::Value(limit) => {
                args.push("--atten-lim-db".into());
                args.push(limit.to_string().into());
            }
            ParamSetting::Disabled => log::debug!("atten_lim_db explicitly 0: leaving --atten-lim-db off"),
            ParamSetting::Unset => {}
        }

        args
    }
}

impl DenoiseEngine for DeepFilterEngine {
    fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        params: &DenoiseParams,
        cancel: &AtomicBool,
    ) -> Result<DenoiseOutcome, EngineError> {
        params.validate()?;

        let expected = expected_output(input, output_dir);
        // A leftover file would pass the output check below even if the engine writes nothing.
        if expected.exists() {
            log::debug!("Removing stale engine output {:?}", expected);
            std::fs::remove_file(&expected).map_err(|source| {
                log::error!("Cannot remove stale engine output {:?}: {}", expected, source);
                EngineError::StaleOutput { path: expected.clone(), source }
            })?;
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(self.build_args(input, output_dir, params));

        log::info!("Denoising {:?} into {:?}", input, output_dir);
        let started = Instant::now();

        let output = run_tool(&mut cmd, RunOptions { cancel: Some(cancel), timeout: self.timeout })
            .map_err(|e| match e {
                ToolError::TimedOut { after, .. } => EngineError::TimedOut(after),
                ToolError::Cancelled { .. } => EngineError::Cancelled,
                other => EngineError::Unavailable {
                    program: self.program.to_string_lossy().to_string(),
                    detail: other.to_string(),
                },
            })?;

        log::debug!("Engine stdout: {}", output.stdout.trim());

        if !output.success() {
            log::error!("Denoise engine failed with code {:?}", output.code());
            return Err(EngineError::NonZeroExit {
                code: output.code(),
                stderr: output.stderr_tail(STDERR_TAIL_LINES),
            });
        }

        if !expected.is_file() {
            let listing = std::fs::read_dir(output_dir)
                .map(|rd| {
                    rd.flatten()
                        .map(|e| e.file_name().to_string_lossy().to_string())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            log::error!("Engine output {:?} missing; output dir holds {:?}", expected, listing);
            return Err(EngineError::MissingOutput { expected });
        }

        Ok(DenoiseOutcome { output_path: expected, elapsed: started.elapsed() })
    }
}
