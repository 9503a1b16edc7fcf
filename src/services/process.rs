//! External tool runner
//!
//! Spawns a subprocess, drains stdout/stderr on reader threads and polls for
//! exit so the caller can abandon a run (cancel flag or deadline) by killing
//! the child. Used for both the denoise engine and ffmpeg/ffprobe.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to start {program} (is it installed?): {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} did not finish within {after:?} and was killed")]
    TimedOut { program: String, after: Duration },
    #[error("{program} was cancelled")]
    Cancelled { program: String },
}

/// Captured result of a finished tool invocation.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Last few stderr lines, enough to explain a failure without flooding a dialog.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let lines: Vec<&str> = self.stderr.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

/// Controls for a single invocation.
#[derive(Default, Clone, Copy)]
pub struct RunOptions<'a> {
    pub cancel: Option<&'a AtomicBool>,
    pub timeout: Option<Duration>,
}

/// Run `command` to completion, honoring cancellation and timeout by killing the child.
pub fn run_tool(command: &mut Command, opts: RunOptions<'_>) -> Result<ToolOutput, ToolError> {
    let program = command.get_program().to_string_lossy().to_string();
    log::debug!("Running {:?}", command);

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ToolError::Spawn { program: program.clone(), source })?;

    let stdout_reader = child.stdout.take().map(|out| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = BufReader::new(out).read_to_string(&mut buf);
            buf
        })
    });

    let stderr_reader = child.stderr.take().map(|err| {
        let tag = program.clone();
        thread::spawn(move || {
            let mut collected = String::new();
            for line in BufReader::new(err).lines().map_while(Result::ok) {
                log::debug!("[{} stderr] {}", tag, line);
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        })
    });

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => {
                kill_quietly(&mut child, &program);
                return Err(ToolError::Wait { program, source });
            }
        }

        if opts.cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            // Readers are left detached: a grandchild may still hold the pipes.
            kill_quietly(&mut child, &program);
            return Err(ToolError::Cancelled { program });
        }

        if let Some(limit) = opts.timeout {
            if started.elapsed() >= limit {
                kill_quietly(&mut child, &program);
                return Err(ToolError::TimedOut { program, after: limit });
            }
        }

        thread::sleep(POLL_INTERVAL);
    };

    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);

    log::debug!("{} exited with {} after {:.2}s", program, status, started.elapsed().as_secs_f64());

    Ok(ToolOutput { status, stdout, stderr })
}

/// Quick availability probe: `<program> <arg>` exits successfully.
pub fn tool_available(program: &str, arg: &str) -> bool {
    Command::new(program)
        .arg(arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn kill_quietly(child: &mut Child, program: &str) {
    if let Err(e) = child.kill() {
        log::warn!("Failed to kill {}: {}", program, e);
    }
    let _ = child.wait();
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
