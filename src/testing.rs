//! Test doubles shared by unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::engine::{expected_output, DenoiseEngine, DenoiseOutcome, DenoiseParams, EngineError};
use crate::media::codec::{
    CodecError, CodecRun, MediaCodec, TranscodeTarget, VideoCodec, NORMALIZED_CHANNELS,
    NORMALIZED_SAMPLE_RATE,
};
use crate::media::types::MediaInfo;
use crate::services::ToolError;

/// Write a 16-bit sine tone WAV.
pub fn write_tone_wav(path: &Path, channels: u16, sample_rate: u32, secs: f64) {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    let frames = (sample_rate as f64 * secs).round() as usize;
    for i in 0..frames {
        let t = i as f64 / sample_rate as f64;
        let sample = ((t * 440.0 * std::f64::consts::TAU).sin() * 0.3 * i16::MAX as f64) as i16;
        for _ in 0..channels {
            writer.write_sample(sample).unwrap();
        }
    }
    writer.finalize().unwrap();
}

pub fn audio_info() -> MediaInfo {
    MediaInfo {
        channels: 2,
        sample_width: 2,
        sample_rate: 44_100,
        duration_secs: 1.0,
        has_audio: true,
        ..Default::default()
    }
}

pub fn video_info(has_audio: bool) -> MediaInfo {
    MediaInfo {
        channels: if has_audio { 2 } else { 0 },
        sample_width: if has_audio { 2 } else { 0 },
        sample_rate: if has_audio { 48_000 } else { 0 },
        duration_secs: 2.0,
        has_audio,
        has_video: true,
        frame_rate: Some(25.0),
        width: Some(640),
        height: Some(360),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CodecCall {
    Probe(PathBuf),
    Transcode { input: PathBuf, output: PathBuf, target: TranscodeTarget },
    Mux { video: PathBuf, audio: PathBuf, output: PathBuf, video_codec: VideoCodec },
}

/// Scripted codec: returns a fixed probe result and writes small real files.
pub struct StubCodec {
    probe: Option<MediaInfo>,
    /// Probe behaves like a stuck ffprobe: it returns only when cancelled or timed out.
    pub probe_hangs: bool,
    pub fail_transcode: bool,
    pub fail_mux: bool,
    pub encoders: Option<bool>,
    calls: Mutex<Vec<CodecCall>>,
}

impl StubCodec {
    pub fn new(probe: Option<MediaInfo>) -> Self {
        Self {
            probe,
            probe_hangs: false,
            fail_transcode: false,
            fail_mux: false,
            encoders: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn audio() -> Self {
        Self::new(Some(audio_info()))
    }

    pub fn video(has_audio: bool) -> Self {
        Self::new(Some(video_info(has_audio)))
    }

    pub fn calls(&self) -> Vec<CodecCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, CodecCall::Probe(_))).count()
    }

    fn record(&self, call: CodecCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl MediaCodec for StubCodec {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn probe(&self, path: &Path, run: CodecRun<'_>) -> Result<MediaInfo, CodecError> {
        self.record(CodecCall::Probe(path.to_path_buf()));
        if self.probe_hangs {
            let started = Instant::now();
            let limit = run.timeout.unwrap_or(Duration::from_secs(30));
            loop {
                if run.cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
                    return Err(ToolError::Cancelled { program: "stub".into() }.into());
                }
                if started.elapsed() >= limit {
                    return Err(ToolError::TimedOut { program: "stub".into(), after: limit }.into());
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        self.probe.clone().ok_or_else(|| CodecError::Probe {
            path: path.to_path_buf(),
            detail: "stub: invalid data found when processing input".into(),
        })
    }

    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        target: &TranscodeTarget,
        _run: CodecRun<'_>,
    ) -> Result<(), CodecError> {
        self.record(CodecCall::Transcode {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            target: target.clone(),
        });
        if self.fail_transcode {
            return Err(CodecError::ToolFailed {
                tool: "stub".into(),
                code: Some(1),
                stderr: "stub: decoding failed".into(),
            });
        }
        match target {
            TranscodeTarget::NormalizedWav => {
                write_tone_wav(output, NORMALIZED_CHANNELS, NORMALIZED_SAMPLE_RATE, 0.05)
            }
            _ => std::fs::write(output, b"encoded").unwrap(),
        }
        Ok(())
    }

    fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        video_codec: VideoCodec,
        _run: CodecRun<'_>,
    ) -> Result<(), CodecError> {
        self.record(CodecCall::Mux {
            video: video.to_path_buf(),
            audio: audio.to_path_buf(),
            output: output.to_path_buf(),
            video_codec,
        });
        if self.fail_mux {
            return Err(CodecError::ToolFailed {
                tool: "stub".into(),
                code: Some(1),
                stderr: "stub: muxing failed".into(),
            });
        }
        std::fs::write(output, b"muxed").unwrap();
        Ok(())
    }

    fn has_encoder(&self, _encoder: &str) -> Option<bool> {
        self.encoders
    }
}

pub enum EngineBehavior {
    /// Copy the input to `<output_dir>/<basename>` and exit 0.
    WriteOutput,
    /// Exit with this code, writing nothing.
    Exit(i32),
    /// Exit 0 without writing anything.
    ZeroNoOutput,
    /// Wait for a release signal (or cancellation), then write output.
    Block(Mutex<Receiver<()>>),
    /// Write the output but report a path that does not exist.
    MisreportOutput,
    /// Panic mid-run.
    Panic,
}

pub struct StubEngine {
    behavior: EngineBehavior,
    runs: AtomicUsize,
    last_params: Mutex<Option<DenoiseParams>>,
}

impl StubEngine {
    pub fn new(behavior: EngineBehavior) -> Self {
        Self { behavior, runs: AtomicUsize::new(0), last_params: Mutex::new(None) }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn last_params(&self) -> Option<DenoiseParams> {
        self.last_params.lock().unwrap().clone()
    }
}

impl DenoiseEngine for StubEngine {
    fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        params: &DenoiseParams,
        cancel: &AtomicBool,
    ) -> Result<DenoiseOutcome, EngineError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(params.clone());
        let expected = expected_output(input, output_dir);

        match &self.behavior {
            EngineBehavior::WriteOutput => {}
            EngineBehavior::Exit(code) => {
                return Err(EngineError::NonZeroExit {
                    code: Some(*code),
                    stderr: format!("stub engine exited with {}", code),
                })
            }
            EngineBehavior::ZeroNoOutput => return Err(EngineError::MissingOutput { expected }),
            EngineBehavior::MisreportOutput => {
                std::fs::copy(input, &expected).unwrap();
                return Ok(DenoiseOutcome {
                    output_path: output_dir.join("not-written.wav"),
                    elapsed: Duration::from_millis(1),
                });
            }
            EngineBehavior::Panic => panic!("stub engine crashed"),
            EngineBehavior::Block(release) => {
                let release = release.lock().unwrap();
                loop {
                    if cancel.load(Ordering::SeqCst) {
                        return Err(EngineError::Cancelled);
                    }
                    match release.recv_timeout(Duration::from_millis(10)) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => continue,
                    }
                }
            }
        }

        std::fs::copy(input, &expected).unwrap();
        Ok(DenoiseOutcome { output_path: expected, elapsed: Duration::from_millis(1) })
    }
}
