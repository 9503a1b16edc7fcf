//! ffmpeg/ffprobe-backed [`MediaCodec`]

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use serde::Deserialize;

use super::codec::{
    CodecError, CodecRun, MediaCodec, TranscodeTarget, VideoCodec, NORMALIZED_CHANNELS,
    NORMALIZED_SAMPLE_RATE,
};
use super::types::MediaInfo;
use crate::services::{run_tool, tool_available, RunOptions, ToolOutput};

const STDERR_TAIL_LINES: usize = 12;

pub struct FfmpegCodec {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    encoders: OnceLock<Option<HashSet<String>>>,
}

impl FfmpegCodec {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            encoders: OnceLock::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        tool_available(&self.ffmpeg.to_string_lossy(), "-version")
    }

    fn run_ffmpeg(&self, args: Vec<OsString>, run: CodecRun<'_>) -> Result<ToolOutput, CodecError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(&args);
        let output = run_tool(&mut cmd, RunOptions { cancel: run.cancel, timeout: run.timeout })?;
        if !output.success() {
            return Err(CodecError::ToolFailed {
                tool: self.ffmpeg.to_string_lossy().to_string(),
                code: output.code(),
                stderr: output.stderr_tail(STDERR_TAIL_LINES),
            });
        }
        Ok(output)
    }

    fn encoder_list(&self) -> Option<&HashSet<String>> {
        self.encoders
            .get_or_init(|| {
                let args = vec![OsString::from("-hide_banner"), OsString::from("-encoders")];
                match self.run_ffmpeg(args, CodecRun::default()) {
                    Ok(out) => Some(parse_encoder_list(&out.stdout)),
                    Err(e) => {
                        log::warn!("Could not list ffmpeg encoders: {}", e);
                        None
                    }
                }
            })
            .as_ref()
    }
}

impl MediaCodec for FfmpegCodec {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn probe(&self, path: &Path, run: CodecRun<'_>) -> Result<MediaInfo, CodecError> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path);
        let output = run_tool(&mut cmd, RunOptions { cancel: run.cancel, timeout: run.timeout })?;
        if !output.success() {
            return Err(CodecError::Probe {
                path: path.to_path_buf(),
                detail: output.stderr_tail(STDERR_TAIL_LINES),
            });
        }
        parse_probe_json(&output.stdout).map_err(|detail| CodecError::Probe {
            path: path.to_path_buf(),
            detail,
        })
    }

    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        target: &TranscodeTarget,
        run: CodecRun<'_>,
    ) -> Result<(), CodecError> {
        log::info!("ffmpeg transcode {:?} -> {:?} ({:?})", input, output, target);
        self.run_ffmpeg(transcode_args(input, output, target), run)?;
        Ok(())
    }

    fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        video_codec: VideoCodec,
        run: CodecRun<'_>,
    ) -> Result<(), CodecError> {
        log::info!("ffmpeg mux {:?} + {:?} -> {:?}", video, audio, output);
        self.run_ffmpeg(mux_args(video, audio, output, video_codec), run)?;
        Ok(())
    }

    fn has_encoder(&self, encoder: &str) -> Option<bool> {
        self.encoder_list().map(|list| list.contains(encoder))
    }
}

/// Arguments for one transcode.
pub(crate) fn transcode_args(input: &Path, output: &Path, target: &TranscodeTarget) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-hide_banner".into(), "-i".into(), input.into(), "-vn".into()];

    match target {
        TranscodeTarget::NormalizedWav => {
            args.extend(
                [
                    "-map".to_string(),
                    "0:a:0".to_string(),
                    "-ac".to_string(),
                    NORMALIZED_CHANNELS.to_string(),
                    "-ar".to_string(),
                    NORMALIZED_SAMPLE_RATE.to_string(),
                    "-c:a".to_string(),
                    "pcm_s16le".to_string(),
                ]
                .map(OsString::from),
            );
        }
        TranscodeTarget::Container(ext) => {
            if let Some(codec) = container_audio_codec(ext) {
                args.push("-c:a".into());
                args.push(codec.into());
            }
        }
        TranscodeTarget::Encoded(codec) => {
            args.push("-c:a".into());
            args.push(codec.ffmpeg_codec().into());
        }
    }

    args.push(output.into());
    args
}

/// Arguments replacing the audio of `video` with `audio`.
pub(crate) fn mux_args(video: &Path, audio: &Path, output: &Path, video_codec: VideoCodec) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-hide_banner".into()];
    args.extend([OsString::from("-i"), video.into(), OsString::from("-i"), audio.into()]);
    args.extend(
        ["-map", "0:v:0", "-map", "1:a:0", "-c:v", video_codec.ffmpeg_codec(), "-c:a", "copy"]
            .map(OsString::from),
    );
    args.push(output.into());
    args
}

/// Encoder for audio-only exports; `None` lets ffmpeg pick from the extension.
fn container_audio_codec(ext: &str) -> Option<&'static str> {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "wav" => Some("pcm_s16le"),
        "mp3" => Some("libmp3lame"),
        "flac" => Some("flac"),
        "ogg" => Some("libvorbis"),
        "m4a" | "aac" => Some("aac"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
    bits_per_sample: Option<u32>,
    bits_per_raw_sample: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    disposition: Option<ProbeDisposition>,
}

#[derive(Debug, Deserialize)]
struct ProbeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

pub(crate) fn parse_probe_json(json: &str) -> Result<MediaInfo, String> {
    let probe: ProbeOutput = serde_json::from_str(json).map_err(|e| format!("Invalid ffprobe output: {}", e))?;

    // Cover art shows up as a video stream; it is not a video track.
    let video = probe.streams.iter().find(|s| {
        s.codec_type.as_deref() == Some("video")
            && s.disposition.as_ref().map_or(true, |d| d.attached_pic == 0)
    });
    let audio = probe.streams.iter().find(|s| s.codec_type.as_deref() == Some("audio"));

    let duration_secs = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or_else(|| audio.and_then(|a| a.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let sample_width = audio
        .and_then(|a| {
            a.bits_per_sample
                .filter(|b| *b > 0)
                .or_else(|| a.bits_per_raw_sample.as_deref().and_then(|b| b.parse().ok()))
        })
        .map(|bits: u32| bits / 8)
        .unwrap_or(0);

    let frame_rate = video.and_then(|v| {
        v.avg_frame_rate
            .as_deref()
            .and_then(parse_rational)
            .or_else(|| v.r_frame_rate.as_deref().and_then(parse_rational))
    });

    Ok(MediaInfo {
        channels: audio.and_then(|a| a.channels).unwrap_or(0),
        sample_width,
        sample_rate: audio
            .and_then(|a| a.sample_rate.as_deref())
            .and_then(|r| r.parse().ok())
            .unwrap_or(0),
        duration_secs,
        has_audio: audio.is_some(),
        has_video: video.is_some(),
        frame_rate,
        width: video.and_then(|v| v.width),
        height: video.and_then(|v| v.height),
    })
}

/// "30000/1001" -> 29.97; "0/0" -> None
fn parse_rational(value: &str) -> Option<f64> {
    let (num, den) = value.split_once('/').unwrap_or((value, "1"));
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

/// Encoder names from `ffmpeg -encoders` (lines like " A..... aac   AAC ...").
fn parse_encoder_list(stdout: &str) -> HashSet<String> {
    stdout
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            (flags.len() == 6).then(|| name.to_string())
        })
        .collect()
}
