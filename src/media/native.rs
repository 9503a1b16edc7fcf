//! Pure-Rust [`MediaCodec`] for audio-only inputs
//!
//! Decodes with symphonia, mixes down to mono, resamples with rubato and
//! writes WAV with hound. Used when ffmpeg is not installed; anything that
//! needs a video stream is reported as unsupported.

use std::fs::File;
use std::path::Path;
use std::sync::atomic::Ordering;

use hound::{SampleFormat, WavSpec, WavWriter};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::codec::{
    CodecError, CodecRun, MediaCodec, TranscodeTarget, VideoCodec, NORMALIZED_CHANNELS,
    NORMALIZED_SAMPLE_RATE,
};
use super::types::MediaInfo;
use crate::services::ToolError;

/// Decoded interleaved audio.
pub(crate) struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

#[derive(Default)]
pub struct SymphoniaCodec;

impl SymphoniaCodec {
    pub fn new() -> Self {
        Self
    }
}

impl MediaCodec for SymphoniaCodec {
    fn name(&self) -> &'static str {
        "native"
    }

    /// Reads container headers only, so there is nothing to cancel or time out.
    fn probe(&self, path: &Path, _run: CodecRun<'_>) -> Result<MediaInfo, CodecError> {
        let format = open_format(path)?;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| CodecError::NoAudio(path.to_path_buf()))?;

        let codec_params = &track.codec_params;
        let sample_rate = codec_params.sample_rate.unwrap_or(44100);
        let channels = codec_params.channels.map(|c| c.count() as u32).unwrap_or(2);
        let bit_depth = codec_params.bits_per_sample.unwrap_or(16);

        let duration_secs = if let Some(n_frames) = codec_params.n_frames {
            n_frames as f64 / sample_rate as f64
        } else {
            0.0
        };

        Ok(MediaInfo {
            channels,
            sample_width: bit_depth / 8,
            sample_rate,
            duration_secs,
            has_audio: true,
            ..Default::default()
        })
    }

    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        target: &TranscodeTarget,
        run: CodecRun<'_>,
    ) -> Result<(), CodecError> {
        log::info!("native transcode {:?} -> {:?} ({:?})", input, output, target);

        match target {
            TranscodeTarget::NormalizedWav => {
                let decoded = decode_file(input, run)?;
                let mono = downmix(&decoded.samples, decoded.channels);
                let resampled = resample(&mono, decoded.sample_rate, NORMALIZED_SAMPLE_RATE)
                    .map_err(|detail| CodecError::Encode { path: output.to_path_buf(), detail })?;
                write_pcm16(output, &resampled, NORMALIZED_SAMPLE_RATE, NORMALIZED_CHANNELS)
            }
            TranscodeTarget::Container(ext) if ext.eq_ignore_ascii_case("wav") => {
                let decoded = decode_file(input, run)?;
                write_pcm16(output, &decoded.samples, decoded.sample_rate, decoded.channels as u16)
            }
            other => Err(CodecError::Unsupported(format!(
                "{:?} needs ffmpeg (only WAV output is built in)",
                other
            ))),
        }
    }

    fn mux(
        &self,
        _video: &Path,
        _audio: &Path,
        _output: &Path,
        _video_codec: VideoCodec,
        _run: CodecRun<'_>,
    ) -> Result<(), CodecError> {
        Err(CodecError::Unsupported("video reconstruction needs ffmpeg".to_string()))
    }

    fn has_encoder(&self, encoder: &str) -> Option<bool> {
        Some(encoder == "pcm_s16le")
    }
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>, CodecError> {
    let file = File::open(path).map_err(|source| CodecError::Open { path: path.to_path_buf(), source })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| CodecError::Probe {
            path: path.to_path_buf(),
            detail: format!("Failed to probe format: {}", e),
        })?;

    Ok(probed.format)
}

/// Decode the first audio track of `path` to interleaved f32.
pub(crate) fn decode_file(path: &Path, run: CodecRun<'_>) -> Result<DecodedAudio, CodecError> {
    let mut format = open_format(path)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| CodecError::NoAudio(path.to_path_buf()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| CodecError::Decode {
            path: path.to_path_buf(),
            detail: format!("Failed to create decoder: {}", e),
        })?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        if run.cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return Err(CodecError::Tool(ToolError::Cancelled { program: "native decoder".to_string() }));
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(e) => {
                return Err(CodecError::Decode {
                    path: path.to_path_buf(),
                    detail: format!("Error reading packet: {}", e),
                })
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => {
                return Err(CodecError::Decode {
                    path: path.to_path_buf(),
                    detail: format!("Decode error: {}", e),
                })
            }
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count();

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() {
        return Err(CodecError::NoAudio(path.to_path_buf()));
    }

    Ok(DecodedAudio { samples, sample_rate, channels: channels.max(1) })
}

/// Average interleaved channels into one.
pub(crate) fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample a mono signal; a no-op when rates already match.
pub(crate) fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, String> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| format!("Failed to create resampler: {}", e))?;

    let input = vec![samples.to_vec()];
    let mut resampled = resampler
        .process(&input, None)
        .map_err(|e| format!("Failed to resample to {} Hz: {}", to_rate, e))?
        .into_iter()
        .next()
        .unwrap_or_default();

    let expected_len = (samples.len() as f64 * ratio).round() as usize;
    resampled.resize(expected_len, 0.0);
    Ok(resampled)
}

fn write_pcm16(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) -> Result<(), CodecError> {
    let encode_err = |e: hound::Error| CodecError::Encode {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };

    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).map_err(encode_err)?;
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).map_err(encode_err)?;
    }
    writer.finalize().map_err(encode_err)?;

    Ok(())
}
