//! Saving a cleaned result: plain audio transcode or video reconstruction.

use std::path::{Path, PathBuf};

use crate::error::ReconstructError;
use crate::media::classifier::is_audio_extension;
use crate::media::types::extension_of;
use crate::media::{
    Classification, CodecError, CodecPairing, CodecRun, MediaCodec, MediaHandle, TranscodeTarget,
};

/// Containers that trigger reconstruction instead of an audio-only export.
pub const VIDEO_CONTAINERS: &[&str] = &["mp4", "mkv", "avi", "mov"];

const SCRATCH_PREFIX: &str = "voicescrub_scratch_";

pub fn is_video_container(ext: &str) -> bool {
    VIDEO_CONTAINERS.contains(&ext.trim_start_matches('.').to_ascii_lowercase().as_str())
}

/// Format of a saved result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Keep the source's format. Its extension is appended to the requested path.
    #[default]
    Original,
    /// Write this format to the requested path as given.
    Named(String),
}

impl OutputFormat {
    /// Read the format off a path typed by the user. Only a known audio or
    /// video extension names a format, so `talk.final` keeps the original.
    pub fn from_path(path: &Path) -> Self {
        match extension_of(path) {
            Some(ext) if is_audio_extension(&ext) || is_video_container(&ext) => OutputFormat::Named(ext),
            _ => OutputFormat::Original,
        }
    }
}

/// `<stem>_clean` next to the input, to be completed with [`OutputFormat::Original`].
pub fn default_output_base(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".into());
    input.with_file_name(format!("{}_clean", stem))
}

/// Final output path and format for an export. With [`OutputFormat::Original`]
/// the source's extension is appended; audio-only exports of a video and
/// sources without an extension fall back to WAV.
pub fn resolve_output(
    requested: &Path,
    format: &OutputFormat,
    source: &MediaHandle,
    audio_only: bool,
) -> (PathBuf, String) {
    match format {
        OutputFormat::Named(ext) => {
            (requested.to_path_buf(), ext.trim_start_matches('.').to_ascii_lowercase())
        }
        OutputFormat::Original => {
            let ext = match source.extension() {
                Some(ext) if !(audio_only && is_video_container(&ext)) => ext,
                _ => "wav".to_string(),
            };
            let mut name = requested.as_os_str().to_owned();
            name.push(".");
            name.push(&ext);
            (PathBuf::from(name), ext)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportPlan {
    /// Put the cleaned track back into the original video.
    Reconstruct { container: String },
    /// Transcode the cleaned WAV into an audio file.
    Audio { format: String },
}

impl ExportPlan {
    pub fn for_format(format: &str, audio_only: bool) -> Self {
        let format = format.trim_start_matches('.').to_ascii_lowercase();
        if !audio_only && is_video_container(&format) {
            ExportPlan::Reconstruct { container: format }
        } else {
            ExportPlan::Audio { format }
        }
    }

    pub fn is_long_running(&self) -> bool {
        matches!(self, ExportPlan::Reconstruct { .. })
    }
}

/// Inputs for one video reconstruction.
pub struct Reconstruction<'a> {
    pub original_video: &'a Path,
    pub classification: &'a Classification,
    pub cleaned_audio: &'a Path,
    pub output: &'a Path,
    pub container: &'a str,
}

/// Replace the audio track of the original video with the cleaned one.
///
/// The audio is first re-encoded into a scratch file in `scratch_dir`, then
/// muxed with the re-encoded video stream. The scratch file is removed on
/// every path out of this function.
pub fn reconstruct(
    codec: &dyn MediaCodec,
    job: &Reconstruction<'_>,
    scratch_dir: &Path,
    run: CodecRun<'_>,
) -> Result<CodecPairing, ReconstructError> {
    if !job.classification.can_reconstruct() {
        return Err(ReconstructError::InvalidState(format!(
            "source classified as {:?}",
            job.classification
        )));
    }

    let pairing = CodecPairing::for_container(job.container);
    log::info!(
        "Reconstructing {:?} as .{} with {:?}/{:?}",
        job.original_video,
        job.container,
        pairing.video,
        pairing.audio
    );

    for encoder in [pairing.video.ffmpeg_codec(), pairing.audio.ffmpeg_codec()] {
        match codec.has_encoder(encoder) {
            Some(false) => {
                return Err(ReconstructError::UnsupportedPairing {
                    container: job.container.to_string(),
                    encoder: encoder.to_string(),
                })
            }
            Some(true) => {}
            None => log::debug!("{} codec cannot report encoder {}; trying anyway", codec.name(), encoder),
        }
    }

    let scratch = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .suffix(&format!(".{}", pairing.audio.scratch_extension()))
        .tempfile_in(scratch_dir)
        .map_err(|source| ReconstructError::Scratch { dir: scratch_dir.to_path_buf(), source })?
        .into_temp_path();

    codec
        .transcode(job.cleaned_audio, &scratch, &TranscodeTarget::Encoded(pairing.audio), run)
        .map_err(ReconstructError::Encode)?;

    codec
        .mux(job.original_video, &scratch, job.output, pairing.video, run)
        .map_err(ReconstructError::Mux)?;

    if let Err(e) = scratch.close() {
        log::warn!("Failed to remove scratch audio: {}", e);
    }

    log::info!("Video saved to {:?}", job.output);
    Ok(pairing)
}

/// Transcode the cleaned WAV straight into `format`.
pub fn export_audio(
    codec: &dyn MediaCodec,
    cleaned_audio: &Path,
    output: &Path,
    format: &str,
    run: CodecRun<'_>,
) -> Result<(), CodecError> {
    log::info!("Exporting audio {:?} -> {:?} ({})", cleaned_audio, output, format);
    codec.transcode(
        cleaned_audio,
        output,
        &TranscodeTarget::Container(format.trim_start_matches('.').to_ascii_lowercase()),
        run,
    )
}
