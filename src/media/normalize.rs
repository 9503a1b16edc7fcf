//! Normalization: any accepted input becomes a mono 48 kHz 16-bit WAV in staging.

use std::path::{Path, PathBuf};

use super::codec::{CodecError, CodecRun, MediaCodec, TranscodeTarget};
use super::types::MediaHandle;

/// `<staging>/<input stem>.wav`. The engine later names its output after this basename.
pub fn staged_wav_path(staging_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "input".to_string());
    staging_dir.join(format!("{}.wav", stem))
}

/// Transcode `handle` into the staging directory, replacing any earlier staged copy.
pub fn normalize(
    codec: &dyn MediaCodec,
    handle: &MediaHandle,
    staging_dir: &Path,
    run: CodecRun<'_>,
) -> Result<PathBuf, CodecError> {
    let output = staged_wav_path(staging_dir, handle.path());

    if output.exists() {
        log::debug!("Overwriting staged file {:?}", output);
        std::fs::remove_file(&output).map_err(|source| CodecError::Open { path: output.clone(), source })?;
    }

    log::info!("Normalizing {:?} -> {:?} via {}", handle.path(), output, codec.name());
    if let Err(e) = codec.transcode(handle.path(), &output, &TranscodeTarget::NormalizedWav, run) {
        // Never leave a half-written WAV behind for the engine to pick up.
        if output.exists() {
            if let Err(cleanup) = std::fs::remove_file(&output) {
                log::warn!("Failed to remove partial normalized file {:?}: {}", output, cleanup);
            }
        }
        return Err(e);
    }

    Ok(output)
}
