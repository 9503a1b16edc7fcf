pub mod classifier;
pub mod codec;
pub mod ffmpeg;
pub mod native;
pub mod normalize;
pub mod types;

use std::sync::Arc;

pub use classifier::{Classified, MediaClassifier};
pub use codec::{AudioCodec, CodecError, CodecPairing, CodecRun, MediaCodec, TranscodeTarget, VideoCodec};
pub use ffmpeg::FfmpegCodec;
pub use native::SymphoniaCodec;
pub use types::{Classification, DeclaredKind, MediaHandle, MediaInfo};

use crate::config::{CodecBackend, CodecConfig};

/// Pick the codec backend. `Auto` prefers ffmpeg and falls back to the built-in decoder.
pub fn select_codec(config: &CodecConfig) -> Arc<dyn MediaCodec> {
    let ffmpeg = FfmpegCodec::new(&config.ffmpeg, &config.ffprobe);
    match config.backend {
        CodecBackend::Ffmpeg => Arc::new(ffmpeg),
        CodecBackend::Native => Arc::new(SymphoniaCodec::new()),
        CodecBackend::Auto => {
            if ffmpeg.is_available() {
                log::info!("Using ffmpeg at {:?}", config.ffmpeg);
                Arc::new(ffmpeg)
            } else {
                log::warn!(
                    "ffmpeg not found at {:?}; using built-in decoder (audio files only, no video export)",
                    config.ffmpeg
                );
                Arc::new(SymphoniaCodec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_explicit_backends() {
        let native = CodecConfig { backend: CodecBackend::Native, ..Default::default() };
        assert_eq!(select_codec(&native).name(), "native");

        let ffmpeg = CodecConfig { backend: CodecBackend::Ffmpeg, ..Default::default() };
        assert_eq!(select_codec(&ffmpeg).name(), "ffmpeg");
    }

    #[test]
    fn test_auto_falls_back_without_ffmpeg() {
        let config = CodecConfig {
            backend: CodecBackend::Auto,
            ffmpeg: PathBuf::from("definitely-not-ffmpeg-here"),
            ffprobe: PathBuf::from("definitely-not-ffprobe-here"),
        };
        assert_eq!(select_codec(&config).name(), "native");
    }
}
