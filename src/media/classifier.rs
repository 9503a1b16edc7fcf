//! Decide whether an input is audio, video (with or without sound) or unusable.

use std::sync::Arc;

use super::codec::{CodecError, CodecRun, MediaCodec};
use super::types::{Classification, DeclaredKind, MediaHandle};

/// Extensions trusted as audio without probing.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "m4a"];

pub fn is_audio_extension(ext: &str) -> bool {
    AUDIO_EXTENSIONS.contains(&ext.trim_start_matches('.').to_ascii_lowercase().as_str())
}

/// A handle after classification, with probe metadata attached when a probe ran.
#[derive(Debug, Clone)]
pub struct Classified {
    pub handle: MediaHandle,
    pub classification: Classification,
}

pub struct MediaClassifier {
    codec: Arc<dyn MediaCodec>,
}

impl MediaClassifier {
    pub fn new(codec: Arc<dyn MediaCodec>) -> Self {
        Self { codec }
    }

    /// Unreadable or unprobeable inputs come back as `Unsupported`. The only
    /// error is a probe stopped by `run`'s cancel flag or timeout.
    pub fn classify(&self, handle: &MediaHandle, run: CodecRun<'_>) -> Result<Classified, CodecError> {
        let path = handle.path();

        if !path.is_file() {
            log::warn!("Input {:?} does not exist or is not a file", path);
            return Ok(Classified {
                handle: handle.with_probe(DeclaredKind::Unknown, None),
                classification: Classification::Unsupported { reason: "file not found".into() },
            });
        }

        if handle.extension().is_some_and(|ext| is_audio_extension(&ext)) {
            log::info!("{:?} classified as audio by extension", path);
            return Ok(Classified {
                handle: handle.with_probe(DeclaredKind::Audio, None),
                classification: Classification::Audio,
            });
        }

        log::info!("Probing {:?} with {} codec", path, self.codec.name());
        let classified = match self.codec.probe(path, run) {
            Ok(info) if info.has_usable_video() => {
                log::info!(
                    "Video detected: {}x{} @ {:?} fps, audio stream: {}",
                    info.width.unwrap_or(0),
                    info.height.unwrap_or(0),
                    info.frame_rate,
                    info.has_audio
                );
                let has_audio_stream = info.has_audio;
                Classified {
                    handle: handle.with_probe(DeclaredKind::Video, Some(info)),
                    classification: Classification::Video { has_audio_stream },
                }
            }
            Ok(info) if info.has_audio => {
                log::info!("No usable video stream in {:?}; treating as audio", path);
                Classified {
                    handle: handle.with_probe(DeclaredKind::Audio, Some(info)),
                    classification: Classification::Audio,
                }
            }
            Ok(info) => Classified {
                handle: handle.with_probe(DeclaredKind::Unknown, Some(info)),
                classification: Classification::Unsupported {
                    reason: "no audio or video stream found".into(),
                },
            },
            Err(e) if e.is_interrupted() => {
                log::warn!("Probe of {:?} stopped: {}", path, e);
                return Err(e);
            }
            Err(e) => {
                log::warn!("Probe failed for {:?}: {}", path, e);
                Classified {
                    handle: handle.with_probe(DeclaredKind::Unknown, None),
                    classification: Classification::Unsupported { reason: e.to_string() },
                }
            }
        };
        Ok(classified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::types::MediaInfo;
    use crate::services::ToolError;
    use crate::testing::StubCodec;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn touch(dir: &std::path::Path, name: &str) -> MediaHandle {
        let path = dir.join(name);
        std::fs::write(&path, b"data").unwrap();
        MediaHandle::new(path)
    }

    fn classify(codec: Arc<StubCodec>, handle: &MediaHandle) -> Classified {
        MediaClassifier::new(codec).classify(handle, CodecRun::default()).unwrap()
    }

    #[test]
    fn test_audio_extension_skips_probe() {
        let dir = tempfile::tempdir().unwrap();
        let codec = Arc::new(StubCodec::new(None));
        let classifier = MediaClassifier::new(codec.clone());

        let result = classifier.classify(&touch(dir.path(), "speech.MP3"), CodecRun::default()).unwrap();
        assert_eq!(result.classification, Classification::Audio);
        assert_eq!(result.handle.kind, DeclaredKind::Audio);
        assert_eq!(codec.probe_count(), 0);
    }

    #[test]
    fn test_video_with_audio() {
        let dir = tempfile::tempdir().unwrap();
        let codec = Arc::new(StubCodec::video(true));
        let result = classify(codec.clone(), &touch(dir.path(), "clip.mp4"));

        assert_eq!(result.classification, Classification::Video { has_audio_stream: true });
        assert_eq!(result.handle.kind, DeclaredKind::Video);
        assert!(result.handle.metadata.is_some());
        assert_eq!(codec.probe_count(), 1);
    }

    #[test]
    fn test_video_without_audio() {
        let dir = tempfile::tempdir().unwrap();
        let codec = Arc::new(StubCodec::video(false));
        let result = classify(codec, &touch(dir.path(), "silent.mkv"));
        assert_eq!(result.classification, Classification::Video { has_audio_stream: false });
        assert!(!result.classification.has_audio());
    }

    #[test]
    fn test_audio_in_unlisted_container() {
        let dir = tempfile::tempdir().unwrap();
        let codec = Arc::new(StubCodec::audio());
        let result = classify(codec, &touch(dir.path(), "voice.opus"));
        assert_eq!(result.classification, Classification::Audio);
    }

    #[test]
    fn test_probe_failure_downgrades_to_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let codec = Arc::new(StubCodec::new(None));
        let result = classify(codec, &touch(dir.path(), "broken.mov"));
        assert!(matches!(result.classification, Classification::Unsupported { .. }));
    }

    #[test]
    fn test_no_streams_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let codec = Arc::new(StubCodec::new(Some(MediaInfo::default())));
        let result = classify(codec, &touch(dir.path(), "empty.mp4"));
        assert!(matches!(result.classification, Classification::Unsupported { .. }));
    }

    #[test]
    fn test_stuck_detection_call_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = StubCodec::video(true);
        codec.probe_hangs = true;
        let run = CodecRun { cancel: None, timeout: Some(Duration::from_millis(50)) };
        let err = MediaClassifier::new(Arc::new(codec)).classify(&touch(dir.path(), "clip.mp4"), run).unwrap_err();
        assert!(matches!(err, CodecError::Tool(ToolError::TimedOut { .. })));
    }

    #[test]
    fn test_cancelled_detection_is_not_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let mut codec = StubCodec::video(true);
        codec.probe_hangs = true;
        let cancel = AtomicBool::new(true);
        let run = CodecRun { cancel: Some(&cancel), timeout: None };
        let err = MediaClassifier::new(Arc::new(codec)).classify(&touch(dir.path(), "clip.mov"), run).unwrap_err();
        assert!(err.is_interrupted());
        assert!(matches!(err, CodecError::Tool(ToolError::Cancelled { .. })));
    }

    #[test]
    fn test_missing_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let codec = Arc::new(StubCodec::audio());
        let handle = MediaHandle::new(dir.path().join("nope.wav"));
        let result = classify(codec.clone(), &handle);
        assert!(matches!(result.classification, Classification::Unsupported { .. }));
        assert_eq!(codec.probe_count(), 0);
    }
}
