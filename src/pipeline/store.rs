//! Results of finished runs and the finalize step that names them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FinalizeError;
use crate::media::{Classification, MediaHandle};

/// Outcome of one denoise run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub run_id: String,
    pub source: MediaHandle,
    pub classification: Classification,
    /// Normalized WAV fed to the engine ("before" side of a comparison).
    pub normalized_source: Option<PathBuf>,
    /// Finalized, uniquely named engine output ("after" side).
    pub denoised: Option<PathBuf>,
    pub success: bool,
    pub error_detail: Option<String>,
}

impl PipelineResult {
    pub fn succeeded(
        run_id: &str,
        source: MediaHandle,
        classification: Classification,
        normalized_source: PathBuf,
        denoised: PathBuf,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            source,
            classification,
            normalized_source: Some(normalized_source),
            denoised: Some(denoised),
            success: true,
            error_detail: None,
        }
    }

    pub fn failed(
        run_id: &str,
        source: MediaHandle,
        classification: Classification,
        normalized_source: Option<PathBuf>,
        detail: String,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            source,
            classification,
            normalized_source,
            denoised: None,
            success: false,
            error_detail: Some(detail),
        }
    }
}

/// A path under `output_dir` no existing file uses: `<128-bit hex>.wav`.
pub fn unique_result_path(output_dir: &Path) -> PathBuf {
    loop {
        let candidate = output_dir.join(format!("{}.wav", Uuid::new_v4().simple()));
        if !candidate.exists() {
            return candidate;
        }
    }
}

/// Move the engine's basename-named output to a fresh unique name in the same directory.
///
/// Not retried: a locked or vanished file fails the run.
pub fn finalize(raw_output: &Path, output_dir: &Path) -> Result<PathBuf, FinalizeError> {
    if !raw_output.is_file() {
        return Err(FinalizeError::Missing(raw_output.to_path_buf()));
    }
    let target = unique_result_path(output_dir);
    fs::rename(raw_output, &target).map_err(|source| FinalizeError::Rename {
        from: raw_output.to_path_buf(),
        to: target.clone(),
        source,
    })?;
    log::info!("Finalized {:?} -> {:?}", raw_output, target);
    Ok(target)
}

/// Successful results of this session. The latest one is current.
///
/// Superseded results stay on disk until workspace cleanup: a player may
/// still hold them open.
#[derive(Debug, Default)]
pub struct ResultStore {
    current: Option<PipelineResult>,
    superseded: Vec<PipelineResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a successful result as current. Failed results are not kept.
    pub fn record(&mut self, result: PipelineResult) {
        if !result.success {
            log::debug!("Not storing failed result for run {}", result.run_id);
            return;
        }
        if let Some(previous) = self.current.replace(result) {
            self.superseded.push(previous);
        }
    }

    pub fn current(&self) -> Option<&PipelineResult> {
        self.current.as_ref()
    }

    /// `(before, after)` paths for spectrogram or A/B playback consumers.
    pub fn comparison(&self) -> Option<(&Path, &Path)> {
        let current = self.current.as_ref()?;
        Some((current.normalized_source.as_deref()?, current.denoised.as_deref()?))
    }

    /// The original video, when the current result can be put back into it.
    pub fn video_reference(&self) -> Option<&Path> {
        self.current
            .as_ref()
            .filter(|r| r.classification.can_reconstruct())
            .map(|r| r.source.path())
    }

    pub fn superseded(&self) -> &[PipelineResult] {
        &self.superseded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn result(run_id: &str, classification: Classification, dir: &Path) -> PipelineResult {
        PipelineResult::succeeded(
            run_id,
            MediaHandle::new(dir.join("clip.mp4")),
            classification,
            dir.join("clip.wav"),
            dir.join(format!("{}.wav", run_id)),
        )
    }

    #[test]
    fn test_unique_paths_are_hex_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = unique_result_path(dir.path());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with(".wav"));
        assert_eq!(name.len(), 32 + 4);
        assert!(name[..32].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_finalize_renames_to_fresh_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut seen = HashSet::new();
        for _ in 0..20 {
            let raw = dir.path().join("speech.wav");
            fs::write(&raw, b"RIFF").unwrap();
            let finalized = finalize(&raw, dir.path()).unwrap();
            assert!(!raw.exists());
            assert!(finalized.is_file());
            assert!(seen.insert(finalized));
        }
    }

    #[test]
    fn test_finalize_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = finalize(&dir.path().join("gone.wav"), dir.path()).unwrap_err();
        assert!(matches!(err, FinalizeError::Missing(_)));
    }

    #[test]
    fn test_store_keeps_superseded() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::new();
        assert!(store.current().is_none());
        assert!(store.comparison().is_none());

        store.record(result("a", Classification::Audio, dir.path()));
        store.record(result("b", Classification::Video { has_audio_stream: true }, dir.path()));

        assert_eq!(store.current().unwrap().run_id, "b");
        assert_eq!(store.superseded().len(), 1);
        assert_eq!(store.superseded()[0].run_id, "a");

        let (before, after) = store.comparison().unwrap();
        assert_eq!(before, dir.path().join("clip.wav"));
        assert_eq!(after, dir.path().join("b.wav"));
        assert!(store.video_reference().is_some());
    }

    #[test]
    fn test_store_ignores_failures_and_audio_has_no_video_reference() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::new();
        store.record(result("a", Classification::Audio, dir.path()));
        store.record(PipelineResult::failed(
            "b",
            MediaHandle::new(dir.path().join("x.wav")),
            Classification::Audio,
            None,
            "boom".into(),
        ));
        assert_eq!(store.current().unwrap().run_id, "a");
        assert!(store.superseded().is_empty());
        assert!(store.video_reference().is_none());
    }
}
