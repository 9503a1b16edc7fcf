//! Pipeline controller
//!
//! Runs Detect -> Normalize -> Denoise -> Finalize (and exports) on a
//! blocking worker, one run at a time per workspace. The worker reports only
//! through the event channel: every state change and event send happens under
//! the slot lock, so events arrive in order and the terminal event of a run is
//! always the last one for that run. Just before it, the run's `Done` or
//! `Failed` state is reported; the controller is `Idle` again right after.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::events::PipelineEvent;
use super::state::{
    PipelineState, PROGRESS_ACCEPTED, PROGRESS_DENOISE_COMPLETE, PROGRESS_DENOISE_STARTED, PROGRESS_FINALIZED,
};
use super::store::{finalize, PipelineResult, ResultStore};
use crate::commands::export::{export_audio, reconstruct, resolve_output, ExportPlan, OutputFormat, Reconstruction};
use crate::engine::{expected_output, DenoiseEngine, DenoiseParams, EngineError};
use crate::error::{ClassificationError, PipelineError, SubmitError};
use crate::media::normalize::normalize;
use crate::media::{Classification, Classified, CodecRun, MediaClassifier, MediaCodec, MediaHandle};
use crate::services::TempWorkspace;

/// One denoise submission.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub source: MediaHandle,
    pub params: DenoiseParams,
}

impl PipelineRequest {
    pub fn new(path: impl Into<PathBuf>, params: DenoiseParams) -> Self {
        Self { source: MediaHandle::new(path), params }
    }
}

/// Save the current result to `output`.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// With [`OutputFormat::Original`] this is a base path the source's extension is appended to.
    pub output: PathBuf,
    pub format: OutputFormat,
    /// Write only the cleaned audio even when the source was a video.
    pub audio_only: bool,
}

impl ExportRequest {
    /// Export to a path typed by the user; its extension picks the format when it names one.
    pub fn to_path(output: impl Into<PathBuf>, audio_only: bool) -> Self {
        let output = output.into();
        let format = OutputFormat::from_path(&output);
        Self { output, format, audio_only }
    }

    /// Export in the source's format to `base` plus the source's extension.
    pub fn original_format(base: impl Into<PathBuf>, audio_only: bool) -> Self {
        Self { output: base.into(), format: OutputFormat::Original, audio_only }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Limit for each codec call (normalize, encode, mux). Unbounded when `None`.
    pub codec_timeout: Option<Duration>,
}

struct Slot {
    state: PipelineState,
    run_id: Option<String>,
    cancel: Option<Arc<AtomicBool>>,
    progress: u8,
}

impl Slot {
    fn idle() -> Self {
        Self { state: PipelineState::Idle, run_id: None, cancel: None, progress: PROGRESS_ACCEPTED }
    }
}

/// What a run had produced when it stopped.
#[derive(Default)]
struct RunTrace {
    classified: Option<Classified>,
    normalized: Option<PathBuf>,
    raw_output: Option<PathBuf>,
}

struct Shared {
    codec: Arc<dyn MediaCodec>,
    engine: Arc<dyn DenoiseEngine>,
    events: UnboundedSender<PipelineEvent>,
    staging_dir: PathBuf,
    output_dir: PathBuf,
    options: ControllerOptions,
    slot: Mutex<Slot>,
    store: Mutex<ResultStore>,
    shutting_down: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn check_cancel(cancel: &AtomicBool) -> Result<(), PipelineError> {
    if cancel.load(Ordering::SeqCst) {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Fails the run if its worker unwinds before sending a terminal event.
struct WorkerGuard {
    shared: Arc<Shared>,
    run_id: String,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if !self.shared.is_active(&self.run_id) {
            return;
        }
        let detail = if std::thread::panicking() {
            "worker panicked"
        } else {
            "worker returned without a result"
        };
        log::error!("Run {} lost: {}", self.run_id, detail);
        let err = PipelineError::WorkerLost(detail.to_string());
        self.shared.finish(&self.run_id, PipelineEvent::failed(&self.run_id, &err, None));
    }
}

#[derive(Clone)]
pub struct PipelineController {
    shared: Arc<Shared>,
    workspace: Arc<Mutex<Option<TempWorkspace>>>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
    runtime: Handle,
}

impl PipelineController {
    pub fn new(
        workspace: TempWorkspace,
        codec: Arc<dyn MediaCodec>,
        engine: Arc<dyn DenoiseEngine>,
        events: UnboundedSender<PipelineEvent>,
        runtime: Handle,
        options: ControllerOptions,
    ) -> Self {
        let shared = Shared {
            codec,
            engine,
            events,
            staging_dir: workspace.staging_dir().to_path_buf(),
            output_dir: workspace.output_dir().to_path_buf(),
            options,
            slot: Mutex::new(Slot::idle()),
            store: Mutex::new(ResultStore::new()),
            shutting_down: AtomicBool::new(false),
        };
        Self {
            shared: Arc::new(shared),
            workspace: Arc::new(Mutex::new(Some(workspace))),
            worker: Arc::new(Mutex::new(None)),
            runtime,
        }
    }

    pub fn state(&self) -> PipelineState {
        lock(&self.shared.slot).state
    }

    pub fn staging_dir(&self) -> &Path {
        &self.shared.staging_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.shared.output_dir
    }

    /// Start a denoise run. Refused, without any state change, while another
    /// run or export is in flight.
    pub fn submit(&self, request: PipelineRequest) -> Result<String, SubmitError> {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            return Err(SubmitError::ShuttingDown);
        }
        request.params.validate().map_err(|e| match e {
            EngineError::InvalidParams(msg) => SubmitError::InvalidParams(msg),
            other => SubmitError::InvalidParams(other.to_string()),
        })?;

        let mut slot = lock(&self.shared.slot);
        if slot.state.is_busy() {
            log::warn!("Submit refused: run {:?} is {:?}", slot.run_id, slot.state);
            return Err(SubmitError::Busy);
        }

        let run_id = Uuid::new_v4().to_string();
        let cancel = Arc::new(AtomicBool::new(false));
        *slot = Slot {
            state: PipelineState::Detecting,
            run_id: Some(run_id.clone()),
            cancel: Some(cancel.clone()),
            progress: PROGRESS_ACCEPTED,
        };
        log::info!("Run {} accepted for {:?}", run_id, request.source.path());
        self.shared.emit(PipelineEvent::Progress { run_id: run_id.clone(), percent: PROGRESS_ACCEPTED });
        self.shared.emit(PipelineEvent::StateChanged { run_id: run_id.clone(), state: PipelineState::Detecting });
        drop(slot);

        let guard = WorkerGuard { shared: self.shared.clone(), run_id: run_id.clone() };
        let handle = self.runtime.spawn_blocking(move || {
            let guard = guard;
            guard.shared.run_denoise(&guard.run_id, request, &cancel);
        });
        *lock(&self.worker) = Some(handle);

        Ok(run_id)
    }

    /// Save the current result, on the same worker and with the same exclusivity as a run.
    pub fn export(&self, request: ExportRequest) -> Result<String, SubmitError> {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            return Err(SubmitError::ShuttingDown);
        }
        let current = lock(&self.shared.store).current().cloned().ok_or(SubmitError::NoResult)?;

        let mut slot = lock(&self.shared.slot);
        if slot.state.is_busy() {
            return Err(SubmitError::Busy);
        }

        let (output, format) = resolve_output(&request.output, &request.format, &current.source, request.audio_only);
        let plan = ExportPlan::for_format(&format, request.audio_only);

        let run_id = Uuid::new_v4().to_string();
        let cancel = Arc::new(AtomicBool::new(false));
        *slot = Slot {
            state: PipelineState::Exporting,
            run_id: Some(run_id.clone()),
            cancel: Some(cancel.clone()),
            progress: PROGRESS_ACCEPTED,
        };
        log::info!("Export {} to {:?} ({:?})", run_id, output, plan);
        self.shared.emit(PipelineEvent::StateChanged { run_id: run_id.clone(), state: PipelineState::Exporting });
        self.shared.emit(PipelineEvent::ExportStarted {
            run_id: run_id.clone(),
            output: output.clone(),
            long_running: plan.is_long_running(),
        });
        drop(slot);

        let guard = WorkerGuard { shared: self.shared.clone(), run_id: run_id.clone() };
        let handle = self.runtime.spawn_blocking(move || {
            let guard = guard;
            guard.shared.run_export(&guard.run_id, current, output, plan, &cancel);
        });
        *lock(&self.worker) = Some(handle);

        Ok(run_id)
    }

    /// Best-effort kill of the in-flight external process. The run then fails
    /// as cancelled; a clean mid-run stop is not promised.
    pub fn cancel(&self) -> bool {
        let slot = lock(&self.shared.slot);
        match (&slot.cancel, &slot.run_id) {
            (Some(flag), Some(run_id)) => {
                log::info!("Cancelling run {}", run_id);
                flag.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    /// Refuse all further submissions and cancel the current run.
    pub fn shutdown(&self) {
        if !self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            log::info!("Pipeline shutting down");
        }
        self.cancel();
    }

    /// Shut down, wait for the worker to finish and remove the workspace.
    pub async fn close(self) {
        self.shutdown();
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                log::warn!("Pipeline worker ended abnormally: {}", e);
            }
        }
        let workspace = lock(&self.workspace).take();
        if let Some(workspace) = workspace {
            workspace.close();
        }
    }

    pub fn current_result(&self) -> Option<PipelineResult> {
        lock(&self.shared.store).current().cloned()
    }

    /// `(normalized source, denoised)` of the current result.
    pub fn comparison(&self) -> Option<(PathBuf, PathBuf)> {
        lock(&self.shared.store)
            .comparison()
            .map(|(before, after)| (before.to_path_buf(), after.to_path_buf()))
    }
}

impl Shared {
    fn emit(&self, event: PipelineEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Event receiver dropped");
        }
    }

    fn advance(&self, run_id: &str, next: PipelineState) {
        let mut slot = lock(&self.slot);
        if slot.run_id.as_deref() != Some(run_id) {
            return;
        }
        if !slot.state.can_advance_to(next) {
            log::warn!("Unexpected transition {:?} -> {:?} in run {}", slot.state, next, run_id);
        }
        log::info!("Run {}: {}", run_id, next.label());
        slot.state = next;
        self.emit(PipelineEvent::StateChanged { run_id: run_id.to_string(), state: next });
    }

    fn progress(&self, run_id: &str, percent: u8) {
        let mut slot = lock(&self.slot);
        if slot.run_id.as_deref() != Some(run_id) || percent < slot.progress {
            return;
        }
        slot.progress = percent;
        self.emit(PipelineEvent::Progress { run_id: run_id.to_string(), percent });
    }

    fn is_active(&self, run_id: &str) -> bool {
        lock(&self.slot).run_id.as_deref() == Some(run_id)
    }

    /// Report the end state, send the terminal event and free the slot in one step.
    fn finish(&self, run_id: &str, event: PipelineEvent) {
        let mut slot = lock(&self.slot);
        if slot.run_id.as_deref() != Some(run_id) {
            return;
        }
        if let Some(end) = event.terminal_state() {
            if !slot.state.can_advance_to(end) {
                log::warn!("Unexpected transition {:?} -> {:?} in run {}", slot.state, end, run_id);
            }
            slot.state = end;
            self.emit(PipelineEvent::StateChanged { run_id: run_id.to_string(), state: end });
        }
        self.emit(event);
        *slot = Slot::idle();
    }

    fn codec_run<'a>(&self, cancel: &'a AtomicBool) -> CodecRun<'a> {
        CodecRun { cancel: Some(cancel), timeout: self.options.codec_timeout }
    }

    fn run_denoise(&self, run_id: &str, request: PipelineRequest, cancel: &AtomicBool) {
        let mut trace = RunTrace::default();
        match self.denoise_stages(run_id, &request, cancel, &mut trace) {
            Ok(result) => {
                lock(&self.store).record(result.clone());
                self.progress(run_id, PROGRESS_FINALIZED);
                log::info!("Run {} done: {:?}", run_id, result.denoised);
                self.finish(run_id, PipelineEvent::Done { run_id: run_id.to_string(), result });
            }
            Err(err) => {
                log::error!("Run {} failed ({:?}): {}", run_id, err.kind(), err);
                if let Some(raw) = trace.raw_output.take().filter(|p| p.exists()) {
                    if let Err(e) = std::fs::remove_file(&raw) {
                        log::warn!("Failed to remove unfinalized output {:?}: {}", raw, e);
                    }
                }
                let result = match (trace.classified, trace.normalized) {
                    (Some(classified), Some(normalized)) => Some(PipelineResult::failed(
                        run_id,
                        classified.handle,
                        classified.classification,
                        Some(normalized),
                        err.to_string(),
                    )),
                    _ => None,
                };
                self.finish(run_id, PipelineEvent::failed(run_id, &err, result));
            }
        }
    }

    fn denoise_stages(
        &self,
        run_id: &str,
        request: &PipelineRequest,
        cancel: &AtomicBool,
        trace: &mut RunTrace,
    ) -> Result<PipelineResult, PipelineError> {
        let classified =
            MediaClassifier::new(self.codec.clone()).classify(&request.source, self.codec_run(cancel))?;
        trace.classified = Some(classified.clone());
        match &classified.classification {
            Classification::Unsupported { reason } => {
                return Err(ClassificationError::Unsupported {
                    path: request.source.path().to_path_buf(),
                    reason: reason.clone(),
                }
                .into())
            }
            c if !c.has_audio() => {
                return Err(ClassificationError::NoAudioStream(request.source.path().to_path_buf()).into())
            }
            _ => {}
        }
        check_cancel(cancel)?;

        self.advance(run_id, PipelineState::Normalizing);
        let normalized = normalize(self.codec.as_ref(), &classified.handle, &self.staging_dir, self.codec_run(cancel))?;
        trace.normalized = Some(normalized.clone());
        check_cancel(cancel)?;

        self.advance(run_id, PipelineState::Denoising);
        self.progress(run_id, PROGRESS_DENOISE_STARTED);
        trace.raw_output = Some(expected_output(&normalized, &self.output_dir));
        let outcome = self.engine.run(&normalized, &self.output_dir, &request.params, cancel)?;
        log::info!("Engine finished in {:.1}s", outcome.elapsed.as_secs_f64());
        self.progress(run_id, PROGRESS_DENOISE_COMPLETE);

        self.advance(run_id, PipelineState::Finalizing);
        let denoised = finalize(&outcome.output_path, &self.output_dir)?;

        Ok(PipelineResult::succeeded(
            run_id,
            classified.handle,
            classified.classification,
            normalized,
            denoised,
        ))
    }

    fn run_export(&self, run_id: &str, current: PipelineResult, output: PathBuf, plan: ExportPlan, cancel: &AtomicBool) {
        match self.export_stages(&current, &output, &plan, cancel) {
            Ok(()) => self.finish(run_id, PipelineEvent::Exported { run_id: run_id.to_string(), output }),
            Err(err) => {
                log::error!("Export {} failed ({:?}): {}", run_id, err.kind(), err);
                if let Some(cleaned) = &current.denoised {
                    log::info!("Cleaned audio is still available at {:?}", cleaned);
                }
                self.finish(run_id, PipelineEvent::failed(run_id, &err, None));
            }
        }
    }

    fn export_stages(
        &self,
        current: &PipelineResult,
        output: &Path,
        plan: &ExportPlan,
        cancel: &AtomicBool,
    ) -> Result<(), PipelineError> {
        let cleaned = current
            .denoised
            .as_deref()
            .ok_or_else(|| PipelineError::InvalidState("result has no denoised file".into()))?;

        match plan {
            ExportPlan::Reconstruct { container } => {
                let job = Reconstruction {
                    original_video: current.source.path(),
                    classification: &current.classification,
                    cleaned_audio: cleaned,
                    output,
                    container,
                };
                reconstruct(self.codec.as_ref(), &job, &self.staging_dir, self.codec_run(cancel))?;
            }
            ExportPlan::Audio { format } => {
                export_audio(self.codec.as_ref(), cleaned, output, format, self.codec_run(cancel))?;
            }
        }
        Ok(())
    }
}
