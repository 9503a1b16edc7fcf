//! Where pipeline events are shown
//!
//! The controller only knows the event channel. A front end picks one of
//! these presenters and pumps events into it until its run finishes.

use std::io::Write;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::pipeline::PipelineEvent;

pub trait Presenter: Send {
    fn present(&mut self, event: &PipelineEvent);
}

/// Human-readable progress lines.
pub struct TerminalPresenter<W: Write + Send> {
    out: W,
}

impl TerminalPresenter<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self { out: std::io::stderr() }
    }
}

impl<W: Write + Send> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(event: &PipelineEvent) -> Option<String> {
        match event {
            PipelineEvent::StateChanged { state, .. } if state.is_terminal() => None,
            PipelineEvent::StateChanged { state, .. } => Some(format!("{}...", state.label())),
            PipelineEvent::Progress { percent, .. } => Some(format!("[{:>3}%]", percent)),
            PipelineEvent::Done { result, .. } => Some(match &result.denoised {
                Some(path) => format!("Denoised: {}", path.display()),
                None => "Denoised".to_string(),
            }),
            PipelineEvent::Failed { kind, detail, exit_code, .. } => Some(match exit_code {
                Some(code) => format!("Failed ({:?}, exit code {}): {}", kind, code, detail),
                None => format!("Failed ({:?}): {}", kind, detail),
            }),
            PipelineEvent::ExportStarted { output, long_running, .. } => Some(if *long_running {
                format!("Rebuilding video {} (full re-encode, this can take a while)", output.display())
            } else {
                format!("Writing {}", output.display())
            }),
            PipelineEvent::Exported { output, .. } => Some(format!("Saved {}", output.display())),
        }
    }
}

impl<W: Write + Send> Presenter for TerminalPresenter<W> {
    fn present(&mut self, event: &PipelineEvent) {
        if let Some(line) = Self::line(event) {
            let _ = writeln!(self.out, "{}", line);
        }
    }
}

/// One JSON object per line, for a desktop shell reading stdout.
pub struct JsonPresenter<W: Write + Send> {
    out: W,
}

impl JsonPresenter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: std::io::stdout() }
    }
}

impl<W: Write + Send> JsonPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Presenter for JsonPresenter<W> {
    fn present(&mut self, event: &PipelineEvent) {
        match serde_json::to_string(event) {
            Ok(json) => {
                let _ = writeln!(self.out, "{}", json);
                let _ = self.out.flush();
            }
            Err(e) => log::error!("Failed to serialize event: {}", e),
        }
    }
}

pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn present(&mut self, _event: &PipelineEvent) {}
}

/// Present events until `run_id` reaches its terminal event, which is returned.
/// `None` when the channel closes first.
pub async fn pump_until_terminal(
    events: &mut UnboundedReceiver<PipelineEvent>,
    run_id: &str,
    presenter: &mut dyn Presenter,
) -> Option<PipelineEvent> {
    while let Some(event) = events.recv().await {
        presenter.present(&event);
        if event.run_id() == run_id && event.is_terminal() {
            return Some(event);
        }
    }
    None
}
