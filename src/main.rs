use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc::unbounded_channel;

use voice_scrub::commands::default_output_base;
use voice_scrub::config::{AppConfig, CodecBackend};
use voice_scrub::media::{select_codec, Classification, CodecRun, MediaClassifier, MediaHandle, MediaInfo};
use voice_scrub::presenter::{pump_until_terminal, JsonPresenter, Presenter, TerminalPresenter};
use voice_scrub::services::TempWorkspace;
use voice_scrub::{
    ControllerOptions, DeepFilterEngine, DenoiseParams, ErrorKind, ExportRequest, PipelineController,
    PipelineEvent, PipelineRequest,
};

#[derive(Parser)]
#[command(name = "voice-scrub", version, about = "Remove background noise from speech in audio and video files")]
struct Cli {
    /// Settings file (default: <config dir>/voice-scrub/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Codec backend: auto, ffmpeg or native
    #[arg(long, global = true)]
    codec: Option<CodecBackend>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Denoise a file and save the result
    Clean(CleanArgs),
    /// Print classification and stream metadata as JSON
    Probe { input: PathBuf },
}

#[derive(Args)]
struct CleanArgs {
    input: PathBuf,

    /// Output file; without a known audio or video extension the input's format is appended
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Save only the cleaned audio, even for video input
    #[arg(long)]
    audio_only: bool,

    /// Enable the engine's post-filter
    #[arg(long)]
    pf: bool,

    /// Post-filter beta in [0, 1]; 0 leaves the flag off
    #[arg(long)]
    pf_beta: Option<f32>,

    /// Attenuation limit in dB; 0 leaves the flag off
    #[arg(long)]
    atten_lim_db: Option<f32>,

    /// Post-filter on, beta 0.02, 100 dB limit
    #[arg(long)]
    studio: bool,

    /// Kill external tools that run longer than this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Print events as JSON lines on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProbeReport {
    path: PathBuf,
    classification: Classification,
    metadata: Option<MediaInfo>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(backend) = cli.codec {
        config.codec.backend = backend;
    }

    let outcome = match cli.command {
        Command::Clean(args) => clean(args, config).await,
        Command::Probe { input } => probe(&input, &config),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn clean(args: CleanArgs, config: AppConfig) -> Result<ExitCode, String> {
    let cli_params = DenoiseParams { postfilter: args.pf, pf_beta: args.pf_beta, atten_lim_db: args.atten_lim_db };
    let base = if args.studio { DenoiseParams::studio() } else { config.denoise.clone() };
    let params = base.merged_with(&cli_params);

    let timeout = match args.timeout {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => config.engine.timeout(),
    };

    let codec = select_codec(&config.codec);
    let engine = DeepFilterEngine::new(&config.engine.program)
        .with_base_args(&config.engine.args)
        .with_timeout(timeout);

    let workspace = match &config.workspace.root {
        Some(root) => TempWorkspace::create_in(root),
        None => TempWorkspace::create(),
    }
    .map_err(|e| e.to_string())?;

    let (tx, mut events) = unbounded_channel();
    let controller = PipelineController::new(
        workspace,
        codec,
        Arc::new(engine),
        tx,
        tokio::runtime::Handle::current(),
        ControllerOptions { codec_timeout: timeout },
    );

    let interrupt = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping");
            interrupt.shutdown();
        }
    });

    let mut presenter: Box<dyn Presenter> = if args.json {
        Box::new(JsonPresenter::stdout())
    } else {
        Box::new(TerminalPresenter::stderr())
    };

    let code = run_clean(&controller, &mut events, presenter.as_mut(), &args, params).await;
    controller.close().await;
    code
}

async fn run_clean(
    controller: &PipelineController,
    events: &mut tokio::sync::mpsc::UnboundedReceiver<PipelineEvent>,
    presenter: &mut dyn Presenter,
    args: &CleanArgs,
    params: DenoiseParams,
) -> Result<ExitCode, String> {
    let run_id = controller
        .submit(PipelineRequest::new(&args.input, params))
        .map_err(|e| e.to_string())?;

    match pump_until_terminal(events, &run_id, presenter).await {
        Some(PipelineEvent::Done { .. }) => {}
        Some(_) => return Ok(ExitCode::FAILURE),
        None => return Err("pipeline stopped without a result".into()),
    }

    let request = match &args.output {
        Some(output) => ExportRequest::to_path(output, args.audio_only),
        None => ExportRequest::original_format(default_output_base(&args.input), args.audio_only),
    };
    let export_id = controller
        .export(request)
        .map_err(|e| e.to_string())?;

    match pump_until_terminal(events, &export_id, presenter).await {
        Some(PipelineEvent::Exported { .. }) => Ok(ExitCode::SUCCESS),
        Some(PipelineEvent::Failed { kind, .. }) => {
            if matches!(kind, ErrorKind::Reconstruct | ErrorKind::InvalidState) {
                eprintln!("Hint: the video could not be rebuilt; rerun with --audio-only to keep the cleaned audio.");
            }
            Ok(ExitCode::FAILURE)
        }
        Some(_) => Ok(ExitCode::FAILURE),
        None => Err("pipeline stopped before the export finished".into()),
    }
}

fn probe(input: &Path, config: &AppConfig) -> Result<ExitCode, String> {
    let codec = select_codec(&config.codec);
    let run = CodecRun { cancel: None, timeout: config.engine.timeout() };
    let classified = MediaClassifier::new(codec.clone())
        .classify(&MediaHandle::new(input), run)
        .map_err(|e| e.to_string())?;

    // The audio fast path skips probing; fetch metadata anyway for the report.
    let metadata = match classified.handle.metadata.clone() {
        Some(info) => Some(info),
        None if classified.classification.has_audio() => codec.probe(classified.handle.path(), run).ok(),
        None => None,
    };

    let report = ProbeReport {
        path: classified.handle.path().to_path_buf(),
        classification: classified.classification,
        metadata,
    };
    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(ExitCode::SUCCESS)
}
