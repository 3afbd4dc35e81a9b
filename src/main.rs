use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use screen_recorder::platform::{SimulatedEncoderFactory, SimulatedPlatform};
use screen_recorder::recorder::{Recorder, RecorderDeps, StopOutcome};
use screen_recorder::settings::{SettingsProvider, SharedSettings};
use screen_recorder::state::{format_duration, CaptureMode, Region};
use screen_recorder::storage::{Converter, FfmpegConverter, Filesystem, LocalFilesystem};
use screen_recorder::{create_router, AppState, Config};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "screen-recorder", version, about = "Screen recording session orchestrator")]
struct Cli {
    /// Config file path (without extension)
    #[arg(long, default_value = "config/screen-recorder")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control surface
    Serve,
    /// Record for a fixed time and save the result
    Record {
        #[arg(long, default_value_t = 5)]
        seconds: u64,

        #[arg(long, value_enum, default_value_t = ModeArg::Fullscreen)]
        mode: ModeArg,

        /// Region as X,Y,WIDTH,HEIGHT (region mode only)
        #[arg(long, value_parser = parse_region)]
        region: Option<Region>,

        /// Directory to save into (default: the platform video directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Fullscreen,
    Window,
    Region,
}

fn parse_region(value: &str) -> Result<Region, String> {
    let parts: Vec<u32> = value
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid region {:?}: {}", value, e))?;
    match parts.as_slice() {
        [x, y, width, height] => Ok(Region {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
        }),
        _ => Err(format!("expected X,Y,WIDTH,HEIGHT, got {:?}", value)),
    }
}

fn build_recorder(cfg: &Config) -> Recorder {
    let filesystem: Arc<dyn Filesystem> = match &cfg.storage.default_video_dir {
        Some(dir) => Arc::new(LocalFilesystem::with_default_video_dir(dir)),
        None => Arc::new(LocalFilesystem::new()),
    };
    let converter = cfg
        .storage
        .ffmpeg
        .as_ref()
        .map(|program| Arc::new(FfmpegConverter::new(program)) as Arc<dyn Converter>);

    Recorder::new(RecorderDeps {
        platform: Arc::new(SimulatedPlatform::new(cfg.platform.simulated.clone())),
        encoders: Arc::new(SimulatedEncoderFactory::new()),
        filesystem,
        converter,
    })
}

fn build_settings(cfg: &Config) -> SharedSettings {
    match &cfg.storage.settings_file {
        Some(path) => SharedSettings::with_file(path, cfg.recording.clone()),
        None => SharedSettings::new(cfg.recording.clone()),
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let recorder = build_recorder(&cfg);
    let settings: Arc<dyn SettingsProvider> = Arc::new(build_settings(&cfg));
    let app = create_router(AppState::new(recorder.clone(), settings));

    let addr = cfg.http_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;

    // Never leave devices open on shutdown
    if let Err(e) = recorder.stop().await {
        warn!("Final stop failed: {}", e);
    }
    Ok(())
}

async fn record(
    cfg: Config,
    seconds: u64,
    mode: CaptureMode,
    output: Option<PathBuf>,
) -> Result<()> {
    let recorder = build_recorder(&cfg);
    let mut settings = build_settings(&cfg).load();
    if let Some(output) = output {
        settings.save_directory = output.display().to_string();
    }
    settings.auto_save = true;

    recorder
        .start(mode, settings)
        .await
        .context("Failed to start recording")?;
    for warning in recorder.state().warnings {
        warn!("{}: {}", warning.code, warning.message);
    }

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping early"),
    }

    match recorder.stop().await.context("Failed to finalize recording")? {
        StopOutcome::Saved(saved) => {
            info!(
                "Saved {} ({})",
                saved.path.display(),
                format_duration(recorder.duration_seconds())
            );
            println!("{}", saved.path.display());
        }
        StopOutcome::Pending { file_name } => info!("Recording {} left pending", file_name),
        StopOutcome::AlreadyIdle => warn!("Recording ended before the requested time"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("screen_recorder=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;
    info!("Screen Recorder v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Record {
            seconds,
            mode,
            region,
            output,
        } => {
            let mode = match (mode, region) {
                (ModeArg::Fullscreen, _) => CaptureMode::Fullscreen,
                (ModeArg::Window, _) => CaptureMode::Window,
                (ModeArg::Region, Some(region)) => CaptureMode::Region(region),
                (ModeArg::Region, None) => anyhow::bail!("--mode region requires --region X,Y,WIDTH,HEIGHT"),
            };
            record(cfg, seconds, mode, output).await
        }
    }
}
