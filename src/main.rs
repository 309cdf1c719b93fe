use anyhow::{Context, Result};
use capture_session::session::{format_duration, format_size};
use capture_session::{
    create_router, AppState, AudioSourceMode, Config, SessionController, SyntheticDevices,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "capture-session")]
#[command(about = "Audio capture session manager")]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/capture-session")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP control API
    Serve,

    /// Record a single session and print its statistics
    Record {
        /// Audio source
        #[arg(short, long, value_enum, default_value = "microphone")]
        mode: ModeArg,

        /// Recording length in seconds
        #[arg(short, long, default_value = "6")]
        seconds: u64,

        /// Write the recording to this WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Microphone,
    SharedTab,
}

impl From<ModeArg> for AudioSourceMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Microphone => AudioSourceMode::Microphone,
            ModeArg::SharedTab => AudioSourceMode::SharedTab,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let devices = Arc::new(SyntheticDevices::new(cfg.devices.synthetic_config()));
    let controller = Arc::new(SessionController::new(devices, cfg.capture.clone()));

    match cli.command {
        Command::Serve => serve(&cfg, controller).await,
        Command::Record {
            mode,
            seconds,
            output,
        } => record(&controller, mode.into(), seconds, output).await,
    }
}

async fn serve(cfg: &Config, controller: Arc<SessionController>) -> Result<()> {
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    let router = create_router(AppState::new(Arc::clone(&controller)));
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;

    controller.shutdown().await;
    Ok(())
}

async fn record(
    controller: &SessionController,
    mode: AudioSourceMode,
    seconds: u64,
    output: Option<PathBuf>,
) -> Result<()> {
    controller.start(mode).await?;

    if let Some(warning) = controller.stats().warning {
        println!("Warning: {}", warning);
    }

    println!("Recording {} for {}s...", mode, seconds);
    tokio::time::sleep(Duration::from_secs(seconds)).await;

    let artifact = controller
        .stop()
        .await?
        .context("Session ended before it was stopped")?;

    let stats = controller.stats();
    for line in stats.chunk_log() {
        println!("{}", line);
    }
    println!("Total Size: {}", format_size(artifact.total_bytes));
    println!("Recording Time: {}", format_duration(artifact.duration_ms));
    println!("Chunks Received: {}", artifact.chunk_count());

    if let Some(path) = output {
        artifact.write_wav(&path)?;
        println!("Saved to {}", path.display());
    }

    Ok(())
}
