use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;
use voxloop_session::{FileHistory, HistorySink, MemoryHistory, SessionController};

#[derive(Parser)]
#[command(name = "voxloop", about = "Real-time voice conversations with a live model")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "voxloop.toml")]
    config: PathBuf,

    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_devices {
        let (inputs, outputs) =
            voxloop_audio::device::device_names().context("failed to enumerate audio devices")?;
        println!("Input devices:");
        for name in &inputs {
            println!("  - {}", name);
        }
        println!("Output devices:");
        for name in &outputs {
            println!("  - {}", name);
        }
        return Ok(());
    }

    let config = voxloop_core::AppConfig::load_from_file(&cli.config)
        .with_context(|| format!("failed to load config from {:?}", cli.config))?;

    let env_filter =
        EnvFilter::try_new(&config.general.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false),
    );

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    tracing::info!("voxloop starting");

    let history: Arc<dyn HistorySink> = match config.history {
        Some(ref history_config) => {
            tracing::info!("writing conversation history to {}", history_config.path);
            Arc::new(FileHistory::new(&history_config.path))
        }
        None => Arc::new(MemoryHistory::new()),
    };

    // Ctrl-C requests a stop; the controller owns the actual teardown.
    // main holds a sender for the whole run so a failed signal hook
    // cannot close the channel and stop the session on its own
    let (stop_tx, mut stop_rx) = tokio::sync::mpsc::unbounded_channel();
    let _stop_guard = stop_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = stop_tx.send(());
            }
            Err(e) => tracing::warn!("ctrl-c handler unavailable: {}", e),
        }
    });

    let mut controller = SessionController::new(config, history);
    let state = controller
        .run(&mut stop_rx)
        .await
        .context("session failed")?;

    tracing::info!(?state, "session ended");
    Ok(())
}
