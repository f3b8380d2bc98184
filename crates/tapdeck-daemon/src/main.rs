//! Tapdeck daemon binary
//!
//! Binds RFID tags and buttons to media playback actions.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tapdeck_daemon::{
    api::{router, TapdeckService},
    config::TapdeckConfig,
    domain::{
        dispatch::{run_button_worker, run_tag_worker, Dispatcher},
        execute::ActionContext,
        latest::LatestCell,
    },
    infra::{
        feedback::{CommandFeedback, CommandSystemControl, FeedbackPlayer, SilentFeedback},
        hardware::{LineButtonSource, LineTagReader, TagReader},
        mopidy::MopidyPlayback,
        registry::{JsonFileSnapshot, Registry},
    },
    VERSION,
};
use tapdeck_common::ActionKind;

/// Time blocked reads get to finish once the daemon has stopped
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(name = "tapdeck", version, about = "RFID tag and button bindings for media playback")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Run the daemon (default)
    Serve,
    /// Print every registered tag
    List,
    /// Print the available action kinds
    Actions,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // stdin reads cannot be cancelled, so the runtime is shut down with a
    // bounded wait instead of being dropped
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("could not start async runtime")?;
    let result = runtime.block_on(run(cli));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Command::Serve) {
        Command::Actions => {
            for kind in ActionKind::ALL {
                println!("{:<18} {}", kind.name(), kind.description());
            }
            Ok(())
        }
        Command::List => {
            let config = TapdeckConfig::load(cli.config.as_deref())?;
            let registry = open_registry(&config.registry.path)?;
            let service = TapdeckService::new(Arc::new(registry), Arc::new(LatestCell::new()));
            for binding in service.list_bindings() {
                println!("{binding}");
            }
            Ok(())
        }
        Command::Serve => {
            let config = TapdeckConfig::load(cli.config.as_deref())?;
            serve(config).await
        }
    }
}

fn open_registry(path: &Path) -> Result<Registry> {
    Registry::open(JsonFileSnapshot::new(path))
        .with_context(|| format!("refusing to start with an unreadable registry at {}", path.display()))
}

async fn open_tag_reader(source: &str) -> Result<Box<dyn TagReader>> {
    if source == "stdin" {
        let reader = LineTagReader::new(BufReader::new(tokio::io::stdin()), "stdin");
        return Ok(Box::new(reader));
    }
    let file = tokio::fs::File::open(source)
        .await
        .with_context(|| format!("could not open tag reader {source}"))?;
    Ok(Box::new(LineTagReader::new(BufReader::new(file), source)))
}

async fn serve(config: TapdeckConfig) -> Result<()> {
    info!("Starting Tapdeck v{}", VERSION);
    info!("Loaded configuration: {:?}", config);

    let registry = Arc::new(open_registry(&config.registry.path)?);
    let latest = Arc::new(LatestCell::new());

    let playback = Arc::new(
        MopidyPlayback::new(&config.playback.rpc_url, config.playback.timeout())
            .context("could not create playback client")?,
    );
    info!(url = %playback.rpc_url(), "Playback backend configured");
    let system = Arc::new(CommandSystemControl::new(
        config.system.shutdown_command.clone(),
    ));
    let feedback: Arc<dyn FeedbackPlayer> = match config
        .feedback
        .enabled
        .then(|| CommandFeedback::new(&config.feedback.player, &config.feedback.sounds_dir))
        .flatten()
    {
        Some(player) => Arc::new(player),
        None => Arc::new(SilentFeedback),
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    let dispatcher = Arc::new(
        Dispatcher::new(
            registry.clone(),
            latest.clone(),
            ActionContext::new(playback, system),
            feedback,
        )
        .with_stop(stop_tx),
    );

    let mut workers = Vec::new();

    if config.reader.enabled {
        let reader = open_tag_reader(&config.reader.source).await?;
        info!(source = %config.reader.source, "Tag reader claimed");
        workers.push(tokio::spawn(run_tag_worker(
            reader,
            dispatcher.clone(),
            config.reader.debounce(),
            stop_rx.clone(),
        )));
    } else {
        warn!("Tag reader disabled");
    }

    if let Some(path) = &config.buttons.source {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("could not open button source {}", path.display()))?;
        let source = LineButtonSource::new(BufReader::new(file), path.display().to_string());
        workers.push(tokio::spawn(run_button_worker(
            source,
            config.buttons.actions()?,
            dispatcher.clone(),
            config.buttons.debounce(),
            stop_rx.clone(),
        )));
    }

    let service = TapdeckService::new(registry, latest).with_dispatcher(dispatcher.clone());
    let addr = config.http_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("could not bind {addr}"))?;
    info!("REST API listening on {}", addr);

    axum::serve(listener, router(service, config.http.static_dir.as_deref()))
        .with_graceful_shutdown(shutdown_signal(stop_rx))
        .await?;

    info!("Stopping input workers");
    dispatcher.request_stop();
    for worker in workers {
        if let Err(e) = worker.await {
            error!(error = %e, "Input worker panicked");
        }
    }

    info!("Tapdeck stopped");
    Ok(())
}

/// Resolves on Ctrl-C, SIGTERM or once the dispatcher asks to stop
async fn shutdown_signal(mut stop: watch::Receiver<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let requested = async move {
        while !*stop.borrow_and_update() {
            if stop.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received shutdown signal"),
        _ = terminate => info!("Received shutdown signal"),
        _ = requested => info!("Stop requested by dispatcher"),
    }
}
