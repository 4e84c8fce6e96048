use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use offsync::cli::args::{Cli, Commands, OutputFormat};
use offsync::cli::commands;
use offsync::config::{Config, Paths};
use offsync::core::SystemClock;
use offsync::error::OffsyncError;
use offsync::features::queue::{HttpBackend, HttpProbe, OfflineQueueManager};
use offsync::storage::SqliteStore;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), OffsyncError> {
    let cli = Cli::parse();
    let paths = Paths::resolve(cli.home.clone())?;
    let config = Config::load_from_path(&paths.config_file)?;

    init_logging(cli.verbose, &config.general.log_level);
    config.general.color.apply();
    let format = cli.output.unwrap_or(config.general.default_output);

    let output = match cli.command {
        Commands::Completions { shell } => commands::completions(shell)?,
        Commands::Config { command } => commands::config(&paths, &config, command, format)?,
        command => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run_queue_command(command, &paths, &config, format))?
        },
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

async fn run_queue_command(
    command: Commands,
    paths: &Paths,
    config: &Config,
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    paths.ensure_dirs()?;
    let store = SqliteStore::open_at(&paths.database)?;
    let backend = HttpBackend::from_config(&config.backend)?;
    let manager = OfflineQueueManager::initialize(
        Arc::new(store),
        Arc::new(backend),
        Arc::new(SystemClock),
        config.manager_config(),
        false,
    );

    match command {
        Commands::Enqueue {
            operation,
            entity,
            payload,
        } => commands::enqueue(&manager, operation.into(), &entity, &payload, format),
        Commands::List { exhausted, limit } => commands::list(&manager, exhausted, limit, format),
        Commands::Remove { id } => commands::remove(&manager, &id, format),
        Commands::Clear { force } => commands::clear(&manager, force, format),
        Commands::Status => {
            let probe = HttpProbe::from_config(&config.backend)?;
            commands::status(&manager, &probe, format).await
        },
        Commands::Sync { assume_online } => {
            let probe = HttpProbe::from_config(&config.backend)?;
            commands::sync(&manager, &probe, assume_online, format).await
        },
        Commands::Watch { interval } => {
            let probe = HttpProbe::from_config(&config.backend)?;
            let interval =
                Duration::from_secs(interval.unwrap_or(config.sync.poll_interval_secs).max(1));
            commands::watch(
                &manager,
                &probe,
                interval,
                config.retry_interval(),
                shutdown_signal(),
                format,
            )
            .await
        },
        Commands::Completions { .. } | Commands::Config { .. } => Ok(String::new()),
    }
}

/// `RUST_LOG` wins, then `-v`, then the configured level. Logs go to stderr.
fn init_logging(verbose: u8, configured: &str) {
    let fallback = match verbose {
        0 => configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
