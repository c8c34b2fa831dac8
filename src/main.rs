use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use savepoint::cli::{default_log_directive, Cli};
use savepoint::report;
use savepoint::transfer::Direction;
use savepoint::{CancellationToken, Config, S3Store, SyncEngine, SyncError, SyncOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let debug = cli.debug_enabled();
    let progress = cli.shows_progress(debug);
    init_tracing(default_log_directive(debug, progress));

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    tracing::info!("config loaded with {} games", config.games.len());

    match cli.command.transfer() {
        None => {
            report::print_games(&config);
            Ok(())
        }
        Some((direction, selector)) => {
            run_transfer(&cli, &config, direction, selector, progress).await
        }
    }
}

fn init_tracing(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_transfer(
    cli: &Cli,
    config: &Config,
    direction: Direction,
    selector: &str,
    progress: bool,
) -> Result<()> {
    let game = config.game(selector)?;
    if !game.matches_current_platform() {
        tracing::warn!(
            "{} is configured for {}, running on {}",
            game.identity,
            game.platform,
            std::env::consts::OS
        );
    }

    let store = S3Store::from_config(&config.bucket).context("Failed to create store client")?;
    let mut engine = SyncEngine::with_options(
        Arc::new(store),
        SyncOptions {
            workers: cli.workers,
            ..SyncOptions::default()
        },
    );

    let bar = if progress {
        let (bar, callback) = report::progress_bar(direction);
        engine = engine.with_progress(callback);
        Some(bar)
    } else {
        None
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing in-flight transfers");
            on_signal.cancel();
        }
    });

    let result = match direction {
        Direction::Upload => engine.upload(&game, &cancel).await,
        Direction::Download => engine.download(&game, &cancel).await,
    };

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    match result {
        Ok(stats) => {
            report::print_summary(direction, &game, &stats);
            Ok(())
        }
        Err(SyncError::Aggregate(agg)) => {
            report::print_summary(direction, &game, agg.stats());
            anyhow::bail!(
                "{} of {} files failed to {}",
                agg.failures().len(),
                agg.stats().jobs(),
                direction
            )
        }
        Err(fatal) => Err(fatal).with_context(|| format!("{} of {} failed", direction, game.identity)),
    }
}
