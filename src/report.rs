//! Human-readable output for the command line.

use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Config;
use crate::error::TransferError;
use crate::game::Game;
use crate::transfer::{Direction, ProgressCallback, TransferStats};

/// Binary-unit size, e.g. `1.5 MiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < 5 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!(
        "{:.1} {}iB",
        bytes as f64 / div as f64,
        ['K', 'M', 'G', 'T', 'P', 'E'][exp]
    )
}

pub fn print_games(config: &Config) {
    if config.games.is_empty() {
        println!("No games configured.");
        return;
    }
    for (i, game) in config.games().enumerate() {
        let marker = if game.matches_current_platform() {
            "*".green()
        } else {
            " ".normal()
        };
        println!(
            "{} {:>3}  {}  ({}, {})  {}",
            marker,
            i,
            game.identity.name().bold(),
            game.identity.slug(),
            game.platform,
            game.save_root().display()
        );
    }
}

/// Spinner that shows running totals, fed by the aggregator.
pub fn progress_bar(direction: Direction) -> (ProgressBar, ProgressCallback) {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_prefix(match direction {
        Direction::Upload => "Uploading",
        Direction::Download => "Downloading",
    });
    bar.enable_steady_tick(Duration::from_millis(120));

    let handle = bar.clone();
    let callback: ProgressCallback = std::sync::Arc::new(move |stats: &TransferStats| {
        handle.set_message(progress_message(stats));
    });
    (bar, callback)
}

fn progress_message(stats: &TransferStats) -> String {
    if stats.failures.is_empty() {
        format!(
            "{} files, {}",
            stats.success_count,
            format_bytes(stats.total_bytes)
        )
    } else {
        format!(
            "{} files, {}, {} failed",
            stats.success_count,
            format_bytes(stats.total_bytes),
            stats.failures.len()
        )
    }
}

pub fn print_summary(direction: Direction, game: &Game, stats: &TransferStats) {
    let verb = match direction {
        Direction::Upload => "Uploaded",
        Direction::Download => "Downloaded",
    };
    let headline = format!("{} {}", verb, game.identity.name());
    if stats.is_success() {
        println!("{}", headline.green().bold());
    } else {
        println!("{}", headline.yellow().bold());
    }
    if stats.cancelled {
        println!("{}", "Run was cancelled before all files were attempted.".yellow());
    }

    println!("  Successful:       {} files", stats.success_count);
    println!(
        "  Bytes transferred: {}",
        format_bytes(stats.total_bytes)
    );
    println!("  Took:             {:.2}s", stats.duration.as_secs_f64());
    println!(
        "  Average speed:    {}/s",
        format_bytes(stats.bytes_per_second())
    );

    if !stats.failures.is_empty() {
        print_failures(&stats.failures);
    }
}

fn print_failures(failures: &[TransferError]) {
    println!("  {}:", format!("Failed ({})", failures.len()).red().bold());
    for failure in failures {
        println!("    {} {}", "-".red(), failure);
    }
}
