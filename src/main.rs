use anyhow::Result;
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinSet};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yt2samp::{utils, Cli, Commands, Config, ConversionOutcome, ConversionPipeline, SourceUrl};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    if let Commands::Formats = cli.command {
        println!("Accepted YouTube links:");
        for shape in SourceUrl::accepted_shapes() {
            println!("  • {}", shape);
        }
        return Ok(());
    }

    let config = Config::load().await?;

    match cli.command {
        Commands::Convert { url, user } => {
            warn_missing_dependencies(&config).await;
            utils::ensure_temp_dir(&config.extraction.temp_dir)?;

            let pipeline = ConversionPipeline::new(&config)?;

            let progress = if cli.quiet {
                ProgressBar::hidden()
            } else {
                let progress = ProgressBar::new_spinner();
                progress.set_style(
                    ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
                );
                progress.enable_steady_tick(Duration::from_millis(120));
                progress
            };
            progress.set_message("Downloading and uploading audio...");

            let result = pipeline.process(&url, &user).await;
            progress.finish_and_clear();

            match result {
                Ok(outcome) => print_outcome(&outcome),
                Err(e) => {
                    eprintln!("{} {}", style("✗").red().bold(), e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Serve => {
            warn_missing_dependencies(&config).await;
            utils::ensure_temp_dir(&config.extraction.temp_dir)?;
            serve(config).await?;
        }
        Commands::Sweep { max_age_secs } => {
            let max_age = max_age_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.cleanup.max_age());
            let removed = utils::cleanup_old_files(&config.extraction.temp_dir, max_age)?;
            println!(
                "Removed {} file(s) older than {}s from {}",
                removed,
                max_age.as_secs(),
                config.extraction.temp_dir.display()
            );
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                config.save().await?;
                println!("Configuration written to: {}", Config::config_path()?.display());
            }
        }
        Commands::Formats => {}
    }

    Ok(())
}

fn init_tracing(verbose: bool, json_logs: bool) {
    let default_filter = if verbose { "yt2samp=debug" } else { "yt2samp=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    // Logs go to stderr so stdout stays free for results
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn warn_missing_dependencies(config: &Config) {
    let missing = utils::check_dependencies(&config.extraction.yt_dlp_path).await;
    if !missing.is_empty() {
        eprintln!("{}", style("⚠️  Dependency check warnings:").yellow());
        for dep in missing {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }
}

/// The boombox cannot stream over TLS
fn game_link(link: &str) -> String {
    match link.strip_prefix("https://") {
        Some(rest) => format!("http://{}", rest),
        None => link.to_string(),
    }
}

fn print_outcome(outcome: &ConversionOutcome) {
    println!("{} {}", style("✓").green().bold(), style(&outcome.title).bold());
    println!("  Duration: {}", outcome.duration);
    println!("  Link:     {}", style(game_link(&outcome.direct_link)).cyan());
    println!("  Page:     {}", outcome.page_link);
    println!("  Source:   {}", outcome.source_url);
}

fn reply(line: serde_json::Value) {
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", line).and_then(|_| stdout.flush()) {
        tracing::warn!(error = %e, "Failed to write reply");
    }
}

async fn serve(config: Config) -> Result<()> {
    let pipeline = Arc::new(ConversionPipeline::new(&config)?);
    let temp_dir = config.extraction.temp_dir.clone();
    let max_age = config.cleanup.max_age();

    let mut sweep = tokio::time::interval(config.cleanup.interval());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut requests = JoinSet::new();

    tracing::info!("Serving requests from stdin");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!(pending = requests.len(), "stdin closed, finishing pending requests");
                    while let Some(joined) = requests.join_next().await {
                        log_join_error(joined);
                    }
                    break;
                };
                let Some((user, url)) = parse_request(&line) else {
                    if !line.trim().is_empty() {
                        reply(json!({ "ok": false, "error": "expected `<user-id> <url>`" }));
                    }
                    continue;
                };

                requests.spawn(handle_request(Arc::clone(&pipeline), user, url));
            }
            Some(joined) = requests.join_next(), if !requests.is_empty() => {
                log_join_error(joined);
            }
            _ = sweep.tick() => {
                let dir = temp_dir.clone();
                let swept = tokio::task::spawn_blocking(move || utils::cleanup_old_files(&dir, max_age)).await;
                match swept {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "Temp sweep failed"),
                    Err(e) => tracing::warn!(error = %e, "Temp sweep task failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if !requests.is_empty() {
                    tracing::warn!(dropped = requests.len(), "Interrupted, abandoning in-flight requests");
                }
                requests.shutdown().await;
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_request(pipeline: Arc<ConversionPipeline>, user: String, url: String) {
    match pipeline.process(&url, &user).await {
        Ok(outcome) => reply(json!({
            "ok": true,
            "user": user,
            "title": outcome.title,
            "duration": outcome.duration,
            "link": game_link(&outcome.direct_link),
            "page": outcome.page_link,
        })),
        Err(e) => {
            tracing::warn!(user = %user, kind = %e.kind(), error = %e, "Request failed");
            reply(json!({
                "ok": false,
                "user": user,
                "kind": e.kind().to_string(),
                "error": e.to_string(),
            }));
        }
    }
}

fn log_join_error(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Request task failed");
    }
}

fn parse_request(line: &str) -> Option<(String, String)> {
    let mut parts = line.split_whitespace();
    let user = parts.next()?;
    let url = parts.next()?;
    Some((user.to_string(), url.to_string()))
}
