//! hmx - Main entry point
//!
//! Command-line front end for the analysis coordinator: analyze sources,
//! plan a mix from them, or rank candidates against a target. Results go to
//! stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hmx_common::config::{load_config, resolve_config_path, TomlConfig};
use hmx_common::AnalysisResult;
use hmx_engine::harmonic::{plan_set, recommend};
use hmx_engine::{AnalyzeOptions, CoordinatorConfig, HttpAnalysisProvider, RequestCoordinator};
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Command-line arguments for hmx
#[derive(Parser, Debug)]
#[command(name = "hmx")]
#[command(about = "Track analysis and harmonic mixing")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Analysis service base URL
    #[arg(long, global = true, env = "HMX_PROVIDER_URL")]
    provider_url: Option<String>,

    /// Ignore cached results (fresh results are still cached)
    #[arg(long, global = true)]
    force_refresh: bool,

    /// Make a single attempt per source
    #[arg(long, global = true)]
    no_retry: bool,

    /// Per-attempt timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Persist the analysis cache to this JSON file
    #[arg(long, global = true, env = "HMX_CACHE_FILE")]
    cache_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze sources and print each result
    Analyze {
        #[arg(required = true)]
        sources: Vec<String>,
    },
    /// Analyze sources and print a sequenced set
    Mix {
        #[arg(required = true)]
        sources: Vec<String>,
    },
    /// Rank candidate sources by compatibility with a target
    Recommend {
        target: String,
        #[arg(required = true)]
        candidates: Vec<String>,
        /// Maximum recommendations to print
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceReport {
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs on stderr so stdout stays machine-readable. Installed before config
    // loading so its warnings are visible; the level is refined afterwards.
    let rust_log_set = std::env::var_os("RUST_LOG").is_some();
    let (filter, filter_handle) = reload::Layer::new(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| crate_filter(&bootstrap_log_level())),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = resolve_config_path(args.config.as_deref());
    let mut config = load_config(config_path.as_deref());
    apply_cli_overrides(&mut config, &args);

    if !rust_log_set {
        if let Err(e) = filter_handle.reload(crate_filter(&config.logging.level)) {
            warn!(error = %e, "Failed to apply configured log level");
        }
    }

    info!(provider = %config.provider.base_url, "Starting hmx");

    let provider = HttpAnalysisProvider::new(&config.provider)
        .context("Failed to initialize analysis provider")?;
    let coordinator = RequestCoordinator::new(
        Arc::new(provider),
        CoordinatorConfig::from(&config.analysis),
    );

    match coordinator.load_persisted().await {
        Ok(0) => {}
        Ok(restored) => info!(restored, "Loaded cached analyses"),
        Err(e) => warn!(error = %e, "Ignoring unreadable cache file, starting empty"),
    }

    let options = AnalyzeOptions {
        force_refresh: args.force_refresh,
        retry: args.no_retry.then_some(false),
        ..AnalyzeOptions::default()
    };

    tokio::select! {
        result = run(&coordinator, args.command, options) => result?,
        _ = shutdown_signal() => {
            let cancelled = coordinator.cancel_all().await;
            warn!(cancelled, "Interrupted, cancelled in-flight requests");
            bail!("interrupted");
        }
    }

    let metrics = coordinator.metrics().await;
    info!(
        attempts = metrics.total_attempts,
        retries = metrics.retries,
        cache_hits = metrics.cache_hits,
        cache_misses = metrics.cache_misses,
        "Done"
    );
    Ok(())
}

/// Level used until the config file has been read
fn bootstrap_log_level() -> String {
    std::env::var("HMX_LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
}

fn crate_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("hmx={0},hmx_engine={0},hmx_common={0}", level))
}

/// CLI flags take priority over environment and TOML
fn apply_cli_overrides(config: &mut TomlConfig, args: &Args) {
    if let Some(url) = &args.provider_url {
        config.provider.base_url = url.clone();
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.analysis.timeout_ms = timeout_ms;
    }
    if let Some(path) = &args.cache_file {
        config.analysis.cache_file = Some(path.clone());
    }
}

async fn run(coordinator: &RequestCoordinator, command: Command, options: AnalyzeOptions) -> Result<()> {
    match command {
        Command::Analyze { sources } => {
            let reports = analyze_reports(coordinator, &sources, options).await;
            let failed = reports.iter().filter(|r| r.error.is_some()).count();
            print_json(&reports)?;
            if failed > 0 {
                bail!("{} of {} sources failed", failed, reports.len());
            }
        }
        Command::Mix { sources } => {
            let tracks = analyze_all(coordinator, &sources, options).await?;
            print_json(&plan_set(&tracks))?;
        }
        Command::Recommend { target, candidates, limit } => {
            let mut sources = Vec::with_capacity(candidates.len() + 1);
            sources.push(target);
            sources.extend(candidates);

            let mut tracks = analyze_all(coordinator, &sources, options).await?;
            let target = tracks.remove(0);
            print_json(&recommend(&target, &tracks, limit))?;
        }
    }
    Ok(())
}

async fn analyze_reports(
    coordinator: &RequestCoordinator,
    sources: &[String],
    options: AnalyzeOptions,
) -> Vec<SourceReport> {
    let outcomes = coordinator.analyze_many(sources, options).await;
    sources
        .iter()
        .zip(outcomes)
        .map(|(source, outcome)| match outcome {
            Ok(analysis) => SourceReport {
                source: source.clone(),
                cached: Some(analysis.is_cached()),
                result: Some(analysis.into_result()),
                error: None,
            },
            Err(e) => SourceReport {
                source: source.clone(),
                result: None,
                cached: None,
                error: Some(e.to_string()),
            },
        })
        .collect()
}

/// Analyze every source; any failure aborts the command
async fn analyze_all(
    coordinator: &RequestCoordinator,
    sources: &[String],
    options: AnalyzeOptions,
) -> Result<Vec<AnalysisResult>> {
    let outcomes = coordinator.analyze_many(sources, options).await;
    sources
        .iter()
        .zip(outcomes)
        .map(|(source, outcome)| {
            outcome
                .map(|analysis| analysis.into_result())
                .with_context(|| format!("Failed to analyze {}", source))
        })
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
