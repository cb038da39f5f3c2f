use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use testflux::config::Config;
use testflux::pipeline::CollectionPipeline;
use testflux::runtime::TrackedRuntime;
use testflux::sink::{InfluxSink, MetricsSink, RecordingSink};
use testflux::workload::Workload;

/// Synthetic load driver streaming JMeter-style metrics to InfluxDB 2.x.
#[derive(Parser)]
#[command(name = "testflux", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the load test and stream metrics (default).
    Run,

    /// Print version information and exit.
    Version,
}

/// Build-time version info, injected via RUSTFLAGS or build env.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Target OS.
    pub fn target_os() -> &'static str {
        std::env::consts::OS
    }

    /// Target architecture.
    pub fn target_arch() -> &'static str {
        std::env::consts::ARCH
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            target_os(),
            target_arch(),
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Some(Command::Version) = &cli.command {
        println!("testflux {}", version::full());
        return Ok(());
    }

    // Initialize tracing. RUST_LOG wins over --log-level when set.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    // Config is required for a run.
    let config_path = cli
        .config
        .context("--config is required (use --help for usage)")?;

    let cfg = Config::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting testflux",
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async { run(cfg).await })
}

async fn run(cfg: Config) -> Result<()> {
    let runtime = Arc::new(TrackedRuntime::new());

    if cfg.influxdb.enabled {
        let sink = Arc::new(InfluxSink::new(cfg.influxdb.clone())?);
        drive(cfg, sink, runtime).await
    } else {
        info!("influxdb delivery disabled, recording points in memory");
        let sink = Arc::new(RecordingSink::new());
        drive(cfg, Arc::clone(&sink), runtime).await?;

        info!(
            points = sink.points().len(),
            flushes = sink.flush_count(),
            "dry run complete, nothing delivered",
        );
        Ok(())
    }
}

async fn drive<S: MetricsSink>(
    cfg: Config,
    sink: Arc<S>,
    runtime: Arc<TrackedRuntime>,
) -> Result<()> {
    info!(sink = sink.name(), "starting metrics pipeline");

    let mut pipeline = CollectionPipeline::new(
        cfg.pipeline,
        cfg.influxdb.flush_interval,
        Arc::clone(&sink),
        Arc::clone(&runtime),
    );
    pipeline.start().await?;
    let pipeline = Arc::new(pipeline);

    let workload = Workload::new(cfg.workload, Arc::clone(&pipeline), runtime);

    tokio::select! {
        _ = workload.run() => {
            info!("workload finished, stopping");
        }
        _ = shutdown_signal() => {}
    }

    // Graceful shutdown: final ticks, finished marker, sink close.
    pipeline.stop().await?;

    info!("testflux stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
    }
}
