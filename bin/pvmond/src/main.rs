//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the pvmon daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use pvmon_common::{init_tracing, AppConfig};
use pvmon_core::Pipeline;
use pvmon_metrics::{MetricsSink, RetryingSink, StdoutSink, VictoriaMetricsSink};
use pvmon_rt::{shutdown_channel, RetryPolicy, ShutdownTrigger, WallClockTicker};
use pvmon_sim::StaticModuleCatalog;
use pvmon_source::{ReplaySource, TimeSeriesSource};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("pvmon ", env!("CARGO_PKG_VERSION")),
    about = "PV plant performance monitor",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Print metric lines to stdout instead of pushing them")]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run backfill and the realtime loop until interrupted")]
    Run,
    #[command(about = "Fit the derate factor and print the fit report")]
    Calibrate {
        #[arg(long, value_name = "RFC3339", help = "End of the lookback window (defaults to now)")]
        at: Option<DateTime<Utc>>,
    },
    #[command(about = "Run a single backfill pass and exit")]
    Backfill {
        #[arg(long, value_name = "RFC3339", help = "End of the backfill horizon (defaults to now)")]
        at: Option<DateTime<Utc>>,
    },
    #[command(about = "Validate the configuration and exit")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let candidates = [
        PathBuf::from("configs/pvmon.toml"),
        PathBuf::from("configs/example.toml"),
    ];
    let loaded = AppConfig::load_explicit_or(cli.config.as_deref(), &candidates)?;
    let config = Arc::new(loaded.config);
    let command = cli.command.unwrap_or(Commands::Run);

    if let Commands::CheckConfig = command {
        println!(
            "{}: ok (plant {}, module {}, {} inverters, source {})",
            loaded.source.display(),
            config.plant.name,
            config.plant.module,
            config.plant.inverters,
            config.source.path.display()
        );
        return Ok(());
    }

    init_tracing("pvmond", &config.logging)?;
    info!(config_path = %loaded.source.display(), dry_run = cli.dry_run, "configuration loaded");

    let (trigger, _listener) = shutdown_channel();
    let source: Arc<dyn TimeSeriesSource> = Arc::new(
        ReplaySource::from_config(&config.source)
            .with_context(|| format!("unable to load {}", config.source.path.display()))?,
    );
    let catalog = StaticModuleCatalog::with_entries(&config.modules);
    if !catalog.contains(&config.plant.module) {
        warn!(module = %config.plant.module, "module not in catalog; lookups fall back to the default entry");
    }
    let sink = build_sink(&config, cli.dry_run, &trigger)?;
    let pipeline = Pipeline::new(config.clone(), source, sink, Arc::new(catalog));

    match command {
        Commands::Run => run_daemon(pipeline, trigger).await?,
        Commands::Calibrate { at } => {
            let calibration = pipeline.calibrate(at.unwrap_or_else(Utc::now))?;
            println!("{}", serde_json::to_string_pretty(&calibration)?);
        }
        Commands::Backfill { at } => {
            let now = at.unwrap_or_else(Utc::now);
            let shutdown = trigger.subscribe();
            let backfill = pipeline.run_backfill(now, &shutdown);
            tokio::pin!(backfill);
            let report = tokio::select! {
                report = &mut backfill => report,
                _ = shutdown_signal() => {
                    info!("termination signal received; stopping backfill");
                    trigger.trigger();
                    backfill.await
                }
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::CheckConfig => {}
    }
    Ok(())
}

fn build_sink(
    config: &AppConfig,
    dry_run: bool,
    trigger: &ShutdownTrigger,
) -> Result<Arc<dyn MetricsSink>> {
    if dry_run {
        info!("dry run; metric lines go to stdout");
        return Ok(Arc::new(StdoutSink));
    }
    let victoria = VictoriaMetricsSink::from_config(&config.metrics)
        .with_context(|| format!("unable to build sink for {}", config.metrics.endpoint))?;
    info!(endpoint = %victoria.endpoint(), "pushing metrics");
    Ok(Arc::new(RetryingSink::new(
        victoria,
        RetryPolicy::from_config(&config.metrics),
        trigger.subscribe(),
    )))
}

async fn run_daemon(pipeline: Pipeline, trigger: ShutdownTrigger) -> Result<()> {
    let step = pipeline.step();
    let handle = pipeline.start(Utc::now(), WallClockTicker::new(step), trigger);

    info!(derate = handle.derate(), "daemon running; waiting for termination signal");
    shutdown_signal().await;
    info!("termination signal received; shutting down");
    let report = handle.shutdown().await?;
    info!(
        realtime_ticks = report.realtime.ticks,
        real_kwh = report.realtime.energy.real_kwh,
        "shutdown complete"
    );
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = ctrl_c() => {}
        _ = terminate() => {}
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => {
            warn!(?err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
