use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use rfspikecore::acquisition::Gain;
use rfspikecore::ShutdownSignal;
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::{Overrides, ScannerConfig, SourceKind};
use workflow::runner::Runner;

mod dashboard;
mod device;
mod generator;
mod location;
mod sinks;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Real-time RF spike scanner")]
struct Args {
    /// Load the scanner config from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Sample source
    #[arg(long, value_enum)]
    source: Option<SourceKind>,
    /// Replay a `.cu8` capture instead of a live device
    #[arg(long)]
    input: Option<PathBuf>,
    /// Centre frequency in Hz
    #[arg(long)]
    center_freq: Option<f64>,
    /// Sample rate in samples per second
    #[arg(long)]
    sample_rate: Option<f64>,
    /// Tuner gain in dB, or `auto`
    #[arg(long)]
    gain: Option<Gain>,
    /// Spike threshold in dB
    #[arg(long, allow_hyphen_values = true)]
    threshold: Option<f32>,
    /// Stop after this many acquisition cycles
    #[arg(long)]
    max_cycles: Option<u64>,
    /// Folder for the log, snapshots and markers
    #[arg(long)]
    detections_dir: Option<PathBuf>,
    /// Serve the dashboard while scanning
    #[arg(long, default_value_t = false)]
    serve: bool,
    /// Print the effective config as YAML and exit
    #[arg(long, default_value_t = false)]
    print_config: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            source: self.source,
            input: self.input.clone(),
            center_freq_hz: self.center_freq,
            sample_rate_hz: self.sample_rate,
            gain: self.gain,
            threshold_db: self.threshold,
            max_cycles: self.max_cycles,
            detections_dir: self.detections_dir.clone(),
            dashboard: self.serve,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ScannerConfig::load(path)?,
        None => ScannerConfig::default(),
    };
    config.apply(args.overrides());

    if args.print_config {
        print!(
            "{}",
            serde_yaml::to_string(&config).context("encoding config")?
        );
        return Ok(());
    }

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .thread_name("rfspike-worker")
        .build()
        .context("creating runtime for sink dispatch")?;

    let shutdown = ShutdownSignal::new();
    let signal_flag = shutdown.clone();
    runtime.spawn(async move {
        if signal::ctrl_c().await.is_err() {
            warn!("cannot listen for Ctrl+C; stop the scanner with a cycle limit instead");
            return;
        }
        info!("Ctrl+C received, finishing the current cycle (press again to force exit)");
        signal_flag.trigger();
        if signal::ctrl_c().await.is_ok() {
            warn!("second Ctrl+C, exiting without draining");
            std::process::exit(130);
        }
    });

    let drain_grace = config.dispatch.drain_grace;
    let runner = Runner::new(config);
    let result = runner.execute(runtime.handle(), shutdown);
    runtime.shutdown_timeout(drain_grace);

    let summary = result?;
    info!(
        "stopped ({:?}): {} cycles, {} detections, {} sink deliveries, {} failures, {} abandoned",
        summary.stop_reason,
        summary.metrics.cycles,
        summary.metrics.detections,
        summary.metrics.sink_deliveries,
        summary.metrics.sink_failures,
        summary.drain.abandoned
    );
    Ok(())
}
