use anyhow::Context;
use bridge::model::EstimateModel;
use bridge::server::EstimateBridge;
use clap::Parser;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod bridge;
mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Synthetic dual-channel direction-finding driver")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Antenna spacing in meters
    #[arg(long, default_value_t = 0.15)]
    spacing: f64,
    /// Carrier frequency in Hz
    #[arg(long, default_value_t = 1.0e9)]
    frequency: f64,
    /// Number of aligned pairs to estimate
    #[arg(long, default_value_t = 64)]
    pairs: usize,
    /// Bearing of the synthetic emitter in degrees
    #[arg(long, default_value_t = 20.0, allow_hyphen_values = true)]
    angle: f64,
    /// Drain a monitor source through an auxiliary tap
    #[arg(long, default_value_t = false)]
    monitor: bool,
    /// Append a JSON summary line to this file
    #[arg(long)]
    report: Option<PathBuf>,
    /// Keep the estimate bridge alive on this address until Ctrl+C
    #[arg(long)]
    serve: Option<SocketAddr>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(
            args.spacing,
            args.frequency,
            args.pairs,
            args.angle,
            args.monitor,
        )?
    };

    let runner = Runner::new(workflow_config);
    let bridge = EstimateBridge::new();
    let result = runner.execute().context("running direction-finding workflow")?;

    println!(
        "Estimates {} (undefined {}), mean bearing {}, mismatched pairs {}",
        result.estimates.len(),
        result.undefined_count(),
        result
            .mean_degrees()
            .map(|deg| format!("{:.2} deg", deg))
            .unwrap_or_else(|| "n/a".to_string()),
        result.mismatches
    );
    if let Some(tap) = result.tap {
        println!(
            "Monitor tap forwarded {}, dropped {}, errors {}",
            tap.forwarded, tap.dropped, tap.errors
        );
    }
    if let Some(monitor) = result.monitor {
        println!(
            "Monitor drained {} packets, mean power {:.4}, {} Hz at {} S/s",
            monitor.packets, monitor.mean_power, monitor.frequency, monitor.sample_rate
        );
    }

    let model = EstimateModel::from(&result);
    bridge.publish(&model);

    if let Some(report_path) = args.report {
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(&model).context("serializing estimate report")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&report_path)
            .with_context(|| format!("opening report {}", report_path.display()))?;
        writeln!(file, "{}", line)?;
    }

    if let Some(address) = args.serve {
        let (local, _bridge_thread) = bridge
            .serve(address)
            .with_context(|| format!("starting estimate bridge on {}", address))?;
        bridge.publish_status(&format!(
            "HTTP bridge running on http://{}/estimate (Ctrl+C to stop)...",
            local
        ));
        let runtime = TokioBuilder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for signal handling")?;
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}
