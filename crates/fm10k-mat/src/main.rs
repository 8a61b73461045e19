//! FM10000 MAC table maintenance daemon entry point.
//!
//! Attaches simulated switches and runs the maintenance worker until
//! interrupted. A production build wires platform register access and
//! interrupt plumbing in place of the simulator.

use clap::Parser;
use fm10k_hal::{SimRegisterFile, SwitchId, SystemClock};
use fm10k_mat::{DaemonConfig, MaintDaemon, SimMaintOps};
use log::{debug, error, info, warn};
use std::process::ExitCode;
use std::sync::Arc;

/// FM10000 MAC address table maintenance daemon
#[derive(Parser, Debug)]
#[command(name = "matmaintd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short = 'c', long)]
    config: Option<String>,

    /// Number of simulated switches to attach
    #[arg(short = 's', long, default_value = "1")]
    switches: u8,

    /// Records per update event buffer
    #[arg(short = 'b', long)]
    burst_size: Option<usize>,

    /// Upper bound in milliseconds on the idle wait between passes
    #[arg(long)]
    maint_interval: Option<u64>,

    /// Dynamic entry lifetime in milliseconds (0 disables aging)
    #[arg(long)]
    aging_time: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    info!("====================================================================");
    info!("Starting FM10000 MAC table maintenance daemon");
    info!("====================================================================");

    let mut config = match args.config.as_deref() {
        Some(path) => match DaemonConfig::from_file(path) {
            Ok(config) => {
                info!("Configuration file: {}", path);
                config
            }
            Err(e) => {
                error!("Failed to load {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => DaemonConfig::default(),
    };
    if let Some(burst) = args.burst_size {
        config.mat.burst_size = burst;
    }
    if let Some(interval) = args.maint_interval {
        config.mat.maint_interval_ms = interval;
    }
    if let Some(aging) = args.aging_time {
        config.mat.aging_time_ms = aging;
    }
    if let Err(e) = config.mat.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }
    if args.switches == 0 || args.switches > config.max_switches {
        error!(
            "Switch count must be between 1 and {}",
            config.max_switches
        );
        return ExitCode::FAILURE;
    }

    info!(
        "Table geometry: {} banks x {} bins",
        config.mat.geometry.banks, config.mat.geometry.bins_per_bank
    );
    info!("Aging time: {}ms", config.mat.aging_time_ms);
    info!("Maintenance interval: {}ms", config.mat.maint_interval_ms);
    info!("Update burst size: {}", config.mat.burst_size);
    info!("Simulated switches: {}", args.switches);

    let daemon = Arc::new(MaintDaemon::new(config.clone()));

    // One register file and one ops instance back every simulated switch.
    let regs = Arc::new(SimRegisterFile::new(
        args.switches,
        config.mat.geometry.register_words(),
    ));
    let ops = Arc::new(SimMaintOps::new(regs.clone(), config.mat.geometry));
    let clock = Arc::new(SystemClock);

    for index in 0..args.switches {
        let id = SwitchId::new(index);
        let mut rx = match daemon.attach_switch(
            id,
            config.mat.clone(),
            ops.clone(),
            regs.clone(),
            clock.clone(),
        ) {
            Ok(rx) => rx,
            Err(e) => {
                error!("Failed to attach {}: {}", id, e);
                return ExitCode::FAILURE;
            }
        };
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for record in event.records() {
                    debug!(
                        "{}: {:?}/{:?} {} port {}",
                        event.switch(),
                        record.kind,
                        record.reason,
                        record.entry.key,
                        record.entry.port
                    );
                }
                info!("{}: {} table updates", event.switch(), event.len());
            }
            debug!("update channel closed");
        });
    }

    let worker = {
        let daemon = daemon.clone();
        tokio::spawn(async move { daemon.run().await })
    };

    info!("Maintenance worker running, press Ctrl-C to stop");
    match tokio::signal::ctrl_c().await {
        Ok(()) => warn!("Received SIGINT, shutting down gracefully..."),
        Err(e) => error!("Failed to listen for ctrl-c: {}", e),
    }

    daemon.stop();
    if let Err(e) = worker.await {
        error!("Worker task failed: {}", e);
    }

    for line in daemon.dump().await {
        info!("{}", line);
    }
    info!("====================================================================");
    info!("MAC table maintenance daemon shutdown complete");
    info!("====================================================================");

    ExitCode::SUCCESS
}
