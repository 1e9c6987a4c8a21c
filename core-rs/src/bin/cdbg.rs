//! cdbg - worker supervisor with per-worker inspector ports
//!
//! Command-line interface over the debug port pool

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use cluster_debug::inspect::join_args;
use cluster_debug::{
    logging, resolve_primary_debug_port, ClusterConfig, ClusterDebug, ClusterWorker,
    DebugPortPool, PoolConfig, ProcessCluster, WorkerEnv,
};

const EXIT_POLL: Duration = Duration::from_millis(500);
const RESPAWN_DELAY: Duration = Duration::from_millis(500);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "cdbg")]
#[command(version)]
#[command(about = "Worker supervisor with per-worker inspector ports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the primary debug port and the first worker debug port
    Ports {
        #[command(flatten)]
        inspect: InspectFlags,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Supervise workers, each listening for a debugger on its own port
    Run {
        #[command(flatten)]
        inspect: InspectFlags,
        /// Supervisor configuration file (YAML)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// Number of workers (overrides the config file)
        #[arg(long, short = 'w')]
        workers: Option<usize>,
        /// Restart workers that exit
        #[arg(long)]
        respawn: bool,
        /// Enable verbose logging
        #[arg(long, short = 'v')]
        verbose: bool,
        /// Worker program and its arguments
        #[arg(last = true)]
        command: Vec<String>,
    },
}

/// Inspector flags of the primary process
#[derive(Args, Debug, Default)]
struct InspectFlags {
    /// Primary inspector address
    #[arg(long, value_name = "[HOST:]PORT", num_args = 0..=1, require_equals = true)]
    inspect: Option<Option<String>>,
    /// Primary inspector address, paused on start
    #[arg(long = "inspect-brk", value_name = "[HOST:]PORT", num_args = 0..=1, require_equals = true)]
    inspect_brk: Option<Option<String>>,
    /// Primary inspector port
    #[arg(long = "inspect-port", value_name = "PORT", require_equals = true)]
    inspect_port: Option<String>,
}

impl InspectFlags {
    /// Render the flags back into start-argument form
    fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (flag, value) in [("--inspect", &self.inspect), ("--inspect-brk", &self.inspect_brk)] {
            match value {
                Some(Some(addr)) => args.push(format!("{}={}", flag, addr)),
                Some(None) => args.push(flag.to_string()),
                None => {}
            }
        }
        if let Some(port) = &self.inspect_port {
            args.push(format!("--inspect-port={}", port));
        }
        args
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PortsReport {
    primary_port: u16,
    worker_base_port: u16,
    from_override: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ports { inspect, format } => handle_ports(&inspect, format),
        Commands::Run {
            inspect,
            config,
            workers,
            respawn,
            verbose,
            command,
        } => {
            logging::init(verbose);
            let config = build_config(config, workers, respawn, command)?;
            handle_run(&inspect, config)
        }
    }
}

fn handle_ports(inspect: &InspectFlags, format: OutputFormat) -> anyhow::Result<()> {
    let pool_config = PoolConfig::from_env().with_primary_args(inspect.to_args());
    let pool = DebugPortPool::from_config(&pool_config)?;

    let report = PortsReport {
        primary_port: resolve_primary_debug_port(&join_args(&pool_config.primary_args)),
        worker_base_port: pool.base_port(),
        from_override: pool_config
            .worker_port_override
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty()),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("Primary debug port: {}", report.primary_port);
            println!(
                "Worker base port:   {}{}",
                report.worker_base_port,
                if report.from_override { " (override)" } else { "" }
            );
        }
    }

    Ok(())
}

/// Merge the config file with command-line settings
fn build_config(
    path: Option<PathBuf>,
    workers: Option<usize>,
    respawn: bool,
    command: Vec<String>,
) -> anyhow::Result<ClusterConfig> {
    let mut config = match &path {
        Some(path) => ClusterConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClusterConfig::new(String::new()),
    };

    if let Some((program, args)) = command.split_first() {
        config.program = program.clone();
        config.args = args.to_vec();
    }
    if config.program.is_empty() {
        return Err(anyhow!(
            "no worker program: pass one after `--` or set `program` in --config"
        ));
    }
    if let Some(workers) = workers {
        config.workers = workers;
    }
    config.respawn |= respawn;

    config.validate()?;
    Ok(config)
}

fn handle_run(inspect: &InspectFlags, config: ClusterConfig) -> anyhow::Result<()> {
    let pool_config = config.apply_to(PoolConfig::from_env().with_primary_args(inspect.to_args()));
    let pool = DebugPortPool::from_config(&pool_config)?;

    info!(
        program = %config.program,
        workers = config.workers,
        base_port = pool.base_port(),
        "starting cluster"
    );

    let mut binder = ClusterDebug::new(ProcessCluster::from_config(&config), pool);
    binder.subscribe();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    })?;

    for _ in 0..config.workers {
        if let Err(e) = binder.fork(&WorkerEnv::new()) {
            binder.cluster().terminate_all();
            return Err(e).context("starting workers");
        }
    }

    while !shutdown.load(Ordering::SeqCst) {
        let Some(exit) = binder.wait_exit(EXIT_POLL) else {
            continue;
        };
        info!(worker_id = %exit.worker_id, code = ?exit.code, "worker exited");

        if config.respawn {
            std::thread::sleep(RESPAWN_DELAY);
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            match binder.fork(&WorkerEnv::new()) {
                Ok(worker) => info!(
                    worker_id = %worker.id(),
                    port = ?worker.inspect_port(),
                    "worker respawned"
                ),
                Err(e) => error!(error = %e, "failed to respawn worker"),
            }
        } else if binder.pool().is_empty() {
            info!("all workers exited");
            return Ok(());
        }
    }

    info!("shutting down");
    let signalled = binder.cluster().terminate_all();
    let deadline = Instant::now() + SHUTDOWN_GRACE;
    while !binder.pool().is_empty() && Instant::now() < deadline {
        binder.wait_exit(Duration::from_millis(200));
    }

    if binder.pool().is_empty() {
        info!(signalled, "shutdown complete");
    } else {
        warn!(remaining = binder.pool().len(), "workers still running after shutdown grace period");
    }

    Ok(())
}
