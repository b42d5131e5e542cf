//! Orchestrator Binary
//!
//! Runs the simulation manager, the compute-node registry, the result
//! aggregator, and the HTTP/WebSocket ingress in one process.
//! `--standalone` also runs an in-process worker, which together with
//! `BROKER_URL=memory://` gives a single-binary deployment.

use clap::Parser;
use nashfleet::bus;
use nashfleet::config::Config;
use nashfleet::orchestrator::artifacts::DiskArtifacts;
use nashfleet::orchestrator::orchestrator::Orchestrator;
use nashfleet::registry::registry::Registry;
use nashfleet::server::server::Server;
use nashfleet::worker::runtime::Runtime;
use std::sync::Arc;

#[derive(Parser)]
#[command(about = "distributed CFR solver: orchestrator process")]
struct Args {
    /// http bind address, overrides BIND_ADDR
    #[arg(long)]
    bind: Option<String>,
    /// broker url, overrides BROKER_URL ("memory://" for in-process)
    #[arg(long)]
    broker: Option<String>,
    /// checkpoint directory, overrides ARTIFACT_DIR
    #[arg(long)]
    artifacts: Option<String>,
    /// also run an in-process worker
    #[arg(long)]
    standalone: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nashfleet::init();
    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(broker) = args.broker {
        config.broker_url = broker;
    }
    if let Some(artifacts) = args.artifacts {
        config.artifact_dir = artifacts;
    }
    let broker = bus::connect(&config.broker_url, &config.queue_prefix)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let registry = Arc::new(Registry::new());
    let artifacts = Arc::new(DiskArtifacts::new(&config.artifact_dir));
    let orchestrator = Orchestrator::new(broker.clone(), registry, artifacts);
    tokio::spawn(orchestrator.clone().run_results());
    tokio::spawn(orchestrator.clone().run_heartbeats());
    tokio::spawn(orchestrator.clone().run_sweeper());
    if args.standalone {
        log::info!("running standalone with an in-process worker");
        let worker = Arc::new(Runtime::new(broker.clone(), config.concurrency));
        tokio::spawn(worker.run());
    }
    Server::run(&config.bind_addr, orchestrator).await?;
    Ok(())
}
