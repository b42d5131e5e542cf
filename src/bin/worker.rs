//! Worker Binary
//!
//! Pulls solver tasks off the broker, runs the CFR engine on blocking
//! threads, and publishes results and heartbeats back.

use clap::Parser;
use nashfleet::bus;
use nashfleet::config::Config;
use nashfleet::worker::runtime::Runtime;
use std::sync::Arc;

#[derive(Parser)]
#[command(about = "distributed CFR solver: compute-node process")]
struct Args {
    /// broker url, overrides BROKER_URL
    #[arg(long)]
    broker: Option<String>,
    /// concurrent tasks, overrides WORKER_CONCURRENCY
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nashfleet::init();
    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(broker) = args.broker {
        config.broker_url = broker;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    let broker = bus::connect(&config.broker_url, &config.queue_prefix)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let worker = Arc::new(Runtime::new(broker, config.concurrency));
    log::info!("worker {} online", worker.node_id());
    worker.run().await;
    Ok(())
}
