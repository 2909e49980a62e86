use tokio::select;
use tokio::signal::unix;
use tokio::signal::unix::SignalKind;

use tracing_subscriber::{filter::Targets, layer::Layer, prelude::*, util::SubscriberInitExt};

use crate::{
    cli::{arguments, node::Node},
    config::NodeConfig,
};

pub async fn run(args: arguments::Run) -> eyre::Result<()> {
    let config = NodeConfig::from_path(args.config)?;

    let level_filter = config.logger.level;

    let filter = Targets::new()
        .with_target("sonar_wire", level_filter)
        .with_target("sonar_crawl", level_filter)
        .with_target("sonar_storage", level_filter)
        .with_target("sonard", level_filter)
        .with_default(level_filter);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .try_init()?;

    let node = Node::new(config);

    // Bootstrap failures (no seeds, uncreatable data dir) surface here and
    // exit nonzero; everything after this point only ends via a signal or
    // the crawl draining.
    node.run().await?;

    let mut sigterm =
        unix::signal(SignalKind::terminate()).expect("Failed to create SIGTERM signal handler");
    let mut sigint =
        unix::signal(SignalKind::interrupt()).expect("Failed to create SIGINT signal handler");

    select! {
        _ = node.cancelled() => {
            tracing::info!("Crawl finished");
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM signal");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT signal");
        }
    }

    node.shutdown().await;

    Ok(())
}
