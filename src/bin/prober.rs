use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fleetwatch::config::read_config_file;
use fleetwatch::prober::{ProbeClient, ProbeWorkerHandle};
use fleetwatch::stream::SqliteBroker;
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, default_value = "./fleetwatch.json")]
    file: String,
}

fn init(log_level: &str) {
    let level: LevelFilter = log_level.parse().unwrap_or(LevelFilter::INFO);
    let filter =
        filter::Targets::new().with_targets(vec![("fleetwatch", level), ("prober", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = read_config_file(&args.file).unwrap_or_else(|_| {
        serde_json::from_str("{}").expect("empty config always deserializes")
    });
    init(&config.server.log_level);
    trace!("started with args: {args:?}");

    let broker = SqliteBroker::connect(&config.streams.path).await?;
    let results = Arc::new(
        broker.writer(&config.streams.probe_result_topic, config.streams.partitions),
    );
    let client = ProbeClient::new(
        config.probe.max_retries,
        Duration::from_millis(config.probe.request_timeout_ms),
        Duration::from_millis(config.probe.initial_backoff_ms),
    );

    // One worker per partition; each drains its partition
    // sequentially.
    let partitions = config.streams.consumer_count.min(config.streams.partitions);
    let mut workers = Vec::new();
    for partition in 0..partitions {
        let reader = broker.reader(
            &config.streams.probe_request_topic,
            partition,
            &config.streams.prober_group,
        );
        workers.push(ProbeWorkerHandle::spawn(
            Box::new(reader),
            client.clone(),
            results.clone(),
        ));
    }
    info!("{} probe workers started", workers.len());

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal, stopping..."),
        Err(e) => error!("unable to listen for shutdown signal: {e}"),
    }

    // In-flight probes are abandoned; uncommitted requests redeliver.
    for worker in &workers {
        worker.shutdown().await;
    }
    info!("prober exiting");

    Ok(())
}
