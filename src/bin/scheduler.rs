use std::sync::Arc;

use clap::Parser;
use fleetwatch::config::read_config_file;
use fleetwatch::schedule::ScheduleStore;
use fleetwatch::scheduler::{ChangeConsumerHandle, SchedulerHandle};
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
        filter::Targets::new().with_targets(vec![("fleetwatch", level), ("scheduler", level)]);
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

    let store = ScheduleStore::connect(&config.schedule.path).await?;
    let broker = SqliteBroker::connect(&config.streams.path).await?;

    let requests = Arc::new(
        broker.writer(&config.streams.probe_request_topic, config.streams.partitions),
    );
    let scheduler = SchedulerHandle::spawn(store.clone(), requests);
    info!("scheduler started");

    // One change consumer per partition of the change stream.
    let partitions = config.streams.consumer_count.min(config.streams.partitions);
    let mut consumers = Vec::new();
    for partition in 0..partitions {
        let reader = broker.reader(
            &config.streams.change_topic,
            partition,
            &config.streams.scheduler_group,
        );
        consumers.push(ChangeConsumerHandle::spawn(Box::new(reader), store.clone()));
    }
    info!("{} change consumers started", consumers.len());

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal, stopping..."),
        Err(e) => error!("unable to listen for shutdown signal: {e}"),
    }

    for consumer in &consumers {
        consumer.shutdown().await;
    }
    scheduler.shutdown().await;
    info!("scheduler exiting");

    Ok(())
}
