use clap::Parser;
use fleetwatch::catalog::CatalogStore;
use fleetwatch::config::read_config_file;
use fleetwatch::ingest::IngestorHandle;
use fleetwatch::observation::ObservationStore;
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
        filter::Targets::new().with_targets(vec![("fleetwatch", level), ("ingestor", level)]);
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

    let catalog = CatalogStore::connect(&config.catalog.path).await?;
    let observations = ObservationStore::connect(&config.observations.path).await?;
    let broker = SqliteBroker::connect(&config.streams.path).await?;

    let partitions = config.streams.consumer_count.min(config.streams.partitions);
    let mut consumers = Vec::new();
    for partition in 0..partitions {
        let reader = broker.reader(
            &config.streams.probe_result_topic,
            partition,
            &config.streams.ingestor_group,
        );
        consumers.push(IngestorHandle::spawn(
            Box::new(reader),
            catalog.clone(),
            observations.clone(),
        ));
    }
    info!("{} ingestion consumers started", consumers.len());

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal, stopping..."),
        Err(e) => error!("unable to listen for shutdown signal: {e}"),
    }

    for consumer in &consumers {
        consumer.shutdown().await;
    }
    info!("ingestor exiting");

    Ok(())
}
