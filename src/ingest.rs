//! Ingestion consumer
//!
//! Folds probe results into the catalog's current-status column and
//! the observation store. The offset is committed only after both
//! writes succeed; a crash in between redelivers the message, which at
//! worst duplicates an observation (tolerated — every record carries
//! its own weight) and re-applies an idempotent status update.
//!
//! Failure sites are classified explicitly:
//! - undecodable payload → commit and drop (poison message)
//! - store write failure → no commit, retry via redelivery

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, instrument, warn};

use crate::catalog::CatalogStore;
use crate::observation::ObservationStore;
use crate::stream::StreamReader;
use crate::Observation;

/// Deadline for the two store writes of one message.
const WRITE_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug)]
enum IngestorCommand {
    Shutdown,
}

pub struct Ingestor {
    reader: Box<dyn StreamReader>,
    catalog: CatalogStore,
    observations: ObservationStore,
    command_rx: mpsc::Receiver<IngestorCommand>,
}

impl Ingestor {
    #[instrument(skip(self))]
    async fn run(mut self) {
        debug!("starting ingestion consumer");

        loop {
            tokio::select! {
                fetched = self.reader.fetch() => {
                    let message = match fetched {
                        Ok(message) => message,
                        Err(e) => {
                            error!("failed to fetch probe result: {e}");
                            continue;
                        }
                    };

                    let observation: Observation = match serde_json::from_str(&message.payload) {
                        Ok(observation) => observation,
                        Err(e) => {
                            // Poison message: commit to unblock the
                            // partition, log, move on.
                            warn!("dropping undecodable probe result at offset {}: {e}", message.offset);
                            if let Err(e) = self.reader.commit(message.offset).await {
                                error!("failed to commit poison probe result: {e}");
                            }
                            continue;
                        }
                    };

                    let applied = tokio::time::timeout(
                        WRITE_DEADLINE,
                        self.apply(&observation),
                    )
                    .await;

                    match applied {
                        Ok(Ok(())) => {
                            if let Err(e) = self.reader.commit(message.offset).await {
                                error!("failed to commit probe result: {e}");
                            }
                        }
                        Ok(Err(e)) => {
                            // No commit: redelivery retries the writes.
                            error!("failed to apply probe result for {}: {e}", observation.server_id);
                        }
                        Err(_) => {
                            error!(
                                "probe result writes for {} exceeded {}s deadline",
                                observation.server_id,
                                WRITE_DEADLINE.as_secs()
                            );
                        }
                    }
                }

                Some(IngestorCommand::Shutdown) = self.command_rx.recv() => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        debug!("ingestion consumer stopped");
    }

    /// Status update first, observation append second. The status
    /// write touches only the status field; scheduling columns belong
    /// to the scheduler's pipeline.
    async fn apply(&self, observation: &Observation) -> anyhow::Result<()> {
        self.catalog
            .update_status(&observation.server_id, observation.status)
            .await?;
        self.observations.append(observation).await?;
        Ok(())
    }
}

/// Handle for controlling an Ingestor
#[derive(Clone)]
pub struct IngestorHandle {
    sender: mpsc::Sender<IngestorCommand>,
}

impl IngestorHandle {
    pub fn spawn(
        reader: Box<dyn StreamReader>,
        catalog: CatalogStore,
        observations: ObservationStore,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let ingestor = Ingestor {
            reader,
            catalog,
            observations,
            command_rx: cmd_rx,
        };
        tokio::spawn(ingestor.run());
        Self { sender: cmd_tx }
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(IngestorCommand::Shutdown).await;
    }
}
