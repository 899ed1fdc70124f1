//! Probe worker: request consumption, classification, result emission

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, instrument, warn};

use crate::stream::{StreamReader, StreamWriter};
use crate::{Observation, ProbeRequest, ServerStatus};

use super::client::{ProbeClient, ProbeFailure, ProbeOutcome};

/// Map a probe outcome onto the status taxonomy. Total: every outcome
/// the client can produce lands in exactly one bucket.
pub fn classify(outcome: &ProbeOutcome) -> ServerStatus {
    match (&outcome.failure, outcome.status_code) {
        (Some(ProbeFailure::ConnectionRefused), _) => ServerStatus::Inactive,
        (Some(ProbeFailure::Transport(_)), _) => ServerStatus::NetworkError,
        (None, Some(code)) if (200..300).contains(&code) => ServerStatus::Healthy,
        (None, Some(code)) if (400..500).contains(&code) => ServerStatus::ConfigurationError,
        (None, _) => ServerStatus::Unhealthy,
    }
}

#[derive(Debug)]
enum WorkerCommand {
    Shutdown,
}

/// One worker per partition; the partition is drained sequentially so
/// per-server request order is preserved within it.
pub struct ProbeWorker {
    reader: Box<dyn StreamReader>,
    client: ProbeClient,
    results: Arc<dyn StreamWriter>,
    command_rx: mpsc::Receiver<WorkerCommand>,
}

impl ProbeWorker {
    #[instrument(skip(self))]
    async fn run(mut self) {
        debug!("starting probe worker");

        loop {
            tokio::select! {
                fetched = self.reader.fetch() => {
                    let message = match fetched {
                        Ok(message) => message,
                        Err(e) => {
                            error!("failed to fetch probe request: {e}");
                            continue;
                        }
                    };

                    let request: ProbeRequest = match serde_json::from_str(&message.payload) {
                        Ok(request) => request,
                        Err(e) => {
                            warn!("dropping undecodable probe request at offset {}: {e}", message.offset);
                            if let Err(e) = self.reader.commit(message.offset).await {
                                error!("failed to commit poison probe request: {e}");
                            }
                            continue;
                        }
                    };

                    if let Err(e) = self.probe_and_publish(&request).await {
                        // Result not durable: leave the offset
                        // uncommitted so the request is retried.
                        error!("failed to publish probe result for {}: {e}", request.id);
                        continue;
                    }

                    if let Err(e) = self.reader.commit(message.offset).await {
                        error!("failed to commit probe request: {e}");
                    }
                }

                Some(WorkerCommand::Shutdown) = self.command_rx.recv() => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        debug!("probe worker stopped");
    }

    /// Execute the probe and append the observation to the result
    /// stream. The observation's weight is the configured interval
    /// plus however long the probe itself took.
    async fn probe_and_publish(&self, request: &ProbeRequest) -> anyhow::Result<()> {
        let start = Utc::now();
        let outcome = self
            .client
            .check(request.ipv4, request.port, &request.health_endpoint)
            .await;

        let status = classify(&outcome);
        let observation = Observation {
            server_id: request.id.clone(),
            status,
            status_numeric: status.numeric(),
            timestamp: outcome.timestamp,
            attempts: outcome.attempts,
            interval_since_last_check_ms: i64::from(request.health_check_interval) * 1000
                + (outcome.timestamp - start).num_milliseconds(),
        };

        let payload = serde_json::to_string(&observation)?;
        self.results.append(&request.id, payload).await?;
        Ok(())
    }
}

/// Handle for controlling a ProbeWorker
#[derive(Clone)]
pub struct ProbeWorkerHandle {
    sender: mpsc::Sender<WorkerCommand>,
}

impl ProbeWorkerHandle {
    pub fn spawn(
        reader: Box<dyn StreamReader>,
        client: ProbeClient,
        results: Arc<dyn StreamWriter>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let worker = ProbeWorker {
            reader,
            client,
            results,
            command_rx: cmd_rx,
        };
        tokio::spawn(worker.run());
        Self { sender: cmd_tx }
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(WorkerCommand::Shutdown).await;
    }
}
