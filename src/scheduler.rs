//! Scheduler: due-scan dispatch plus the change-event consumer
//!
//! Turns "servers whose next-check time has elapsed" into one probe
//! request per server. Replicas are stateless — the schedule table is
//! the only state — so any number of them can run; the worst a race
//! costs is a duplicate probe request, which the ingestion side
//! tolerates.
//!
//! ## Tick algorithm
//!
//! ```text
//! every 1s:
//!   due   = SELECT ... WHERE next_check_at <= now
//!   write one probe request per row (atomic batch)
//!   advance next_check_at = store_now + interval for the batch
//! ```
//!
//! A failed stream write skips the advance, so the same servers are
//! picked up next tick (at-least-once). A failed advance after a
//! successful write re-emits next tick — duplicates, not gaps.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, instrument, warn};

use crate::schedule::ScheduleStore;
use crate::stream::{StreamReader, StreamWriter};
use crate::{ChangeEvent, ChangeOp};

/// Tick cadence; also the floor on duplicate-dispatch frequency.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Deadline for one tick's worth of store and stream work.
const TICK_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug)]
enum SchedulerCommand {
    /// Run one tick immediately (testing and manual kicks).
    TickNow { respond_to: oneshot::Sender<()> },
    Shutdown,
}

pub struct Scheduler {
    store: ScheduleStore,
    requests: Arc<dyn StreamWriter>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl Scheduler {
    #[instrument(skip(self))]
    async fn run(mut self) {
        debug!("starting scheduler");
        let mut ticker = interval(TICK_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.on_tick().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SchedulerCommand::TickNow { respond_to } => {
                            self.on_tick().await;
                            let _ = respond_to.send(());
                        }
                        SchedulerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("scheduler stopped");
    }

    async fn on_tick(&self) {
        let result = tokio::time::timeout(TICK_DEADLINE, self.dispatch_due()).await;
        match result {
            Ok(Ok(dispatched)) if dispatched > 0 => {
                debug!("dispatched {} probe requests", dispatched);
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("tick failed: {e}"),
            Err(_) => error!("tick exceeded {}s deadline", TICK_DEADLINE.as_secs()),
        }
    }

    async fn dispatch_due(&self) -> anyhow::Result<usize> {
        let due = self.store.due_servers(chrono::Utc::now()).await?;
        if due.is_empty() {
            return Ok(0);
        }

        let mut messages = Vec::with_capacity(due.len());
        let mut ids = Vec::with_capacity(due.len());
        for request in &due {
            match serde_json::to_string(request) {
                Ok(payload) => {
                    messages.push((request.id.clone(), payload));
                    ids.push(request.id.clone());
                }
                Err(e) => {
                    error!("failed to serialize probe request for {}: {e}", request.id);
                }
            }
        }

        // Emit first; only servers whose requests are durable get
        // their next check advanced.
        self.requests.append_all(messages).await?;

        if let Err(e) = self.store.advance(&ids).await {
            // The requests are already on the stream. Next tick will
            // re-emit for these ids; consumers tolerate duplicates.
            error!("failed to advance next-check times: {e}");
        }

        Ok(ids.len())
    }
}

/// Handle for controlling a scheduler replica
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub fn spawn(store: ScheduleStore, requests: Arc<dyn StreamWriter>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let scheduler = Scheduler {
            store,
            requests,
            command_rx: cmd_rx,
        };
        tokio::spawn(scheduler.run());
        Self { sender: cmd_tx }
    }

    /// Run one tick immediately and wait for it to complete.
    pub async fn tick_now(&self) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::TickNow { respond_to: tx })
            .await?;
        rx.await?;
        Ok(())
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(SchedulerCommand::Shutdown).await;
    }
}

// ============================================================================
// Change-event consumer
// ============================================================================

/// Applies catalog change events to the schedule replica.
///
/// Creates and updates upsert the probe fields (an update never
/// rewinds the outstanding next-check time); deletes drop the row.
/// Undecodable events are committed and dropped — replaying them
/// forever would wedge the partition.
pub struct ChangeConsumer {
    reader: Box<dyn StreamReader>,
    store: ScheduleStore,
    command_rx: mpsc::Receiver<ConsumerCommand>,
}

#[derive(Debug)]
enum ConsumerCommand {
    Shutdown,
}

impl ChangeConsumer {
    #[instrument(skip(self))]
    async fn run(mut self) {
        debug!("starting change consumer");

        loop {
            tokio::select! {
                fetched = self.reader.fetch() => {
                    let message = match fetched {
                        Ok(message) => message,
                        Err(e) => {
                            error!("failed to fetch change event: {e}");
                            continue;
                        }
                    };

                    let event: ChangeEvent = match serde_json::from_str(&message.payload) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("dropping undecodable change event at offset {}: {e}", message.offset);
                            if let Err(e) = self.reader.commit(message.offset).await {
                                error!("failed to commit poison change event: {e}");
                            }
                            continue;
                        }
                    };

                    if let Err(e) = self.apply(&event).await {
                        // No commit: redelivered after restart.
                        error!("failed to apply change event at offset {}: {e}", message.offset);
                        continue;
                    }

                    if let Err(e) = self.reader.commit(message.offset).await {
                        error!("failed to commit change event: {e}");
                    }
                }

                Some(ConsumerCommand::Shutdown) = self.command_rx.recv() => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        debug!("change consumer stopped");
    }

    async fn apply(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        match event.payload.op {
            ChangeOp::Create | ChangeOp::Update => {
                let image = event
                    .payload
                    .after
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("change event has no after image"))?;
                self.store.upsert(image).await?;
            }
            ChangeOp::Delete => {
                let image = event
                    .payload
                    .before
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("delete event has no before image"))?;
                self.store.delete(&image.id).await?;
            }
        }
        Ok(())
    }
}

/// Handle for controlling a ChangeConsumer
#[derive(Clone)]
pub struct ChangeConsumerHandle {
    sender: mpsc::Sender<ConsumerCommand>,
}

impl ChangeConsumerHandle {
    pub fn spawn(reader: Box<dyn StreamReader>, store: ScheduleStore) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let consumer = ChangeConsumer {
            reader,
            store,
            command_rx: cmd_rx,
        };
        tokio::spawn(consumer.run());
        Self { sender: cmd_tx }
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(ConsumerCommand::Shutdown).await;
    }
}
