//! Catalog service: store writes plus change-event emission
//!
//! Every successful mutation is followed by a change event on the
//! change stream, keyed by server id. Event emission happens after the
//! store commit; a failed append is logged and the mutation still
//! counts as successful — the replica lags until the next event for
//! that server rather than failing operator requests.

use std::sync::Arc;

use tracing::{error, instrument};

use crate::stream::StreamWriter;
use crate::{ChangeEvent, Server, ServerSpec};

use super::error::CatalogResult;
use super::store::{CatalogStore, ServerPatch, ServerQuery};

#[derive(Clone)]
pub struct CatalogService {
    store: CatalogStore,
    changes: Arc<dyn StreamWriter>,
}

impl CatalogService {
    pub fn new(store: CatalogStore, changes: Arc<dyn StreamWriter>) -> Self {
        Self { store, changes }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    #[instrument(skip(self, spec), fields(server_name = %spec.server_name))]
    pub async fn create_server(&self, spec: &ServerSpec) -> CatalogResult<Server> {
        let server = self.store.create_server(spec).await?;
        self.emit(&server.id, &ChangeEvent::create(&server)).await;
        Ok(server)
    }

    #[instrument(skip(self, specs), fields(count = specs.len()))]
    pub async fn import_servers(
        &self,
        specs: &[ServerSpec],
    ) -> CatalogResult<(Vec<Server>, Vec<String>)> {
        let (inserted, skipped) = self.store.import_servers(specs).await?;
        for server in &inserted {
            self.emit(&server.id, &ChangeEvent::create(server)).await;
        }
        Ok((inserted, skipped))
    }

    #[instrument(skip(self, patch))]
    pub async fn update_server(&self, id: &str, patch: &ServerPatch) -> CatalogResult<Server> {
        let server = self.store.update_server(id, patch).await?;
        self.emit(&server.id, &ChangeEvent::update(&server)).await;
        Ok(server)
    }

    /// Idempotent; a delete event is emitted only when a row was
    /// actually removed.
    #[instrument(skip(self))]
    pub async fn delete_server(&self, id: &str) -> CatalogResult<()> {
        if self.store.delete_server(id).await? {
            self.emit(id, &ChangeEvent::delete(id)).await;
        }
        Ok(())
    }

    pub async fn get_server(&self, id: &str) -> CatalogResult<Server> {
        self.store.get_server(id).await
    }

    pub async fn list_servers(&self, query: &ServerQuery) -> CatalogResult<Vec<Server>> {
        self.store.list_servers(query).await
    }

    async fn emit(&self, server_id: &str, event: &ChangeEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!("failed to serialize change event for {server_id}: {e}");
                return;
            }
        };
        if let Err(e) = self.changes.append(server_id, payload).await {
            error!("failed to emit change event for {server_id}: {e}");
        }
    }
}
