//! Shared fixtures: a fully wired pipeline and an API server bound to
//! an ephemeral port, all on per-test SQLite files.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fleetwatch::api::{spawn_api_server, ApiConfig, ApiState};
use fleetwatch::auth::{AuthService, AuthStore, MemorySessionStore, TokenSigner};
use fleetwatch::catalog::{CatalogService, CatalogStore};
use fleetwatch::ingest::IngestorHandle;
use fleetwatch::mail::RecordingMailer;
use fleetwatch::observation::ObservationStore;
use fleetwatch::prober::{ProbeClient, ProbeWorkerHandle};
use fleetwatch::report::ReportService;
use fleetwatch::schedule::ScheduleStore;
use fleetwatch::scheduler::{ChangeConsumerHandle, SchedulerHandle};
use fleetwatch::sheet::DelimitedSheetCodec;
use fleetwatch::stream::SqliteBroker;

pub const CHANGE_TOPIC: &str = "server-changes";
pub const REQUEST_TOPIC: &str = "probe-requests";
pub const RESULT_TOPIC: &str = "probe-results";

/// Everything a test needs to drive the system end to end. Single
/// partition per topic keeps consumption deterministic.
pub struct TestSystem {
    pub dir: tempfile::TempDir,
    pub broker: SqliteBroker,
    pub catalog_store: CatalogStore,
    pub observations: ObservationStore,
    pub schedule_store: ScheduleStore,
    pub auth: AuthService,
    pub catalog: CatalogService,
    pub reports: ReportService,
    pub mailer: Arc<RecordingMailer>,
}

impl TestSystem {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pool = fleetwatch::db::open_pool(dir.path().join("catalog.db"))
            .await
            .unwrap();
        let catalog_store = CatalogStore::new(pool.clone());
        let auth_store = AuthStore::new(pool);
        let observations =
            ObservationStore::connect(dir.path().join("observations.db").to_str().unwrap())
                .await
                .unwrap();
        let schedule_store =
            ScheduleStore::connect(dir.path().join("schedule.db").to_str().unwrap())
                .await
                .unwrap();
        let broker = SqliteBroker::connect(dir.path().join("streams.db"))
            .await
            .unwrap();

        let signer = TokenSigner::new(
            "integration-test-secret",
            Duration::from_secs(900),
            Duration::from_secs(3600),
        );
        let auth = AuthService::new(
            auth_store,
            Arc::new(MemorySessionStore::new()),
            signer,
            Duration::from_secs(3600),
        );

        let changes = Arc::new(broker.writer(CHANGE_TOPIC, 1));
        let catalog = CatalogService::new(catalog_store.clone(), changes);

        let mailer = Arc::new(RecordingMailer::new());
        let reports = ReportService::new(observations.clone(), mailer.clone());

        Self {
            dir,
            broker,
            catalog_store,
            observations,
            schedule_store,
            auth,
            catalog,
            reports,
            mailer,
        }
    }

    /// Spawn scheduler, change consumer, probe worker and ingestion
    /// consumer — the full background pipeline.
    pub fn start_pipeline(&self) -> PipelineHandles {
        let change_consumer = ChangeConsumerHandle::spawn(
            Box::new(self.broker.reader(CHANGE_TOPIC, 0, "scheduler")),
            self.schedule_store.clone(),
        );
        let scheduler = SchedulerHandle::spawn(
            self.schedule_store.clone(),
            Arc::new(self.broker.writer(REQUEST_TOPIC, 1)),
        );
        let worker = ProbeWorkerHandle::spawn(
            Box::new(self.broker.reader(REQUEST_TOPIC, 0, "prober")),
            ProbeClient::new(3, Duration::from_millis(500), Duration::from_millis(20)),
            Arc::new(self.broker.writer(RESULT_TOPIC, 1)),
        );
        let ingestor = IngestorHandle::spawn(
            Box::new(self.broker.reader(RESULT_TOPIC, 0, "ingestor")),
            self.catalog_store.clone(),
            self.observations.clone(),
        );

        PipelineHandles {
            scheduler,
            change_consumer,
            worker,
            ingestor,
        }
    }

    /// Bind the HTTP API on an ephemeral port.
    pub async fn start_api(&self) -> SocketAddr {
        let state = ApiState::new(
            self.auth.clone(),
            self.catalog.clone(),
            self.reports.clone(),
            Arc::new(DelimitedSheetCodec),
        );
        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            enable_cors: false,
        };
        let (addr, _server) = spawn_api_server(config, state, std::future::pending())
            .await
            .unwrap();
        addr
    }
}

pub struct PipelineHandles {
    pub scheduler: SchedulerHandle,
    pub change_consumer: ChangeConsumerHandle,
    pub worker: ProbeWorkerHandle,
    pub ingestor: IngestorHandle,
}

impl PipelineHandles {
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.change_consumer.shutdown().await;
        self.worker.shutdown().await;
        self.ingestor.shutdown().await;
    }
}

/// Register a user holding the given scopes (via a dedicated role)
/// and return its id.
pub async fn seed_user(system: &TestSystem, email: &str, scopes: &[&str]) -> String {
    let role_ids = if scopes.is_empty() {
        vec![]
    } else {
        let scope_ids = system.auth.store().scope_ids_by_names(scopes).await.unwrap();
        assert_eq!(scope_ids.len(), scopes.len(), "unknown scope in seed_user");
        let role = system
            .auth
            .store()
            .create_role(&format!("role-{email}"), "", &scope_ids)
            .await
            .unwrap();
        vec![role.id]
    };

    system
        .auth
        .register(fleetwatch::auth::NewUser {
            email: email.to_string(),
            password: "pass-w0rd".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            role_ids,
        })
        .await
        .unwrap()
        .id
}

/// Log in over HTTP; returns the access token and the refresh cookie
/// value.
pub async fn login_http(addr: SocketAddr, email: &str) -> (String, String) {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/auth/login"))
        .json(&serde_json::json!({"email": email, "password": "pass-w0rd"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let cookie = refresh_cookie_value(&response).expect("login sets the refresh cookie");
    let body: serde_json::Value = response.json().await.unwrap();
    (
        body["access_token"].as_str().unwrap().to_string(),
        cookie,
    )
}

/// Pull the `refresh_token` value out of `Set-Cookie`.
pub fn refresh_cookie_value(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookie| {
            cookie
                .strip_prefix("refresh_token=")
                .map(|rest| rest.split(';').next().unwrap_or("").to_string())
        })
}
