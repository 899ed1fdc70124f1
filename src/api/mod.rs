//! Management HTTP API
//!
//! Axum router over the auth core, the server catalog and reporting.
//! Handlers validate input, call one service operation and map domain
//! error kinds to HTTP statuses exactly once (in `error.rs`).
//!
//! ## Endpoints
//!
//! - `POST /auth/login` / `POST /auth/refresh` / `POST /auth/logout`
//! - `GET /auth/verify` — identity/scope echo for downstream services
//! - `POST /auth/register` — requires `users:create`
//! - `/users`, `/users/me`, `/roles`, `/scopes` — admin surface
//! - `/servers` CRUD, `/servers/import`, `/servers/export`,
//!   `/servers/reports`, `/servers/:id/uptime`

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;
use std::time::Duration;

use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Enable CORS for browser consoles
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
            enable_cors: true,
        }
    }
}

/// How long in-flight requests get to drain after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub fn router(state: ApiState) -> Router {
    Router::new()
        // Auth
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/verify", get(routes::auth::verify))
        .route("/auth/register", post(routes::auth::register))
        // User admin + self-service
        .route("/users", get(routes::users::list_users))
        .route("/users/me", get(routes::users::me))
        .route("/users/me", patch(routes::users::update_me))
        .route("/users/me/password", put(routes::users::update_my_password))
        .route("/users/:id", get(routes::users::get_user))
        .route("/users/:id", put(routes::users::update_user))
        // Roles and scopes
        .route("/roles", get(routes::roles::list_roles))
        .route("/roles", post(routes::roles::create_role))
        .route("/roles/:id", get(routes::roles::get_role))
        .route("/roles/:id", put(routes::roles::update_role))
        .route("/roles/:id", delete(routes::roles::delete_role))
        .route("/scopes", get(routes::scopes::list_scopes))
        // Server catalog
        .route("/servers", post(routes::servers::create_server))
        .route("/servers", get(routes::servers::list_servers))
        .route("/servers/import", post(routes::servers::import_servers))
        .route("/servers/export", get(routes::servers::export_servers))
        .route("/servers/reports", post(routes::servers::send_report))
        .route("/servers/:id", get(routes::servers::get_server))
        .route("/servers/:id", patch(routes::servers::update_server))
        .route("/servers/:id", delete(routes::servers::delete_server))
        .route("/servers/:id/uptime", get(routes::servers::uptime))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve in a background task. Returns the bound address and
/// the server task; awaiting the task blocks until `shutdown` resolves
/// and the (bounded) drain completes.
pub async fn spawn_api_server(
    config: ApiConfig,
    state: ApiState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    info!("starting API server on {}", config.bind_addr);

    let mut app = router(state);

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    let server = tokio::spawn(async move {
        let (drained_tx, drained_rx) = tokio::sync::oneshot::channel::<()>();
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown.await;
            info!(
                "stopped accepting requests, draining for up to {}s",
                DRAIN_TIMEOUT.as_secs()
            );
            let _ = drained_tx.send(());
        });

        tokio::select! {
            result = serve => {
                if let Err(e) = result {
                    tracing::error!("API server error: {}", e);
                }
            }
            _ = async {
                let _ = drained_rx.await;
                tokio::time::sleep(DRAIN_TIMEOUT).await;
            } => {
                tracing::warn!("drain deadline reached, abandoning in-flight requests");
            }
        }
    });

    Ok((addr, server))
}
