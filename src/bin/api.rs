use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fleetwatch::api::{spawn_api_server, ApiConfig, ApiState};
use fleetwatch::auth::{
    AuthService, AuthStore, MemorySessionStore, RedisSessionStore, SessionStore, TokenSigner,
};
use fleetwatch::catalog::{CatalogService, CatalogStore};
use fleetwatch::config::{read_config_file, Config};
use fleetwatch::mail::LogMailer;
use fleetwatch::observation::ObservationStore;
use fleetwatch::report::{spawn_daily_report, ReportService};
use fleetwatch::sheet::DelimitedSheetCodec;
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
    let filter = filter::Targets::new().with_targets(vec![("fleetwatch", level), ("api", level)]);
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

    let state = build_state(&config).await?;

    if let Some(recipient) = config.mail.admin_recipient.clone() {
        spawn_daily_report(state.reports.clone(), recipient);
        info!("daily report job scheduled");
    }

    let api_config = ApiConfig {
        bind_addr: format!("0.0.0.0:{}", config.server.port).parse()?,
        enable_cors: true,
    };
    let (_addr, server) = spawn_api_server(api_config, state, async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received shutdown signal, draining..."),
            Err(e) => error!("unable to listen for shutdown signal: {e}"),
        }
    })
    .await?;

    // Resolves once the shutdown signal fired and the drain finished.
    server.await?;

    info!("server exiting");
    Ok(())
}

async fn build_state(config: &Config) -> anyhow::Result<ApiState> {
    let pool = fleetwatch::db::open_pool(&config.catalog.path).await?;
    let auth_store = AuthStore::new(pool.clone());
    let catalog_store = CatalogStore::new(pool);

    let sessions: Arc<dyn SessionStore> = match &config.session.redis_url {
        Some(url) => {
            info!("using redis session store");
            Arc::new(RedisSessionStore::connect(url).await?)
        }
        None => {
            info!("using in-memory session store");
            Arc::new(MemorySessionStore::new())
        }
    };

    let signer = TokenSigner::new(
        &config.auth.signing_secret,
        Duration::from_secs(config.auth.access_token_ttl_secs),
        Duration::from_secs(config.auth.refresh_token_ttl_secs),
    );
    let auth = AuthService::new(
        auth_store,
        sessions,
        signer,
        Duration::from_secs(config.auth.session_ttl_secs),
    );

    bootstrap_admin(&auth, config).await;

    let broker = SqliteBroker::connect(&config.streams.path).await?;
    let changes = Arc::new(broker.writer(&config.streams.change_topic, config.streams.partitions));
    let catalog = CatalogService::new(catalog_store, changes);

    let observations = ObservationStore::connect(&config.observations.path).await?;
    let reports = ReportService::new(observations, Arc::new(LogMailer));

    Ok(ApiState::new(
        auth,
        catalog,
        reports,
        Arc::new(DelimitedSheetCodec),
    ))
}

/// Create the configured admin (all scopes via an `admin` role) when
/// no user owns the email yet. Makes a fresh deployment usable without
/// poking the database by hand.
async fn bootstrap_admin(auth: &AuthService, config: &Config) {
    let Some(admin) = &config.auth.bootstrap_admin else {
        return;
    };

    if auth.store().get_user_by_email(&admin.email).await.is_ok() {
        return;
    }

    let result = async {
        let scopes = auth.store().list_scopes("", Default::default(), 100, 0).await?;
        let scope_ids: Vec<String> = scopes.into_iter().map(|s| s.id).collect();
        let role = match auth.store().create_role("admin", "Full access", &scope_ids).await {
            Ok(role) => role,
            // Role already present from a previous run.
            Err(fleetwatch::auth::AuthError::RoleNameExists) => {
                let roles = auth
                    .store()
                    .list_roles("admin", Default::default(), Default::default(), 1, 0)
                    .await?;
                roles
                    .into_iter()
                    .next()
                    .ok_or(fleetwatch::auth::AuthError::RoleNotFound)?
            }
            Err(e) => return Err(e),
        };

        auth.register(fleetwatch::auth::NewUser {
            email: admin.email.clone(),
            password: admin.password.clone(),
            first_name: "Admin".to_string(),
            last_name: String::new(),
            role_ids: vec![role.id],
        })
        .await?;
        Ok::<(), fleetwatch::auth::AuthError>(())
    }
    .await;

    match result {
        Ok(()) => info!("bootstrapped admin user {}", admin.email),
        Err(e) => error!("failed to bootstrap admin user: {e}"),
    }
}
