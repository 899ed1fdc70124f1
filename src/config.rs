use tracing::trace;

/// Top-level configuration shared by all binaries. Each binary reads
/// the sections it needs and ignores the rest.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub catalog: StoreSection,
    #[serde(default)]
    pub observations: StoreSection,
    #[serde(default)]
    pub schedule: StoreSection,
    #[serde(default)]
    pub streams: StreamSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub probe: ProbeSection,
    #[serde(default)]
    pub mail: MailSection,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// SQLite-backed store location. The default keeps every store in one
/// file, which is what the single-node deployment uses.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct StreamSection {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_topic_changes")]
    pub change_topic: String,
    #[serde(default = "default_topic_requests")]
    pub probe_request_topic: String,
    #[serde(default = "default_topic_results")]
    pub probe_result_topic: String,
    #[serde(default = "default_partitions")]
    pub partitions: u32,
    #[serde(default = "default_group_scheduler")]
    pub scheduler_group: String,
    #[serde(default = "default_group_prober")]
    pub prober_group: String,
    #[serde(default = "default_group_ingestor")]
    pub ingestor_group: String,
    /// One consumer task per partition up to this count.
    #[serde(default = "default_partitions")]
    pub consumer_count: u32,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SessionSection {
    /// redis:// URL of the session store; in-memory when absent.
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AuthSection {
    #[serde(default = "default_signing_secret")]
    pub signing_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: u64,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// Created with every scope at API startup when no user owns the
    /// email yet.
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProbeSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct MailSection {
    pub sender: Option<String>,
    pub admin_recipient: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_listen_port(),
            log_level: default_log_level(),
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            change_topic: default_topic_changes(),
            probe_request_topic: default_topic_requests(),
            probe_result_topic: default_topic_results(),
            partitions: default_partitions(),
            scheduler_group: default_group_scheduler(),
            prober_group: default_group_prober(),
            ingestor_group: default_group_ingestor(),
            consumer_count: default_partitions(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self { redis_url: None }
    }
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            signing_secret: default_signing_secret(),
            access_token_ttl_secs: default_access_ttl(),
            refresh_token_ttl_secs: default_refresh_ttl(),
            session_ttl_secs: default_session_ttl(),
            bootstrap_admin: None,
        }
    }
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_backoff_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_listen_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_db_path() -> String {
    "./fleetwatch.db".to_string()
}

fn default_topic_changes() -> String {
    "server-changes".to_string()
}

fn default_topic_requests() -> String {
    "probe-requests".to_string()
}

fn default_topic_results() -> String {
    "probe-results".to_string()
}

fn default_partitions() -> u32 {
    4
}

fn default_group_scheduler() -> String {
    "scheduler".to_string()
}

fn default_group_prober() -> String {
    "prober".to_string()
}

fn default_group_ingestor() -> String {
    "ingestor".to_string()
}

fn default_signing_secret() -> String {
    "change-me".to_string()
}

// 15 minutes
fn default_access_ttl() -> u64 {
    15 * 60
}

// 168 hours
fn default_refresh_ttl() -> u64 {
    168 * 3600
}

// 720 hours
fn default_session_ttl() -> u64 {
    720 * 3600
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    1000
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("invalid configuration file: {e}"))
        .inspect(|config: &Config| trace!("loaded config: {config:?}"))
}
