use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

fn default_log_level() -> String {
    "info".to_string()
}
fn default_data_dir() -> String {
    "data".to_string()
}
fn default_api_enabled() -> bool {
    true
}
fn default_api_host() -> String {
    "127.0.0.1".to_string()
}
fn default_api_port() -> u16 {
    3000
}
fn default_metadata_timeout_secs() -> u64 {
    120
}
fn default_retry_metadata_timeout_secs() -> u64 {
    // Retries get a longer window; a second miss is final.
    180
}
fn default_retry_backoff_secs() -> u64 {
    5
}
fn default_completion_grace_secs() -> u64 {
    30
}
fn default_reaper_every_secs() -> u64 {
    60
}
fn default_reaper_stale_after_secs() -> u64 {
    300
}
fn default_status_throttle_ms() -> u64 {
    1000
}
fn default_restore_stagger_ms() -> u64 {
    1000
}
fn default_ledger_retention_secs() -> u64 {
    24 * 60 * 60
}
fn default_ledger_sweep_every_secs() -> u64 {
    60 * 60
}
fn default_announce() -> Vec<String> {
    [
        "udp://tracker.opentrackr.org:1337/announce",
        "udp://tracker.openbittorrent.com:6969/announce",
        "udp://tracker.internetwarriors.net:1337/announce",
        "udp://tracker.coppersurfer.tk:6969/announce",
        "udp://tracker.leechers-paradise.org:6969/announce",
        "udp://9.rarbg.to:2710/announce",
        "udp://exodus.desync.com:6969/announce",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}
fn default_max_conns() -> usize {
    100
}
fn default_max_web_conns() -> usize {
    200
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    /// Holds `downloads/` and the shutdown snapshot.
    pub data_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub metadata_timeout_secs: u64,
    pub retry_metadata_timeout_secs: u64,
    pub retry_backoff_secs: u64,
    pub completion_grace_secs: u64,

    pub reaper_every_secs: u64,
    /// A downloading transfer with no rate and no peers for this long is dropped.
    pub reaper_stale_after_secs: u64,
    /// `false` exempts paused transfers from the stall check.
    pub reaper_include_paused: bool,

    pub status_throttle_ms: u64,
    /// Delay between re-adds when restoring the shutdown snapshot.
    pub restore_stagger_ms: u64,

    pub ledger_retention_secs: u64,
    pub ledger_sweep_every_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub announce: Vec<String>,
    pub max_conns: usize,
    pub max_web_conns: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            metadata_timeout_secs: default_metadata_timeout_secs(),
            retry_metadata_timeout_secs: default_retry_metadata_timeout_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
            completion_grace_secs: default_completion_grace_secs(),

            reaper_every_secs: default_reaper_every_secs(),
            reaper_stale_after_secs: default_reaper_stale_after_secs(),
            reaper_include_paused: true,

            status_throttle_ms: default_status_throttle_ms(),
            restore_stagger_ms: default_restore_stagger_ms(),

            ledger_retention_secs: default_ledger_retention_secs(),
            ledger_sweep_every_secs: default_ledger_sweep_every_secs(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            announce: default_announce(),
            max_conns: default_max_conns(),
            max_web_conns: default_max_web_conns(),
        }
    }
}

pub fn init_tracing(config: &Config) {
    // Priority order:
    // 1) RUST_LOG
    // 2) general.log_level
    // 3) default (info)
    //
    // Example:
    // RUST_LOG=info,rust_swarm::session=debug

    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .or_else(|| Some(config.general.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());

    let filter = EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact()
        .init();
}
