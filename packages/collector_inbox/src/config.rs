use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::SyncError;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [realtime]
//                    url = "ws://localhost:4000/ws"
//
//   env var:         COLLECTOR_REALTIME__URL=ws://...   (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub api: ApiFileConfig,
    #[serde(default)]
    pub realtime: RealtimeFileConfig,
    #[serde(default)]
    pub feed: FeedFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// REST endpoint settings (lives under `[api]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiFileConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiFileConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Push channel settings (lives under `[realtime]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RealtimeFileConfig {
    #[serde(default = "default_realtime_url")]
    pub url: String,
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

impl Default for RealtimeFileConfig {
    fn default() -> Self {
        Self {
            url: default_realtime_url(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

/// Notification feed settings (lives under `[feed]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedFileConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for FeedFileConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// Credentials (lives under `[session]`; usually set through env vars).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionFileConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_realtime_url() -> String {
    "ws://localhost:4000/ws".to_string()
}
fn default_reconnect_initial_ms() -> u64 {
    500
}
fn default_reconnect_max_ms() -> u64 {
    30_000
}
fn default_page_size() -> usize {
    10
}

/// Build a figment that layers: defaults → config.toml → COLLECTOR_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `COLLECTOR_API__BASE_URL=https://api.example`  →  `api.base_url`
///   `COLLECTOR_SESSION__TOKEN=...`                  →  `session.token`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("COLLECTOR_").split("__"))
}

// =============================================================================
// Runtime config structs (derived from FileConfig)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Base URL, without trailing slash
    pub base_url: String,
    pub request_timeout: Duration,
}

impl ApiConfig {
    pub fn from_file(fc: &ApiFileConfig) -> Self {
        Self {
            base_url: fc.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(fc.request_timeout_secs),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub url: String,
    /// First reconnect delay; doubles per failed attempt
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl ChannelConfig {
    pub fn from_file(fc: &RealtimeFileConfig) -> Self {
        let reconnect_initial = Duration::from_millis(fc.reconnect_initial_ms.max(1));
        Self {
            url: fc.url.clone(),
            reconnect_initial,
            reconnect_max: Duration::from_millis(fc.reconnect_max_ms).max(reconnect_initial),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// How far the visible window grows on each "load more"
    pub page_size: usize,
}

impl FeedConfig {
    pub fn from_file(fc: &FeedFileConfig) -> Self {
        Self {
            page_size: fc.page_size.max(1),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::from_file(&FeedFileConfig::default())
    }
}

/// Who we are to the server.
#[derive(Clone, Debug)]
pub struct SessionCredentials {
    pub token: String,
    pub user_id: String,
}

impl SessionCredentials {
    pub fn from_file(fc: &SessionFileConfig) -> Result<Self, SyncError> {
        let token = fc
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SyncError::Config("session.token is not set".into()))?;
        let user_id = fc
            .user_id
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| SyncError::Config("session.user_id is not set".into()))?;
        Ok(Self { token, user_id })
    }
}

/// Everything a session needs, resolved from a [`FileConfig`].
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub api: ApiConfig,
    pub channel: ChannelConfig,
    pub feed: FeedConfig,
}

impl SyncConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            api: ApiConfig::from_file(&fc.api),
            channel: ChannelConfig::from_file(&fc.realtime),
            feed: FeedConfig::from_file(&fc.feed),
        }
    }
}

// =============================================================================
// Directory layout (derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct CollectorConfig {
    pub data_dir: PathBuf,
}

impl CollectorConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".collector"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    /// Extract the layered file config for this data directory.
    pub fn file_config(&self) -> Result<FileConfig> {
        load_config(&self.data_dir)
            .extract()
            .with_context(|| format!("Invalid config in {:?}", self.config_toml_path()))
    }

    /// Read-modify-write config.toml so the `[session]` table holds these
    /// credentials. Other sections are left as they are.
    pub fn save_session(&self, token: &str, user_id: &str) -> Result<()> {
        let path = self.config_toml_path();
        let mut doc = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            contents
                .parse::<toml::Table>()
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            toml::Table::new()
        };

        let session = doc
            .entry("session")
            .or_insert_with(|| toml::Value::Table(toml::Table::new()))
            .as_table_mut()
            .context("[session] is not a table")?;
        session.insert("token".to_string(), toml::Value::String(token.to_string()));
        session.insert("user_id".to_string(), toml::Value::String(user_id.to_string()));

        let serialized = toml::to_string_pretty(&doc).context("Failed to serialize config.toml")?;
        std::fs::write(&path, serialized)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!("Saved session credentials to {}", path.display());
        Ok(())
    }
}
