use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};

/// Default server URL
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_GRACE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_TRANSMIT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_MAX_RETRIES: u32 = 3;

const ENV_SERVER_URL: &str = "PROPSYNC_SERVER_URL";
const ENV_DATABASE_PATH: &str = "PROPSYNC_DATABASE_PATH";
const ENV_SYNC_INTERVAL_SECS: &str = "PROPSYNC_SYNC_INTERVAL_SECS";
const ENV_MAX_RETRIES: &str = "PROPSYNC_MAX_RETRIES";

/// Sync engine configuration.
///
/// Built from defaults, then an optional TOML file, then `PROPSYNC_*`
/// environment variables; later sources win.
#[derive(Debug, Clone)]
pub struct Config {
    app: AppConfig,
    database_path: PathBuf,
    sync_interval: Duration,
    grace_delay: Duration,
    transmit_timeout: Duration,
    max_retries: u32,
    auto_sync: bool,
}

/// On-disk shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    server_url: Option<String>,
    database_path: Option<PathBuf>,
    sync_interval_secs: Option<u64>,
    grace_delay_ms: Option<u64>,
    transmit_timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    auto_sync: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig {
                server_url: Some(DEFAULT_SERVER_URL.to_string()),
            },
            database_path: Self::default_database_path(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            grace_delay: DEFAULT_GRACE_DELAY,
            transmit_timeout: DEFAULT_TRANSMIT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            auto_sync: true,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        let app = builder.build()?;
        Ok(Self {
            app,
            ..Self::default()
        })
    }

    /// Load configuration from the default file location and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_config_path().as_deref())
    }

    /// Load configuration from `path` (if it exists) and the environment.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = path {
            if path.exists() {
                tracing::debug!("Loading config from {}", path.display());
                let raw = std::fs::read_to_string(path)?;
                let file: FileConfig = toml::from_str(&raw)?;
                config.apply_file(file)?;
            }
        }

        config.apply_env()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(url) = file.server_url {
            self.app = AppConfig::builder().server_url(url).build()?;
        }
        if let Some(path) = file.database_path {
            self.database_path = path;
        }
        if let Some(secs) = file.sync_interval_secs {
            self.sync_interval = non_zero_secs("sync_interval_secs", secs)?;
        }
        if let Some(ms) = file.grace_delay_ms {
            self.grace_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = file.transmit_timeout_secs {
            self.transmit_timeout = non_zero_secs("transmit_timeout_secs", secs)?;
        }
        if let Some(max_retries) = file.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(auto_sync) = file.auto_sync {
            self.auto_sync = auto_sync;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = std::env::var(ENV_SERVER_URL) {
            self.app = AppConfig::builder().server_url(url).build()?;
        }
        if let Ok(path) = std::env::var(ENV_DATABASE_PATH) {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(raw) = std::env::var(ENV_SYNC_INTERVAL_SECS) {
            let secs = raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key: ENV_SYNC_INTERVAL_SECS,
                message: e.to_string(),
            })?;
            self.sync_interval = non_zero_secs(ENV_SYNC_INTERVAL_SECS, secs)?;
        }
        if let Ok(raw) = std::env::var(ENV_MAX_RETRIES) {
            self.max_retries = raw.parse::<u32>().map_err(|e| ConfigError::InvalidValue {
                key: ENV_MAX_RETRIES,
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// `dirs::config_dir()/propsync/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("propsync");
            path.push("config.toml");
            path
        })
    }

    /// Platform data directory, falling back to the temp dir.
    fn default_database_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("propsync");
        path.push("queue.db");
        path
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url(), path)
    }

    pub fn server_url(&self) -> &str {
        self.app.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn sync_interval(&self) -> Duration {
        self.sync_interval
    }

    pub fn grace_delay(&self) -> Duration {
        self.grace_delay
    }

    pub fn transmit_timeout(&self) -> Duration {
        self.transmit_timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn auto_sync(&self) -> bool {
        self.auto_sync
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_grace_delay(mut self, delay: Duration) -> Self {
        self.grace_delay = delay;
        self
    }

    pub fn with_transmit_timeout(mut self, timeout: Duration) -> Self {
        self.transmit_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_auto_sync(mut self, auto_sync: bool) -> Self {
        self.auto_sync = auto_sync;
        self
    }
}

fn non_zero_secs(key: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}
