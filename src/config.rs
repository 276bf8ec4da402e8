// src/config.rs

use crate::feed::binance::DEFAULT_WS_URL;
use crate::notify::dispatcher::RetryPolicy;
use crate::types::AlertSpec;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub symbols: Vec<String>,
    pub ws_url: String,
    pub reconnect_max_secs: u64,
    /// Per-symbol worker queue capacity.
    pub worker_queue: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatcherConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_secs: u64,
    /// Deliveries running at once; further events wait in the queue.
    pub max_inflight: usize,
}

impl DispatcherConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

// Credentials live outside the engine; these are only read and passed on.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotificationConfig {
    pub discord_webhook: Option<String>,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    /// Bot API host; defaults to api.telegram.org.
    pub telegram_api_url: Option<String>,
    pub test_on_startup: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// Daily rolling log files go here when set.
    pub directory: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub state_file: Option<String>,
    pub snapshot_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub dispatcher: DispatcherConfig,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub status_interval_secs: u64,
    /// Seeded on first start, when there is no saved state.
    pub alerts: Vec<AlertSpec>,
}

impl AppConfig {
    /// `Settings.toml` (optional) overridden by `APP__SECTION__KEY` variables.
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Self::defaults(Config::builder())?
            .add_source(File::with_name("Settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("feed.symbols")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Self::defaults(Config::builder())?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("feed.symbols", Vec::<String>::new())?
            .set_default("feed.ws_url", DEFAULT_WS_URL)?
            .set_default("feed.reconnect_max_secs", 60)?
            .set_default("feed.worker_queue", 256)?
            .set_default("dispatcher.max_attempts", 3)?
            .set_default("dispatcher.base_backoff_ms", 500)?
            .set_default("dispatcher.max_backoff_ms", 10_000)?
            .set_default("dispatcher.request_timeout_secs", 10)?
            .set_default("dispatcher.max_inflight", 64)?
            .set_default("notifications.test_on_startup", false)?
            .set_default("logging.level", "info")?
            .set_default("storage.state_file", "alerts_state.json")?
            .set_default("storage.snapshot_interval_secs", 30)?
            .set_default("status_interval_secs", 60)?
            .set_default("alerts", Vec::<String>::new())
    }
}
