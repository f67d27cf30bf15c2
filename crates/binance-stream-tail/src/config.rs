/*
[INPUT]:  YAML configuration file, BINANCE_API_KEY environment variable
[OUTPUT]: Validated tail configuration and the clients it describes
[POS]:    Configuration layer - stream endpoint, REST session, subscriptions
[UPDATE]: When adding new configuration options
*/

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail, ensure};
use binance_stream_adapter::ws::{STREAM_BASE_URL, Transport, TungsteniteTransport};
use binance_stream_adapter::{
    BinanceClient, ClientConfig, ReconnectPolicy, StreamClient, StreamConfig, StreamKind,
};
use serde::{Deserialize, Serialize};

pub const API_KEY_ENV: &str = "BINANCE_API_KEY";
const API_BASE_URL: &str = "https://api.binance.com";

/// Top-level configuration for the tail runner
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TailConfig {
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub api: ApiSection,
    /// Market subscriptions to open
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
    #[serde(default)]
    pub user_stream: UserStreamSection,
}

/// Stream endpoint settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamSection {
    #[serde(default = "default_stream_url")]
    pub base_url: String,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Listen key renewal period in seconds
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            base_url: default_stream_url(),
            reconnect: ReconnectConfig::default(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

/// Delay between a disconnect and the next attempt
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReconnectConfig {
    Fixed { delay_ms: u64 },
    Exponential { initial_ms: u64, max_ms: u64 },
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig::Fixed { delay_ms: 1000 }
    }
}

impl ReconnectConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        match *self {
            ReconnectConfig::Fixed { delay_ms } => {
                ReconnectPolicy::Fixed(Duration::from_millis(delay_ms))
            }
            ReconnectConfig::Exponential { initial_ms, max_ms } => ReconnectPolicy::Exponential {
                initial: Duration::from_millis(initial_ms),
                max: Duration::from_millis(max_ms),
            },
        }
    }
}

/// REST session settings (user stream only)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiSection {
    #[serde(default = "default_api_url")]
    pub base_url: String,
    /// Falls back to the BINANCE_API_KEY environment variable
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// One market subscription: a channel kind plus the symbols it fans out to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubscriptionConfig {
    #[serde(flatten)]
    pub kind: StreamKind,
    #[serde(default)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserStreamSection {
    #[serde(default)]
    pub enabled: bool,
}

fn default_stream_url() -> String {
    STREAM_BASE_URL.to_string()
}

fn default_api_url() -> String {
    API_BASE_URL.to_string()
}

fn default_keepalive_secs() -> u64 {
    50
}

fn default_timeout_secs() -> u64 {
    30
}

impl TailConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("parse config yaml")?;
        Ok(config)
    }

    /// `<config_dir>/binance-stream/tail.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("binance-stream").join("tail.yaml"))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_with_api_key(std::env::var(API_KEY_ENV).ok())
    }

    pub(crate) fn validate_with_api_key(&self, env_api_key: Option<String>) -> anyhow::Result<()> {
        ensure!(
            !self.subscriptions.is_empty() || self.user_stream.enabled,
            "config has no subscriptions and the user stream is disabled"
        );
        ensure!(
            self.stream.keepalive_secs > 0,
            "stream.keepalive_secs must be positive"
        );
        if let ReconnectConfig::Exponential { initial_ms, max_ms } = self.stream.reconnect {
            ensure!(
                initial_ms > 0 && initial_ms <= max_ms,
                "stream.reconnect: initial_ms must be positive and not exceed max_ms"
            );
        }

        for (index, subscription) in self.subscriptions.iter().enumerate() {
            let label = format!("subscriptions[{index}] ({})", subscription.kind.name());
            subscription
                .kind
                .validate()
                .with_context(|| label.clone())?;
            if !subscription.kind.is_per_symbol() {
                continue;
            }
            if subscription.symbols.is_empty() {
                bail!("{label}: at least one symbol is required");
            }
            for symbol in &subscription.symbols {
                subscription
                    .kind
                    .path(symbol)
                    .with_context(|| label.clone())?;
            }
        }

        if self.user_stream.enabled && self.resolve_api_key(env_api_key).is_none() {
            bail!("user_stream is enabled but no api key is configured (api.api_key or {API_KEY_ENV})");
        }
        Ok(())
    }

    fn resolve_api_key(&self, env_api_key: Option<String>) -> Option<String> {
        self.api
            .api_key
            .clone()
            .or(env_api_key)
            .filter(|key| !key.trim().is_empty())
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            base_url: self.stream.base_url.clone(),
            reconnect: self.stream.reconnect.policy(),
            keepalive_interval: Duration::from_secs(self.stream.keepalive_secs),
        }
    }

    /// REST session for the user stream, or `None` when it is disabled
    pub fn session_client(&self) -> anyhow::Result<Option<BinanceClient>> {
        if !self.user_stream.enabled {
            return Ok(None);
        }
        let api_key = self
            .resolve_api_key(std::env::var(API_KEY_ENV).ok())
            .context("user stream api key")?;
        let config = ClientConfig {
            timeout: Duration::from_secs(self.api.timeout_secs),
            ..ClientConfig::default()
        };
        let client = BinanceClient::with_config_and_base_url(config, &self.api.base_url)
            .context("create REST client")?
            .with_api_key(api_key);
        Ok(Some(client))
    }

    pub fn stream_client(&self) -> anyhow::Result<StreamClient> {
        self.stream_client_with_transport(Arc::new(TungsteniteTransport))
    }

    pub fn stream_client_with_transport(
        &self,
        transport: Arc<dyn Transport>,
    ) -> anyhow::Result<StreamClient> {
        let client = StreamClient::with_transport(self.stream_config(), transport);
        Ok(match self.session_client()? {
            Some(session) => client.with_session(Arc::new(session)),
            None => client,
        })
    }
}
