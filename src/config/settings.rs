use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::error::{RealtimeError, Result};

/// Endpoint used when no URL is configured outside production
pub const DEVELOPMENT_ENDPOINT: &str = "ws://localhost:3001";

/// Path appended to the page origin when deriving a production endpoint
const PRODUCTION_WS_PATH: &str = "/ws";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_run_mode")]
    pub run_mode: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Explicit push endpoint; derived from `origin` or the development
    /// default when absent
    #[serde(default)]
    pub url: Option<String>,
    /// Origin of the hosting page (e.g. `https://ops.example.com`)
    #[serde(default)]
    pub origin: Option<String>,
    /// Heartbeat interval in milliseconds (client sends ping)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Delay before the first reconnect attempt in milliseconds
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Upper bound for any single reconnect delay in milliseconds
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Automatic reconnect attempts before giving up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Jitter factor applied to reconnect delays (0.0 to 1.0)
    #[serde(default)]
    pub reconnect_jitter: f64,
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000 // 30 seconds
}

fn default_reconnect_base_delay_ms() -> u64 {
    2_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Polling interval in milliseconds, 0 disables polling
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Mirror the push connection status into the freshness state
    #[serde(default = "default_enable_websocket_awareness")]
    pub enable_websocket_awareness: bool,
}

fn default_refresh_interval_ms() -> u64 {
    10_000
}

fn default_enable_websocket_awareness() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
}

fn default_run_mode() -> String {
    "development".to_string()
}

impl Settings {
    pub fn new() -> std::result::Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("run_mode", run_mode.clone())?
            .set_default("websocket.heartbeat_interval_ms", 30_000)?
            .set_default("websocket.reconnect_base_delay_ms", 2_000)?
            .set_default("websocket.max_reconnect_attempts", 5)?
            .set_default("coordinator.refresh_interval_ms", 10_000)?
            .set_default("coordinator.enable_websocket_awareness", true)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // WEBSOCKET__URL, COORDINATOR__REFRESH_INTERVAL_MS, LOGGING__JSON, etc.
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        matches!(self.run_mode.as_str(), "production" | "prod")
    }

    /// Resolve the push endpoint for this deployment
    pub fn endpoint(&self) -> Result<String> {
        self.websocket.endpoint(self.is_production())
    }
}

impl WebSocketConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Explicit URL wins; production derives a same-origin endpoint with the
    /// scheme following the page scheme; everything else uses the local
    /// development endpoint.
    pub fn endpoint(&self, production: bool) -> Result<String> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(url.to_string());
        }

        if !production {
            return Ok(DEVELOPMENT_ENDPOINT.to_string());
        }

        let origin = self.origin.as_deref().ok_or_else(|| {
            RealtimeError::InvalidEndpoint(
                "production builds need websocket.url or websocket.origin".to_string(),
            )
        })?;
        derive_same_origin_endpoint(origin)
    }
}

fn derive_same_origin_endpoint(origin: &str) -> Result<String> {
    let (scheme, host) = if let Some(host) = origin.strip_prefix("https://") {
        ("wss", host)
    } else if let Some(host) = origin.strip_prefix("http://") {
        ("ws", host)
    } else {
        return Err(RealtimeError::InvalidEndpoint(format!(
            "unsupported origin scheme: {}",
            origin
        )));
    };

    let host = host.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err(RealtimeError::InvalidEndpoint(format!(
            "origin has no host: {}",
            origin
        )));
    }

    Ok(format!("{}://{}{}", scheme, host, PRODUCTION_WS_PATH))
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: None,
            origin: None,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_jitter: 0.0,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            enable_websocket_awareness: default_enable_websocket_awareness(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            websocket: WebSocketConfig::default(),
            coordinator: CoordinatorConfig::default(),
            logging: LoggingConfig::default(),
            run_mode: default_run_mode(),
        }
    }
}
