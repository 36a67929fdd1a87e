//! Engine Configuration Settings
//!
//! Configuration types for the market engine, loaded from environment
//! variables. Unparseable numbers fall back to their defaults; values that
//! would stall the engine are rejected.

use std::time::Duration;

use crate::domain::correlation::{MappingParseError, SymbolMapper};
use crate::domain::subscription::MessageFormat;
use crate::domain::ticker::Symbol;
use crate::infrastructure::exchange::{
    BINANCE_WS_URL, ConnectionConfig, DEFAULT_SOCKET_TIMEOUT, DEFAULT_THROTTLE_INTERVAL,
    UPBIT_WS_URL,
};
use crate::infrastructure::rest::{
    BINANCE_REST_URL, DEFAULT_HTTP_TIMEOUT, FX_REST_URL, RestConfig, UPBIT_REST_URL,
};

/// Default override table, in `KIMCHI_SYMBOL_OVERRIDES` syntax.
pub const DEFAULT_SYMBOL_OVERRIDES_SPEC: &str = "BTT=BTTC,BTG=,NU=,POLY=";

/// Default trade feed.
pub const DEFAULT_TRADE_SYMBOL: &str = "KRW-BTC";

/// WebSocket stream settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Upbit WebSocket URL.
    pub upbit_url: String,
    /// Binance WebSocket URL.
    pub binance_url: String,
    /// Liveness timeout, also the reconnect delay.
    pub socket_timeout: Duration,
    /// Snapshot publication interval.
    pub throttle_interval: Duration,
    /// Upbit payload format.
    pub message_format: MessageFormat,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            upbit_url: UPBIT_WS_URL.to_string(),
            binance_url: BINANCE_WS_URL.to_string(),
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            message_format: MessageFormat::default(),
        }
    }
}

impl StreamSettings {
    /// Connection configuration for the Upbit stream.
    #[must_use]
    pub fn upbit_connection(&self) -> ConnectionConfig {
        self.connection(&self.upbit_url)
    }

    /// Connection configuration for the Binance stream.
    #[must_use]
    pub fn binance_connection(&self) -> ConnectionConfig {
        self.connection(&self.binance_url)
    }

    fn connection(&self, url: &str) -> ConnectionConfig {
        ConnectionConfig::new(url)
            .with_socket_timeout(self.socket_timeout)
            .with_throttle_interval(self.throttle_interval)
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health and market list HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// WebSocket settings.
    pub streams: StreamSettings,
    /// REST collaborator settings.
    pub rest: RestConfig,
    /// Server port settings.
    pub server: ServerSettings,
    /// FX refresh period.
    pub fx_refresh_interval: Duration,
    /// Market whose trades are streamed at startup.
    pub trade_symbol: Symbol,
    /// Counterpart symbol overrides.
    pub symbol_mapper: SymbolMapper,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            streams: StreamSettings::default(),
            rest: RestConfig::default(),
            server: ServerSettings::default(),
            fx_refresh_interval: Duration::from_secs(60),
            trade_symbol: DEFAULT_TRADE_SYMBOL.to_string(),
            symbol_mapper: SymbolMapper::default(),
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a timing would be zero or the override table is
    /// malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a timing would be zero or the override table is
    /// malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env = Lookup(lookup);

        let streams = StreamSettings {
            upbit_url: env.string("UPBIT_WS_URL", &defaults.streams.upbit_url),
            binance_url: env.string("BINANCE_WS_URL", &defaults.streams.binance_url),
            socket_timeout: env.duration_millis(
                "KIMCHI_SOCKET_TIMEOUT_MS",
                defaults.streams.socket_timeout,
            ),
            throttle_interval: env
                .duration_millis("KIMCHI_THROTTLE_MS", defaults.streams.throttle_interval),
            message_format: env
                .get("KIMCHI_MESSAGE_FORMAT")
                .map(|s| MessageFormat::from_str_case_insensitive(&s))
                .unwrap_or_default(),
        };

        if streams.socket_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("KIMCHI_SOCKET_TIMEOUT_MS".to_string()));
        }
        if streams.throttle_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("KIMCHI_THROTTLE_MS".to_string()));
        }

        let rest = RestConfig {
            upbit_base_url: env.string("UPBIT_REST_URL", UPBIT_REST_URL),
            binance_base_url: env.string("BINANCE_REST_URL", BINANCE_REST_URL),
            fx_base_url: env.string("FX_REST_URL", FX_REST_URL),
            timeout: env.duration_secs("KIMCHI_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT),
        };

        let fx_refresh_interval =
            env.duration_secs("KIMCHI_FX_REFRESH_SECS", defaults.fx_refresh_interval);
        if fx_refresh_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("KIMCHI_FX_REFRESH_SECS".to_string()));
        }

        let server = ServerSettings {
            health_port: env.parse("KIMCHI_HEALTH_PORT", defaults.server.health_port),
        };

        let trade_symbol = env
            .string("KIMCHI_TRADE_SYMBOL", DEFAULT_TRADE_SYMBOL)
            .to_uppercase();

        let overrides = env.string("KIMCHI_SYMBOL_OVERRIDES", DEFAULT_SYMBOL_OVERRIDES_SPEC);
        let symbol_mapper = SymbolMapper::parse_overrides(&overrides)?;

        Ok(Self {
            streams,
            rest,
            server,
            fx_refresh_interval,
            trade_symbol,
            symbol_mapper,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A timing variable resolved to zero.
    #[error("environment variable {0} must be greater than zero")]
    ZeroDuration(String),
    /// `KIMCHI_SYMBOL_OVERRIDES` is malformed.
    #[error("invalid KIMCHI_SYMBOL_OVERRIDES: {0}")]
    SymbolOverrides(#[from] MappingParseError),
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
