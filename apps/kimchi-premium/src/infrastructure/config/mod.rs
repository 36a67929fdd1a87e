//! Configuration Module
//!
//! Configuration loading for the market engine.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_SYMBOL_OVERRIDES_SPEC, DEFAULT_TRADE_SYMBOL, EngineConfig,
    ServerSettings, StreamSettings,
};
