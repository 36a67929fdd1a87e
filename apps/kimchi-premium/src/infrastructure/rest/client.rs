//! Reference Data HTTP Client
//!
//! Fetches the Upbit market listing and ticker snapshot, the Binance 24h
//! tickers and the KRW/USD rate. No retries: every caller either degrades
//! (bootstrap) or tries again on its own schedule (FX refresher).

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::types::{BinanceTicker24h, ForexQuote, UpbitMarket};
use crate::application::ports::{MarketDataError, MarketDataSource};
use crate::domain::ticker::{AssetMetadata, FxRate, Symbol, TickerRecord};
use crate::infrastructure::exchange::codec::UpbitCodec;
use crate::infrastructure::exchange::messages::UpbitTickerMessage;

/// Default Upbit REST base URL.
pub const UPBIT_REST_URL: &str = "https://api.upbit.com";

/// Default Binance REST base URL.
pub const BINANCE_REST_URL: &str = "https://api.binance.com";

/// Default FX rate provider base URL.
pub const FX_REST_URL: &str = "https://quotation-api-cdn.dunamu.com";

/// Default request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// FX rate code for KRW per USD.
pub const KRW_USD_CODE: &str = "FRX.KRWUSD";

/// Markets per Upbit ticker request.
const UPBIT_TICKER_CHUNK: usize = 100;

// =============================================================================
// Error Type
// =============================================================================

/// REST collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// The request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success status.
    #[error("{endpoint} returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested endpoint.
        endpoint: String,
    },

    /// The body is not the expected JSON.
    #[error("failed to parse {endpoint}: {message}")]
    Parse {
        /// Requested endpoint.
        endpoint: String,
        /// Parser message.
        message: String,
    },

    /// The body parsed but its content is unusable.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<RestError> for MarketDataError {
    fn from(error: RestError) -> Self {
        match error {
            RestError::Request(e) => Self::Transport {
                message: e.to_string(),
            },
            RestError::Status { status, endpoint } => Self::Status { status, endpoint },
            e @ (RestError::Parse { .. } | RestError::InvalidData(_)) => Self::InvalidResponse {
                message: e.to_string(),
            },
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Base URLs and timeout for the REST collaborators.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Upbit REST base URL.
    pub upbit_base_url: String,
    /// Binance REST base URL.
    pub binance_base_url: String,
    /// FX provider base URL.
    pub fx_base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            upbit_base_url: UPBIT_REST_URL.to_string(),
            binance_base_url: BINANCE_REST_URL.to_string(),
            fx_base_url: FX_REST_URL.to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl RestConfig {
    /// Point every endpoint at one base URL.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            upbit_base_url: base_url.clone(),
            binance_base_url: base_url.clone(),
            fx_base_url: base_url,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the reference-data endpoints.
#[derive(Debug, Clone)]
pub struct ExchangeRestClient {
    client: Client,
    config: RestConfig,
}

impl ExchangeRestClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: RestConfig) -> Result<Self, RestError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        base_url: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RestError> {
        let url = format!("{}{path}", base_url.trim_end_matches('/'));
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(endpoint = path, status = status.as_u16(), "Request rejected");
            return Err(RestError::Status {
                status: status.as_u16(),
                endpoint: path.to_string(),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| RestError::Parse {
            endpoint: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Upbit market listing, all quote currencies.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is invalid.
    pub async fn markets(&self) -> Result<Vec<UpbitMarket>, RestError> {
        self.get_json(
            &self.config.upbit_base_url,
            "/v1/market/all",
            &[("isDetails", "false")],
        )
        .await
    }

    /// Upbit ticker snapshot for `symbols`, flagged as snapshot records.
    ///
    /// # Errors
    ///
    /// Returns an error if any request fails or a body is invalid.
    pub async fn upbit_tickers(&self, symbols: &[Symbol]) -> Result<Vec<TickerRecord>, RestError> {
        let mut records = Vec::with_capacity(symbols.len());
        for chunk in symbols.chunks(UPBIT_TICKER_CHUNK) {
            let markets = chunk.join(",");
            let tickers: Vec<UpbitTickerMessage> = self
                .get_json(
                    &self.config.upbit_base_url,
                    "/v1/ticker",
                    &[("markets", markets.as_str())],
                )
                .await?;
            records.extend(tickers.into_iter().map(UpbitCodec::snapshot_ticker));
        }
        Ok(records)
    }

    /// Binance 24h tickers for every listed symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is invalid.
    pub async fn binance_tickers(&self) -> Result<Vec<TickerRecord>, RestError> {
        let tickers: Vec<BinanceTicker24h> = self
            .get_json(&self.config.binance_base_url, "/api/v3/ticker/24hr", &[])
            .await?;
        Ok(tickers.into_iter().map(TickerRecord::from).collect())
    }

    /// Latest KRW per USD rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the list is empty or the rate
    /// is not positive.
    pub async fn fx_rate(&self) -> Result<FxRate, RestError> {
        let quotes: Vec<ForexQuote> = self
            .get_json(
                &self.config.fx_base_url,
                "/v1/forex/recent",
                &[("codes", KRW_USD_CODE)],
            )
            .await?;

        let quote = quotes
            .into_iter()
            .next()
            .ok_or_else(|| RestError::InvalidData("empty FX response".to_string()))?;

        if quote.base_price <= rust_decimal::Decimal::ZERO {
            return Err(RestError::InvalidData(format!(
                "non-positive FX rate {} for {}",
                quote.base_price, quote.code
            )));
        }

        let observed_at = DateTime::from_timestamp_millis(quote.timestamp).ok_or_else(|| {
            RestError::InvalidData(format!("FX timestamp out of range: {}", quote.timestamp))
        })?;

        Ok(FxRate::new(quote.base_price, observed_at))
    }
}

#[async_trait]
impl MarketDataSource for ExchangeRestClient {
    async fn fetch_markets(&self) -> Result<Vec<AssetMetadata>, MarketDataError> {
        Ok(self
            .markets()
            .await?
            .into_iter()
            .map(AssetMetadata::from)
            .collect())
    }

    async fn fetch_primary_tickers(
        &self,
        symbols: &[Symbol],
    ) -> Result<Vec<TickerRecord>, MarketDataError> {
        Ok(self.upbit_tickers(symbols).await?)
    }

    async fn fetch_counterpart_tickers(&self) -> Result<Vec<TickerRecord>, MarketDataError> {
        Ok(self.binance_tickers().await?)
    }

    async fn fetch_fx_rate(&self) -> Result<FxRate, MarketDataError> {
        Ok(self.fx_rate().await?)
    }
}
