use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::error::{Result, TrackerError};
use crate::models::{normalize_ticker, Quote};

pub const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1/";

/// A source of per-ticker quotes.
///
/// `Ok(None)` means the upstream answered but has no data for the ticker
/// (Finnhub sends an all-zero body for unknown symbols); the caller should
/// keep the last known price. Every non-2xx status is an `Err`: 401 is a
/// `Config` error because the API key was rejected, anything else (403
/// included) is a `Transport` error, as are network failures, timeouts and
/// undecodable bodies.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn get_quote(&self, ticker: &str) -> Result<Option<Quote>>;
}

/// Response structure for Finnhub API
#[derive(Deserialize, Clone, Debug)]
pub struct FinnhubQuote {
    pub c: f64, // Current price
    #[serde(default)]
    pub d: Option<f64>, // Day change
    #[serde(default)]
    pub dp: Option<f64>, // Day change percentage
    #[serde(default)]
    pub pc: f64, // Previous close
}

impl FinnhubQuote {
    /// Finnhub answers unknown symbols with an all-zero body instead of a 404.
    pub fn into_quote(self, ticker: &str) -> Option<Quote> {
        if !self.c.is_finite() || self.c <= 0.0 {
            return None;
        }
        Some(Quote {
            ticker: ticker.to_string(),
            current_price: self.c,
            daily_change_absolute: self.d.unwrap_or(0.0),
            daily_change_percent: self.dp.unwrap_or(0.0),
        })
    }
}

/// Quote gateway backed by the Finnhub `/quote` endpoint.
#[derive(Clone)]
pub struct FinnhubClient {
    client: reqwest::Client,
    base_url: Url,
}

impl FinnhubClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        if api_key.is_empty() {
            return Err(TrackerError::Config("Missing FINNHUB_API_KEY".to_string()));
        }
        let mut headers = HeaderMap::new();
        let mut token = HeaderValue::from_str(api_key)
            .map_err(|e| TrackerError::Config(format!("Invalid API key format: {}", e)))?;
        token.set_sensitive(true);
        headers.insert("X-Finnhub-Token", token);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| TrackerError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
        })
    }

    fn quote_url(&self, ticker: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join("quote")
            .map_err(|e| TrackerError::Config(format!("Invalid quote URL: {}", e)))?;
        url.query_pairs_mut().append_pair("symbol", ticker);
        Ok(url)
    }
}

#[async_trait]
impl QuoteSource for FinnhubClient {
    async fn get_quote(&self, ticker: &str) -> Result<Option<Quote>> {
        let ticker = normalize_ticker(ticker)?;
        let url = self.quote_url(&ticker)?;
        tracing::debug!("Fetching quote for {}", ticker);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            tracing::error!("Finnhub rejected the API key: HTTP {}", status);
            return Err(TrackerError::Config(format!(
                "Finnhub rejected the API key: HTTP {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(TrackerError::Transport(format!(
                "Failed to fetch stock price for {}: HTTP {}",
                ticker, status
            )));
        }

        let quote: FinnhubQuote = response.json().await.map_err(|e| {
            TrackerError::Transport(format!("Invalid quote body for {}: {}", ticker, e))
        })?;
        Ok(quote.into_quote(&ticker))
    }
}

/// Parse a base URL, making sure it ends with a slash so `join` appends to it.
pub(crate) fn parse_base_url(base_url: &str) -> Result<Url> {
    let with_slash = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{}/", base_url)
    };
    Url::parse(&with_slash)
        .map_err(|e| TrackerError::Config(format!("Invalid base URL {}: {}", base_url, e)))
}
