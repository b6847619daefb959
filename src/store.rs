use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::error::{Result, TrackerError};
use crate::finnhub::parse_base_url;
use crate::models::{
    normalize_ticker, Holding, HoldingInput, HoldingUpdate, SearchResponse, SymbolMatch,
};

/// Remote holdings collection. Every call is a fresh round trip.
#[async_trait]
pub trait HoldingsStore: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Holding>>;
    async fn add(&self, input: HoldingInput) -> Result<Holding>;
    async fn update(&self, ticker: &str, update: HoldingUpdate) -> Result<Holding>;
    async fn delete(&self, ticker: &str) -> Result<()>;
    async fn search(&self, keyword: &str) -> Result<Vec<SymbolMatch>>;
}

/// HTTP client for the `/stocks` resource of the holdings service.
#[derive(Clone)]
pub struct HttpHoldingsStore {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl HttpHoldingsStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrackerError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
        })
    }

    fn stocks_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TrackerError::Config(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .push("stocks")
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl HoldingsStore for HttpHoldingsStore {
    async fn list_all(&self) -> Result<Vec<Holding>> {
        let response = self.client.get(self.stocks_url(&[])?).send().await?;
        let response = check_status(response, None).await?;
        decode(response).await
    }

    async fn add(&self, input: HoldingInput) -> Result<Holding> {
        let input = input.normalized()?;
        tracing::debug!("Adding stock {:?}", input);

        let response = self
            .client
            .post(self.stocks_url(&[])?)
            .json(&input)
            .send()
            .await?;
        let response = check_status(response, Some(input.ticker.as_str())).await?;
        let holding: Holding = decode(response).await?;
        tracing::info!("Added stock {}", holding.ticker);
        Ok(holding)
    }

    async fn update(&self, ticker: &str, update: HoldingUpdate) -> Result<Holding> {
        let ticker = normalize_ticker(ticker)?;
        update.validate()?;

        let response = self
            .client
            .put(self.stocks_url(&[ticker.as_str()])?)
            .json(&update)
            .send()
            .await?;
        let response = check_status(response, Some(ticker.as_str())).await?;
        let holding: Holding = decode(response).await?;
        tracing::info!("Updated stock {}", holding.ticker);
        Ok(holding)
    }

    async fn delete(&self, ticker: &str) -> Result<()> {
        let ticker = normalize_ticker(ticker)?;
        let response = self
            .client
            .delete(self.stocks_url(&[ticker.as_str()])?)
            .send()
            .await?;
        check_status(response, Some(ticker.as_str())).await?;
        tracing::info!("Deleted stock {}", ticker);
        Ok(())
    }

    async fn search(&self, keyword: &str) -> Result<Vec<SymbolMatch>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(Vec::new());
        }
        let mut url = self.stocks_url(&["search"])?;
        url.query_pairs_mut().append_pair("keyword", keyword);

        let response = self.client.get(url).send().await?;
        let response = check_status(response, None).await?;
        let body: SearchResponse = decode(response).await?;
        Ok(body.best_matches)
    }
}

/// Map a non-2xx response onto the error taxonomy. `ticker` is set for
/// requests that address a single holding.
async fn check_status(response: Response, ticker: Option<&str>) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if let Some(ticker) = ticker {
        if status == StatusCode::CONFLICT {
            return Err(TrackerError::Conflict(ticker.to_string()));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(TrackerError::NotFound(ticker.to_string()));
        }
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(status, &body);
    tracing::error!("Holdings service error: HTTP {} - {}", status, message);
    Err(TrackerError::Store {
        status: status.as_u16(),
        message,
    })
}

/// Prefer the service's own `message`, then the raw body, then the status reason.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.message.or(parsed.error) {
            return message;
        }
    }
    let body = body.trim();
    if !body.is_empty() {
        return body.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string()
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| TrackerError::Transport(format!("Invalid response body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_urls() {
        let store =
            HttpHoldingsStore::new("http://localhost:8080/api", Duration::from_secs(1)).unwrap();
        assert_eq!(
            store.stocks_url(&[]).unwrap().as_str(),
            "http://localhost:8080/api/stocks"
        );
        assert_eq!(
            store.stocks_url(&["BRK.B"]).unwrap().as_str(),
            "http://localhost:8080/api/stocks/BRK.B"
        );
        assert_eq!(
            store.stocks_url(&["A/B"]).unwrap().as_str(),
            "http://localhost:8080/api/stocks/A%2FB"
        );
    }

    #[test]
    fn test_error_message_sources() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"message":"quantity is required"}"#),
            "quantity is required"
        );
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down"
        );
        assert_eq!(
            error_message(StatusCode::SERVICE_UNAVAILABLE, ""),
            "Service Unavailable"
        );
    }
}
