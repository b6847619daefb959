use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// Holding is a user-owned position as stored by the holdings service.
/// The ticker is the unique key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub name: String,
    pub ticker: String,
    pub quantity: i64,
    pub buy_price: f64,
    #[serde(default)]
    pub current_price: f64,
}

/// Body of a create request. `current_price` falls back to `buy_price`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HoldingInput {
    pub name: String,
    pub ticker: String,
    pub quantity: i64,
    pub buy_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
}

impl HoldingInput {
    pub fn new(name: &str, ticker: &str, quantity: i64, buy_price: f64) -> Self {
        Self {
            name: name.to_string(),
            ticker: ticker.to_string(),
            quantity,
            buy_price,
            current_price: None,
        }
    }

    /// Validate and normalize the input before it goes on the wire.
    pub fn normalized(&self) -> Result<HoldingInput> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(TrackerError::Validation("name must not be empty".to_string()));
        }
        let ticker = normalize_ticker(&self.ticker)?;
        validate_quantity(self.quantity)?;
        validate_price("buy price", self.buy_price)?;
        let current_price = self.current_price.unwrap_or(self.buy_price);
        validate_price("current price", current_price)?;

        Ok(HoldingInput {
            name: name.to_string(),
            ticker,
            quantity: self.quantity,
            buy_price: self.buy_price,
            current_price: Some(current_price),
        })
    }
}

/// Partial update. Fields left as `None` are not sent and keep their stored value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HoldingUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
}

impl HoldingUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(TrackerError::Validation("name must not be empty".to_string()));
            }
        }
        if let Some(quantity) = self.quantity {
            validate_quantity(quantity)?;
        }
        if let Some(price) = self.buy_price {
            validate_price("buy price", price)?;
        }
        if let Some(price) = self.current_price {
            validate_price("current price", price)?;
        }
        Ok(())
    }
}

/// Trim and uppercase a ticker symbol. Empty or whitespace-containing tickers are rejected.
pub fn normalize_ticker(ticker: &str) -> Result<String> {
    let ticker = ticker.trim();
    if ticker.is_empty() {
        return Err(TrackerError::Validation("ticker must not be empty".to_string()));
    }
    if ticker.chars().any(char::is_whitespace) {
        return Err(TrackerError::Validation(format!(
            "ticker {:?} must not contain whitespace",
            ticker
        )));
    }
    Ok(ticker.to_uppercase())
}

fn validate_quantity(quantity: i64) -> Result<()> {
    if quantity < 1 {
        return Err(TrackerError::Validation(format!(
            "quantity must be positive, got {}",
            quantity
        )));
    }
    Ok(())
}

fn validate_price(field: &str, price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(TrackerError::Validation(format!(
            "{} must be a non-negative number, got {}",
            field, price
        )));
    }
    Ok(())
}

/// Quote is a point-in-time price reading for one ticker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub ticker: String,
    pub current_price: f64,
    pub daily_change_absolute: f64,
    pub daily_change_percent: f64,
}

/// One bar of the allocation chart.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HoldingBreakdown {
    pub name: String,
    pub ticker: String,
    pub quantity: i64,
    pub current_price: f64,
    pub value: f64,
    pub gain_loss: f64,
    pub daily_change: f64,
    pub allocation_percent: f64,
    /// Whether a fresh quote was used, as opposed to the last known price.
    pub quoted: bool,
}

/// Aggregated result of one refresh cycle.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    pub total_value: f64,
    pub total_cost: f64,
    pub total_gain_loss: f64,
    pub total_gain_loss_percent: f64,
    pub daily_change_absolute: f64,
    pub daily_change_percent: f64,
    pub holding_count: usize,
    pub per_holding_breakdown: Vec<HoldingBreakdown>,
    pub as_of: DateTime<Utc>,
}

/// A symbol suggestion from the holdings service's search endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SymbolMatch {
    #[serde(rename = "1. symbol")]
    pub symbol: String,
    #[serde(rename = "2. name")]
    pub name: String,
    #[serde(rename = "3. type", default)]
    pub kind: Option<String>,
    #[serde(rename = "4. region", default)]
    pub region: Option<String>,
    #[serde(rename = "8. currency", default)]
    pub currency: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct SearchResponse {
    #[serde(rename = "bestMatches", default)]
    pub best_matches: Vec<SymbolMatch>,
}
