// src/quote.rs
use crate::forms::Symbol;
use crate::models::Quote;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("quote request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("quote provider returned HTTP {0}")]
    Status(StatusCode),
}

/// Current price and display name for a ticker. `Ok(None)` means the provider does not
/// know the symbol.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn lookup(&self, symbol: &Symbol) -> Result<Option<Quote>, QuoteError>;
}

#[derive(Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
}

#[derive(Deserialize)]
struct SymbolSearchResponse {
    #[serde(rename = "bestMatches", default)]
    best_matches: Vec<SearchMatch>,
}

#[derive(Deserialize)]
struct SearchMatch {
    #[serde(rename = "1. symbol")]
    symbol: String,
    #[serde(rename = "2. name")]
    name: String,
}

pub struct AlphaVantage {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AlphaVantage {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        AlphaVantage {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        function: &str,
        params: &[(&str, &str)],
    ) -> Result<T, QuoteError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("function", function), ("apikey", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(QuoteError::Status(response.status()));
        }
        Ok(response.json::<T>().await?)
    }

    async fn price(&self, symbol: &Symbol) -> Result<Option<(String, Decimal)>, QuoteError> {
        let response: GlobalQuoteResponse = self
            .get("GLOBAL_QUOTE", &[("symbol", symbol.as_str())])
            .await?;
        if let Some(note) = response.note.or(response.information) {
            warn!("Quote provider declined lookup for {}: {}", symbol, note);
            return Ok(None);
        }
        let quote = match response.global_quote {
            Some(quote) => quote,
            None => return Ok(None),
        };
        let price = quote
            .price
            .as_deref()
            .and_then(|price| Decimal::from_str(price.trim()).ok())
            .filter(|price| price.is_sign_positive() && !price.is_zero());
        Ok(price.map(|price| (quote.symbol.unwrap_or_else(|| symbol.to_string()), price)))
    }

    async fn name(&self, symbol: &str) -> Result<Option<String>, QuoteError> {
        let response: SymbolSearchResponse =
            self.get("SYMBOL_SEARCH", &[("keywords", symbol)]).await?;
        Ok(response
            .best_matches
            .into_iter()
            .find(|m| m.symbol.eq_ignore_ascii_case(symbol))
            .map(|m| m.name))
    }
}

#[async_trait]
impl QuoteSource for AlphaVantage {
    async fn lookup(&self, symbol: &Symbol) -> Result<Option<Quote>, QuoteError> {
        let (symbol, price) = match self.price(symbol).await? {
            Some(found) => found,
            None => {
                debug!("No quote for {}", symbol);
                return Ok(None);
            }
        };
        let name = match self.name(&symbol).await {
            Ok(Some(name)) => name,
            Ok(None) => symbol.clone(),
            Err(e) => {
                warn!("Name lookup for {} failed, using the symbol: {}", symbol, e);
                symbol.clone()
            }
        };
        Ok(Some(Quote { symbol, name, price }))
    }
}
