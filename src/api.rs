//! Quote providers: Yahoo Finance (JSON batch) and FinViz (CSV export).
//!
//! A provider answers a batch request with whatever it could price. Symbols
//! missing from the answer are not errors; only a transport-level failure of
//! the whole batch is.

use crate::models::Quote;
use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

const YAHOO_FINANCE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";

const FINVIZ_EXPORT_URL: &str = "https://elite.finviz.com/quote_export.ashx";

/// Yahoo rejects requests without a browser-looking agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Best-effort batch quote source.
pub trait QuoteProvider: Send + Sync {
    /// Quote as many of `symbols` as possible. `Err` means the whole batch failed.
    fn get_quotes(&self, symbols: &[String]) -> impl Future<Output = Result<Vec<Quote>>> + Send;
}

fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to create HTTP client")
}

/// Yahoo Finance API client.
pub struct YahooFinanceClient {
    client: Client,
}

impl YahooFinanceClient {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
        })
    }
}

impl QuoteProvider for YahooFinanceClient {
    async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let symbols_param = symbols
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}?symbols={}", YAHOO_FINANCE_URL, symbols_param);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch quotes from Yahoo Finance")?;

        if !response.status().is_success() {
            anyhow::bail!("Yahoo Finance API returned error: {}", response.status());
        }

        let data: YahooResponse = response
            .json()
            .await
            .context("Failed to parse Yahoo Finance response")?;

        Ok(data
            .quote_response
            .result
            .into_iter()
            .filter_map(YahooQuote::into_quote)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooResponse {
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    result: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooQuote {
    symbol: String,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    regular_market_change: Option<f64>,
    #[serde(default)]
    regular_market_change_percent: Option<f64>,
    #[serde(default)]
    regular_market_volume: Option<u64>,
    #[serde(default)]
    regular_market_time: Option<i64>,
}

impl YahooQuote {
    /// A result without a price is an omission, not a zero quote.
    fn into_quote(self) -> Option<Quote> {
        let price = self.regular_market_price.filter(|p| p.is_finite())?;
        Some(Quote {
            name: self.short_name.or(self.long_name).unwrap_or_default(),
            price,
            change: self.regular_market_change.unwrap_or(0.0),
            change_percent: self.regular_market_change_percent.unwrap_or(0.0),
            volume: self.regular_market_volume.unwrap_or(0),
            timestamp: self
                .regular_market_time
                .and_then(|t| Utc.timestamp_opt(t, 0).single())
                .unwrap_or_else(Utc::now),
            symbol: self.symbol,
        })
    }
}

/// FinViz Elite CSV export client. One request per symbol, issued concurrently.
pub struct FinvizClient {
    client: Client,
    auth: String,
}

impl FinvizClient {
    pub fn new(timeout_secs: u64, auth: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            auth: auth.into(),
        })
    }

    async fn get_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        let url = format!(
            "{}?t={}&auth={}",
            FINVIZ_EXPORT_URL,
            urlencoding::encode(symbol),
            urlencoding::encode(&self.auth)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {} from FinViz", symbol))?;

        if !response.status().is_success() {
            warn!(symbol, status = %response.status(), "FinViz returned an error status");
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read FinViz response for {}", symbol))?;
        Ok(parse_finviz_csv(symbol, &body))
    }
}

impl QuoteProvider for FinvizClient {
    async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let results = join_all(symbols.iter().map(|s| self.get_quote(s))).await;

        let mut quotes = Vec::new();
        let mut transport_failures = 0;
        let mut last_error = None;
        for (symbol, result) in symbols.iter().zip(results) {
            match result {
                Ok(Some(quote)) => quotes.push(quote),
                Ok(None) => debug!(symbol = %symbol, "no usable FinViz data"),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "FinViz request failed");
                    transport_failures += 1;
                    last_error = Some(e);
                }
            }
        }

        // Only a batch where every request died in transit counts as a failure
        match last_error {
            Some(e) if transport_failures == symbols.len() => Err(e),
            _ => Ok(quotes),
        }
    }
}

/// Parse FinViz's `Date,Open,High,Low,Close,Volume` export. The last line is the
/// freshest bar; price is its close and change is measured from its open.
pub fn parse_finviz_csv(symbol: &str, body: &str) -> Option<Quote> {
    let last_line = body.trim().lines().last()?;
    let values: Vec<&str> = last_line.split(',').map(str::trim).collect();
    if values.len() < 5 {
        return None;
    }

    let open: f64 = values[1].parse().ok()?;
    let close: f64 = values[4].parse().ok()?;
    if !open.is_finite() || !close.is_finite() {
        return None;
    }
    let volume = values
        .get(5)
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v.max(0.0) as u64)
        .unwrap_or(0);

    let change = close - open;
    let change_percent = if open != 0.0 { change / open * 100.0 } else { 0.0 };

    Some(Quote {
        symbol: symbol.to_uppercase(),
        name: String::new(),
        price: close,
        change,
        change_percent,
        volume,
        timestamp: Utc::now(),
    })
}

/// Whichever provider the configuration selected.
pub enum QuoteSource {
    Yahoo(YahooFinanceClient),
    Finviz(FinvizClient),
}

impl QuoteProvider for QuoteSource {
    async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        match self {
            QuoteSource::Yahoo(client) => client.get_quotes(symbols).await,
            QuoteSource::Finviz(client) => client.get_quotes(symbols).await,
        }
    }
}

/// Normalise user input into a ticker: trimmed and uppercase.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
