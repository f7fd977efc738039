//! Data models for quotes, the watchlist and price-band alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bucket an alert lands in when none is given.
pub const DEFAULT_BUCKET: &str = "default";

/// A priced snapshot of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Ticker symbol (e.g., "AAPL", "BTC-USD")
    pub symbol: String,
    /// Display name, when the provider knows one
    #[serde(default)]
    pub name: String,
    /// Last traded price
    pub price: f64,
    /// Price change over the session
    pub change: f64,
    /// Percentage change over the session
    pub change_percent: f64,
    /// Session volume
    #[serde(default)]
    pub volume: u64,
    /// When the provider produced the quote
    pub timestamp: DateTime<Utc>,
}

impl Default for Quote {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            name: String::new(),
            price: 0.0,
            change: 0.0,
            change_percent: 0.0,
            volume: 0,
            timestamp: Utc::now(),
        }
    }
}

/// One tracked instrument and the last quote we saw for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistEntry {
    pub symbol: String,
    pub latest_quote: Quote,
}

impl WatchlistEntry {
    pub fn new(quote: Quote) -> Self {
        Self {
            symbol: quote.symbol.clone(),
            latest_quote: quote,
        }
    }

    pub fn price(&self) -> f64 {
        self.latest_quote.price
    }
}

/// Where a price sits relative to an alert's band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RangeStatus {
    /// Not evaluated yet
    #[default]
    Pending,
    Below,
    InRange,
    Above,
}

impl RangeStatus {
    pub fn is_in_range(self) -> bool {
        self == RangeStatus::InRange
    }
}

impl std::fmt::Display for RangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeStatus::Pending => write!(f, "pending"),
            RangeStatus::Below => write!(f, "below"),
            RangeStatus::InRange => write!(f, "in-range"),
            RangeStatus::Above => write!(f, "above"),
        }
    }
}

/// A user-defined price band on one instrument plus its evaluated status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRange {
    pub id: u64,
    pub symbol: String,
    pub min_price: f64,
    pub max_price: f64,
    pub current_price: f64,
    #[serde(default)]
    pub status: RangeStatus,
    #[serde(default)]
    pub percent_deviation: f64,
    /// Presentation-only grouping label
    pub bucket: String,
    #[serde(default = "default_true")]
    pub alert_on_enter: bool,
    #[serde(default = "default_true")]
    pub alert_on_exit: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl AlertRange {
    /// Band formatted the way notifications print it.
    pub fn range_label(&self) -> String {
        format!("{:.2}-{:.2}", self.min_price, self.max_price)
    }
}

/// Kind of boundary crossing between two consecutive evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionKind {
    EnteredRange,
    ExitedRange,
}

/// A qualifying transition observed during one evaluation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub alert_id: u64,
    pub bucket: String,
    pub symbol: String,
    pub kind: TransitionKind,
    pub previous: RangeStatus,
    pub current: RangeStatus,
    pub price: f64,
    pub min_price: f64,
    pub max_price: f64,
    /// Whether the alert's enter/exit flag asks for this transition to be announced
    pub notify: bool,
}

/// Health of the quote provider as seen by the last refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connectivity::Unknown => write!(f, "Connecting"),
            Connectivity::Healthy => write!(f, "Online"),
            Connectivity::Unhealthy => write!(f, "Offline"),
        }
    }
}
