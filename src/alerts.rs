//! Alert collection maintenance: creation, bucket moves, cascades and evaluation.

use crate::evaluator::{detect_transition, evaluate};
use crate::models::{AlertRange, RangeStatus, Transition, TransitionKind, WatchlistEntry};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Reasons an alert operation is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum AlertError {
    #[error("a symbol is required")]
    MissingSymbol,
    #[error("{field} must be a number, got {value:?}")]
    NonNumeric { field: &'static str, value: String },
    #[error("{field} must be a positive price, got {value}")]
    InvalidPrice { field: &'static str, value: f64 },
    #[error("minimum price {min} must be below maximum price {max}")]
    InvertedRange { min: f64, max: f64 },
    #[error("{0} is not on the watchlist")]
    UnknownSymbol(String),
    #[error("no alert with id {id} in bucket {bucket:?}")]
    NotFound { id: u64, bucket: String },
    #[error("no alert with id {0}")]
    UnknownId(u64),
}

/// User input for a new alert, before validation.
#[derive(Debug, Clone)]
pub struct AlertDraft {
    pub symbol: String,
    pub min_price: f64,
    pub max_price: f64,
    pub bucket: String,
    pub alert_on_enter: bool,
    pub alert_on_exit: bool,
}

impl AlertDraft {
    /// Build a draft from raw text bounds, as typed on the command line.
    pub fn parse(symbol: &str, min: &str, max: &str, bucket: &str) -> Result<Self, AlertError> {
        Ok(Self {
            symbol: symbol.trim().to_uppercase(),
            min_price: parse_price("min", min)?,
            max_price: parse_price("max", max)?,
            bucket: bucket.to_string(),
            alert_on_enter: true,
            alert_on_exit: true,
        })
    }
}

fn parse_price(field: &'static str, raw: &str) -> Result<f64, AlertError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| AlertError::NonNumeric {
            field,
            value: raw.to_string(),
        })
}

/// Validate a draft against the watchlist and build a pending alert.
///
/// The alert's current price is seeded from the watchlist entry; its status
/// stays `Pending` until the next evaluation so creation never notifies.
pub fn create_alert(
    draft: AlertDraft,
    watchlist: &[WatchlistEntry],
    id: u64,
    now: DateTime<Utc>,
) -> Result<AlertRange, AlertError> {
    let symbol = draft.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(AlertError::MissingSymbol);
    }
    for (field, value) in [("min", draft.min_price), ("max", draft.max_price)] {
        if !value.is_finite() || value <= 0.0 {
            return Err(AlertError::InvalidPrice { field, value });
        }
    }
    if draft.min_price >= draft.max_price {
        return Err(AlertError::InvertedRange {
            min: draft.min_price,
            max: draft.max_price,
        });
    }
    let entry = watchlist
        .iter()
        .find(|e| e.symbol == symbol)
        .ok_or_else(|| AlertError::UnknownSymbol(symbol.clone()))?;

    Ok(AlertRange {
        id,
        symbol,
        min_price: draft.min_price,
        max_price: draft.max_price,
        current_price: entry.price(),
        status: RangeStatus::Pending,
        percent_deviation: 0.0,
        bucket: draft.bucket,
        alert_on_enter: draft.alert_on_enter,
        alert_on_exit: draft.alert_on_exit,
        created_at: now,
        updated_at: now,
    })
}

/// Bucket name to the ordered alerts inside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertCollection {
    buckets: BTreeMap<String, Vec<AlertRange>>,
}

impl AlertCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&str, &[AlertRange])> {
        self.buckets.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn bucket(&self, name: &str) -> Option<&[AlertRange]> {
        self.buckets.get(name).map(Vec::as_slice)
    }

    /// Every alert, bucket by bucket, in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &AlertRange> {
        self.buckets.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, id: u64) -> Option<&AlertRange> {
        self.iter().find(|a| a.id == id)
    }

    /// Bucket currently holding the alert.
    pub fn bucket_of(&self, id: u64) -> Option<&str> {
        self.buckets
            .iter()
            .find(|(_, alerts)| alerts.iter().any(|a| a.id == id))
            .map(|(name, _)| name.as_str())
    }

    /// Pick an id no alert in the collection uses.
    pub fn fresh_id(&self) -> u64 {
        let mut rng = rand::thread_rng();
        loop {
            let id = rng.gen_range(100_000..1_000_000);
            if self.find(id).is_none() {
                return id;
            }
        }
    }

    /// Append to the alert's bucket, creating the bucket if needed.
    pub fn add(&mut self, alert: AlertRange) {
        self.buckets
            .entry(alert.bucket.clone())
            .or_default()
            .push(alert);
    }

    pub fn remove(&mut self, bucket: &str, id: u64) -> Result<AlertRange, AlertError> {
        let not_found = || AlertError::NotFound {
            id,
            bucket: bucket.to_string(),
        };
        let alerts = self.buckets.get_mut(bucket).ok_or_else(not_found)?;
        let pos = alerts.iter().position(|a| a.id == id).ok_or_else(not_found)?;
        Ok(alerts.remove(pos))
    }

    /// Take the alert out of `from` and append it to `to`.
    ///
    /// Only the bucket label follows the alert; every other field is kept as is.
    pub fn move_alert(&mut self, id: u64, from: &str, to: &str) -> Result<(), AlertError> {
        if from == to {
            if self.bucket(from).is_some_and(|b| b.iter().any(|a| a.id == id)) {
                return Ok(());
            }
            return Err(AlertError::NotFound {
                id,
                bucket: from.to_string(),
            });
        }
        let mut alert = self.remove(from, id)?;
        alert.bucket = to.to_string();
        self.add(alert);
        Ok(())
    }

    /// Drop every alert on `symbol` across all buckets. Returns how many went.
    pub fn remove_all_for_symbol(&mut self, symbol: &str) -> usize {
        let before = self.len();
        for alerts in self.buckets.values_mut() {
            alerts.retain(|a| a.symbol != symbol);
        }
        before - self.len()
    }

    /// Re-evaluate every alert against `prices` (symbol to latest price).
    ///
    /// Alerts whose symbol has no price are carried over untouched. The
    /// returned transitions are in evaluation order: buckets by name, then
    /// position inside the bucket.
    pub fn evaluate_all(
        &self,
        prices: &HashMap<String, f64>,
        now: DateTime<Utc>,
    ) -> (AlertCollection, Vec<Transition>) {
        let mut transitions = Vec::new();
        let mut updated = self.clone();

        for alerts in updated.buckets.values_mut() {
            for alert in alerts.iter_mut() {
                let Some(&price) = prices.get(&alert.symbol) else {
                    continue;
                };
                let eval = evaluate(price, alert.min_price, alert.max_price);
                let previous = alert.status;

                alert.current_price = price;
                alert.status = eval.status;
                alert.percent_deviation = eval.percent_deviation;
                alert.updated_at = now;

                if let Some(kind) = detect_transition(previous, eval.status) {
                    let notify = match kind {
                        TransitionKind::EnteredRange => alert.alert_on_enter,
                        TransitionKind::ExitedRange => alert.alert_on_exit,
                    };
                    transitions.push(Transition {
                        alert_id: alert.id,
                        bucket: alert.bucket.clone(),
                        symbol: alert.symbol.clone(),
                        kind,
                        previous,
                        current: eval.status,
                        price,
                        min_price: alert.min_price,
                        max_price: alert.max_price,
                        notify,
                    });
                }
            }
        }

        (updated, transitions)
    }
}
