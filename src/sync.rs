//! Watchlist synchronization and the alert phase of a refresh cycle.
//!
//! A cycle runs in two phases, each reading the store at its start and
//! writing it at its end:
//!
//! 1. watchlist: reload, fetch a quote batch, merge, persist
//! 2. alerts: reload, evaluate against the merged quotes, notify, persist
//!
//! The store is the source of truth between phases. Nothing read before an
//! await point is written back after it without being re-read, so a symbol
//! added or removed while a fetch is in flight survives the merge.

use crate::alerts::{AlertCollection, AlertDraft, AlertError, create_alert};
use crate::api::{QuoteProvider, normalize_symbol};
use crate::models::{AlertRange, Connectivity, Quote, Transition, WatchlistEntry};
use crate::notify::{MessageKind, NotificationSink, ToneKind, describe, describe_test};
use crate::storage::{ALERTS_KEY, AUTO_UPDATE_KEY, KeyValueStore, PersistenceGateway, WATCHLIST_KEY};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq)]
pub enum WatchlistError {
    #[error("a symbol is required")]
    EmptySymbol,
    #[error("{0} is already on the watchlist")]
    Duplicate(String),
    #[error("{0} is not on the watchlist")]
    NotWatched(String),
    #[error("no quote available for {0}")]
    Unavailable(String),
    #[error("quote provider failed: {0}")]
    Provider(String),
}

/// Health and progress of the synchronizer, for display.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncStatus {
    pub connectivity: Connectivity,
    pub last_success: Option<DateTime<Utc>>,
    /// Cycles that ran to completion
    pub completed_cycles: u64,
}

/// What one refresh cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    /// Whether the quote batch call succeeded
    pub batch_ok: bool,
    /// Entries whose quote was replaced this cycle
    pub updated: usize,
    pub transitions: Vec<Transition>,
    /// The single tone requested for the cycle, if any. Playback is best
    /// effort, so a muted or failing sink still reports the tone here.
    pub tone: Option<ToneKind>,
    /// Messages handed to the sink
    pub messages: usize,
}

/// Owns the refresh cycle: provider, store and notification sink.
pub struct Synchronizer<P, S, N> {
    provider: P,
    gateway: PersistenceGateway<S>,
    notifier: N,
    status: Mutex<SyncStatus>,
    next_cycle: AtomicU64,
}

impl<P, S, N> Synchronizer<P, S, N>
where
    P: QuoteProvider,
    S: KeyValueStore,
    N: NotificationSink,
{
    pub fn new(provider: P, gateway: PersistenceGateway<S>, notifier: N) -> Self {
        Self {
            provider,
            gateway,
            notifier,
            status: Mutex::new(SyncStatus::default()),
            next_cycle: AtomicU64::new(1),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn gateway(&self) -> &PersistenceGateway<S> {
        &self.gateway
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn status(&self) -> SyncStatus {
        self.status.lock().map(|s| *s).unwrap_or_default()
    }

    fn update_status(&self, f: impl FnOnce(&mut SyncStatus)) {
        if let Ok(mut status) = self.status.lock() {
            f(&mut status);
        }
    }

    pub fn load_watchlist(&self) -> Vec<WatchlistEntry> {
        self.gateway.load(WATCHLIST_KEY, Vec::new())
    }

    pub fn load_alerts(&self) -> AlertCollection {
        self.gateway.load(ALERTS_KEY, AlertCollection::new())
    }

    /// Persisted auto-update switch; on unless turned off.
    pub fn auto_update(&self) -> bool {
        self.gateway.load(AUTO_UPDATE_KEY, true)
    }

    pub fn set_auto_update(&self, enabled: bool) {
        self.gateway.save(AUTO_UPDATE_KEY, &enabled);
        info!(enabled, "auto-update toggled");
    }

    /// One complete refresh cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle = self.next_cycle.fetch_add(1, Ordering::Relaxed);
        debug!(cycle, "refresh cycle started");

        let (watchlist, batch_ok, updated) = self.refresh().await;
        let (transitions, tone, messages) = self.evaluate_alerts(&watchlist);

        self.update_status(|s| s.completed_cycles += 1);
        debug!(cycle, batch_ok, updated, transitions = transitions.len(), "refresh cycle finished");

        CycleReport {
            cycle,
            batch_ok,
            updated,
            transitions,
            tone,
            messages,
        }
    }

    /// Watchlist phase: fetch quotes for every stored symbol and merge them in.
    ///
    /// Returns the merged watchlist as persisted, whether the batch call
    /// succeeded, and how many entries received a new quote. On failure the
    /// stored quotes are returned unchanged.
    pub async fn refresh(&self) -> (Vec<WatchlistEntry>, bool, usize) {
        let symbols: Vec<String> = self.load_watchlist().into_iter().map(|e| e.symbol).collect();
        if symbols.is_empty() {
            return (Vec::new(), true, 0);
        }

        let quotes = match self.provider.get_quotes(&symbols).await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(error = %e, "quote batch failed, keeping previous quotes");
                self.update_status(|s| s.connectivity = Connectivity::Unhealthy);
                return (self.load_watchlist(), false, 0);
            }
        };

        // Re-read after the await: the watchlist may have changed meanwhile
        let mut watchlist = self.load_watchlist();
        let updated = merge_quotes(&mut watchlist, quotes);
        self.gateway.save(WATCHLIST_KEY, &watchlist);

        self.update_status(|s| {
            s.connectivity = Connectivity::Healthy;
            s.last_success = Some(Utc::now());
        });
        (watchlist, true, updated)
    }

    /// Alert phase: evaluate every stored alert against `watchlist` prices,
    /// announce qualifying transitions and persist the result.
    ///
    /// At most one tone plays per call, for the first announced transition;
    /// every announced transition gets its own message.
    pub fn evaluate_alerts(
        &self,
        watchlist: &[WatchlistEntry],
    ) -> (Vec<Transition>, Option<ToneKind>, usize) {
        let alerts = self.load_alerts();
        if alerts.is_empty() {
            return (Vec::new(), None, 0);
        }

        let prices: HashMap<String, f64> = watchlist
            .iter()
            .map(|e| (e.symbol.clone(), e.price()))
            .collect();
        let (alerts, transitions) = alerts.evaluate_all(&prices, Utc::now());

        let mut tone = None;
        let mut messages = 0;
        for transition in transitions.iter().filter(|t| t.notify) {
            info!(
                symbol = %transition.symbol,
                alert = transition.alert_id,
                from = %transition.previous,
                to = %transition.current,
                price = transition.price,
                "range transition"
            );

            if tone.is_none() {
                let kind = ToneKind::from(transition.kind);
                if let Err(e) = self.notifier.play_tone(kind) {
                    debug!(error = %e, "tone not played");
                }
                tone = Some(kind);
            }

            let (title, body) = describe(transition);
            match self.notifier.show_message(&title, &body, MessageKind::from(transition.kind)) {
                Ok(()) => messages += 1,
                Err(e) => debug!(error = %e, "message not shown"),
            }
        }

        self.gateway.save(ALERTS_KEY, &alerts);
        (transitions, tone, messages)
    }

    /// Add a symbol after confirming the provider can quote it.
    pub async fn add_symbol(&self, symbol: &str) -> Result<WatchlistEntry, WatchlistError> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(WatchlistError::EmptySymbol);
        }
        if self.load_watchlist().iter().any(|e| e.symbol == symbol) {
            return Err(WatchlistError::Duplicate(symbol));
        }

        let quotes = self
            .provider
            .get_quotes(std::slice::from_ref(&symbol))
            .await
            .map_err(|e| WatchlistError::Provider(e.to_string()))?;
        let quote = quotes
            .into_iter()
            .find(|q| q.symbol == symbol)
            .ok_or_else(|| WatchlistError::Unavailable(symbol.clone()))?;

        let mut watchlist = self.load_watchlist();
        if watchlist.iter().any(|e| e.symbol == symbol) {
            return Err(WatchlistError::Duplicate(symbol));
        }
        let entry = WatchlistEntry::new(quote);
        watchlist.push(entry.clone());
        self.gateway.save(WATCHLIST_KEY, &watchlist);
        info!(symbol = %entry.symbol, price = entry.price(), "added to watchlist");
        Ok(entry)
    }

    /// Remove a symbol and every alert on it. Returns the number of alerts removed.
    pub fn remove_symbol(&self, symbol: &str) -> Result<usize, WatchlistError> {
        let symbol = normalize_symbol(symbol);
        let mut watchlist = self.load_watchlist();
        let before = watchlist.len();
        watchlist.retain(|e| e.symbol != symbol);
        if watchlist.len() == before {
            return Err(WatchlistError::NotWatched(symbol));
        }

        let mut alerts = self.load_alerts();
        let removed = alerts.remove_all_for_symbol(&symbol);

        self.gateway.save(WATCHLIST_KEY, &watchlist);
        self.gateway.save(ALERTS_KEY, &alerts);
        info!(symbol = %symbol, alerts_removed = removed, "removed from watchlist");
        Ok(removed)
    }

    /// Validate and store a new alert. Creation never notifies.
    pub fn create_alert(&self, draft: AlertDraft) -> Result<AlertRange, AlertError> {
        let watchlist = self.load_watchlist();
        let mut alerts = self.load_alerts();
        let alert = create_alert(draft, &watchlist, alerts.fresh_id(), Utc::now())?;
        alerts.add(alert.clone());
        self.gateway.save(ALERTS_KEY, &alerts);
        info!(id = alert.id, symbol = %alert.symbol, range = %alert.range_label(), bucket = %alert.bucket, "alert created");
        Ok(alert)
    }

    /// Delete an alert; without a bucket, whichever bucket holds it.
    pub fn remove_alert(&self, bucket: Option<&str>, id: u64) -> Result<AlertRange, AlertError> {
        let mut alerts = self.load_alerts();
        let bucket = match bucket {
            Some(bucket) => bucket.to_string(),
            None => alerts
                .bucket_of(id)
                .map(str::to_string)
                .ok_or(AlertError::UnknownId(id))?,
        };
        let removed = alerts.remove(&bucket, id)?;
        self.gateway.save(ALERTS_KEY, &alerts);
        info!(id, bucket = %bucket, "alert removed");
        Ok(removed)
    }

    /// Play the alert's tone and show a test message for it, whatever its status.
    /// Sink failures are logged, not returned.
    pub fn test_alert(&self, id: u64) -> Result<AlertRange, AlertError> {
        let alert = self
            .load_alerts()
            .find(id)
            .cloned()
            .ok_or(AlertError::UnknownId(id))?;

        if let Err(e) = self.notifier.play_tone(ToneKind::for_status(alert.status)) {
            warn!(error = %e, "test tone not played");
        }
        let (title, body) = describe_test(&alert);
        if let Err(e) = self.notifier.show_message(&title, &body, MessageKind::Generic) {
            warn!(error = %e, "test message not shown");
        }
        Ok(alert)
    }

    pub fn move_alert(&self, id: u64, from: &str, to: &str) -> Result<(), AlertError> {
        let mut alerts = self.load_alerts();
        alerts.move_alert(id, from, to)?;
        self.gateway.save(ALERTS_KEY, &alerts);
        info!(id, from, to, "alert moved");
        Ok(())
    }
}

/// Replace each entry's quote with the batch's quote for its symbol.
/// Entries the batch omitted keep their previous quote. Returns how many changed.
pub fn merge_quotes(watchlist: &mut [WatchlistEntry], quotes: Vec<Quote>) -> usize {
    let by_symbol: HashMap<String, Quote> =
        quotes.into_iter().map(|q| (q.symbol.clone(), q)).collect();

    let mut updated = 0;
    for entry in watchlist.iter_mut() {
        // Hand-edited stores may list a symbol twice; every copy gets the quote
        if let Some(quote) = by_symbol.get(&entry.symbol) {
            entry.latest_quote = quote.clone();
            updated += 1;
        }
    }
    updated
}
