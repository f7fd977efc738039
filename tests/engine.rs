//! Refresh-cycle scenarios driven through the library with an in-memory
//! store, a scripted quote provider and a recording notification sink.

use anyhow::{Result, anyhow};
use rangetop::alerts::{AlertCollection, AlertDraft};
use rangetop::api::QuoteProvider;
use rangetop::models::{AlertRange, Connectivity, Quote, RangeStatus, TransitionKind, WatchlistEntry};
use rangetop::notify::{MessageKind, NotificationSink, NotifyError, ToneKind};
use rangetop::storage::{
    ALERTS_KEY, AUTO_UPDATE_KEY, KeyValueStore, MemoryStore, PersistenceGateway, StorageError,
    WATCHLIST_KEY,
};
use rangetop::sync::{Synchronizer, WatchlistError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

type Hook = Box<dyn FnOnce() + Send>;

/// Hands out prepared batches in order; an exhausted script returns nothing.
#[derive(Default)]
struct ScriptedProvider {
    batches: Mutex<VecDeque<Result<Vec<Quote>>>>,
    requests: Mutex<Vec<Vec<String>>>,
    /// Runs while the next batch is in flight
    during_fetch: Mutex<Option<Hook>>,
}

impl ScriptedProvider {
    fn push(&self, batch: Result<Vec<Quote>>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    fn prices(&self, prices: &[(&str, f64)]) {
        self.push(Ok(prices.iter().map(|(s, p)| quote(s, *p)).collect()));
    }

    fn fail(&self) {
        self.push(Err(anyhow!("connection refused")));
    }

    fn on_next_fetch(&self, hook: impl FnOnce() + Send + 'static) {
        *self.during_fetch.lock().unwrap() = Some(Box::new(hook));
    }

    fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().unwrap().clone()
    }
}

impl QuoteProvider for ScriptedProvider {
    async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        self.requests.lock().unwrap().push(symbols.to_vec());
        let hook = self.during_fetch.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Default)]
struct RecordingSink {
    tones: Mutex<Vec<ToneKind>>,
    messages: Mutex<Vec<(String, String, MessageKind)>>,
}

impl RecordingSink {
    fn tones(&self) -> Vec<ToneKind> {
        self.tones.lock().unwrap().clone()
    }

    fn messages(&self) -> Vec<(String, String, MessageKind)> {
        self.messages.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn play_tone(&self, kind: ToneKind) -> Result<(), NotifyError> {
        self.tones.lock().unwrap().push(kind);
        Ok(())
    }

    fn show_message(&self, title: &str, body: &str, kind: MessageKind) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string(), kind));
        Ok(())
    }
}

/// A sink whose every delivery fails.
struct BrokenSink;

impl NotificationSink for BrokenSink {
    fn play_tone(&self, _kind: ToneKind) -> Result<(), NotifyError> {
        Err(NotifyError::Io(std::io::Error::other("audio device gone")))
    }

    fn show_message(&self, _title: &str, _body: &str, _kind: MessageKind) -> Result<(), NotifyError> {
        Err(NotifyError::Poisoned)
    }
}

/// A memory store the test can keep writing to behind the engine's back.
#[derive(Clone, Default)]
struct SharedStore(Arc<MemoryStore>);

impl KeyValueStore for SharedStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.0.get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.0.put(key, value)
    }
}

type Engine = Synchronizer<ScriptedProvider, SharedStore, RecordingSink>;

fn quote(symbol: &str, price: f64) -> Quote {
    Quote {
        symbol: symbol.to_string(),
        name: format!("{symbol} Corp"),
        price,
        ..Quote::default()
    }
}

fn entries(watchlist: &[(&str, f64)]) -> Vec<WatchlistEntry> {
    watchlist
        .iter()
        .map(|(s, p)| WatchlistEntry::new(quote(s, *p)))
        .collect()
}

fn engine_with(watchlist: &[(&str, f64)]) -> (Engine, SharedStore) {
    let store = SharedStore::default();
    store
        .put(WATCHLIST_KEY, &serde_json::to_string(&entries(watchlist)).unwrap())
        .unwrap();

    let engine = Synchronizer::new(
        ScriptedProvider::default(),
        PersistenceGateway::new(store.clone()),
        RecordingSink::default(),
    );
    (engine, store)
}

fn add_alert(engine: &Engine, symbol: &str, min: &str, max: &str, bucket: &str) -> u64 {
    let draft = AlertDraft::parse(symbol, min, max, bucket).unwrap();
    engine.create_alert(draft).unwrap().id
}

fn alert(engine: &Engine, id: u64) -> AlertRange {
    engine.load_alerts().find(id).cloned().unwrap()
}

#[tokio::test]
async fn test_price_band_lifecycle() {
    let (engine, _) = engine_with(&[("AAPL", 105.0)]);
    let id = add_alert(&engine, "AAPL", "100", "110", "default");
    assert_eq!(alert(&engine, id).status, RangeStatus::Pending);

    // First evaluation only establishes the status
    engine.provider().prices(&[("AAPL", 105.0)]);
    let report = engine.run_cycle().await;
    assert!(report.batch_ok);
    assert!(report.transitions.is_empty());
    assert_eq!(alert(&engine, id).status, RangeStatus::InRange);
    assert!(engine.notifier().tones().is_empty());

    engine.provider().prices(&[("AAPL", 115.0)]);
    let report = engine.run_cycle().await;
    assert_eq!(report.transitions.len(), 1);
    assert_eq!(report.transitions[0].kind, TransitionKind::ExitedRange);
    assert_eq!(report.tone, Some(ToneKind::Exit));
    let exited = alert(&engine, id);
    assert_eq!(exited.status, RangeStatus::Above);
    assert!((exited.percent_deviation - 4.545454).abs() < 1e-4);
    assert_eq!(exited.current_price, 115.0);

    // Staying outside is silent
    engine.provider().prices(&[("AAPL", 120.0)]);
    let report = engine.run_cycle().await;
    assert!(report.transitions.is_empty());

    engine.provider().prices(&[("AAPL", 108.0)]);
    let report = engine.run_cycle().await;
    assert_eq!(report.tone, Some(ToneKind::Enter));
    assert_eq!(alert(&engine, id).status, RangeStatus::InRange);
    assert_eq!(alert(&engine, id).percent_deviation, 0.0);

    assert_eq!(engine.notifier().tones(), vec![ToneKind::Exit, ToneKind::Enter]);
    let messages = engine.notifier().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].0, "AAPL exited range!");
    assert_eq!(messages[0].1, "Price 115.00 is now above 100.00-110.00");
    assert_eq!(messages[0].2, MessageKind::Exit);
    assert_eq!(messages[1].0, "AAPL entered range!");
    assert_eq!(messages[1].2, MessageKind::Enter);
}

#[tokio::test]
async fn test_one_tone_per_cycle_but_every_message() {
    let (engine, _) = engine_with(&[("AAPL", 95.0), ("MSFT", 395.0)]);
    add_alert(&engine, "AAPL", "100", "110", "tech");
    add_alert(&engine, "MSFT", "400", "410", "tech");

    engine.provider().prices(&[("AAPL", 95.0), ("MSFT", 395.0)]);
    engine.run_cycle().await;

    engine.provider().prices(&[("AAPL", 105.0), ("MSFT", 405.0)]);
    let report = engine.run_cycle().await;
    assert_eq!(report.transitions.len(), 2);
    assert_eq!(report.messages, 2);
    assert_eq!(engine.notifier().tones(), vec![ToneKind::Enter]);
    assert_eq!(engine.notifier().messages().len(), 2);
}

#[tokio::test]
async fn test_disabled_flag_is_silent_and_does_not_take_the_tone() {
    let (engine, _) = engine_with(&[("AAPL", 105.0), ("MSFT", 405.0)]);
    let mut quiet = AlertDraft::parse("AAPL", "100", "110", "default").unwrap();
    quiet.alert_on_exit = false;
    let quiet_id = engine.create_alert(quiet).unwrap().id;
    add_alert(&engine, "MSFT", "400", "410", "default");

    engine.provider().prices(&[("AAPL", 105.0), ("MSFT", 405.0)]);
    engine.run_cycle().await;

    engine.provider().prices(&[("AAPL", 90.0), ("MSFT", 390.0)]);
    let report = engine.run_cycle().await;

    // Both alerts change status, only MSFT is announced
    assert_eq!(report.transitions.len(), 2);
    assert_eq!(alert(&engine, quiet_id).status, RangeStatus::Below);
    assert_eq!(engine.notifier().tones(), vec![ToneKind::Exit]);
    let messages = engine.notifier().messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "MSFT exited range!");
}

#[tokio::test]
async fn test_failed_batch_keeps_quotes_and_marks_offline() {
    let (engine, _) = engine_with(&[("AAPL", 105.0)]);
    let id = add_alert(&engine, "AAPL", "100", "110", "default");
    engine.provider().prices(&[("AAPL", 105.0)]);
    engine.run_cycle().await;
    assert_eq!(engine.status().connectivity, Connectivity::Healthy);
    let last_success = engine.status().last_success;

    engine.provider().fail();
    let report = engine.run_cycle().await;
    assert!(!report.batch_ok);
    assert!(report.transitions.is_empty());
    assert_eq!(engine.status().connectivity, Connectivity::Unhealthy);
    assert_eq!(engine.status().last_success, last_success);
    assert_eq!(engine.load_watchlist()[0].price(), 105.0);
    assert_eq!(alert(&engine, id).status, RangeStatus::InRange);
    assert!(engine.notifier().tones().is_empty());

    // The next good batch brings it back
    engine.provider().prices(&[("AAPL", 106.0)]);
    engine.run_cycle().await;
    assert_eq!(engine.status().connectivity, Connectivity::Healthy);
    assert_eq!(engine.status().completed_cycles, 3);
}

#[tokio::test]
async fn test_partial_batch_keeps_omitted_quotes() {
    let (engine, _) = engine_with(&[("AAPL", 105.0), ("MSFT", 400.0)]);
    engine.provider().prices(&[("MSFT", 410.0)]);

    let report = engine.run_cycle().await;
    assert!(report.batch_ok);
    assert_eq!(report.updated, 1);

    let watchlist = engine.load_watchlist();
    assert_eq!(watchlist[0].symbol, "AAPL");
    assert_eq!(watchlist[0].price(), 105.0);
    assert_eq!(watchlist[1].price(), 410.0);
    assert_eq!(
        engine.provider().requests(),
        vec![vec!["AAPL".to_string(), "MSFT".to_string()]]
    );
}

#[tokio::test]
async fn test_symbol_added_during_fetch_survives_merge() {
    let (engine, store) = engine_with(&[("AAPL", 105.0)]);
    engine.provider().prices(&[("AAPL", 107.0)]);

    let writer = store.clone();
    engine.provider().on_next_fetch(move || {
        let both = entries(&[("AAPL", 105.0), ("TSLA", 250.0)]);
        writer
            .put(WATCHLIST_KEY, &serde_json::to_string(&both).unwrap())
            .unwrap();
    });

    engine.run_cycle().await;

    let watchlist = engine.load_watchlist();
    let symbols: Vec<&str> = watchlist.iter().map(|e| e.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["AAPL", "TSLA"]);
    assert_eq!(watchlist[0].price(), 107.0);
    assert_eq!(watchlist[1].price(), 250.0);
}

#[tokio::test]
async fn test_empty_watchlist_skips_provider() {
    let (engine, _) = engine_with(&[]);
    let report = engine.run_cycle().await;
    assert!(report.batch_ok);
    assert!(engine.provider().requests().is_empty());
}

#[tokio::test]
async fn test_add_symbol_requires_a_quote() {
    let (engine, _) = engine_with(&[("AAPL", 105.0)]);

    assert_eq!(
        engine.add_symbol("aapl").await,
        Err(WatchlistError::Duplicate("AAPL".to_string()))
    );
    assert_eq!(engine.add_symbol("  ").await, Err(WatchlistError::EmptySymbol));

    engine.provider().prices(&[]);
    assert_eq!(
        engine.add_symbol("ZZZZ").await,
        Err(WatchlistError::Unavailable("ZZZZ".to_string()))
    );

    engine.provider().fail();
    assert!(matches!(
        engine.add_symbol("MSFT").await,
        Err(WatchlistError::Provider(_))
    ));

    engine.provider().prices(&[("MSFT", 400.0)]);
    let entry = engine.add_symbol(" msft ").await.unwrap();
    assert_eq!(entry.symbol, "MSFT");
    assert_eq!(engine.load_watchlist().len(), 2);
}

#[tokio::test]
async fn test_remove_symbol_cascades_to_alerts() {
    let (engine, _) = engine_with(&[("AAPL", 105.0), ("MSFT", 400.0)]);
    add_alert(&engine, "AAPL", "100", "110", "a");
    add_alert(&engine, "AAPL", "90", "95", "b");
    let kept = add_alert(&engine, "MSFT", "390", "410", "a");

    assert_eq!(engine.remove_symbol("AAPL"), Ok(2));
    let alerts = engine.load_alerts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts.find(kept).is_some());
    assert_eq!(engine.load_watchlist().len(), 1);

    assert_eq!(
        engine.remove_symbol("AAPL"),
        Err(WatchlistError::NotWatched("AAPL".to_string()))
    );
}

#[tokio::test]
async fn test_corrupt_alerts_recover_to_empty() {
    let (engine, store) = engine_with(&[("AAPL", 105.0)]);
    store.put(ALERTS_KEY, "[1, 2, 3]").unwrap();
    assert_eq!(engine.load_alerts(), AlertCollection::new());

    engine.provider().prices(&[("AAPL", 106.0)]);
    let report = engine.run_cycle().await;
    assert!(report.transitions.is_empty());

    // New alerts can be added on top of the recovered state
    add_alert(&engine, "AAPL", "100", "110", "default");
    assert_eq!(engine.load_alerts().len(), 1);
}

#[tokio::test]
async fn test_move_round_trip_through_engine() {
    let (engine, store) = engine_with(&[("AAPL", 105.0)]);
    let id = add_alert(&engine, "AAPL", "100", "110", "a");
    let before = store.get(ALERTS_KEY).unwrap().unwrap();

    engine.move_alert(id, "a", "b").unwrap();
    assert_eq!(alert(&engine, id).bucket, "b");
    engine.move_alert(id, "b", "a").unwrap();

    // Both buckets survive; the alert itself is byte-identical
    let alerts = engine.load_alerts();
    assert_eq!(alerts.bucket("b").map(<[AlertRange]>::len), Some(0));
    let original: AlertCollection = serde_json::from_str(&before).unwrap();
    assert_eq!(alerts.find(id), original.find(id));

    assert!(engine.remove_alert(None, id).is_ok());
    assert!(engine.remove_alert(None, id).is_err());
}

#[tokio::test]
async fn test_notification_failures_never_abort_the_cycle() {
    let store = SharedStore::default();
    store
        .put(WATCHLIST_KEY, &serde_json::to_string(&entries(&[("AAPL", 105.0)])).unwrap())
        .unwrap();
    let engine = Synchronizer::new(
        ScriptedProvider::default(),
        PersistenceGateway::new(store.clone()),
        BrokenSink,
    );
    let id = engine
        .create_alert(AlertDraft::parse("AAPL", "100", "110", "default").unwrap())
        .unwrap()
        .id;

    engine.provider().prices(&[("AAPL", 105.0)]);
    engine.run_cycle().await;

    engine.provider().prices(&[("AAPL", 115.0)]);
    let report = engine.run_cycle().await;
    assert_eq!(report.transitions.len(), 1);
    // The tone is still reported as the cycle's tone even though playback failed
    assert_eq!(report.tone, Some(ToneKind::Exit));
    assert_eq!(report.messages, 0);
    assert_eq!(engine.status().completed_cycles, 2);

    let stored = engine.load_alerts().find(id).cloned().unwrap();
    assert_eq!(stored.status, RangeStatus::Above);
    assert_eq!(stored.current_price, 115.0);
    assert_eq!(engine.load_watchlist()[0].price(), 115.0);

    // Test notifications swallow sink failures too
    assert!(engine.test_alert(id).is_ok());
}

#[tokio::test]
async fn test_alert_test_uses_status_tone_and_generic_message() {
    let (engine, _) = engine_with(&[("AAPL", 105.0)]);
    let id = add_alert(&engine, "AAPL", "100", "110", "default");

    // Pending sounds like leaving a band
    engine.test_alert(id).unwrap();
    engine.provider().prices(&[("AAPL", 105.0)]);
    engine.run_cycle().await;
    engine.test_alert(id).unwrap();

    assert_eq!(engine.notifier().tones(), vec![ToneKind::Exit, ToneKind::Enter]);
    let messages = engine.notifier().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].0, "AAPL Alert Test");
    assert_eq!(messages[1].1, "Current: 105.00 | Range: 100.00-110.00");
    assert_eq!(messages[1].2, MessageKind::Generic);

    // Testing never changes the stored alert
    assert_eq!(alert(&engine, id).status, RangeStatus::InRange);
    assert!(engine.test_alert(999).is_err());
}

#[tokio::test]
async fn test_auto_update_switch_is_persisted() {
    let (engine, store) = engine_with(&[("AAPL", 105.0)]);
    assert!(engine.auto_update());

    engine.set_auto_update(false);
    assert!(!engine.auto_update());
    assert_eq!(store.get(AUTO_UPDATE_KEY).unwrap().as_deref(), Some("false"));

    // A garbled value falls back to on
    store.put(AUTO_UPDATE_KEY, "\"maybe\"").unwrap();
    assert!(engine.auto_update());
}
