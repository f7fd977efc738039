//! rangetop - price-band alerts for a small watchlist.
//!
//! The library holds the refresh engine; the binary wires it to a terminal.

pub mod alerts;
pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod evaluator;
pub mod export;
pub mod models;
pub mod notify;
pub mod scheduler;
pub mod search;
pub mod storage;
pub mod sync;
pub mod ui;
