//! Ticker catalog search.

use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Most results a substring search returns.
const MAX_RESULTS: usize = 10;

/// Known tickers in catalog order, e.g. NASDAQ listings followed by NYSE.
#[derive(Debug, Clone, Default)]
pub struct TickerCatalog {
    tickers: Vec<String>,
}

impl TickerCatalog {
    pub fn new(tickers: Vec<String>) -> Self {
        Self { tickers }
    }

    /// Read one ticker per line from each file, in the order given.
    /// Unreadable files are skipped with a warning.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut tickers = Vec::new();
        for path in paths {
            let path = path.as_ref();
            match fs::read_to_string(path) {
                Ok(content) => {
                    let before = tickers.len();
                    tickers.extend(parse_ticker_lines(&content));
                    info!(path = %path.display(), count = tickers.len() - before, "loaded tickers");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to load ticker file"),
            }
        }
        Self { tickers }
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    /// Case-insensitive lookup: an exact ticker wins outright, otherwise the
    /// first few tickers containing the query.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let query = query.trim().to_uppercase();
        if query.is_empty() {
            return Vec::new();
        }

        if let Some(exact) = self.tickers.iter().find(|t| **t == query) {
            return vec![exact.as_str()];
        }

        self.tickers
            .iter()
            .filter(|t| t.contains(&query))
            .take(MAX_RESULTS)
            .map(String::as_str)
            .collect()
    }
}

fn parse_ticker_lines(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case("ticker"))
        .map(str::to_uppercase)
}
