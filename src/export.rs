//! Plain text, CSV and JSON listings of the persisted state.
//!
//! Useful for screen readers, scripts, and checking what the store holds
//! without starting the monitor.

use crate::alerts::AlertCollection;
use crate::models::WatchlistEntry;
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

/// Export format type
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ExportFormat {
    /// Plain text format
    #[default]
    Text,
    /// Comma-separated values (CSV)
    Csv,
    /// JavaScript Object Notation (JSON)
    Json,
}

/// Both persisted containers, as exported.
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    pub watchlist: &'a [WatchlistEntry],
    pub alerts: &'a AlertCollection,
}

pub fn export(snapshot: &Snapshot<'_>, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Text => Ok(export_text(snapshot)),
        ExportFormat::Csv => Ok(export_csv(snapshot)),
        ExportFormat::Json => {
            serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")
        }
    }
}

fn export_text(snapshot: &Snapshot<'_>) -> String {
    let mut output = String::new();

    output.push_str("WATCHLIST\n=========\n\n");
    if snapshot.watchlist.is_empty() {
        output.push_str("(empty)\n");
    }
    for entry in snapshot.watchlist {
        let quote = &entry.latest_quote;
        output.push_str(&format!("Symbol: {}\n", entry.symbol));
        if !quote.name.is_empty() {
            output.push_str(&format!("Name: {}\n", quote.name));
        }
        output.push_str(&format!("Price: ${:.2}\n", quote.price));
        output.push_str(&format!("Change: {:+.2} ({:+.2}%)\n", quote.change, quote.change_percent));
        output.push_str(&format!("Updated: {}\n\n", quote.timestamp.format("%Y-%m-%d %H:%M:%S UTC")));
    }

    output.push_str("\nALERTS\n======\n\n");
    if snapshot.alerts.is_empty() {
        output.push_str("(none)\n");
    }
    for (bucket, alerts) in snapshot.alerts.buckets() {
        output.push_str(&format!("[{}]\n", bucket));
        for alert in alerts {
            output.push_str(&format!(
                "  #{} {} {} price {:.2} {} ({:.2}%)\n",
                alert.id,
                alert.symbol,
                alert.range_label(),
                alert.current_price,
                alert.status,
                alert.percent_deviation
            ));
        }
    }

    output
}

fn export_csv(snapshot: &Snapshot<'_>) -> String {
    let mut output = String::new();

    output.push_str("Symbol,Name,Price,Change,Change%,Volume,Timestamp\n");
    for entry in snapshot.watchlist {
        let quote = &entry.latest_quote;
        output.push_str(&format!(
            "\"{}\",\"{}\",{:.2},{:.2},{:.2},{},{}\n",
            entry.symbol,
            quote.name.replace('"', "\"\""),
            quote.price,
            quote.change,
            quote.change_percent,
            quote.volume,
            quote.timestamp.to_rfc3339(),
        ));
    }

    output.push('\n');
    output.push_str("Id,Bucket,Symbol,Min,Max,Price,Status,Deviation%,OnEnter,OnExit\n");
    for alert in snapshot.alerts.iter() {
        output.push_str(&format!(
            "{},\"{}\",\"{}\",{:.2},{:.2},{:.2},{},{:.2},{},{}\n",
            alert.id,
            alert.bucket.replace('"', "\"\""),
            alert.symbol,
            alert.min_price,
            alert.max_price,
            alert.current_price,
            alert.status,
            alert.percent_deviation,
            alert.alert_on_enter,
            alert.alert_on_exit,
        ));
    }

    output
}
