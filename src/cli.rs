//! Command-line interface.

use crate::config::{Config, ProviderKind};
use crate::export::ExportFormat;
use crate::models::DEFAULT_BUCKET;
use crate::scheduler::OverlapPolicy;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Longest refresh interval or initial delay accepted, in seconds (one day).
pub const MAX_SECONDS: f64 = 86_400.0;

/// Clamp a seconds value into `[min, MAX_SECONDS]`; NaN becomes `min`.
fn clamp_seconds(value: f64, min: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, MAX_SECONDS)
    }
}

/// A terminal price-band monitor.
///
/// Track a few tickers, put price bands ("alerts") on them, and get a tone
/// and a message the moment a price enters or leaves a band.
#[derive(Parser, Debug, Clone)]
#[command(name = "rangetop")]
#[command(version)]
#[command(about = "Price-band alerts for a small watchlist, in your terminal", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Configuration file path
    #[arg(short = 'c', long, global = true, env = "RANGETOP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the persisted watchlist and alerts
    #[arg(long, global = true, env = "RANGETOP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Refresh delay in seconds (minimum 1)
    #[arg(short = 'd', long, global = true, env = "RANGETOP_DELAY")]
    pub delay: Option<f64>,

    /// API timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Quote provider
    #[arg(long, global = true, value_enum)]
    pub provider: Option<Provider>,

    /// Skip refresh ticks while a previous refresh is still running
    #[arg(long, global = true)]
    pub single_flight: bool,

    /// Tone volume from 0.0 to 1.0 (0 mutes)
    #[arg(long, global = true)]
    pub volume: Option<f64>,

    /// Verbose logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Monitor the watchlist and fire alerts (default)
    Watch(WatchArgs),
    /// Add a symbol to the watchlist
    Add {
        /// Ticker symbol, e.g. AAPL
        symbol: String,
    },
    /// Remove a symbol and all of its alerts
    Remove {
        symbol: String,
    },
    /// Manage price-band alerts
    #[command(subcommand)]
    Alert(AlertCommand),
    /// Print the persisted watchlist and alerts
    List {
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        format: ExportFormat,
    },
    /// Search the ticker catalog
    Search {
        query: String,
    },
    /// Print a sample configuration file
    Config,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct WatchArgs {
    /// Batch mode - print each refresh instead of drawing the TUI
    #[arg(short = 'b', long)]
    pub batch: bool,

    /// Number of refresh cycles before exiting (0 means forever)
    #[arg(short = 'n', long, default_value = "0")]
    pub iterations: u64,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AlertCommand {
    /// Create an alert on a watched symbol
    Add {
        #[arg(short = 's', long)]
        symbol: String,
        /// Lower bound of the band
        #[arg(long, allow_hyphen_values = true)]
        min: String,
        /// Upper bound of the band
        #[arg(long, allow_hyphen_values = true)]
        max: String,
        #[arg(long, default_value = DEFAULT_BUCKET)]
        bucket: String,
        /// Do not announce the price entering the band
        #[arg(long)]
        no_enter: bool,
        /// Do not announce the price leaving the band
        #[arg(long)]
        no_exit: bool,
    },
    /// Delete an alert
    Remove {
        id: u64,
        /// Bucket holding the alert; searched when omitted
        #[arg(long)]
        bucket: Option<String>,
    },
    /// Play an alert's tone and show a test message for it
    Test { id: u64 },
    /// Move an alert to another bucket
    Move {
        id: u64,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Provider {
    Yahoo,
    Finviz,
}

impl From<Provider> for ProviderKind {
    fn from(provider: Provider) -> Self {
        match provider {
            Provider::Yahoo => ProviderKind::Yahoo,
            Provider::Finviz => ProviderKind::Finviz,
        }
    }
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Fold command-line overrides into the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(delay) = self.delay {
            config.general.refresh_interval = delay;
        }
        // Enforce minimum refresh interval of 1.0 second
        config.general.refresh_interval = clamp_seconds(config.general.refresh_interval, 1.0);
        config.general.initial_delay = clamp_seconds(config.general.initial_delay, 0.0);
        if let Some(timeout) = self.timeout {
            config.general.timeout = timeout;
        }
        if let Some(provider) = self.provider {
            config.general.provider = provider.into();
        }
        if self.single_flight {
            config.general.overlap = OverlapPolicy::SingleFlight;
        }
        if let Some(volume) = self.volume {
            config.notifications.volume = volume.clamp(0.0, 1.0);
        }
        if let Some(ref dir) = self.data_dir {
            config.storage.data_dir = Some(dir.clone());
        }
    }
}
