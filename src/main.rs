//! rangetop - price-band alerts for a small watchlist, in your terminal.

use anyhow::{Context, Result};
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use rangetop::alerts::AlertDraft;
use rangetop::api::{FinvizClient, QuoteSource, YahooFinanceClient};
use rangetop::app::{App, KeyAction};
use rangetop::cli::{AlertCommand, Args, Command, WatchArgs};
use rangetop::config::{self, Config, ProviderKind, StorageConfig};
use rangetop::export::{self, Snapshot};
use rangetop::notify::TerminalNotifier;
use rangetop::scheduler::{Scheduler, SchedulerConfig, SchedulerHandle, duration_from_secs};
use rangetop::search::TickerCatalog;
use rangetop::storage::{FileStore, PersistenceGateway};
use rangetop::sync::{CycleReport, Synchronizer};
use rangetop::ui;
use ratatui::{Terminal, backend::CrosstermBackend};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

type Engine = Synchronizer<QuoteSource, FileStore, TerminalNotifier>;

const LOG_FILE: &str = "rangetop.log";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse_args();
    let command = args
        .command
        .clone()
        .unwrap_or_else(|| Command::Watch(WatchArgs::default()));
    let interactive = matches!(command, Command::Watch(ref watch) if !watch.batch);

    // The TUI owns the terminal, so its logs go to a file
    let log_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| StorageConfig::default().resolve_data_dir());
    init_logging(&args, &command, interactive.then_some(log_dir.as_path()))?;

    let mut config = if let Some(ref path) = args.config {
        Config::load(path)?
    } else {
        Config::load_or_default()
    };
    args.apply(&mut config);
    debug!(general = ?config.general, "configuration loaded");

    match command {
        Command::Config => {
            println!("{}", config::sample_config());
            Ok(())
        }
        Command::Search { query } => {
            let catalog = TickerCatalog::load(&config.search.ticker_files);
            if catalog.is_empty() {
                eprintln!("No ticker catalog loaded.");
                eprintln!("List catalog files under [search] ticker_files in {:?}", Config::default_config_path());
                return Ok(());
            }
            for ticker in catalog.search(&query) {
                println!("{}", ticker);
            }
            Ok(())
        }
        command => {
            // Outside the TUI, messages are echoed to stdout
            let notifier = TerminalNotifier::new(config.notifications.clone(), !interactive);
            let engine = Arc::new(build_engine(&config, notifier)?);
            run_command(command, engine, &config).await
        }
    }
}

fn init_logging(args: &Args, command: &Command, log_dir: Option<&Path>) -> Result<()> {
    let level = if args.verbose {
        "debug"
    } else if matches!(command, Command::Watch(_)) {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rangetop={level}")));

    match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
            let path = dir.join(LOG_FILE);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

fn build_engine(config: &Config, notifier: TerminalNotifier) -> Result<Engine> {
    let timeout = config.general.timeout;
    let provider = match config.general.provider {
        ProviderKind::Yahoo => QuoteSource::Yahoo(YahooFinanceClient::new(timeout)?),
        ProviderKind::Finviz => {
            QuoteSource::Finviz(FinvizClient::new(timeout, config.finviz.resolve_auth())?)
        }
    };
    let data_dir = config.storage.resolve_data_dir();
    info!(data_dir = %data_dir.display(), provider = ?config.general.provider, "engine ready");
    Ok(Synchronizer::new(
        provider,
        PersistenceGateway::new(FileStore::new(data_dir)),
        notifier,
    ))
}

async fn run_command(command: Command, engine: Arc<Engine>, config: &Config) -> Result<()> {
    match command {
        Command::Watch(watch) => run_watch(engine, config, watch).await,
        Command::Add { symbol } => {
            let entry = engine.add_symbol(&symbol).await?;
            println!("Added {} at {:.2}", entry.symbol, entry.price());
            Ok(())
        }
        Command::Remove { symbol } => {
            let removed = engine.remove_symbol(&symbol)?;
            println!("Removed {} and {} alert(s)", symbol.trim().to_uppercase(), removed);
            Ok(())
        }
        Command::Alert(AlertCommand::Add {
            symbol,
            min,
            max,
            bucket,
            no_enter,
            no_exit,
        }) => {
            let mut draft = AlertDraft::parse(&symbol, &min, &max, &bucket)?;
            draft.alert_on_enter = !no_enter;
            draft.alert_on_exit = !no_exit;
            let alert = engine.create_alert(draft)?;
            println!(
                "Created alert {} on {} {} in [{}]",
                alert.id,
                alert.symbol,
                alert.range_label(),
                alert.bucket
            );
            Ok(())
        }
        Command::Alert(AlertCommand::Remove { id, bucket }) => {
            let alert = engine.remove_alert(bucket.as_deref(), id)?;
            println!("Removed alert {} from [{}]", alert.id, alert.bucket);
            Ok(())
        }
        Command::Alert(AlertCommand::Test { id }) => {
            let alert = engine.test_alert(id)?;
            engine.notifier().wait_for_tones();
            println!("Tested alert {} on {} [{}]", alert.id, alert.symbol, alert.status);
            Ok(())
        }
        Command::Alert(AlertCommand::Move { id, from, to }) => {
            engine.move_alert(id, &from, &to)?;
            println!("Moved alert {} from [{}] to [{}]", id, from, to);
            Ok(())
        }
        Command::List { format } => {
            let watchlist = engine.load_watchlist();
            let alerts = engine.load_alerts();
            let output = export::export(
                &Snapshot {
                    watchlist: &watchlist,
                    alerts: &alerts,
                },
                format,
            )?;
            print!("{}", output);
            Ok(())
        }
        Command::Search { .. } | Command::Config => Ok(()),
    }
}

async fn run_watch(engine: Arc<Engine>, config: &Config, watch: WatchArgs) -> Result<()> {
    let scheduler_config = SchedulerConfig {
        initial_delay: duration_from_secs(config.general.initial_delay),
        interval: duration_from_secs(config.general.refresh_interval),
        overlap: config.general.overlap,
        // The pause switch belongs to the TUI; batch runs always refresh
        paused: !watch.batch && !engine.auto_update(),
    };

    let mut app = App::new(scheduler_config.interval, scheduler_config.overlap, watch.iterations)
        .with_board(engine.notifier().board());
    app.paused = scheduler_config.paused;
    app.load(engine.load_watchlist(), engine.load_alerts(), engine.status());

    // Cycles re-read the store, so symbols added from another shell show up
    if app.watchlist.is_empty() {
        eprintln!("The watchlist is empty.");
        eprintln!("Add symbols from another shell, e.g.: rangetop add AAPL");
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<CycleReport>();
    let handle = {
        let engine = Arc::clone(&engine);
        Scheduler::start(scheduler_config, move || {
            let engine = Arc::clone(&engine);
            let tx = tx.clone();
            async move {
                let report = engine.run_cycle().await;
                // The receiver is gone once the view has exited
                let _ = tx.send(report);
            }
        })?
    };

    let result = if watch.batch {
        run_batch(&mut app, &engine, &mut rx).await
    } else {
        run_interactive(&mut app, &engine, &handle, &mut rx).await
    };

    handle.shutdown().await;
    result
}

/// Run in batch mode (non-interactive, like top -b).
async fn run_batch(
    app: &mut App,
    engine: &Engine,
    rx: &mut mpsc::UnboundedReceiver<CycleReport>,
) -> Result<()> {
    ui::render_batch(app);

    loop {
        tokio::select! {
            report = rx.recv() => {
                let Some(report) = report else { break };
                app.record(report);
                app.load(engine.load_watchlist(), engine.load_alerts(), engine.status());
                ui::render_batch(app);
                if app.should_quit() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    Ok(())
}

/// Run in interactive mode with TUI.
async fn run_interactive(
    app: &mut App,
    engine: &Engine,
    handle: &SchedulerHandle,
    rx: &mut mpsc::UnboundedReceiver<CycleReport>,
) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, app, engine, handle, rx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Main application loop.
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    engine: &Engine,
    handle: &SchedulerHandle,
    rx: &mut mpsc::UnboundedReceiver<CycleReport>,
) -> Result<()> {
    let mut events = EventStream::new();
    // Keeps "last update" ticking between cycles
    let mut redraw = tokio::time::interval(Duration::from_secs(1));

    loop {
        terminal.draw(|f| ui::render(f, app))?;

        tokio::select! {
            _ = redraw.tick() => {}
            report = rx.recv() => match report {
                Some(report) => {
                    app.record(report);
                    app.load(engine.load_watchlist(), engine.load_alerts(), engine.status());
                }
                None => break,
            },
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    match app.handle_key(key.code, key.modifiers) {
                        KeyAction::None => {}
                        KeyAction::Refresh => handle.trigger(),
                        KeyAction::TogglePause => {
                            handle.set_paused(app.paused);
                            engine.set_auto_update(!app.paused);
                        }
                        KeyAction::TestAlert(id) => {
                            if let Err(e) = engine.test_alert(id) {
                                warn!(error = %e, "alert test failed");
                            }
                            app.load(engine.load_watchlist(), engine.load_alerts(), engine.status());
                        }
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
        }

        if app.should_quit() {
            break;
        }
    }

    Ok(())
}
