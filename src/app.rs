//! Interactive view state.
//!
//! The view never writes to the store. After every refresh cycle it re-reads
//! what the cycle persisted and redraws from that.

use crate::alerts::AlertCollection;
use crate::models::{AlertRange, WatchlistEntry};
use crate::notify::{Notice, NoticeBoard};
use crate::scheduler::OverlapPolicy;
use crate::sync::{CycleReport, SyncStatus};
use crossterm::event::{KeyCode, KeyModifiers};
use std::time::{Duration, Instant};

/// What a key press asks of the scheduler or engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    None,
    Refresh,
    TogglePause,
    TestAlert(u64),
}

pub struct App {
    pub watchlist: Vec<WatchlistEntry>,
    pub alerts: AlertCollection,
    pub status: SyncStatus,
    /// Most recent messages, newest last
    pub notices: Vec<Notice>,
    board: Option<NoticeBoard>,
    pub last_report: Option<CycleReport>,
    pub last_refresh: Option<Instant>,
    pub refresh_interval: Duration,
    pub overlap: OverlapPolicy,
    /// Completed cycles seen by this view
    pub iteration: u64,
    /// Maximum iterations (0 = infinite)
    pub max_iterations: u64,
    pub running: bool,
    /// Timed refreshes suspended
    pub paused: bool,
    /// Selected alert row
    pub selected: usize,
    pub show_help: bool,
}

impl App {
    pub fn new(refresh_interval: Duration, overlap: OverlapPolicy, max_iterations: u64) -> Self {
        Self {
            watchlist: Vec::new(),
            alerts: AlertCollection::new(),
            status: SyncStatus::default(),
            notices: Vec::new(),
            board: None,
            last_report: None,
            last_refresh: None,
            refresh_interval,
            overlap,
            iteration: 0,
            max_iterations,
            running: true,
            paused: false,
            selected: 0,
            show_help: false,
        }
    }

    pub fn with_board(mut self, board: NoticeBoard) -> Self {
        self.board = Some(board);
        self
    }

    /// Replace the displayed state with what the store now holds.
    pub fn load(&mut self, watchlist: Vec<WatchlistEntry>, alerts: AlertCollection, status: SyncStatus) {
        self.watchlist = watchlist;
        self.alerts = alerts;
        self.status = status;
        if let Some(board) = &self.board {
            if let Ok(board) = board.lock() {
                self.notices = board.iter().cloned().collect();
            }
        }
        self.clamp_selection();
    }

    /// Record a finished cycle.
    pub fn record(&mut self, report: CycleReport) {
        self.iteration += 1;
        self.last_refresh = Some(Instant::now());
        self.last_report = Some(report);
    }

    /// Alerts flattened in display order.
    pub fn alert_rows(&self) -> Vec<&AlertRange> {
        self.alerts.iter().collect()
    }

    pub fn selected_alert(&self) -> Option<&AlertRange> {
        self.alerts.iter().nth(self.selected)
    }

    /// One-line account of the last cycle for the header.
    pub fn cycle_summary(&self) -> String {
        match &self.last_report {
            None => "waiting for first cycle".to_string(),
            Some(report) if !report.batch_ok => {
                format!("cycle #{}: quote fetch failed", report.cycle)
            }
            Some(report) => format!(
                "cycle #{}: {} updated, {} transition(s)",
                report.cycle,
                report.updated,
                report.transitions.len()
            ),
        }
    }

    /// Apply a key press to the view and report what else it asks for.
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> KeyAction {
        // Close help overlay on any key
        if self.show_help {
            self.show_help = false;
            return KeyAction::None;
        }

        match code {
            // Quit
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => self.quit(),

            // Navigation
            KeyCode::Up | KeyCode::Char('k') => self.select_up(),
            KeyCode::Down | KeyCode::Char('j') => self.select_down(),
            KeyCode::Home | KeyCode::Char('g') => self.select_top(),
            KeyCode::End | KeyCode::Char('G') => self.select_bottom(),
            KeyCode::PageUp => {
                for _ in 0..10 {
                    self.select_up();
                }
            }
            KeyCode::PageDown => {
                for _ in 0..10 {
                    self.select_down();
                }
            }

            KeyCode::Char('h') | KeyCode::Char('?') => self.toggle_help(),

            KeyCode::Char(' ') | KeyCode::Char('r') => return KeyAction::Refresh,
            KeyCode::Char('p') => {
                self.paused = !self.paused;
                return KeyAction::TogglePause;
            }
            KeyCode::Char('t') => {
                if let Some(alert) = self.selected_alert() {
                    return KeyAction::TestAlert(alert.id);
                }
            }

            _ => {}
        }
        KeyAction::None
    }

    fn clamp_selection(&mut self) {
        let rows = self.alerts.len();
        if self.selected >= rows {
            self.selected = rows.saturating_sub(1);
        }
    }

    pub fn select_up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn select_down(&mut self) {
        if self.selected < self.alerts.len().saturating_sub(1) {
            self.selected += 1;
        }
    }

    pub fn select_top(&mut self) {
        self.selected = 0;
    }

    pub fn select_bottom(&mut self) {
        self.selected = self.alerts.len().saturating_sub(1);
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub fn quit(&mut self) {
        self.running = false;
    }

    /// Check if max iterations reached.
    pub fn should_quit(&self) -> bool {
        !self.running || (self.max_iterations > 0 && self.iteration >= self.max_iterations)
    }

    /// Time since the last completed cycle, human readable.
    pub fn time_since_refresh(&self) -> String {
        match self.last_refresh {
            Some(t) => {
                let secs = Duration::from_secs(t.elapsed().as_secs());
                format!("{} ago", humantime::format_duration(secs))
            }
            None => "never".to_string(),
        }
    }
}
