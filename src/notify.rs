//! Notification delivery: audible tones and textual messages.
//!
//! Tones use the terminal BEL character, so they work in most terminal
//! emulators without an audio stack. Delivery is best effort; callers log and
//! ignore errors.

use crate::config::NotifyConfig;
use crate::models::{AlertRange, RangeStatus, Transition, TransitionKind};
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Messages kept for the interactive view.
const MESSAGE_HISTORY: usize = 50;

/// Gap between beeps inside one tone.
const BEEP_GAP: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneKind {
    Enter,
    Exit,
}

impl ToneKind {
    /// Tone matching where a price sits: inside the band sounds like entering.
    pub fn for_status(status: RangeStatus) -> Self {
        if status.is_in_range() {
            ToneKind::Enter
        } else {
            ToneKind::Exit
        }
    }

    /// Beeps per repetition: one for entering a band, two for leaving it.
    pub fn beeps(self) -> usize {
        match self {
            ToneKind::Enter => 1,
            ToneKind::Exit => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Enter,
    Exit,
    Generic,
}

impl MessageKind {
    pub fn icon(self) -> &'static str {
        match self {
            MessageKind::Enter => "🟢",
            MessageKind::Exit => "🔴",
            MessageKind::Generic => "📊",
        }
    }
}

impl From<TransitionKind> for ToneKind {
    fn from(kind: TransitionKind) -> Self {
        match kind {
            TransitionKind::EnteredRange => ToneKind::Enter,
            TransitionKind::ExitedRange => ToneKind::Exit,
        }
    }
}

impl From<TransitionKind> for MessageKind {
    fn from(kind: TransitionKind) -> Self {
        match kind {
            TransitionKind::EnteredRange => MessageKind::Enter,
            TransitionKind::ExitedRange => MessageKind::Exit,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifications are disabled")]
    Disabled,
    #[error("failed to write notification: {0}")]
    Io(#[from] std::io::Error),
    #[error("message buffer unavailable")]
    Poisoned,
}

/// Somewhere to send alert notifications.
pub trait NotificationSink: Send + Sync {
    fn play_tone(&self, kind: ToneKind) -> Result<(), NotifyError>;
    fn show_message(&self, title: &str, body: &str, kind: MessageKind) -> Result<(), NotifyError>;
}

/// Title and body announcing a transition.
pub fn describe(transition: &Transition) -> (String, String) {
    let range = format!("{:.2}-{:.2}", transition.min_price, transition.max_price);
    match transition.kind {
        TransitionKind::EnteredRange => (
            format!("{} entered range!", transition.symbol),
            format!("Price {:.2} is now within {}", transition.price, range),
        ),
        TransitionKind::ExitedRange => {
            let direction = if transition.current == RangeStatus::Above {
                "above"
            } else {
                "below"
            };
            (
                format!("{} exited range!", transition.symbol),
                format!("Price {:.2} is now {} {}", transition.price, direction, range),
            )
        }
    }
}

/// Title and body for a manual test of an alert.
pub fn describe_test(alert: &AlertRange) -> (String, String) {
    (
        format!("{} Alert Test", alert.symbol),
        format!("Current: {:.2} | Range: {}", alert.current_price, alert.range_label()),
    )
}

/// A message as shown to the user.
#[derive(Debug, Clone)]
pub struct Notice {
    pub at: DateTime<Local>,
    pub title: String,
    pub body: String,
    pub kind: MessageKind,
}

/// Shared, bounded history of shown messages.
pub type NoticeBoard = Arc<Mutex<VecDeque<Notice>>>;

/// Beeps on the terminal and records messages for display.
pub struct TerminalNotifier {
    config: NotifyConfig,
    board: NoticeBoard,
    /// Also print messages on stdout (batch mode)
    echo: bool,
    /// Beeping thread of the last tone
    beeping: Mutex<Option<JoinHandle<()>>>,
}

impl TerminalNotifier {
    pub fn new(config: NotifyConfig, echo: bool) -> Self {
        Self {
            config,
            board: NoticeBoard::default(),
            echo,
            beeping: Mutex::new(None),
        }
    }

    /// Block until the last tone has finished. One-shot commands call this
    /// before exiting so the beeps are not cut off.
    pub fn wait_for_tones(&self) {
        let pending = self.beeping.lock().ok().and_then(|mut b| b.take());
        if let Some(handle) = pending {
            let _ = handle.join();
        }
    }

    /// Handle to the message history for rendering.
    pub fn board(&self) -> NoticeBoard {
        Arc::clone(&self.board)
    }

    fn muted(&self) -> bool {
        !self.config.enabled || self.config.volume <= 0.0 || self.config.repeat == 0
    }
}

impl NotificationSink for TerminalNotifier {
    fn play_tone(&self, kind: ToneKind) -> Result<(), NotifyError> {
        if self.muted() {
            return Err(NotifyError::Disabled);
        }
        let beeps = kind.beeps() * self.config.repeat as usize;

        // Beeping sleeps between pulses, keep it off the refresh task
        let handle = std::thread::spawn(move || {
            let mut stdout = std::io::stdout();
            for _ in 0..beeps {
                let _ = stdout.write_all(b"\x07");
                let _ = stdout.flush();
                std::thread::sleep(BEEP_GAP);
            }
        });
        let mut beeping = self.beeping.lock().map_err(|_| NotifyError::Poisoned)?;
        *beeping = Some(handle);
        Ok(())
    }

    fn show_message(&self, title: &str, body: &str, kind: MessageKind) -> Result<(), NotifyError> {
        if !self.config.enabled {
            return Err(NotifyError::Disabled);
        }
        info!(title, body, "alert");

        let notice = Notice {
            at: Local::now(),
            title: title.to_string(),
            body: body.to_string(),
            kind,
        };

        if self.echo {
            let mut stdout = std::io::stdout().lock();
            writeln!(
                stdout,
                "[{}] {} {} - {}",
                notice.at.format("%H:%M:%S"),
                kind.icon(),
                title,
                body
            )?;
        }

        let mut board = self.board.lock().map_err(|_| NotifyError::Poisoned)?;
        if board.len() == MESSAGE_HISTORY {
            board.pop_front();
        }
        board.push_back(notice);
        Ok(())
    }
}
