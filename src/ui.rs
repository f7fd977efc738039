//! Terminal user interface with ratatui.

use crate::app::App;
use crate::models::{Connectivity, RangeStatus};
use crate::notify::MessageKind;
use num_format::{Locale, ToFormattedString};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
};

/// Colors for the UI.
pub struct UiColors {
    pub gain: Color,
    pub loss: Color,
    pub neutral: Color,
    pub in_range: Color,
    pub below: Color,
    pub above: Color,
    pub header_bg: Color,
    pub selected_bg: Color,
    pub border: Color,
}

impl Default for UiColors {
    fn default() -> Self {
        Self {
            gain: Color::Green,
            loss: Color::Red,
            neutral: Color::White,
            in_range: Color::Green,
            below: Color::Red,
            above: Color::Blue,
            header_bg: Color::DarkGray,
            selected_bg: Color::Rgb(40, 40, 60),
            border: Color::DarkGray,
        }
    }
}

impl UiColors {
    fn status(&self, status: RangeStatus) -> Color {
        match status {
            RangeStatus::Pending => self.neutral,
            RangeStatus::Below => self.below,
            RangeStatus::InRange => self.in_range,
            RangeStatus::Above => self.above,
        }
    }
}

/// Render the main UI.
pub fn render(frame: &mut Frame, app: &App) {
    let colors = UiColors::default();

    let watch_rows = app.watchlist.len() as u16 + 3;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),                  // Header
            Constraint::Length(watch_rows.min(14)), // Watchlist
            Constraint::Min(6),                     // Alerts
            Constraint::Length(7),                  // Messages
            Constraint::Length(1),                  // Footer
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0], &colors);
    render_watchlist(frame, app, chunks[1], &colors);
    render_alerts(frame, app, chunks[2], &colors);
    render_messages(frame, app, chunks[3], &colors);
    render_footer(frame, app, chunks[4], &colors);

    if app.show_help {
        render_help_overlay(frame, &colors);
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect, colors: &UiColors) {
    let (conn_text, conn_color) = match app.status.connectivity {
        Connectivity::Healthy => ("● Online", colors.gain),
        Connectivity::Unhealthy => ("● Offline", colors.loss),
        Connectivity::Unknown => ("○ Connecting", colors.neutral),
    };

    let in_range = app
        .alerts
        .iter()
        .filter(|a| a.status == RangeStatus::InRange)
        .count();
    let last_update = app
        .status
        .last_success
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());

    let header_text = vec![
        Line::from(vec![
            Span::styled(
                "RANGETOP ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled(conn_text, Style::default().fg(conn_color)),
            Span::raw(format!("  Last update: {}", last_update)),
        ]),
        Line::from(vec![
            Span::raw(format!("Symbols: {}  ", app.watchlist.len())),
            Span::raw(format!("Alerts: {}  ", app.alerts.len())),
            Span::styled(
                format!("In range: {}", in_range),
                Style::default().fg(colors.in_range),
            ),
            Span::raw(format!("  Last {}", app.cycle_summary())),
        ]),
    ];

    let header = Paragraph::new(header_text).block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(colors.border)),
    );

    frame.render_widget(header, area);
}

fn render_watchlist(frame: &mut Frame, app: &App, area: Rect, colors: &UiColors) {
    let header = Row::new(
        ["SYMBOL", "NAME", "PRICE", "CHANGE", "CHG%", "VOLUME"]
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().fg(Color::White))),
    )
    .style(Style::default().bg(colors.header_bg))
    .height(1);

    let rows = app.watchlist.iter().map(|entry| {
        let quote = &entry.latest_quote;
        let change_color = if quote.change_percent > 0.0 {
            colors.gain
        } else if quote.change_percent < 0.0 {
            colors.loss
        } else {
            colors.neutral
        };

        Row::new(vec![
            Cell::from(entry.symbol.clone()),
            Cell::from(truncate_string(&quote.name, 20)),
            Cell::from(format_price(quote.price)),
            Cell::from(format!("{:+.2}", quote.change)).style(Style::default().fg(change_color)),
            Cell::from(format!("{:+.2}%", quote.change_percent))
                .style(Style::default().fg(change_color)),
            Cell::from(format_volume(quote.volume)),
        ])
    });

    let widths = [
        Constraint::Length(10),
        Constraint::Length(22),
        Constraint::Length(12),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(12),
    ];

    let title = if app.watchlist.is_empty() {
        " Watchlist (empty: rangetop add AAPL) "
    } else {
        " Watchlist "
    };
    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .title(title)
            .borders(Borders::TOP)
            .border_style(Style::default().fg(colors.border)),
    );

    frame.render_widget(table, area);
}

fn render_alerts(frame: &mut Frame, app: &App, area: Rect, colors: &UiColors) {
    let header = Row::new(
        ["BUCKET", "ID", "SYMBOL", "RANGE", "PRICE", "STATUS", "DEV%", "ON"]
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().fg(Color::White))),
    )
    .style(Style::default().bg(colors.header_bg))
    .height(1);

    let rows = app.alert_rows().into_iter().enumerate().map(|(i, alert)| {
        let status_style = Style::default().fg(colors.status(alert.status));
        let row_style = if i == app.selected {
            Style::default().bg(colors.selected_bg)
        } else {
            Style::default()
        };
        let flags = match (alert.alert_on_enter, alert.alert_on_exit) {
            (true, true) => "enter+exit",
            (true, false) => "enter",
            (false, true) => "exit",
            (false, false) => "-",
        };

        Row::new(vec![
            Cell::from(truncate_string(&alert.bucket, 12)),
            Cell::from(alert.id.to_string()),
            Cell::from(alert.symbol.clone()),
            Cell::from(alert.range_label()),
            Cell::from(format_price(alert.current_price)),
            Cell::from(alert.status.to_string()).style(status_style),
            Cell::from(format!("{:.2}", alert.percent_deviation)).style(status_style),
            Cell::from(flags),
        ])
        .style(row_style)
    });

    let widths = [
        Constraint::Length(14),
        Constraint::Length(8),
        Constraint::Length(10),
        Constraint::Length(20),
        Constraint::Length(12),
        Constraint::Length(10),
        Constraint::Length(8),
        Constraint::Length(11),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(" Alerts ")
                .borders(Borders::TOP)
                .border_style(Style::default().fg(colors.border)),
        )
        .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = TableState::default();
    if !app.alerts.is_empty() {
        state.select(Some(app.selected));
    }

    frame.render_stateful_widget(table, area, &mut state);
}

fn render_messages(frame: &mut Frame, app: &App, area: Rect, colors: &UiColors) {
    let visible = area.height.saturating_sub(1) as usize;
    let lines: Vec<Line> = app
        .notices
        .iter()
        .rev()
        .take(visible)
        .map(|notice| {
            let color = match notice.kind {
                MessageKind::Enter => colors.in_range,
                MessageKind::Exit => colors.loss,
                MessageKind::Generic => colors.neutral,
            };
            Line::from(vec![
                Span::raw(format!("{} ", notice.at.format("%H:%M:%S"))),
                Span::styled(
                    format!("{} {}", notice.kind.icon(), notice.title),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
                Span::raw(format!("  {}", notice.body)),
            ])
        })
        .collect();

    let messages = Paragraph::new(lines).block(
        Block::default()
            .title(" Messages ")
            .borders(Borders::TOP)
            .border_style(Style::default().fg(colors.border)),
    );

    frame.render_widget(messages, area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect, colors: &UiColors) {
    let footer = Line::from(vec![
        Span::styled(" q", Style::default().fg(Color::Yellow)),
        Span::raw(":quit "),
        Span::styled("h", Style::default().fg(Color::Yellow)),
        Span::raw(":help "),
        Span::styled("r", Style::default().fg(Color::Yellow)),
        Span::raw(":refresh "),
        Span::styled("p", Style::default().fg(Color::Yellow)),
        Span::raw(":pause "),
        Span::styled("t", Style::default().fg(Color::Yellow)),
        Span::raw(":test "),
        Span::styled(
            if app.paused { "| PAUSED " } else { "| AUTO " },
            Style::default().fg(if app.paused { colors.loss } else { colors.gain }),
        ),
        Span::raw(format!(
            "| every {:.0}s | {:?} | Cycles: {} | {}",
            app.refresh_interval.as_secs_f64(),
            app.overlap,
            app.status.completed_cycles,
            app.time_since_refresh()
        )),
    ]);

    let footer_widget = Paragraph::new(footer).style(Style::default().bg(colors.header_bg));

    frame.render_widget(footer_widget, area);
}

fn render_help_overlay(frame: &mut Frame, colors: &UiColors) {
    let area = centered_rect(60, 60, frame.area());

    let help_text = vec![
        Line::from(Span::styled(
            "RANGETOP HELP",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Navigation:"),
        Line::from("  ↑/k       Move up"),
        Line::from("  ↓/j       Move down"),
        Line::from("  g/Home    Go to top"),
        Line::from("  G/End     Go to bottom"),
        Line::from(""),
        Line::from("Actions:"),
        Line::from("  Space/r   Refresh now"),
        Line::from("  p         Pause/resume auto-update"),
        Line::from("  t         Test selected alert"),
        Line::from("  q/Esc     Quit"),
        Line::from("  h/?       Toggle help"),
        Line::from(""),
        Line::from("Alerts are managed from the command line:"),
        Line::from("  rangetop alert add -s AAPL --min 100 --max 110"),
        Line::from(""),
        Line::from("Press any key to close"),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .title(" Help ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(colors.border)),
        )
        .wrap(Wrap { trim: false });

    frame.render_widget(Clear, area);
    frame.render_widget(help, area);
}

/// Create a centered rectangle.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Format price with appropriate precision; sub-dollar prices get more decimals.
fn format_price(price: f64) -> String {
    if price >= 1.0 {
        format!("${:.2}", price)
    } else {
        format!("${:.6}", price)
    }
}

/// Format volume with suffixes.
fn format_volume(volume: u64) -> String {
    if volume >= 1_000_000_000 {
        format!("{:.2}B", volume as f64 / 1_000_000_000.0)
    } else if volume >= 1_000_000 {
        format!("{:.2}M", volume as f64 / 1_000_000.0)
    } else if volume >= 1_000 {
        format!("{:.2}K", volume as f64 / 1_000.0)
    } else {
        volume.to_formatted_string(&Locale::en)
    }
}

/// Truncate string to max length.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        ".".repeat(max_len)
    } else {
        let mut end = max_len.saturating_sub(3);
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// Render batch mode output (non-interactive).
pub fn render_batch(app: &App) {
    use chrono::Local;

    println!(
        "\n=== RANGETOP {} [{}] ===",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        app.status.connectivity
    );
    println!("Last {}", app.cycle_summary());

    println!(
        "{:<10} {:<20} {:>12} {:>10} {:>10} {:>12}",
        "SYMBOL", "NAME", "PRICE", "CHANGE", "CHG%", "VOLUME"
    );
    println!("{}", "-".repeat(79));
    if app.watchlist.is_empty() {
        println!("(empty - add symbols with: rangetop add AAPL)");
    }
    for entry in &app.watchlist {
        let quote = &entry.latest_quote;
        println!(
            "{:<10} {:<20} {:>12} {:>+10.2} {:>+9.2}% {:>12}",
            entry.symbol,
            truncate_string(&quote.name, 20),
            format_price(quote.price),
            quote.change,
            quote.change_percent,
            format_volume(quote.volume)
        );
    }

    if !app.alerts.is_empty() {
        println!();
        println!(
            "{:<12} {:>7} {:<8} {:>19} {:>12} {:<9} {:>8}",
            "BUCKET", "ID", "SYMBOL", "RANGE", "PRICE", "STATUS", "DEV%"
        );
        println!("{}", "-".repeat(81));
        for alert in app.alerts.iter() {
            println!(
                "{:<12} {:>7} {:<8} {:>19} {:>12} {:<9} {:>8.2}",
                truncate_string(&alert.bucket, 12),
                alert.id,
                alert.symbol,
                alert.range_label(),
                format_price(alert.current_price),
                alert.status.to_string(),
                alert.percent_deviation
            );
        }
    }

    println!();
}
