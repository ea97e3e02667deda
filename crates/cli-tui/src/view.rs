use genq_history::card::CardBody;
use genq_history::record::RecordStatus;
use genq_history::sink::Card;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};
use std::path::PathBuf;

use crate::app::{App, CARD_HEIGHT};

/// Copy of the rendered set taken for one frame.
#[derive(Debug, Default)]
pub struct ViewState {
    pub cards: Vec<Card>,
    pub placeholder: bool,
    pub loaded: usize,
    pub total: usize,
    pub polling: bool,
    pub loading: bool,
    pub store_dir: PathBuf,
}

/// Rows available to the card list for a terminal of the given height.
pub fn list_rows(terminal_height: u16) -> usize {
    // top bar (3) + status bar (3) + list borders (2)
    usize::from(terminal_height).saturating_sub(8)
}

pub fn visible_cards(terminal_height: u16) -> usize {
    (list_rows(terminal_height) / CARD_HEIGHT).max(1)
}

pub fn ui(f: &mut Frame, app: &App, state: &ViewState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(CARD_HEIGHT as u16 + 2),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_top_bar(f, state, chunks[0]);
    render_history(f, app, state, chunks[1]);
    render_status_bar(f, app, state, chunks[2]);

    if let Some(overlay) = &app.overlay {
        let area = centered_rect(60, 40, f.area());
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new(overlay.body.as_str())
                .wrap(Wrap { trim: false })
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(format!(" {} ", overlay.title))
                        .border_style(Style::default().fg(Color::Cyan)),
                ),
            area,
        );
    }
}

fn render_top_bar(f: &mut Frame, state: &ViewState, area: Rect) {
    let pending = state
        .cards
        .iter()
        .filter(|c| c.status == RecordStatus::Pending)
        .count();

    let line = Line::from(vec![
        Span::styled("genqtop", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("  {}  ", state.store_dir.display())),
        Span::styled(
            format!("{} pending", pending),
            Style::default().fg(status_color(RecordStatus::Pending)),
        ),
    ]);

    f.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

fn render_history(f: &mut Frame, app: &App, state: &ViewState, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" History ({}/{}) ", state.loaded, state.total));

    if state.cards.is_empty() {
        let text = if state.placeholder {
            "No history yet. Submit a job with `genq submit`."
        } else {
            "Loading..."
        };
        f.render_widget(
            Paragraph::new(text)
                .style(Style::default().fg(Color::DarkGray))
                .block(block),
            area,
        );
        return;
    }

    let visible = (usize::from(area.height).saturating_sub(2) / CARD_HEIGHT).max(1);
    let mut lines = Vec::with_capacity(visible * CARD_HEIGHT);
    for (index, card) in state
        .cards
        .iter()
        .enumerate()
        .skip(app.offset)
        .take(visible)
    {
        lines.extend(card_lines(card, index == app.selected));
    }

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn card_lines(card: &Card, selected: bool) -> Vec<Line<'static>> {
    let marker = if selected { "> " } else { "  " };
    let highlight = if selected {
        Style::default().add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    let mut header = vec![
        Span::styled(format!("{}#{:<5}", marker, card.id), highlight),
        Span::styled(
            format!("{:<9}", card.status.as_str()),
            Style::default().fg(status_color(card.status)),
        ),
        Span::styled(card.content.meta.clone(), Style::default().fg(Color::DarkGray)),
    ];
    if card.content.thumbnail {
        header.push(Span::styled("  [image]", Style::default().fg(Color::Magenta)));
    }

    let body_style = match card.content.body {
        CardBody::Generating => Style::default().fg(Color::Yellow),
        CardBody::Video { .. } => Style::default().fg(Color::Green),
        CardBody::Rejected | CardBody::Error { .. } => Style::default().fg(Color::Red),
        CardBody::Unavailable => Style::default().fg(Color::DarkGray),
    };

    vec![
        Line::from(header),
        Line::from(Span::raw(format!("    {}", truncate(&card.content.prompt, 100)))),
        Line::from(Span::styled(format!("    {}", card.content.headline()), body_style)),
    ]
}

fn render_status_bar(f: &mut Frame, app: &App, state: &ViewState, area: Rect) {
    let polling = if state.polling { "polling" } else { "idle" };
    let loading = if state.loading { " │ loading page" } else { "" };
    let message = app
        .message
        .as_ref()
        .map(|m| format!(" │ {}", m))
        .unwrap_or_default();

    let text = format!(
        "q quit │ ↑↓ PgUp PgDn scroll │ r refresh │ p prompt │ i image │ {}{}{}",
        polling, loading, message
    );

    f.render_widget(
        Paragraph::new(text).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

pub fn status_color(status: RecordStatus) -> Color {
    match status {
        RecordStatus::Pending => Color::Yellow,
        RecordStatus::Done => Color::Green,
        RecordStatus::Rejected => Color::Magenta,
        RecordStatus::Failed => Color::Red,
        RecordStatus::Expired => Color::DarkGray,
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
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
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use genq_history::record::{AspectRatio, Record, RecordId, Resolution};
    use genq_history::sink::{CardList, RenderSink};
    use ratatui::{backend::TestBackend, Terminal};

    fn record(id: u64, status: RecordStatus) -> Record {
        Record {
            id: RecordId::from(id),
            status,
            prompt: format!("a red fox number {}", id),
            duration: 10,
            aspect_ratio: AspectRatio::Wide,
            resolution: Resolution::Hd720,
            video_ref: None,
            error_message: None,
            has_source_image: false,
            created_at: None,
        }
    }

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        buffer.content.iter().map(|cell| cell.symbol()).collect()
    }

    #[test]
    fn test_truncate_keeps_short_strings() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer prompt", 8), "a lon...");
    }

    #[test]
    fn test_visible_cards_never_zero() {
        assert_eq!(visible_cards(5), 1);
        assert_eq!(visible_cards(8 + 3 * CARD_HEIGHT as u16), 3);
    }

    #[test]
    fn test_renders_cards_and_counts() {
        let mut list = CardList::new();
        list.create(&RecordId::from(2u64), &record(2, RecordStatus::Pending), 0);
        list.create(&RecordId::from(1u64), &record(1, RecordStatus::Rejected), 1);

        let state = ViewState {
            cards: list.cards().to_vec(),
            loaded: 2,
            total: 7,
            polling: true,
            ..Default::default()
        };

        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|f| ui(f, &App::new(), &state)).unwrap();
        let text = buffer_text(&terminal);

        assert!(text.contains("History (2/7)"));
        assert!(text.contains("Generating video..."));
        assert!(text.contains("Rejected by content moderation"));
        assert!(text.contains("polling"));
    }

    #[test]
    fn test_placeholder_when_history_is_empty() {
        let state = ViewState {
            placeholder: true,
            ..Default::default()
        };

        let mut terminal = Terminal::new(TestBackend::new(80, 16)).unwrap();
        terminal.draw(|f| ui(f, &App::new(), &state)).unwrap();

        assert!(buffer_text(&terminal).contains("No history yet"));
    }
}
