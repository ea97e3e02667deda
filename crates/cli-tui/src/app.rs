use chrono::{DateTime, Utc};
use crossterm::event::KeyCode;
use genq_history::viewport::{ScrollMetrics, ScrollSource};

/// Terminal rows taken by one history card.
pub const CARD_HEIGHT: usize = 3;

/// What the event loop should do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    Refresh,
    /// The list moved; check whether the next page is needed.
    Scrolled(ScrollSource),
    ShowPrompt,
    ShowImage,
}

/// A popup drawn over the list until dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct App {
    /// Index of the highlighted card.
    pub selected: usize,
    /// Index of the first visible card.
    pub offset: usize,
    pub overlay: Option<Overlay>,
    pub message: Option<String>,
    pub message_timeout: Option<DateTime<Utc>>,
    pub should_quit: bool,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// `count` is the number of rendered cards, `visible` how many fit on
    /// screen.
    pub fn handle_key(&mut self, code: KeyCode, count: usize, visible: usize) -> Action {
        if self.overlay.is_some() {
            return match code {
                KeyCode::Char('q') => {
                    self.should_quit = true;
                    Action::Quit
                }
                _ => {
                    self.overlay = None;
                    Action::None
                }
            };
        }

        match code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Action::Quit
            }
            KeyCode::Char('r') => Action::Refresh,
            KeyCode::Char('p') => Action::ShowPrompt,
            KeyCode::Char('i') => Action::ShowImage,
            KeyCode::Up => {
                self.select_prev(visible);
                Action::Scrolled(ScrollSource::Panel)
            }
            KeyCode::Down => {
                self.select_next(count, visible);
                Action::Scrolled(ScrollSource::Panel)
            }
            KeyCode::PageUp => {
                self.page_up(visible);
                Action::Scrolled(ScrollSource::Page)
            }
            KeyCode::PageDown => {
                self.page_down(count, visible);
                Action::Scrolled(ScrollSource::Page)
            }
            KeyCode::Home => {
                self.selected = 0;
                self.keep_selection_visible(visible);
                Action::Scrolled(ScrollSource::Page)
            }
            KeyCode::End => {
                self.selected = count.saturating_sub(1);
                self.keep_selection_visible(visible);
                Action::Scrolled(ScrollSource::Page)
            }
            _ => Action::None,
        }
    }

    pub fn select_next(&mut self, count: usize, visible: usize) {
        if self.selected + 1 < count {
            self.selected += 1;
        }
        self.keep_selection_visible(visible);
    }

    pub fn select_prev(&mut self, visible: usize) {
        self.selected = self.selected.saturating_sub(1);
        self.keep_selection_visible(visible);
    }

    pub fn page_down(&mut self, count: usize, visible: usize) {
        self.selected = (self.selected + visible.max(1)).min(count.saturating_sub(1));
        self.keep_selection_visible(visible);
    }

    pub fn page_up(&mut self, visible: usize) {
        self.selected = self.selected.saturating_sub(visible.max(1));
        self.keep_selection_visible(visible);
    }

    /// The list can shrink under the selection when a refresh drops records.
    pub fn clamp(&mut self, count: usize, visible: usize) {
        self.selected = self.selected.min(count.saturating_sub(1));
        self.keep_selection_visible(visible);
    }

    fn keep_selection_visible(&mut self, visible: usize) {
        let visible = visible.max(1);
        if self.selected < self.offset {
            self.offset = self.selected;
        } else if self.selected >= self.offset + visible {
            self.offset = self.selected + 1 - visible;
        }
    }

    /// Scroll position of the panel, in terminal rows.
    pub fn scroll_metrics(&self, count: usize, viewport_rows: usize) -> ScrollMetrics {
        ScrollMetrics::new(self.offset * CARD_HEIGHT, viewport_rows, count * CARD_HEIGHT)
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
        self.message_timeout = Some(Utc::now() + chrono::Duration::seconds(5));
    }

    pub fn expire_message(&mut self) {
        if let Some(timeout) = self.message_timeout {
            if Utc::now() > timeout {
                self.message = None;
                self.message_timeout = None;
            }
        }
    }
}
