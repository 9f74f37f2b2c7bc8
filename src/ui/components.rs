//! Panels drawn by the sync screen

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, Paragraph};
use ratatui::Frame;
use std::collections::VecDeque;

use super::{Phase, Progress};

/// Status panel showing the phase and the species in flight
pub struct StatusPanel {
    phase: Phase,
    info: String,
}

impl StatusPanel {
    pub fn new() -> Self {
        Self {
            phase: Phase::Checking,
            info: String::new(),
        }
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn set_info(&mut self, info: impl Into<String>) {
        self.info = info.into();
    }

    fn accent(&self) -> Style {
        let color = if self.phase == Phase::Complete {
            Color::Green
        } else {
            Color::Cyan
        };
        Style::default().fg(color).add_modifier(Modifier::BOLD)
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let glyph = match self.phase {
            Phase::Checking => "◐",
            Phase::Syncing => "↓",
            Phase::Complete => "✓",
        };

        let header = Line::from(Span::styled(format!(" {} {}", glyph, self.phase), self.accent()));
        let detail = Line::from(Span::styled(
            format!("   {}", self.info),
            Style::default().fg(Color::Gray),
        ));
        let hint = Line::from(Span::styled(
            "   q: leave (stored records are kept, the next sync resumes)",
            Style::default().fg(Color::DarkGray),
        ));

        let panel = Paragraph::new(vec![header, detail, hint]).block(
            Block::bordered()
                .title(" Pokédex Sync ")
                .border_style(Style::default().fg(Color::Blue)),
        );
        frame.render_widget(panel, area);
    }
}

/// Progress panel showing the species gauge
pub struct ProgressPanel {
    progress: Option<Progress>,
}

impl ProgressPanel {
    pub fn new() -> Self {
        Self { progress: None }
    }

    pub fn set_progress(&mut self, progress: Progress) {
        self.progress = Some(progress);
    }

    pub fn clear(&mut self) {
        self.progress = None;
    }

    /// Gauge caption, e.g. "Species 3/151 (2%)"
    fn caption(progress: &Progress) -> String {
        if progress.total == 0 {
            return progress.label.clone();
        }
        let percent = progress.ratio() * 100.0;
        format!("{} {}/{} ({:.0}%)", progress.label, progress.current, progress.total, percent)
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let sides = Block::default()
            .borders(Borders::LEFT | Borders::RIGHT)
            .border_style(Style::default().fg(Color::Blue));

        let Some(progress) = &self.progress else {
            frame.render_widget(sides, area);
            return;
        };

        let gauge = Gauge::default()
            .block(sides)
            .gauge_style(Style::default().fg(Color::Cyan).bg(Color::DarkGray))
            .ratio(progress.ratio().clamp(0.0, 1.0))
            .label(Self::caption(progress));
        frame.render_widget(gauge, area);
    }
}

const MAX_LOG_ENTRIES: usize = 200;

/// Log panel showing the most recent activity
pub struct LogPanel {
    entries: VecDeque<String>,
}

impl LogPanel {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(MAX_LOG_ENTRIES),
        }
    }

    pub fn add(&mut self, message: impl Into<String>) {
        if self.entries.len() == MAX_LOG_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(message.into());
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        // Inner height, without the two border rows
        let rows = usize::from(area.height.saturating_sub(2));
        let newest = self.entries.len().saturating_sub(1);

        let items: Vec<ListItem> = self
            .entries
            .iter()
            .enumerate()
            .rev()
            .take(rows)
            .rev()
            .map(|(i, entry)| {
                let color = if i == newest { Color::White } else { Color::DarkGray };
                ListItem::new(Span::styled(format!(" {}", entry), Style::default().fg(color)))
            })
            .collect();

        let list = List::new(items).block(
            Block::bordered()
                .title(" Activity ")
                .border_style(Style::default().fg(Color::Blue)),
        );
        frame.render_widget(list, area);
    }
}
