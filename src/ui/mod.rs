//! Terminal UI module using ratatui
//!
//! Provides a simple API for displaying a sync run:
//! - Current phase (Checking, Syncing, Complete)
//! - Progress (fetched/missing with the species being fetched)
//! - Activity log (scrollable history)

mod components;

use anyhow::Result;
use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::time::Duration;
use tracing::info;

use crate::etl::ProgressSnapshot;
use components::{LogPanel, ProgressPanel, StatusPanel};

/// Application phases shown in the status panel
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Checking,
    Syncing,
    Complete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Checking => write!(f, "Checking stored records"),
            Phase::Syncing => write!(f, "Fetching from PokéAPI"),
            Phase::Complete => write!(f, "Complete"),
        }
    }
}

/// Progress information for the current operation
#[derive(Debug, Clone, Default)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
    pub label: String,
}

impl Progress {
    pub fn new(current: u64, total: u64, label: impl Into<String>) -> Self {
        Self {
            current,
            total,
            label: label.into(),
        }
    }

    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.current as f64 / self.total as f64
        }
    }
}

/// Trait for UI implementations - allows both real TUI and plain/test modes
pub trait Ui {
    fn set_phase(&mut self, phase: Phase);
    fn set_info(&mut self, info: impl Into<String>);
    fn set_progress(&mut self, current: u64, total: u64, label: impl Into<String>);
    fn clear_progress(&mut self);
    fn log(&mut self, message: impl Into<String>);
}

/// Render one progress snapshot onto any UI
pub fn show_snapshot<U: Ui>(ui: &mut U, snapshot: &ProgressSnapshot) {
    let total = snapshot.missing_total as u64;
    let fetched = snapshot.fetched as u64;

    if snapshot.done {
        ui.set_phase(Phase::Complete);
        ui.clear_progress();
        if total == 0 {
            ui.set_info("Store already up to date");
        } else {
            ui.set_info(format!("Processed {} missing species", total));
        }
        return;
    }

    match (snapshot.current_id, snapshot.current_species.as_deref()) {
        (Some(id), Some(species)) => {
            ui.set_phase(Phase::Syncing);
            ui.set_info(format!("#{} {}", id, species));
            ui.set_progress(fetched, total, "Species");
            ui.log(format!("Fetching #{} {}", id, species));
        }
        _ => {
            ui.set_phase(Phase::Checking);
            ui.set_info(format!("{} species missing from the store", total));
            ui.log(format!("{} species to fetch", total));
        }
    }
}

/// Main UI application state - full TUI implementation
pub struct UiApp {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    status: StatusPanel,
    progress: ProgressPanel,
    log: LogPanel,
    should_quit: bool,
}

impl UiApp {
    /// Create a new UI application and enter the alternate screen
    pub fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        let mut app = Self {
            terminal,
            status: StatusPanel::new(),
            progress: ProgressPanel::new(),
            log: LogPanel::new(),
            should_quit: false,
        };
        app.draw()?;
        Ok(app)
    }

    /// Check for quit signal ('q' or Ctrl+C), waiting at most `timeout`
    pub fn check_quit(&mut self, timeout: Duration) -> bool {
        if event::poll(timeout).unwrap_or(false) {
            if let Ok(CrosstermEvent::Key(KeyEvent { code, modifiers, .. })) = event::read() {
                let ctrl_c = code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL);
                if code == KeyCode::Char('q') || ctrl_c {
                    self.should_quit = true;
                }
            }
        }
        self.should_quit
    }

    /// Draw the UI
    fn draw(&mut self) -> Result<()> {
        let status = &self.status;
        let progress = &self.progress;
        let log = &self.log;

        self.terminal.draw(|frame| {
            let area = frame.area();
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(5), // Status panel
                    Constraint::Length(3), // Progress bar
                    Constraint::Min(5),    // Log panel
                ])
                .split(area);

            status.render(frame, chunks[0]);
            progress.render(frame, chunks[1]);
            log.render(frame, chunks[2]);
        })?;

        Ok(())
    }

    /// Finish the UI and restore the terminal
    pub fn finish(mut self, summary: &str) -> Result<()> {
        self.set_phase(Phase::Complete);
        self.clear_progress();
        self.log(summary);
        self.log("Press any key to exit...");
        self.draw()?;

        loop {
            if event::poll(Duration::from_millis(100))? {
                if let CrosstermEvent::Key(_) = event::read()? {
                    break;
                }
            }
        }

        self.restore()
    }

    /// Restore terminal without waiting
    pub fn restore(mut self) -> Result<()> {
        terminal::disable_raw_mode()?;
        self.terminal.backend_mut().execute(LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Ui for UiApp {
    fn set_phase(&mut self, phase: Phase) {
        self.status.set_phase(phase);
        self.draw().ok();
    }

    fn set_info(&mut self, info: impl Into<String>) {
        self.status.set_info(info);
        self.draw().ok();
    }

    fn set_progress(&mut self, current: u64, total: u64, label: impl Into<String>) {
        self.progress
            .set_progress(Progress::new(current, total, label));
        self.draw().ok();
    }

    fn clear_progress(&mut self) {
        self.progress.clear();
        self.draw().ok();
    }

    fn log(&mut self, message: impl Into<String>) {
        self.log.add(message);
        self.draw().ok();
    }
}

impl Drop for UiApp {
    fn drop(&mut self) {
        // Best effort cleanup
        terminal::disable_raw_mode().ok();
        self.terminal
            .backend_mut()
            .execute(LeaveAlternateScreen)
            .ok();
        self.terminal.show_cursor().ok();
    }
}

/// Plain-terminal UI: activity goes to the log instead of the screen
#[derive(Default)]
pub struct LogUi {
    phase: Option<Phase>,
}

impl LogUi {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ui for LogUi {
    fn set_phase(&mut self, phase: Phase) {
        if self.phase.as_ref() != Some(&phase) {
            info!("{}", phase);
            self.phase = Some(phase);
        }
    }

    fn set_info(&mut self, _info: impl Into<String>) {}

    fn set_progress(&mut self, current: u64, total: u64, label: impl Into<String>) {
        info!("{}: {}/{}", label.into(), current, total);
    }

    fn clear_progress(&mut self) {}

    fn log(&mut self, message: impl Into<String>) {
        info!("{}", message.into());
    }
}

/// Silent UI implementation for testing and non-interactive use
#[derive(Default)]
pub struct SilentUi;

impl SilentUi {
    pub fn new() -> Self {
        Self
    }
}

impl Ui for SilentUi {
    fn set_phase(&mut self, _phase: Phase) {}
    fn set_info(&mut self, _info: impl Into<String>) {}
    fn set_progress(&mut self, _current: u64, _total: u64, _label: impl Into<String>) {}
    fn clear_progress(&mut self) {}
    fn log(&mut self, _message: impl Into<String>) {}
}
