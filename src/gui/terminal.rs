//! Raw-mode terminal setup that is undone however the screen is left.

use std::io::{stdout, Stdout};

use crate::gui::error::MonitorError;

use crossterm::{
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use log::warn;
use ratatui::{backend::CrosstermBackend, Terminal};

/// Runs `restore` when dropped, including when a `?` returns early.
pub struct RestoreOnDrop<F: FnOnce()> {
    restore: Option<F>,
}

impl<F: FnOnce()> RestoreOnDrop<F> {
    /// Guard that will call `restore` once.
    pub fn new(restore: F) -> Self {
        RestoreOnDrop {
            restore: Some(restore),
        }
    }
}

impl<F: FnOnce()> Drop for RestoreOnDrop<F> {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

fn leave_raw_mode() {
    if let Err(e) = disable_raw_mode() {
        warn!("could not leave raw mode: {}", e);
    }
    if let Err(e) = stdout().execute(LeaveAlternateScreen) {
        warn!("could not leave the alternate screen: {}", e);
    }
}

/// Switches to raw mode on the alternate screen. The terminal goes back to
/// normal when the returned guard is dropped.
pub fn enter_raw_mode(
) -> Result<(Terminal<CrosstermBackend<Stdout>>, RestoreOnDrop<fn()>), MonitorError> {
    enable_raw_mode()?;
    let guard = RestoreOnDrop::new(leave_raw_mode as fn());
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;
    Ok((terminal, guard))
}
