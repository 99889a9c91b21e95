use std::{path::PathBuf, time::Duration};

use crate::gui::{error::MonitorError, terminal::enter_raw_mode};

use crossterm::event::{self, KeyCode, KeyEventKind};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
};

/// Position in a list of `len` entries that wraps at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    at: usize,
    len: usize,
}

impl Cursor {
    fn new(len: usize) -> Self {
        Cursor { at: 0, len }
    }

    fn down(&mut self) {
        self.at = (self.at + 1) % self.len;
    }

    fn up(&mut self) {
        self.at = (self.at + self.len - 1) % self.len;
    }
}

/// Lets the user pick one of `available_ports` for the serial sink, which
/// will be opened at `baud`. `None` if there was nothing to pick or the user
/// chose to run without a serial sink.
pub fn device_selector(
    mut available_ports: Vec<PathBuf>,
    baud: u32,
) -> Result<Option<PathBuf>, MonitorError> {
    if available_ports.is_empty() {
        return Ok(None);
    }

    let (mut terminal, _restore) = enter_raw_mode()?;

    let mut cursor = Cursor::new(available_ports.len());
    let mut list_state = ListState::default().with_selected(Some(cursor.at));
    let mut selected_port = None;
    loop {
        let title = Title::from(Line::from(vec![
            " Serial Sink ".cyan().bold(),
            format!("at {} baud ", baud).into(),
        ]));
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".cyan().bold(),
            " Send positions here ".into(),
            "<Enter>".cyan().bold(),
            " No serial sink ".into(),
            "<Q> ".cyan().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let port_names = available_ports.iter().map(|p| p.to_string_lossy());
        let list = List::new(port_names)
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Cyan))
            .block(block);
        list_state.select(Some(cursor.at));
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_stateful_widget(list, area, &mut list_state);
        })?;

        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Down => cursor.down(),
                        KeyCode::Up => cursor.up(),
                        KeyCode::Enter => {
                            selected_port = Some(cursor.at);
                            break;
                        }
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        _ => {}
                    }
                }
            }
        }
    }

    Ok(selected_port.map(|i| available_ports.swap_remove(i)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_to_select() {
        assert!(device_selector(vec![], 9600).unwrap().is_none());
    }

    #[test]
    fn cursor_wraps_both_ways() {
        let mut cursor = Cursor::new(3);
        cursor.up();
        assert_eq!(cursor.at, 2);
        cursor.down();
        assert_eq!(cursor.at, 0);
        cursor.down();
        cursor.down();
        assert_eq!(cursor.at, 2);
    }

    #[test]
    fn single_port_stays_put() {
        let mut cursor = Cursor::new(1);
        cursor.down();
        cursor.up();
        assert_eq!(cursor.at, 0);
    }
}
