use std::time::Duration;

use crate::gui::{error::MonitorError, terminal::enter_raw_mode};

use crossterm::event::{self, KeyEventKind};

use ratatui::{
    prelude::*,
    widgets::{block::Title, *},
};

/// Runs a function over and over until the user presses a key.
///
/// The function can be thought of as a fold. `f` is called on `init` to
/// produce a new state, then on that new state, and so on. Between calls the
/// lines `status` makes of the current state are shown. Everything runs on
/// the calling thread, so the state does not have to be [`Send`].
pub fn fold_until_stop<T, F, S>(init: T, mut f: F, status: S) -> Result<T, MonitorError>
where
    F: FnMut(T) -> T,
    S: Fn(&T) -> Vec<String>,
{
    let (mut terminal, _restore) = enter_raw_mode()?;

    let mut val = init;
    loop {
        val = f(val);

        let title = Title::from(" Tracking Transmitters... ".cyan().bold());
        let mut lines: Vec<Line> = status(&val).into_iter().map(Line::from).collect();
        lines.push(Line::from(" Press any key to stop ".bold()));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .borders(Borders::ALL);
        let text = Paragraph::new(lines).block(block);
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_widget(text, area);
        })?;

        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    break;
                }
            }
        }
    }

    Ok(val)
}
