use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use std::{
    error::Error,
    io,
    time::{Duration, Instant},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
    Frame, Terminal,
};

use ultratrack::dispatcher::Dispatcher;
use ultratrack::dummy_master::DummyMaster;
use ultratrack::event_queue::EventQueue;
use ultratrack::history::{Bounds, Track};
use ultratrack::scenario::DisplayColor;

struct App<'a> {
    dispatcher: &'a mut Dispatcher<DummyMaster>,
    queue: EventQueue,
    true_points: Vec<(f64, f64)>,
    tracks: Vec<(String, Color, Vec<(f64, f64)>)>,
    bounds: Bounds,
}

impl<'a> App<'a> {
    fn new(dispatcher: &'a mut Dispatcher<DummyMaster>, queue: EventQueue) -> App<'a> {
        let bounds = dispatcher.bounds();
        App {
            dispatcher,
            queue,
            true_points: vec![],
            tracks: vec![],
            bounds,
        }
    }

    fn on_tick(&mut self) {
        self.dispatcher.drain(self.queue.clone());

        self.true_points = self
            .dispatcher
            .master()
            .true_positions()
            .iter()
            .map(|p| (p.x, p.y))
            .collect();

        let scenarios = self.dispatcher.scenarios();
        self.tracks = self
            .dispatcher
            .display_tracks()
            .iter()
            .map(|track| {
                let (name, color) = match track {
                    Track::Scenario { scenario, .. } => {
                        let scenario = scenario.and_then(|id| scenarios.get(id));
                        (
                            scenario.map_or("unknown".to_owned(), |s| s.name.clone()),
                            scenario.map_or(Color::White, |s| to_color(s.display_color)),
                        )
                    }
                    Track::Transmitter { tx_address, .. } => {
                        (format!("tx {}", tx_address), Color::Yellow)
                    }
                };
                let points = track.points().iter().map(|p| (p.x, p.y)).collect();
                (name, color, points)
            })
            .collect();

        self.bounds = self.dispatcher.bounds();
    }
}

fn to_color(color: DisplayColor) -> Color {
    match color {
        DisplayColor::Red => Color::Red,
        DisplayColor::Blue => Color::Blue,
        DisplayColor::Green => Color::Green,
        DisplayColor::Black => Color::DarkGray,
        DisplayColor::Orange => Color::LightRed,
        DisplayColor::SlateGray => Color::Gray,
        DisplayColor::White => Color::White,
    }
}

pub fn engage_gui(
    dispatcher: &mut Dispatcher<DummyMaster>,
    queue: EventQueue,
    tick_rate: Duration,
) -> Result<(), Box<dyn Error>> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // create app and run it
    let app = App::new(dispatcher, queue);
    let res = run_app(&mut terminal, app, tick_rate);

    // restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    tick_rate: Duration,
) -> io::Result<()> {
    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| ui(f, &app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if let KeyCode::Char('q') = key.code {
                    return Ok(());
                }
            }
        }
        if last_tick.elapsed() >= tick_rate {
            app.on_tick();
            last_tick = Instant::now();
        }
    }
}

fn labels(min: f64, max: f64) -> Vec<Span<'static>> {
    (0..5)
        .map(|i| min + (max - min) * i as f64 / 4.0)
        .map(|v| Span::from(format!("{:.0}", v)))
        .collect()
}

fn ui(f: &mut Frame, app: &App) {
    let mut datasets = vec![Dataset::default()
        .name("Simulated")
        .marker(symbols::Marker::Dot)
        .graph_type(GraphType::Scatter)
        .style(Style::default().fg(Color::Cyan))
        .data(&app.true_points)];
    datasets.extend(app.tracks.iter().map(|(name, color, points)| {
        Dataset::default()
            .name(name.clone())
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(*color))
            .data(points)
    }));

    let title = format!(
        " {} | {} positions{} (q to quit) ",
        app.dispatcher.status_text(),
        app.dispatcher.history().len(),
        if app.dispatcher.is_merging() { ", merging" } else { "" }
    );
    let b = app.bounds;
    let chart = Chart::new(datasets)
        .block(Block::default().title(title).borders(Borders::ALL))
        .x_axis(
            Axis::default()
                .title(Span::styled("X [mm]", Style::default().fg(Color::Red)))
                .style(Style::default().fg(Color::White))
                .bounds([b.min_x, b.max_x])
                .labels(labels(b.min_x, b.max_x)),
        )
        .y_axis(
            Axis::default()
                .title(Span::styled("Y [mm]", Style::default().fg(Color::Red)))
                .style(Style::default().fg(Color::White))
                .bounds([b.min_y, b.max_y])
                .labels(labels(b.min_y, b.max_y)),
        );

    f.render_widget(chart, f.size());
}
