use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use tracing_subscriber::EnvFilter;

mod ai;
mod app;
mod commands;
mod config;
mod db;
mod error;
mod feed;
mod models;
mod services;
mod tui;

use app::App;
use config::Config;
use error::Result;
use tui::{draw, handle_key_event};

enum Mode {
    Interactive,
    Refresh,
    Import(PathBuf),
}

fn parse_args(args: &[String]) -> Mode {
    match args.get(1).map(String::as_str) {
        Some("--refresh") => Mode::Refresh,
        Some("--import") if args.len() >= 3 => Mode::Import(PathBuf::from(&args[2])),
        _ => Mode::Interactive,
    }
}

/// WARN by default, `RUST_LOG` overrides. The TUI owns the terminal, so in
/// interactive mode logs go to a file instead of stderr.
fn init_logging(mode: &Mode) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match mode {
        Mode::Interactive => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(Config::log_path())?;
            builder
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        _ => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mode = parse_args(&args);

    init_logging(&mode)?;

    // Load configuration
    let config = Config::load()?;

    // Initialize app
    let mut app = App::new(&config).await?;

    match mode {
        Mode::Import(path) => {
            let imported = app.import_opml(&path).await?;
            println!("Imported {} feeds from {}", imported, path.display());
            return Ok(());
        }
        Mode::Refresh => {
            app.refresh_headless().await?;
            return Ok(());
        }
        Mode::Interactive => {}
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    app.start();

    // Run the app
    let result = run_app(&mut terminal, &mut app).await;

    app.shutdown();

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    Ok(())
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|frame| draw(frame, app))?;

        // Apply updates from background tasks
        app.poll_events();

        // Poll for events with timeout to allow async operations
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(action) =
                        handle_key_event(key, app.command_input_active, app.show_help)
                    {
                        let should_quit = app.handle_action(action).await?;
                        if should_quit {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
