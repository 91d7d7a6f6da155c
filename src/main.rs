use tcw::api::download::FileSink;
use tcw::api::executor::HttpBackend;
use tcw::app::{AppConfig, AppState};
use tcw::cli::Cli;
use tcw::controller::Controller;
use tcw::events::EventHandler;
use tcw::traits::{ArtifactSink, Backend};
use tcw::tui;

use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use crossterm::execute;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen, SetTitle};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn setup_verbose_logging() -> Result<()> {
    let state_dir = state_dir();
    std::fs::create_dir_all(&state_dir)
        .map_err(|e| eyre!("Failed to create log directory {state_dir:?}: {e}"))?;
    let log_path = state_dir.join("debug.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| eyre!("Failed to open log file {log_path:?}: {e}"))?;
    tracing_subscriber::fmt()
        .with_writer(file)
        .with_ansi(false)
        .init();
    tracing::info!(
        "tcw v{} starting with verbose logging",
        env!("CARGO_PKG_VERSION")
    );
    Ok(())
}

fn state_dir() -> PathBuf {
    if let Some(state) = std::env::var_os("XDG_STATE_HOME") {
        PathBuf::from(state).join("tcw")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".local").join("state").join("tcw")
    } else {
        PathBuf::from("/tmp/tcw")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    if args.verbose {
        setup_verbose_logging()?;
    }

    // Fail before the terminal is taken over.
    let http = HttpBackend::new(&args.url, &args.api_prefix)?;

    let mut config = AppConfig::new(args.url.clone(), args.output_dir.clone(), args.timings());
    config.version_string = format!(
        "tcw v{}+{}",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_NUMBER")
    );
    let mut state = AppState::new(config);
    state.desktop_notify = !args.no_notify;

    let backend: Arc<dyn Backend> = Arc::new(http);
    let sink: Arc<dyn ArtifactSink> = Arc::new(FileSink::new(args.output_dir.clone()));

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        if let Err(e) = terminal::disable_raw_mode() {
            eprintln!("Failed to disable raw mode during panic: {e}");
        }
        if let Err(e) = execute!(io::stdout(), LeaveAlternateScreen, SetTitle("")) {
            eprintln!("Failed to leave alternate screen during panic: {e}");
        }
        original_hook(panic_info);
    }));

    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        SetTitle(format!("watching {}", args.url))
    )?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.clear()?;

    let events = EventHandler::new(Duration::from_millis(100));
    let mut controller = Controller::new(state, backend, sink, events.sender());
    controller.start();

    let result = run_app(&mut terminal, &mut controller, events).await;

    controller.shutdown();

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, SetTitle(""))?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    controller: &mut Controller,
    mut events: EventHandler,
) -> Result<()> {
    let result = loop {
        if let Err(e) = terminal.draw(|f| tui::render::render(f, &controller.state)) {
            break Err(e.into());
        }

        match events.next().await {
            Some(event) => controller.handle_event(event),
            None => break Ok(()),
        }

        if controller.state.should_quit {
            break Ok(());
        }
    };
    events.stop();
    result
}
