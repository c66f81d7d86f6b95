mod config;
mod connection;
mod error;
mod fd_resolver;
mod hash_index;
mod keybindings;
mod netstat;
mod packet_source;
mod process;
mod scan;
mod stats;
mod tuple;
mod ui;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::time::interval;

use scan::{new_shared_pipeline, run_tick, DEFAULT_SOURCES};

#[derive(Parser, Debug)]
#[command(name = "netproc")]
#[command(version)]
#[command(about = "Per-process network activity monitor", long_about = None)]
struct Args {
    /// Tick interval in seconds
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Restrict packet capture to a single interface
    #[arg(long, value_name = "NAME")]
    interface: Option<String>,

    /// Skip reverse-DNS resolution for remote addresses (reserved for the UI layer)
    #[arg(long)]
    no_dns: bool,

    /// Override the pre-connection packet buffer bound
    #[arg(long, value_name = "N")]
    max_buffered_events: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if std::env::var("RUST_LOG").is_ok() {
        pretty_env_logger::formatted_builder()
            .parse_default_env()
            .init();
    }

    let mut saved = config::Config::load().unwrap_or_default();
    if let Some(interval_seconds) = args.interval {
        saved.interval_seconds = interval_seconds;
    }
    if args.interface.is_some() {
        saved.interface = args.interface.clone();
    }
    if let Some(cap) = args.max_buffered_events {
        saved.max_buffered_events = cap;
    }
    if args.no_dns {
        saved.resolve_dns = false;
    }

    let pipeline = new_shared_pipeline(saved.max_buffered_events);
    let shutdown = Arc::new(AtomicBool::new(false));

    let capture_handles = packet_source::spawn_capture_threads(
        pipeline.clone(),
        saved.interface.as_deref(),
        shutdown.clone(),
    );

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &pipeline, &shutdown, saved.interval_seconds, saved.sort_column).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    shutdown.store(true, Ordering::Relaxed);
    for handle in capture_handles {
        let _ = handle.join();
    }

    if let Err(err) = saved.save() {
        log::warn!("failed to persist configuration: {}", err);
    }

    result
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    pipeline: &scan::SharedPipeline,
    shutdown: &Arc<AtomicBool>,
    interval_seconds: u64,
    sort_column: config::SortColumn,
) -> Result<()> {
    let mut app = ui::AppState::new(sort_column);
    let mut tick = interval(Duration::from_secs(interval_seconds.max(1)));

    loop {
        terminal.draw(|frame| ui::render(frame, &mut app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c')
                {
                    return Ok(());
                }
                match key.code {
                    KeyCode::Char('q') => return Ok(()),
                    KeyCode::Up | KeyCode::Char('k') => app.select_previous(),
                    KeyCode::Down | KeyCode::Char('j') => app.select_next(),
                    KeyCode::Char('s') => app.cycle_sort(),
                    KeyCode::Char('?') => app.toggle_help(),
                    _ => {}
                }
            }
        }

        if shutdown.load(Ordering::Relaxed) {
            return Ok(());
        }

        if tokio::time::timeout(Duration::from_millis(1), tick.tick())
            .await
            .is_ok()
        {
            if let Some(snapshot) = run_tick(
                pipeline,
                interval_seconds.max(1) as f64,
                DEFAULT_SOURCES,
                shutdown,
            ) {
                app.apply_snapshot(snapshot);
            }
        }
    }
}
