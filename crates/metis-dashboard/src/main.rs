mod config;
mod fetch;
mod state;
mod theme;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Args, Config};
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
    },
};
use fetch::{FetchResult, Fetcher, Poller, SnapshotSource};
use futures_util::StreamExt;
use metis_core::board::Board;
use metis_core::sync::SnapshotSync;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{fs::OpenOptions, io, path::Path, sync::Mutex, time::Duration};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load(Args::parse())?;
    init_logging(&config)?;
    let fetcher = Fetcher::new(config.source.clone())?;

    if config.once {
        return run_once(&config, &fetcher).await;
    }

    info!(source = %config.source.label(), interval = ?config.poll_interval, "starting dashboard");
    let mut app = state::App::new(config.sync, config.catalog.clone(), config.source.label());
    let (fetch_tx, fetch_rx) = mpsc::channel(8);
    let mut poller = Poller::new(fetcher, fetch_tx);
    let (watch_tx, watch_rx) = mpsc::channel(1);
    let watcher = setup_watcher(&config.source, watch_tx);

    let mut terminal = setup_terminal()?;
    let result = run_app(
        &mut terminal,
        &mut app,
        &mut poller,
        fetch_rx,
        watch_rx,
        config.poll_interval,
    )
    .await;
    restore_terminal(&mut terminal)?;
    drop(watcher);

    if let Err(err) = &result {
        eprintln!("metis-dashboard: {err:#}");
    }
    result
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Some(path) = &config.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init();
    } else if config.once {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    } else if config.log_stdout {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
    Ok(())
}

async fn run_once(config: &Config, fetcher: &Fetcher) -> Result<()> {
    let body = fetcher.fetch().await?;
    let mut sync = SnapshotSync::new(config.sync);
    let mut board = Board::new(config.catalog.clone());
    let outcome = sync.ingest_document(&body, &mut board)?;
    if !outcome.parse.skipped.is_empty() {
        warn!(skipped = outcome.parse.skipped.len(), "some task records were skipped");
    }

    for line in summary_report(&board) {
        println!("{line}");
    }
    Ok(())
}

/// Plain-text summary: title, last-updated line, then one aligned row per
/// counter.
fn summary_report(board: &Board) -> Vec<String> {
    let mut lines = vec![board.title().to_string()];
    if let Some(updated) = board.last_updated() {
        lines.push(updated.to_string());
    }
    if let Some(summary) = board.summary() {
        lines.extend(
            summary
                .rows()
                .into_iter()
                .map(|(label, value)| format!("{label:<20}{value:>18}")),
        );
    }
    lines
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut state::App,
    poller: &mut Poller,
    mut fetch_rx: mpsc::Receiver<FetchResult>,
    mut watch_rx: mpsc::Receiver<()>,
    poll_interval: Duration,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        if let Some(title) = app.pending_title() {
            execute!(terminal.backend_mut(), SetTitle(title))?;
        }
        terminal.draw(|frame| ui::render(frame, app))?;

        tokio::select! {
            _ = ticker.tick() => {
                poller.request(&mut app.sync, false);
            }
            Some(result) = fetch_rx.recv() => {
                poller.complete(result.seq);
                app.on_fetch_result(result);
            }
            Some(()) = watch_rx.recv() => {
                poller.request(&mut app.sync, true);
            }
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key)))
                        if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) =>
                    {
                        app.handle_key(key);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err).context("failed to read terminal input"),
                    None => break,
                }
            }
        }

        if app.take_refresh_request() {
            poller.request(&mut app.sync, true);
        }
        if app.should_quit() {
            break;
        }
    }

    Ok(())
}

/// Watch the directory holding a local snapshot; producers usually replace
/// the file rather than rewrite it in place.
fn setup_watcher(source: &SnapshotSource, tx: mpsc::Sender<()>) -> Option<RecommendedWatcher> {
    let path = source.watch_path()?;
    let file_name = path.file_name()?.to_os_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else {
                return;
            };
            if event.kind.is_access() {
                return;
            }
            if event
                .paths
                .iter()
                .any(|changed| changed.file_name() == Some(file_name.as_os_str()))
            {
                let _ = tx.try_send(());
            }
        },
        notify::Config::default(),
    ) {
        Ok(watcher) => watcher,
        Err(err) => {
            warn!(error = %err, "file watcher unavailable; polling only");
            return None;
        }
    };

    if let Err(err) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
        warn!(error = %err, dir = %dir.display(), "failed to watch snapshot directory");
        return None;
    }
    Some(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_report_lists_title_and_aligned_rows() {
        let doc = json!({
            "last_updated": 0,
            "tasks": [
                {"general": {"dataset": "/A", "tag": "v1", "njobs_done": 10, "njobs_total": 20,
                             "nevents_done": 1500, "nevents_total": 4000}},
                {"general": {"dataset": "/B", "tag": "v1", "njobs_done": 30, "njobs_total": 30}}
            ]
        })
        .to_string();
        let mut sync = SnapshotSync::default();
        let mut board = Board::default();
        sync.ingest_document(&doc, &mut board).expect("sync");

        let lines = summary_report(&board);
        assert_eq!(lines.len(), 9);
        assert_eq!(lines[0], "Metis Dashboard [80]");
        assert_eq!(lines[1], format!("{:<20}{:>18}", "Nevents (total)", "4,000"));
        assert_eq!(lines[5], format!("{:<20}{:>18}", "Njobs (done)", "40"));
        assert_eq!(lines[8], format!("{:<20}{:>18}", "Job completion", "80%"));
        assert!(lines.iter().skip(1).all(|line| line.chars().count() == 38));
    }

    #[test]
    fn summary_report_before_any_snapshot_is_just_the_title() {
        assert_eq!(summary_report(&Board::default()), vec!["Metis Dashboard"]);
    }
}
