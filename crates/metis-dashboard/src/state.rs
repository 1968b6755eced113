use crate::fetch::FetchResult;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use metis_core::board::Board;
use metis_core::history::{ChartTable, DEFAULT_CHART_METRICS};
use metis_core::lookup::Catalog;
use metis_core::sort::SortKey;
use metis_core::sync::{SnapshotSync, SyncConfig};
use ratatui::widgets::ListState;
use tracing::{debug, info};

pub struct App {
    pub sync: SnapshotSync,
    pub board: Board,
    pub list_state: ListState,
    pub source_label: String,
    pub show_help: bool,
    pub show_summary: bool,
    pub show_chart: bool,
    pub chart: Option<ChartTable>,
    pub status_note: Option<String>,
    refresh_requested: bool,
    last_title: Option<String>,
    quit: bool,
}

impl App {
    pub fn new(config: SyncConfig, catalog: Catalog, source_label: String) -> Self {
        Self {
            sync: SnapshotSync::new(config),
            board: Board::new(catalog),
            list_state: ListState::default(),
            source_label,
            show_help: false,
            show_summary: true,
            show_chart: false,
            chart: None,
            status_note: None,
            refresh_requested: false,
            last_title: None,
            quit: false,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Whether the user asked for an immediate re-fetch since the last call.
    pub fn take_refresh_request(&mut self) -> bool {
        std::mem::take(&mut self.refresh_requested)
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit = true;
            return;
        }
        if self.show_help {
            if matches!(
                key.code,
                KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')
            ) {
                self.show_help = false;
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit = true,
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::Char('g') | KeyCode::Home => self.select(0),
            KeyCode::Char('G') | KeyCode::End => {
                self.select(self.board.len().saturating_sub(1))
            }
            KeyCode::Enter => self.toggle_selected_details(),
            KeyCode::Char('e') => {
                let expanded = self.board.toggle_all_details();
                self.status_note = Some(if expanded {
                    "details expanded".to_string()
                } else {
                    "details collapsed".to_string()
                });
            }
            KeyCode::Char('s') => self.show_summary = !self.show_summary,
            KeyCode::Char('c') => self.toggle_chart(),
            KeyCode::Char('a') => self.sort(SortKey::Name),
            KeyCode::Char('p') => self.sort(SortKey::Completion),
            KeyCode::Char('r') => {
                self.refresh_requested = true;
                self.status_note = Some("refreshing".to_string());
            }
            _ => {}
        }
    }

    /// Results of superseded fetches are dropped; everything else goes
    /// through the sync, which keeps the last good snapshot on failure.
    pub fn on_fetch_result(&mut self, result: FetchResult) {
        if !self.sync.is_current(result.seq) {
            debug!(seq = result.seq, "discarding result of superseded fetch");
            return;
        }
        match result.body {
            Ok(body) => match self.sync.ingest_document(&body, &mut self.board) {
                Ok(outcome) => {
                    self.status_note = if outcome.parse.skipped.is_empty() {
                        None
                    } else {
                        Some(format!(
                            "{} task record(s) could not be read",
                            outcome.parse.skipped.len()
                        ))
                    };
                    if !outcome.render.collisions.is_empty() {
                        self.status_note = Some(format!(
                            "duplicate task ids: {}",
                            outcome
                                .render
                                .collisions
                                .iter()
                                .map(|id| id.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ));
                    }
                    if self.show_chart {
                        self.refresh_chart();
                    }
                }
                Err(err) => self.status_note = Some(err.to_string()),
            },
            Err(reason) => {
                self.sync.record_failure(reason.clone());
                self.status_note = Some(reason);
            }
        }
        self.clamp_selection();
    }

    /// New window title when it differs from the last one emitted.
    pub fn pending_title(&mut self) -> Option<String> {
        let title = self.board.title();
        if self.last_title.as_deref() == Some(title) {
            return None;
        }
        self.last_title = Some(title.to_string());
        self.last_title.clone()
    }

    pub fn selected(&self) -> Option<usize> {
        self.list_state.selected()
    }

    fn select(&mut self, index: usize) {
        if self.board.is_empty() {
            self.list_state.select(None);
        } else {
            self.list_state.select(Some(index.min(self.board.len() - 1)));
        }
    }

    fn move_selection(&mut self, delta: isize) {
        if self.board.is_empty() {
            self.list_state.select(None);
            return;
        }
        let current = self.list_state.selected().unwrap_or(0) as isize;
        let last = self.board.len() as isize - 1;
        self.list_state
            .select(Some((current + delta).clamp(0, last) as usize));
    }

    fn clamp_selection(&mut self) {
        match self.list_state.selected() {
            Some(index) => self.select(index),
            None if !self.board.is_empty() => self.list_state.select(Some(0)),
            None => {}
        }
    }

    fn toggle_selected_details(&mut self) {
        let Some(id) = self
            .list_state
            .selected()
            .and_then(|index| self.board.ids().get(index))
            .cloned()
        else {
            return;
        };
        self.board.toggle_details(&id);
    }

    fn toggle_chart(&mut self) {
        self.show_chart = !self.show_chart;
        if self.show_chart {
            self.refresh_chart();
        }
    }

    fn refresh_chart(&mut self) {
        let trend = self.sync.trend();
        self.chart = if trend.is_empty() {
            None
        } else {
            Some(trend.chart_table(&DEFAULT_CHART_METRICS))
        };
    }

    fn sort(&mut self, key: SortKey) {
        let selected = self
            .list_state
            .selected()
            .and_then(|index| self.board.ids().get(index))
            .cloned();
        if self.sync.sort(key, &mut self.board).is_none() {
            self.status_note = Some("nothing to sort yet".to_string());
            return;
        }
        info!(key = key.label(), "sorted tasks");
        self.status_note = Some(format!("sorted by {}", key.label()));
        if let Some(id) = selected {
            if let Some(index) = self.board.ids().iter().position(|other| *other == id) {
                self.list_state.select(Some(index));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metis_core::identity::TaskId;
    use serde_json::json;

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn doc() -> String {
        json!({
            "last_updated": 1_508_000_000,
            "tasks": [
                {"general": {"dataset": "/B/x/y", "tag": "v1", "njobs_done": 9, "njobs_total": 10},
                 "history": {"timestamps": [100, 200], "njobs_done": [1, 9], "njobs_total": [10, 10]}},
                {"general": {"dataset": "/A/x/y", "tag": "v1", "njobs_done": 1, "njobs_total": 10}}
            ]
        })
        .to_string()
    }

    fn loaded_app() -> App {
        let mut app = App::new(SyncConfig::default(), Catalog::default(), "test".to_string());
        let seq = app.sync.begin_fetch();
        app.on_fetch_result(FetchResult {
            seq,
            body: Ok(doc()),
        });
        app
    }

    #[test]
    fn first_result_selects_the_first_task() {
        let app = loaded_app();
        assert_eq!(app.board.len(), 2);
        assert_eq!(app.selected(), Some(0));
        assert!(app.sync.staleness().is_none());
    }

    #[test]
    fn superseded_results_are_ignored() {
        let mut app = App::new(SyncConfig::default(), Catalog::default(), "test".to_string());
        let old = app.sync.begin_fetch();
        let _current = app.sync.begin_fetch();
        app.on_fetch_result(FetchResult {
            seq: old,
            body: Ok(doc()),
        });
        assert!(app.board.is_empty());
    }

    #[test]
    fn failed_fetch_marks_stale_and_keeps_board() {
        let mut app = loaded_app();
        let seq = app.sync.begin_fetch();
        app.on_fetch_result(FetchResult {
            seq,
            body: Err("connection refused".to_string()),
        });
        assert_eq!(app.board.len(), 2);
        assert_eq!(
            app.sync.staleness().map(|stale| stale.reason.as_str()),
            Some("connection refused")
        );
    }

    #[test]
    fn navigation_stays_in_bounds() {
        let mut app = loaded_app();
        app.handle_key(key('k'));
        assert_eq!(app.selected(), Some(0));
        app.handle_key(key('j'));
        app.handle_key(key('j'));
        assert_eq!(app.selected(), Some(1));
    }

    #[test]
    fn enter_toggles_only_the_selected_task() {
        let mut app = loaded_app();
        app.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        let first = app.board.block_at(0).expect("first");
        let second = app.board.block_at(1).expect("second");
        assert!(first.details_expanded);
        assert!(!second.details_expanded);

        app.handle_key(key('e'));
        assert!(app.board.blocks().all(|block| block.details_expanded));
        app.handle_key(key('e'));
        assert!(app.board.blocks().all(|block| !block.details_expanded));
    }

    #[test]
    fn sorting_keeps_the_selected_task_selected() {
        let mut app = loaded_app();
        assert_eq!(app.board.ids()[0], TaskId::new("/B/x/y", "v1"));
        app.handle_key(key('a'));
        assert_eq!(app.board.ids()[0], TaskId::new("/A/x/y", "v1"));
        assert_eq!(app.selected(), Some(1));
        app.handle_key(key('p'));
        assert_eq!(app.board.ids()[0], TaskId::new("/A/x/y", "v1"));
    }

    #[test]
    fn opening_the_chart_aggregates_history() {
        let mut app = loaded_app();
        assert!(app.chart.is_none());
        app.handle_key(key('c'));
        let chart = app.chart.as_ref().expect("chart");
        assert_eq!(chart.rows.len(), 2);
        assert_eq!(chart.series(0), vec![(100.0, 1.0), (200.0, 9.0)]);
    }

    #[test]
    fn help_swallows_keys_until_closed() {
        let mut app = loaded_app();
        app.handle_key(key('?'));
        app.handle_key(key('j'));
        assert_eq!(app.selected(), Some(0));
        app.handle_key(key('q'));
        assert!(!app.show_help);
        assert!(!app.should_quit());
        app.handle_key(key('q'));
        assert!(app.should_quit());
    }

    #[test]
    fn refresh_request_is_taken_once() {
        let mut app = loaded_app();
        app.handle_key(key('r'));
        assert!(app.take_refresh_request());
        assert!(!app.take_refresh_request());
    }

    #[test]
    fn title_is_emitted_only_on_change() {
        let mut app = loaded_app();
        assert_eq!(app.pending_title().as_deref(), Some("Metis Dashboard [50]"));
        assert!(app.pending_title().is_none());
    }
}
