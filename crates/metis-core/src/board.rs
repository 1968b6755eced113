//! The rendered task board: one addressable block per task plus the summary
//! region. Structure is (re)built from a snapshot, values are then applied
//! in place.

use crate::highlight::{highlight_value, HighlightedLine};
use crate::identity::{find_collisions, TaskId};
use crate::lookup::{Catalog, LookupLinks};
use crate::progress::{rate_label, BarColor, Progress};
use crate::summary::{Summary, TITLE_PREFIX};
use crate::{Snapshot, Task};
use chrono::{Local, TimeZone};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

/// How the board decides that the task set changed structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebuildPolicy {
    /// Diff the previous and current identifier sets; add and drop blocks
    /// individually.
    #[default]
    IdentitySet,
    /// Rebuild everything when the task count differs, otherwise leave the
    /// structure alone even if the tasks themselves were swapped.
    CountChange,
}

impl RebuildPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "identity" | "identity-set" | "ids" => Some(RebuildPolicy::IdentitySet),
            "count" | "count-change" => Some(RebuildPolicy::CountChange),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressBar {
    pub width_pct: i64,
    pub color: Option<BarColor>,
    pub label: String,
    pub hover: String,
    pub rate: Option<String>,
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self {
            width_pct: 0,
            color: None,
            label: "0%".to_string(),
            hover: String::new(),
            rate: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Anomalies {
    pub retried_jobs: usize,
    pub missing_events: i64,
}

#[derive(Debug, Clone)]
pub struct TaskBlock {
    pub id: TaskId,
    pub type_badge: String,
    pub tag_badge: String,
    pub dataset: String,
    pub status: String,
    pub links: LookupLinks,
    pub bar: ProgressBar,
    pub anomalies: Anomalies,
    pub details: Vec<HighlightedLine>,
    pub details_expanded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Structure {
    /// Nothing structural happened.
    #[default]
    Unchanged,
    /// The container was cleared and every block emitted again.
    Rebuilt,
    /// Blocks were added, dropped or reordered individually.
    Patched,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub structure: Structure,
    pub added: Vec<TaskId>,
    pub removed: Vec<TaskId>,
    pub collisions: Vec<TaskId>,
}

impl RenderReport {
    pub fn changed(&self) -> bool {
        self.structure != Structure::Unchanged
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub updated: usize,
    pub missing: Vec<TaskId>,
}

#[derive(Debug)]
pub struct Board {
    catalog: Catalog,
    blocks: HashMap<TaskId, TaskBlock>,
    order: Vec<TaskId>,
    details_expanded: bool,
    summary: Option<Summary>,
    last_updated: Option<String>,
    title: String,
}

impl Default for Board {
    fn default() -> Self {
        Self::new(Catalog::default())
    }
}

impl Board {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            blocks: HashMap::new(),
            order: Vec::new(),
            details_expanded: false,
            summary: None,
            last_updated: None,
            title: TITLE_PREFIX.to_string(),
        }
    }

    /// Clear the board and emit a fresh block per task. Values start at 0%
    /// until [`Board::apply`] runs.
    pub fn rebuild(&mut self, snapshot: &Snapshot) -> RenderReport {
        let removed = self.order.drain(..).collect::<Vec<_>>();
        self.blocks.clear();

        let mut added = Vec::with_capacity(snapshot.tasks.len());
        for task in &snapshot.tasks {
            let block = self.emit_block(task);
            let id = block.id.clone();
            if self.blocks.insert(id.clone(), block).is_none() {
                self.order.push(id.clone());
                added.push(id);
            }
        }

        let collisions = find_collisions(&snapshot.tasks);
        for id in &collisions {
            warn!(task_id = %id, "duplicate task identity; keeping the last record");
        }
        debug!(blocks = self.order.len(), "board rebuilt");

        RenderReport {
            structure: Structure::Rebuilt,
            added,
            removed,
            collisions,
        }
    }

    /// Bring the board structure in line with `snapshot`, given the snapshot
    /// that produced the current structure.
    pub fn reconcile(
        &mut self,
        previous: Option<&Snapshot>,
        snapshot: &Snapshot,
        policy: RebuildPolicy,
    ) -> RenderReport {
        let Some(previous) = previous else {
            return self.rebuild(snapshot);
        };
        match policy {
            RebuildPolicy::CountChange => {
                if previous.tasks.len() != snapshot.tasks.len() {
                    self.rebuild(snapshot)
                } else {
                    RenderReport::default()
                }
            }
            RebuildPolicy::IdentitySet => self.patch(snapshot),
        }
    }

    fn patch(&mut self, snapshot: &Snapshot) -> RenderReport {
        let mut next_order = Vec::with_capacity(snapshot.tasks.len());
        let mut next_ids = HashSet::with_capacity(snapshot.tasks.len());
        let mut added = Vec::new();
        let mut fresh = HashMap::new();

        for task in &snapshot.tasks {
            let id = TaskId::for_task(task);
            if let Some(block) = self.blocks.get_mut(&id) {
                refresh_static(block, task, &self.catalog);
            } else {
                let block = self.emit_block(task);
                if fresh.insert(id.clone(), block).is_none() {
                    added.push(id.clone());
                }
            }
            if next_ids.insert(id.clone()) {
                next_order.push(id);
            }
        }

        let removed: Vec<TaskId> = self
            .order
            .iter()
            .filter(|id| !next_ids.contains(*id))
            .cloned()
            .collect();
        for id in &removed {
            self.blocks.remove(id);
        }
        self.blocks.extend(fresh);

        let reordered = next_order != self.order;
        self.order = next_order;

        let collisions = find_collisions(&snapshot.tasks);
        for id in &collisions {
            warn!(task_id = %id, "duplicate task identity; keeping the last record");
        }

        let structure = if added.is_empty() && removed.is_empty() && !reordered {
            Structure::Unchanged
        } else {
            debug!(
                added = added.len(),
                removed = removed.len(),
                "board patched"
            );
            Structure::Patched
        };
        RenderReport {
            structure,
            added,
            removed,
            collisions,
        }
    }

    fn emit_block(&self, task: &Task) -> TaskBlock {
        let mut block = TaskBlock {
            id: TaskId::for_task(task),
            type_badge: String::new(),
            tag_badge: String::new(),
            dataset: String::new(),
            status: String::new(),
            links: self.catalog.links(&task.general.dataset),
            bar: ProgressBar::default(),
            anomalies: Anomalies::default(),
            details: Vec::new(),
            details_expanded: self.details_expanded,
        };
        refresh_static(&mut block, task, &self.catalog);
        block
    }

    /// Push current values into existing blocks, then refresh the summary
    /// region and the title. Safe to call repeatedly with the same snapshot.
    pub fn apply(&mut self, snapshot: &Snapshot) -> ApplyReport {
        let mut report = ApplyReport::default();
        for task in &snapshot.tasks {
            let id = TaskId::for_task(task);
            let Some(block) = self.blocks.get_mut(&id) else {
                warn!(task_id = %id, "no rendered block for task; skipping update");
                report.missing.push(id);
                continue;
            };
            let progress = Progress::compute(&task.general);
            let whole = progress.whole_percent();
            block.bar = ProgressBar {
                width_pct: whole,
                color: Some(BarColor::for_percent(whole as f64)),
                label: progress.label(),
                hover: progress.hover_title(),
                rate: rate_label(task.general.event_rate),
            };
            block.anomalies = Anomalies {
                retried_jobs: task.retried_jobs(),
                missing_events: task.missing_events(),
            };
            report.updated += 1;
        }

        self.last_updated = last_updated_label(snapshot.last_updated, &Local);
        let summary = Summary::from_tasks(&snapshot.tasks);
        self.title = summary.title();
        self.summary = Some(summary);
        report
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> &[TaskId] {
        &self.order
    }

    pub fn block(&self, id: &TaskId) -> Option<&TaskBlock> {
        self.blocks.get(id)
    }

    pub fn block_at(&self, index: usize) -> Option<&TaskBlock> {
        self.order.get(index).and_then(|id| self.blocks.get(id))
    }

    /// Blocks in render order.
    pub fn blocks(&self) -> impl Iterator<Item = &TaskBlock> + '_ {
        self.order.iter().filter_map(|id| self.blocks.get(id))
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    pub fn last_updated(&self) -> Option<&str> {
        self.last_updated.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn toggle_details(&mut self, id: &TaskId) -> Option<bool> {
        let block = self.blocks.get_mut(id)?;
        block.details_expanded = !block.details_expanded;
        Some(block.details_expanded)
    }

    /// Flip the board-wide expand flag and force every block to match it.
    pub fn toggle_all_details(&mut self) -> bool {
        self.details_expanded = !self.details_expanded;
        for block in self.blocks.values_mut() {
            block.details_expanded = self.details_expanded;
        }
        self.details_expanded
    }
}

fn refresh_static(block: &mut TaskBlock, task: &Task, catalog: &Catalog) {
    let general = &task.general;
    block.type_badge = general.task_type.replacen("Task", "", 1);
    block.tag_badge = general.tag.clone();
    block.status = general.status.clone();
    if block.dataset != general.dataset {
        block.links = catalog.links(&general.dataset);
    }
    block.dataset = general.dataset.clone();
    block.details = highlight_value(&task.details_value());
}

pub fn last_updated_label<Tz: TimeZone>(epoch: f64, tz: &Tz) -> Option<String>
where
    Tz::Offset: fmt::Display,
{
    if !epoch.is_finite() || epoch <= 0.0 {
        return None;
    }
    let secs = epoch.trunc() as i64;
    let nanos = (epoch.fract() * 1e9) as u32;
    let when = tz.timestamp_opt(secs, nanos).single()?;
    Some(format!(
        "Last updated at {} on {}",
        when.format("%H:%M:%S"),
        when.format("%Y-%m-%d")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::TokenKind;
    use crate::General;
    use chrono::Utc;

    fn task(dataset: &str, tag: &str, done: i64, total: i64) -> Task {
        Task {
            general: General {
                task_type: "CMSSWTask".to_string(),
                dataset: dataset.to_string(),
                tag: tag.to_string(),
                njobs_done: done,
                njobs_total: total,
                ..General::default()
            },
            ..Task::default()
        }
    }

    fn snapshot(tasks: Vec<Task>) -> Snapshot {
        Snapshot {
            last_updated: 1_508_000_000.0,
            tasks,
        }
    }

    #[test]
    fn rebuild_emits_zeroed_blocks_in_order() {
        let snap = snapshot(vec![task("/B/x/y", "v1", 5, 10), task("/A/x/y", "v1", 1, 10)]);
        let mut board = Board::default();
        let report = board.rebuild(&snap);

        assert_eq!(report.structure, Structure::Rebuilt);
        assert_eq!(report.added.len(), 2);
        let first = board.block_at(0).expect("first block");
        assert_eq!(first.dataset, "/B/x/y");
        assert_eq!(first.type_badge, "CMSSW");
        assert_eq!(first.tag_badge, "v1");
        assert_eq!(first.bar, ProgressBar::default());
        assert!(first.links.display.contains("query=%2FB%2Fx%2Fy"));
        assert!(first
            .details
            .iter()
            .flatten()
            .any(|token| token.kind == TokenKind::Key && token.text == "\"dataset\":"));
    }

    #[test]
    fn details_exclude_history() {
        let mut with_history = task("/A", "v1", 0, 1);
        with_history.history = Some(crate::History {
            timestamps: vec![Some(1)],
            metrics: Default::default(),
        });
        let mut board = Board::default();
        board.rebuild(&snapshot(vec![with_history]));
        let block = board.block_at(0).expect("block");
        assert!(!block
            .details
            .iter()
            .flatten()
            .any(|token| token.text.contains("history")));
    }

    #[test]
    fn apply_sets_bar_values() {
        let mut rated = task("/A", "v1", 30, 120);
        rated.general.event_rate = Some(3500.0);
        let snap = snapshot(vec![rated, task("/B", "v1", 0, 0)]);
        let mut board = Board::default();
        board.rebuild(&snap);
        let report = board.apply(&snap);

        assert_eq!(report.updated, 2);
        let bar = &board.block_at(0).expect("block").bar;
        assert_eq!(bar.width_pct, 25);
        assert_eq!(bar.label, "25%");
        assert_eq!(bar.hover, "30/120");
        assert_eq!(bar.color.map(|c| c.hue), Some(34));
        assert_eq!(bar.rate.as_deref(), Some("3.5 kHz"));
        let empty = &board.block_at(1).expect("block").bar;
        assert_eq!(empty.label, "0%");
        assert_eq!(empty.rate, None);
        assert!(board.last_updated().is_some());
        assert_eq!(board.title(), "Metis Dashboard [25]");
    }

    #[test]
    fn apply_is_idempotent() {
        let snap = snapshot(vec![task("/A", "v1", 3, 7)]);
        let mut board = Board::default();
        board.rebuild(&snap);
        board.apply(&snap);
        let first = board.block_at(0).expect("block").bar.clone();
        let summary = board.summary().copied();
        board.apply(&snap);
        assert_eq!(board.block_at(0).expect("block").bar, first);
        assert_eq!(board.summary().copied(), summary);
    }

    #[test]
    fn apply_reports_tasks_without_blocks() {
        let mut board = Board::default();
        board.rebuild(&snapshot(vec![task("/A", "v1", 1, 2)]));
        let report = board.apply(&snapshot(vec![task("/A", "v1", 1, 2), task("/B", "v1", 1, 2)]));
        assert_eq!(report.updated, 1);
        assert_eq!(report.missing, vec![TaskId::new("/B", "v1")]);
    }

    #[test]
    fn count_policy_ignores_same_size_swaps() {
        let old = snapshot(vec![task("/A", "v1", 1, 2), task("/B", "v1", 1, 2)]);
        let new = snapshot(vec![task("/A", "v1", 1, 2), task("/C", "v1", 1, 2)]);
        let mut board = Board::default();
        board.rebuild(&old);

        let report = board.reconcile(Some(&old), &new, RebuildPolicy::CountChange);
        assert!(!report.changed());
        assert_eq!(board.ids()[1], TaskId::new("/B", "v1"));
        assert!(board.block(&TaskId::new("/C", "v1")).is_none());
    }

    #[test]
    fn count_policy_rebuilds_on_size_change() {
        let old = snapshot(vec![task("/A", "v1", 1, 2)]);
        let new = snapshot(vec![task("/A", "v1", 1, 2), task("/B", "v1", 1, 2)]);
        let mut board = Board::default();
        board.rebuild(&old);
        let report = board.reconcile(Some(&old), &new, RebuildPolicy::CountChange);
        assert_eq!(report.structure, Structure::Rebuilt);
        assert_eq!(board.len(), 2);
    }

    #[test]
    fn identity_policy_patches_added_and_removed_blocks() {
        let old = snapshot(vec![task("/A", "v1", 1, 2), task("/B", "v1", 1, 2)]);
        let new = snapshot(vec![task("/C", "v1", 1, 2), task("/A", "v1", 2, 2)]);
        let mut board = Board::default();
        board.rebuild(&old);
        let a = TaskId::new("/A", "v1");
        board.toggle_details(&a);

        let report = board.reconcile(Some(&old), &new, RebuildPolicy::IdentitySet);
        assert_eq!(report.structure, Structure::Patched);
        assert_eq!(report.added, vec![TaskId::new("/C", "v1")]);
        assert_eq!(report.removed, vec![TaskId::new("/B", "v1")]);
        assert_eq!(board.ids(), &[TaskId::new("/C", "v1"), a.clone()]);
        assert!(board.block(&a).expect("survivor").details_expanded);
    }

    #[test]
    fn identity_policy_leaves_unchanged_sets_alone() {
        let old = snapshot(vec![task("/A", "v1", 1, 2)]);
        let new = snapshot(vec![task("/A", "v1", 2, 2)]);
        let mut board = Board::default();
        board.rebuild(&old);
        let report = board.reconcile(Some(&old), &new, RebuildPolicy::IdentitySet);
        assert_eq!(report.structure, Structure::Unchanged);
    }

    #[test]
    fn first_reconcile_always_rebuilds() {
        let mut board = Board::default();
        let report = board.reconcile(
            None,
            &snapshot(vec![task("/A", "v1", 1, 2)]),
            RebuildPolicy::CountChange,
        );
        assert_eq!(report.structure, Structure::Rebuilt);
    }

    #[test]
    fn duplicate_identity_keeps_last_record() {
        let snap = snapshot(vec![
            task("/A", "v1", 1, 2),
            task("/B", "v1", 1, 2),
            task("/A", "v1", 9, 10),
        ]);
        let mut board = Board::default();
        let report = board.rebuild(&snap);
        board.apply(&snap);
        assert_eq!(report.collisions, vec![TaskId::new("/A", "v1")]);
        assert_eq!(board.len(), 2);
        assert_eq!(
            board.block(&TaskId::new("/A", "v1")).expect("block").bar.label,
            "90%"
        );
    }

    #[test]
    fn toggle_all_details_forces_every_block() {
        let snap = snapshot(vec![task("/A", "v1", 1, 2), task("/B", "v1", 1, 2)]);
        let mut board = Board::default();
        board.rebuild(&snap);
        board.toggle_details(&TaskId::new("/A", "v1"));
        assert!(board.toggle_all_details());
        assert!(board.blocks().all(|block| block.details_expanded));
        assert!(!board.toggle_all_details());
        assert!(board.blocks().all(|block| !block.details_expanded));
    }

    #[test]
    fn last_updated_label_formats_date_and_time() {
        assert_eq!(
            last_updated_label(1_508_000_000.0, &Utc).as_deref(),
            Some("Last updated at 16:53:20 on 2017-10-14")
        );
        assert_eq!(last_updated_label(0.0, &Utc), None);
    }
}
