//! Owner of the last good snapshot. Every structural or value change to the
//! board goes through here so the held snapshot and the board never drift.

use crate::board::{ApplyReport, Board, RebuildPolicy, RenderReport};
use crate::history::{self, AggregatedHistory};
use crate::identity::{find_collisions, CollisionPolicy};
use crate::sort::{sort_tasks, SortKey};
use crate::{MetisError, ParseReport, Result, Snapshot};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncConfig {
    pub rebuild_policy: RebuildPolicy,
    pub collision_policy: CollisionPolicy,
    /// Applied to every incoming snapshot once a sort was requested.
    pub sort_key: Option<SortKey>,
}

/// Set while the board shows data older than the latest fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staleness {
    pub since: DateTime<Utc>,
    pub reason: String,
    pub failures: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub render: RenderReport,
    pub apply: ApplyReport,
    pub parse: ParseReport,
}

#[derive(Debug, Default)]
pub struct SnapshotSync {
    config: SyncConfig,
    held: Option<Snapshot>,
    staleness: Option<Staleness>,
    last_success: Option<DateTime<Utc>>,
    issued: u64,
}

impl SnapshotSync {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn held(&self) -> Option<&Snapshot> {
        self.held.as_ref()
    }

    pub fn staleness(&self) -> Option<&Staleness> {
        self.staleness.as_ref()
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    /// Sequence number for a new fetch. Results of any earlier fetch are
    /// stale from now on.
    pub fn begin_fetch(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn is_current(&self, seq: u64) -> bool {
        seq == self.issued
    }

    /// Parse and ingest a fetched document. Parse failures keep the held
    /// snapshot and mark the board stale.
    pub fn ingest_document(&mut self, content: &str, board: &mut Board) -> Result<SyncOutcome> {
        let (snapshot, parse) = match Snapshot::parse(content) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.record_failure(err.to_string());
                return Err(err);
            }
        };
        for skipped in &parse.skipped {
            warn!(index = skipped.index, reason = %skipped.reason, "skipping undecodable task");
        }
        let mut outcome = self.ingest(snapshot, board)?;
        outcome.parse = parse;
        Ok(outcome)
    }

    /// Structural pass (per policy), then the value pass, then replace the
    /// held snapshot wholesale.
    pub fn ingest(&mut self, mut snapshot: Snapshot, board: &mut Board) -> Result<SyncOutcome> {
        if self.config.collision_policy == CollisionPolicy::Reject {
            let collisions = find_collisions(&snapshot.tasks);
            if !collisions.is_empty() {
                let ids = collisions
                    .iter()
                    .map(|id| id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                let err = MetisError::IdCollision(ids);
                self.record_failure(err.to_string());
                return Err(err);
            }
        }

        if let Some(key) = self.config.sort_key {
            sort_tasks(&mut snapshot.tasks, key);
        }

        let render = board.reconcile(self.held.as_ref(), &snapshot, self.config.rebuild_policy);
        let apply = board.apply(&snapshot);
        if render.changed() {
            info!(
                tasks = snapshot.tasks.len(),
                added = render.added.len(),
                removed = render.removed.len(),
                "task set changed"
            );
        }

        self.held = Some(snapshot);
        self.staleness = None;
        self.last_success = Some(Utc::now());
        Ok(SyncOutcome {
            render,
            apply,
            parse: ParseReport::default(),
        })
    }

    pub fn record_failure(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "snapshot sync failed; keeping last good snapshot");
        match &mut self.staleness {
            Some(stale) => {
                stale.reason = reason;
                stale.failures += 1;
            }
            None => {
                self.staleness = Some(Staleness {
                    since: Utc::now(),
                    reason,
                    failures: 1,
                });
            }
        }
    }

    /// Reorder the held tasks and re-render from scratch. Returns `None`
    /// when nothing has been synced yet.
    pub fn sort(&mut self, key: SortKey, board: &mut Board) -> Option<RenderReport> {
        self.config.sort_key = Some(key);
        let snapshot = self.held.as_mut()?;
        sort_tasks(&mut snapshot.tasks, key);
        let report = board.rebuild(snapshot);
        board.apply(snapshot);
        Some(report)
    }

    /// Combined history of the held snapshot, recomputed on every call.
    pub fn trend(&self) -> AggregatedHistory {
        self.held
            .as_ref()
            .map(|snapshot| history::aggregate(&snapshot.tasks))
            .unwrap_or_default()
    }
}
