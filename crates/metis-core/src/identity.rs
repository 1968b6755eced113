use crate::Task;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Stable board identifier derived from a task's `(dataset, tag)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(dataset: &str, tag: &str) -> Self {
        let dataset = dataset.replace('/', "_");
        let tag = tag.replace(' ', "_").replace('.', "p");
        Self(format!("{dataset}_{tag}"))
    }

    pub fn for_task(task: &Task) -> Self {
        Self::new(&task.general.dataset, &task.general.tag)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What to do when two tasks in one snapshot escape to the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Keep the later task's block and report the collision.
    #[default]
    LastWriteWins,
    /// Refuse the snapshot.
    Reject,
}

/// Ids that occur more than once, in order of their second occurrence.
pub fn find_collisions(tasks: &[Task]) -> Vec<TaskId> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut collisions = Vec::new();
    for task in tasks {
        let id = TaskId::for_task(task);
        if !seen.insert(id.clone()) && reported.insert(id.clone()) {
            collisions.push(id);
        }
    }
    collisions
}
