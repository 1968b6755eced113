use crate::progress::Progress;
use crate::Task;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Completion,
    Name,
}

impl SortKey {
    pub fn label(self) -> &'static str {
        match self {
            SortKey::Completion => "completion",
            SortKey::Name => "name",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "completion" | "progress" | "pct" => Some(SortKey::Completion),
            "name" | "az" | "dataset" => Some(SortKey::Name),
            _ => None,
        }
    }
}

pub fn compare(a: &Task, b: &Task, key: SortKey) -> Ordering {
    match key {
        SortKey::Name => a.general.dataset.cmp(&b.general.dataset),
        SortKey::Completion => Progress::compute(&a.general)
            .percent
            .total_cmp(&Progress::compute(&b.general).percent),
    }
}

/// Stable: tasks with equal keys keep their relative order.
pub fn sort_tasks(tasks: &mut [Task], key: SortKey) {
    tasks.sort_by(|a, b| compare(a, b, key));
}
