use crate::Task;

pub const NO_DATA: &str = "—";
pub const TITLE_PREFIX: &str = "Metis Dashboard";

/// Counters summed over every task of a snapshot. Sums saturate at the
/// `i64` bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Summary {
    pub nevents_total: i64,
    pub nevents_done: i64,
    pub njobs_total: i64,
    pub njobs_done: i64,
    pub pct_events: Option<f64>,
    pub pct_jobs: Option<f64>,
}

impl Summary {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut summary = Summary::default();
        for task in tasks {
            let general = &task.general;
            summary.nevents_total = summary.nevents_total.saturating_add(general.nevents_total);
            summary.nevents_done = summary.nevents_done.saturating_add(general.nevents_done);
            summary.njobs_total = summary.njobs_total.saturating_add(general.njobs_total);
            summary.njobs_done = summary.njobs_done.saturating_add(general.njobs_done);
        }
        summary.pct_events = completion(summary.nevents_done, summary.nevents_total);
        summary.pct_jobs = completion(summary.njobs_done, summary.njobs_total);
        summary
    }

    pub fn nevents_missing(&self) -> i64 {
        self.nevents_total.saturating_sub(self.nevents_done)
    }

    pub fn njobs_running(&self) -> i64 {
        self.njobs_total.saturating_sub(self.njobs_done)
    }

    /// Label/value rows in display order.
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Nevents (total)", format_count(self.nevents_total)),
            ("Nevents (done)", format_count(self.nevents_done)),
            ("Nevents (missing)", format_count(self.nevents_missing())),
            ("Njobs (total)", format_count(self.njobs_total)),
            ("Njobs (done)", format_count(self.njobs_done)),
            ("Njobs (running)", format_count(self.njobs_running())),
            ("Event completion", format_pct(self.pct_events)),
            ("Job completion", format_pct(self.pct_jobs)),
        ]
    }

    pub fn title(&self) -> String {
        match self.pct_jobs {
            Some(pct) => format!("{TITLE_PREFIX} [{}]", pct.round()),
            None => format!("{TITLE_PREFIX} [{NO_DATA}]"),
        }
    }
}

/// Percentage rounded to two decimals; undefined when nothing is expected.
fn completion(done: i64, total: i64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some((10000.0 * done as f64 / total as f64).round() / 100.0)
}

pub fn format_pct(pct: Option<f64>) -> String {
    match pct {
        Some(pct) => format!("{pct}%"),
        None => NO_DATA.to_string(),
    }
}

pub fn format_count(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
