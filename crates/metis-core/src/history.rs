//! Folds every task's metric history into one series keyed by timestamp.

use crate::Task;
use std::collections::BTreeMap;

pub const DEFAULT_CHART_METRICS: [&str; 2] = ["njobs_done", "njobs_total"];

/// timestamp -> metric -> sum over all tasks reporting that timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedHistory {
    pub points: BTreeMap<i64, BTreeMap<String, f64>>,
}

/// Header row plus one row per timestamp, columns in header order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartTable {
    pub headers: Vec<String>,
    pub rows: Vec<ChartRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartRow {
    pub timestamp: i64,
    pub values: Vec<Option<f64>>,
}

pub fn aggregate(tasks: &[Task]) -> AggregatedHistory {
    let mut points: BTreeMap<i64, BTreeMap<String, f64>> = BTreeMap::new();
    for task in tasks {
        let Some(history) = &task.history else {
            continue;
        };
        for (idx, ts) in history.timestamps.iter().enumerate() {
            let Some(ts) = ts else {
                continue;
            };
            for (metric, values) in &history.metrics {
                let Some(Some(value)) = values.get(idx) else {
                    continue;
                };
                *points
                    .entry(*ts)
                    .or_default()
                    .entry(metric.clone())
                    .or_insert(0.0) += value;
            }
        }
    }
    AggregatedHistory { points }
}

impl AggregatedHistory {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn chart_table(&self, metrics: &[&str]) -> ChartTable {
        let mut headers = Vec::with_capacity(metrics.len() + 1);
        headers.push("timestamp".to_string());
        headers.extend(metrics.iter().map(|metric| metric.to_string()));

        let rows = self
            .points
            .iter()
            .map(|(ts, values)| ChartRow {
                timestamp: *ts,
                values: metrics
                    .iter()
                    .map(|metric| values.get(*metric).copied())
                    .collect(),
            })
            .collect();
        ChartTable { headers, rows }
    }
}

impl ChartTable {
    /// `(timestamp, value)` pairs for one metric column, skipping gaps.
    pub fn series(&self, column: usize) -> Vec<(f64, f64)> {
        self.rows
            .iter()
            .filter_map(|row| {
                row.values
                    .get(column)
                    .copied()
                    .flatten()
                    .map(|value| (row.timestamp as f64, value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::History;

    fn task_with_history(timestamps: Vec<i64>, done: Vec<Option<f64>>) -> Task {
        let mut metrics = BTreeMap::new();
        metrics.insert("njobs_done".to_string(), done);
        Task {
            history: Some(History {
                timestamps: timestamps.into_iter().map(Some).collect(),
                metrics,
            }),
            ..Task::default()
        }
    }

    fn expected(points: &[(i64, f64)]) -> BTreeMap<i64, BTreeMap<String, f64>> {
        points
            .iter()
            .map(|(ts, value)| {
                let mut metrics = BTreeMap::new();
                metrics.insert("njobs_done".to_string(), *value);
                (*ts, metrics)
            })
            .collect()
    }

    #[test]
    fn overlapping_timestamps_are_summed() {
        let tasks = vec![
            task_with_history(vec![100, 200], vec![Some(5.0), Some(10.0)]),
            task_with_history(vec![200, 300], vec![Some(7.0), Some(9.0)]),
        ];
        let history = aggregate(&tasks);
        assert_eq!(
            history.points,
            expected(&[(100, 5.0), (200, 17.0), (300, 9.0)])
        );
    }

    #[test]
    fn task_order_does_not_matter() {
        let a = task_with_history(vec![100, 200], vec![Some(5.0), Some(10.0)]);
        let b = task_with_history(vec![200, 300], vec![Some(7.0), Some(9.0)]);
        let c = task_with_history(vec![300], vec![Some(1.0)]);
        let forward = aggregate(&[a.clone(), b.clone(), c.clone()]);
        let backward = aggregate(&[c.clone(), a.clone(), b.clone()]);
        let shuffled = aggregate(&[b, c, a]);
        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn gaps_and_missing_history_are_skipped() {
        let tasks = vec![
            Task::default(),
            task_with_history(Vec::new(), Vec::new()),
            task_with_history(vec![100, 200, 300], vec![Some(1.0), None]),
        ];
        let history = aggregate(&tasks);
        assert_eq!(history.points, expected(&[(100, 1.0)]));
    }

    #[test]
    fn unreadable_timestamps_are_gaps_not_epoch_points() {
        let mut broken = task_with_history(vec![1_508_000_000, 0], vec![Some(2.0), Some(10.0)]);
        if let Some(history) = broken.history.as_mut() {
            history.timestamps[1] = None;
        }
        let healthy = task_with_history(vec![1_508_000_000], vec![Some(10.0)]);
        let history = aggregate(&[broken, healthy]);
        assert_eq!(history.points, expected(&[(1_508_000_000, 12.0)]));
    }

    #[test]
    fn chart_table_is_time_ordered_with_headers() {
        let mut first = task_with_history(vec![300, 100], vec![Some(2.0), Some(1.0)]);
        if let Some(history) = first.history.as_mut() {
            history
                .metrics
                .insert("njobs_total".to_string(), vec![Some(4.0), Some(4.0)]);
        }
        let second = task_with_history(vec![200], vec![Some(3.0)]);
        let table = aggregate(&[first, second]).chart_table(&DEFAULT_CHART_METRICS);

        assert_eq!(table.headers, vec!["timestamp", "njobs_done", "njobs_total"]);
        let timestamps: Vec<i64> = table.rows.iter().map(|row| row.timestamp).collect();
        assert_eq!(timestamps, vec![100, 200, 300]);
        assert_eq!(table.rows[1].values, vec![Some(3.0), None]);
        assert_eq!(table.series(1), vec![(100.0, 4.0), (300.0, 4.0)]);
    }
}
