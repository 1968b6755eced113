use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod board;
pub mod highlight;
pub mod history;
pub mod identity;
pub mod lookup;
pub mod progress;
pub mod sort;
pub mod summary;
pub mod sync;

#[derive(Debug, Error)]
pub enum MetisError {
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot shape violation: {0}")]
    Shape(String),
    #[error("task identifier collision: {0}")]
    IdCollision(String),
    #[error("invalid catalog url {url}: {reason}")]
    CatalogUrl { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, MetisError>;

/// One full `web_summary.json` document as written by the Metis stats parser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, deserialize_with = "deserialize_epoch")]
    pub last_updated: f64,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Task {
    #[serde(default, deserialize_with = "deserialize_general")]
    pub general: General,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub bad: Option<Bad>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub history: Option<History>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct General {
    #[serde(default, rename = "type", deserialize_with = "deserialize_text")]
    pub task_type: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub tag: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub dataset: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub status: String,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub njobs_done: i64,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub njobs_total: i64,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub nevents_done: i64,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub nevents_total: i64,
    #[serde(
        default,
        deserialize_with = "deserialize_rate",
        skip_serializing_if = "Option::is_none"
    )]
    pub event_rate: Option<f64>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Anomaly indicators attached by the producer. Only tolerated by the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bad {
    #[serde(default, deserialize_with = "deserialize_count")]
    pub missing_events: i64,
    #[serde(default, deserialize_with = "deserialize_bad_jobs")]
    pub jobs_not_done: BTreeMap<String, BadJob>,
    #[serde(default, deserialize_with = "deserialize_lenient_default")]
    pub plots: Vec<String>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BadJob {
    #[serde(default, deserialize_with = "deserialize_count")]
    pub retries: i64,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub inputs: i64,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub events: i64,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub last_error: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub last_log: String,
}

/// Per-task metric history. Every metric sequence is index-aligned with
/// `timestamps`; slots that were null or non-numeric are `None`, in either
/// sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct History {
    pub timestamps: Vec<Option<i64>>,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, Vec<Option<f64>>>,
}

impl<'de> Deserialize<'de> for History {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        let mut history = History::default();
        for (key, value) in raw {
            let Value::Array(items) = value else {
                continue;
            };
            if key == "timestamps" {
                history.timestamps = items.iter().map(value_as_timestamp).collect();
            } else {
                history
                    .metrics
                    .insert(key, items.iter().map(value_as_metric).collect());
            }
        }
        Ok(history)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTask {
    pub index: usize,
    pub reason: String,
}

/// Per-task problems found while decoding a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub skipped: Vec<SkippedTask>,
}

impl Snapshot {
    /// Decode a snapshot document. Only the root shape is enforced; a task
    /// that cannot be decoded is skipped and reported instead of failing the
    /// whole document.
    pub fn parse(content: &str) -> Result<(Snapshot, ParseReport)> {
        let raw: Value = serde_json::from_str(content)?;
        let Value::Object(mut root) = raw else {
            return Err(MetisError::Shape(
                "snapshot root must be a JSON object".to_string(),
            ));
        };
        let tasks = match root.remove("tasks") {
            Some(Value::Array(tasks)) => tasks,
            Some(_) => {
                return Err(MetisError::Shape("`tasks` must be an array".to_string()));
            }
            None => return Err(MetisError::Shape("missing `tasks` array".to_string())),
        };
        let last_updated = root.get("last_updated").map(value_as_epoch).unwrap_or(0.0);

        let mut report = ParseReport::default();
        let mut decoded = Vec::with_capacity(tasks.len());
        for (index, value) in tasks.into_iter().enumerate() {
            if !value.is_object() {
                report.skipped.push(SkippedTask {
                    index,
                    reason: "task record is not an object".to_string(),
                });
                continue;
            }
            match serde_json::from_value::<Task>(value) {
                Ok(task) => decoded.push(task),
                Err(err) => report.skipped.push(SkippedTask {
                    index,
                    reason: err.to_string(),
                }),
            }
        }

        Ok((
            Snapshot {
                last_updated,
                tasks: decoded,
            },
            report,
        ))
    }
}

impl Task {
    /// The record as shown in the details panel: everything but `history`.
    pub fn details_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.remove("history");
        }
        value
    }

    /// Jobs that needed at least one retry.
    pub fn retried_jobs(&self) -> usize {
        self.bad
            .as_ref()
            .map(|bad| bad.jobs_not_done.values().filter(|job| job.retries > 0).count())
            .unwrap_or(0)
    }

    pub fn missing_events(&self) -> i64 {
        self.bad.as_ref().map(|bad| bad.missing_events).unwrap_or(0)
    }
}

fn value_as_count(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
            .unwrap_or(0),
        _ => 0,
    }
}

/// Whole epoch seconds; anything unreadable or outside the `i64` range is a
/// gap rather than a point at the epoch.
fn value_as_timestamp(value: &Value) -> Option<i64> {
    let seconds = match value {
        Value::Number(n) => {
            if let Some(whole) = n.as_i64() {
                return Some(whole);
            }
            n.as_f64()?
        }
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (seconds.is_finite() && seconds >= i64::MIN as f64 && seconds < i64::MAX as f64)
        .then(|| seconds.trunc() as i64)
}

fn value_as_metric(value: &Value) -> Option<f64> {
    value.as_f64().filter(|f| f.is_finite())
}

fn value_as_epoch(value: &Value) -> f64 {
    match value {
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        other => other.as_f64().unwrap_or(0.0),
    }
}

fn deserialize_count<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    Ok(value_as_count(&val))
}

fn deserialize_epoch<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    Ok(value_as_epoch(&val))
}

/// Rates are only meaningful as finite numbers; the producer writes `-1`
/// when no rate was measured, which callers treat as absent via `> 0`.
fn deserialize_rate<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    Ok(value_as_metric(&val))
}

fn deserialize_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    Ok(match val {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn deserialize_general<'de, D>(deserializer: D) -> std::result::Result<General, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(val).unwrap_or_default())
}

fn deserialize_lenient_option<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let val = Value::deserialize(deserializer)?;
    if val.is_null() {
        return Ok(None);
    }
    Ok(serde_json::from_value(val).ok())
}

fn deserialize_lenient_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let val = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(val).unwrap_or_default())
}

fn deserialize_bad_jobs<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, BadJob>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    let Value::Object(entries) = val else {
        return Ok(BTreeMap::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|(key, job)| serde_json::from_value(job).ok().map(|job| (key, job)))
        .collect())
}
