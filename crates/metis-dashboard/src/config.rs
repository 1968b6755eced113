use crate::fetch::SnapshotSource;
use anyhow::{anyhow, Result};
use clap::Parser;
use metis_core::board::RebuildPolicy;
use metis_core::identity::CollisionPolicy;
use metis_core::lookup::{Catalog, DEFAULT_CATALOG_URL};
use metis_core::sort::SortKey;
use metis_core::sync::SyncConfig;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SOURCE: &str = "web_summary.json";
const DEFAULT_POLL_SECS: u64 = 60;

#[derive(Parser, Debug, Default)]
#[command(name = "metis-dashboard", about = "Live board for Metis task progress")]
pub struct Args {
    /// Snapshot location, an http(s) URL or a local path.
    #[arg(long, default_value = "")]
    pub source: String,
    /// Seconds between polls.
    #[arg(long, default_value_t = 0)]
    pub interval: u64,
    #[arg(long, default_value = "")]
    pub catalog_url: String,
    /// Initial sort: completion or name.
    #[arg(long, default_value = "")]
    pub sort: String,
    /// identity (diff task ids) or count (rebuild on task count change).
    #[arg(long, default_value = "identity")]
    pub rebuild_policy: String,
    /// Refuse snapshots in which two tasks share an identifier.
    #[arg(long, default_value_t = false)]
    pub strict: bool,
    #[arg(long, default_value = "")]
    pub log_file: String,
    /// Fetch once, print the summary and exit.
    #[arg(long, default_value_t = false)]
    pub once: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub source: SnapshotSource,
    pub poll_interval: Duration,
    pub catalog: Catalog,
    pub sync: SyncConfig,
    pub log_file: Option<PathBuf>,
    pub log_stdout: bool,
    pub once: bool,
}

impl Config {
    pub fn load(args: Args) -> Result<Self> {
        Self::resolve(args, |key| std::env::var(key).ok())
    }

    pub fn resolve(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let source = non_empty(args.source)
            .or_else(|| env("METIS_SNAPSHOT_SOURCE").and_then(non_empty))
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        let source = SnapshotSource::parse(&source)?;

        let poll_secs = if args.interval > 0 {
            args.interval
        } else {
            env("METIS_POLL_SECS")
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_POLL_SECS)
        };

        let catalog_url = non_empty(args.catalog_url)
            .or_else(|| env("METIS_CATALOG_URL").and_then(non_empty))
            .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string());
        let catalog = Catalog::parse(&catalog_url)?;

        let sort_key = match non_empty(args.sort) {
            Some(value) => Some(
                SortKey::parse(&value).ok_or_else(|| anyhow!("unknown sort key: {value}"))?,
            ),
            None => None,
        };
        let rebuild_policy = RebuildPolicy::parse(&args.rebuild_policy)
            .ok_or_else(|| anyhow!("unknown rebuild policy: {}", args.rebuild_policy))?;
        let collision_policy = if args.strict {
            CollisionPolicy::Reject
        } else {
            CollisionPolicy::LastWriteWins
        };

        let log_stdout = env("METIS_LOG_STDOUT")
            .and_then(|value| parse_bool_flag(&value))
            .unwrap_or(false);

        Ok(Config {
            source,
            poll_interval: Duration::from_secs(poll_secs),
            catalog,
            sync: SyncConfig {
                rebuild_policy,
                collision_policy,
                sort_key,
            },
            log_file: non_empty(args.log_file).map(PathBuf::from),
            log_stdout,
            once: args.once,
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args() -> Args {
        Args {
            rebuild_policy: "identity".to_string(),
            ..Args::default()
        }
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_args_or_env() {
        let config = Config::resolve(args(), env(&[])).expect("config");
        assert_eq!(
            config.source,
            SnapshotSource::File(PathBuf::from("web_summary.json"))
        );
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.sync.rebuild_policy, RebuildPolicy::IdentitySet);
        assert_eq!(config.sync.collision_policy, CollisionPolicy::LastWriteWins);
        assert_eq!(config.sync.sort_key, None);
        assert!(!config.log_stdout);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn env_fills_unset_args() {
        let config = Config::resolve(
            args(),
            env(&[
                ("METIS_SNAPSHOT_SOURCE", "https://example.org/web_summary.json"),
                ("METIS_POLL_SECS", "15"),
                ("METIS_LOG_STDOUT", "yes"),
            ]),
        )
        .expect("config");
        assert!(matches!(config.source, SnapshotSource::Http(_)));
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert!(config.log_stdout);
    }

    #[test]
    fn args_win_over_env() {
        let config = Config::resolve(
            Args {
                source: "/tmp/summary.json".to_string(),
                interval: 5,
                sort: "name".to_string(),
                rebuild_policy: "count".to_string(),
                strict: true,
                ..Args::default()
            },
            env(&[("METIS_SNAPSHOT_SOURCE", "elsewhere.json"), ("METIS_POLL_SECS", "90")]),
        )
        .expect("config");
        assert_eq!(
            config.source,
            SnapshotSource::File(PathBuf::from("/tmp/summary.json"))
        );
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.sync.sort_key, Some(SortKey::Name));
        assert_eq!(config.sync.rebuild_policy, RebuildPolicy::CountChange);
        assert_eq!(config.sync.collision_policy, CollisionPolicy::Reject);
    }

    #[test]
    fn rejects_unknown_choices() {
        let bad_sort = Args {
            sort: "size".to_string(),
            ..args()
        };
        assert!(Config::resolve(bad_sort, env(&[])).is_err());
        let bad_policy = Args {
            rebuild_policy: "deep".to_string(),
            ..Args::default()
        };
        assert!(Config::resolve(bad_policy, env(&[])).is_err());
        assert!(Config::resolve(args(), env(&[("METIS_CATALOG_URL", "nope")])).is_err());
    }

    #[test]
    fn zero_poll_interval_falls_back_to_default() {
        let config =
            Config::resolve(args(), env(&[("METIS_POLL_SECS", "0")])).expect("config");
        assert_eq!(config.poll_interval, Duration::from_secs(60));
    }
}
