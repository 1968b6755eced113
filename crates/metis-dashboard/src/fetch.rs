//! Snapshot retrieval. One fetch at a time; results come back over a
//! channel tagged with the sequence number they were issued under.

use anyhow::{Context, Result};
use metis_core::sync::SnapshotSync;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSource {
    Http(Url),
    File(PathBuf),
}

impl SnapshotSource {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.starts_with("http://") || value.starts_with("https://") {
            let url = Url::parse(value).with_context(|| format!("invalid snapshot url {value}"))?;
            return Ok(SnapshotSource::Http(url));
        }
        let path = value.strip_prefix("file://").unwrap_or(value);
        Ok(SnapshotSource::File(PathBuf::from(path)))
    }

    /// Local sources can be watched for changes between polls.
    pub fn watch_path(&self) -> Option<&Path> {
        match self {
            SnapshotSource::File(path) => Some(path.as_path()),
            SnapshotSource::Http(_) => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            SnapshotSource::Http(url) => url.to_string(),
            SnapshotSource::File(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    source: SnapshotSource,
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(source: SnapshotSource) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(Self { source, client })
    }

    pub async fn fetch(&self) -> Result<String> {
        match &self.source {
            SnapshotSource::Http(url) => {
                let response = self
                    .client
                    .get(url.clone())
                    .header(reqwest::header::CACHE_CONTROL, "no-cache")
                    .send()
                    .await
                    .with_context(|| format!("request to {url} failed"))?
                    .error_for_status()?;
                Ok(response.text().await?)
            }
            SnapshotSource::File(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path.display())),
        }
    }
}

#[derive(Debug)]
pub struct FetchResult {
    pub seq: u64,
    pub body: Result<String, String>,
}

pub struct Poller {
    fetcher: Fetcher,
    tx: mpsc::Sender<FetchResult>,
    in_flight: Option<(u64, JoinHandle<()>)>,
}

impl Poller {
    pub fn new(fetcher: Fetcher, tx: mpsc::Sender<FetchResult>) -> Self {
        Self {
            fetcher,
            tx,
            in_flight: None,
        }
    }

    /// Start a fetch unless one is already running. `force` abandons the
    /// running fetch instead; its result, if it still arrives, is no longer
    /// current.
    pub fn request(&mut self, sync: &mut SnapshotSync, force: bool) -> Option<u64> {
        if let Some((seq, handle)) = &self.in_flight {
            if !force {
                debug!(seq, "fetch already in flight; skipping tick");
                return None;
            }
            handle.abort();
        }

        let seq = sync.begin_fetch();
        let fetcher = self.fetcher.clone();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let body = fetcher.fetch().await.map_err(|err| format!("{err:#}"));
            let _ = tx.send(FetchResult { seq, body }).await;
        });
        self.in_flight = Some((seq, handle));
        Some(seq)
    }

    pub fn complete(&mut self, seq: u64) {
        if matches!(self.in_flight, Some((current, _)) if current == seq) {
            self.in_flight = None;
        }
    }
}
