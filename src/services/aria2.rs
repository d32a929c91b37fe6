// src/services/aria2.rs

//! Download manager client (aria2 JSON-RPC).
//!
//! Files are never downloaded in-process. Every new file becomes an `addUri`
//! call carrying the target directory; aria2 does the transfer and is polled
//! with `tellStatus` until each download settles.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::models::{Aria2Config, Tree};
use crate::utils::http::create_rpc_client;

/// One file to fetch into `dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub dir: PathBuf,
}

/// Outcome of a batch of downloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub submitted: usize,
    pub completed: usize,
    pub retried: usize,
    /// URLs that never completed
    pub failed: Vec<String>,
}

/// Something that can fetch files into the mirror.
#[async_trait]
pub trait DownloadManager: Send + Sync {
    /// Verify the manager is reachable before any work is handed over.
    async fn check(&self) -> Result<()>;

    /// Fetch every job, waiting until each one completes or gives up.
    async fn fetch_all(&self, jobs: Vec<DownloadJob>) -> Result<DownloadReport>;
}

/// Flatten a diff tree into download jobs rooted at `root`.
pub fn download_jobs(tree: &Tree, root: &Path) -> Vec<DownloadJob> {
    tree.walk_files()
        .into_iter()
        .map(|(path, file)| DownloadJob {
            url: file.url.clone(),
            dir: path.iter().fold(root.to_path_buf(), |dir, segment| dir.join(segment)),
        })
        .collect()
}

/// Lifecycle state reported by `tellStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Active,
    Waiting,
    Paused,
    Complete,
    Error,
    Removed,
}

impl DownloadState {
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "active" => Some(Self::Active),
            "waiting" => Some(Self::Waiting),
            "paused" => Some(Self::Paused),
            "complete" => Some(Self::Complete),
            "error" => Some(Self::Error),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }

    pub fn is_failed(self) -> bool {
        matches!(self, Self::Error | Self::Removed)
    }
}

/// The calls a download run makes against the daemon.
#[async_trait]
trait DownloadRpc: Send + Sync {
    /// Queue one download; returns its GID.
    async fn add_uri(&self, job: &DownloadJob) -> Result<String>;

    async fn tell_status(&self, gid: &str) -> Result<DownloadState>;
}

struct Tracked {
    job: DownloadJob,
    gid: Option<String>,
    attempts: u32,
    status_errors: u32,
}

/// JSON-RPC client for an aria2 daemon.
pub struct Aria2Client {
    client: reqwest::Client,
    config: Aria2Config,
    endpoint: String,
    next_id: AtomicU64,
}

impl Aria2Client {
    pub fn new(config: &Aria2Config) -> Result<Self> {
        Ok(Self {
            client: create_rpc_client(30)?,
            endpoint: config.endpoint(),
            config: config.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = request_body(id, method, self.config.secret.as_str(), params);
        let response: Value = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::rpc(method, e))?
            .json()
            .await
            .map_err(|e| AppError::rpc(method, e))?;
        parse_response(method, response)
    }

    /// `aria2.getGlobalStat`, used as a liveness probe.
    pub async fn global_stat(&self) -> Result<Value> {
        self.call("aria2.getGlobalStat", Vec::new()).await
    }
}

#[async_trait]
impl DownloadRpc for Aria2Client {
    async fn add_uri(&self, job: &DownloadJob) -> Result<String> {
        let params = vec![
            json!([job.url]),
            json!({ "dir": job.dir.to_string_lossy(), "allow-overwrite": "true" }),
        ];
        let result = self.call("aria2.addUri", params).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::rpc("aria2.addUri", format!("unexpected result {result}")))
    }

    async fn tell_status(&self, gid: &str) -> Result<DownloadState> {
        let params = vec![json!(gid), json!(["gid", "status", "errorMessage"])];
        let result = self.call("aria2.tellStatus", params).await?;
        let status = result
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if let Some(message) = result.get("errorMessage").and_then(Value::as_str) {
            if !message.is_empty() {
                log::debug!("{}: {}", gid, message);
            }
        }
        DownloadState::parse(status)
            .ok_or_else(|| AppError::rpc("aria2.tellStatus", format!("unknown status '{status}'")))
    }
}

#[async_trait]
impl DownloadManager for Aria2Client {
    async fn check(&self) -> Result<()> {
        self.global_stat().await.map(|_| ())
    }

    async fn fetch_all(&self, jobs: Vec<DownloadJob>) -> Result<DownloadReport> {
        Ok(run_downloads(self, &self.config, jobs).await)
    }
}

/// Submit with bounded concurrency. A failed submission leaves `gid` unset.
async fn submit(rpc: &dyn DownloadRpc, concurrency: usize, batch: Vec<Tracked>) -> Vec<Tracked> {
    stream::iter(batch)
        .map(|mut tracked| async move {
            tracked.attempts += 1;
            tracked.status_errors = 0;
            tracked.gid = match rpc.add_uri(&tracked.job).await {
                Ok(gid) => Some(gid),
                Err(e) => {
                    log::warn!("submit {} failed: {}", tracked.job.url, e);
                    None
                }
            };
            tracked
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

/// Submit every job and poll until each completes or runs out of retries.
///
/// A job that ends as `error`/`removed`, or whose submission fails, is
/// resubmitted up to `max_retries` times. A job whose status cannot be read
/// more than `max_retries` times in a row is given up.
async fn run_downloads(
    rpc: &dyn DownloadRpc,
    config: &Aria2Config,
    jobs: Vec<DownloadJob>,
) -> DownloadReport {
    let total = jobs.len();
    let mut report = DownloadReport {
        submitted: total,
        ..DownloadReport::default()
    };
    let poll = Duration::from_millis(config.poll_interval_ms.max(1));

    let mut tracked: Vec<Tracked> = jobs
        .into_iter()
        .map(|job| Tracked {
            job,
            gid: None,
            attempts: 0,
            status_errors: 0,
        })
        .collect();

    while !tracked.is_empty() {
        let (unsubmitted, mut live): (Vec<_>, Vec<_>) =
            tracked.into_iter().partition(|t| t.gid.is_none());

        let mut batch = Vec::new();
        for t in unsubmitted {
            if t.attempts > config.max_retries {
                log::warn!("giving up on {} after {} attempt(s)", t.job.url, t.attempts);
                report.failed.push(t.job.url);
                continue;
            }
            if t.attempts > 0 {
                report.retried += 1;
            }
            batch.push(t);
        }
        live.extend(submit(rpc, config.max_concurrent_submits, batch).await);
        if live.is_empty() {
            break;
        }

        tokio::time::sleep(poll).await;

        let mut pending = Vec::with_capacity(live.len());
        for mut t in live {
            let Some(gid) = t.gid.clone() else {
                pending.push(t);
                continue;
            };
            match rpc.tell_status(&gid).await {
                Ok(DownloadState::Complete) => report.completed += 1,
                Ok(state) if state.is_failed() => {
                    log::warn!("{} ended as {:?}", t.job.url, state);
                    t.gid = None;
                    pending.push(t);
                }
                Ok(_) => pending.push(t),
                Err(e) => {
                    t.status_errors += 1;
                    log::debug!("status of {} unavailable: {}", t.job.url, e);
                    if t.status_errors > config.max_retries {
                        report.failed.push(t.job.url);
                    } else {
                        pending.push(t);
                    }
                }
            }
        }
        log::info!(
            "downloads: {}/{} complete, {} failed",
            report.completed,
            total,
            report.failed.len()
        );
        tracked = pending;
    }

    report
}

/// JSON-RPC 2.0 request; a non-empty secret goes first as `token:<secret>`.
fn request_body(id: u64, method: &str, secret: &str, params: Vec<Value>) -> Value {
    let mut all_params = Vec::with_capacity(params.len() + 1);
    if !secret.is_empty() {
        all_params.push(json!(format!("token:{secret}")));
    }
    all_params.extend(params);
    json!({
        "jsonrpc": "2.0",
        "id": id.to_string(),
        "method": method,
        "params": all_params,
    })
}

fn parse_response(method: &str, response: Value) -> Result<Value> {
    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(AppError::rpc(method, message));
    }
    response
        .get("result")
        .cloned()
        .ok_or_else(|| AppError::rpc(method, "response carries neither result nor error"))
}
