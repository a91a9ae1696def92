//! Change-detecting endpoint poller.
//!
//! Polls a configured URL on a fixed interval, skips any cycle whose body
//! checksum matches the previous cycle's, and fans the raw, undecoded body
//! out to every registered [`Listener`] when the feed actually changed. A
//! failing listener fails the whole cycle and engages backoff; consecutive
//! failures back off exponentially, capped at ten seconds, to keep a flaky
//! upstream from being hammered.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;

use crate::listener::{Listener, ListenerError};
use crate::time::now_ms;

const MAX_BACKOFF_MS: u64 = 10_000;
const BASE_BACKOFF_MS: u64 = 1_000;
const FETCH_TIMEOUT_MS: u64 = 5_000;

/// Sentinel returned by `time_since_last_success_ms` before the first
/// successful fetch — "effectively infinite".
const NEVER_SUCCEEDED: u64 = u64::MAX;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollerMode {
    Initializing,
    Polling,
    BackingOff,
    Error,
}

struct Inner {
    mode: PollerMode,
    last_checksum: Option<String>,
    consecutive_failures: u32,
    last_success_ms: Option<u64>,
}

/// Snapshot of the poller's internal state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollerState {
    pub mode: PollerMode,
    pub consecutive_failures: u32,
    pub current_backoff_ms: u64,
    pub last_checksum: Option<String>,
    pub time_since_last_success_ms: u64,
}

pub struct Poller {
    client: reqwest::Client,
    url: String,
    interval_ms: u64,
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
    inner: RwLock<Inner>,
    stop: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new(url: impl Into<String>, interval_ms: u64) -> Arc<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(FETCH_TIMEOUT_MS))
            .build()
            .expect("reqwest client configuration is valid");

        Arc::new(Self {
            client,
            url: url.into(),
            interval_ms,
            listeners: RwLock::new(Vec::new()),
            inner: RwLock::new(Inner {
                mode: PollerMode::Initializing,
                last_checksum: None,
                consecutive_failures: 0,
                last_success_ms: None,
            }),
            stop: Arc::new(Notify::new()),
            task: Mutex::new(None),
        })
    }

    pub async fn add_listener(&self, listener: Arc<dyn Listener>) {
        self.listeners.write().await.push(listener);
    }

    pub async fn remove_listener(&self, listener: &Arc<dyn Listener>) {
        let mut listeners = self.listeners.write().await;
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Start the poll loop on a background task. A no-op if already running.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }
        self.inner.write().await.mode = PollerMode::Polling;

        let poller = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            poller.run().await;
        }));
    }

    /// Signal the poll loop to stop, wait for it to exit, and reset to a
    /// fresh `INITIALIZING` state: a subsequent `start` begins with empty
    /// backoff and checksum, so the same bytes observed before `stop` will
    /// re-notify listeners after a restart.
    ///
    /// `notify_one` (not `notify_waiters`) is used because `run`'s `select!`
    /// spends most of a cycle inside `poll_once` — the fetch and the
    /// sequential listener calls — not parked on `notified()`. A plain
    /// `notify_waiters` call landing during that window wakes no one and
    /// stores nothing, so the loop would sail past its next `select!` with
    /// no memory that `stop` was ever called. `notify_one` stores a single
    /// permit when no task is currently waiting, so the loop's next
    /// `notified().await` — reached once the in-progress cycle finishes —
    /// resolves immediately instead of falling through to the interval
    /// sleep. The call is guarded behind `task.take()` so an idempotent
    /// `stop()` on an already-stopped poller never leaves a stray permit
    /// sitting on `self.stop` to prematurely end a future `start`.
    pub async fn stop(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            self.stop.notify_one();
            let _ = handle.await;
        }
        let mut inner = self.inner.write().await;
        inner.mode = PollerMode::Initializing;
        inner.last_checksum = None;
        inner.consecutive_failures = 0;
    }

    pub async fn state(&self) -> PollerState {
        let inner = self.inner.read().await;
        let time_since_last_success_ms = inner
            .last_success_ms
            .map_or(NEVER_SUCCEEDED, |t| now_ms().saturating_sub(t));

        PollerState {
            mode: inner.mode,
            consecutive_failures: inner.consecutive_failures,
            current_backoff_ms: backoff_for(inner.consecutive_failures),
            last_checksum: inner.last_checksum.clone(),
            time_since_last_success_ms,
        }
    }

    pub async fn time_since_last_success_ms(&self) -> u64 {
        self.inner
            .read()
            .await
            .last_success_ms
            .map_or(NEVER_SUCCEEDED, |t| now_ms().saturating_sub(t))
    }

    async fn run(self: Arc<Self>) {
        loop {
            let outcome = self.poll_once().await;

            let sleep_ms = match outcome {
                Ok(()) => {
                    let mut inner = self.inner.write().await;
                    inner.mode = PollerMode::Polling;
                    inner.consecutive_failures = 0;
                    inner.last_success_ms = Some(now_ms());
                    self.interval_ms
                }
                Err(err) => {
                    let failures = {
                        let mut inner = self.inner.write().await;
                        inner.mode = PollerMode::Error;
                        inner.consecutive_failures += 1;
                        inner.consecutive_failures
                    };
                    tracing::warn!(error = %err, consecutive_failures = failures, "poll cycle failed");
                    self.inner.write().await.mode = PollerMode::BackingOff;
                    backoff_for(failures)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {}
                _ = self.stop.notified() => break,
            }
        }
    }

    /// Fetch, checksum, and — if the body changed — fan the raw payload out
    /// to every listener. Returns `Ok(())` both when nothing changed and
    /// when listeners were notified successfully; only fetch or listener
    /// errors are `Err`.
    async fn poll_once(self: &Arc<Self>) -> Result<(), PollError> {
        let bytes = self.fetch_bytes().await?;
        let checksum = hex::encode(Sha256::digest(&bytes));

        {
            let inner = self.inner.read().await;
            if inner.last_checksum.as_deref() == Some(checksum.as_str()) {
                return Ok(());
            }
        }

        let body = String::from_utf8(bytes).map_err(|e| PollError::Fetch(e.to_string()))?;

        self.inner.write().await.last_checksum = Some(checksum);

        let listeners = self.listeners.read().await.clone();
        for listener in listeners {
            listener.on_change(&self.url, &body).await?;
        }

        Ok(())
    }

    async fn fetch_bytes(&self) -> Result<Vec<u8>, PollError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PollError::Fetch(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PollError::Fetch(format!("unexpected status {}", resp.status())));
        }

        let bytes = resp.bytes().await.map_err(|e| PollError::Fetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// `min(1000 * 2^k, 10000)` where `k` is the number of consecutive failures
/// observed so far.
fn backoff_for(consecutive_failures: u32) -> u64 {
    let shift = consecutive_failures.saturating_sub(1).min(63);
    BASE_BACKOFF_MS
        .saturating_mul(1u64 << shift)
        .min(MAX_BACKOFF_MS)
}
