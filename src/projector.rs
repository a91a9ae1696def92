//! Live-state projector: parses each changed payload, filters to matches
//! whose status is `PRE` or `LIVE`, and atomically swaps it in as the
//! current public view.

use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::decoder::Decoder;
use crate::listener::{Listener, ListenerError};
use crate::model::{MappedMatch, OddsPayload};

const VISIBLE_STATUSES: [&str; 2] = ["PRE", "LIVE"];

/// Holds the most recently projected view. Cheap to read concurrently with
/// the write that replaces it, since the swap is a single `mem::replace`
/// under the write lock rather than an in-place mutation — readers never
/// observe a partially-built mapping.
pub struct Projector {
    decoder: Decoder,
    view: RwLock<BTreeMap<Uuid, MappedMatch>>,
}

impl Projector {
    pub fn new(decoder: Decoder) -> Arc<Self> {
        Arc::new(Self {
            decoder,
            view: RwLock::new(BTreeMap::new()),
        })
    }

    /// The current PRE/LIVE view, keyed by match id — a defensive copy so
    /// callers cannot mutate the projector's state.
    pub async fn current(&self) -> BTreeMap<Uuid, MappedMatch> {
        self.view.read().await.clone()
    }
}

#[async_trait]
impl Listener for Projector {
    async fn on_change(&self, _url: &str, payload: &str) -> Result<(), ListenerError> {
        let parsed: OddsPayload = serde_json::from_str(payload)
            .map_err(|e| ListenerError::MalformedPayload(e.to_string()))?;

        let mut next = BTreeMap::new();
        for line in parsed.odds.lines().filter(|l| !l.trim().is_empty()) {
            let mapped = self.decoder.decode(line).await?;
            if VISIBLE_STATUSES.contains(&mapped.status.as_str()) {
                next.insert(mapped.id, mapped);
            }
        }

        // Built entirely off-lock; only the swap itself is synchronized, so
        // a failing decode above leaves the previous view untouched.
        let mut view = self.view.write().await;
        let _ = mem::replace(&mut *view, next);
        Ok(())
    }
}
