//! History store: a deduplicated, append-only log of every distinct raw
//! update seen for each match, keyed by match id.
//!
//! Three things happen beyond plain appending. First, a line byte-identical
//! to the most recently stored line for the same match is dropped — a
//! snapshot that repeats an unchanged record does not grow its history.
//! Second, a match last seen with status `LIVE` that vanishes from a later
//! snapshot entirely gets one synthetic entry appended with status
//! `REMOVED` and raw line `"(Generated)"`, so consumers of
//! `/matchhistory/{id}` can see that the match stopped being tracked. A
//! match that disappears while still `PRE` produces no such entry. Third,
//! a snapshot line whose match id fails to parse as a UUID aborts the rest
//! of that snapshot immediately — lines already applied earlier in the same
//! snapshot are not rolled back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::decoder::Decoder;
use crate::listener::{Listener, ListenerError};
use crate::model::{format_timestamp_ms, MappedMatch, OddsPayload};
use crate::time::now_ms;

const LIVE_STATUS: &str = "LIVE";
const REMOVED_STATUS: &str = "REMOVED";
const GENERATED_LINE: &str = "(Generated)";

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    #[serde(rename = "stateTimeStamp")]
    pub state_time_stamp: String,
    pub state: MappedMatch,
    #[serde(skip)]
    raw_line: String,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<Uuid, Vec<HistoryEntry>>,
}

pub struct HistoryStore {
    decoder: Decoder,
    inner: RwLock<Inner>,
}

impl HistoryStore {
    pub fn new(decoder: Decoder) -> Arc<Self> {
        Arc::new(Self {
            decoder,
            inner: RwLock::new(Inner::default()),
        })
    }

    /// The full ordered history for one match id; empty if unknown.
    pub async fn history(&self, id: Uuid) -> Vec<HistoryEntry> {
        self.inner
            .read()
            .await
            .entries
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// The most recent mapped match for one match id, if known.
    pub async fn current(&self, id: Uuid) -> Option<MappedMatch> {
        self.inner
            .read()
            .await
            .entries
            .get(&id)
            .and_then(|log| log.last())
            .map(|entry| entry.state.clone())
    }

    pub async fn all_ids(&self) -> Vec<Uuid> {
        self.inner.read().await.entries.keys().copied().collect()
    }

    pub async fn ids_with_status(&self, status: &str) -> Vec<Uuid> {
        self.inner
            .read()
            .await
            .entries
            .iter()
            .filter(|(_, log)| log.last().is_some_and(|e| e.state.status == status))
            .map(|(id, _)| *id)
            .collect()
    }

    pub async fn clear(&self) {
        self.inner.write().await.entries.clear();
    }

    fn append(inner: &mut Inner, id: Uuid, raw_line: String, state: MappedMatch, at_ms: u64) {
        let entry = HistoryEntry {
            state_time_stamp: format_timestamp_ms(at_ms),
            state,
            raw_line,
        };
        inner.entries.entry(id).or_default().push(entry);
    }
}

#[async_trait]
impl Listener for HistoryStore {
    async fn on_change(&self, _url: &str, payload: &str) -> Result<(), ListenerError> {
        let parsed: OddsPayload = serde_json::from_str(payload)
            .map_err(|e| ListenerError::MalformedPayload(e.to_string()))?;

        let at_ms = now_ms();
        let mut inner = self.inner.write().await;
        let mut seen_ids: HashSet<Uuid> = HashSet::new();

        for line in parsed.odds.lines().filter(|l| !l.trim().is_empty()) {
            let id_field = line
                .split(',')
                .next()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ListenerError::InvalidMatchId(line.to_owned()))?;
            let id = Uuid::parse_str(id_field).map_err(|_| ListenerError::InvalidMatchId(id_field.to_owned()))?;

            seen_ids.insert(id);

            let unchanged = inner
                .entries
                .get(&id)
                .and_then(|log| log.last())
                .is_some_and(|prev| prev.raw_line == line);
            if unchanged {
                continue;
            }

            let mapped = self.decoder.decode(line).await?;
            Self::append(&mut inner, id, line.to_owned(), mapped, at_ms);
        }

        let vanished_live: Vec<(Uuid, String)> = inner
            .entries
            .iter()
            .filter_map(|(id, log)| {
                let last = log.last()?;
                (last.state.status == LIVE_STATUS && !seen_ids.contains(id))
                    .then(|| (*id, last.raw_line.clone()))
            })
            .collect();

        for (id, raw_line) in vanished_live {
            let mut removed = self.decoder.decode(&raw_line).await?;
            removed.status = REMOVED_STATUS.to_owned();
            Self::append(&mut inner, id, GENERATED_LINE.to_owned(), removed, at_ms);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{IdResolver, ResolverError};
    use async_trait::async_trait as at;
    use std::collections::HashMap as Map;

    struct FakeResolver {
        names: Map<String, String>,
    }

    #[at]
    impl IdResolver for FakeResolver {
        async fn get(&self, id: &str) -> Result<String, ResolverError> {
            self.names
                .get(id)
                .cloned()
                .ok_or_else(|| ResolverError::NotFound(Uuid::parse_str(id).unwrap()))
        }
    }

    const SPORT: &str = "9860e748-1f53-45ed-9a3f-2eeb46550083";
    const COMPETITION: &str = "13605dbb-fb95-4373-8354-dbce8272086c";
    const HOME: &str = "c22ca89b-50db-4a90-84d3-25daf31de9db";
    const AWAY: &str = "54963ddf-ddc6-41b6-a7d1-3e2b76f531c0";
    const PRE: &str = "93f346fd-c921-4f67-b4c3-64fe1f466140";
    const LIVE: &str = "5c3a00b4-6dca-4439-8340-9eba10777517";

    fn line(match_id: &str, status_id: &str) -> String {
        format!("{match_id},{SPORT},{COMPETITION},1729839678453,{HOME},{AWAY},{status_id}")
    }

    fn store_with_names() -> Arc<HistoryStore> {
        let mut names = Map::new();
        names.insert(SPORT.to_owned(), "FOOTBALL".to_owned());
        names.insert(COMPETITION.to_owned(), "UEFA Champions League".to_owned());
        names.insert(HOME.to_owned(), "Bayern Munich".to_owned());
        names.insert(AWAY.to_owned(), "Juventus".to_owned());
        names.insert(PRE.to_owned(), "PRE".to_owned());
        names.insert(LIVE.to_owned(), "LIVE".to_owned());
        let decoder = Decoder::new(Arc::new(FakeResolver { names }));
        HistoryStore::new(decoder)
    }

    fn payload(lines: &[String]) -> String {
        format!(r#"{{"odds":"{}"}}"#, lines.join("\\n"))
    }

    // Delivering the same one-line snapshot twice in a row must not grow history.
    #[tokio::test]
    async fn identical_consecutive_lines_are_deduplicated() {
        let store = store_with_names();
        let id = "ec517b6c-6ed8-4449-ad9b-0a1dbbbf8fb9";
        let snapshot = payload(&[line(id, LIVE)]);

        store.on_change("u", &snapshot).await.unwrap();
        store.on_change("u", &snapshot).await.unwrap();

        let history = store.history(Uuid::parse_str(id).unwrap()).await;
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn a_changed_line_appends_a_new_entry() {
        let store = store_with_names();
        let id = "ec517b6c-6ed8-4449-ad9b-0a1dbbbf8fb9";
        store.on_change("u", &payload(&[line(id, LIVE)])).await.unwrap();
        let changed_line = format!(
            "{id},{SPORT},{COMPETITION},1729839679000,{HOME},{AWAY},{LIVE}"
        );
        store.on_change("u", &payload(&[changed_line])).await.unwrap();

        let history = store.history(Uuid::parse_str(id).unwrap()).await;
        assert_eq!(history.len(), 2);
    }

    // A LIVE match vanishing from the feed gets a synthetic REMOVED entry;
    // a PRE match vanishing does not.
    #[tokio::test]
    async fn a_live_match_disappearing_synthesizes_a_removed_entry() {
        let store = store_with_names();
        let live_id = "ec517b6c-6ed8-4449-ad9b-0a1dbbbf8fb9";
        let pre_id = "11111111-1111-1111-1111-111111111111";

        store
            .on_change("u", &payload(&[line(live_id, LIVE), line(pre_id, PRE)]))
            .await
            .unwrap();
        store.on_change("u", &payload(&[])).await.unwrap();

        let live_uuid = Uuid::parse_str(live_id).unwrap();
        let live_history = store.history(live_uuid).await;
        assert_eq!(live_history.len(), 2);
        assert_eq!(live_history[1].state.status, "REMOVED");
        assert_eq!(store.current(live_uuid).await.unwrap().status, "REMOVED");
        assert!(store.ids_with_status("REMOVED").await.contains(&live_uuid));

        let pre_history = store.history(Uuid::parse_str(pre_id).unwrap()).await;
        assert_eq!(pre_history.len(), 1);
        assert_eq!(pre_history[0].state.status, "PRE");
    }

    #[tokio::test]
    async fn removed_synthesis_happens_only_once() {
        let store = store_with_names();
        let id = "ec517b6c-6ed8-4449-ad9b-0a1dbbbf8fb9";
        store.on_change("u", &payload(&[line(id, LIVE)])).await.unwrap();
        store.on_change("u", &payload(&[])).await.unwrap();
        store.on_change("u", &payload(&[])).await.unwrap();

        let history = store.history(Uuid::parse_str(id).unwrap()).await;
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn a_bad_match_id_aborts_the_rest_of_the_snapshot_without_rollback() {
        let store = store_with_names();
        let good_id = "ec517b6c-6ed8-4449-ad9b-0a1dbbbf8fb9";
        let snapshot = format!(
            r#"{{"odds":"{}\nnot-a-uuid,{},{},1729839678453,{},{},{}"}}"#,
            line(good_id, LIVE),
            SPORT,
            COMPETITION,
            HOME,
            AWAY,
            LIVE
        );

        let err = store.on_change("u", &snapshot).await.unwrap_err();
        assert!(matches!(err, ListenerError::InvalidMatchId(_)));

        let history = store.history(Uuid::parse_str(good_id).unwrap()).await;
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn clear_removes_all_history() {
        let store = store_with_names();
        let id = "ec517b6c-6ed8-4449-ad9b-0a1dbbbf8fb9";
        store.on_change("u", &payload(&[line(id, LIVE)])).await.unwrap();
        store.clear().await;
        assert!(store.history(Uuid::parse_str(id).unwrap()).await.is_empty());

        store.on_change("u", &payload(&[])).await.unwrap();
        assert!(store.history(Uuid::parse_str(id).unwrap()).await.is_empty());
    }
}
