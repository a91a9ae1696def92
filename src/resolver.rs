//! Identifier resolver: opaque UUID -> human name, fetched on demand from
//! the mapping endpoint and cached for the life of the process.
//!
//! Concurrent misses single-flight onto one upstream fetch, so a burst of
//! callers missing on the same cold id converges onto one request instead
//! of each kicking off its own.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::model::MappingsPayload;

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),
    #[error("identifier not found: {0}")]
    NotFound(Uuid),
    #[error("invalid resolver response: {0}")]
    InvalidResponse(String),
    #[error("duplicate binding for identifier {0}")]
    DuplicateBinding(Uuid),
    #[error("invalid dictionary entry: {0}")]
    InvalidEntry(String),
    #[error("dictionary fetch returned no entries")]
    NoEntries,
    #[error("mapping fetch failed: {0}")]
    FetchFailed(String),
}

/// Capability exposed to the decoder so tests can substitute a fake.
#[async_trait]
pub trait IdResolver: Send + Sync {
    async fn get(&self, id: &str) -> Result<String, ResolverError>;
}

/// Cached, fetch-on-miss resolver backed by a single mapping endpoint.
pub struct Resolver {
    client: reqwest::Client,
    mapping_url: String,
    cache: RwLock<HashMap<Uuid, String>>,
    /// Generation of the last completed fetch, read and bumped independently
    /// of `fetch_gate` so a caller can snapshot "what I saw before I decided
    /// to fetch" without itself contending on the lock the in-flight fetch
    /// holds. Snapshotting via `fetch_gate` directly would give every caller
    /// queued behind an in-flight fetch the *post*-fetch generation the
    /// moment they acquired the lock, making them think no fetch had
    /// happened yet and defeating coalescing.
    generation: AtomicU64,
    /// Held for the duration of one upstream fetch; callers queue on it to
    /// avoid overlapping requests, not to read `generation`.
    fetch_gate: Mutex<()>,
}

impl Resolver {
    pub fn new(mapping_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            mapping_url: mapping_url.into(),
            cache: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            fetch_gate: Mutex::new(()),
        }
    }

    async fn fetch_mapping_payload(&self) -> Result<String, ResolverError> {
        let resp = self
            .client
            .get(&self.mapping_url)
            .send()
            .await
            .map_err(|e| ResolverError::FetchFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ResolverError::FetchFailed(format!(
                "unexpected status {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ResolverError::FetchFailed(e.to_string()))?;

        let parsed: MappingsPayload = serde_json::from_slice(&bytes)
            .map_err(|_| ResolverError::InvalidResponse("missing or malformed mappings field".to_owned()))?;

        if parsed.mappings.trim().is_empty() {
            return Err(ResolverError::InvalidResponse("empty mappings payload".to_owned()));
        }

        Ok(parsed.mappings)
    }

    async fn merge(&self, payload: &str) -> Result<(), ResolverError> {
        let entries = parse_mapping_entries(payload)?;
        let mut cache = self.cache.write().await;
        for (id, name) in entries {
            if cache.contains_key(&id) {
                return Err(ResolverError::DuplicateBinding(id));
            }
            cache.insert(id, name);
        }
        Ok(())
    }

    /// Refresh the cache at most once per caller, coalescing concurrent
    /// misses onto whichever fetch is already in flight.
    async fn refresh_once(&self, seen_generation: u64) -> Result<(), ResolverError> {
        let _gate = self.fetch_gate.lock().await;
        if self.generation.load(Ordering::Acquire) != seen_generation {
            // Someone else's fetch already landed while we waited for the gate.
            return Ok(());
        }
        let payload = self.fetch_mapping_payload().await?;
        self.merge(&payload).await?;
        self.generation.fetch_add(1, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl IdResolver for Resolver {
    async fn get(&self, id: &str) -> Result<String, ResolverError> {
        let uuid = Uuid::parse_str(id.trim()).map_err(|_| ResolverError::InvalidId(id.to_owned()))?;

        if let Some(name) = self.cache.read().await.get(&uuid).cloned() {
            return Ok(name);
        }

        let seen_generation = self.generation.load(Ordering::Acquire);
        self.refresh_once(seen_generation).await?;

        self.cache
            .read()
            .await
            .get(&uuid)
            .cloned()
            .ok_or(ResolverError::NotFound(uuid))
    }
}

/// Parse the `id:name;id:name` dictionary grammar into validated pairs.
///
/// Empty segments are skipped. An id repeated within the same payload is a
/// [`ResolverError::DuplicateBinding`] even when it is bound against the
/// same name both times — the invariant is strict, not value-aware.
fn parse_mapping_entries(payload: &str) -> Result<Vec<(Uuid, String)>, ResolverError> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for segment in payload.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let (id_part, name_part) = segment
            .split_once(':')
            .ok_or_else(|| ResolverError::InvalidEntry(segment.to_owned()))?;
        let id_part = id_part.trim();
        let name_part = name_part.trim();

        if id_part.is_empty() || name_part.is_empty() {
            return Err(ResolverError::InvalidEntry(segment.to_owned()));
        }

        let id = Uuid::parse_str(id_part).map_err(|_| ResolverError::InvalidId(id_part.to_owned()))?;

        if !seen.insert(id) {
            return Err(ResolverError::DuplicateBinding(id));
        }

        entries.push((id, name_part.to_owned()));
    }

    if entries.is_empty() {
        return Err(ResolverError::NoEntries);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn parses_valid_entries_and_skips_empty_segments() {
        let payload = ";9860e748-1f53-45ed-9a3f-2eeb46550083:FOOTBALL;;13605dbb-fb95-4373-8354-dbce8272086c:UEFA Champions League;";
        let entries = parse_mapping_entries(payload).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, "FOOTBALL");
    }

    #[test]
    fn rejects_empty_name() {
        let payload = "9860e748-1f53-45ed-9a3f-2eeb46550083: ";
        assert!(matches!(
            parse_mapping_entries(payload),
            Err(ResolverError::InvalidEntry(_))
        ));
    }

    #[test]
    fn rejects_non_uuid_id() {
        let payload = "not-a-uuid:FOOTBALL";
        assert!(matches!(
            parse_mapping_entries(payload),
            Err(ResolverError::InvalidId(_))
        ));
    }

    #[test]
    fn rejects_duplicate_within_same_fetch_even_with_identical_name() {
        let payload =
            "9860e748-1f53-45ed-9a3f-2eeb46550083:FOOTBALL;9860e748-1f53-45ed-9a3f-2eeb46550083:FOOTBALL";
        assert!(matches!(
            parse_mapping_entries(payload),
            Err(ResolverError::DuplicateBinding(_))
        ));
    }

    #[test]
    fn empty_payload_has_no_entries() {
        assert!(matches!(parse_mapping_entries(";;;"), Err(ResolverError::NoEntries)));
    }

    #[tokio::test]
    async fn cache_hit_avoids_a_second_fetch() {
        // A resolver whose mapping_url points nowhere would fail any fetch;
        // priming the cache directly proves `get` never attempts a refresh
        // for an id it already knows.
        let resolver = Resolver::new("http://127.0.0.1:1/unreachable");
        let id = Uuid::parse_str("9860e748-1f53-45ed-9a3f-2eeb46550083").unwrap();
        resolver
            .cache
            .write()
            .await
            .insert(id, "FOOTBALL".to_owned());

        let name = resolver.get(&id.to_string()).await.unwrap();
        assert_eq!(name, "FOOTBALL");
    }

    #[tokio::test]
    async fn invalid_id_syntax_is_rejected_before_any_fetch() {
        let resolver = Resolver::new("http://127.0.0.1:1/unreachable");
        let err = resolver.get("not-a-uuid").await.unwrap_err();
        assert!(matches!(err, ResolverError::InvalidId(_)));
    }

    /// Binds `/mappings` to a loopback address and spawns a real
    /// `axum::serve` task backing it, the same way the HTTP integration
    /// tests stand up a server to drive with a real client instead of
    /// faking the transport.
    async fn serve_mappings(
        handler: impl Fn(usize) -> String + Send + Sync + 'static,
    ) -> (String, Arc<AtomicUsize>) {
        let call_count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(handler);
        let app = {
            let call_count = call_count.clone();
            axum::Router::new().route(
                "/mappings",
                axum::routing::get(move || {
                    let call_count = call_count.clone();
                    let handler = handler.clone();
                    async move {
                        let n = call_count.fetch_add(1, Ordering::SeqCst);
                        let mappings = handler(n);
                        axum::Json(serde_json::json!({ "mappings": mappings }))
                    }
                }),
            )
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}/mappings"), call_count)
    }

    const FOOTBALL_ID: &str = "9860e748-1f53-45ed-9a3f-2eeb46550083";
    const TENNIS_ID: &str = "13605dbb-fb95-4373-8354-dbce8272086c";

    #[tokio::test]
    async fn concurrent_misses_single_flight_onto_one_upstream_fetch() {
        let (url, call_count) =
            serve_mappings(move |_| format!("{FOOTBALL_ID}:FOOTBALL;{TENNIS_ID}:TENNIS")).await;
        let resolver = Arc::new(Resolver::new(url));

        let (football, tennis) = tokio::join!(resolver.get(FOOTBALL_ID), resolver.get(TENNIS_ID));

        assert_eq!(football.unwrap(), "FOOTBALL");
        assert_eq!(tennis.unwrap(), "TENNIS");
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    // Two fetches bind the same id to two different names; the second
    // fetch, triggered by a lookup for an unrelated miss, must raise
    // `DuplicateBinding`.
    #[tokio::test]
    async fn a_later_fetch_rebinding_an_existing_id_is_a_duplicate_binding() {
        let (url, _call_count) = serve_mappings(|n| {
            if n == 0 {
                format!("{FOOTBALL_ID}:FOOTBALL")
            } else {
                format!("{FOOTBALL_ID}:RUGBY")
            }
        })
        .await;
        let resolver = Resolver::new(url);

        let first = resolver.get(FOOTBALL_ID).await.unwrap();
        assert_eq!(first, "FOOTBALL");

        let err = resolver.get(TENNIS_ID).await.unwrap_err();
        assert!(matches!(err, ResolverError::DuplicateBinding(id) if id == Uuid::parse_str(FOOTBALL_ID).unwrap()));
    }
}
