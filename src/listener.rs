//! The fan-out contract between the poller and anything that wants to react
//! to a changed snapshot body.
//!
//! The poller hands listeners the raw, undecoded payload text — each
//! listener parses the `{"odds": "..."}` envelope and the record grammar
//! itself. This keeps the poller ignorant of the feed's shape; it only
//! ever deals in bytes and checksums.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error(transparent)]
    Decode(#[from] crate::decoder::DecodeError),
    #[error("invalid match id: {0}")]
    InvalidMatchId(String),
}

/// Notified with the exact response body text whenever the poller detects
/// that the upstream feed changed. A listener that fails causes the
/// poller to treat the whole cycle as a failure and engage backoff.
#[async_trait]
pub trait Listener: Send + Sync {
    async fn on_change(&self, url: &str, payload: &str) -> Result<(), ListenerError>;
}
