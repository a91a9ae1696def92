//! Wire-facing data shapes: the denormalized match view, its sub-records,
//! and the two upstream JSON envelopes.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// A denormalized match, ready to be rendered as JSON.
///
/// `status` is left as the raw name the resolver returned for the status
/// identifier — the decoder does not constrain it to a fixed set, per its
/// "renders whatever status the resolver returns" contract. Callers that
/// care about the well-known values compare against the literals
/// `"PRE"`, `"LIVE"`, `"REMOVED"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedMatch {
    pub id: Uuid,
    pub status: String,
    pub sport: String,
    pub competition: String,
    #[serde(
        rename = "startTime",
        serialize_with = "serialize_start_time",
        deserialize_with = "deserialize_start_time"
    )]
    pub start_time: DateTime<Utc>,
    pub competitors: Competitors,
    pub scores: BTreeMap<String, Score>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competitors {
    #[serde(rename = "HOME")]
    pub home: Competitor,
    #[serde(rename = "AWAY")]
    pub away: Competitor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    #[serde(rename = "type")]
    pub kind: String,
    pub home: i64,
    pub away: i64,
}

/// `GET {odds_url}` response shape: `{"odds": "<newline-delimited records>"}`.
#[derive(Debug, Clone, Deserialize)]
pub struct OddsPayload {
    pub odds: String,
}

/// `GET {mapping_url}` response shape: `{"mappings": "<id:name;id:name...>"}`.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingsPayload {
    pub mappings: String,
}

fn serialize_start_time<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn deserialize_start_time<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

/// Render an ISO-8601 (millisecond, `Z`-suffixed) timestamp from a wall-clock
/// millisecond value, for the history endpoints' `stateTimeStamp` field.
pub fn format_timestamp_ms(ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms as i64)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp_millis(0).expect("epoch is representable"))
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
