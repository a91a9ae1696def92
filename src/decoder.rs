//! Record decoder: parses one feed line per the field/sub-field grammar and
//! denormalizes it into a [`MappedMatch`] via an [`IdResolver`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{Competitor, Competitors, MappedMatch, Score};
use crate::resolver::{IdResolver, ResolverError};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

/// A syntactically valid, not-yet-denormalized feed record.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawRecord {
    match_id: Uuid,
    sport_id: Uuid,
    competition_id: Uuid,
    start_time_ms: i64,
    home_id: Uuid,
    away_id: Uuid,
    status_id: Uuid,
    periods: Vec<(Uuid, i64, i64)>,
}

fn parse_uuid_field(raw: &str) -> Result<Uuid, DecodeError> {
    Uuid::parse_str(raw).map_err(|_| DecodeError::InvalidRecord(format!("invalid identifier: {raw}")))
}

/// Validate and split one feed line: field count, then the UUID fields,
/// then the start-time integer, then the period sub-grammar if present —
/// checked in that order, so the first violated rule determines the error.
fn parse_record(line: &str) -> Result<RawRecord, DecodeError> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 7 && fields.len() != 8 {
        return Err(DecodeError::InvalidRecord(format!(
            "expected 7 or 8 fields, got {}",
            fields.len()
        )));
    }

    let match_id = parse_uuid_field(fields[0])?;
    let sport_id = parse_uuid_field(fields[1])?;
    let competition_id = parse_uuid_field(fields[2])?;
    let home_id = parse_uuid_field(fields[4])?;
    let away_id = parse_uuid_field(fields[5])?;
    let status_id = parse_uuid_field(fields[6])?;

    let start_time_ms: i64 = fields[3]
        .parse()
        .map_err(|_| DecodeError::InvalidRecord(format!("invalid start time: {}", fields[3])))?;

    let mut periods = Vec::new();
    if fields.len() == 8 && !fields[7].is_empty() {
        for segment in fields[7].split('|') {
            let (period_str, scores_str) = segment
                .split_once('@')
                .ok_or_else(|| DecodeError::InvalidRecord(format!("invalid period segment: {segment}")))?;
            let period_id = parse_uuid_field(period_str)?;

            let (home_str, away_str) = scores_str
                .split_once(':')
                .ok_or_else(|| DecodeError::InvalidRecord(format!("invalid score segment: {scores_str}")))?;
            let home: i64 = home_str
                .parse()
                .map_err(|_| DecodeError::InvalidRecord(format!("invalid home score: {home_str}")))?;
            let away: i64 = away_str
                .parse()
                .map_err(|_| DecodeError::InvalidRecord(format!("invalid away score: {away_str}")))?;

            periods.push((period_id, home, away));
        }
    }

    Ok(RawRecord {
        match_id,
        sport_id,
        competition_id,
        start_time_ms,
        home_id,
        away_id,
        status_id,
        periods,
    })
}

/// Stateless apart from the resolver it denormalizes through.
#[derive(Clone)]
pub struct Decoder {
    resolver: Arc<dyn IdResolver>,
}

impl Decoder {
    pub fn new(resolver: Arc<dyn IdResolver>) -> Self {
        Self { resolver }
    }

    /// Parse and denormalize one feed line. Does not filter by status —
    /// whatever name the resolver returns for the status id is rendered
    /// verbatim; it is the projector's job to filter PRE/LIVE.
    pub async fn decode(&self, line: &str) -> Result<MappedMatch, DecodeError> {
        let raw = parse_record(line)?;

        let sport = self.resolver.get(&raw.sport_id.to_string()).await?;
        let competition = self.resolver.get(&raw.competition_id.to_string()).await?;
        let status = self.resolver.get(&raw.status_id.to_string()).await?;
        let home_name = self.resolver.get(&raw.home_id.to_string()).await?;
        let away_name = self.resolver.get(&raw.away_id.to_string()).await?;

        let mut scores = BTreeMap::new();
        for (period_id, home, away) in &raw.periods {
            let period_name = self.resolver.get(&period_id.to_string()).await?;
            scores.insert(
                period_name.clone(),
                Score {
                    kind: period_name,
                    home: *home,
                    away: *away,
                },
            );
        }

        let start_time: DateTime<Utc> = DateTime::from_timestamp_millis(raw.start_time_ms)
            .ok_or_else(|| DecodeError::InvalidRecord(format!("start time out of range: {}", raw.start_time_ms)))?;

        Ok(MappedMatch {
            id: raw.match_id,
            status,
            sport,
            competition,
            start_time,
            competitors: Competitors {
                home: Competitor {
                    kind: "HOME".to_owned(),
                    name: home_name,
                },
                away: Competitor {
                    kind: "AWAY".to_owned(),
                    name: away_name,
                },
            },
            scores,
        })
    }
}
