use std::fmt;
use std::str::FromStr;

use derive_new::new;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::time::Timestamp;

/// The two things this service counts.
///
/// Doubles as the action tag accepted by the write endpoint, so parsing a
/// request body tag and picking a storage key pair are the same decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Visit,
    Vote,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::Visit, EventKind::Vote];

    /// Key suffix of the event list, under the namespace prefix.
    pub fn list_key(self) -> &'static str {
        match self {
            EventKind::Visit => "visits",
            EventKind::Vote => "votes",
        }
    }

    /// Key suffix of the all-time counter, under the namespace prefix.
    pub fn counter_key(self) -> &'static str {
        match self {
            EventKind::Visit => "total_visits",
            EventKind::Vote => "total_votes",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Visit => f.write_str("visit"),
            EventKind::Vote => f.write_str("vote"),
        }
    }
}

#[derive(Debug, Snafu, PartialEq)]
#[snafu(display("unrecognized action '{action}', expected 'visit' or 'vote'"))]
pub struct UnknownAction {
    action: String,
}

impl FromStr for EventKind {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "visit" => Ok(EventKind::Visit),
            "vote" => Ok(EventKind::Vote),
            other => Err(UnknownAction {
                action: other.to_string(),
            }),
        }
    }
}

/// Point-in-time view of the stored statistics.
///
/// `visits` and `votes` count events within the last hour; the totals are
/// all-time and survive retention trimming of the event lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub visits: i64,
    pub votes: i64,
    pub total_visits: i64,
    pub total_votes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_vote_time: Option<Timestamp>,
}

/// The shape the presentation layer consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct HourlyStats {
    pub visits: i64,
    pub votes: i64,
    pub total_visits: i64,
    pub total_votes: i64,
}

impl From<StatsSnapshot> for HourlyStats {
    fn from(snapshot: StatsSnapshot) -> Self {
        Self {
            visits: snapshot.visits,
            votes: snapshot.votes,
            total_visits: snapshot.total_visits,
            total_votes: snapshot.total_votes,
        }
    }
}

/// Body of `GET /stats` responses.
#[derive(Debug, Clone, Serialize, Deserialize, new)]
pub struct StatsResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StatsSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of `POST /stats` requests.
#[derive(Debug, Clone, Serialize, Deserialize, new)]
pub struct RecordRequest {
    pub action: String,
}

/// Body of `POST /stats` responses.
#[derive(Debug, Clone, Serialize, Deserialize, new)]
pub struct RecordResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
