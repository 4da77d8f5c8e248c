use std::fs;
use std::path::PathBuf;

use derive_new::new;
use serde::{Deserialize, Serialize};
use snafu::{Location, ResultExt, Snafu};

use crate::model::{EventKind, HourlyStats};
use crate::time::{self, Timestamp};

pub type Result<T, E = LocalStoreError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LocalStoreError {
    /// could not write the stats file
    WriteStats {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not encode the stats file
    EncodeStats {
        source: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Single-user fallback store: one json file on the visitor's machine.
///
/// Authoritative only in deployments with no backend at all; when a backend
/// exists the two storages are never reconciled. A missing or corrupt file
/// reinitializes to empty rather than failing the caller.
#[derive(Debug, Clone, new)]
pub struct LocalStore {
    path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredStats {
    visits: Vec<Timestamp>,
    votes: Vec<Timestamp>,
    total_visits: i64,
    total_votes: i64,
}

impl LocalStore {
    /// An explicit path wins; otherwise the platform data directory, with a
    /// file in the working directory as the last resort.
    pub fn resolve(path: Option<PathBuf>) -> Self {
        let path = path.or_else(platform_path).unwrap_or_else(|| {
            tracing::warn!("no platform data directory, keeping stats in the working directory");
            PathBuf::from("usagi_stats.json")
        });

        Self::new(path)
    }

    pub fn record(&self, kind: EventKind) -> Result<()> {
        let mut stats = self.load();
        let now = time::now();

        match kind {
            EventKind::Visit => {
                stats.visits.push(now);
                stats.total_visits += 1;
            }
            EventKind::Vote => {
                stats.votes.push(now);
                stats.total_votes += 1;
            }
        }

        self.save(&stats)
    }

    pub fn hourly_stats(&self) -> HourlyStats {
        let stats = self.load();
        let now = time::now();

        HourlyStats {
            visits: hourly_count(&stats.visits, now),
            votes: hourly_count(&stats.votes, now),
            total_visits: stats.total_visits,
            total_votes: stats.total_votes,
        }
    }

    pub fn last_vote_time(&self) -> Option<Timestamp> {
        self.load().votes.into_iter().max()
    }

    fn load(&self) -> StoredStats {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return StoredStats::default(),
        };

        let mut stats: StoredStats = match serde_json::from_str(&raw) {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!("stats file is corrupt, starting over: {err}");
                StoredStats::default()
            }
        };

        let now = time::now();
        stats
            .visits
            .retain(|timestamp| timestamp.is_within(time::retention_window(), now));
        stats
            .votes
            .retain(|timestamp| timestamp.is_within(time::retention_window(), now));

        stats
    }

    fn save(&self, stats: &StoredStats) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context(WriteStatsSnafu {
                path: self.path.clone(),
            })?;
        }

        let encoded = serde_json::to_string(stats).context(EncodeStatsSnafu)?;
        fs::write(&self.path, encoded).context(WriteStatsSnafu {
            path: self.path.clone(),
        })
    }
}

fn platform_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "usagi")
        .map(|dirs| dirs.data_dir().join("stats.json"))
}

fn hourly_count(events: &[Timestamp], now: Timestamp) -> i64 {
    events
        .iter()
        .filter(|timestamp| timestamp.is_within(time::hourly_window(), now))
        .count() as i64
}
