use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use snafu::ResultExt;
use url::Url;

use crate::cache::SlotCache;
use crate::error::{ApplicationError, ConfigLoadSnafu, HttpClientSnafu};
use crate::model::{EventKind, HourlyStats, RecordRequest, RecordResponse, StatsResponse};
use crate::time::{self, Timestamp};

pub use local::LocalStore;

mod local;

/// A slow stats service is the same as an absent one.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Stats endpoint of the service, e.g. `https://example.app/stats`.
    /// Absent means local-fallback-only mode.
    pub stats_url: Option<Url>,
    /// Overrides the platform data directory for the fallback store.
    pub local_stats_path: Option<PathBuf>,
    /// Suggested pause between two votes from the same visitor.
    #[serde(default = "default_min_wait_ms")]
    pub min_wait_ms: i64,
    /// Hourly vote count at which the abuse warning shows.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: i64,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ApplicationError> {
        envy::from_env().context(ConfigLoadSnafu)
    }
}

fn default_min_wait_ms() -> i64 {
    300_000
}

fn default_warning_threshold() -> i64 {
    5
}

/// Visitor-side entry point to the statistics.
///
/// One uniform interface regardless of backend availability: every call
/// prefers the stats service and silently degrades to the local store on
/// timeout or failure. Writes always land in the local store too - the two
/// storages are not reconciled, the local copy is simply authoritative in
/// deployments that have no backend.
#[derive(Debug)]
pub struct StatsClient {
    http: reqwest::Client,
    config: ClientConfig,
    local: LocalStore,
    cache: SlotCache<HourlyStats>,
}

impl StatsClient {
    pub fn new(config: ClientConfig) -> Result<Self, ApplicationError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context(HttpClientSnafu)?;

        let local = LocalStore::resolve(config.local_stats_path.clone());

        Ok(Self {
            http,
            config,
            local,
            cache: SlotCache::default(),
        })
    }

    /// Record a visit without blocking on the service: the remote write is a
    /// detached task whose failure is only logged.
    pub async fn record_visit(&self) {
        self.cache.invalidate().await;

        if let Err(err) = self.local.record(EventKind::Visit) {
            tracing::warn!("could not record visit locally: {err}");
        }

        let Some(url) = self.config.stats_url.clone() else {
            return;
        };

        let http = self.http.clone();
        tokio::spawn(async move {
            if let Err(err) = post_record(&http, url, EventKind::Visit).await {
                tracing::debug!("visit write to the stats service failed: {err}");
            }
        });
    }

    /// Record a vote and wait for the outcome - the redirect downstream
    /// depends on it. The local append happens regardless.
    pub async fn record_vote(&self) -> bool {
        self.cache.invalidate().await;

        if let Err(err) = self.local.record(EventKind::Vote) {
            tracing::warn!("could not record vote locally: {err}");
        }

        let Some(url) = self.config.stats_url.clone() else {
            // Local-only deployments: the local append is the vote.
            return true;
        };

        match post_record(&self.http, url, EventKind::Vote).await {
            Ok(response) => response.success,
            Err(err) => {
                tracing::warn!("vote write to the stats service failed: {err}");
                false
            }
        }
    }

    /// Counts for the last hour plus the all-time totals, service-first.
    pub async fn hourly_stats(&self) -> HourlyStats {
        if let Some(stats) = self.cache.get().await {
            return stats;
        }

        let stats = match self.fetch_remote().await {
            Some(stats) => stats,
            None => self.local.hourly_stats(),
        };

        self.cache.put(stats).await;
        stats
    }

    /// Whether the abuse warning should show.
    pub async fn should_show_warning(&self) -> bool {
        self.hourly_stats().await.votes >= self.config.warning_threshold
    }

    /// Whether this visitor voted more recently than the suggested pause.
    pub fn should_wait(&self) -> bool {
        match self.last_vote_time() {
            Some(last_vote) => {
                (time::now() - last_vote).num_milliseconds() < self.config.min_wait_ms
            }
            None => false,
        }
    }

    /// This visitor's most recent vote, from the local store - wait gating
    /// is per visitor, not per deployment.
    pub fn last_vote_time(&self) -> Option<Timestamp> {
        self.local.last_vote_time()
    }

    async fn fetch_remote(&self) -> Option<HourlyStats> {
        let url = self.config.stats_url.clone()?;

        let fetched = async {
            let response = self.http.get(url).send().await?;
            response.json::<StatsResponse>().await
        }
        .await;

        let response = match fetched {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!("stats service unreachable, falling back to local store: {err}");
                return None;
            }
        };

        if !response.success {
            // The service is up but its backend is not; the local store is
            // the better source then.
            return None;
        }

        response.data.map(HourlyStats::from)
    }
}

async fn post_record(
    http: &reqwest::Client,
    url: Url,
    kind: EventKind,
) -> reqwest::Result<RecordResponse> {
    let response = http
        .post(url)
        .json(&RecordRequest::new(kind.to_string()))
        .send()
        .await?;

    response.json().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_config(dir: &tempfile::TempDir, stats_url: Option<Url>) -> ClientConfig {
        ClientConfig {
            stats_url,
            local_stats_path: Some(dir.path().join("stats.json")),
            min_wait_ms: default_min_wait_ms(),
            warning_threshold: default_warning_threshold(),
        }
    }

    fn local_client(dir: &tempfile::TempDir) -> StatsClient {
        StatsClient::new(client_config(dir, None)).unwrap()
    }

    fn unreachable_client(dir: &tempfile::TempDir) -> StatsClient {
        let url = "http://127.0.0.1:9/stats".parse().unwrap();
        StatsClient::new(client_config(dir, Some(url))).unwrap()
    }

    fn plant_vote_at(dir: &tempfile::TempDir, timestamp: Timestamp) {
        std::fs::write(
            dir.path().join("stats.json"),
            format!(r#"{{"visits":[],"votes":[{timestamp}],"total_visits":0,"total_votes":1}}"#),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn visits_land_in_the_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let client = local_client(&dir);

        client.record_visit().await;

        let stats = client.hourly_stats().await;
        assert_eq!(stats.visits, 1);
        assert_eq!(stats.total_visits, 1);
    }

    #[tokio::test]
    async fn local_only_votes_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let client = local_client(&dir);

        assert!(
            client.record_vote().await,
            "without a service the local append is the vote"
        );
        assert_eq!(client.hourly_stats().await.votes, 1);
    }

    #[tokio::test]
    async fn warning_shows_at_the_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let client = local_client(&dir);

        for _ in 0..4 {
            client.record_vote().await;
        }
        assert!(
            !client.should_show_warning().await,
            "four votes stay under the default threshold"
        );

        client.record_vote().await;
        assert!(
            client.should_show_warning().await,
            "the write must also invalidate the cached read"
        );
    }

    #[tokio::test]
    async fn wait_gate_follows_the_last_vote() {
        let dir = tempfile::tempdir().unwrap();
        let client = local_client(&dir);
        assert!(!client.should_wait(), "no vote yet, nothing to wait for");

        client.record_vote().await;
        assert!(client.should_wait());

        plant_vote_at(
            &dir,
            time::now() - chrono::Duration::milliseconds(default_min_wait_ms() + 1),
        );
        assert!(!client.should_wait(), "the suggested pause has passed");
    }

    #[tokio::test]
    async fn unreachable_service_degrades_to_the_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let client = unreachable_client(&dir);

        client.record_visit().await;
        let stats = client.hourly_stats().await;

        assert_eq!(stats.visits, 1, "reads must degrade, not error");
        assert!(
            !client.record_vote().await,
            "a vote needs the service to acknowledge it"
        );
    }

    #[tokio::test]
    async fn last_vote_time_reads_the_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let client = local_client(&dir);
        let planted = time::now() - chrono::Duration::minutes(2);

        plant_vote_at(&dir, planted);

        assert_eq!(client.last_vote_time(), Some(planted));
    }
}
