use derive_new::new;
use futures::try_join;

use crate::model::{EventKind, StatsSnapshot};
use crate::store::{self, EventStore as _, Store};
use crate::time::{self, Timestamp};

/// Domain queries over the event store.
///
/// Counters and event lists are maintained by two independent writes with no
/// cross-operation atomicity; [`StatsRepository::repair_consistency`] is the
/// compensating pass for the drift that can leave behind. Every failure is
/// converted into a degraded value at this boundary - a backend outage is an
/// operating mode here, not an error.
#[derive(Debug, Clone, new)]
pub struct StatsRepository {
    store: Option<Store>,
}

impl StatsRepository {
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// A point-in-time view of the stored statistics, or `None` when no
    /// backend is configured or any fetch fails.
    ///
    /// Entries older than the retention window are treated as already absent
    /// for count purposes; physically deleting them is
    /// [`cleanup_expired`](Self::cleanup_expired)'s job.
    pub async fn snapshot(&self) -> Option<StatsSnapshot> {
        let store = self.store.as_ref()?;

        let fetched = try_join!(
            store.list_events(EventKind::Visit),
            store.list_events(EventKind::Vote),
            store.get_counter(EventKind::Visit),
            store.get_counter(EventKind::Vote),
        );

        let (visits, votes, total_visits, total_votes) = match fetched {
            Ok(parts) => parts,
            Err(err) => {
                tracing::warn!("could not fetch statistics: {err}");
                return None;
            }
        };

        let now = time::now();
        let visits = retained(visits, now);
        let votes = retained(votes, now);
        let last_vote_time = votes.iter().copied().max();

        Some(StatsSnapshot {
            visits: hourly_count(&visits, now),
            votes: hourly_count(&votes, now),
            total_visits,
            total_votes,
            last_vote_time,
        })
    }

    /// Record one event of `kind` at the current instant: append to the
    /// event list, refresh the list's time-to-live, bump the all-time
    /// counter. Returns `false` on any failure; never retries.
    pub async fn record(&self, kind: EventKind) -> bool {
        let Some(store) = self.store.as_ref() else {
            tracing::debug!(%kind, "stats backend disabled, dropping event");
            return false;
        };

        let timestamp = time::now();
        let written: store::Result<()> = async {
            store.append_event(kind, timestamp).await?;
            store.expire(kind, time::retention_window()).await?;
            store.increment_counter(kind).await?;
            store::Result::Ok(())
        }
        .await;

        match written {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%kind, "could not record event: {err}");
                false
            }
        }
    }

    /// Trim both event lists to the retention window.
    ///
    /// A list whose every entry has aged out is left untouched rather than
    /// cleared; the key's time-to-live, refreshed on every write, is what
    /// eventually removes it. Counters are never touched here.
    pub async fn cleanup_expired(&self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };

        for kind in EventKind::ALL {
            if let Err(err) = cleanup_list(store, kind).await {
                tracing::warn!(%kind, "could not clean up expired events: {err}");
            }
        }
    }

    /// Raise any counter that under-counts its event list.
    ///
    /// Heals the drift left when an append landed but the increment did not.
    /// One-directional: a counter is never lowered, so retention trimming
    /// cannot shrink the all-time totals. Reads-then-writes with no
    /// isolation, so this is an approximate corrective, not a guarantee.
    pub async fn repair_consistency(&self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };

        for kind in EventKind::ALL {
            if let Err(err) = repair_counter(store, kind).await {
                tracing::warn!(%kind, "could not repair counter: {err}");
            }
        }
    }
}

async fn cleanup_list(store: &Store, kind: EventKind) -> store::Result<()> {
    let events = store.list_events(kind).await?;
    let survivors = retained(events, time::now());

    if survivors.is_empty() {
        return Ok(());
    }

    store.replace_list(kind, &survivors).await?;
    store.expire(kind, time::retention_window()).await
}

async fn repair_counter(store: &Store, kind: EventKind) -> store::Result<()> {
    let actual = store.list_events(kind).await?.len() as i64;
    let stored = store.get_counter(kind).await?;

    if stored < actual {
        tracing::info!(%kind, stored, actual, "raising drifted counter to match the event list");
        store.set_counter(kind, actual).await?;
    }

    Ok(())
}

fn retained(events: Vec<Timestamp>, now: Timestamp) -> Vec<Timestamp> {
    events
        .into_iter()
        .filter(|timestamp| timestamp.is_within(time::retention_window(), now))
        .collect()
}

fn hourly_count(events: &[Timestamp], now: Timestamp) -> i64 {
    events
        .iter()
        .filter(|timestamp| timestamp.is_within(time::hourly_window(), now))
        .count() as i64
}
