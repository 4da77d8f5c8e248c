use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use snafu::{Location, Snafu};

use crate::config::Config;
use crate::model::EventKind;
use crate::time::Timestamp;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

mod memory;
mod redis;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Shared handle to whichever backend is configured.
pub type Store = Arc<dyn EventStore>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// could not reach the stats backend
    Connect {
        source: ::redis::RedisError,
        #[snafu(implicit)]
        location: Location,
    },

    /// a backend command failed
    Command {
        source: ::redis::RedisError,
        #[snafu(implicit)]
        location: Location,
    },
}

/// The key-value contract the statistics are built on.
///
/// Four keys per namespace: an event list and an all-time counter for each
/// [`EventKind`]. List order is not significant; callers only filter by
/// recency and take maxima. Counter increments are atomic on the backend,
/// list appends from concurrent writers may interleave in any order.
#[async_trait]
pub trait EventStore: std::fmt::Debug + Send + Sync {
    /// Push a timestamp onto the kind's event list.
    async fn append_event(&self, kind: EventKind, timestamp: Timestamp) -> Result<()>;

    /// All currently stored entries of the kind's event list.
    async fn list_events(&self, kind: EventKind) -> Result<Vec<Timestamp>>;

    /// Atomically bump the kind's all-time counter, returning the new value.
    async fn increment_counter(&self, kind: EventKind) -> Result<i64>;

    /// The kind's all-time counter, 0 when absent.
    async fn get_counter(&self, kind: EventKind) -> Result<i64>;

    async fn set_counter(&self, kind: EventKind, value: i64) -> Result<()>;

    /// Swap the kind's event list for `entries` wholesale.
    async fn replace_list(&self, kind: EventKind, entries: &[Timestamp]) -> Result<()>;

    /// Reset the time-to-live on the kind's event list key.
    async fn expire(&self, kind: EventKind, ttl: Duration) -> Result<()>;
}

/// Connect the configured backend.
///
/// `None` is a recognized operating mode, not an error: with no redis url
/// in the environment the service runs with statistics disabled and every
/// read reports the backend as unconfigured.
pub async fn connect(config: &Config) -> Option<Store> {
    let Some(redis) = &config.redis else {
        tracing::info!("no redis url configured, running without a stats backend");
        return None;
    };

    match RedisStore::connect(redis, &config.stats.key_prefix).await {
        Ok(store) => Some(Arc::new(store)),
        Err(err) => {
            tracing::warn!("could not connect to the stats backend: {err}");
            None
        }
    }
}
