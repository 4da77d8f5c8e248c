use std::fmt;
use std::time::Duration as ConnectTimeout;

use async_trait::async_trait;
use chrono::Duration;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client};
use snafu::ResultExt;

use super::{CommandSnafu, ConnectSnafu, EventStore, Result};
use crate::config::RedisConfig;
use crate::model::EventKind;
use crate::time::Timestamp;

/// Redis-backed event store.
///
/// Lists are `LPUSH`ed and read whole with `LRANGE 0 -1`; counters live in
/// plain integer keys driven by `INCR`. Every key sits under the deployment's
/// namespace prefix so several deployments can share one database.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    pub async fn connect(config: &RedisConfig, prefix: &str) -> Result<Self> {
        let manager_config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(ConnectTimeout::from_millis(500));

        let client = Client::open(config.url.as_str()).context(ConnectSnafu)?;
        let connection = client
            .get_connection_manager_with_config(manager_config)
            .await
            .context(ConnectSnafu)?;

        Ok(Self {
            connection,
            prefix: prefix.to_string(),
        })
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventStore for RedisStore {
    async fn append_event(&self, kind: EventKind, timestamp: Timestamp) -> Result<()> {
        let mut connection = self.connection.clone();
        connection
            .lpush::<_, _, ()>(self.key(kind.list_key()), timestamp.millis())
            .await
            .context(CommandSnafu)
    }

    async fn list_events(&self, kind: EventKind) -> Result<Vec<Timestamp>> {
        let mut connection = self.connection.clone();
        let entries: Vec<String> = connection
            .lrange(self.key(kind.list_key()), 0, -1)
            .await
            .context(CommandSnafu)?;

        let timestamps = entries
            .into_iter()
            .filter_map(|entry| match entry.parse() {
                Ok(timestamp) => Some(timestamp),
                Err(_) => {
                    tracing::warn!(%kind, %entry, "skipping list entry that is not a timestamp");
                    None
                }
            })
            .collect();

        Ok(timestamps)
    }

    async fn increment_counter(&self, kind: EventKind) -> Result<i64> {
        let mut connection = self.connection.clone();
        connection
            .incr(self.key(kind.counter_key()), 1i64)
            .await
            .context(CommandSnafu)
    }

    async fn get_counter(&self, kind: EventKind) -> Result<i64> {
        let mut connection = self.connection.clone();
        let value: Option<i64> = connection
            .get(self.key(kind.counter_key()))
            .await
            .context(CommandSnafu)?;

        Ok(value.unwrap_or(0))
    }

    async fn set_counter(&self, kind: EventKind, value: i64) -> Result<()> {
        let mut connection = self.connection.clone();
        connection
            .set::<_, _, ()>(self.key(kind.counter_key()), value)
            .await
            .context(CommandSnafu)
    }

    async fn replace_list(&self, kind: EventKind, entries: &[Timestamp]) -> Result<()> {
        let key = self.key(kind.list_key());
        let millis: Vec<i64> = entries.iter().map(|entry| entry.millis()).collect();

        // MULTI/EXEC so concurrent readers never observe the list half-written.
        let mut pipe = redis::pipe();
        pipe.atomic().del(&key);
        if !millis.is_empty() {
            pipe.lpush(&key, millis);
        }

        let mut connection = self.connection.clone();
        pipe.query_async(&mut connection).await.context(CommandSnafu)
    }

    async fn expire(&self, kind: EventKind, ttl: Duration) -> Result<()> {
        let mut connection = self.connection.clone();
        connection
            .expire::<_, ()>(self.key(kind.list_key()), ttl.num_seconds())
            .await
            .context(CommandSnafu)
    }
}
