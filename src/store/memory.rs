use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::Mutex;

use super::{EventStore, Result};
use crate::model::EventKind;
use crate::time::{self, Timestamp};

/// In-process store with the same contract as the redis backend, including
/// per-key time-to-live honored on read. Nothing here survives a restart;
/// it backs the test suite and local experiments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    lists: HashMap<EventKind, Vec<Timestamp>>,
    counters: HashMap<EventKind, i64>,
    deadlines: HashMap<EventKind, Timestamp>,
}

impl Inner {
    fn drop_expired_lists(&mut self, at: Timestamp) {
        let expired: Vec<EventKind> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= at)
            .map(|(kind, _)| *kind)
            .collect();

        for kind in expired {
            self.deadlines.remove(&kind);
            self.lists.remove(&kind);
        }
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append_event(&self, kind: EventKind, timestamp: Timestamp) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.drop_expired_lists(time::now());
        inner.lists.entry(kind).or_default().push(timestamp);
        Ok(())
    }

    async fn list_events(&self, kind: EventKind) -> Result<Vec<Timestamp>> {
        let mut inner = self.inner.lock().await;
        inner.drop_expired_lists(time::now());
        Ok(inner.lists.get(&kind).cloned().unwrap_or_default())
    }

    async fn increment_counter(&self, kind: EventKind) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        let counter = inner.counters.entry(kind).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn get_counter(&self, kind: EventKind) -> Result<i64> {
        let inner = self.inner.lock().await;
        Ok(inner.counters.get(&kind).copied().unwrap_or(0))
    }

    async fn set_counter(&self, kind: EventKind, value: i64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.counters.insert(kind, value);
        Ok(())
    }

    async fn replace_list(&self, kind: EventKind, entries: &[Timestamp]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.lists.insert(kind, entries.to_vec());
        Ok(())
    }

    async fn expire(&self, kind: EventKind, ttl: Duration) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.deadlines.insert(kind, time::now() + ttl);
        Ok(())
    }
}
