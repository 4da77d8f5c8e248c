use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// How long cached statistics stay fresh, on the service and in the client
/// facade alike.
pub const CACHE_TTL: Duration = Duration::from_secs(30);

/// Single-slot, time-bounded cache.
///
/// Holds at most one value together with its creation time; readers get a
/// copy while it is younger than the ttl. Concurrent writers race benignly -
/// the last write wins, there are no merge semantics.
#[derive(Debug)]
pub struct SlotCache<T> {
    slot: RwLock<Option<Entry<T>>>,
    ttl: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Entry<T> {
    value: T,
    stored_at: Instant,
}

impl<T: Copy> SlotCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
        }
    }

    pub async fn get(&self) -> Option<T> {
        self.slot
            .read()
            .await
            .as_ref()
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.value)
    }

    pub async fn put(&self, value: T) {
        *self.slot.write().await = Some(Entry {
            value,
            stored_at: Instant::now(),
        });
    }

    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}

impl<T: Copy> Default for SlotCache<T> {
    fn default() -> Self {
        Self::new(CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_a_fresh_value() {
        let cache = SlotCache::default();
        cache.put(7).await;

        assert_eq!(cache.get().await, Some(7));
    }

    #[tokio::test]
    async fn empty_and_invalidated_slots_miss() {
        let cache = SlotCache::default();
        assert_eq!(cache.get().await, None);

        cache.put(7).await;
        cache.invalidate().await;
        assert_eq!(cache.get().await, None);
    }

    #[tokio::test]
    async fn an_aged_value_misses() {
        let cache = SlotCache::new(Duration::ZERO);
        cache.put(7).await;

        assert_eq!(cache.get().await, None, "ttl of zero expires immediately");
    }

    #[tokio::test]
    async fn last_write_wins() {
        let cache = SlotCache::default();
        cache.put(1).await;
        cache.put(2).await;

        assert_eq!(cache.get().await, Some(2));
    }
}
