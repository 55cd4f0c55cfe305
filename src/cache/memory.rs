//! In-process challenge cache.
//!
//! Entries expire a fixed time after insertion. Past capacity the oldest
//! insertion is evicted first, which is also the first entry to expire, so a
//! single insertion-ordered queue drives both policies.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, trace};

use super::{ChallengeCache, ClientIdentity, ServerChallenge};
use crate::{config::CacheSettings, error::InitializationError};

struct Slot {
    challenge: ServerChallenge,
    inserted_at: Instant,
    generation: u64,
}

#[derive(Default)]
struct Entries {
    slots: HashMap<ClientIdentity, Slot>,
    // Insertion order; stale generations are skipped lazily.
    order: VecDeque<(ClientIdentity, u64)>,
    next_generation: u64,
    disposed: bool,
}

impl Entries {
    fn is_current(&self, id: &ClientIdentity, generation: u64) -> bool {
        self.slots
            .get(id)
            .is_some_and(|slot| slot.generation == generation)
    }
}

pub struct MemoryChallengeCache {
    ttl: std::time::Duration,
    capacity: usize,
    entries: Mutex<Entries>,
}

impl MemoryChallengeCache {
    /// # Errors
    /// Returns an error if the TTL or the capacity is zero.
    pub fn new(settings: CacheSettings) -> Result<Self, InitializationError> {
        if settings.ttl.is_zero() {
            return Err(InitializationError::Cache(
                "challenge TTL must be greater than zero".to_string(),
            ));
        }
        if settings.capacity == 0 {
            return Err(InitializationError::Cache(
                "challenge capacity must be greater than zero".to_string(),
            ));
        }

        trace!(
            ttl_seconds = settings.ttl.as_secs(),
            capacity = settings.capacity,
            "NTLM challenge cache initialized"
        );

        Ok(Self {
            ttl: settings.ttl,
            capacity: settings.capacity,
            entries: Mutex::new(Entries::default()),
        })
    }

    /// Number of live (unexpired) challenges.
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries
            .slots
            .values()
            .filter(|slot| slot.inserted_at.elapsed() < self.ttl)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn evict(&self, entries: &mut Entries) {
        let now = Instant::now();

        while let Some((id, generation)) = entries.order.front() {
            if !entries.is_current(id, *generation) {
                entries.order.pop_front();
                continue;
            }
            let expired = entries
                .slots
                .get(id)
                .is_some_and(|slot| now.duration_since(slot.inserted_at) >= self.ttl);
            if !expired {
                break;
            }
            if let Some((id, _)) = entries.order.pop_front() {
                trace!("Expired server challenge for: {id}");
                entries.slots.remove(&id);
            }
        }

        while entries.slots.len() > self.capacity {
            let Some((id, generation)) = entries.order.pop_front() else {
                break;
            };
            if entries.is_current(&id, generation) {
                debug!("Challenge cache full, evicting in-flight handshake for: {id}");
                entries.slots.remove(&id);
            }
        }

        // Overwrites and removals leave dead queue entries behind the front.
        if entries.order.len() > self.capacity.saturating_mul(2) {
            let Entries { slots, order, .. } = entries;
            order.retain(|(id, generation)| {
                slots
                    .get(id)
                    .is_some_and(|slot| slot.generation == *generation)
            });
        }
    }
}

#[async_trait]
impl ChallengeCache for MemoryChallengeCache {
    async fn put(&self, id: &ClientIdentity, challenge: ServerChallenge) {
        let mut entries = self.entries.lock().await;
        if entries.disposed {
            return;
        }

        trace!("Cache server challenge for: {id}");

        let generation = entries.next_generation;
        entries.next_generation += 1;

        let previous = entries.slots.insert(
            id.clone(),
            Slot {
                challenge,
                inserted_at: Instant::now(),
                generation,
            },
        );
        if previous.is_some() {
            debug!("Replacing in-flight server challenge for: {id}");
        }
        entries.order.push_back((id.clone(), generation));

        self.evict(&mut entries);
    }

    async fn get(&self, id: &ClientIdentity) -> Option<ServerChallenge> {
        let mut entries = self.entries.lock().await;

        trace!("Get cached server challenge for: {id}");

        let slot = entries.slots.get(id)?;
        if slot.inserted_at.elapsed() < self.ttl {
            return Some(slot.challenge);
        }

        entries.slots.remove(id);
        None
    }

    async fn remove(&self, id: &ClientIdentity) {
        self.entries.lock().await.slots.remove(id);
    }

    async fn dispose(&self) {
        let mut entries = self.entries.lock().await;
        debug!("Removing challenge cache");
        entries.slots.clear();
        entries.order.clear();
        entries.disposed = true;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    fn cache(ttl_seconds: u64, capacity: usize) -> MemoryChallengeCache {
        MemoryChallengeCache::new(CacheSettings {
            ttl: Duration::from_secs(ttl_seconds),
            capacity,
        })
        .unwrap()
    }

    fn id(n: u8) -> ClientIdentity {
        ClientIdentity::new(format!("10.0.0.{n}"))
    }

    fn challenge(n: u8) -> ServerChallenge {
        ServerChallenge::from_bytes([n; 8])
    }

    #[test]
    fn rejects_zero_settings() {
        assert!(matches!(
            MemoryChallengeCache::new(CacheSettings {
                ttl: Duration::ZERO,
                capacity: 10,
            }),
            Err(InitializationError::Cache(_))
        ));
        assert!(matches!(
            MemoryChallengeCache::new(CacheSettings {
                ttl: Duration::from_secs(1),
                capacity: 0,
            }),
            Err(InitializationError::Cache(_))
        ));
    }

    #[tokio::test]
    async fn put_get_remove() {
        let cache = cache(60, 10);
        assert_eq!(cache.get(&id(1)).await, None);

        cache.put(&id(1), challenge(1)).await;
        assert_eq!(cache.get(&id(1)).await, Some(challenge(1)));

        cache.remove(&id(1)).await;
        assert_eq!(cache.get(&id(1)).await, None);

        // Removing twice is harmless.
        cache.remove(&id(1)).await;
    }

    #[tokio::test]
    async fn put_overwrites_in_flight_challenge() {
        let cache = cache(60, 10);
        cache.put(&id(1), challenge(1)).await;
        cache.put(&id(1), challenge(2)).await;
        assert_eq!(cache.get(&id(1)).await, Some(challenge(2)));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_from_insertion_not_access() {
        let cache = cache(60, 10);
        cache.put(&id(1), challenge(1)).await;

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.get(&id(1)).await, Some(challenge(1)));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(cache.get(&id(1)).await, Some(challenge(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&id(1)).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_restarts_the_ttl() {
        let cache = cache(10, 10);
        cache.put(&id(1), challenge(1)).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.put(&id(1), challenge(2)).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get(&id(1)).await, Some(challenge(2)));
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_insertion() {
        let cache = cache(60, 3);
        for n in 1..=4 {
            cache.put(&id(n), challenge(n)).await;
        }

        assert_eq!(cache.get(&id(1)).await, None);
        for n in 2..=4 {
            assert_eq!(cache.get(&id(n)).await, Some(challenge(n)));
        }
        assert_eq!(cache.len().await, 3);
    }

    #[tokio::test]
    async fn repeated_overwrites_keep_queue_bounded() {
        let cache = cache(60, 2);
        for round in 0..100u8 {
            cache.put(&id(1), challenge(round)).await;
        }
        cache.put(&id(2), challenge(2)).await;

        let order_len = cache.entries.lock().await.order.len();
        assert!(order_len <= 4, "queue grew to {order_len}");
        assert_eq!(cache.get(&id(1)).await, Some(challenge(99)));
        assert_eq!(cache.get(&id(2)).await, Some(challenge(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_reclaimed_before_live_ones() {
        let cache = cache(10, 2);
        cache.put(&id(1), challenge(1)).await;
        tokio::time::advance(Duration::from_secs(11)).await;
        cache.put(&id(2), challenge(2)).await;
        cache.put(&id(3), challenge(3)).await;

        assert_eq!(cache.get(&id(2)).await, Some(challenge(2)));
        assert_eq!(cache.get(&id(3)).await, Some(challenge(3)));
    }

    #[tokio::test]
    async fn dispose_clears_and_ignores_later_puts() {
        let cache = cache(60, 10);
        cache.put(&id(1), challenge(1)).await;
        cache.dispose().await;
        assert!(cache.is_empty().await);

        cache.put(&id(2), challenge(2)).await;
        assert_eq!(cache.get(&id(2)).await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_access_is_consistent() {
        let cache = Arc::new(cache(60, 1000));
        let mut tasks = Vec::new();
        for n in 0..64u8 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                let id = id(n);
                cache.put(&id, challenge(n)).await;
                let seen = cache.get(&id).await;
                cache.remove(&id).await;
                seen
            }));
        }
        for (n, task) in tasks.into_iter().enumerate() {
            let seen = task.await.unwrap();
            assert_eq!(seen, Some(challenge(u8::try_from(n).unwrap())));
        }
        assert!(cache.is_empty().await);
    }
}
