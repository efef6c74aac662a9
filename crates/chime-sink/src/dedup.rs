//! Inbound message deduplication.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Default time-to-live for seen message ids.
const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// TTL map keyed by provider-assigned message id.
///
/// Chat providers may redeliver the same inbound event (reconnects, at-least-
/// once webhooks). Each lookup lazily purges entries older than the TTL, so
/// no background sweeper is needed.
pub struct MessageDeduplicator {
    ttl: Duration,
    seen: DashMap<String, Instant>,
}

impl Default for MessageDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl MessageDeduplicator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: ttl.max(Duration::from_secs(1)),
            seen: DashMap::new(),
        }
    }

    /// Whether this message id was already seen within the TTL.
    ///
    /// Inserts the id on a miss, so the first caller gets `false` and every
    /// later caller within the TTL gets `true`.
    pub fn seen(&self, message_id: &str) -> bool {
        self.seen_at(message_id, Instant::now())
    }

    fn seen_at(&self, message_id: &str, now: Instant) -> bool {
        self.seen
            .retain(|_, inserted| now.duration_since(*inserted) < self.ttl);

        // Check-and-insert in one shard-locked operation, so concurrent
        // callers racing on the same id admit exactly one of them.
        match self.seen.entry(message_id.to_string()) {
            Entry::Occupied(_) => true,
            Entry::Vacant(entry) => {
                entry.insert(now);
                false
            }
        }
    }

    /// Number of live entries (test helper).
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_new_then_duplicate() {
        let dedup = MessageDeduplicator::new(Duration::from_secs(60));
        assert!(!dedup.seen("om_123"));
        assert!(dedup.seen("om_123"));
        assert!(!dedup.seen("om_456"));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let dedup = MessageDeduplicator::new(Duration::from_secs(60));
        let start = Instant::now();

        assert!(!dedup.seen_at("om_123", start));
        assert!(dedup.seen_at("om_123", start + Duration::from_secs(30)));

        // TTL elapsed: the id is forgotten and re-admitted.
        assert!(!dedup.seen_at("om_123", start + Duration::from_secs(61)));
    }

    #[test]
    fn concurrent_first_sighting_admits_exactly_one() {
        use std::sync::{Arc, Barrier};

        let dedup = Arc::new(MessageDeduplicator::new(Duration::from_secs(60)));
        for round in 0..200 {
            let barrier = Arc::new(Barrier::new(8));
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let dedup = Arc::clone(&dedup);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        dedup.seen(&format!("om_{round}"))
                    })
                })
                .collect();
            let new_sightings = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|seen| !seen)
                .count();
            assert_eq!(new_sightings, 1, "round {round}");
        }
    }

    #[test]
    fn lookup_purges_stale_entries() {
        let dedup = MessageDeduplicator::new(Duration::from_secs(60));
        let start = Instant::now();

        dedup.seen_at("om_1", start);
        dedup.seen_at("om_2", start);
        assert_eq!(dedup.len(), 2);

        dedup.seen_at("om_3", start + Duration::from_secs(120));
        assert_eq!(dedup.len(), 1);
    }
}
