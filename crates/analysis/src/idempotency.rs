//! In-process claim index keyed by `call_id`
//!
//! A claim is taken with an atomic insert-if-vacant, so exactly one of any
//! number of concurrent callers wins. The claim is released when its guard
//! drops. Durable deduplication across processes is the store's job.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Default)]
pub struct IdempotencyIndex {
    claims: Arc<DashMap<String, Instant>>,
}

impl IdempotencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`; `None` if another holder has it
    pub fn try_claim(&self, key: &str) -> Option<ClaimGuard> {
        match self.claims.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Some(ClaimGuard {
                    claims: Arc::clone(&self.claims),
                    key: key.to_string(),
                })
            },
        }
    }

    pub fn is_claimed(&self, key: &str) -> bool {
        self.claims.contains_key(key)
    }

    /// How long `key` has been held
    pub fn held_for(&self, key: &str) -> Option<Duration> {
        self.claims.get(key).map(|since| since.elapsed())
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

/// Releases its claim on drop
#[must_use = "the claim is released as soon as the guard is dropped"]
pub struct ClaimGuard {
    claims: Arc<DashMap<String, Instant>>,
    key: String,
}

impl ClaimGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.claims.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_single_holder() {
        let index = IdempotencyIndex::new();
        let guard = index.try_claim("c1").unwrap();
        assert_eq!(guard.key(), "c1");
        assert!(index.try_claim("c1").is_none());
        assert!(index.try_claim("c2").is_some());

        drop(guard);
        assert!(!index.is_claimed("c1"));
        assert!(index.try_claim("c1").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_one_winner() {
        let index = IdempotencyIndex::new();
        let winners = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let index = index.clone();
            let winners = Arc::clone(&winners);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                if let Some(guard) = index.try_claim("same-call") {
                    winners.fetch_add(1, Ordering::SeqCst);
                    // Hold the claim until every contender has tried
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    drop(guard);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(index.is_empty());
    }
}
