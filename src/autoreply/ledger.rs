//! Deduplication ledger.
//!
//! Bounded in-process set of already-handled message keys. Never persisted:
//! restarting the process forgets all history, so a message handled before
//! a restart may be answered again.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

/// Dedup key: connector id plus message id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessedKey(String);

impl ProcessedKey {
    /// Build the key for one inbound message on one connector
    pub fn new(connector_id: &str, message_id: &str) -> Self {
        Self(format!("{}:{}", connector_id, message_id))
    }
}

impl std::fmt::Display for ProcessedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bounded FIFO membership set.
///
/// When the set grows past its capacity the oldest half is evicted in one
/// batch, so a marked key stays visible for at least capacity/2 further
/// insertions. Internally locked: `seen` and `mark` are safe from
/// overlapping logical invocations.
#[derive(Debug)]
pub struct DedupLedger {
    capacity: usize,
    inner: Mutex<LedgerInner>,
}

#[derive(Debug, Default)]
struct LedgerInner {
    order: VecDeque<ProcessedKey>,
    members: HashSet<ProcessedKey>,
}

impl DedupLedger {
    /// Default maximum number of retained keys
    pub const DEFAULT_CAPACITY: usize = 1000;

    /// Create an empty ledger with the given capacity (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    /// Whether the key has been marked and not yet evicted
    pub fn seen(&self, key: &ProcessedKey) -> bool {
        self.inner.lock().members.contains(key)
    }

    /// Record a key as handled. A key already present is not re-inserted
    /// and keeps its original position in the eviction order.
    pub fn mark(&self, key: ProcessedKey) {
        let mut inner = self.inner.lock();
        if !inner.members.insert(key.clone()) {
            return;
        }
        inner.order.push_back(key);
        if inner.order.len() > self.capacity {
            let evict = (self.capacity / 2).max(1);
            for _ in 0..evict {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.members.remove(&oldest);
                }
            }
        }
    }

    /// Number of retained keys
    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    /// Whether the ledger holds no keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget all keys (test isolation)
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.order.clear();
        inner.members.clear();
    }
}

impl Default for DedupLedger {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: usize) -> ProcessedKey {
        ProcessedKey::new("conn", &format!("msg-{}", n))
    }

    #[test]
    fn test_mark_then_seen() {
        let ledger = DedupLedger::new(10);
        assert!(!ledger.seen(&key(1)));

        ledger.mark(key(1));
        assert!(ledger.seen(&key(1)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_remark_does_not_duplicate() {
        let ledger = DedupLedger::new(10);
        ledger.mark(key(1));
        ledger.mark(key(1));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_eviction_drops_oldest_half() {
        let ledger = DedupLedger::new(10);
        for n in 0..11 {
            ledger.mark(key(n));
        }

        // Inserting the 11th key evicts the oldest five.
        assert_eq!(ledger.len(), 6);
        for n in 0..5 {
            assert!(!ledger.seen(&key(n)), "key {} should be evicted", n);
        }
        for n in 5..11 {
            assert!(ledger.seen(&key(n)), "key {} should survive", n);
        }
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let ledger = DedupLedger::new(10);
        for n in 0..100 {
            ledger.mark(key(n));
            assert!(ledger.len() <= 10);
        }
        assert!(ledger.seen(&key(99)));
    }

    #[test]
    fn test_capacity_one_stays_bounded() {
        let ledger = DedupLedger::new(1);
        ledger.mark(key(1));
        ledger.mark(key(2));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.seen(&key(2)));
        assert!(!ledger.seen(&key(1)));
    }

    #[test]
    fn test_clear_forgets_everything() {
        let ledger = DedupLedger::new(10);
        ledger.mark(key(1));
        ledger.clear();
        assert!(ledger.is_empty());
        assert!(!ledger.seen(&key(1)));
    }

    #[test]
    fn test_keys_are_scoped_by_connector() {
        assert_ne!(
            ProcessedKey::new("conn-a", "m1"),
            ProcessedKey::new("conn-b", "m1")
        );
        assert_eq!(ProcessedKey::new("conn-a", "m1").to_string(), "conn-a:m1");
    }
}
