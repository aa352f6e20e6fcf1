use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ahash::RandomState;

/// Number of independently locked shards. Power of two so the shard index is
/// a mask.
const SHARD_COUNT: usize = 64;

/// Concurrent insert-only set of numbers known to be composite.
///
/// Workers insert from many threads at once; lookups only ever happen on a
/// generation nobody writes to any more. Sets are never cleared, a new
/// generation replaces an old one wholesale.
pub struct CompositeSet {
    shards: Box<[Mutex<HashSet<u64, RandomState>>]>,
}

impl CompositeSet {
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(HashSet::with_hasher(RandomState::new())))
            .collect();
        Self { shards }
    }

    // Only odd numbers are ever stored, so drop the low bit before picking a
    // shard or every value lands in half of them.
    #[inline]
    fn shard(&self, n: u64) -> MutexGuard<'_, HashSet<u64, RandomState>> {
        let idx = ((n >> 1) as usize) & (SHARD_COUNT - 1);
        // Shards are insert-only, so a poisoned one is still consistent
        self.shards[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Idempotent; inserting an already marked number is a no-op.
    pub fn insert(&self, n: u64) {
        self.shard(n).insert(n);
    }

    pub fn contains(&self, n: u64) -> bool {
        self.shard(n).contains(&n)
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }
}

/// The three live composite sets and their rotation.
///
/// - `frozen`: read-only, marks for the verify span
/// - `active`: write-only target for the mark span
/// - `to_print`: previous frozen set, consumed by the finalize drain
pub struct Generations {
    frozen: Arc<CompositeSet>,
    active: Arc<CompositeSet>,
    to_print: Arc<CompositeSet>,
}

impl Generations {
    pub fn new() -> Self {
        Self {
            frozen: Arc::new(CompositeSet::new()),
            active: Arc::new(CompositeSet::new()),
            to_print: Arc::new(CompositeSet::new()),
        }
    }

    pub fn frozen(&self) -> &Arc<CompositeSet> {
        &self.frozen
    }

    pub fn active(&self) -> &Arc<CompositeSet> {
        &self.active
    }

    pub fn to_print(&self) -> &CompositeSet {
        &self.to_print
    }

    /// Frozen becomes to-print, active becomes frozen, a fresh set becomes
    /// active. The old to-print set is dropped.
    ///
    /// Must only run between rounds, when no worker holds a handle to the
    /// active set.
    pub fn rotate(&mut self) {
        let fresh = Arc::new(CompositeSet::new());
        let frozen = std::mem::replace(&mut self.active, fresh);
        self.to_print = std::mem::replace(&mut self.frozen, frozen);
    }
}
