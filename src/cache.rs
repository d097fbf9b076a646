//! Latency-ranked strategy cache.
//!
//! The cache maps a query's identity hash to a **bucket** of observed
//! strategy outcomes. Buckets are small fixed arrays ordered by measured
//! latency, so the best-known strategy is always at index 0 and capacity
//! invariants hold by construction:
//!
//! - a bucket holds at most [`BUCKET_CAPACITY`] slots
//! - no two slots in a bucket share a strategy; repeated observations for
//!   an already-present strategy are dropped, not merged
//! - the store holds at most [`MAX_BUCKETS`] buckets; once full, unknown
//!   queries fall back to the rule scorer
//!
//! Overflow and duplicate drops are deliberate silent no-ops: repeated or
//! concurrent observations are expected and must never corrupt state.

use std::cmp::Ordering;

use crate::strategy::Strategy;

/// Maximum observed strategies per query shape.
pub const BUCKET_CAPACITY: usize = 8;
/// Maximum distinct query shapes in the store.
pub const MAX_BUCKETS: usize = 256;

/// One immutable strategy observation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Slot {
    /// Insertion index within the bucket at creation time (informational)
    pub version: u8,
    /// Measured execution latency; 0.0 is the "known good, not yet
    /// measured" sentinel used by bulk-imported seeds
    pub latency_ms: f64,
    /// Similarity hash of the query that produced this observation
    pub sim_hash: u32,
    /// The strategy that was executed
    pub strategy: Strategy,
    /// Whether this array slot holds a real observation
    pub in_use: bool,
}

/// Bounded, latency-ordered set of observations for one identity hash.
#[derive(Debug, Clone)]
pub struct Bucket {
    hash: u32,
    count: usize,
    slots: [Slot; BUCKET_CAPACITY],
}

impl Bucket {
    fn new(hash: u32) -> Self {
        Bucket {
            hash,
            count: 0,
            slots: [Slot::default(); BUCKET_CAPACITY],
        }
    }

    /// Identity hash this bucket is keyed by.
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Number of observations held.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// A full bucket accepts no further observations and replays its best
    /// slot unconditionally.
    pub fn is_full(&self) -> bool {
        self.count >= BUCKET_CAPACITY
    }

    /// The in-use observations, best (lowest latency) first.
    pub fn slots(&self) -> &[Slot] {
        &self.slots[..self.count]
    }

    /// The best-known observation, if any.
    pub fn best(&self) -> Option<&Slot> {
        self.slots[..self.count].first()
    }

    /// Whether an observation for `strategy` is already present.
    pub fn has_strategy(&self, strategy: Strategy) -> bool {
        self.slots().iter().any(|s| s.strategy == strategy)
    }

    /// Bitmask of strategies already present (bit n set = strategy id n).
    pub fn strategy_mask(&self) -> u8 {
        self.slots()
            .iter()
            .fold(0u8, |mask, s| mask | (1 << s.strategy.bits()))
    }

    /// Record a fresh observation. The slot's `version` is its insertion
    /// index. Returns false when the observation was dropped (bucket full
    /// or strategy already present).
    pub fn observe(&mut self, latency_ms: f64, sim_hash: u32, strategy: Strategy) -> bool {
        let version = self.count as u8;
        self.insert_slot(Slot {
            version,
            latency_ms,
            sim_hash,
            strategy,
            in_use: true,
        })
    }

    /// Insert a pre-built slot (used by the persistence layer, which
    /// carries explicit versions). Same drop rules as [`Bucket::observe`].
    pub(crate) fn insert_slot(&mut self, slot: Slot) -> bool {
        if self.is_full() || self.has_strategy(slot.strategy) {
            return false;
        }
        self.slots[self.count] = Slot { in_use: true, ..slot };
        self.count += 1;
        self.sort();
        true
    }

    fn sort(&mut self) {
        self.slots[..self.count].sort_by(|a, b| {
            a.latency_ms
                .partial_cmp(&b.latency_ms)
                .unwrap_or(Ordering::Equal)
                .then(a.version.cmp(&b.version))
        });
    }
}

/// The process-local store of buckets.
///
/// Lookup is a linear scan: the store is bounded at [`MAX_BUCKETS`]
/// entries and lives on the per-query decision path, where the scan is
/// cheaper than maintaining an index for so few keys.
#[derive(Debug, Clone, Default)]
pub struct StrategyCache {
    buckets: Vec<Bucket>,
}

impl StrategyCache {
    pub fn new() -> Self {
        StrategyCache {
            buckets: Vec::new(),
        }
    }

    /// Number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Total in-use slots across all buckets.
    pub fn slot_count(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    /// Whether the store has reached its bucket budget.
    pub fn is_full(&self) -> bool {
        self.buckets.len() >= MAX_BUCKETS
    }

    pub fn bucket(&self, hash: u32) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.hash == hash)
    }

    pub fn bucket_mut(&mut self, hash: u32) -> Option<&mut Bucket> {
        self.buckets.iter_mut().find(|b| b.hash == hash)
    }

    /// Return the bucket for `hash`, creating it if absent. `None` means
    /// the store is at capacity and the caller must fall back.
    pub fn bucket_or_create(&mut self, hash: u32) -> Option<&mut Bucket> {
        if let Some(idx) = self.buckets.iter().position(|b| b.hash == hash) {
            return Some(&mut self.buckets[idx]);
        }
        if self.is_full() {
            return None;
        }
        self.buckets.push(Bucket::new(hash));
        self.buckets.last_mut()
    }

    /// Iterate all buckets.
    pub fn buckets(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.iter()
    }

    /// Drop every bucket.
    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strat(bits: u8) -> Strategy {
        Strategy::from_bits(bits)
    }

    #[test]
    fn test_bucket_orders_by_latency() {
        let mut bucket = Bucket::new(1);
        assert!(bucket.observe(30.0, 100, strat(1)));
        assert!(bucket.observe(10.0, 101, strat(2)));
        assert!(bucket.observe(20.0, 102, strat(3)));

        let latencies: Vec<f64> = bucket.slots().iter().map(|s| s.latency_ms).collect();
        assert_eq!(latencies, vec![10.0, 20.0, 30.0]);
        assert_eq!(bucket.best().unwrap().strategy, strat(2));
    }

    #[test]
    fn test_bucket_latency_tie_breaks_by_version() {
        let mut bucket = Bucket::new(1);
        bucket.observe(5.0, 0, strat(4));
        bucket.observe(5.0, 0, strat(2));
        // Same latency: earlier insertion wins
        assert_eq!(bucket.best().unwrap().strategy, strat(4));
        assert_eq!(bucket.slots()[0].version, 0);
        assert_eq!(bucket.slots()[1].version, 1);
    }

    #[test]
    fn test_bucket_rejects_duplicate_strategy() {
        let mut bucket = Bucket::new(1);
        assert!(bucket.observe(50.0, 0, strat(3)));
        assert!(!bucket.observe(999.0, 0, strat(3)));
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket.best().unwrap().latency_ms, 50.0);
    }

    #[test]
    fn test_bucket_rejects_overflow() {
        let mut bucket = Bucket::new(1);
        for bits in 0..8u8 {
            assert!(bucket.observe(10.0 * (bits + 1) as f64, 0, strat(bits)));
        }
        assert!(bucket.is_full());
        // All strategies are distinct, so this would otherwise be accepted
        assert!(!bucket.insert_slot(Slot {
            version: 0,
            latency_ms: 1.0,
            sim_hash: 0,
            strategy: strat(0),
            in_use: true,
        }));
        assert_eq!(bucket.len(), BUCKET_CAPACITY);
        assert_eq!(bucket.best().unwrap().latency_ms, 10.0);
    }

    #[test]
    fn test_bucket_strategy_mask() {
        let mut bucket = Bucket::new(1);
        bucket.observe(1.0, 0, strat(0));
        bucket.observe(2.0, 0, strat(5));
        assert_eq!(bucket.strategy_mask(), 0b0010_0001);
    }

    #[test]
    fn test_cache_create_and_find() {
        let mut cache = StrategyCache::new();
        assert!(cache.bucket(42).is_none());
        cache.bucket_or_create(42).unwrap();
        assert!(cache.bucket(42).is_some());
        assert_eq!(cache.bucket_count(), 1);
        // Re-requesting the same hash does not create a second bucket
        cache.bucket_or_create(42).unwrap();
        assert_eq!(cache.bucket_count(), 1);
    }

    #[test]
    fn test_cache_bucket_budget() {
        let mut cache = StrategyCache::new();
        for hash in 0..MAX_BUCKETS as u32 {
            assert!(cache.bucket_or_create(hash).is_some());
        }
        assert!(cache.is_full());
        assert!(cache.bucket_or_create(u32::MAX).is_none());
        // Existing buckets stay reachable after the store fills up
        assert!(cache.bucket_or_create(0).is_some());
    }

    #[test]
    fn test_cache_slot_count_and_clear() {
        let mut cache = StrategyCache::new();
        cache.bucket_or_create(1).unwrap().observe(1.0, 0, strat(1));
        cache.bucket_or_create(2).unwrap().observe(1.0, 0, strat(2));
        cache.bucket_or_create(2).unwrap().observe(2.0, 0, strat(3));
        assert_eq!(cache.slot_count(), 3);
        cache.clear();
        assert_eq!(cache.bucket_count(), 0);
        assert_eq!(cache.slot_count(), 0);
    }

    #[test]
    fn test_invariants_hold_after_random_order_inserts() {
        let mut bucket = Bucket::new(7);
        let latencies = [80.0, 10.0, 40.0, 30.0, 70.0, 20.0, 60.0, 50.0];
        for (bits, &lat) in latencies.iter().enumerate() {
            bucket.observe(lat, 0, strat(bits as u8));
        }
        assert!(bucket.is_full());
        assert_eq!(bucket.best().unwrap().latency_ms, 10.0);
        for pair in bucket.slots().windows(2) {
            assert!(pair[0].latency_ms <= pair[1].latency_ms);
        }
    }
}
