//! Nearest-neighbor strategy voting.
//!
//! When a decision must be generated rather than replayed, the voting
//! engine proposes a strategy from the observations closest to the query's
//! similarity hash:
//!
//! - **cold start** (unknown query): vote over the nearest slots anywhere
//!   in the store
//! - **refinement** (known query, bucket not yet full): the bucket's best
//!   slot always gets one mandatory vote, padded with bucket-local
//!   neighbors — three while the bucket is still young, one once it holds
//!   more than four observations — and strategies already present in the
//!   bucket are excluded so every proposal explores new ground
//!
//! Closeness is `|a - b|` over the 32-bit similarity hashes. That distance
//! has no proven locality property relative to query structure; it is
//! inherited policy, kept as a replaceable detail rather than a
//! correctness requirement.
//!
//! Ties between equally distant neighbors resolve to scan order; ties
//! between equally voted strategies resolve uniformly at random through
//! the engine's seedable generator, so tests can pin the seed.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::cache::{Bucket, Slot, StrategyCache};
use crate::strategy::{Strategy, STRATEGY_COUNT};

/// Neighbor searches consider at most this many slots.
pub const NEIGHBOR_LIMIT: usize = 3;

/// Similarity distance between two hashes.
pub fn distance(a: u32, b: u32) -> u32 {
    a.abs_diff(b)
}

/// Up to `k` nearest slots across the whole store, by similarity distance.
pub fn nearest_global(cache: &StrategyCache, sim_hash: u32, k: usize) -> Vec<&Slot> {
    let mut scored: Vec<(u32, &Slot)> = cache
        .buckets()
        .flat_map(Bucket::slots)
        .map(|slot| (distance(sim_hash, slot.sim_hash), slot))
        .collect();
    // Stable sort keeps scan order for equal distances.
    scored.sort_by_key(|&(dist, _)| dist);
    scored
        .into_iter()
        .take(k.min(NEIGHBOR_LIMIT))
        .map(|(_, slot)| slot)
        .collect()
}

/// Up to `k` nearest slots within one bucket, optionally skipping the
/// current best slot (index 0).
pub fn nearest_in_bucket(
    bucket: &Bucket,
    sim_hash: u32,
    k: usize,
    skip_best: bool,
) -> Vec<&Slot> {
    let mut scored: Vec<(u32, &Slot)> = bucket
        .slots()
        .iter()
        .enumerate()
        .filter(|&(idx, _)| !(skip_best && idx == 0))
        .map(|(_, slot)| (distance(sim_hash, slot.sim_hash), slot))
        .collect();
    scored.sort_by_key(|&(dist, _)| dist);
    scored
        .into_iter()
        .take(k.min(NEIGHBOR_LIMIT))
        .map(|(_, slot)| slot)
        .collect()
}

/// Vote-based strategy proposer with an injected, seedable random source.
#[derive(Debug)]
pub struct VotingEngine {
    rng: SmallRng,
}

impl VotingEngine {
    /// Create an engine seeded for reproducible tie-breaking.
    pub fn new(seed: u64) -> Self {
        VotingEngine {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Cold-start proposal for a query the store has never seen: mode vote
    /// over the globally nearest slots, nothing excluded. An empty store
    /// degenerates to a uniformly random strategy.
    pub fn propose_initial(&mut self, cache: &StrategyCache, sim_hash: u32) -> Strategy {
        let neighbors = nearest_global(cache, sim_hash, NEIGHBOR_LIMIT);
        self.vote(&neighbors, 0)
    }

    /// Best-biased proposal for a known query whose bucket is not full.
    ///
    /// The best slot votes unconditionally; neighbor votes narrow from
    /// three to one once the bucket holds more than four observations,
    /// shifting from exploration to exploitation. Strategies already in
    /// the bucket are excluded, so the proposal always advances coverage.
    pub fn propose_refined(&mut self, bucket: &Bucket, sim_hash: u32) -> Strategy {
        let k = if bucket.len() > 4 { 1 } else { NEIGHBOR_LIMIT };
        let mut candidates: Vec<&Slot> = Vec::with_capacity(1 + NEIGHBOR_LIMIT);
        if let Some(best) = bucket.best() {
            candidates.push(best);
        }
        candidates.extend(nearest_in_bucket(bucket, sim_hash, k, true));
        self.vote(&candidates, bucket.strategy_mask())
    }

    /// Mode vote over candidate slots. Strategies whose bit is set in
    /// `excluded_mask` are never returned; ties break uniformly at random.
    /// With every strategy excluded the vote degenerates to a uniformly
    /// random pick, the guaranteed-progress fallback.
    pub fn vote(&mut self, candidates: &[&Slot], excluded_mask: u8) -> Strategy {
        let mut counts = [0usize; STRATEGY_COUNT];
        for slot in candidates {
            counts[slot.strategy.bits() as usize] += 1;
        }

        let eligible: Vec<u8> = (0..STRATEGY_COUNT as u8)
            .filter(|bits| excluded_mask & (1 << bits) == 0)
            .collect();
        if eligible.is_empty() {
            return self.random_strategy();
        }

        let top = eligible
            .iter()
            .map(|&bits| counts[bits as usize])
            .max()
            .unwrap_or(0);
        let tied: Vec<u8> = eligible
            .into_iter()
            .filter(|&bits| counts[bits as usize] == top)
            .collect();
        let pick = tied[self.rng.random_range(0..tied.len())];
        Strategy::from_bits(pick)
    }

    fn random_strategy(&mut self) -> Strategy {
        Strategy::from_bits(self.rng.random_range(0..STRATEGY_COUNT as u8))
    }
}
