//! Per-query decision logic and the execution feedback loop.
//!
//! For every query the engine either **replays** the best known strategy,
//! **proposes** a new one through the voting engine, or reports that the
//! cache cannot answer and the caller must fall back to the rule scorer.
//! Proposals expect exactly one execution-time report; replay and fallback
//! decisions never do.
//!
//! The full decision table, in evaluation order:
//!
//! | bucket for `H`      | populate | action              | feedback |
//! |---------------------|----------|---------------------|----------|
//! | absent or empty     | off      | fall back to scorer | no       |
//! | absent or empty     | on       | propose (initial)   | yes      |
//! | present, full       | any      | replay best         | no       |
//! | present, not full   | off      | replay best         | no       |
//! | present, not full   | on       | propose (refined)   | yes      |
//!
//! Store capacity exhaustion turns the propose-initial row into a scorer
//! fallback. A proposal does not become an observation here; only the
//! feedback recorder inserts slots, once the execution time is known.

use crate::cache::StrategyCache;
use crate::fingerprint::FingerprintPair;
use crate::strategy::Strategy;
use crate::voting::VotingEngine;

/// How a decision was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    /// Rule-based scorer: caching disabled, key unknown without populate
    /// mode, or the store is at capacity
    RuleScorer,
    /// Replay of the bucket's best observed slot
    CacheReplay,
    /// Cold-start proposal from the global neighbor vote
    CacheInitial,
    /// Best-biased refinement proposal within an existing bucket
    CacheRefined,
}

/// A pending execution-time report for one proposed decision.
///
/// At most one token is armed per selector at a time; issuing a new
/// decision before the previous token is consumed silently supersedes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingFeedback {
    pub hash: u32,
    pub sim_hash: u32,
    pub strategy: Strategy,
}

/// The outcome of one decision request.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    /// The strategy to execute with
    pub strategy: Strategy,
    pub source: DecisionSource,
    /// Armed iff this decision expects an execution-time report
    pub feedback: Option<PendingFeedback>,
}

impl Decision {
    pub(crate) fn fallback(strategy: Strategy) -> Decision {
        Decision {
            strategy,
            source: DecisionSource::RuleScorer,
            feedback: None,
        }
    }
}

/// Consult the cache for a decision. `None` means the cache cannot answer
/// and the caller must fall back to the rule scorer; the store is left
/// unmodified in that case except for the populate-mode bucket creation
/// described in the module docs.
pub(crate) fn decide_cached(
    cache: &mut StrategyCache,
    voting: &mut VotingEngine,
    pair: FingerprintPair,
    populate: bool,
) -> Option<Decision> {
    let known = cache.bucket(pair.hash).is_some_and(|b| !b.is_empty());

    if !known {
        if !populate {
            return None;
        }
        // Reserve the bucket now so feedback has somewhere to land. The
        // fresh bucket is empty and cannot influence the global vote.
        cache.bucket_or_create(pair.hash)?;
        let strategy = voting.propose_initial(cache, pair.sim_hash);
        return Some(Decision {
            strategy,
            source: DecisionSource::CacheInitial,
            feedback: Some(PendingFeedback {
                hash: pair.hash,
                sim_hash: pair.sim_hash,
                strategy,
            }),
        });
    }

    // Re-borrowed immutably; `known` guarantees both lookups succeed, and
    // `?` degrades to the scorer fallback rather than panicking if not.
    let bucket = cache.bucket(pair.hash)?;

    if bucket.is_full() || !populate {
        let best = bucket.best()?;
        return Some(Decision {
            strategy: best.strategy,
            source: DecisionSource::CacheReplay,
            feedback: None,
        });
    }

    let strategy = voting.propose_refined(bucket, pair.sim_hash);
    Some(Decision {
        strategy,
        source: DecisionSource::CacheRefined,
        feedback: Some(PendingFeedback {
            hash: pair.hash,
            sim_hash: pair.sim_hash,
            strategy,
        }),
    })
}

/// Record the measured execution time for a consumed feedback token.
///
/// Returns whether a new slot was inserted. Duplicate-strategy and
/// bucket-full drops make repeated reports for the same token idempotent.
pub(crate) fn record_feedback(
    cache: &mut StrategyCache,
    token: PendingFeedback,
    elapsed_ms: f64,
) -> bool {
    let Some(bucket) = cache.bucket_or_create(token.hash) else {
        return false;
    };
    bucket.observe(elapsed_ms, token.sim_hash, token.strategy)
}
