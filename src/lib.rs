//! Rudder - Adaptive Execution-Strategy Selection
//!
//! Rudder is a self-tuning decision layer for embedded query engines. For
//! each incoming query it selects one of eight execution-strategy
//! combinations (three independent optimizer components: cardinality
//! estimation, cost model, join enumeration), learns from observed
//! execution latency, and persists what it learned across restarts.
//!
//! # Features
//!
//! - **Latency-Ranked Cache**: Bounded per-query buckets of observed
//!   strategies, always ordered best-first
//! - **Neighbor Voting**: Cold-start and refinement proposals by
//!   nearest-neighbor vote over a similarity fingerprint
//! - **Feedback Loop**: Execution times flow back into the cache through a
//!   single-slot pending-feedback token
//! - **Rule Fallback**: A per-workload weighted-threshold scorer answers
//!   whenever the cache cannot
//! - **Durable Format**: A tolerant, versioned CSV the selector loads
//!   lazily and flushes at session close
//!
//! # Quick Start
//!
//! ```rust
//! use rudder::{Selector, SelectorConfig};
//!
//! let selector = Selector::new(
//!     SelectorConfig::new().with_populate(true).with_rng_seed(42),
//! );
//!
//! let decision = selector.decide_sql("SELECT * FROM store_sales WHERE ss_item_sk = 5");
//! assert!(decision.strategy.bits() < 8);
//!
//! // ... apply the strategy, execute the query, then report the time:
//! selector.record_feedback(12.5);
//! ```
//!
//! The cache is process-local and single-writer: each session owns an
//! independent in-memory copy loaded from shared durable storage and
//! written back at [`Selector::close`]. Concurrent sessions may race on
//! the backing file at flush time; last writer wins.

pub mod cache;
pub mod config;
pub mod decision;
pub mod error;
pub mod features;
pub mod fingerprint;
pub mod persistence;
pub mod rules;
pub mod strategy;
pub mod voting;
pub mod workload;

// Re-export commonly used types
pub use cache::{Bucket, Slot, StrategyCache, BUCKET_CAPACITY, MAX_BUCKETS};
pub use config::SelectorConfig;
pub use decision::{Decision, DecisionSource, PendingFeedback};
pub use error::{Result, RudderError};
pub use features::QueryFeatures;
pub use fingerprint::FingerprintPair;
pub use rules::RuleScorer;
pub use strategy::{Component, Strategy, STRATEGY_COUNT};
pub use workload::{DataProfile, Workload};

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use voting::VotingEngine;

/// Snapshot of the selector's cache state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorStats {
    pub buckets: usize,
    pub slots: usize,
    pub loaded: bool,
}

/// Session state behind the selector handle: the cache, the voting RNG and
/// the single-slot pending-feedback register.
struct SelectorInner {
    cache: StrategyCache,
    loaded: bool,
    voting: VotingEngine,
    pending: Option<PendingFeedback>,
}

/// The per-session strategy selector.
///
/// Owns the process-local strategy cache and orchestrates the decision
/// flow: replay, neighbor-vote proposal, or rule-scorer fallback. All
/// operations are synchronous; the only I/O is the lazy one-time cache
/// load on first use and the flush at [`Selector::close`].
pub struct Selector {
    config: SelectorConfig,
    profile: DataProfile,
    scorer: RuleScorer,
    inner: Mutex<SelectorInner>,
}

impl Selector {
    /// Create a selector from a configuration. No I/O happens here; the
    /// cache loads lazily on the first decision.
    pub fn new(config: SelectorConfig) -> Self {
        let profile = DataProfile::for_workload(config.workload);
        tracing::debug!(
            workload = %profile.workload,
            tables = profile.table_count,
            total_rows = profile.total_rows,
            join_dense = profile.join_dense,
            skewed = profile.skewed,
            large_db = profile.large_db,
            index_dense = profile.index_dense,
            "initialized data profile"
        );

        let seed = config.rng_seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default()
        });

        Selector {
            scorer: RuleScorer::new(config.workload),
            profile,
            inner: Mutex::new(SelectorInner {
                cache: StrategyCache::new(),
                loaded: false,
                voting: VotingEngine::new(seed),
                pending: None,
            }),
            config,
        }
    }

    /// Selector with the default configuration (read-only cache).
    pub fn with_defaults() -> Self {
        Self::new(SelectorConfig::default())
    }

    /// The active configuration.
    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// The derived data profile of the active workload.
    pub fn data_profile(&self) -> &DataProfile {
        &self.profile
    }

    /// Decide a strategy for raw SQL text: fingerprints and extracts
    /// features, then runs the core decision flow.
    pub fn decide_sql(&self, sql: &str) -> Decision {
        let pair = FingerprintPair::of(sql);
        let features = QueryFeatures::extract(sql, self.config.workload);
        self.decide(pair, &features)
    }

    /// Decide a strategy for a pre-fingerprinted query.
    ///
    /// Never fails: any condition the cache cannot answer (disabled cache,
    /// unknown key outside populate mode, store at capacity, empty
    /// fingerprint) degrades to the rule scorer. Issuing a decision
    /// supersedes any unconsumed feedback token from the previous one.
    pub fn decide(&self, pair: FingerprintPair, features: &QueryFeatures) -> Decision {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        inner.pending = None;

        let decision = if !self.config.use_cache || pair.is_empty() {
            Decision::fallback(self.scorer.score(features))
        } else {
            self.ensure_loaded(inner);
            decision::decide_cached(
                &mut inner.cache,
                &mut inner.voting,
                pair,
                self.config.populate,
            )
            .unwrap_or_else(|| Decision::fallback(self.scorer.score(features)))
        };

        inner.pending = decision.feedback;

        if self.config.log_decisions {
            tracing::info!(
                source = ?decision.source,
                strategy = %decision.strategy,
                ce = decision.strategy.enables(Component::CardinalityEstimation),
                cm = decision.strategy.enables(Component::CostModel),
                jn = decision.strategy.enables(Component::JoinEnumeration),
                pending = decision.feedback.is_some(),
                "strategy decision"
            );
        }
        decision
    }

    /// The currently armed feedback token, if any.
    pub fn pending_feedback(&self) -> Option<PendingFeedback> {
        self.inner.lock().pending
    }

    /// Report the measured execution time for the armed feedback token.
    ///
    /// Consumes the token and inserts a new observation. Returns whether a
    /// slot was actually inserted; with no token armed, or when the
    /// observation is a duplicate or the bucket is full, this is a silent
    /// no-op and returns false.
    pub fn record_feedback(&self, elapsed_ms: f64) -> bool {
        let mut inner = self.inner.lock();
        let Some(token) = inner.pending.take() else {
            return false;
        };
        let inner = &mut *inner;
        decision::record_feedback(&mut inner.cache, token, elapsed_ms)
    }

    /// Run `f`, measure its wall time, and feed the elapsed milliseconds to
    /// the feedback recorder iff a token is armed. Mirrors wiring the
    /// selector between an executor's start and end hooks.
    pub fn measure<R>(&self, f: impl FnOnce() -> R) -> R {
        if self.pending_feedback().is_none() {
            return f();
        }
        let start = Instant::now();
        let result = f();
        self.record_feedback(start.elapsed().as_secs_f64() * 1000.0);
        result
    }

    /// Cache state snapshot.
    pub fn stats(&self) -> SelectorStats {
        let inner = self.inner.lock();
        SelectorStats {
            buckets: inner.cache.bucket_count(),
            slots: inner.cache.slot_count(),
            loaded: inner.loaded,
        }
    }

    /// Flush the cache to durable storage and clear the session state.
    ///
    /// The flush happens only when the cache was actually loaded, populate
    /// mode is on, and a cache path is configured; a read-only session
    /// never rewrites the file. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.loaded
            && self.config.use_cache
            && self.config.populate
            && inner.cache.bucket_count() > 0
        {
            if let Some(path) = &self.config.cache_path {
                persistence::store(&inner.cache, path)?;
            }
        }
        inner.cache.clear();
        inner.loaded = false;
        inner.pending = None;
        Ok(())
    }

    /// One-time lazy load: the persisted file if present, else a bulk
    /// import from the source table, else an empty cache. Load failures
    /// log a warning and degrade to a cold start; they are never fatal.
    fn ensure_loaded(&self, inner: &mut SelectorInner) {
        if inner.loaded {
            return;
        }
        inner.loaded = true;

        let Some(cache_path) = &self.config.cache_path else {
            // Memory-only session.
            return;
        };

        if cache_path.exists() {
            match persistence::load(cache_path) {
                Ok(cache) => inner.cache = cache,
                Err(err) => {
                    tracing::warn!(
                        path = %cache_path.display(),
                        %err,
                        "failed to load strategy cache; starting cold"
                    );
                }
            }
            return;
        }

        let (Some(source), Some(query_dir)) = (&self.config.source_path, &self.config.query_dir)
        else {
            return;
        };
        match persistence::bulk_import(source, query_dir, cache_path) {
            Ok(cache) => inner.cache = cache,
            Err(err) => {
                tracing::warn!(
                    source = %source.display(),
                    %err,
                    "bulk import failed; starting cold"
                );
            }
        }
    }
}

impl Drop for Selector {
    fn drop(&mut self) {
        // Mirror the original session-end hook: best-effort flush.
        if let Err(err) = self.close() {
            tracing::warn!(%err, "failed to flush strategy cache on drop");
        }
    }
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("Selector")
            .field("workload", &self.config.workload)
            .field("populate", &self.config.populate)
            .field("buckets", &stats.buckets)
            .field("slots", &stats.slots)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate_selector() -> Selector {
        Selector::new(
            SelectorConfig::new()
                .with_populate(true)
                .with_rng_seed(42)
                .with_log_decisions(false),
        )
    }

    #[test]
    fn test_disabled_cache_always_scores() {
        let selector = Selector::new(SelectorConfig::disabled().with_log_decisions(false));
        let decision = selector.decide_sql("SELECT * FROM store_sales");
        assert_eq!(decision.source, DecisionSource::RuleScorer);
        assert!(decision.feedback.is_none());
        assert_eq!(selector.stats().buckets, 0);
    }

    #[test]
    fn test_empty_sql_scores_baseline() {
        let selector = populate_selector();
        let decision = selector.decide_sql("");
        assert_eq!(decision.source, DecisionSource::RuleScorer);
        assert_eq!(decision.strategy, Strategy::BASELINE);
    }

    #[test]
    fn test_populate_flow_proposes_then_refines() {
        let selector = populate_selector();
        let sql = "SELECT * FROM store_sales WHERE ss_item_sk = 5";

        let first = selector.decide_sql(sql);
        assert_eq!(first.source, DecisionSource::CacheInitial);
        assert!(selector.pending_feedback().is_some());
        assert!(selector.record_feedback(25.0));

        // The bucket now holds one observation; the next decision refines.
        let second = selector.decide_sql(sql);
        assert_eq!(second.source, DecisionSource::CacheRefined);
        assert_ne!(second.strategy, first.strategy);
    }

    #[test]
    fn test_new_decision_supersedes_pending_token() {
        let selector = populate_selector();
        selector.decide_sql("SELECT * FROM store_sales");
        let first_token = selector.pending_feedback().unwrap();
        selector.decide_sql("SELECT * FROM date_dim");
        let second_token = selector.pending_feedback().unwrap();
        assert_ne!(first_token.hash, second_token.hash);
        // Only the second token's feedback lands
        assert!(selector.record_feedback(10.0));
        assert_eq!(selector.stats().slots, 1);
    }

    #[test]
    fn test_feedback_without_token_is_noop() {
        let selector = populate_selector();
        assert!(!selector.record_feedback(10.0));
        assert_eq!(selector.stats().slots, 0);
    }

    #[test]
    fn test_measure_runs_closure_without_token() {
        let selector = populate_selector();
        let value = selector.measure(|| 7);
        assert_eq!(value, 7);
        assert_eq!(selector.stats().slots, 0);
    }

    #[test]
    fn test_measure_records_when_armed() {
        let selector = populate_selector();
        selector.decide_sql("SELECT * FROM store_sales");
        assert!(selector.pending_feedback().is_some());
        selector.measure(|| std::thread::sleep(std::time::Duration::from_millis(1)));
        assert!(selector.pending_feedback().is_none());
        assert_eq!(selector.stats().slots, 1);
    }

    #[test]
    fn test_read_only_unknown_key_scores_without_mutation() {
        let selector = Selector::new(
            SelectorConfig::new()
                .with_rng_seed(1)
                .with_log_decisions(false),
        );
        let decision = selector.decide_sql("SELECT * FROM store_sales");
        assert_eq!(decision.source, DecisionSource::RuleScorer);
        assert_eq!(selector.stats().buckets, 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let selector = populate_selector();
        selector.decide_sql("SELECT * FROM store_sales");
        selector.record_feedback(5.0);
        selector.close().unwrap();
        assert_eq!(selector.stats().buckets, 0);
        selector.close().unwrap();
    }
}
