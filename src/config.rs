//! Selector configuration.

use std::path::{Path, PathBuf};

use crate::workload::Workload;

/// Configuration for a [`Selector`](crate::Selector).
///
/// The defaults give a read-only cache: replay known strategies, score
/// everything else, record nothing. Populate mode turns on proposals,
/// feedback recording and the close-time flush.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Whether the cache is consulted at all; when off every decision goes
    /// through the rule scorer
    pub use_cache: bool,
    /// Whether the cache may propose and record new observations
    pub populate: bool,
    /// Active workload profile (rule tables and table statistics)
    pub workload: Workload,
    /// Durable cache file; `None` keeps the cache memory-only
    pub cache_path: Option<PathBuf>,
    /// Source table of known-good strategies for the bulk-import cold start
    pub source_path: Option<PathBuf>,
    /// Directory holding the query files the source table references
    pub query_dir: Option<PathBuf>,
    /// Emit an info-level log line per decision
    pub log_decisions: bool,
    /// Seed for the voting engine's tie-breaking; `None` derives one from
    /// the clock at selector construction
    pub rng_seed: Option<u64>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            populate: false,
            workload: Workload::default(),
            cache_path: None,
            source_path: None,
            query_dir: None,
            log_decisions: true,
            rng_seed: None,
        }
    }
}

impl SelectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with the cache disabled entirely.
    pub fn disabled() -> Self {
        Self {
            use_cache: false,
            ..Default::default()
        }
    }

    pub fn with_workload(mut self, workload: Workload) -> Self {
        self.workload = workload;
        self
    }

    pub fn with_populate(mut self, populate: bool) -> Self {
        self.populate = populate;
        self
    }

    pub fn with_cache_path(mut self, path: impl AsRef<Path>) -> Self {
        self.cache_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_source_table(mut self, path: impl AsRef<Path>) -> Self {
        self.source_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_query_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.query_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_log_decisions(mut self, log: bool) -> Self {
        self.log_decisions = log;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_read_only_cache() {
        let config = SelectorConfig::default();
        assert!(config.use_cache);
        assert!(!config.populate);
        assert_eq!(config.workload, Workload::Tpcds);
    }

    #[test]
    fn test_disabled() {
        assert!(!SelectorConfig::disabled().use_cache);
    }

    #[test]
    fn test_builder_chain() {
        let config = SelectorConfig::new()
            .with_workload(Workload::Job)
            .with_populate(true)
            .with_cache_path("/tmp/cache.csv")
            .with_rng_seed(7);
        assert_eq!(config.workload, Workload::Job);
        assert!(config.populate);
        assert_eq!(config.cache_path.as_deref(), Some(Path::new("/tmp/cache.csv")));
        assert_eq!(config.rng_seed, Some(7));
    }
}
