//! Durable cache storage.
//!
//! The cache persists as a small UTF-8 CSV. The canonical form is one row
//! per slot under a fixed header:
//!
//! ```text
//! hash,version,time,sh,cb
//! 3203062353,0,12.411,2840720881,5
//! ```
//!
//! `time` is the measured latency in milliseconds, always written with
//! three decimals. A legacy two-column `hash,label` form (symbolic
//! strategy labels, no header required) stays readable for files produced
//! before the feedback loop existed; legacy rows load with the similarity
//! hash defaulted to the identity hash and a zero latency.
//!
//! Loading is tolerant: a malformed line is skipped with a warning and
//! loading continues. Rows that would violate a bucket invariant
//! (capacity, duplicate strategy) are skipped the same way the in-memory
//! insert drops them. No condition here is fatal to the selector; a
//! missing file simply means a cold start.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::cache::{Slot, StrategyCache};
use crate::error::Result;
use crate::fingerprint::FingerprintPair;
use crate::strategy::Strategy;

/// Header line of the canonical cache file.
pub const CACHE_FILE_HEADER: &str = "hash,version,time,sh,cb";

/// Load a cache file, canonical or legacy.
pub fn load(path: impl AsRef<Path>) -> Result<StrategyCache> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut cache = StrategyCache::new();
    let mut skipped = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_row(trimmed) {
            Some((hash, slot)) => {
                // Capacity and duplicate-strategy rows drop exactly like a
                // live insert would.
                if let Some(bucket) = cache.bucket_or_create(hash) {
                    bucket.insert_slot(slot);
                }
            }
            None if line_no == 0 => {
                // Header row (canonical files always have one).
                tracing::debug!(path = %path.display(), "skipping cache file header");
            }
            None => {
                skipped += 1;
                tracing::warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    "skipping malformed cache row"
                );
            }
        }
    }

    tracing::debug!(
        path = %path.display(),
        buckets = cache.bucket_count(),
        slots = cache.slot_count(),
        skipped,
        "loaded strategy cache"
    );
    Ok(cache)
}

/// Serialize every in-use slot to the canonical format, overwriting `path`.
pub fn store(cache: &StrategyCache, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "{CACHE_FILE_HEADER}")?;
    for bucket in cache.buckets() {
        for slot in bucket.slots() {
            writeln!(
                writer,
                "{},{},{:.3},{},{}",
                bucket.hash(),
                slot.version,
                slot.latency_ms,
                slot.sim_hash,
                slot.strategy.bits()
            )?;
        }
    }
    writer.flush()?;

    tracing::debug!(
        path = %path.display(),
        buckets = cache.bucket_count(),
        slots = cache.slot_count(),
        "stored strategy cache"
    );
    Ok(())
}

/// Seed a cache from a source table of known-good strategies and write the
/// result out in canonical form.
///
/// Each source row names a query file (relative to `query_dir`) and the
/// best-known strategy label for it. The query file's content is
/// fingerprinted to obtain the `(H, S)` pair, and one slot per row is
/// seeded with a zero latency, the "known good, not yet measured"
/// sentinel. Rows whose query file cannot be read are skipped.
pub fn bulk_import(
    source: impl AsRef<Path>,
    query_dir: impl AsRef<Path>,
    cache_out: impl AsRef<Path>,
) -> Result<StrategyCache> {
    let source = source.as_ref();
    let query_dir = query_dir.as_ref();
    let file = File::open(source)?;
    let reader = BufReader::new(file);
    let mut cache = StrategyCache::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        // The source table carries a header row.
        if line_no == 0 {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        // Three-column sources lead with a row index; two-column sources
        // start directly with the query file name.
        let (query_file, label) = match fields.as_slice() {
            [_, file, label, ..] => (*file, *label),
            [file, label] => (*file, *label),
            _ => continue,
        };
        if query_file.is_empty() || label.is_empty() {
            continue;
        }

        let query_file = strip_round_suffix(query_file);
        let path = query_dir.join(query_file);
        let sql = match std::fs::read_to_string(&path) {
            Ok(sql) if !sql.is_empty() => sql,
            Ok(_) => continue,
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    %err,
                    "skipping source row with unreadable query file"
                );
                continue;
            }
        };

        let pair = FingerprintPair::of(&sql);
        let strategy = Strategy::from_label(label).unwrap_or(Strategy::BASELINE);
        let Some(bucket) = cache.bucket_or_create(pair.hash) else {
            continue;
        };
        bucket.observe(0.0, pair.sim_hash, strategy);
    }

    tracing::debug!(
        source = %source.display(),
        buckets = cache.bucket_count(),
        slots = cache.slot_count(),
        "bulk-imported strategy cache"
    );
    store(&cache, cache_out)?;
    Ok(cache)
}

/// Parse one data row in either schema. `None` means the line is not a
/// data row (header, wrong arity, non-numeric field).
fn parse_row(line: &str) -> Option<(u32, Slot)> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 2 {
        return None;
    }
    let hash = parse_u32(fields[0])?;

    if fields.len() < 5 {
        // Legacy hash,label row: similarity unknown, latency unmeasured.
        let strategy = Strategy::from_label(fields[1]).unwrap_or(Strategy::BASELINE);
        return Some((
            hash,
            Slot {
                version: 0,
                latency_ms: 0.0,
                sim_hash: hash,
                strategy,
                in_use: true,
            },
        ));
    }

    let version = fields[1].parse::<u8>().ok()?;
    let latency_ms = fields[2].parse::<f64>().ok()?;
    let sim_hash = parse_u32(fields[3])?;
    let strategy = if fields[4].bytes().next().is_some_and(|b| b.is_ascii_digit()) {
        Strategy::from_bits(fields[4].parse::<u8>().ok()?)
    } else {
        Strategy::from_label(fields[4]).unwrap_or(Strategy::BASELINE)
    };

    Some((
        hash,
        Slot {
            version,
            latency_ms,
            sim_hash,
            strategy,
            in_use: true,
        },
    ))
}

/// Hashes are unsigned 32-bit, but some legacy writers emitted them as
/// signed values; accept both representations.
fn parse_u32(field: &str) -> Option<u32> {
    field
        .parse::<u32>()
        .ok()
        .or_else(|| field.parse::<i32>().ok().map(|v| v as u32))
}

/// Source tables sometimes suffix repeated runs of the same query file.
fn strip_round_suffix(name: &str) -> &str {
    name.strip_suffix("_round1").unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn strat(bits: u8) -> Strategy {
        Strategy::from_bits(bits)
    }

    fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_canonical_file() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(
            &tmp,
            "cache.csv",
            "hash,version,time,sh,cb\n42,0,50.000,1000,5\n42,1,70.000,1001,2\n",
        );
        let cache = load(&path).unwrap();
        let bucket = cache.bucket(42).unwrap();
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket.best().unwrap().strategy, strat(5));
        assert_eq!(bucket.best().unwrap().sim_hash, 1000);
    }

    #[test]
    fn test_load_legacy_line() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "cache.csv", "555,JN\n");
        let cache = load(&path).unwrap();
        let bucket = cache.bucket(555).unwrap();
        assert_eq!(bucket.len(), 1);
        let slot = bucket.best().unwrap();
        assert_eq!(slot.strategy, strat(4));
        assert_eq!(slot.latency_ms, 0.0);
        assert_eq!(slot.sim_hash, 555);
    }

    #[test]
    fn test_load_legacy_unknown_label_maps_to_baseline() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "cache.csv", "555,WAT\n");
        let cache = load(&path).unwrap();
        assert_eq!(cache.bucket(555).unwrap().best().unwrap().strategy, Strategy::BASELINE);
    }

    #[test]
    fn test_load_skips_malformed_lines() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(
            &tmp,
            "cache.csv",
            "hash,version,time,sh,cb\n\
             42,0,abc,1000,5\n\
             garbage\n\
             42,0,50.000,1000,5\n\
             43,notanumber,1.000,7,1\n",
        );
        let cache = load(&path).unwrap();
        assert_eq!(cache.bucket_count(), 1);
        assert_eq!(cache.bucket(42).unwrap().len(), 1);
    }

    #[test]
    fn test_load_enforces_bucket_invariants() {
        let tmp = TempDir::new().unwrap();
        let mut content = String::from("hash,version,time,sh,cb\n");
        // Nine rows for one bucket, with a duplicate strategy among them
        for v in 0..9u32 {
            content.push_str(&format!("1,{},{}.000,{},{}\n", v, v + 1, v, v % 8));
        }
        let path = write_file(&tmp, "cache.csv", &content);
        let cache = load(&path).unwrap();
        let bucket = cache.bucket(1).unwrap();
        assert_eq!(bucket.len(), 8);
        assert!(bucket.is_full());
    }

    #[test]
    fn test_load_accepts_signed_hash() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "cache.csv", "hash,version,time,sh,cb\n-1,0,1.000,-2,3\n");
        let cache = load(&path).unwrap();
        let bucket = cache.bucket(u32::MAX).unwrap();
        assert_eq!(bucket.best().unwrap().sim_hash, u32::MAX - 1);
    }

    #[test]
    fn test_load_accepts_label_in_canonical_column() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "cache.csv", "hash,version,time,sh,cb\n9,0,1.000,10,CE+JN\n");
        let cache = load(&path).unwrap();
        assert_eq!(cache.bucket(9).unwrap().best().unwrap().strategy, strat(5));
    }

    #[test]
    fn test_store_writes_three_decimals_and_header() {
        let tmp = TempDir::new().unwrap();
        let mut cache = StrategyCache::new();
        cache.bucket_or_create(42).unwrap().observe(50.1239, 1000, strat(5));
        let path = tmp.path().join("out.csv");
        store(&cache, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some(CACHE_FILE_HEADER));
        assert_eq!(lines.next(), Some("42,0,50.124,1000,5"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_round_trip_preserves_rows() {
        let tmp = TempDir::new().unwrap();
        let original = "hash,version,time,sh,cb\n\
                        42,0,50.000,1000,5\n\
                        42,1,70.000,1001,2\n\
                        99,0,10.500,7,0\n";
        let path = write_file(&tmp, "cache.csv", original);
        let cache = load(&path).unwrap();
        let out = tmp.path().join("out.csv");
        store(&cache, &out).unwrap();

        let mut written: Vec<String> = std::fs::read_to_string(&out)
            .unwrap()
            .lines()
            .skip(1)
            .map(String::from)
            .collect();
        written.sort();
        let mut expected: Vec<String> = original.lines().skip(1).map(String::from).collect();
        expected.sort();
        assert_eq!(written, expected);
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(load(tmp.path().join("absent.csv")).is_err());
    }

    #[test]
    fn test_bulk_import_seeds_and_writes_canonical() {
        let tmp = TempDir::new().unwrap();
        let queries = tmp.path().join("queries");
        std::fs::create_dir(&queries).unwrap();
        std::fs::write(queries.join("q1.sql"), "SELECT * FROM store_sales").unwrap();
        std::fs::write(queries.join("q2.sql"), "SELECT * FROM date_dim").unwrap();

        let source = write_file(
            &tmp,
            "best.csv",
            "idx,sql_file,best\n\
             0,q1.sql,JN\n\
             1,q2.sql_round1,CE+CM\n\
             2,missing.sql,ALL\n",
        );
        let out = tmp.path().join("cache.csv");
        let cache = bulk_import(&source, &queries, &out).unwrap();

        assert_eq!(cache.bucket_count(), 2);
        let q1 = FingerprintPair::of("SELECT * FROM store_sales");
        let slot = *cache.bucket(q1.hash).unwrap().best().unwrap();
        assert_eq!(slot.strategy, strat(4));
        assert_eq!(slot.latency_ms, 0.0);
        assert_eq!(slot.sim_hash, q1.sim_hash);

        // The canonical file was written and loads back identically
        let reloaded = load(&out).unwrap();
        assert_eq!(reloaded.bucket_count(), 2);
        assert_eq!(
            reloaded.bucket(q1.hash).unwrap().best().unwrap().strategy,
            strat(4)
        );
    }

    #[test]
    fn test_bulk_import_two_column_source() {
        let tmp = TempDir::new().unwrap();
        let queries = tmp.path().join("queries");
        std::fs::create_dir(&queries).unwrap();
        std::fs::write(queries.join("q1.sql"), "SELECT 1 FROM item").unwrap();

        let source = write_file(&tmp, "best.csv", "sql_file,best\nq1.sql,CM\n");
        let out = tmp.path().join("cache.csv");
        let cache = bulk_import(&source, &queries, &out).unwrap();
        assert_eq!(cache.bucket_count(), 1);
        assert_eq!(cache.slot_count(), 1);
    }
}
