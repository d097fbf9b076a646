//! Query fingerprinting.
//!
//! Produces the two 32-bit hashes the cache is keyed on:
//!
//! - the **identity hash** `H`, taken over the whitespace-stripped,
//!   lowercased query text (EXPLAIN wrappers removed), so the same logical
//!   statement always maps to the same bucket
//! - the **similarity hash** `S`, taken over comment- and literal-stripped,
//!   whitespace-collapsed, lowercased text, a lossy signature used only to
//!   rank closeness between observations
//!
//! Both hashes must be stable across process restarts because they key the
//! persisted cache file, so hashing is a pinned 32-bit FNV-1a rather than
//! the process-seeded std hasher.

/// Identity and similarity hashes for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FingerprintPair {
    /// Exact-match identity hash over normalized text
    pub hash: u32,
    /// Lossy similarity hash over sanitized text
    pub sim_hash: u32,
}

impl FingerprintPair {
    /// Fingerprint a raw SQL string.
    pub fn of(sql: &str) -> FingerprintPair {
        if sql.is_empty() {
            return FingerprintPair { hash: 0, sim_hash: 0 };
        }
        FingerprintPair {
            hash: fnv1a32(normalize(sql).as_bytes()),
            sim_hash: fnv1a32(sanitize(sql).as_bytes()),
        }
    }

    /// Whether this pair came from empty input. An empty pair never hits
    /// the cache; decisions for it go through the rule scorer.
    pub fn is_empty(self) -> bool {
        self.hash == 0 && self.sim_hash == 0
    }
}

/// 32-bit FNV-1a. Pinned constants; do not change without migrating the
/// persisted cache file.
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Normalize for identity hashing: strip any EXPLAIN wrapper, drop all
/// whitespace, lowercase.
pub fn normalize(sql: &str) -> String {
    strip_explain_prefix(sql)
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Sanitize for similarity hashing and feature extraction: remove `--` and
/// `/* */` comments and the bodies of string literals, collapse whitespace
/// runs to a single space, lowercase everything else.
pub fn sanitize(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut in_string = false;
    let mut last_space = true;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
            }
            continue;
        }
        if in_block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                in_block_comment = false;
                chars.next();
            }
            continue;
        }
        if in_string {
            // '' is an escaped quote inside the literal
            if c == '\'' && chars.peek() == Some(&'\'') {
                chars.next();
                continue;
            }
            if c == '\'' {
                in_string = false;
            }
            continue;
        }
        if c == '-' && chars.peek() == Some(&'-') {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
            in_line_comment = true;
            chars.next();
            continue;
        }
        if c == '/' && chars.peek() == Some(&'*') {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
            in_block_comment = true;
            chars.next();
            continue;
        }
        if c == '\'' {
            in_string = true;
            if !last_space {
                out.push(' ');
                last_space = true;
            }
            continue;
        }
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
            continue;
        }

        for lc in c.to_lowercase() {
            out.push(lc);
        }
        last_space = false;
    }
    out
}

/// Strip a leading `EXPLAIN` / `EXPLAIN (options)` / `EXPLAIN ANALYZE ...`
/// wrapper and return the wrapped statement. Returns the input unchanged if
/// it is not an EXPLAIN.
pub fn strip_explain_prefix(sql: &str) -> &str {
    let trimmed = sql.trim_start();
    let lower = trimmed.to_ascii_lowercase();
    if !lower.starts_with("explain") {
        return sql;
    }

    let mut rest = &trimmed[7..];
    let rest_trimmed = rest.trim_start();
    if rest_trimmed.starts_with('(') {
        // Parenthesized option list: skip the balanced group.
        let mut depth = 0usize;
        let mut end = rest_trimmed.len();
        for (idx, c) in rest_trimmed.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        end = idx + 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        rest = &rest_trimmed[end..];
    } else {
        // Bare option keywords before the statement proper.
        const OPTIONS: [&str; 8] = [
            "analyze", "verbose", "costs", "buffers", "timing", "summary", "settings", "wal",
        ];
        rest = rest_trimmed;
        loop {
            let lower_rest = rest.to_ascii_lowercase();
            let Some(opt) = OPTIONS.iter().find(|o| lower_rest.starts_with(*o)) else {
                break;
            };
            rest = rest[opt.len()..].trim_start();
        }
    }

    // Scan forward to the first statement keyword.
    let lower_rest = rest.to_ascii_lowercase();
    for kw in ["select", "with", "insert", "update", "delete"] {
        if let Some(pos) = lower_rest.find(kw) {
            return &rest[pos..];
        }
    }
    sql
}
