//! Query feature extraction.
//!
//! Derives the rule scorer's feature vector from sanitized SQL text. The
//! extraction is deliberately text-level (keyword and shape counting, not
//! parsing): it has to be cheap enough to run on every query before
//! planning, and the rule tables were trained against exactly these
//! counters. Table statistics come from the active workload profile.

use crate::fingerprint::sanitize;
use crate::workload::Workload;

/// Shape metrics for one query, consumed by the rule scorer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFeatures {
    pub join_count: usize,
    pub subquery_count: usize,
    pub has_group_by: bool,
    pub has_order_by: bool,
    pub has_having: bool,
    pub has_distinct: bool,
    pub has_limit: bool,
    pub has_union: bool,
    pub has_exists: bool,
    pub has_in: bool,
    pub has_like: bool,
    pub has_between: bool,
    pub has_case: bool,
    pub agg_func_count: usize,
    pub window_func_count: usize,
    /// FROM-clause relation count estimate (commas + joins + 1)
    pub table_count_est: usize,
    /// WHERE-clause term estimate (ANDs + ORs + 1)
    pub where_terms_est: usize,
    pub and_count: usize,
    pub or_count: usize,
    /// Share of OR among WHERE connectives
    pub or_ratio: f64,
    /// Known relations mentioned, resolved against the workload profile
    pub table_mentioned_count: usize,
    pub table_rows_sum: f64,
    pub table_rows_mean: f64,
    pub table_rows_max: f64,
    pub table_rows_min: f64,
    pub table_index_sum: f64,
    pub table_index_mean: f64,
    pub pct_tables_with_index: f64,
}

impl QueryFeatures {
    /// Extract features from raw SQL text against a workload profile.
    pub fn extract(sql: &str, workload: Workload) -> QueryFeatures {
        let mut feats = QueryFeatures::default();
        if sql.is_empty() {
            return feats;
        }

        let clean = sanitize(sql);
        let text = clean.as_bytes();

        feats.join_count = count_word(text, b"join");
        feats.subquery_count = count_subqueries(text);
        feats.has_group_by = has_word_pair(text, b"group", b"by");
        feats.has_order_by = has_word_pair(text, b"order", b"by");
        feats.has_having = contains_word(text, b"having");
        feats.has_distinct = contains_word(text, b"distinct");
        feats.has_limit = contains_word(text, b"limit");
        feats.has_union = contains_word(text, b"union");
        feats.has_exists = contains_word(text, b"exists");
        feats.has_in = contains_in_operator(text);
        feats.has_like = contains_word(text, b"like");
        feats.has_between = contains_word(text, b"between");
        feats.has_case = contains_word(text, b"case");

        feats.agg_func_count = [b"sum".as_slice(), b"avg", b"min", b"max", b"count"]
            .iter()
            .map(|&f| count_function_calls(text, f))
            .sum();
        feats.window_func_count = count_function_calls(text, b"over");

        feats.table_count_est = estimate_table_count(text, feats.join_count);
        let (ands, ors) = count_where_connectives(text);
        feats.and_count = ands;
        feats.or_count = ors;
        if find_word(text, b"where", 0).is_some() {
            feats.where_terms_est = ands + ors + 1;
        }
        feats.or_ratio = if ands + ors > 0 {
            ors as f64 / (ands + ors) as f64
        } else {
            0.0
        };

        feats.aggregate_table_stats(text, workload);
        feats
    }

    /// Whether the query references any relation at all; queries that do
    /// not are handed the baseline strategy without scoring.
    pub fn references_tables(&self) -> bool {
        self.table_mentioned_count > 0 || self.table_count_est > 0 || self.join_count > 0
    }

    fn aggregate_table_stats(&mut self, text: &[u8], workload: Workload) {
        let tables = workload.tables();
        if tables.is_empty() {
            return;
        }
        let mut seen = vec![false; tables.len()];
        collect_tables_top_level(text, workload, &mut seen);
        collect_tables_global(text, workload, &mut seen);

        let mut with_index = 0usize;
        for (i, table) in tables.iter().enumerate() {
            if !seen[i] {
                continue;
            }
            self.table_mentioned_count += 1;
            self.table_rows_sum += table.rows;
            self.table_index_sum += table.indexes as f64;
            if table.rows > self.table_rows_max {
                self.table_rows_max = table.rows;
            }
            if self.table_rows_min == 0.0 || table.rows < self.table_rows_min {
                self.table_rows_min = table.rows;
            }
            if table.indexes > 0 {
                with_index += 1;
            }
        }

        if self.table_mentioned_count > 0 {
            let n = self.table_mentioned_count as f64;
            self.table_rows_mean = self.table_rows_sum / n;
            self.table_index_mean = self.table_index_sum / n;
            self.pct_tables_with_index = with_index as f64 / n;
        }
    }
}

// ---------------------------------------------------------------------------
// Text scanning helpers (input is sanitized lowercase text)
// ---------------------------------------------------------------------------

fn is_word_boundary(b: u8) -> bool {
    !b.is_ascii_alphanumeric() && b != b'_'
}

/// Word `kw` matches at `pos`: exact bytes, boundaries on both sides.
fn matches_word_at(s: &[u8], pos: usize, kw: &[u8]) -> bool {
    if pos + kw.len() > s.len() || &s[pos..pos + kw.len()] != kw {
        return false;
    }
    if pos > 0 && !is_word_boundary(s[pos - 1]) {
        return false;
    }
    match s.get(pos + kw.len()) {
        Some(&b) => is_word_boundary(b),
        None => true,
    }
}

fn find_word(s: &[u8], kw: &[u8], from: usize) -> Option<usize> {
    (from..s.len()).find(|&pos| matches_word_at(s, pos, kw))
}

fn contains_word(s: &[u8], kw: &[u8]) -> bool {
    find_word(s, kw, 0).is_some()
}

fn count_word(s: &[u8], kw: &[u8]) -> usize {
    let mut count = 0;
    let mut pos = 0;
    while pos < s.len() {
        if matches_word_at(s, pos, kw) {
            count += 1;
            pos += kw.len();
        } else {
            pos += 1;
        }
    }
    count
}

/// `first` immediately followed (modulo whitespace) by `second`.
fn has_word_pair(s: &[u8], first: &[u8], second: &[u8]) -> bool {
    let mut pos = 0;
    while let Some(hit) = find_word(s, first, pos) {
        let mut q = hit + first.len();
        while q < s.len() && s[q].is_ascii_whitespace() {
            q += 1;
        }
        if matches_word_at(s, q, second) {
            return true;
        }
        pos = hit + 1;
    }
    false
}

/// `IN` used as an operator: the word followed by an opening parenthesis.
fn contains_in_operator(s: &[u8]) -> bool {
    let mut pos = 0;
    while let Some(hit) = find_word(s, b"in", pos) {
        let mut q = hit + 2;
        while q < s.len() && s[q].is_ascii_whitespace() {
            q += 1;
        }
        if s.get(q) == Some(&b'(') {
            return true;
        }
        pos = hit + 1;
    }
    false
}

/// Parenthesized SELECTs.
fn count_subqueries(s: &[u8]) -> usize {
    let mut count = 0;
    for (i, &b) in s.iter().enumerate() {
        if b != b'(' {
            continue;
        }
        let mut q = i + 1;
        while q < s.len() && s[q].is_ascii_whitespace() {
            q += 1;
        }
        if matches_word_at(s, q, b"select") {
            count += 1;
        }
    }
    count
}

/// Calls of `name`: the word followed by an opening parenthesis.
fn count_function_calls(s: &[u8], name: &[u8]) -> usize {
    let mut count = 0;
    let mut pos = 0;
    while let Some(hit) = find_word(s, name, pos) {
        let mut q = hit + name.len();
        while q < s.len() && s[q].is_ascii_whitespace() {
            q += 1;
        }
        if s.get(q) == Some(&b'(') {
            count += 1;
        }
        pos = hit + name.len();
    }
    count
}

const FROM_STOP_WORDS: [&[u8]; 8] = [
    b"where",
    b"group",
    b"order",
    b"having",
    b"limit",
    b"union",
    b"intersect",
    b"except",
];

/// Relation count estimate for the first FROM clause: top-level commas plus
/// joins plus one.
fn estimate_table_count(s: &[u8], join_count: usize) -> usize {
    let Some(from_pos) = find_word(s, b"from", 0) else {
        return 0;
    };
    let clause_start = from_pos + 4;
    let clause_end = FROM_STOP_WORDS
        .iter()
        .filter_map(|&stop| find_word(s, stop, clause_start))
        .min()
        .unwrap_or(s.len());

    let mut commas = 0;
    let mut has_token = false;
    let mut depth = 0usize;
    for &b in &s[clause_start..clause_end] {
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => commas += 1,
            _ if depth == 0 && !b.is_ascii_whitespace() => has_token = true,
            _ => {}
        }
    }
    if has_token {
        commas + join_count + 1
    } else {
        0
    }
}

const WHERE_STOP_WORDS: [&[u8]; 7] = [
    b"group",
    b"order",
    b"having",
    b"limit",
    b"union",
    b"intersect",
    b"except",
];

/// AND/OR counts within the first WHERE clause.
fn count_where_connectives(s: &[u8]) -> (usize, usize) {
    let Some(where_pos) = find_word(s, b"where", 0) else {
        return (0, 0);
    };
    let clause_start = where_pos + 5;
    let clause_end = WHERE_STOP_WORDS
        .iter()
        .filter_map(|&stop| find_word(s, stop, clause_start))
        .min()
        .unwrap_or(s.len());
    let clause = &s[clause_start..clause_end];
    (count_word(clause, b"and"), count_word(clause, b"or"))
}

// ---------------------------------------------------------------------------
// Relation mention detection
// ---------------------------------------------------------------------------

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'"'
}

/// Strip quoting and schema qualification from a relation token.
fn normalize_table_token(token: &str) -> String {
    let unquoted: String = token.chars().filter(|&c| c != '"').collect();
    match unquoted.rfind('.') {
        Some(dot) if dot + 1 < unquoted.len() => unquoted[dot + 1..].to_string(),
        _ => unquoted,
    }
}

fn mark_table_if_known(workload: Workload, token: &str, seen: &mut [bool]) {
    if token.is_empty() {
        return;
    }
    let name = normalize_table_token(token);
    if let Some(idx) = workload.tables().iter().position(|t| t.name == name) {
        seen[idx] = true;
    }
}

/// Walk the top-level FROM clause, marking relations that appear as comma-
/// or join-separated items. Parenthesized subexpressions are skipped.
fn collect_tables_top_level(s: &[u8], workload: Workload, seen: &mut [bool]) {
    const JOIN_WORDS: [&[u8]; 6] = [b"join", b"inner", b"left", b"right", b"full", b"cross"];
    const SKIP_WORDS: [&[u8]; 3] = [b"select", b"on", b"as"];

    let mut depth = 0usize;
    let mut in_from = false;
    let mut expect_table = false;
    let mut token = Vec::new();

    // One-past-the-end iteration flushes a trailing token.
    for i in 0..=s.len() {
        let b = s.get(i).copied().unwrap_or(0);

        if b == b'(' {
            depth += 1;
            token.clear();
            continue;
        }
        if b == b')' {
            depth = depth.saturating_sub(1);
            token.clear();
            continue;
        }
        if depth > 0 {
            continue;
        }
        if is_identifier_byte(b) {
            token.push(b);
            continue;
        }

        if !token.is_empty() {
            let word = std::mem::take(&mut token);
            if in_from && FROM_STOP_WORDS.iter().any(|w| *w == word.as_slice()) {
                return;
            }
            if word == b"from" {
                in_from = true;
                expect_table = true;
            } else if in_from {
                if JOIN_WORDS.iter().any(|w| *w == word.as_slice()) {
                    if word == b"join" {
                        expect_table = true;
                    }
                } else if expect_table && !SKIP_WORDS.iter().any(|w| *w == word.as_slice()) {
                    mark_table_if_known(workload, &String::from_utf8_lossy(&word), seen);
                    expect_table = false;
                }
            }
        }

        if b == b',' {
            expect_table = in_from;
        }
    }
}

/// Second, coarser pass: any identifier directly after a FROM or JOIN
/// keyword anywhere in the text (catches subqueries the top-level walk
/// skipped).
fn collect_tables_global(s: &[u8], workload: Workload, seen: &mut [bool]) {
    let mut pos = 0;
    while pos < s.len() {
        let kw_len = if matches_word_at(s, pos, b"from") {
            4
        } else if matches_word_at(s, pos, b"join") {
            4
        } else {
            pos += 1;
            continue;
        };

        let mut q = pos + kw_len;
        while q < s.len() && s[q].is_ascii_whitespace() {
            q += 1;
        }
        if s.get(q) == Some(&b'(') {
            pos = q;
            continue;
        }
        let start = q;
        while q < s.len() && is_identifier_byte(s[q]) {
            q += 1;
        }
        if q > start {
            mark_table_if_known(workload, &String::from_utf8_lossy(&s[start..q]), seen);
        }
        pos = q.max(pos + 1);
    }
}
