//! Workload profiles and their static table statistics.
//!
//! The selector is tuned per benchmark workload. Each workload carries a
//! fixed table of per-relation row counts and index counts that feed the
//! feature extractor and the derived data profile. The numbers are measured
//! offline against the reference datasets and are configuration data, not
//! computed state.

use std::fmt;

/// Relations at or above this row count are considered large.
pub const MEDIUM_ROWS_THRESHOLD: f64 = 1_500_000.0;
/// Relations at or above this row count are considered huge.
pub const HUGE_ROWS_THRESHOLD: f64 = 20_000_000.0;
/// Average indexes per table at or above this marks an index-dense schema.
pub const INDEX_PER_TABLE_THRESHOLD: f64 = 2.0;

/// Foreign-key count of the IMDB schema shared by the JOB and CEB workloads.
const IMDB_FK_COUNT: usize = 19;

/// Supported workload profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Workload {
    /// Join Order Benchmark (IMDB schema)
    Job,
    /// Cardinality Estimation Benchmark (IMDB schema)
    Ceb,
    /// Stack Overflow workload
    Stack,
    /// TPC-DS
    #[default]
    Tpcds,
}

impl Workload {
    /// Parse a workload name; unknown names fall back to JOB.
    pub fn parse(name: &str) -> Workload {
        let trimmed = name.trim();
        if trimmed.eq_ignore_ascii_case("job") {
            Workload::Job
        } else if trimmed.eq_ignore_ascii_case("ceb") {
            Workload::Ceb
        } else if trimmed.eq_ignore_ascii_case("stack") {
            Workload::Stack
        } else if trimmed.eq_ignore_ascii_case("tpcds")
            || trimmed.eq_ignore_ascii_case("tpc-ds")
            || trimmed.eq_ignore_ascii_case("tpc_ds")
        {
            Workload::Tpcds
        } else {
            Workload::Job
        }
    }

    /// The static table statistics backing this workload.
    pub fn tables(self) -> &'static [TableStats] {
        match self {
            // JOB and CEB both run against the IMDB schema.
            Workload::Job | Workload::Ceb => IMDB_TABLES,
            Workload::Stack => STACK_TABLES,
            Workload::Tpcds => TPCDS_TABLES,
        }
    }

    /// Look up row and index counts for a relation name.
    pub fn table_stats(self, name: &str) -> Option<&'static TableStats> {
        self.tables().iter().find(|t| t.name == name)
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Workload::Job => "job",
            Workload::Ceb => "ceb",
            Workload::Stack => "stack",
            Workload::Tpcds => "tpcds",
        };
        write!(f, "{name}")
    }
}

/// Offline-measured statistics for one relation.
#[derive(Debug, Clone, Copy)]
pub struct TableStats {
    /// Relation name (lowercase, unqualified)
    pub name: &'static str,
    /// Row count
    pub rows: f64,
    /// Number of indexes
    pub indexes: usize,
}

const fn t(name: &'static str, rows: f64, indexes: usize) -> TableStats {
    TableStats { name, rows, indexes }
}

static IMDB_TABLES: &[TableStats] = &[
    t("aka_name", 901_343.0, 2),
    t("aka_title", 361_472.0, 3),
    t("cast_info", 36_244_344.0, 5),
    t("char_name", 3_140_339.0, 1),
    t("comp_cast_type", 4.0, 1),
    t("company_name", 234_997.0, 1),
    t("company_type", 4.0, 1),
    t("complete_cast", 135_086.0, 4),
    t("info_type", 113.0, 1),
    t("keyword", 134_170.0, 1),
    t("kind_type", 7.0, 1),
    t("link_type", 18.0, 1),
    t("movie_companies", 2_609_129.0, 4),
    t("movie_info", 14_835_720.0, 3),
    t("movie_info_idx", 1_380_035.0, 3),
    t("movie_keyword", 4_523_930.0, 3),
    t("movie_link", 29_997.0, 4),
    t("name", 4_167_491.0, 1),
    t("person_info", 2_963_664.0, 3),
    t("role_type", 12.0, 1),
    t("title", 2_528_312.0, 2),
];

static STACK_TABLES: &[TableStats] = &[
    t("account", 13_872_153.0, 1),
    t("answer", 6_347_553.0, 5),
    t("badge", 51_236_903.0, 1),
    t("comment", 103_459_956.0, 3),
    t("post_link", 2_264_333.0, 1),
    t("question", 12_666_441.0, 4),
    t("site", 173.0, 1),
    t("so_user", 21_097_302.0, 3),
    t("tag", 186_770.0, 1),
    t("tag_question", 36_883_819.0, 2),
];

static TPCDS_TABLES: &[TableStats] = &[
    t("call_center", 24.0, 3),
    t("catalog_page", 12_000.0, 3),
    t("catalog_returns", 1_439_749.0, 18),
    t("catalog_sales", 14_401_261.0, 19),
    t("customer", 500_000.0, 6),
    t("customer_address", 250_000.0, 2),
    t("customer_demographics", 1_920_800.0, 2),
    t("date_dim", 73_049.0, 1),
    t("household_demographics", 7_200.0, 2),
    t("income_band", 20.0, 1),
    t("inventory", 133_110_000.0, 4),
    t("item", 102_000.0, 3),
    t("promotion", 500.0, 4),
    t("reason", 45.0, 1),
    t("ship_mode", 20.0, 1),
    t("store", 102.0, 2),
    t("store_returns", 2_875_432.0, 11),
    t("store_sales", 28_800_991.0, 15),
    t("time_dim", 86_400.0, 1),
    t("warehouse", 10.0, 1),
    t("web_page", 200.0, 4),
    t("web_returns", 719_217.0, 15),
    t("web_sales", 7_197_566.0, 19),
    t("web_site", 42.0, 3),
];

// ---------------------------------------------------------------------------
// Derived data profile
// ---------------------------------------------------------------------------

/// Aggregate shape of a workload's dataset, derived once from its table
/// statistics. Exposed for introspection and logged at selector startup.
#[derive(Debug, Clone)]
pub struct DataProfile {
    pub workload: Workload,
    pub table_count: usize,
    pub fk_count: usize,
    pub total_rows: f64,
    pub max_rows: f64,
    pub large_table_count: usize,
    pub huge_table_count: usize,
    /// Largest single relation's share of total rows
    pub max_ratio: f64,
    pub fk_per_table: f64,
    pub index_count: usize,
    pub index_per_table: f64,
    /// Nearly every table participates in a foreign key
    pub join_dense: bool,
    /// One relation dominates the dataset
    pub skewed: bool,
    pub large_db: bool,
    pub index_dense: bool,
}

impl DataProfile {
    /// Derive the profile for a workload from its static table statistics.
    pub fn for_workload(workload: Workload) -> DataProfile {
        let tables = workload.tables();
        let imdb_schema = matches!(workload, Workload::Job | Workload::Ceb);
        let fk_count = if imdb_schema { IMDB_FK_COUNT } else { 0 };

        let mut total_rows = 0.0;
        let mut max_rows: f64 = 0.0;
        let mut large_table_count = 0;
        let mut huge_table_count = 0;
        let mut index_count = 0;

        for table in tables {
            if table.rows <= 0.0 {
                continue;
            }
            total_rows += table.rows;
            max_rows = max_rows.max(table.rows);
            if table.rows >= MEDIUM_ROWS_THRESHOLD {
                large_table_count += 1;
            }
            if table.rows >= HUGE_ROWS_THRESHOLD {
                huge_table_count += 1;
            }
            index_count += table.indexes;
        }

        let table_count = tables.len();
        let max_ratio = if total_rows > 0.0 { max_rows / total_rows } else { 0.0 };
        let fk_per_table = if table_count > 0 {
            fk_count as f64 / table_count as f64
        } else {
            0.0
        };
        let index_per_table = if table_count > 0 {
            index_count as f64 / table_count as f64
        } else {
            0.0
        };

        DataProfile {
            workload,
            table_count,
            fk_count,
            total_rows,
            max_rows,
            large_table_count,
            huge_table_count,
            max_ratio,
            fk_per_table,
            index_count,
            index_per_table,
            join_dense: fk_per_table >= 0.9,
            skewed: max_ratio >= 0.60,
            large_db: total_rows >= 100_000_000.0,
            index_dense: index_per_table >= INDEX_PER_TABLE_THRESHOLD,
        }
    }
}
