//! Rule-based strategy scoring.
//!
//! The fallback/seed path when the cache cannot answer: each optimizer
//! component has a per-workload table of weighted threshold rules over the
//! query feature vector. A component is enabled when the weight-normalized
//! share of passing rules reaches its activation threshold. The tables are
//! trained offline against the reference workloads and are configuration
//! data; the only algorithmic content here is the weighted pass/fail
//! aggregation.

use crate::features::QueryFeatures;
use crate::strategy::{Component, Strategy};
use crate::workload::Workload;

/// One dimension of the feature vector a rule can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricId {
    JoinCount,
    SubqueryCount,
    HasGroupBy,
    HasOrderBy,
    HasHaving,
    HasDistinct,
    HasLimit,
    HasUnion,
    HasExists,
    HasIn,
    HasLike,
    HasBetween,
    HasCase,
    AggFuncCount,
    WindowFuncCount,
    TableCountEst,
    WhereTermsEst,
    OrCount,
    AndCount,
    OrRatio,
    TableMentionedCount,
    TableRowsSum,
    TableRowsMean,
    TableRowsMax,
    TableRowsMin,
    TableIndexSum,
    TableIndexMean,
    PctTablesWithIndex,
}

impl MetricId {
    /// Read this metric out of a feature vector.
    pub fn value(self, feats: &QueryFeatures) -> f64 {
        fn flag(b: bool) -> f64 {
            if b {
                1.0
            } else {
                0.0
            }
        }
        match self {
            MetricId::JoinCount => feats.join_count as f64,
            MetricId::SubqueryCount => feats.subquery_count as f64,
            MetricId::HasGroupBy => flag(feats.has_group_by),
            MetricId::HasOrderBy => flag(feats.has_order_by),
            MetricId::HasHaving => flag(feats.has_having),
            MetricId::HasDistinct => flag(feats.has_distinct),
            MetricId::HasLimit => flag(feats.has_limit),
            MetricId::HasUnion => flag(feats.has_union),
            MetricId::HasExists => flag(feats.has_exists),
            MetricId::HasIn => flag(feats.has_in),
            MetricId::HasLike => flag(feats.has_like),
            MetricId::HasBetween => flag(feats.has_between),
            MetricId::HasCase => flag(feats.has_case),
            MetricId::AggFuncCount => feats.agg_func_count as f64,
            MetricId::WindowFuncCount => feats.window_func_count as f64,
            MetricId::TableCountEst => feats.table_count_est as f64,
            MetricId::WhereTermsEst => feats.where_terms_est as f64,
            MetricId::OrCount => feats.or_count as f64,
            MetricId::AndCount => feats.and_count as f64,
            MetricId::OrRatio => feats.or_ratio,
            MetricId::TableMentionedCount => feats.table_mentioned_count as f64,
            MetricId::TableRowsSum => feats.table_rows_sum,
            MetricId::TableRowsMean => feats.table_rows_mean,
            MetricId::TableRowsMax => feats.table_rows_max,
            MetricId::TableRowsMin => feats.table_rows_min,
            MetricId::TableIndexSum => feats.table_index_sum,
            MetricId::TableIndexMean => feats.table_index_mean,
            MetricId::PctTablesWithIndex => feats.pct_tables_with_index,
        }
    }
}

/// Which side of the threshold counts as a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Passes when `value >= threshold`
    Ascending,
    /// Passes when `value <= threshold`
    Descending,
}

/// One weighted threshold rule.
#[derive(Debug, Clone, Copy)]
pub struct MetricRule {
    pub metric: MetricId,
    pub threshold: f64,
    pub direction: Direction,
    pub weight: f64,
}

impl MetricRule {
    /// Whether the feature vector passes this rule.
    pub fn passes(&self, feats: &QueryFeatures) -> bool {
        let value = self.metric.value(feats);
        match self.direction {
            Direction::Ascending => value >= self.threshold,
            Direction::Descending => value <= self.threshold,
        }
    }
}

const fn asc(metric: MetricId, threshold: f64, weight: f64) -> MetricRule {
    MetricRule {
        metric,
        threshold,
        direction: Direction::Ascending,
        weight,
    }
}

const fn desc(metric: MetricId, threshold: f64, weight: f64) -> MetricRule {
    MetricRule {
        metric,
        threshold,
        direction: Direction::Descending,
        weight,
    }
}

use self::MetricId::*;

static CE_JOB_RULES: &[MetricRule] = &[
    asc(AndCount, 17.2500, 1.0),
    asc(HasIn, 0.5987, 1.0),
    asc(TableCountEst, 8.5000, 1.0),
    asc(TableIndexSum, 17.5000, 1.0),
    asc(TableMentionedCount, 7.5000, 1.0),
    asc(TableRowsMax, 25_540_032.0, 1.0),
    asc(TableRowsMean, 5_164_715.2474, 1.0),
    desc(TableRowsMin, 8.0000, 1.0),
    asc(TableRowsSum, 36_570_981.0, 1.0),
    asc(WhereTermsEst, 19.0000, 1.0),
];

static CE_CEB_RULES: &[MetricRule] = &[
    asc(AndCount, 19.5000, 1.2),
    desc(HasBetween, 0.0109, 0.8),
    desc(HasCase, 0.0054, 0.8),
    asc(HasGroupBy, 0.3500, 0.9),
    asc(HasOrderBy, 0.1800, 0.9),
    asc(HasUnion, 0.0250, 0.7),
    asc(TableMentionedCount, 9.0000, 1.2),
    asc(TableRowsMax, 35_000_000.0, 1.0),
    desc(TableRowsMean, 6_400_000.0, 0.9),
    asc(TableRowsMin, 6.0000, 0.8),
    asc(TableRowsSum, 57_000_000.0, 1.1),
    asc(WhereTermsEst, 20.5000, 1.2),
];

static CE_STACK_RULES: &[MetricRule] = &[
    desc(AndCount, 14.5000, 1.0),
    desc(HasCase, 0.0146, 1.0),
    desc(HasDistinct, 0.6055, 1.0),
    asc(HasExists, 0.1018, 1.0),
    desc(HasGroupBy, 0.2127, 1.0),
    asc(JoinCount, 0.0000, 1.0),
    asc(SubqueryCount, 0.0000, 1.0),
    asc(TableCountEst, 7.0000, 1.0),
    desc(TableIndexSum, 14.5000, 1.0),
    asc(TableMentionedCount, 7.0000, 1.0),
    asc(TableRowsMax, 51_236_903.0, 1.0),
    asc(TableRowsMean, 17_786_389.25, 1.0),
    asc(TableRowsMin, 173.0000, 1.0),
    desc(TableRowsSum, 110_242_888.0, 1.0),
    desc(WhereTermsEst, 15.5000, 1.0),
];

static CE_TPCDS_RULES: &[MetricRule] = &[
    asc(AggFuncCount, 3.0000, 1.0),
    asc(AndCount, 6.0000, 1.0),
    asc(HasCase, 0.3277, 1.0),
    desc(HasDistinct, 0.0795, 1.0),
    desc(HasExists, 0.0459, 1.0),
    asc(HasIn, 0.4017, 1.0),
    desc(HasLike, 0.0071, 1.0),
    desc(HasUnion, 0.1784, 1.0),
    asc(OrCount, 0.0000, 1.0),
    desc(SubqueryCount, 1.5000, 1.0),
    desc(TableIndexMean, 7.8333, 1.0),
    desc(TableIndexSum, 24.5000, 1.0),
    asc(TableRowsMax, 28_800_991.0, 1.0),
    desc(TableRowsMean, 8_473_920.9167, 1.0),
    desc(TableRowsMin, 87_524.5, 1.0),
    desc(TableRowsSum, 28_888_515.5, 1.0),
    desc(WhereTermsEst, 7.5000, 1.0),
    asc(WindowFuncCount, 0.0000, 1.0),
];

static CM_JOB_RULES: &[MetricRule] = &[
    asc(TableMentionedCount, 8.0000, 1.0),
    asc(TableRowsMax, 25_540_032.0, 1.0),
    asc(TableRowsMean, 4_750_094.3, 1.0),
    desc(TableRowsMin, 6.2500, 1.0),
    asc(TableRowsSum, 36_051_444.75, 1.0),
];

static CM_CEB_RULES: &[MetricRule] = &[
    desc(AndCount, 19.5000, 1.1),
    asc(HasBetween, 0.0120, 1.0),
    desc(HasCase, 0.0050, 0.8),
    asc(HasLike, 0.0120, 1.0),
    asc(OrCount, 0.3000, 1.1),
    desc(TableCountEst, 10.0000, 1.2),
    asc(TableRowsMax, 35_000_000.0, 1.0),
    asc(TableRowsMean, 6_500_000.0, 1.1),
    desc(TableRowsSum, 57_000_000.0, 1.0),
    desc(WhereTermsEst, 21.0000, 1.2),
];

static CM_STACK_RULES: &[MetricRule] = &[
    asc(HasGroupBy, 0.1875, 1.0),
    asc(HasLimit, 0.1313, 1.0),
    asc(HasOrderBy, 0.1250, 1.0),
    asc(JoinCount, 0.0000, 1.0),
    asc(TableCountEst, 7.0000, 1.0),
    asc(TableIndexSum, 14.0000, 1.0),
    asc(TableMentionedCount, 6.5000, 1.0),
    asc(TableRowsMax, 51_236_903.0, 1.0),
    asc(TableRowsMean, 17_786_389.25, 1.0),
    asc(TableRowsMin, 173.0000, 1.0),
    desc(TableRowsSum, 105_854_723.5, 1.0),
];

static CM_TPCDS_RULES: &[MetricRule] = &[
    asc(AggFuncCount, 3.0000, 1.0),
    asc(AndCount, 6.0000, 1.0),
    desc(HasCase, 0.2962, 1.0),
    asc(HasDistinct, 0.0972, 1.0),
    desc(HasHaving, 0.0657, 1.0),
    desc(HasLike, 0.0086, 1.0),
    asc(HasUnion, 0.2099, 1.0),
    asc(JoinCount, 0.0000, 1.0),
    asc(OrCount, 0.0000, 1.0),
    asc(SubqueryCount, 1.2500, 1.0),
    asc(TableCountEst, 4.0000, 1.0),
    asc(TableIndexSum, 25.5000, 1.0),
    asc(TableRowsMax, 28_800_991.0, 1.0),
    asc(TableRowsMean, 9_237_321.0833, 1.0),
    desc(TableRowsMin, 87_524.5, 1.0),
    asc(TableRowsSum, 28_937_441.0, 1.0),
    asc(WhereTermsEst, 7.5000, 1.0),
];

static JN_JOB_RULES: &[MetricRule] = &[
    desc(AndCount, 16.0000, 1.0),
    desc(HasBetween, 0.1860, 1.0),
    desc(HasIn, 0.5566, 1.0),
    desc(HasLike, 0.6828, 1.0),
    asc(OrCount, 0.0000, 1.0),
    desc(TableCountEst, 8.5000, 1.0),
    asc(TableIndexSum, 17.0000, 1.0),
    asc(TableMentionedCount, 8.0000, 1.0),
    asc(TableRowsMax, 25_540_032.0, 1.0),
    asc(TableRowsMean, 4_868_530.2857, 1.0),
    asc(TableRowsMin, 9.5000, 1.0),
    asc(TableRowsSum, 36_922_332.0, 1.0),
    desc(WhereTermsEst, 17.5000, 1.0),
];

static JN_CEB_RULES: &[MetricRule] = &[
    desc(AndCount, 19.5000, 1.2),
    asc(HasBetween, 0.0150, 1.0),
    desc(HasCase, 0.0040, 0.8),
    desc(HasGroupBy, 0.3000, 1.1),
    desc(HasLike, 0.0080, 0.9),
    desc(HasOrderBy, 0.1500, 1.1),
    desc(TableCountEst, 10.0000, 1.3),
    desc(TableIndexSum, 17.5000, 1.0),
    desc(TableMentionedCount, 8.8000, 1.2),
    asc(TableRowsMax, 33_000_000.0, 1.0),
    desc(TableRowsMean, 6_200_000.0, 1.0),
    asc(TableRowsMin, 7.0000, 0.9),
    desc(TableRowsSum, 55_000_000.0, 1.1),
    desc(WhereTermsEst, 21.0000, 1.2),
];

static JN_STACK_RULES: &[MetricRule] = &[
    desc(AndCount, 14.7500, 1.0),
    asc(HasCase, 0.0162, 1.0),
    asc(HasExists, 0.1614, 1.0),
    asc(HasGroupBy, 0.2115, 1.0),
    desc(HasIn, 0.5347, 1.0),
    asc(JoinCount, 0.0000, 1.0),
    asc(SubqueryCount, 0.0000, 1.0),
    desc(TableCountEst, 6.5000, 1.0),
    desc(TableIndexSum, 12.0000, 1.0),
    desc(TableMentionedCount, 5.5000, 1.0),
    asc(TableRowsMax, 47_648_632.0, 1.0),
    asc(TableRowsMean, 17_686_295.753, 1.0),
    asc(TableRowsMin, 173.0000, 1.0),
    asc(TableRowsSum, 105_854_723.5, 1.0),
    desc(WhereTermsEst, 15.7500, 1.0),
];

static JN_TPCDS_RULES: &[MetricRule] = &[
    asc(AggFuncCount, 3.0000, 1.0),
    asc(AndCount, 6.2500, 1.0),
    desc(HasHaving, 0.0645, 1.0),
    desc(HasLike, 0.0075, 1.0),
    asc(HasOrderBy, 0.9165, 1.0),
    asc(JoinCount, 0.0000, 1.0),
    asc(OrCount, 0.0000, 1.0),
    desc(SubqueryCount, 1.2500, 1.0),
    desc(TableIndexSum, 24.7500, 1.0),
    asc(TableRowsMax, 28_800_991.0, 1.0),
    desc(TableRowsMean, 8_856_478.4583, 1.0),
    desc(TableRowsMin, 87_524.5, 1.0),
    desc(TableRowsSum, 28_914_041.0, 1.0),
    asc(WhereTermsEst, 7.5000, 1.0),
    asc(WindowFuncCount, 0.0000, 1.0),
];

/// The rule table for one component under one workload.
pub fn component_rules(component: Component, workload: Workload) -> &'static [MetricRule] {
    match component {
        Component::CardinalityEstimation => match workload {
            Workload::Job => CE_JOB_RULES,
            Workload::Ceb => CE_CEB_RULES,
            Workload::Stack => CE_STACK_RULES,
            Workload::Tpcds => CE_TPCDS_RULES,
        },
        Component::CostModel => match workload {
            Workload::Job => CM_JOB_RULES,
            Workload::Ceb => CM_CEB_RULES,
            Workload::Stack => CM_STACK_RULES,
            Workload::Tpcds => CM_TPCDS_RULES,
        },
        Component::JoinEnumeration => match workload {
            Workload::Job => JN_JOB_RULES,
            Workload::Ceb => JN_CEB_RULES,
            Workload::Stack => JN_STACK_RULES,
            Workload::Tpcds => JN_TPCDS_RULES,
        },
    }
}

/// Activation threshold for a component's score. A threshold of 0.0 means
/// "always on", 1.0 means "every rule must pass".
pub fn component_threshold(component: Component, workload: Workload) -> f64 {
    let idx = match workload {
        Workload::Job => 0,
        Workload::Ceb => 1,
        Workload::Stack => 2,
        Workload::Tpcds => 3,
    };
    match component {
        Component::CardinalityEstimation => [0.55, 0.80, 1.00, 0.00][idx],
        Component::CostModel => [0.55, 0.65, 0.00, 1.00][idx],
        Component::JoinEnumeration => [0.65, 0.75, 1.00, 0.00][idx],
    }
}

/// Weight-normalized score in `[0, 1]`: the weight share of passing rules.
/// Rules with non-positive weight are disabled and excluded from the total.
pub fn score_rules(rules: &[MetricRule], feats: &QueryFeatures) -> f64 {
    let mut score = 0.0;
    let mut total = 0.0;
    for rule in rules {
        if rule.weight <= 0.0 {
            continue;
        }
        total += rule.weight;
        if rule.passes(feats) {
            score += rule.weight;
        }
    }
    if total <= 0.0 {
        0.0
    } else {
        score / total
    }
}

/// Weighted-threshold strategy scorer for one workload.
#[derive(Debug, Clone, Copy)]
pub struct RuleScorer {
    workload: Workload,
}

impl RuleScorer {
    pub fn new(workload: Workload) -> Self {
        Self { workload }
    }

    /// Score one component in `[0, 1]`.
    pub fn component_score(&self, component: Component, feats: &QueryFeatures) -> f64 {
        score_rules(component_rules(component, self.workload), feats)
    }

    /// Produce the full 3-bit strategy for a feature vector. Queries that
    /// reference no relation get the baseline strategy without scoring.
    pub fn score(&self, feats: &QueryFeatures) -> Strategy {
        if !feats.references_tables() {
            return Strategy::BASELINE;
        }
        let mut strategy = Strategy::BASELINE;
        for component in Component::ALL {
            let score = self.component_score(component, feats);
            if score >= component_threshold(component, self.workload) {
                strategy = Strategy::from_bits(strategy.bits() | component.bit());
            }
        }
        strategy
    }
}
