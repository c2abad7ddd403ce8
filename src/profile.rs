//! Profiling Engine
//!
//! Computes the statistical grounding for answers: per-column summaries,
//! temporal cadence, and a dataset-level quality report. Profiling is
//! deterministic for a given dataset and never aborts on malformed cells:
//! they are treated as null and recorded in the quality report.

use crate::dataset::{ColumnRole, Dataset, RoleMapping, Value};
use crate::schema::{Tier, TierClassification};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const TOP_K: usize = 5;

/// Cadence of a temporal column's distinct values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemporalGranularity {
    Daily,
    Weekly,
    Monthly,
}

impl TemporalGranularity {
    pub fn label(&self) -> &'static str {
        match self {
            TemporalGranularity::Daily => "daily",
            TemporalGranularity::Weekly => "weekly",
            TemporalGranularity::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub sum: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalStats {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
    pub granularity: TemporalGranularity,
    /// Distinct (year, month) buckets; the trend/prediction gate reads this.
    pub month_buckets: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopValue {
    pub value: String,
    pub count: usize,
}

/// Role-appropriate summary of one column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub role: ColumnRole,
    /// Non-null, well-formed cell count.
    pub count: usize,
    pub distinct_count: usize,
    pub null_ratio: f64,
    /// Cells whose value contradicted the column role (e.g. non-parsable
    /// dates); treated as null for aggregates.
    pub malformed_count: usize,
    pub numeric: Option<NumericStats>,
    pub temporal: Option<TemporalStats>,
    pub top_values: Vec<TopValue>,
}

/// Dataset-level quality assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    /// 0-100; penalties for missingness, duplicates and malformed cells.
    pub quality_score: u8,
    pub missing_ratio: f64,
    pub duplicate_rows: usize,
    pub malformed_cells: usize,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Full statistical/structural summary of a dataset at a tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaProfile {
    pub tier: Tier,
    pub business_type: String,
    pub row_count: usize,
    pub columns: Vec<ColumnProfile>,
    pub quality: QualityReport,
}

impl SchemaProfile {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn columns_with_role(&self, role: ColumnRole) -> Vec<&ColumnProfile> {
        self.columns.iter().filter(|c| c.role == role).collect()
    }

    pub fn has_role(&self, role: ColumnRole) -> bool {
        self.columns.iter().any(|c| c.role == role)
    }

    /// Most month buckets seen in any temporal column.
    pub fn month_buckets(&self) -> usize {
        self.columns
            .iter()
            .filter_map(|c| c.temporal.as_ref())
            .map(|t| t.month_buckets)
            .max()
            .unwrap_or(0)
    }

    /// Data-coverage ratio for the columns carrying the given roles: the mean
    /// well-formed ratio. 1.0 when no column carries any of the roles, so
    /// role-free categories are not penalized.
    pub fn role_coverage(&self, roles: &[ColumnRole]) -> f64 {
        let relevant: Vec<&ColumnProfile> = self
            .columns
            .iter()
            .filter(|c| roles.contains(&c.role))
            .collect();
        if relevant.is_empty() {
            return 1.0;
        }
        let total: f64 = relevant
            .iter()
            .map(|c| {
                if self.row_count == 0 {
                    0.0
                } else {
                    c.count as f64 / self.row_count as f64
                }
            })
            .sum();
        total / relevant.len() as f64
    }

    /// Short factual statements about the dataset, used by the template
    /// fallback answer and the overview prompt.
    pub fn quick_facts(&self) -> Vec<String> {
        let mut facts = Vec::new();
        facts.push(format!(
            "Dataset contains {} records and {} columns ({} business data, {})",
            self.row_count,
            self.columns.len(),
            self.business_type,
            self.tier
        ));
        for column in &self.columns {
            match (&column.numeric, &column.temporal) {
                (Some(stats), _) => facts.push(format!(
                    "{}: total {:.2}, average {:.2}, range {:.2} to {:.2}",
                    column.name, stats.sum, stats.mean, stats.min, stats.max
                )),
                (_, Some(stats)) => facts.push(format!(
                    "{}: {} to {}, {} cadence, {} month(s) covered",
                    column.name,
                    stats.earliest,
                    stats.latest,
                    stats.granularity.label(),
                    stats.month_buckets
                )),
                _ => {
                    if let Some(top) = column.top_values.first() {
                        facts.push(format!(
                            "{}: {} distinct values, most common '{}' ({} rows)",
                            column.name, column.distinct_count, top.value, top.count
                        ));
                    }
                }
            }
        }
        if self.quality.missing_ratio > 0.0 {
            facts.push(format!(
                "Missing cells: {:.1}% of the dataset",
                self.quality.missing_ratio * 100.0
            ));
        }
        facts
    }
}

/// Build a `SchemaProfile` for a classified dataset.
///
/// Numeric aggregates use the dataset's own rows only; nulls are excluded from
/// aggregates but counted in the null ratio; malformed values are nulled and
/// recorded, never raised.
pub fn build_profile(
    dataset: &Dataset,
    classification: &TierClassification,
    mapping: &RoleMapping,
) -> SchemaProfile {
    let row_count = dataset.row_count();
    let mut columns = Vec::with_capacity(dataset.columns().len());
    let mut total_missing = 0usize;
    let mut total_malformed = 0usize;

    for name in dataset.columns() {
        let values = dataset.column(name).expect("column listed by dataset");
        let role = mapping.role_of(name).unwrap_or(ColumnRole::Dimension);
        let profile = profile_column(name, role, values, row_count);
        total_missing += row_count - profile.count;
        total_malformed += profile.malformed_count;
        columns.push(profile);
    }

    let quality = assess_quality(dataset, total_missing, total_malformed);

    SchemaProfile {
        tier: classification.tier,
        business_type: classification.business_type.clone(),
        row_count,
        columns,
        quality,
    }
}

fn profile_column(name: &str, role: ColumnRole, values: &[Value], row_count: usize) -> ColumnProfile {
    let mut malformed = 0usize;
    let mut numbers: Vec<f64> = Vec::new();
    let mut dates: Vec<NaiveDate> = Vec::new();
    let mut kept: Vec<String> = Vec::new();

    for value in values {
        if value.is_null() {
            continue;
        }
        match role {
            ColumnRole::Measure => match coerce_number(value) {
                Some(n) => {
                    numbers.push(n);
                    kept.push(value.display());
                }
                None => malformed += 1,
            },
            ColumnRole::Temporal => match value.as_date() {
                Some(d) => {
                    dates.push(d);
                    kept.push(d.to_string());
                }
                None => malformed += 1,
            },
            _ => kept.push(value.display()),
        }
    }

    let count = kept.len();
    let null_ratio = if row_count == 0 {
        0.0
    } else {
        (row_count - count) as f64 / row_count as f64
    };

    let mut value_counts: HashMap<&str, usize> = HashMap::new();
    for v in &kept {
        *value_counts.entry(v.as_str()).or_insert(0) += 1;
    }
    let distinct_count = value_counts.len();

    let numeric = if role == ColumnRole::Measure && !numbers.is_empty() {
        let sum: f64 = numbers.iter().sum();
        let min = numbers.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Some(NumericStats {
            min,
            max,
            mean: sum / numbers.len() as f64,
            sum,
        })
    } else {
        None
    };

    let temporal = if role == ColumnRole::Temporal && !dates.is_empty() {
        Some(temporal_stats(&mut dates))
    } else {
        None
    };

    // Top-K only carries meaning for categorical-ish roles.
    let top_values = match role {
        ColumnRole::Dimension | ColumnRole::Flag | ColumnRole::Identifier | ColumnRole::FreeText => {
            let mut pairs: Vec<(String, usize)> = value_counts
                .into_iter()
                .map(|(v, c)| (v.to_string(), c))
                .collect();
            // Count descending, then value ascending, so output is stable.
            pairs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            pairs
                .into_iter()
                .take(TOP_K)
                .map(|(value, count)| TopValue { value, count })
                .collect()
        }
        _ => Vec::new(),
    };

    ColumnProfile {
        name: name.to_string(),
        role,
        count,
        distinct_count,
        null_ratio,
        malformed_count: malformed,
        numeric,
        temporal,
        top_values,
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Str(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn temporal_stats(dates: &mut Vec<NaiveDate>) -> TemporalStats {
    dates.sort();
    dates.dedup();

    let earliest = dates[0];
    let latest = *dates.last().expect("non-empty dates");

    let months: HashSet<(i32, u32)> = dates.iter().map(|d| (d.year(), d.month())).collect();

    let granularity = if dates.len() < 2 {
        TemporalGranularity::Monthly
    } else {
        let mut gaps: Vec<i64> = dates
            .windows(2)
            .map(|w| (w[1] - w[0]).num_days())
            .collect();
        gaps.sort();
        let median_gap = gaps[gaps.len() / 2];
        if median_gap <= 2 {
            TemporalGranularity::Daily
        } else if median_gap <= 10 {
            TemporalGranularity::Weekly
        } else {
            TemporalGranularity::Monthly
        }
    };

    TemporalStats {
        earliest,
        latest,
        granularity,
        month_buckets: months.len(),
    }
}

fn assess_quality(dataset: &Dataset, missing: usize, malformed: usize) -> QualityReport {
    let cell_count = dataset.row_count() * dataset.columns().len();
    let missing_ratio = if cell_count == 0 {
        0.0
    } else {
        missing as f64 / cell_count as f64
    };

    let duplicate_rows = count_duplicate_rows(dataset);

    let mut score: i32 = 100;
    let mut issues = Vec::new();

    if missing_ratio > 0.10 {
        score -= 20;
        issues.push(format!("High missing values: {:.1}%", missing_ratio * 100.0));
    }
    if dataset.row_count() > 0 {
        let duplicate_ratio = duplicate_rows as f64 / dataset.row_count() as f64;
        if duplicate_ratio > 0.05 {
            score -= 15;
            issues.push(format!("Duplicate rows: {:.1}%", duplicate_ratio * 100.0));
        }
    }
    if malformed > 0 {
        score -= 10;
        issues.push(format!("Malformed cells treated as null: {}", malformed));
    }

    let mut recommendations = Vec::new();
    for issue in &issues {
        if issue.starts_with("High missing") {
            recommendations.push("Fill or drop columns with heavy missing data".to_string());
        } else if issue.starts_with("Duplicate") {
            recommendations.push("Review and remove duplicate records if unintended".to_string());
        } else if issue.starts_with("Malformed") {
            recommendations.push("Check source formatting for the flagged columns".to_string());
        }
    }

    QualityReport {
        quality_score: score.max(0) as u8,
        missing_ratio,
        duplicate_rows,
        malformed_cells: malformed,
        issues,
        recommendations,
    }
}

fn count_duplicate_rows(dataset: &Dataset) -> usize {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for row in 0..dataset.row_count() {
        let key = dataset
            .columns()
            .iter()
            .map(|c| dataset.column(c).expect("column exists")[row].display())
            .collect::<Vec<_>>()
            .join("\u{1f}");
        *seen.entry(key).or_insert(0) += 1;
    }
    seen.values().filter(|&&c| c > 1).map(|c| c - 1).sum()
}
