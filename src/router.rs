//! Question Router
//!
//! Classifies a free-text question into a category and decides whether it is
//! answerable given the active profile. The rule table is static and ordered:
//! the most specific diagnostic intents win on multi-match
//! (quality > prediction > comparison > trend > statistical > overview).
//! Routing runs before any AI call; it is the sole gate preventing answers
//! over absent data.

use crate::dataset::ColumnRole;
use crate::profile::SchemaProfile;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionCategory {
    Overview,
    Statistical,
    Trend,
    Comparison,
    Prediction,
    Quality,
}

impl QuestionCategory {
    pub fn label(&self) -> &'static str {
        match self {
            QuestionCategory::Overview => "overview",
            QuestionCategory::Statistical => "statistical",
            QuestionCategory::Trend => "trend",
            QuestionCategory::Comparison => "comparison",
            QuestionCategory::Prediction => "prediction",
            QuestionCategory::Quality => "quality",
        }
    }
}

/// How comfortably the profile satisfies the matched rule: `Full` when the
/// ideal role set is present, `Borderline` when only the minimum is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerMargin {
    Full,
    Borderline,
}

/// Routing outcome for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedQuestion {
    pub normalized: String,
    pub category: QuestionCategory,
    pub answerable: bool,
    /// Missing-role reason when unanswerable.
    pub reason: Option<String>,
    pub margin: AnswerMargin,
    /// Roles the answer depends on; drives the coverage input of the scorer.
    pub required_roles: Vec<ColumnRole>,
}

struct RouteRule {
    category: QuestionCategory,
    triggers: &'static [&'static str],
    required: &'static [ColumnRole],
    ideal: &'static [ColumnRole],
    /// Minimum distinct month buckets any temporal column must provide.
    min_month_buckets: usize,
}

/// Ordered by priority, highest first. The trailing overview rule is the
/// default when nothing matches.
const RULES: [RouteRule; 7] = [
    RouteRule {
        category: QuestionCategory::Quality,
        triggers: &["missing", "null", "quality", "error", "issue", "duplicate", "clean"],
        required: &[],
        ideal: &[],
        min_month_buckets: 0,
    },
    RouteRule {
        category: QuestionCategory::Prediction,
        triggers: &["predict", "forecast", "future", "next month", "next year", "will", "expect", "projection"],
        required: &[ColumnRole::Temporal, ColumnRole::Measure],
        ideal: &[ColumnRole::Temporal, ColumnRole::Measure, ColumnRole::Dimension],
        min_month_buckets: 3,
    },
    RouteRule {
        category: QuestionCategory::Comparison,
        triggers: &["compare", "versus", " vs ", "difference between", "better", "worse", "against"],
        required: &[ColumnRole::Dimension, ColumnRole::Measure],
        ideal: &[ColumnRole::Dimension, ColumnRole::Measure, ColumnRole::Temporal],
        min_month_buckets: 0,
    },
    RouteRule {
        category: QuestionCategory::Trend,
        triggers: &["trend", "over time", "growth", "decline", "pattern", "increase", "decrease", "monthly", "by month", "seasonal"],
        required: &[ColumnRole::Temporal],
        ideal: &[ColumnRole::Temporal, ColumnRole::Measure],
        min_month_buckets: 2,
    },
    // Sentiment questions are statistical over free-text feedback; they need
    // that role present or the router must say so.
    RouteRule {
        category: QuestionCategory::Statistical,
        triggers: &["feel", "sentiment", "feedback", "satisfaction", "review", "opinion", "complain"],
        required: &[ColumnRole::FreeText],
        ideal: &[ColumnRole::FreeText, ColumnRole::Dimension],
        min_month_buckets: 0,
    },
    RouteRule {
        category: QuestionCategory::Statistical,
        triggers: &[
            "average", "mean", "median", "total", "sum", "count", "top", "best", "highest",
            "lowest", "bottom", "how many", "how much", "most", "least", "statistics",
        ],
        required: &[ColumnRole::Measure],
        ideal: &[ColumnRole::Measure, ColumnRole::Dimension],
        min_month_buckets: 0,
    },
    RouteRule {
        category: QuestionCategory::Overview,
        triggers: &["overview", "summary", "describe", "tell me about", "what data", "explain"],
        required: &[],
        ideal: &[],
        min_month_buckets: 0,
    },
];

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid regex");
}

/// Normalize a question for matching and cache fingerprinting: lowercase,
/// punctuation stripped, whitespace collapsed.
pub fn normalize_question(question: &str) -> String {
    let lowered: String = question
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    WHITESPACE.replace_all(lowered.trim(), " ").to_string()
}

fn matches_rule(rule: &RouteRule, normalized: &str) -> bool {
    // Padded so word-edge triggers like " vs " match at the ends too.
    let padded = format!(" {} ", normalized);
    rule.triggers.iter().any(|t| padded.contains(t))
}

/// Route a question against the active profile.
pub fn route(question: &str, profile: &SchemaProfile) -> RoutedQuestion {
    let normalized = normalize_question(question);

    let rule = RULES
        .iter()
        .find(|r| matches_rule(r, &normalized))
        .unwrap_or(&RULES[RULES.len() - 1]);

    let missing: Vec<ColumnRole> = rule
        .required
        .iter()
        .filter(|role| !profile.has_role(**role))
        .copied()
        .collect();

    if let Some(first_missing) = missing.first() {
        return RoutedQuestion {
            normalized,
            category: rule.category,
            answerable: false,
            reason: Some(format!(
                "missing required role: {}",
                first_missing.label()
            )),
            margin: AnswerMargin::Borderline,
            required_roles: rule.required.to_vec(),
        };
    }

    if rule.min_month_buckets > 0 && profile.month_buckets() < rule.min_month_buckets {
        return RoutedQuestion {
            normalized,
            category: rule.category,
            answerable: false,
            reason: Some("insufficient temporal granularity".to_string()),
            margin: AnswerMargin::Borderline,
            required_roles: rule.required.to_vec(),
        };
    }

    let ideal_met = rule.ideal.iter().all(|role| profile.has_role(*role));
    let buckets_comfortable =
        rule.min_month_buckets == 0 || profile.month_buckets() > rule.min_month_buckets;
    let margin = if ideal_met && buckets_comfortable {
        AnswerMargin::Full
    } else {
        AnswerMargin::Borderline
    };

    RoutedQuestion {
        normalized,
        category: rule.category,
        answerable: true,
        reason: None,
        margin,
        required_roles: rule.required.to_vec(),
    }
}
