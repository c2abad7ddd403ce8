//! Confidence Scorer
//!
//! Folds tier, answerability margin, fallback depth, cache state and data
//! coverage into a single score in [0, 1] plus a band. The monotonic
//! relationships are the contract: more fallback hops never raise the score,
//! higher tier and coverage never lower it, and a borderline margin is capped
//! below the high band.

use crate::router::AnswerMargin;
use crate::schema::Tier;
use serde::{Deserialize, Serialize};

const BASE: f64 = 0.30;
const TIER_WEIGHT: f64 = 0.15;
const COVERAGE_WEIGHT: f64 = 0.35;
const ATTEMPT_PENALTY: f64 = 0.10;
const CACHE_BONUS: f64 = 0.05;
const BORDERLINE_CAP: f64 = 0.75;
const LIMITED_CAP: f64 = 0.40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceBand::High => "high",
            ConfidenceBand::Medium => "medium",
            ConfidenceBand::Low => "low",
        }
    }

    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceBand::High
        } else if score >= 0.6 {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }
}

/// Inputs the scorer folds together for one answer.
#[derive(Debug, Clone)]
pub struct ScoreInputs {
    pub tier: Tier,
    pub margin: AnswerMargin,
    /// Provider attempts consumed (1 = primary answered).
    pub attempts: u8,
    pub cached: bool,
    /// Well-formed data ratio over the columns the answer depends on.
    pub coverage: f64,
    /// True when the answer is the static template fallback.
    pub limited: bool,
}

/// Score an answer. Weighting (recorded in DESIGN.md):
/// `0.30 + 0.15*(tier/3) + 0.35*coverage - 0.10*(attempts-1) + 0.05*[cached]`,
/// capped at 0.75 on borderline margin and 0.40 for limited answers,
/// clamped to [0, 1].
pub fn score(inputs: &ScoreInputs) -> (f64, ConfidenceBand) {
    let tier_factor = inputs.tier.level() as f64 / 3.0;
    let coverage = inputs.coverage.clamp(0.0, 1.0);
    let hops = inputs.attempts.saturating_sub(1) as f64;

    let mut value = BASE + TIER_WEIGHT * tier_factor + COVERAGE_WEIGHT * coverage
        - ATTEMPT_PENALTY * hops;
    if inputs.cached {
        value += CACHE_BONUS;
    }
    if inputs.margin == AnswerMargin::Borderline {
        value = value.min(BORDERLINE_CAP);
    }
    if inputs.limited {
        value = value.min(LIMITED_CAP);
    }
    let value = value.clamp(0.0, 1.0);
    (value, ConfidenceBand::from_score(value))
}
