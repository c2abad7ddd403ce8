//! Prompt assembly and static fallback answers
//!
//! Renders gateway requests into provider prompts, and builds the
//! deterministic template answers used when every provider is exhausted.
//! The templates read only from the SchemaProfile; no AI involved.

use crate::dataset::ColumnRole;
use crate::gateway::GatewayRequest;
use crate::profile::SchemaProfile;
use crate::router::{QuestionCategory, RoutedQuestion};

/// System prompt shared by every provider attempt.
pub const ANALYST_SYSTEM_PROMPT: &str = r#"You are a senior business analyst answering questions about a single uploaded dataset.

RULES:
- Ground every statement in the DATA CONTEXT section; never invent columns or values.
- Use the same analytical framing for similar data patterns so repeated questions get consistent answers.
- Be concise and business-actionable.

RESPONSE FORMAT:
1. Key finding (1-2 sentences)
2. Business impact (quantified when possible)
3. Recommended next steps (2-3 bullets)"#;

/// Domain framing folded into prompts for consistency across questions.
pub fn business_context(business_type: &str) -> &'static str {
    match business_type {
        "retail" => "Retail/e-commerce business. Primary metrics: revenue, profit margin, customer acquisition, retention.",
        "restaurant" => "Restaurant/food-service business. Primary metrics: menu performance, covers, average spend, satisfaction.",
        "real_estate" => "Real-estate business. Primary metrics: sale prices, market trends, agent performance, time on market.",
        _ => "General business dataset. Primary metrics: totals, averages and distribution of the measures present.",
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

/// Render the slice of the profile relevant to a routed question. Overview
/// and quality questions see every column; other categories see the columns
/// carrying the roles the answer depends on.
pub fn profile_slice(profile: &SchemaProfile, routed: &RoutedQuestion) -> String {
    let relevant_roles: Vec<ColumnRole> = match routed.category {
        QuestionCategory::Overview | QuestionCategory::Quality => Vec::new(),
        _ => {
            let mut roles = routed.required_roles.clone();
            // Measures carry the numbers an answer cites; dimensions give it
            // grouping context.
            if !roles.contains(&ColumnRole::Measure) {
                roles.push(ColumnRole::Measure);
            }
            if !roles.contains(&ColumnRole::Dimension) {
                roles.push(ColumnRole::Dimension);
            }
            roles
        }
    };

    let mut lines = Vec::new();
    lines.push(format!(
        "Business type: {} ({}, {} rows)",
        profile.business_type, profile.tier, profile.row_count
    ));
    lines.push(business_context(&profile.business_type).to_string());

    for column in &profile.columns {
        if !relevant_roles.is_empty() && !relevant_roles.contains(&column.role) {
            continue;
        }
        let mut line = format!(
            "- {} [{}]: {} non-null, {} distinct",
            column.name,
            column.role.label(),
            column.count,
            column.distinct_count
        );
        if let Some(stats) = &column.numeric {
            line.push_str(&format!(
                ", total {:.2}, mean {:.2}, range {:.2}..{:.2}",
                stats.sum, stats.mean, stats.min, stats.max
            ));
        }
        if let Some(stats) = &column.temporal {
            line.push_str(&format!(
                ", {} to {}, {} cadence, {} month(s)",
                stats.earliest,
                stats.latest,
                stats.granularity.label(),
                stats.month_buckets
            ));
        }
        if !column.top_values.is_empty() {
            let top: Vec<String> = column
                .top_values
                .iter()
                .take(3)
                .map(|t| format!("{} ({})", t.value, t.count))
                .collect();
            line.push_str(&format!(", top: {}", top.join(", ")));
        }
        lines.push(line);
    }

    if matches!(routed.category, QuestionCategory::Quality | QuestionCategory::Overview) {
        lines.push(format!(
            "Data quality score: {}/100; missing cells {:.1}%; duplicate rows {}",
            profile.quality.quality_score,
            profile.quality.missing_ratio * 100.0,
            profile.quality.duplicate_rows
        ));
        for issue in &profile.quality.issues {
            lines.push(format!("Quality issue: {}", issue));
        }
    }

    lines.join("\n")
}

/// Render the full provider prompt for one request.
pub fn build_question_prompt(request: &GatewayRequest) -> String {
    let mut parts = Vec::new();

    parts.push(format!("USER QUESTION: \"{}\"", request.question));
    parts.push(format!("QUESTION CATEGORY: {}", request.category.label()));
    parts.push(format!("DATA CONTEXT:\n{}", request.profile_slice));

    if !request.recent_turns.is_empty() {
        parts.push("CONVERSATION SO FAR (oldest first):".to_string());
        for turn in &request.recent_turns {
            parts.push(format!(
                "Q: {}\nA: {}",
                turn.question,
                truncate(&turn.answer, 200)
            ));
        }
    }

    parts.push(
        "Answer the question using only the data context above. If the context cannot support a precise number, say what can be concluded and what data would sharpen it."
            .to_string(),
    );

    parts.join("\n\n")
}

/// Prompt asking a provider for starter questions tailored to the dataset.
pub fn question_generation_prompt(profile: &SchemaProfile) -> String {
    let columns: Vec<String> = profile
        .columns
        .iter()
        .map(|c| format!("{} [{}]", c.name, c.role.label()))
        .collect();
    format!(
        "Suggest 5 specific business questions a non-technical user could ask about this dataset. \
One question per line, no numbering.\n\nBusiness type: {}\nColumns: {}\nRows: {}",
        profile.business_type,
        columns.join(", "),
        profile.row_count
    )
}

/// Static starter questions per business type, used when no provider answers.
pub fn starter_questions(business_type: &str) -> Vec<String> {
    let questions: &[&str] = match business_type {
        "retail" => &[
            "What are the top-performing products by revenue?",
            "How have sales changed over time?",
            "What is the average order value?",
            "Which locations bring in the most revenue?",
            "Are there data quality issues I should fix?",
        ],
        "restaurant" => &[
            "Which menu items sell best?",
            "How does revenue change month over month?",
            "What is the average spend per order?",
            "Which time slots are busiest?",
            "Are there data quality issues I should fix?",
        ],
        "real_estate" => &[
            "Which suburbs have the highest sale prices?",
            "How have prices moved over time?",
            "What is the average sale price?",
            "Which agents close the most sales?",
            "Are there data quality issues I should fix?",
        ],
        _ => &[
            "Give me an overview of this dataset.",
            "What are the totals and averages of the main measures?",
            "How do the values change over time?",
            "Which categories stand out?",
            "Are there data quality issues I should fix?",
        ],
    };
    questions.iter().map(|q| q.to_string()).collect()
}

/// Deterministic answer derived from the profile alone. Used when all
/// providers fail so the caller still receives a grounded response.
pub fn fallback_answer(profile: &SchemaProfile, category: QuestionCategory) -> String {
    let mut lines = Vec::new();
    lines.push(
        "AI analysis is temporarily unavailable; here is a limited summary computed directly from your data."
            .to_string(),
    );

    match category {
        QuestionCategory::Quality => {
            lines.push(format!(
                "Data quality score: {}/100.",
                profile.quality.quality_score
            ));
            if profile.quality.issues.is_empty() {
                lines.push("No notable quality issues were detected.".to_string());
            }
            for issue in &profile.quality.issues {
                lines.push(format!("Issue: {}", issue));
            }
            for rec in &profile.quality.recommendations {
                lines.push(format!("Recommendation: {}", rec));
            }
        }
        QuestionCategory::Trend | QuestionCategory::Prediction => {
            for column in profile.columns_with_role(ColumnRole::Temporal) {
                if let Some(stats) = &column.temporal {
                    lines.push(format!(
                        "{} spans {} to {} at {} cadence ({} month(s) of history).",
                        column.name,
                        stats.earliest,
                        stats.latest,
                        stats.granularity.label(),
                        stats.month_buckets
                    ));
                }
            }
            for column in profile.columns_with_role(ColumnRole::Measure) {
                if let Some(stats) = &column.numeric {
                    lines.push(format!(
                        "{} totals {:.2} with a mean of {:.2} per record.",
                        column.name, stats.sum, stats.mean
                    ));
                }
            }
        }
        _ => {
            for fact in profile.quick_facts().into_iter().take(6) {
                lines.push(fact);
            }
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, RoleMapping, Value};
    use crate::profile::build_profile;
    use crate::router::route;
    use crate::schema::classify;

    fn profile() -> SchemaProfile {
        let dataset = Dataset::from_columns(vec![
            (
                "Date".to_string(),
                vec![Value::parse("2024-01-01"), Value::parse("2024-02-01")],
            ),
            (
                "Product".to_string(),
                vec![Value::Str("A".into()), Value::Str("B".into())],
            ),
            (
                "Amount".to_string(),
                vec![Value::Number(10.0), Value::Number(20.0)],
            ),
        ])
        .unwrap();
        let classification = classify(dataset.columns()).unwrap();
        let mut mapping = RoleMapping::new();
        mapping.assign("Date", ColumnRole::Temporal);
        mapping.assign("Product", ColumnRole::Dimension);
        mapping.assign("Amount", ColumnRole::Measure);
        build_profile(&dataset, &classification, &mapping)
    }

    #[test]
    fn statistical_slice_keeps_relevant_columns_only() {
        let profile = profile();
        let routed = route("What is the total amount?", &profile);
        let slice = profile_slice(&profile, &routed);
        assert!(slice.contains("Amount"));
        assert!(slice.contains("Product"));
        assert!(!slice.contains("- Date"));
    }

    #[test]
    fn fallback_answer_is_non_empty_for_every_category() {
        let profile = profile();
        for category in [
            QuestionCategory::Overview,
            QuestionCategory::Statistical,
            QuestionCategory::Trend,
            QuestionCategory::Comparison,
            QuestionCategory::Prediction,
            QuestionCategory::Quality,
        ] {
            let answer = fallback_answer(&profile, category);
            assert!(!answer.trim().is_empty());
            assert!(answer.contains("limited"));
        }
    }

    #[test]
    fn starter_questions_cover_unknown_domains() {
        assert_eq!(starter_questions("retail").len(), 5);
        assert!(!starter_questions("something_else").is_empty());
    }
}
