//! Schema Classifier
//!
//! Pure function of the uploaded column-name set: assigns an analysis tier
//! (1-3) and a business-type label by best overlap against fixed per-domain
//! field groups. Tier requirements are cumulative, so Tier 3 always implies
//! Tier 1 and Tier 2.

use crate::error::{InsightError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Analysis tier unlocked by the columns present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
}

impl Tier {
    pub fn level(&self) -> u8 {
        match self {
            Tier::Tier1 => 1,
            Tier::Tier2 => 2,
            Tier::Tier3 => 3,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Tier::Tier1 => "essential",
            Tier::Tier2 => "enhanced",
            Tier::Tier3 => "advanced",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tier {}", self.level())
    }
}

/// Classification outcome: the highest tier whose cumulative field set is
/// fully satisfied, plus the business-type guess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierClassification {
    pub tier: Tier,
    pub business_type: String,
    /// Domain fields actually found in the column set.
    pub matched_fields: Vec<String>,
}

/// One business domain's tiered field groups. A field matches a column when a
/// normalized form of the column name equals any of the field's aliases.
struct DomainSpec {
    key: &'static str,
    /// Tier field groups, cumulative: index 0 is required for Tier 1, 0+1 for
    /// Tier 2, all three for Tier 3. Each field is a list of accepted aliases.
    tiers: [&'static [&'static [&'static str]]; 3],
}

const RETAIL: DomainSpec = DomainSpec {
    key: "retail",
    tiers: [
        &[&["date", "orderdate", "saledate"], &["product", "item", "sku"], &["amount", "sales", "revenue"]],
        &[&["customerid", "customer"], &["location", "region", "city"], &["channel"]],
        &[
            &["orderid"],
            &["storeid", "store"],
            &["gender"],
            &["age"],
            &["cost"],
            &["inventory", "stock"],
            &["isreturned", "returned"],
            &["feedback", "review"],
        ],
    ],
};

const RESTAURANT: DomainSpec = DomainSpec {
    key: "restaurant",
    tiers: [
        &[&["date", "orderdate"], &["menuitem", "dish"], &["amount", "sales", "revenue"]],
        &[&["customerid", "customer"], &["timeslot"], &["tableid", "table"]],
        &[&["orderid"], &["category"], &["cost"], &["rating"], &["waittime"]],
    ],
};

const REAL_ESTATE: DomainSpec = DomainSpec {
    key: "real_estate",
    tiers: [
        &[&["saledate", "date"], &["suburb", "location"], &["saleprice", "price"]],
        &[&["agent"], &["propertytype"]],
        &[&["bedrooms"], &["bathrooms"], &["landsize"], &["yearbuilt"], &["buyerid"]],
    ],
};

const DOMAINS: [&DomainSpec; 3] = [&RETAIL, &RESTAURANT, &REAL_ESTATE];

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn field_present(aliases: &[&str], columns: &HashSet<String>) -> bool {
    aliases.iter().any(|a| columns.contains(*a))
}

struct DomainMatch {
    key: &'static str,
    tier: Option<Tier>,
    overlap: usize,
    matched: Vec<String>,
    missing_tier1: Vec<String>,
}

fn match_domain(spec: &DomainSpec, columns: &HashSet<String>) -> DomainMatch {
    let mut overlap = 0;
    let mut matched = Vec::new();
    let mut tier_satisfied = [false; 3];

    for (idx, group) in spec.tiers.iter().enumerate() {
        let mut all_present = true;
        for field in group.iter() {
            if field_present(field, columns) {
                overlap += 1;
                matched.push(field[0].to_string());
            } else {
                all_present = false;
            }
        }
        tier_satisfied[idx] = all_present;
    }

    // Tier is cumulative: level k requires every group up to k.
    let tier = if tier_satisfied[0] && tier_satisfied[1] && tier_satisfied[2] {
        Some(Tier::Tier3)
    } else if tier_satisfied[0] && tier_satisfied[1] {
        Some(Tier::Tier2)
    } else if tier_satisfied[0] {
        Some(Tier::Tier1)
    } else {
        None
    };

    let missing_tier1 = spec.tiers[0]
        .iter()
        .filter(|field| !field_present(field, columns))
        .map(|field| field[0].to_string())
        .collect();

    DomainMatch {
        key: spec.key,
        tier,
        overlap,
        matched,
        missing_tier1,
    }
}

/// Classify a column-name set into (tier, business type).
///
/// Business type is chosen by best field overlap; ties are broken by the
/// highest tier satisfied. When two domains tie on both, the label falls back
/// to "generic" at the tied tier. Fails with `InsufficientSchema` when no
/// domain's Tier-1 field group is fully present.
pub fn classify(columns: &[String]) -> Result<TierClassification> {
    let normalized: HashSet<String> = columns.iter().map(|c| normalize(c)).collect();

    let matches: Vec<DomainMatch> = DOMAINS.iter().map(|d| match_domain(d, &normalized)).collect();

    let mut qualified: Vec<&DomainMatch> = matches.iter().filter(|m| m.tier.is_some()).collect();
    if qualified.is_empty() {
        // Name the closest domain's missing essentials so re-mapping is
        // actionable for the caller.
        let closest = matches
            .iter()
            .max_by_key(|m| m.overlap)
            .expect("at least one domain");
        return Err(InsightError::InsufficientSchema(format!(
            "no domain's essential fields are fully present; closest is '{}', missing: {}",
            closest.key,
            closest.missing_tier1.join(", ")
        )));
    }

    qualified.sort_by(|a, b| {
        b.overlap
            .cmp(&a.overlap)
            .then(b.tier.cmp(&a.tier))
    });

    let best = qualified[0];
    let tied = qualified
        .iter()
        .filter(|m| m.overlap == best.overlap && m.tier == best.tier)
        .count();

    let business_type = if tied > 1 {
        "generic".to_string()
    } else {
        best.key.to_string()
    };

    Ok(TierClassification {
        tier: best.tier.expect("qualified match has a tier"),
        business_type,
        matched_fields: best.matched.clone(),
    })
}
