//! Dataset model and column-role mapping
//!
//! A dataset is immutable once constructed: an ordered set of named columns,
//! each holding a sequence of typed values. Column roles are never guessed
//! silently: `suggest_role_mapping` returns explicit suggestions with a
//! rationale, and the caller confirms them into a `RoleMapping`.

use crate::error::{InsightError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strsim::jaro_winkler;

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Str(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
    Null,
}

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y", "%m/%d/%Y"];

/// Parse a raw string as a date using the accepted formats.
pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

impl Value {
    /// Parse a raw text cell into the most specific value type.
    /// Empty and whitespace-only cells become `Null`.
    pub fn parse(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if let Ok(n) = trimmed.parse::<f64>() {
            return Value::Number(n);
        }
        if let Some(d) = parse_date_str(trimmed) {
            return Value::Date(d);
        }
        match trimmed.to_lowercase().as_str() {
            "true" | "yes" => Value::Bool(true),
            "false" | "no" => Value::Bool(false),
            _ => Value::Str(trimmed.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Date view of the value. String cells are re-parsed so that temporal
    /// columns ingested as text still profile correctly.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Str(s) => parse_date_str(s),
            _ => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Number(n) => format!("{}", n),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => "null".to_string(),
        }
    }
}

/// Column-oriented dataset, immutable once loaded.
#[derive(Debug, Clone)]
pub struct Dataset {
    columns: Vec<String>,
    cells: HashMap<String, Vec<Value>>,
    row_count: usize,
}

impl Dataset {
    /// Build a dataset from ordered (column, values) pairs. All columns must
    /// have the same length.
    pub fn from_columns(columns: Vec<(String, Vec<Value>)>) -> Result<Self> {
        if columns.is_empty() {
            return Err(InsightError::Dataset("dataset has no columns".to_string()));
        }
        let row_count = columns[0].1.len();
        let mut names = Vec::with_capacity(columns.len());
        let mut cells = HashMap::with_capacity(columns.len());
        for (name, values) in columns {
            if values.len() != row_count {
                return Err(InsightError::Dataset(format!(
                    "column '{}' has {} rows, expected {}",
                    name,
                    values.len(),
                    row_count
                )));
            }
            if cells.contains_key(&name) {
                return Err(InsightError::Dataset(format!("duplicate column '{}'", name)));
            }
            names.push(name.clone());
            cells.insert(name, values);
        }
        Ok(Self {
            columns: names,
            cells,
            row_count,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.cells.get(name).map(|v| v.as_slice())
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }
}

/// Inferred semantic role of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnRole {
    Identifier,
    Measure,
    Dimension,
    Temporal,
    FreeText,
    Flag,
}

impl ColumnRole {
    /// Human-facing role name, used in unanswerable reasons.
    pub fn label(&self) -> &'static str {
        match self {
            ColumnRole::Identifier => "identifier",
            ColumnRole::Measure => "measure",
            ColumnRole::Dimension => "dimension",
            ColumnRole::Temporal => "temporal",
            ColumnRole::FreeText => "free-text/feedback",
            ColumnRole::Flag => "categorical-flag",
        }
    }
}

/// Confirmed column-to-role mapping, supplied by the ingestion collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleMapping {
    roles: HashMap<String, ColumnRole>,
}

impl RoleMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, column: &str, role: ColumnRole) {
        self.roles.insert(column.to_string(), role);
    }

    pub fn role_of(&self, column: &str) -> Option<ColumnRole> {
        self.roles.get(column).copied()
    }

    /// Columns carrying the given role, in no particular order.
    pub fn columns_with(&self, role: ColumnRole) -> Vec<&str> {
        self.roles
            .iter()
            .filter(|(_, r)| **r == role)
            .map(|(c, _)| c.as_str())
            .collect()
    }

    pub fn has_role(&self, role: ColumnRole) -> bool {
        self.roles.values().any(|r| *r == role)
    }

    /// Accept a set of suggestions wholesale. This is the caller's explicit
    /// confirmation step; the engine never applies suggestions on its own.
    pub fn from_suggestions(suggestions: &[MappingSuggestion]) -> Self {
        let mut mapping = Self::new();
        for s in suggestions {
            mapping.assign(&s.column, s.role);
        }
        mapping
    }
}

/// A role guess for one column, surfaced for user confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingSuggestion {
    pub column: String,
    pub role: ColumnRole,
    /// Why the role was suggested (name pattern or similarity match).
    pub rationale: String,
    /// 0.0-1.0 strength of the guess.
    pub confidence: f64,
}

struct RolePattern {
    role: ColumnRole,
    keywords: &'static [&'static str],
    canonical: &'static [&'static str],
}

const ROLE_PATTERNS: [RolePattern; 5] = [
    RolePattern {
        role: ColumnRole::Temporal,
        keywords: &["date", "time", "timestamp", "month", "year", "day", "created"],
        canonical: &["date", "orderdate", "saledate", "timestamp"],
    },
    RolePattern {
        role: ColumnRole::Measure,
        keywords: &[
            "amount", "price", "total", "revenue", "cost", "value", "sales", "profit", "qty",
            "quantity", "inventory", "age", "rating",
        ],
        canonical: &["amount", "price", "revenue", "cost", "quantity"],
    },
    RolePattern {
        role: ColumnRole::FreeText,
        keywords: &["feedback", "review", "comment", "note", "description", "remarks"],
        canonical: &["feedback", "review", "comment"],
    },
    RolePattern {
        role: ColumnRole::Flag,
        keywords: &["flag", "returned", "active", "deleted", "cancelled"],
        canonical: &["isreturned", "isactive", "flag"],
    },
    RolePattern {
        role: ColumnRole::Dimension,
        keywords: &[
            "product", "item", "menu", "category", "location", "region", "city", "channel",
            "store", "gender", "segment", "type",
        ],
        canonical: &["product", "location", "channel", "category"],
    },
];

const SIMILARITY_THRESHOLD: f64 = 0.88;

fn normalize_column(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Suggest a role for each column from its name. Pure name-based heuristics:
/// keyword containment first, then fuzzy similarity against canonical field
/// names for misspelled headers. Every suggestion carries its rationale so the
/// caller can present and override it.
pub fn suggest_role_mapping(columns: &[String]) -> Vec<MappingSuggestion> {
    columns
        .iter()
        .map(|column| {
            let normalized = normalize_column(column);

            // Identifier check first: "...id" headers are identifiers, not
            // dimensions, even when they also contain a dimension keyword.
            if normalized == "id" || normalized.ends_with("id") {
                return MappingSuggestion {
                    column: column.clone(),
                    role: ColumnRole::Identifier,
                    rationale: "column name ends with 'id'".to_string(),
                    confidence: 0.9,
                };
            }
            if normalized.starts_with("is") || normalized.starts_with("has") {
                return MappingSuggestion {
                    column: column.clone(),
                    role: ColumnRole::Flag,
                    rationale: "boolean-style 'is'/'has' prefix".to_string(),
                    confidence: 0.85,
                };
            }

            for pattern in &ROLE_PATTERNS {
                if let Some(kw) = pattern.keywords.iter().find(|kw| normalized.contains(*kw)) {
                    return MappingSuggestion {
                        column: column.clone(),
                        role: pattern.role,
                        rationale: format!("column name contains '{}'", kw),
                        confidence: 0.9,
                    };
                }
            }

            // Fuzzy pass for headers close to a canonical field name.
            let mut best: Option<(ColumnRole, &str, f64)> = None;
            for pattern in &ROLE_PATTERNS {
                for canonical in pattern.canonical {
                    let score = jaro_winkler(&normalized, canonical);
                    if score >= SIMILARITY_THRESHOLD
                        && best.map(|(_, _, s)| score > s).unwrap_or(true)
                    {
                        best = Some((pattern.role, canonical, score));
                    }
                }
            }
            if let Some((role, canonical, score)) = best {
                return MappingSuggestion {
                    column: column.clone(),
                    role,
                    rationale: format!("similar to known field '{}'", canonical),
                    confidence: score,
                };
            }

            MappingSuggestion {
                column: column.clone(),
                role: ColumnRole::Dimension,
                rationale: "no known pattern; defaulting to dimension".to_string(),
                confidence: 0.4,
            }
        })
        .collect()
}
