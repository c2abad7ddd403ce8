//! Engine configuration
//!
//! Resolved values only: the core never reads the environment or loads
//! credentials itself. The binary (or whatever hosts the engine) resolves
//! endpoints, keys and bounds and hands them in here.

use crate::error::{InsightError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single AI provider handle in the fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name reported back in results (e.g. "primary")
    pub name: String,

    /// OpenAI-compatible chat-completions endpoint base URL
    pub base_url: String,

    /// API key for the endpoint
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// Sampling temperature. Fixed and low so repeated identical requests
    /// yield near-identical phrasing.
    pub temperature: f64,

    /// Response token bound
    pub max_tokens: u32,
}

impl ProviderConfig {
    pub fn new(name: &str, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: 0.2,
            max_tokens: 800,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Providers in fixed priority order: first is primary, the rest are
    /// fallbacks tried in sequence.
    pub providers: Vec<ProviderConfig>,

    /// Per-attempt timeout. Exceeding it counts as failure for that provider.
    pub attempt_timeout: Duration,

    /// Response cache capacity (entries); least-recently-used eviction.
    pub cache_capacity: usize,

    /// Number of recent conversation turns folded into each prompt.
    pub prompt_turns: usize,

    /// Upper bound on the in-memory conditioning window. The full turn log is
    /// still retained for export.
    pub context_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            attempt_timeout: Duration::from_secs(20),
            cache_capacity: 256,
            prompt_turns: 3,
            context_window: 50,
        }
    }
}

impl EngineConfig {
    /// Validate resolved values before the engine consumes them.
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(InsightError::Config(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.attempt_timeout.is_zero() {
            return Err(InsightError::Config(
                "attempt_timeout must be non-zero".to_string(),
            ));
        }
        for provider in &self.providers {
            if provider.base_url.is_empty() || provider.model.is_empty() {
                return Err(InsightError::Config(format!(
                    "provider '{}' is missing endpoint or model",
                    provider.name
                )));
            }
        }
        Ok(())
    }
}
