//! Session Engine
//!
//! Owns one user's dataset, profile and conversation, and drives the full
//! question flow: route → cache lookup → gateway (on miss) → confidence →
//! cache store → context append. The response cache is shared across
//! sessions; everything else is session-local and single-writer.

use crate::cache::{question_fingerprint, schema_fingerprint, CacheEntry, ResponseCache};
use crate::confidence::{score, ConfidenceBand, ScoreInputs};
use crate::config::EngineConfig;
use crate::context::{ConversationContext, ConversationTurn};
use crate::dataset::{Dataset, RoleMapping};
use crate::error::{InsightError, Result};
use crate::gateway::{GatewayRequest, ModelGateway};
use crate::profile::{build_profile, SchemaProfile};
use crate::prompts;
use crate::router::{route, QuestionCategory};
use crate::schema::{classify, Tier, TierClassification};
use chrono::Utc;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Structured result handed to the UI collaborator for each question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightResult {
    pub answer_text: String,
    pub category: QuestionCategory,
    pub tier: Tier,
    pub confidence_band: ConfidenceBand,
    pub confidence_score: f64,
    pub provider_used: String,
    pub cached: bool,
    /// True when the answer is the static template fallback.
    pub limited: bool,
}

struct SessionState {
    dataset: Dataset,
    classification: TierClassification,
    profile: SchemaProfile,
    schema_fp: String,
}

pub struct Session {
    id: String,
    config: EngineConfig,
    gateway: ModelGateway,
    cache: Arc<ResponseCache>,
    context: ConversationContext,
    state: Option<SessionState>,
}

impl Session {
    /// Create a session with HTTP providers built from the configuration.
    pub fn new(config: EngineConfig, cache: Arc<ResponseCache>) -> Result<Self> {
        config.validate()?;
        let gateway = ModelGateway::from_config(&config);
        Ok(Self::with_gateway(config, cache, gateway))
    }

    /// Create a session around an existing gateway (used by tests to inject
    /// scripted providers).
    pub fn with_gateway(config: EngineConfig, cache: Arc<ResponseCache>, gateway: ModelGateway) -> Self {
        let context = ConversationContext::new(config.context_window);
        Self {
            id: Uuid::new_v4().to_string(),
            config,
            gateway,
            cache,
            context,
            state: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Load a dataset with a confirmed role mapping. Classifies and profiles
    /// in one step; on success the previous conversation is cleared, since
    /// the schema fingerprint (and so the cache key space) has changed.
    pub fn load_dataset(&mut self, dataset: Dataset, mapping: RoleMapping) -> Result<&SchemaProfile> {
        let classification = classify(dataset.columns())?;
        info!(
            "dataset classified as {} ({}), {} rows",
            classification.business_type,
            classification.tier,
            dataset.row_count()
        );

        let profile = build_profile(&dataset, &classification, &mapping);
        let schema_fp = schema_fingerprint(dataset.columns(), classification.tier, dataset.row_count());

        self.context.clear();
        self.state = Some(SessionState {
            dataset,
            classification,
            profile,
            schema_fp,
        });
        Ok(&self.state.as_ref().expect("state just set").profile)
    }

    pub fn profile(&self) -> Option<&SchemaProfile> {
        self.state.as_ref().map(|s| &s.profile)
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.state.as_ref().map(|s| &s.dataset)
    }

    pub fn tier(&self) -> Option<Tier> {
        self.state.as_ref().map(|s| s.classification.tier)
    }

    /// Answer one question. Routing gates the AI call: unanswerable questions
    /// surface their missing-role reason and never reach a provider. When the
    /// whole provider chain fails, a template answer derived from the profile
    /// is returned flagged `limited`, so the caller always gets a response.
    pub async fn ask(&mut self, question: &str) -> Result<InsightResult> {
        let (routed, request, key, tier, coverage) = {
            let state = self.state.as_ref().ok_or_else(|| {
                InsightError::InsufficientSchema("no dataset loaded".to_string())
            })?;

            let routed = route(question, &state.profile);
            info!(
                "question routed to '{}', answerable: {}",
                routed.category.label(),
                routed.answerable
            );

            if !routed.answerable {
                return Err(InsightError::Unanswerable {
                    category: routed.category.label().to_string(),
                    reason: routed
                        .reason
                        .clone()
                        .unwrap_or_else(|| "required data is missing".to_string()),
                });
            }

            let coverage = state.profile.role_coverage(&routed.required_roles);
            let key = question_fingerprint(&routed.normalized, &state.schema_fp);
            let request = GatewayRequest {
                question: question.trim().to_string(),
                category: routed.category,
                profile_slice: prompts::profile_slice(&state.profile, &routed),
                recent_turns: self.context.recent_turns(self.config.prompt_turns).to_vec(),
            };
            (routed, request, key, state.classification.tier, coverage)
        };

        let gateway = &self.gateway;
        let margin = routed.margin;
        let outcome = self
            .cache
            .get_or_compute(&key, move || async move {
                let reply = gateway.generate(&request).await?;
                let (confidence, _) = score(&ScoreInputs {
                    tier,
                    margin,
                    attempts: reply.attempts,
                    cached: false,
                    coverage,
                    limited: false,
                });
                Ok(CacheEntry {
                    answer: reply.answer,
                    confidence,
                    provider: reply.provider,
                    created_at: Utc::now(),
                })
            })
            .await;

        let result = match outcome {
            Ok((entry, cached)) => {
                let (confidence_score, confidence_band) = if cached {
                    // Re-score for this ask: cached answers were previously
                    // validated as non-empty, which earns a small boost.
                    score(&ScoreInputs {
                        tier,
                        margin,
                        attempts: 1,
                        cached: true,
                        coverage,
                        limited: false,
                    })
                } else {
                    (entry.confidence, ConfidenceBand::from_score(entry.confidence))
                };
                InsightResult {
                    answer_text: entry.answer,
                    category: routed.category,
                    tier,
                    confidence_band,
                    confidence_score,
                    provider_used: entry.provider,
                    cached,
                    limited: false,
                }
            }
            Err(InsightError::AllProvidersExhausted { attempts }) => {
                // Availability contract: substitute a deterministic answer
                // computed from the profile alone.
                let state = self.state.as_ref().expect("state checked above");
                let answer = prompts::fallback_answer(&state.profile, routed.category);
                let (confidence_score, confidence_band) = score(&ScoreInputs {
                    tier,
                    margin,
                    attempts: attempts.max(1),
                    cached: false,
                    coverage,
                    limited: true,
                });
                InsightResult {
                    answer_text: answer,
                    category: routed.category,
                    tier,
                    confidence_band,
                    confidence_score,
                    provider_used: "template".to_string(),
                    cached: false,
                    limited: true,
                }
            }
            Err(e) => return Err(e),
        };

        self.context.append(ConversationTurn {
            question: question.trim().to_string(),
            category: result.category,
            answer: result.answer_text.clone(),
            confidence: result.confidence_score,
            timestamp: Utc::now(),
        });

        Ok(result)
    }

    /// Starter questions for the active dataset: AI-generated when a provider
    /// answers, otherwise the static per-domain list.
    pub async fn suggest_questions(&self) -> Vec<String> {
        let business_type = self
            .state
            .as_ref()
            .map(|s| s.profile.business_type.clone())
            .unwrap_or_else(|| "generic".to_string());

        if let Some(state) = &self.state {
            let prompt = prompts::question_generation_prompt(&state.profile);
            if let Ok(reply) = self
                .gateway
                .complete(prompts::ANALYST_SYSTEM_PROMPT, &prompt)
                .await
            {
                let questions: Vec<String> = reply
                    .answer
                    .lines()
                    .map(|l| l.trim().trim_start_matches(['-', '*', ' ']).to_string())
                    .filter(|l| !l.is_empty())
                    .unique()
                    .take(5)
                    .collect();
                if !questions.is_empty() {
                    return questions;
                }
            }
        }

        prompts::starter_questions(&business_type)
    }

    /// Full conversation log as JSON, untruncated.
    pub fn export_context(&self) -> Result<String> {
        Ok(self.context.export()?)
    }

    pub fn turn_count(&self) -> usize {
        self.context.len()
    }

    /// Drop the conversation, keeping the loaded dataset and profile.
    pub fn reset_conversation(&mut self) {
        self.context.clear();
    }
}
