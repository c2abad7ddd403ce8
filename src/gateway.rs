//! Model Gateway
//!
//! Drives one structured request through a priority-ordered chain of AI
//! providers. Each attempt runs under a fixed timeout; transport errors,
//! malformed bodies, empty answers and timeouts all count as a failed attempt
//! and move straight to the next provider; the same provider is never
//! retried. When the chain is exhausted the caller substitutes a template
//! answer, so the engine always has something to return.

use crate::config::{EngineConfig, ProviderConfig};
use crate::context::ConversationTurn;
use crate::error::{InsightError, Result};
use crate::prompts;
use crate::router::QuestionCategory;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One question's worth of gateway input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub question: String,
    pub category: QuestionCategory,
    /// Pre-rendered slice of the SchemaProfile relevant to the question.
    pub profile_slice: String,
    /// Recent turns in chronological order.
    pub recent_turns: Vec<ConversationTurn>,
}

/// Successful gateway outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayReply {
    pub answer: String,
    pub provider: String,
    pub attempts: u8,
}

/// A single capability-equivalent AI provider handle.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Complete one prompt. Implementations fail with
    /// `ProviderAttemptFailed`; the gateway owns retry/fallback policy.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// OpenAI-compatible chat-completions provider over HTTP.
pub struct HttpProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ModelProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| InsightError::ProviderAttemptFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InsightError::ProviderAttemptFailed(format!(
                "provider returned status {}",
                status
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InsightError::ProviderAttemptFailed(format!("malformed body: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                InsightError::ProviderAttemptFailed("no content in response".to_string())
            })?;

        Ok(content.to_string())
    }
}

/// Priority-ordered fallback chain.
pub struct ModelGateway {
    providers: Vec<Box<dyn ModelProvider>>,
    attempt_timeout: Duration,
}

impl ModelGateway {
    pub fn new(providers: Vec<Box<dyn ModelProvider>>, attempt_timeout: Duration) -> Self {
        Self {
            providers,
            attempt_timeout,
        }
    }

    /// Build HTTP providers from resolved configuration, in priority order.
    pub fn from_config(config: &EngineConfig) -> Self {
        let providers = config
            .providers
            .iter()
            .map(|p| Box::new(HttpProvider::new(p.clone())) as Box<dyn ModelProvider>)
            .collect();
        Self::new(providers, config.attempt_timeout)
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Run the request through the chain. Fails with
    /// `AllProvidersExhausted` once every provider has had its one attempt.
    pub async fn generate(&self, request: &GatewayRequest) -> Result<GatewayReply> {
        let prompt = prompts::build_question_prompt(request);
        debug!("gateway prompt is {} chars", prompt.len());
        self.complete(prompts::ANALYST_SYSTEM_PROMPT, &prompt).await
    }

    /// Try a raw system/user prompt against the chain, in priority order.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<GatewayReply> {
        let mut attempts: u8 = 0;
        for provider in &self.providers {
            attempts += 1;
            let attempt =
                tokio::time::timeout(self.attempt_timeout, provider.complete(system, prompt))
                    .await;
            match attempt {
                Err(_) => {
                    warn!(
                        "provider '{}' timed out after {:?}, moving to next",
                        provider.name(),
                        self.attempt_timeout
                    );
                }
                Ok(Err(e)) => {
                    warn!("provider '{}' failed: {}, moving to next", provider.name(), e);
                }
                Ok(Ok(answer)) => {
                    let trimmed = answer.trim();
                    if trimmed.is_empty() {
                        warn!("provider '{}' returned an empty answer", provider.name());
                        continue;
                    }
                    info!(
                        "answer from provider '{}' on attempt {}",
                        provider.name(),
                        attempts
                    );
                    return Ok(GatewayReply {
                        answer: trimmed.to_string(),
                        provider: provider.name().to_string(),
                        attempts,
                    });
                }
            }
        }

        Err(InsightError::AllProvidersExhausted { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted provider for exercising the fallback chain.
    pub struct ScriptedProvider {
        name: String,
        outcome: ScriptedOutcome,
    }

    pub enum ScriptedOutcome {
        Answer(String),
        Empty,
        Fail,
        Hang,
    }

    impl ScriptedProvider {
        pub fn answering(name: &str, answer: &str) -> Box<dyn ModelProvider> {
            Box::new(Self {
                name: name.to_string(),
                outcome: ScriptedOutcome::Answer(answer.to_string()),
            })
        }

        pub fn failing(name: &str) -> Box<dyn ModelProvider> {
            Box::new(Self {
                name: name.to_string(),
                outcome: ScriptedOutcome::Fail,
            })
        }

        pub fn empty(name: &str) -> Box<dyn ModelProvider> {
            Box::new(Self {
                name: name.to_string(),
                outcome: ScriptedOutcome::Empty,
            })
        }

        pub fn hanging(name: &str) -> Box<dyn ModelProvider> {
            Box::new(Self {
                name: name.to_string(),
                outcome: ScriptedOutcome::Hang,
            })
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            match &self.outcome {
                ScriptedOutcome::Answer(a) => Ok(a.clone()),
                ScriptedOutcome::Empty => Ok("   ".to_string()),
                ScriptedOutcome::Fail => Err(InsightError::ProviderAttemptFailed(
                    "scripted failure".to_string(),
                )),
                ScriptedOutcome::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("hanging provider should be cancelled")
                }
            }
        }
    }

    fn request() -> GatewayRequest {
        GatewayRequest {
            question: "What are my top products?".to_string(),
            category: QuestionCategory::Statistical,
            profile_slice: "Business type: retail".to_string(),
            recent_turns: Vec::new(),
        }
    }

    #[tokio::test]
    async fn primary_success_uses_one_attempt() {
        let gateway = ModelGateway::new(
            vec![
                ScriptedProvider::answering("primary", "Revenue is up."),
                ScriptedProvider::answering("secondary", "unused"),
            ],
            Duration::from_secs(1),
        );
        let reply = gateway.generate(&request()).await.unwrap();
        assert_eq!(reply.provider, "primary");
        assert_eq!(reply.attempts, 1);
    }

    #[tokio::test]
    async fn failure_falls_through_in_priority_order() {
        let gateway = ModelGateway::new(
            vec![
                ScriptedProvider::failing("primary"),
                ScriptedProvider::answering("secondary", "Sales dipped in March."),
                ScriptedProvider::answering("tertiary", "unused"),
            ],
            Duration::from_secs(1),
        );
        let reply = gateway.generate(&request()).await.unwrap();
        assert_eq!(reply.provider, "secondary");
        assert_eq!(reply.attempts, 2);
    }

    #[tokio::test]
    async fn empty_answer_counts_as_failure() {
        let gateway = ModelGateway::new(
            vec![
                ScriptedProvider::empty("primary"),
                ScriptedProvider::answering("secondary", "Non-empty."),
            ],
            Duration::from_secs(1),
        );
        let reply = gateway.generate(&request()).await.unwrap();
        assert_eq!(reply.provider, "secondary");
        assert_eq!(reply.attempts, 2);
    }

    #[tokio::test]
    async fn timeout_cancels_attempt_and_moves_on() {
        let gateway = ModelGateway::new(
            vec![
                ScriptedProvider::hanging("primary"),
                ScriptedProvider::answering("secondary", "Done."),
            ],
            Duration::from_millis(20),
        );
        let reply = gateway.generate(&request()).await.unwrap();
        assert_eq!(reply.provider, "secondary");
        assert_eq!(reply.attempts, 2);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_attempts() {
        let gateway = ModelGateway::new(
            vec![
                ScriptedProvider::failing("primary"),
                ScriptedProvider::failing("secondary"),
                ScriptedProvider::failing("tertiary"),
            ],
            Duration::from_secs(1),
        );
        let err = gateway.generate(&request()).await.unwrap_err();
        match err {
            InsightError::AllProvidersExhausted { attempts } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {}", other),
        }
    }
}
