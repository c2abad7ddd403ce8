//! End-to-end tests of the insight engine: classification, routing,
//! caching, fallback and the availability contract, driven through the
//! session surface with scripted providers.

use async_trait::async_trait;
use insight_engine::cache::ResponseCache;
use insight_engine::config::EngineConfig;
use insight_engine::confidence::ConfidenceBand;
use insight_engine::context::ConversationTurn;
use insight_engine::dataset::{ColumnRole, Dataset, RoleMapping, Value};
use insight_engine::error::{InsightError, Result};
use insight_engine::gateway::{ModelGateway, ModelProvider};
use insight_engine::router::QuestionCategory;
use insight_engine::schema::Tier;
use insight_engine::session::Session;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Provider that counts invocations and either answers or fails.
struct CountingProvider {
    name: String,
    answer: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl CountingProvider {
    fn answering(name: &str, answer: &str, calls: Arc<AtomicUsize>) -> Box<dyn ModelProvider> {
        Box::new(Self {
            name: name.to_string(),
            answer: Some(answer.to_string()),
            calls,
        })
    }

    fn failing(name: &str, calls: Arc<AtomicUsize>) -> Box<dyn ModelProvider> {
        Box::new(Self {
            name: name.to_string(),
            answer: None,
            calls,
        })
    }
}

#[async_trait]
impl ModelProvider for CountingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            Some(a) => Ok(a.clone()),
            None => Err(InsightError::ProviderAttemptFailed(
                "scripted failure".to_string(),
            )),
        }
    }
}

fn sales_dataset(rows: usize) -> (Dataset, RoleMapping) {
    let months = ["2024-01", "2024-02", "2024-03", "2024-04"];
    let dataset = Dataset::from_columns(vec![
        (
            "Date".to_string(),
            (0..rows)
                .map(|i| Value::parse(&format!("{}-{:02}", months[i % 4], (i % 27) + 1)))
                .collect(),
        ),
        (
            "Product".to_string(),
            (0..rows).map(|i| Value::Str(format!("P{}", i % 5))).collect(),
        ),
        (
            "Amount".to_string(),
            (0..rows).map(|i| Value::Number(25.0 + i as f64)).collect(),
        ),
    ])
    .unwrap();

    let mut mapping = RoleMapping::new();
    mapping.assign("Date", ColumnRole::Temporal);
    mapping.assign("Product", ColumnRole::Dimension);
    mapping.assign("Amount", ColumnRole::Measure);
    (dataset, mapping)
}

fn session_with(
    providers: Vec<Box<dyn ModelProvider>>,
    cache: Arc<ResponseCache>,
) -> Session {
    let config = EngineConfig::default();
    let gateway = ModelGateway::new(providers, Duration::from_secs(1));
    Session::with_gateway(config, cache, gateway)
}

#[tokio::test]
async fn fifty_row_sales_file_is_tier_one_and_answerable() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(ResponseCache::new(16));
    let mut session = session_with(
        vec![CountingProvider::answering("primary", "P0 leads.", Arc::clone(&calls))],
        cache,
    );

    let (dataset, mapping) = sales_dataset(50);
    session.load_dataset(dataset, mapping).unwrap();
    assert_eq!(session.tier(), Some(Tier::Tier1));

    let result = session.ask("What are my top products?").await.unwrap();
    assert_eq!(result.category, QuestionCategory::Statistical);
    assert_eq!(result.tier, Tier::Tier1);
    assert_eq!(result.provider_used, "primary");
    assert!(!result.cached);
    assert!(!result.limited);
}

#[tokio::test]
async fn insufficient_schema_blocks_everything() {
    let cache = Arc::new(ResponseCache::new(16));
    let mut session = session_with(vec![], cache);

    let dataset = Dataset::from_columns(vec![
        (
            "Notes".to_string(),
            vec![Value::Str("a".into()), Value::Str("b".into())],
        ),
        (
            "Count".to_string(),
            vec![Value::Number(1.0), Value::Number(2.0)],
        ),
    ])
    .unwrap();

    let result = session.load_dataset(dataset, RoleMapping::new());
    assert!(matches!(result, Err(InsightError::InsufficientSchema(_))));
    assert!(session.profile().is_none());

    let err = session.ask("overview please").await.unwrap_err();
    assert!(matches!(err, InsightError::InsufficientSchema(_)));
}

#[tokio::test]
async fn cache_law_one_gateway_call_for_identical_questions() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(ResponseCache::new(16));
    let mut session = session_with(
        vec![CountingProvider::answering("primary", "Total is 1200.", Arc::clone(&calls))],
        cache,
    );

    let (dataset, mapping) = sales_dataset(40);
    session.load_dataset(dataset, mapping).unwrap();

    let first = session.ask("What is the total amount?").await.unwrap();
    // Different surface form, same normalized question.
    let second = session.ask("What is the TOTAL amount??").await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.answer_text, first.answer_text);
    // The cache boost keeps the repeat at or above the original confidence.
    assert!(second.confidence_score >= first.confidence_score);
}

#[tokio::test]
async fn cache_is_shared_across_sessions() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(ResponseCache::new(16));

    let mut first_session = session_with(
        vec![CountingProvider::answering("primary", "Shared.", Arc::clone(&calls))],
        Arc::clone(&cache),
    );
    let mut second_session = session_with(
        vec![CountingProvider::answering("primary", "Shared.", Arc::clone(&calls))],
        Arc::clone(&cache),
    );

    let (dataset, mapping) = sales_dataset(40);
    first_session.load_dataset(dataset, mapping).unwrap();
    let (dataset, mapping) = sales_dataset(40);
    second_session.load_dataset(dataset, mapping).unwrap();

    first_session.ask("What is the total amount?").await.unwrap();
    let repeat = second_session.ask("What is the total amount?").await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(repeat.cached);
}

#[tokio::test]
async fn fallback_reports_the_provider_that_answered() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(ResponseCache::new(16));
    let mut session = session_with(
        vec![
            CountingProvider::failing("primary", Arc::clone(&calls)),
            CountingProvider::answering("secondary", "Recovered.", Arc::clone(&calls)),
        ],
        cache,
    );

    let (dataset, mapping) = sales_dataset(30);
    session.load_dataset(dataset, mapping).unwrap();

    let result = session.ask("What is the average amount?").await.unwrap();
    assert_eq!(result.provider_used, "secondary");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!result.limited);
}

#[tokio::test]
async fn exhausted_providers_still_yield_an_answer() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(ResponseCache::new(16));
    let mut session = session_with(
        vec![
            CountingProvider::failing("primary", Arc::clone(&calls)),
            CountingProvider::failing("secondary", Arc::clone(&calls)),
            CountingProvider::failing("tertiary", Arc::clone(&calls)),
        ],
        cache,
    );

    let (dataset, mapping) = sales_dataset(30);
    session.load_dataset(dataset, mapping).unwrap();

    let result = session.ask("Give me an overview of the data").await.unwrap();
    assert!(!result.answer_text.trim().is_empty());
    assert!(result.limited);
    assert_eq!(result.provider_used, "template");
    assert_eq!(result.confidence_band, ConfidenceBand::Low);

    // Limited answers are not memoized: a later ask retries the chain.
    let again = session.ask("Give me an overview of the data").await.unwrap();
    assert!(again.limited);
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn trend_question_requires_two_month_buckets() {
    let cache = Arc::new(ResponseCache::new(16));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut session = session_with(
        vec![CountingProvider::answering("primary", "Up and to the right.", Arc::clone(&calls))],
        cache,
    );

    // Single month of history.
    let dataset = Dataset::from_columns(vec![
        (
            "Date".to_string(),
            vec![Value::parse("2024-01-03"), Value::parse("2024-01-21")],
        ),
        (
            "Product".to_string(),
            vec![Value::Str("A".into()), Value::Str("B".into())],
        ),
        (
            "Amount".to_string(),
            vec![Value::Number(5.0), Value::Number(9.0)],
        ),
    ])
    .unwrap();
    let mut mapping = RoleMapping::new();
    mapping.assign("Date", ColumnRole::Temporal);
    mapping.assign("Product", ColumnRole::Dimension);
    mapping.assign("Amount", ColumnRole::Measure);
    session.load_dataset(dataset, mapping).unwrap();

    let err = session.ask("Show me sales trends by month").await.unwrap_err();
    match err {
        InsightError::Unanswerable { reason, .. } => {
            assert_eq!(reason, "insufficient temporal granularity");
        }
        other => panic!("unexpected error: {}", other),
    }
    // The router gate means no provider was ever consulted.
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let (dataset, mapping) = sales_dataset(30);
    session.load_dataset(dataset, mapping).unwrap();
    let result = session.ask("Show me sales trends by month").await.unwrap();
    assert_eq!(result.category, QuestionCategory::Trend);
}

#[tokio::test]
async fn sentiment_question_names_missing_feedback_role() {
    let cache = Arc::new(ResponseCache::new(16));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut session = session_with(
        vec![CountingProvider::answering("primary", "unused", Arc::clone(&calls))],
        cache,
    );

    let (dataset, mapping) = sales_dataset(30);
    session.load_dataset(dataset, mapping).unwrap();

    let err = session
        .ask("How do customers feel about our products?")
        .await
        .unwrap_err();
    match err {
        InsightError::Unanswerable { reason, .. } => {
            assert!(reason.contains("free-text/feedback"), "reason: {}", reason);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn context_accumulates_and_exports_in_full() {
    let cache = Arc::new(ResponseCache::new(16));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut session = session_with(
        vec![CountingProvider::answering("primary", "Noted.", Arc::clone(&calls))],
        cache,
    );

    let (dataset, mapping) = sales_dataset(30);
    session.load_dataset(dataset, mapping).unwrap();

    for question in [
        "What is the total amount?",
        "What is the average amount?",
        "Which product is best?",
    ] {
        session.ask(question).await.unwrap();
    }
    assert_eq!(session.turn_count(), 3);

    let exported = session.export_context().unwrap();
    let turns: Vec<ConversationTurn> = serde_json::from_str(&exported).unwrap();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[0].question, "What is the total amount?");
    assert!(turns.iter().all(|t| !t.answer.is_empty()));
}

#[tokio::test]
async fn new_dataset_resets_conversation_and_cache_keys() {
    let cache = Arc::new(ResponseCache::new(16));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut session = session_with(
        vec![CountingProvider::answering("primary", "Answer.", Arc::clone(&calls))],
        cache,
    );

    let (dataset, mapping) = sales_dataset(30);
    session.load_dataset(dataset, mapping).unwrap();
    session.ask("What is the total amount?").await.unwrap();
    assert_eq!(session.turn_count(), 1);

    // A differently shaped dataset: fingerprints change, context resets.
    let dataset = Dataset::from_columns(vec![
        (
            "Date".to_string(),
            vec![Value::parse("2024-05-01"), Value::parse("2024-06-01")],
        ),
        (
            "Product".to_string(),
            vec![Value::Str("X".into()), Value::Str("Y".into())],
        ),
        (
            "Amount".to_string(),
            vec![Value::Number(1.0), Value::Number(2.0)],
        ),
        (
            "Channel".to_string(),
            vec![Value::Str("web".into()), Value::Str("store".into())],
        ),
    ])
    .unwrap();
    let mut mapping = RoleMapping::new();
    mapping.assign("Date", ColumnRole::Temporal);
    mapping.assign("Product", ColumnRole::Dimension);
    mapping.assign("Amount", ColumnRole::Measure);
    mapping.assign("Channel", ColumnRole::Dimension);
    session.load_dataset(dataset, mapping).unwrap();

    assert_eq!(session.turn_count(), 0);
    let result = session.ask("What is the total amount?").await.unwrap();
    // Different schema fingerprint: no stale hit from the previous dataset.
    assert!(!result.cached);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn suggested_questions_fall_back_to_static_list() {
    let cache = Arc::new(ResponseCache::new(16));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut session = session_with(
        vec![CountingProvider::failing("primary", Arc::clone(&calls))],
        cache,
    );

    let (dataset, mapping) = sales_dataset(30);
    session.load_dataset(dataset, mapping).unwrap();

    let questions = session.suggest_questions().await;
    assert!(!questions.is_empty());
    assert!(questions.iter().any(|q| q.contains("top-performing")));
}
