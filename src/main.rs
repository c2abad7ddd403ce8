use anyhow::{Context, Result};
use clap::Parser;
use insight_engine::config::{EngineConfig, ProviderConfig};
use insight_engine::dataset::{suggest_role_mapping, Dataset, RoleMapping, Value};
use insight_engine::cache::ResponseCache;
use insight_engine::session::Session;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "insight-engine")]
#[command(about = "Ask natural-language questions about tabular business data")]
struct Args {
    /// Path to the CSV file to analyze
    data: PathBuf,

    /// Question to ask; omit to print the profile and suggested questions
    question: Option<String>,

    /// Accept the suggested column-role mapping without interactive review
    #[arg(long)]
    accept_roles: bool,

    /// Write the full conversation log (JSON) to this path
    #[arg(long)]
    export: Option<PathBuf>,

    /// API key (or set INSIGHT_API_KEY)
    #[arg(long)]
    api_key: Option<String>,
}

/// Load a CSV into a column-oriented dataset, parsing each cell into the most
/// specific value type.
fn load_csv(path: &PathBuf) -> Result<Dataset> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("cannot open {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .context("cannot read CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record.context("cannot read CSV record")?;
        for (idx, cell) in record.iter().enumerate() {
            if idx < columns.len() {
                columns[idx].push(Value::parse(cell));
            }
        }
    }

    let pairs = headers.into_iter().zip(columns).collect();
    Ok(Dataset::from_columns(pairs)?)
}

/// Resolve provider configuration from the environment. The engine core only
/// consumes the resolved values.
fn resolve_config(api_key: Option<String>) -> EngineConfig {
    let api_key = api_key
        .or_else(|| std::env::var("INSIGHT_API_KEY").ok())
        .unwrap_or_default();
    let base_url = std::env::var("INSIGHT_API_BASE")
        .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string());

    let model = |var: &str, default: &str| std::env::var(var).unwrap_or_else(|_| default.to_string());

    EngineConfig {
        providers: vec![
            ProviderConfig::new(
                "primary",
                &base_url,
                &api_key,
                &model("INSIGHT_PRIMARY_MODEL", "openai/gpt-oss-20b:free"),
            ),
            ProviderConfig::new(
                "secondary",
                &base_url,
                &api_key,
                &model("INSIGHT_SECONDARY_MODEL", "deepseek/deepseek-chat-v3.1:free"),
            ),
            ProviderConfig::new(
                "tertiary",
                &base_url,
                &api_key,
                &model("INSIGHT_TERTIARY_MODEL", "mistralai/mistral-7b-instruct:free"),
            ),
        ],
        ..EngineConfig::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let dataset = load_csv(&args.data)?;
    info!(
        "loaded {} with {} rows, {} columns",
        args.data.display(),
        dataset.row_count(),
        dataset.columns().len()
    );

    let suggestions = suggest_role_mapping(dataset.columns());
    println!("Suggested column roles:");
    for s in &suggestions {
        println!(
            "  {} -> {} ({}, confidence {:.2})",
            s.column,
            s.role.label(),
            s.rationale,
            s.confidence
        );
    }
    if !args.accept_roles {
        println!("\nRe-run with --accept-roles to confirm this mapping and continue.");
        return Ok(());
    }
    let mapping = RoleMapping::from_suggestions(&suggestions);

    let config = resolve_config(args.api_key.clone());
    let cache = Arc::new(ResponseCache::new(config.cache_capacity));
    let mut session = Session::new(config, cache)?;

    let profile = session.load_dataset(dataset, mapping)?;
    println!(
        "\nClassified as '{}' at {} ({} rows, quality {}/100)",
        profile.business_type,
        profile.tier,
        profile.row_count,
        profile.quality.quality_score
    );

    match &args.question {
        Some(question) => {
            let result = session.ask(question).await?;
            println!("\n=== Answer ===");
            println!("{}", result.answer_text);
            println!(
                "\n[category: {} | tier: {} | confidence: {} ({:.2}) | provider: {} | cached: {}{}]",
                result.category.label(),
                result.tier,
                result.confidence_band.label(),
                result.confidence_score,
                result.provider_used,
                result.cached,
                if result.limited { " | limited" } else { "" }
            );
        }
        None => {
            println!("\nQuick facts:");
            for fact in session.profile().expect("dataset loaded").quick_facts() {
                println!("  - {}", fact);
            }
            println!("\nQuestions you could ask:");
            for question in session.suggest_questions().await {
                println!("  - {}", question);
            }
        }
    }

    if let Some(path) = &args.export {
        std::fs::write(path, session.export_context()?)
            .with_context(|| format!("cannot write {}", path.display()))?;
        println!("\nConversation exported to {}", path.display());
    }

    Ok(())
}
