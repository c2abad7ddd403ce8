use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Insufficient schema: {0}")]
    InsufficientSchema(String),

    #[error("Cannot answer ({category}): {reason}")]
    Unanswerable { category: String, reason: String },

    #[error("Provider attempt failed: {0}")]
    ProviderAttemptFailed(String),

    #[error("All providers exhausted after {attempts} attempts")]
    AllProvidersExhausted { attempts: u8 },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InsightError>;
