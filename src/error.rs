use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Classification degraded for '{item}': {reason}")]
    ClassificationDegraded { item: String, reason: String },

    #[error("Conservation violation in {taxonomy} view: {details}")]
    ConservationViolation { taxonomy: String, details: String },

    #[error("Accounting equation mismatch: assets ({assets}) != liabilities and equity ({liabilities_and_equity}), difference {difference}")]
    BalanceMismatch {
        assets: Decimal,
        liabilities_and_equity: Decimal,
        difference: Decimal,
    },

    #[error("Persistence conflict on statement {statement_id}: expected generation {expected:?}, found {found:?}")]
    PersistenceConflict {
        statement_id: Uuid,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Invalid state for statement {statement_id}: {details}")]
    InvalidState { statement_id: Uuid, details: String },

    #[error("Transformation of statement {0} was cancelled")]
    Cancelled(Uuid),

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl TransformError {
    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransformError::PersistenceConflict { .. } | TransformError::Cancelled(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TransformError>;
