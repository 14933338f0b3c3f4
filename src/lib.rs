//! # Statement Transformer
//!
//! Turns a raw trial-balance ledger into two statements of financial position:
//! a management (MCFO) view and a regulatory (IFRS-style) view.
//!
//! ## Core Concepts
//!
//! - **Line items**: account code, account name (English, Russian or Uzbek), an exact
//!   decimal amount, a top-level category and a free-text subcategory
//! - **Classifier cascade**: rule table, then an optional semantic oracle behind a
//!   timeout and circuit breaker, then a per-section default bucket. It never fails
//! - **Statement builders**: explicit trees whose totals come from one recursive fold.
//!   Every item lands in exactly one leaf of each view
//! - **Adjustments**: signed corrections folded into the regulatory view only
//! - **Persistence**: one stored view per (statement, format), replaced atomically
//!   under a generation check
//!
//! ## Example
//!
//! ```rust,ignore
//! use statement_transformer::*;
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let service = TransformationService::new(store, TransformConfig::default());
//! let statement = service
//!     .ingest_file(
//!         &CsvNormalizer::new(),
//!         Uuid::new_v4(),
//!         NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
//!         None,
//!         template_csv()?.as_bytes(),
//!         "ledger.csv",
//!     )
//!     .await?;
//!
//! let result = service.transform(statement.id).await?;
//! assert!(result.success);
//! ```

pub mod adjustments;
pub mod balance;
pub mod builders;
pub mod classifier;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod schema;
pub mod service;
pub mod store;
pub mod synonyms;
pub mod taxonomy;
pub mod tree;
pub mod utils;

#[cfg(feature = "gemini")]
pub mod llm;

pub use adjustments::{signed_amount, AdjustmentsLedger};
pub use balance::{
    verify_accounting_equation, BalanceCheck, BalanceCrossCheck, DEFAULT_BALANCE_EPSILON,
};
pub use builders::{BuiltView, IfrsBuilder, McfoBuilder};
pub use classifier::{
    Classification, ClassificationOracle, ClassificationTier, ClassifiedItem, Classifier,
    ClassifierCascade, DefaultClassifier, OracleAnswer, OracleClassifier, OracleRequest,
    RuleClassifier,
};
pub use config::{OracleConfig, TransformConfig};
pub use error::{Result, TransformError};
pub use normalizer::{template_csv, CsvNormalizer, NormalizedLedger, Normalizer};
pub use schema::*;
pub use service::{TransformationResult, TransformationService};
pub use store::{InMemoryStore, StatementStore};
pub use synonyms::SynonymTable;
pub use taxonomy::{LeafKey, ManagementBucket, Section, Term, VIEW_SCHEMA_VERSION};
