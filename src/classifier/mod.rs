//! Tiered classification of ledger lines into taxonomy leaves.
//!
//! The regulatory taxonomy is resolved by a fixed chain of [`Classifier`]s:
//! [`RuleClassifier`], then [`OracleClassifier`], then [`DefaultClassifier`].
//! The first tier that returns a leaf wins. A tier that fails returns an error,
//! which the [`ClassifierCascade`] records as a degraded classification before
//! moving on, so classification as a whole never fails.

pub mod cascade;
pub mod default;
pub mod oracle;
pub mod rules;

pub use cascade::{ClassifiedItem, ClassifierCascade};
pub use default::DefaultClassifier;
pub use oracle::{
    CircuitBreaker, ClassificationOracle, OracleAnswer, OracleClassifier, OracleRequest,
};
pub use rules::{Rule, RuleClassifier, BUILTIN_RULES};

use crate::error::Result;
use crate::schema::LineItem;
use crate::taxonomy::LeafKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationTier {
    Rule,
    Oracle,
    Default,
}

/// One strategy of the cascade.
#[async_trait]
pub trait Classifier: Send + Sync {
    fn tier(&self) -> ClassificationTier;

    /// `Ok(None)` means the tier has no opinion; `Err` means the tier tried and
    /// failed. Either way the cascade moves on to the next tier.
    async fn classify(&self, item: &LineItem) -> Result<Option<LeafKey>>;
}

/// Audit record of how one line item was placed in the regulatory view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub item_id: Uuid,
    pub account_name: String,
    pub leaf: LeafKey,
    pub tier: ClassificationTier,
    /// Why a higher tier could not resolve the item, when it tried and failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
}

impl Classification {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}
