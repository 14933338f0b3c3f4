use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::balance::BalanceCheck;
use crate::classifier::Classification;
use crate::error::{Result, TransformError};

/// Maximum length of an adjustment description.
pub const MAX_DESCRIPTION_LEN: usize = 255;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Assets,
    Liabilities,
    Equity,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Assets, Category::Liabilities, Category::Equity];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Assets => "assets",
            Category::Liabilities => "liabilities",
            Category::Equity => "equity",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatementStatus {
    Draft,
    Submitted,
    Transformed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ViewFormat {
    /// Management-accounting (MCFO) layout.
    Management,
    /// IFRS-style statement of financial position.
    Regulatory,
}

impl fmt::Display for ViewFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewFormat::Management => f.write_str("management"),
            ViewFormat::Regulatory => f.write_str("regulatory"),
        }
    }
}

/// A ledger line as produced by a normalizer, before it is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewLineItem {
    pub account_code: String,
    pub account_name: String,
    pub amount: Decimal,
    pub category: Category,
    #[serde(default)]
    pub subcategory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub id: Uuid,
    pub statement_id: Uuid,
    pub account_code: String,
    pub account_name: String,
    pub amount: Decimal,
    pub category: Category,
    pub subcategory: Option<String>,
}

impl LineItem {
    pub fn from_new(statement_id: Uuid, item: NewLineItem) -> Self {
        Self {
            id: Uuid::new_v4(),
            statement_id,
            account_code: item.account_code,
            account_name: item.account_name,
            amount: item.amount,
            category: item.category,
            subcategory: item.subcategory,
        }
    }

    pub fn subcategory_text(&self) -> &str {
        self.subcategory.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Statement {
    pub id: Uuid,
    pub company_id: Uuid,
    pub period: NaiveDate,
    pub status: StatementStatus,
    pub notes: Option<String>,
    /// Balance check captured at ingestion.
    pub balance_check: BalanceCheck,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentDirection {
    Debit,
    Credit,
}

/// Request to record a manual correction against a statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAdjustment {
    pub description: String,
    pub amount: Decimal,
    pub direction: AdjustmentDirection,
    /// Regulatory leaf, e.g. `current_assets.trade_receivables`.
    #[serde(default)]
    pub target_leaf: Option<String>,
    #[serde(default)]
    pub line_item_id: Option<Uuid>,
}

impl NewAdjustment {
    pub fn validate(&self) -> Result<()> {
        let description = self.description.trim();
        if description.is_empty() {
            return Err(TransformError::ValidationError(
                "Adjustment description must not be empty".to_string(),
            ));
        }
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(TransformError::ValidationError(format!(
                "Adjustment description exceeds {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
        if self.amount.is_zero() {
            return Err(TransformError::ValidationError(
                "Adjustment amount must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Adjustment {
    pub id: Uuid,
    pub statement_id: Uuid,
    pub description: String,
    pub amount: Decimal,
    pub direction: AdjustmentDirection,
    pub target_leaf: Option<String>,
    pub line_item_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Audit trail stored with every transformed view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationLog {
    pub schema_version: String,
    /// Regulatory placement of every item and the tier that resolved it.
    pub classifications: Vec<Classification>,
    #[serde(default)]
    pub applied_adjustments: Vec<Uuid>,
    #[serde(default)]
    pub pending_adjustments: Vec<Uuid>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl TransformationLog {
    pub fn degraded_count(&self) -> usize {
        self.classifications.iter().filter(|c| c.is_degraded()).count()
    }
}

/// One stored representation of a statement, unique per (statement, format).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedView {
    pub id: Uuid,
    pub statement_id: Uuid,
    pub format: ViewFormat,
    pub data: serde_json::Value,
    pub log: TransformationLog,
    /// Assigned by the store on commit; shared by both views of a statement.
    pub generation: u64,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn adjustment(description: &str, amount: Decimal) -> NewAdjustment {
        NewAdjustment {
            description: description.to_string(),
            amount,
            direction: AdjustmentDirection::Debit,
            target_leaf: None,
            line_item_id: None,
        }
    }

    #[test]
    fn test_category_serializes_lowercase() {
        let json = serde_json::to_string(&Category::Liabilities).unwrap();
        assert_eq!(json, "\"liabilities\"");

        let parsed: ViewFormat = serde_json::from_str("\"regulatory\"").unwrap();
        assert_eq!(parsed, ViewFormat::Regulatory);
    }

    #[test]
    fn test_adjustment_validation() {
        assert!(adjustment("Accrual", dec!(100)).validate().is_ok());
        assert!(adjustment("   ", dec!(100)).validate().is_err());
        assert!(adjustment("Accrual", dec!(0)).validate().is_err());
        assert!(adjustment(&"x".repeat(256), dec!(1)).validate().is_err());
    }

    #[test]
    fn test_line_item_deserializes_without_subcategory() {
        let json = r#"{"account_code":"1010","account_name":"Cash","amount":"50000.00","category":"assets"}"#;
        let item: NewLineItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.amount, dec!(50000.00));
        assert!(item.subcategory.is_none());
    }
}
