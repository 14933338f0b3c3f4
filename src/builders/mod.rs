//! Statement builders. Each turns classified line items into a nested tree,
//! folds its totals once and serializes it to the versioned wire shape.

pub mod ifrs;
pub mod mcfo;

pub use ifrs::IfrsBuilder;
pub use mcfo::McfoBuilder;

use crate::balance::BalanceCrossCheck;
use crate::schema::ViewFormat;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Output of one builder run, before it is persisted.
#[derive(Debug, Clone)]
pub struct BuiltView {
    pub format: ViewFormat,
    pub data: serde_json::Value,
    pub total_assets: Decimal,
    pub total_liabilities_and_equity: Decimal,
    pub balance: BalanceCrossCheck,
    pub applied_adjustments: Vec<Uuid>,
    pub pending_adjustments: Vec<Uuid>,
    pub warnings: Vec<String>,
}
