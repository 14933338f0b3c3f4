use super::BuiltView;
use crate::balance::BalanceCrossCheck;
use crate::classifier::ClassifiedItem;
use crate::error::Result;
use crate::schema::{LineItem, Statement, ViewFormat};
use crate::taxonomy::VIEW_SCHEMA_VERSION;
use crate::tree::{LeafStyle, Node, PlacedItem, StatementTree};
use crate::utils::{checked_add, decimal_to_f64};
use log::debug;
use rust_decimal::Decimal;
use serde_json::{json, Value};

/// Builds the management (MCFO) view: current / non-current lists per side,
/// a flat equity list, and a cross-check against the ingestion balance.
pub struct McfoBuilder {
    epsilon: Decimal,
}

impl McfoBuilder {
    pub fn new(epsilon: Decimal) -> Self {
        Self { epsilon }
    }

    fn layout() -> StatementTree {
        StatementTree::new(vec![
            Node::branch(
                "assets",
                vec![Node::leaf("current"), Node::leaf("non_current")],
            ),
            Node::branch(
                "liabilities",
                vec![Node::leaf("current"), Node::leaf("non_current")],
            ),
            Node::branch("equity", vec![Node::leaf("items")]),
        ])
    }

    pub fn build(&self, statement: &Statement, classified: &[ClassifiedItem]) -> Result<BuiltView> {
        let mut tree = Self::layout();
        for entry in classified {
            tree.place(&entry.management.path(), PlacedItem::new(&entry.item, None))?;
        }

        let items: Vec<LineItem> = classified.iter().map(|c| c.item.clone()).collect();
        tree.verify_conservation("management", &items)?;

        let totals = tree.fold()?;
        let total_assets = totals.get("assets");
        let total_liabilities_and_equity =
            checked_add(totals.get("liabilities"), totals.get("equity"))?;
        let balance = BalanceCrossCheck::new(
            &statement.balance_check,
            total_assets,
            total_liabilities_and_equity,
            self.epsilon,
        );

        let mut data = tree.to_json(&totals, LeafStyle::List);
        data.insert("schema_version".to_string(), json!(VIEW_SCHEMA_VERSION));
        data.insert("period".to_string(), json!(statement.period));
        data.insert("total_assets".to_string(), json!(decimal_to_f64(total_assets)));
        data.insert(
            "total_liabilities_and_equity".to_string(),
            json!(decimal_to_f64(total_liabilities_and_equity)),
        );
        data.insert("balance_check".to_string(), balance.to_json());

        debug!(
            "Built management view for statement {}: assets {}, liabilities and equity {}",
            statement.id, total_assets, total_liabilities_and_equity
        );

        Ok(BuiltView {
            format: ViewFormat::Management,
            data: Value::Object(data),
            total_assets,
            total_liabilities_and_equity,
            warnings: balance.warnings(),
            balance,
            applied_adjustments: Vec::new(),
            pending_adjustments: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::BalanceCheck;
    use crate::classifier::{Classification, ClassificationTier};
    use crate::schema::{Category, StatementStatus};
    use crate::taxonomy::{LeafKey, ManagementBucket};
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn classified(
        name: &str,
        amount: Decimal,
        category: Category,
        bucket: ManagementBucket,
        leaf: LeafKey,
    ) -> ClassifiedItem {
        let item = LineItem {
            id: Uuid::new_v4(),
            statement_id: Uuid::nil(),
            account_code: "1000".to_string(),
            account_name: name.to_string(),
            amount,
            category,
            subcategory: Some("current".to_string()),
        };
        ClassifiedItem {
            classification: Classification {
                item_id: item.id,
                account_name: item.account_name.clone(),
                leaf,
                tier: ClassificationTier::Rule,
                degraded: Vec::new(),
            },
            item,
            management: bucket,
        }
    }

    fn statement(items: &[ClassifiedItem]) -> Statement {
        let lines: Vec<LineItem> = items.iter().map(|c| c.item.clone()).collect();
        Statement {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            period: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            status: StatementStatus::Submitted,
            notes: None,
            balance_check: BalanceCheck::for_items(&lines, dec!(0.01)).unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_management_layout() {
        let items = vec![
            classified(
                "Cash",
                dec!(50000),
                Category::Assets,
                ManagementBucket::AssetsCurrent,
                LeafKey::CashAndEquivalents,
            ),
            classified(
                "Building",
                dec!(75000),
                Category::Assets,
                ManagementBucket::AssetsNonCurrent,
                LeafKey::PropertyPlantEquipment,
            ),
            classified(
                "Accounts Payable",
                dec!(15000),
                Category::Liabilities,
                ManagementBucket::LiabilitiesCurrent,
                LeafKey::TradePayables,
            ),
            classified(
                "Share Capital",
                dec!(110000),
                Category::Equity,
                ManagementBucket::Equity,
                LeafKey::ShareCapital,
            ),
        ];
        let view = McfoBuilder::new(dec!(0.01))
            .build(&statement(&items), &items)
            .unwrap();

        assert_eq!(view.total_assets, dec!(125000));
        assert_eq!(view.total_liabilities_and_equity, dec!(125000));
        assert!(view.warnings.is_empty());

        let data = &view.data;
        assert_eq!(data["period"], json!("2024-12-31"));
        assert_eq!(data["assets"]["current"][0]["name"], json!("Cash"));
        assert_eq!(data["assets"]["non_current"][0]["amount"], json!(75000.0));
        assert_eq!(data["assets"]["total"], json!(125000.0));
        assert_eq!(data["liabilities"]["non_current"], json!([]));
        assert_eq!(data["equity"]["items"][0]["name"], json!("Share Capital"));
        assert_eq!(data["balance_check"]["matches_ingestion"], json!(true));
    }

    #[test]
    fn test_unbalanced_statement_is_reported_not_corrected() {
        let items = vec![
            classified(
                "Cash",
                dec!(100),
                Category::Assets,
                ManagementBucket::AssetsCurrent,
                LeafKey::CashAndEquivalents,
            ),
            classified(
                "Capital",
                dec!(90),
                Category::Equity,
                ManagementBucket::Equity,
                LeafKey::ShareCapital,
            ),
        ];
        let view = McfoBuilder::new(dec!(0.01))
            .build(&statement(&items), &items)
            .unwrap();

        assert_eq!(view.total_assets, dec!(100));
        assert_eq!(view.total_liabilities_and_equity, dec!(90));
        assert!(!view.balance.view_is_balanced);
        assert_eq!(view.warnings.len(), 1);
    }
}
