use super::BuiltView;
use crate::adjustments::signed_amount;
use crate::balance::BalanceCrossCheck;
use crate::classifier::ClassifiedItem;
use crate::error::Result;
use crate::schema::{Adjustment, LineItem, Statement, ViewFormat};
use crate::taxonomy::{LeafKey, Section, VIEW_SCHEMA_VERSION};
use crate::tree::{AppliedAdjustment, LeafStyle, Node, PlacedItem, StatementTree};
use crate::utils::decimal_to_f64;
use log::{debug, warn};
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

/// Builds the regulatory (IFRS-style) statement of financial position.
///
/// Adjustments with a target leaf are folded into that leaf before parent
/// totals are computed; the rest are reported as pending.
pub struct IfrsBuilder {
    epsilon: Decimal,
}

fn leaf_path(leaf: LeafKey) -> String {
    format!("{}.{}", leaf.section().root_key(), leaf.path())
}

impl IfrsBuilder {
    pub fn new(epsilon: Decimal) -> Self {
        Self { epsilon }
    }

    fn layout() -> StatementTree {
        let section = |s: Section| {
            Node::branch(
                s.key(),
                s.leaves().iter().map(|l| Node::leaf(l.name())).collect(),
            )
        };
        StatementTree::new(vec![
            Node::branch(
                "assets",
                vec![
                    section(Section::NonCurrentAssets),
                    section(Section::CurrentAssets),
                ],
            ),
            Node::branch(
                "equity_and_liabilities",
                vec![
                    section(Section::Equity),
                    section(Section::NonCurrentLiabilities),
                    section(Section::CurrentLiabilities),
                ],
            ),
        ])
    }

    pub fn build(
        &self,
        statement: &Statement,
        classified: &[ClassifiedItem],
        adjustments: &[Adjustment],
    ) -> Result<BuiltView> {
        let mut tree = Self::layout();
        for entry in classified {
            let leaf = entry.classification.leaf;
            tree.place(
                &leaf_path(leaf),
                PlacedItem::new(&entry.item, Some(entry.classification.tier)),
            )?;
        }

        let items: Vec<LineItem> = classified.iter().map(|c| c.item.clone()).collect();
        tree.verify_conservation("regulatory", &items)?;

        let mut warnings = Vec::new();
        let mut applied = Vec::new();
        let mut pending = Vec::new();
        for adjustment in adjustments {
            let Some(target) = adjustment.target_leaf.as_deref() else {
                pending.push(adjustment.id);
                continue;
            };
            match LeafKey::parse(target) {
                Ok(leaf) => {
                    tree.apply_adjustment(
                        &leaf_path(leaf),
                        AppliedAdjustment {
                            adjustment_id: adjustment.id,
                            description: adjustment.description.clone(),
                            direction: adjustment.direction,
                            signed_amount: signed_amount(adjustment, leaf),
                            line_item_id: adjustment.line_item_id,
                        },
                    )?;
                    applied.push(adjustment.id);
                }
                Err(e) => {
                    warn!("Adjustment {} left pending: {}", adjustment.id, e);
                    warnings.push(format!("Adjustment {} left pending: {}", adjustment.id, e));
                    pending.push(adjustment.id);
                }
            }
        }

        let totals = tree.fold()?;
        let total_assets = totals.get("assets");
        let total_liabilities_and_equity = totals.get("equity_and_liabilities");
        let balance = BalanceCrossCheck::new(
            &statement.balance_check,
            total_assets,
            total_liabilities_and_equity,
            self.epsilon,
        );
        warnings.extend(balance.warnings());

        let mut position = tree.to_json(&totals, LeafStyle::Object);
        position.insert("total_assets".to_string(), json!(decimal_to_f64(total_assets)));
        position.insert(
            "total_liabilities_and_equity".to_string(),
            json!(decimal_to_f64(total_liabilities_and_equity)),
        );

        let mut data = Map::new();
        data.insert("schema_version".to_string(), json!(VIEW_SCHEMA_VERSION));
        data.insert("period".to_string(), json!(statement.period));
        data.insert(
            "statement_of_financial_position".to_string(),
            Value::Object(position),
        );
        data.insert("balance_check".to_string(), balance.to_json());

        debug!(
            "Built regulatory view for statement {}: {} adjustments applied, {} pending",
            statement.id,
            applied.len(),
            pending.len()
        );

        Ok(BuiltView {
            format: ViewFormat::Regulatory,
            data: Value::Object(data),
            total_assets,
            total_liabilities_and_equity,
            balance,
            applied_adjustments: applied,
            pending_adjustments: pending,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::BalanceCheck;
    use crate::classifier::{Classification, ClassificationTier};
    use crate::schema::{AdjustmentDirection, Category, StatementStatus};
    use crate::taxonomy::ManagementBucket;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn classified(
        name: &str,
        amount: Decimal,
        category: Category,
        leaf: LeafKey,
    ) -> ClassifiedItem {
        let item = LineItem {
            id: Uuid::new_v4(),
            statement_id: Uuid::nil(),
            account_code: "1000".to_string(),
            account_name: name.to_string(),
            amount,
            category,
            subcategory: None,
        };
        ClassifiedItem {
            classification: Classification {
                item_id: item.id,
                account_name: item.account_name.clone(),
                leaf,
                tier: ClassificationTier::Rule,
                degraded: Vec::new(),
            },
            management: ManagementBucket::Equity,
            item,
        }
    }

    fn fixture() -> (Statement, Vec<ClassifiedItem>) {
        let items = vec![
            classified("Cash", dec!(50000), Category::Assets, LeafKey::CashAndEquivalents),
            classified("Debtors", dec!(25000), Category::Assets, LeafKey::TradeReceivables),
            classified("Suppliers", dec!(15000), Category::Liabilities, LeafKey::TradePayables),
            classified("Capital", dec!(60000), Category::Equity, LeafKey::ShareCapital),
        ];
        let lines: Vec<LineItem> = items.iter().map(|c| c.item.clone()).collect();
        let statement = Statement {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            period: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            status: StatementStatus::Submitted,
            notes: None,
            balance_check: BalanceCheck::for_items(&lines, dec!(0.01)).unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        (statement, items)
    }

    fn adjustment(
        target: Option<&str>,
        amount: Decimal,
        direction: AdjustmentDirection,
    ) -> Adjustment {
        Adjustment {
            id: Uuid::new_v4(),
            statement_id: Uuid::nil(),
            description: "Correction".to_string(),
            amount,
            direction,
            target_leaf: target.map(str::to_string),
            line_item_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_regulatory_layout() {
        let (statement, items) = fixture();
        let view = IfrsBuilder::new(dec!(0.01))
            .build(&statement, &items, &[])
            .unwrap();

        let position = &view.data["statement_of_financial_position"];
        assert_eq!(
            position["assets"]["current_assets"]["cash_and_equivalents"]["total"],
            json!(50000.0)
        );
        assert_eq!(position["assets"]["current_assets"]["total"], json!(75000.0));
        assert_eq!(position["assets"]["non_current_assets"]["other"]["items"], json!([]));
        assert_eq!(
            position["equity_and_liabilities"]["current_liabilities"]["provisions"]["total"],
            json!(0.0)
        );
        assert_eq!(position["total_assets"], json!(75000.0));
        assert_eq!(position["total_liabilities_and_equity"], json!(75000.0));
        assert!(view.warnings.is_empty());
    }

    #[test]
    fn test_adjustment_moves_only_its_leaf() {
        let (statement, items) = fixture();
        let impairment = adjustment(
            Some("trade_receivables"),
            dec!(1000),
            AdjustmentDirection::Credit,
        );
        let note = adjustment(None, dec!(5), AdjustmentDirection::Debit);

        let view = IfrsBuilder::new(dec!(0.01))
            .build(&statement, &items, &[impairment.clone(), note.clone()])
            .unwrap();

        let current = &view.data["statement_of_financial_position"]["assets"]["current_assets"];
        assert_eq!(current["trade_receivables"]["total"], json!(24000.0));
        assert_eq!(current["cash_and_equivalents"]["total"], json!(50000.0));
        assert_eq!(current["trade_receivables"]["adjustments"][0]["amount"], json!(-1000.0));
        assert_eq!(view.total_assets, dec!(74000));
        assert_eq!(view.applied_adjustments, vec![impairment.id]);
        assert_eq!(view.pending_adjustments, vec![note.id]);
        assert!(!view.balance.view_is_balanced);
    }

    #[test]
    fn test_unparseable_target_is_pending() {
        let (statement, items) = fixture();
        let stale = adjustment(Some("goodwill"), dec!(10), AdjustmentDirection::Debit);

        let view = IfrsBuilder::new(dec!(0.01))
            .build(&statement, &items, &[stale.clone()])
            .unwrap();

        assert_eq!(view.pending_adjustments, vec![stale.id]);
        assert_eq!(view.total_assets, dec!(75000));
        assert_eq!(view.warnings.len(), 1);
    }

    #[test]
    fn test_items_carry_resolving_tier() {
        let (statement, items) = fixture();
        let view = IfrsBuilder::new(dec!(0.01))
            .build(&statement, &items, &[])
            .unwrap();

        let cash = &view.data["statement_of_financial_position"]["assets"]["current_assets"]
            ["cash_and_equivalents"]["items"][0];
        assert_eq!(cash["name"], json!("Cash"));
        assert_eq!(cash["tier"], json!("rule"));
    }
}
