//! Manual corrections recorded against a statement. They live independently of
//! the transformed views and are folded into the regulatory view at build time.

use crate::error::{Result, TransformError};
use crate::schema::{Adjustment, LineItem, NewAdjustment};
use crate::store::StatementStore;
use crate::taxonomy::LeafKey;
use chrono::{DateTime, Utc};
use log::info;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Effect of an adjustment on the leaf it targets: positive in the leaf's
/// normal direction (debit for assets, credit for liabilities and equity).
pub fn signed_amount(adjustment: &Adjustment, leaf: LeafKey) -> Decimal {
    if adjustment.direction == leaf.normal_direction() {
        adjustment.amount
    } else {
        -adjustment.amount
    }
}

fn validated(
    statement_id: Uuid,
    items: &[LineItem],
    request: NewAdjustment,
    id: Uuid,
    created_at: DateTime<Utc>,
) -> Result<Adjustment> {
    request.validate()?;
    let target_leaf = match request.target_leaf.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(key) => Some(LeafKey::parse(key)?.path()),
    };
    if let Some(line_item_id) = request.line_item_id {
        if !items.iter().any(|i| i.id == line_item_id) {
            return Err(TransformError::ValidationError(format!(
                "line item {} does not belong to statement {}",
                line_item_id, statement_id
            )));
        }
    }

    Ok(Adjustment {
        id,
        statement_id,
        description: request.description.trim().to_string(),
        amount: request.amount,
        direction: request.direction,
        target_leaf,
        line_item_id: request.line_item_id,
        created_at,
    })
}

pub struct AdjustmentsLedger {
    store: Arc<dyn StatementStore>,
}

impl AdjustmentsLedger {
    pub fn new(store: Arc<dyn StatementStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, statement_id: Uuid, request: NewAdjustment) -> Result<Adjustment> {
        let mut created = self.create_batch(statement_id, vec![request]).await?;
        created.pop().ok_or_else(|| {
            TransformError::ValidationError("No adjustment was created".to_string())
        })
    }

    /// Validates every request before storing any of them.
    pub async fn create_batch(
        &self,
        statement_id: Uuid,
        requests: Vec<NewAdjustment>,
    ) -> Result<Vec<Adjustment>> {
        self.store.get_statement(statement_id).await?;
        let items = self.store.line_items(statement_id).await?;

        let mut adjustments = Vec::with_capacity(requests.len());
        for (index, request) in requests.into_iter().enumerate() {
            let row = |e: TransformError| match e {
                TransformError::ValidationError(msg) => {
                    TransformError::ValidationError(format!("Adjustment {}: {}", index + 1, msg))
                }
                other => other,
            };
            let id = Uuid::new_v4();
            let adjustment =
                validated(statement_id, &items, request, id, Utc::now()).map_err(row)?;
            adjustments.push(adjustment);
        }

        self.store.insert_adjustments(adjustments.clone()).await?;
        info!(
            "Recorded {} adjustments for statement {}",
            adjustments.len(),
            statement_id
        );
        Ok(adjustments)
    }

    pub async fn list(&self, statement_id: Uuid) -> Result<Vec<Adjustment>> {
        self.store.adjustments(statement_id).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Adjustment> {
        self.store.get_adjustment(id).await
    }

    /// Replaces the content of an adjustment, keeping its id, statement and
    /// creation time. The change shows up on the next transform.
    pub async fn update(&self, id: Uuid, request: NewAdjustment) -> Result<Adjustment> {
        let existing = self.store.get_adjustment(id).await?;
        let items = self.store.line_items(existing.statement_id).await?;
        let adjustment = validated(
            existing.statement_id,
            &items,
            request,
            existing.id,
            existing.created_at,
        )?;
        self.store.update_adjustment(adjustment.clone()).await?;
        info!(
            "Updated adjustment {} on statement {}",
            id, adjustment.statement_id
        );
        Ok(adjustment)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.store.delete_adjustment(id).await?;
        info!("Deleted adjustment {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::BalanceCheck;
    use crate::schema::{AdjustmentDirection, Category, Statement, StatementStatus};
    use crate::store::InMemoryStore;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn request(target: Option<&str>, amount: Decimal) -> NewAdjustment {
        NewAdjustment {
            description: "Bad debt provision".to_string(),
            amount,
            direction: AdjustmentDirection::Credit,
            target_leaf: target.map(str::to_string),
            line_item_id: None,
        }
    }

    async fn seeded() -> (AdjustmentsLedger, Uuid, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let statement = Statement {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            period: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            status: StatementStatus::Submitted,
            notes: None,
            balance_check: BalanceCheck::from_totals(dec!(10), dec!(0), dec!(10), dec!(0.01))
                .unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let item = LineItem {
            id: Uuid::new_v4(),
            statement_id: statement.id,
            account_code: "1200".to_string(),
            account_name: "Debtors".to_string(),
            amount: dec!(10),
            category: Category::Assets,
            subcategory: None,
        };
        let (statement_id, item_id) = (statement.id, item.id);
        store.insert_statement(statement, vec![item]).await.unwrap();
        (AdjustmentsLedger::new(store), statement_id, item_id)
    }

    #[test]
    fn test_signed_amount_follows_normal_direction() {
        let mut adjustment = Adjustment {
            id: Uuid::new_v4(),
            statement_id: Uuid::nil(),
            description: "x".to_string(),
            amount: dec!(100),
            direction: AdjustmentDirection::Debit,
            target_leaf: None,
            line_item_id: None,
            created_at: Utc::now(),
        };
        assert_eq!(signed_amount(&adjustment, LeafKey::TradeReceivables), dec!(100));
        assert_eq!(signed_amount(&adjustment, LeafKey::TradePayables), dec!(-100));

        adjustment.direction = AdjustmentDirection::Credit;
        assert_eq!(signed_amount(&adjustment, LeafKey::TradeReceivables), dec!(-100));
        assert_eq!(signed_amount(&adjustment, LeafKey::RetainedEarnings), dec!(100));
    }

    #[tokio::test]
    async fn test_create_normalizes_target_to_full_path() {
        let (ledger, statement_id, item_id) = seeded().await;
        let mut req = request(Some("trade_receivables"), dec!(50));
        req.line_item_id = Some(item_id);

        let created = ledger.create(statement_id, req).await.unwrap();

        assert_eq!(
            created.target_leaf.as_deref(),
            Some("current_assets.trade_receivables")
        );
        assert_eq!(ledger.get(created.id).await.unwrap(), created);
        assert_eq!(ledger.list(statement_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let (ledger, statement_id, _) = seeded().await;

        let result = ledger
            .create_batch(
                statement_id,
                vec![
                    request(Some("share_capital"), dec!(5)),
                    request(Some("provisions"), dec!(5)),
                ],
            )
            .await;

        match result {
            Err(TransformError::ValidationError(msg)) => assert!(msg.starts_with("Adjustment 2:")),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(ledger.list(statement_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_foreign_line_item_and_unknown_statement() {
        let (ledger, statement_id, _) = seeded().await;
        let mut req = request(None, dec!(1));
        req.line_item_id = Some(Uuid::new_v4());

        assert!(matches!(
            ledger.create(statement_id, req).await,
            Err(TransformError::ValidationError(_))
        ));
        assert!(matches!(
            ledger.create(Uuid::new_v4(), request(None, dec!(1))).await,
            Err(TransformError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_revalidates_and_keeps_identity() {
        let (ledger, statement_id, item_id) = seeded().await;
        let created = ledger
            .create(statement_id, request(Some("trade_receivables"), dec!(50)))
            .await
            .unwrap();

        let mut edit = request(Some("inventories"), dec!(75));
        edit.line_item_id = Some(item_id);
        let updated = ledger.update(created.id, edit).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.amount, dec!(75));
        assert_eq!(
            updated.target_leaf.as_deref(),
            Some("current_assets.inventories")
        );
        assert_eq!(ledger.get(created.id).await.unwrap(), updated);

        let mut foreign = request(None, dec!(1));
        foreign.line_item_id = Some(Uuid::new_v4());
        assert!(matches!(
            ledger.update(created.id, foreign).await,
            Err(TransformError::ValidationError(_))
        ));
        assert!(ledger.update(created.id, request(Some("provisions"), dec!(1))).await.is_err());
        assert!(ledger.update(created.id, request(None, dec!(0))).await.is_err());
        assert_eq!(ledger.get(created.id).await.unwrap(), updated);

        assert!(matches!(
            ledger.update(Uuid::new_v4(), request(None, dec!(1))).await,
            Err(TransformError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let (ledger, statement_id, _) = seeded().await;
        let created = ledger
            .create(statement_id, request(None, dec!(-3)))
            .await
            .unwrap();

        ledger.delete(created.id).await.unwrap();
        assert!(matches!(
            ledger.get(created.id).await,
            Err(TransformError::NotFound { .. })
        ));
    }
}
