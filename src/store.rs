//! Persistence seam. The service talks to a [`StatementStore`]; [`InMemoryStore`]
//! is the bundled implementation.

use crate::balance::BalanceCheck;
use crate::error::{Result, TransformError};
use crate::schema::{
    Adjustment, LineItem, Statement, StatementStatus, TransformedView, ViewFormat,
};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait StatementStore: Send + Sync {
    async fn insert_statement(&self, statement: Statement, items: Vec<LineItem>) -> Result<()>;

    async fn get_statement(&self, id: Uuid) -> Result<Statement>;

    async fn list_statements(&self, company_id: Uuid) -> Result<Vec<Statement>>;

    async fn set_status(&self, id: Uuid, status: StatementStatus) -> Result<Statement>;

    /// Deletes the statement with its items, views and adjustments.
    async fn delete_statement(&self, id: Uuid) -> Result<()>;

    async fn line_items(&self, statement_id: Uuid) -> Result<Vec<LineItem>>;

    /// Replaces every item of a draft statement and refreshes its balance check.
    async fn replace_items(
        &self,
        statement_id: Uuid,
        items: Vec<LineItem>,
        balance_check: BalanceCheck,
    ) -> Result<()>;

    async fn views(&self, statement_id: Uuid) -> Result<Vec<TransformedView>>;

    /// Generation of the statement's current views; `None` before the first
    /// commit.
    async fn view_generation(&self, statement_id: Uuid) -> Result<Option<u64>>;

    /// Upserts all views keyed by (statement, format) and marks the statement
    /// transformed, as one step. Fails with `PersistenceConflict` when the
    /// stored generation is not `expected`. Returns the new generation.
    async fn commit_views(
        &self,
        statement_id: Uuid,
        expected: Option<u64>,
        views: Vec<TransformedView>,
    ) -> Result<u64>;

    async fn insert_adjustments(&self, adjustments: Vec<Adjustment>) -> Result<()>;

    /// Adjustments of a statement in creation order.
    async fn adjustments(&self, statement_id: Uuid) -> Result<Vec<Adjustment>>;

    async fn get_adjustment(&self, id: Uuid) -> Result<Adjustment>;

    /// Replaces a stored adjustment with the same id and statement.
    async fn update_adjustment(&self, adjustment: Adjustment) -> Result<()>;

    async fn delete_adjustment(&self, id: Uuid) -> Result<()>;
}

#[derive(Default)]
struct StoreState {
    statements: HashMap<Uuid, Statement>,
    items: HashMap<Uuid, Vec<LineItem>>,
    views: HashMap<(Uuid, ViewFormat), TransformedView>,
    generations: HashMap<Uuid, u64>,
    adjustments: Vec<Adjustment>,
}

impl StoreState {
    fn statement_mut(&mut self, id: Uuid) -> Result<&mut Statement> {
        self.statements.get_mut(&id).ok_or(TransformError::NotFound {
            entity: "Statement",
            id,
        })
    }

    fn require_statement(&self, id: Uuid) -> Result<&Statement> {
        self.statements.get(&id).ok_or(TransformError::NotFound {
            entity: "Statement",
            id,
        })
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatementStore for InMemoryStore {
    async fn insert_statement(&self, statement: Statement, items: Vec<LineItem>) -> Result<()> {
        if items.iter().any(|i| i.statement_id != statement.id) {
            return Err(TransformError::ValidationError(
                "Line items must belong to the statement being inserted".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        if state.statements.contains_key(&statement.id) {
            return Err(TransformError::ValidationError(format!(
                "Statement {} already exists",
                statement.id
            )));
        }
        debug!("Storing statement {} with {} items", statement.id, items.len());
        state.items.insert(statement.id, items);
        state.statements.insert(statement.id, statement);
        Ok(())
    }

    async fn get_statement(&self, id: Uuid) -> Result<Statement> {
        let state = self.state.read().await;
        state.require_statement(id).cloned()
    }

    async fn list_statements(&self, company_id: Uuid) -> Result<Vec<Statement>> {
        let state = self.state.read().await;
        let mut statements: Vec<Statement> = state
            .statements
            .values()
            .filter(|s| s.company_id == company_id)
            .cloned()
            .collect();
        statements.sort_by(|a, b| b.period.cmp(&a.period).then(a.created_at.cmp(&b.created_at)));
        Ok(statements)
    }

    async fn set_status(&self, id: Uuid, status: StatementStatus) -> Result<Statement> {
        let mut state = self.state.write().await;
        let statement = state.statement_mut(id)?;
        statement.status = status;
        statement.updated_at = Utc::now();
        Ok(statement.clone())
    }

    async fn delete_statement(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        state.require_statement(id)?;

        state.statements.remove(&id);
        state.items.remove(&id);
        state.views.retain(|(statement_id, _), _| *statement_id != id);
        state.generations.remove(&id);
        state.adjustments.retain(|a| a.statement_id != id);
        info!("Deleted statement {} and its dependents", id);
        Ok(())
    }

    async fn line_items(&self, statement_id: Uuid) -> Result<Vec<LineItem>> {
        let state = self.state.read().await;
        state.require_statement(statement_id)?;
        Ok(state.items.get(&statement_id).cloned().unwrap_or_default())
    }

    async fn replace_items(
        &self,
        statement_id: Uuid,
        items: Vec<LineItem>,
        balance_check: BalanceCheck,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let statement = state.statement_mut(statement_id)?;
        if statement.status != StatementStatus::Draft {
            return Err(TransformError::InvalidState {
                statement_id,
                details: format!(
                    "line items can only be replaced in draft, statement is {:?}",
                    statement.status
                ),
            });
        }
        if items.iter().any(|i| i.statement_id != statement_id) {
            return Err(TransformError::ValidationError(
                "Line items must belong to the statement being updated".to_string(),
            ));
        }

        statement.balance_check = balance_check;
        statement.updated_at = Utc::now();
        state.items.insert(statement_id, items);
        Ok(())
    }

    async fn views(&self, statement_id: Uuid) -> Result<Vec<TransformedView>> {
        let state = self.state.read().await;
        state.require_statement(statement_id)?;
        let mut views: Vec<TransformedView> = state
            .views
            .values()
            .filter(|v| v.statement_id == statement_id)
            .cloned()
            .collect();
        views.sort_by_key(|v| v.format);
        Ok(views)
    }

    async fn view_generation(&self, statement_id: Uuid) -> Result<Option<u64>> {
        let state = self.state.read().await;
        state.require_statement(statement_id)?;
        Ok(state.generations.get(&statement_id).copied())
    }

    async fn commit_views(
        &self,
        statement_id: Uuid,
        expected: Option<u64>,
        views: Vec<TransformedView>,
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        state.require_statement(statement_id)?;

        let found = state.generations.get(&statement_id).copied();
        if found != expected {
            return Err(TransformError::PersistenceConflict {
                statement_id,
                expected,
                found,
            });
        }
        if views.iter().any(|v| v.statement_id != statement_id) {
            return Err(TransformError::ValidationError(
                "Views must belong to the statement being committed".to_string(),
            ));
        }

        let generation = found.map_or(1, |g| g + 1);
        for mut view in views {
            view.generation = generation;
            state.views.insert((statement_id, view.format), view);
        }
        state.generations.insert(statement_id, generation);

        let statement = state.statement_mut(statement_id)?;
        statement.status = StatementStatus::Transformed;
        statement.updated_at = Utc::now();

        info!(
            "Committed generation {} of views for statement {}",
            generation, statement_id
        );
        Ok(generation)
    }

    async fn insert_adjustments(&self, adjustments: Vec<Adjustment>) -> Result<()> {
        let mut state = self.state.write().await;
        for adjustment in &adjustments {
            state.require_statement(adjustment.statement_id)?;
        }
        state.adjustments.extend(adjustments);
        Ok(())
    }

    async fn adjustments(&self, statement_id: Uuid) -> Result<Vec<Adjustment>> {
        let state = self.state.read().await;
        state.require_statement(statement_id)?;
        Ok(state
            .adjustments
            .iter()
            .filter(|a| a.statement_id == statement_id)
            .cloned()
            .collect())
    }

    async fn get_adjustment(&self, id: Uuid) -> Result<Adjustment> {
        let state = self.state.read().await;
        state
            .adjustments
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(TransformError::NotFound {
                entity: "Adjustment",
                id,
            })
    }

    async fn update_adjustment(&self, adjustment: Adjustment) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .adjustments
            .iter_mut()
            .find(|a| a.id == adjustment.id && a.statement_id == adjustment.statement_id)
            .ok_or(TransformError::NotFound {
                entity: "Adjustment",
                id: adjustment.id,
            })?;
        *stored = adjustment;
        Ok(())
    }

    async fn delete_adjustment(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let before = state.adjustments.len();
        state.adjustments.retain(|a| a.id != id);
        if state.adjustments.len() == before {
            return Err(TransformError::NotFound {
                entity: "Adjustment",
                id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::BalanceCheck;
    use crate::schema::{AdjustmentDirection, Category, TransformationLog};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn statement(status: StatementStatus) -> Statement {
        Statement {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            period: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            status,
            notes: None,
            balance_check: BalanceCheck::from_totals(dec!(0), dec!(0), dec!(0), dec!(0.01))
                .unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn item(statement_id: Uuid) -> LineItem {
        LineItem {
            id: Uuid::new_v4(),
            statement_id,
            account_code: "1010".to_string(),
            account_name: "Cash".to_string(),
            amount: dec!(10),
            category: Category::Assets,
            subcategory: None,
        }
    }

    fn view(statement_id: Uuid, format: ViewFormat) -> TransformedView {
        TransformedView {
            id: Uuid::new_v4(),
            statement_id,
            format,
            data: serde_json::json!({}),
            log: TransformationLog {
                schema_version: "2.0".to_string(),
                classifications: Vec::new(),
                applied_adjustments: Vec::new(),
                pending_adjustments: Vec::new(),
                warnings: Vec::new(),
            },
            generation: 0,
            generated_at: Utc::now(),
        }
    }

    fn adjustment(statement_id: Uuid) -> Adjustment {
        Adjustment {
            id: Uuid::new_v4(),
            statement_id,
            description: "Accrual".to_string(),
            amount: dec!(5),
            direction: AdjustmentDirection::Credit,
            target_leaf: None,
            line_item_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_commit_upserts_and_advances_generation() {
        let store = InMemoryStore::new();
        let s = statement(StatementStatus::Submitted);
        store.insert_statement(s.clone(), vec![item(s.id)]).await.unwrap();

        let first = store
            .commit_views(
                s.id,
                None,
                vec![view(s.id, ViewFormat::Management), view(s.id, ViewFormat::Regulatory)],
            )
            .await
            .unwrap();
        let second = store
            .commit_views(
                s.id,
                Some(first),
                vec![view(s.id, ViewFormat::Management), view(s.id, ViewFormat::Regulatory)],
            )
            .await
            .unwrap();

        assert_eq!((first, second), (1, 2));
        let views = store.views(s.id).await.unwrap();
        assert_eq!(views.len(), 2);
        assert!(views.iter().all(|v| v.generation == 2));
        assert_eq!(
            store.get_statement(s.id).await.unwrap().status,
            StatementStatus::Transformed
        );
    }

    #[tokio::test]
    async fn test_stale_generation_conflicts() {
        let store = InMemoryStore::new();
        let s = statement(StatementStatus::Submitted);
        store.insert_statement(s.clone(), Vec::new()).await.unwrap();
        store
            .commit_views(s.id, None, vec![view(s.id, ViewFormat::Management)])
            .await
            .unwrap();

        let result = store
            .commit_views(s.id, None, vec![view(s.id, ViewFormat::Management)])
            .await;
        match result {
            Err(e @ TransformError::PersistenceConflict { .. }) => assert!(e.is_retryable()),
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(store.view_generation(s.id).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = InMemoryStore::new();
        let s = statement(StatementStatus::Submitted);
        store.insert_statement(s.clone(), vec![item(s.id)]).await.unwrap();
        let adj = adjustment(s.id);
        store.insert_adjustments(vec![adj.clone()]).await.unwrap();
        store
            .commit_views(s.id, None, vec![view(s.id, ViewFormat::Regulatory)])
            .await
            .unwrap();

        store.delete_statement(s.id).await.unwrap();

        assert!(store.get_statement(s.id).await.is_err());
        assert!(store.get_adjustment(adj.id).await.is_err());
        assert!(store.line_items(s.id).await.is_err());
        assert!(store.delete_statement(s.id).await.is_err());
    }

    #[tokio::test]
    async fn test_replace_items_only_in_draft() {
        let store = InMemoryStore::new();
        let draft = statement(StatementStatus::Draft);
        let submitted = statement(StatementStatus::Submitted);
        store.insert_statement(draft.clone(), Vec::new()).await.unwrap();
        store.insert_statement(submitted.clone(), Vec::new()).await.unwrap();

        let check =
            BalanceCheck::from_totals(dec!(10), dec!(0), dec!(0), dec!(0.01)).unwrap();
        store
            .replace_items(draft.id, vec![item(draft.id)], check.clone())
            .await
            .unwrap();
        assert_eq!(store.line_items(draft.id).await.unwrap().len(), 1);
        assert_eq!(store.get_statement(draft.id).await.unwrap().balance_check, check);

        let result = store
            .replace_items(submitted.id, vec![item(submitted.id)], check)
            .await;
        assert!(matches!(result, Err(TransformError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_adjustments_keep_creation_order() {
        let store = InMemoryStore::new();
        let s = statement(StatementStatus::Submitted);
        store.insert_statement(s.clone(), Vec::new()).await.unwrap();
        let (a, b) = (adjustment(s.id), adjustment(s.id));
        store.insert_adjustments(vec![a.clone(), b.clone()]).await.unwrap();

        let mut edited = b.clone();
        edited.amount = dec!(99);
        store.update_adjustment(edited.clone()).await.unwrap();
        assert_eq!(store.get_adjustment(b.id).await.unwrap(), edited);

        store.delete_adjustment(a.id).await.unwrap();
        let remaining = store.adjustments(s.id).await.unwrap();
        assert_eq!(remaining, vec![edited]);
        assert!(store.delete_adjustment(a.id).await.is_err());
    }
}
