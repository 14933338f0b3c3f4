//! Entry points: ingesting ledgers, running transformations and reading back
//! their stored results.

use crate::adjustments::AdjustmentsLedger;
use crate::balance::BalanceCheck;
use crate::builders::{BuiltView, IfrsBuilder, McfoBuilder};
use crate::classifier::{
    ClassificationOracle, ClassificationTier, ClassifiedItem, ClassifierCascade, OracleClassifier,
};
use crate::config::TransformConfig;
use crate::error::{Result, TransformError};
use crate::normalizer::{NormalizedLedger, Normalizer};
use crate::schema::{
    LineItem, NewLineItem, Statement, StatementStatus, TransformationLog, TransformedView,
    ViewFormat,
};
use crate::store::StatementStore;
use crate::synonyms::SynonymTable;
use crate::taxonomy::VIEW_SCHEMA_VERSION;
use chrono::{NaiveDate, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationResult {
    pub statement_id: Uuid,
    pub management_view: Option<TransformedView>,
    pub regulatory_view: Option<TransformedView>,
    pub success: bool,
    pub message: String,
}

impl TransformationResult {
    fn failed(statement_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            statement_id,
            management_view: None,
            regulatory_view: None,
            success: false,
            message: message.into(),
        }
    }
}

pub struct TransformationService {
    store: Arc<dyn StatementStore>,
    cascade: ClassifierCascade,
    config: TransformConfig,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl TransformationService {
    /// Rule and default tiers only.
    pub fn new(store: Arc<dyn StatementStore>, config: TransformConfig) -> Self {
        let cascade = ClassifierCascade::new(
            Arc::new(SynonymTable::builtin()),
            None,
            config.oracle.max_concurrency,
        );
        Self::with_cascade(store, cascade, config)
    }

    pub fn with_oracle(
        store: Arc<dyn StatementStore>,
        oracle: Arc<dyn ClassificationOracle>,
        config: TransformConfig,
    ) -> Self {
        let synonyms = Arc::new(SynonymTable::builtin());
        let oracle = Arc::new(OracleClassifier::new(oracle, synonyms.clone(), &config.oracle));
        let cascade = ClassifierCascade::new(synonyms, Some(oracle), config.oracle.max_concurrency);
        Self::with_cascade(store, cascade, config)
    }

    pub fn with_cascade(
        store: Arc<dyn StatementStore>,
        cascade: ClassifierCascade,
        config: TransformConfig,
    ) -> Self {
        Self {
            store,
            cascade,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn StatementStore> {
        self.store.clone()
    }

    pub fn adjustments(&self) -> AdjustmentsLedger {
        AdjustmentsLedger::new(self.store.clone())
    }

    fn statement_lock(&self, statement_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(statement_id).or_default().clone()
    }

    /// Drops the map entry once only the map and `lock` still reference it.
    /// Clones are taken under the map mutex, so the count cannot race.
    fn release_lock(&self, statement_id: Uuid, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&statement_id);
        }
    }

    fn forget_lock(&self, statement_id: Uuid) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(&statement_id);
    }

    pub async fn create_draft(
        &self,
        company_id: Uuid,
        period: NaiveDate,
        notes: Option<String>,
    ) -> Result<Statement> {
        let now = Utc::now();
        let statement = Statement {
            id: Uuid::new_v4(),
            company_id,
            period,
            status: StatementStatus::Draft,
            notes,
            balance_check: BalanceCheck::for_items(&[], self.config.balance_epsilon)?,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_statement(statement.clone(), Vec::new()).await?;
        Ok(statement)
    }

    /// Statements of a company, latest period first.
    pub async fn list_statements(&self, company_id: Uuid) -> Result<Vec<Statement>> {
        self.store.list_statements(company_id).await
    }

    /// Replaces the items of a draft statement.
    pub async fn replace_items(
        &self,
        statement_id: Uuid,
        items: Vec<NewLineItem>,
    ) -> Result<Vec<LineItem>> {
        let balance_check = BalanceCheck::for_new_items(&items, self.config.balance_epsilon)?;
        let items: Vec<LineItem> = items
            .into_iter()
            .map(|i| LineItem::from_new(statement_id, i))
            .collect();
        self.store
            .replace_items(statement_id, items.clone(), balance_check)
            .await?;
        Ok(items)
    }

    /// Moves a draft statement to submitted, freezing its items.
    pub async fn submit(&self, statement_id: Uuid) -> Result<Statement> {
        let statement = self.store.get_statement(statement_id).await?;
        if statement.status != StatementStatus::Draft {
            return Err(TransformError::InvalidState {
                statement_id,
                details: format!(
                    "only drafts can be submitted, statement is {:?}",
                    statement.status
                ),
            });
        }
        if self.store.line_items(statement_id).await?.is_empty() {
            return Err(TransformError::ValidationError(
                "Cannot submit a statement without line items".to_string(),
            ));
        }
        if !statement.balance_check.is_balanced {
            warn!(
                "Submitting unbalanced statement {} (difference {})",
                statement_id, statement.balance_check.difference
            );
        }
        self.store.set_status(statement_id, StatementStatus::Submitted).await
    }

    /// Stores a normalized ledger as a submitted statement.
    pub async fn ingest(
        &self,
        company_id: Uuid,
        period: NaiveDate,
        notes: Option<String>,
        ledger: NormalizedLedger,
    ) -> Result<Statement> {
        if !ledger.success {
            return Err(TransformError::ValidationError(format!(
                "Ledger could not be normalized: {}",
                ledger.errors.join("; ")
            )));
        }
        if ledger.items.is_empty() {
            return Err(TransformError::ValidationError(
                "Ledger contains no valid line items".to_string(),
            ));
        }
        for e in &ledger.errors {
            warn!("Ingesting with skipped row: {}", e);
        }

        let balance_check =
            BalanceCheck::for_new_items(&ledger.items, self.config.balance_epsilon)?;
        if !balance_check.is_balanced {
            warn!(
                "Ledger for company {} ({}) is unbalanced: assets {} vs liabilities and equity {}",
                company_id,
                period,
                balance_check.total_assets,
                balance_check.total_liabilities_and_equity()
            );
        }

        let now = Utc::now();
        let statement = Statement {
            id: Uuid::new_v4(),
            company_id,
            period,
            status: StatementStatus::Submitted,
            notes,
            balance_check,
            created_at: now,
            updated_at: now,
        };
        let items: Vec<LineItem> = ledger
            .items
            .into_iter()
            .map(|i| LineItem::from_new(statement.id, i))
            .collect();

        info!(
            "Ingested statement {} with {} items",
            statement.id,
            items.len()
        );
        self.store.insert_statement(statement.clone(), items).await?;
        Ok(statement)
    }

    /// Normalizes an uploaded file and ingests it.
    pub async fn ingest_file(
        &self,
        normalizer: &dyn Normalizer,
        company_id: Uuid,
        period: NaiveDate,
        notes: Option<String>,
        bytes: &[u8],
        filename: &str,
    ) -> Result<Statement> {
        let ledger = normalizer.parse(bytes, filename)?;
        self.ingest(company_id, period, notes, ledger).await
    }

    pub async fn delete_statement(&self, statement_id: Uuid) -> Result<()> {
        let lock = self.statement_lock(statement_id);
        let deleted = {
            let _guard = lock.lock().await;
            self.store.delete_statement(statement_id).await
        };
        match deleted {
            Ok(()) => self.forget_lock(statement_id),
            Err(_) => self.release_lock(statement_id, lock),
        }
        deleted
    }

    pub async fn transform(&self, statement_id: Uuid) -> Result<TransformationResult> {
        self.transform_with_cancel(statement_id, &CancellationToken::new())
            .await
    }

    /// Classifies, builds and stores both views of a statement.
    ///
    /// Empty ledgers and conservation violations yield `success == false` with
    /// nothing persisted. A cancelled run persists nothing and returns
    /// `Cancelled`.
    pub async fn transform_with_cancel(
        &self,
        statement_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<TransformationResult> {
        let lock = self.statement_lock(statement_id);
        let result = {
            let _guard = lock.lock().await;
            self.run_transform(statement_id, cancel).await
        };
        self.release_lock(statement_id, lock);
        result
    }

    async fn run_transform(
        &self,
        statement_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<TransformationResult> {
        let statement = self.store.get_statement(statement_id).await?;
        if statement.status == StatementStatus::Draft {
            return Err(TransformError::InvalidState {
                statement_id,
                details: "draft statements must be submitted before transformation".to_string(),
            });
        }
        let expected = self.store.view_generation(statement_id).await?;

        let items = self.store.line_items(statement_id).await?;
        if items.is_empty() {
            warn!("Statement {} has no line items; nothing to transform", statement_id);
            return Ok(TransformationResult::failed(
                statement_id,
                "Statement has no line items",
            ));
        }

        info!(
            "Transforming statement {} ({} items)",
            statement_id,
            items.len()
        );
        let classified = self.cascade.classify_all(&items, cancel).await;
        if cancel.is_cancelled() {
            return Err(TransformError::Cancelled(statement_id));
        }

        let adjustments = self.store.adjustments(statement_id).await?;
        let built = McfoBuilder::new(self.config.balance_epsilon)
            .build(&statement, &classified)
            .and_then(|management| {
                IfrsBuilder::new(self.config.balance_epsilon)
                    .build(&statement, &classified, &adjustments)
                    .map(|regulatory| (management, regulatory))
            });
        let (management, regulatory) = match built {
            Ok(views) => views,
            Err(e @ TransformError::ConservationViolation { .. }) => {
                error!("Statement {}: {}", statement_id, e);
                return Ok(TransformationResult::failed(statement_id, e.to_string()));
            }
            Err(e) => return Err(e),
        };

        let mut management_view = to_stored_view(statement_id, management, &classified);
        let mut regulatory_view = to_stored_view(statement_id, regulatory, &classified);

        if cancel.is_cancelled() {
            return Err(TransformError::Cancelled(statement_id));
        }
        let generation = self
            .store
            .commit_views(
                statement_id,
                expected,
                vec![management_view.clone(), regulatory_view.clone()],
            )
            .await?;
        management_view.generation = generation;
        regulatory_view.generation = generation;

        Ok(TransformationResult {
            statement_id,
            message: summary(&classified, &regulatory_view.log, generation),
            management_view: Some(management_view),
            regulatory_view: Some(regulatory_view),
            success: true,
        })
    }

    /// Returns the stored views without recomputing them.
    pub async fn get_transformation(&self, statement_id: Uuid) -> Result<TransformationResult> {
        let views = self.store.views(statement_id).await?;
        let find = |format: ViewFormat| views.iter().find(|v| v.format == format).cloned();
        let management_view = find(ViewFormat::Management);
        let regulatory_view = find(ViewFormat::Regulatory);

        match (management_view, regulatory_view) {
            (Some(management), Some(regulatory)) => Ok(TransformationResult {
                statement_id,
                message: format!("Generation {}", regulatory.generation),
                management_view: Some(management),
                regulatory_view: Some(regulatory),
                success: true,
            }),
            _ => Ok(TransformationResult::failed(
                statement_id,
                "Statement has not been transformed",
            )),
        }
    }
}

fn to_stored_view(
    statement_id: Uuid,
    built: BuiltView,
    classified: &[ClassifiedItem],
) -> TransformedView {
    TransformedView {
        id: Uuid::new_v4(),
        statement_id,
        format: built.format,
        data: built.data,
        log: TransformationLog {
            schema_version: VIEW_SCHEMA_VERSION.to_string(),
            classifications: classified.iter().map(|c| c.classification.clone()).collect(),
            applied_adjustments: built.applied_adjustments,
            pending_adjustments: built.pending_adjustments,
            warnings: built.warnings,
        },
        generation: 0,
        generated_at: Utc::now(),
    }
}

fn summary(classified: &[ClassifiedItem], log: &TransformationLog, generation: u64) -> String {
    let count = |tier: ClassificationTier| {
        classified
            .iter()
            .filter(|c| c.classification.tier == tier)
            .count()
    };
    format!(
        "Transformed {} items ({} rule, {} oracle, {} default, {} degraded); {} adjustments applied, {} pending; generation {}",
        classified.len(),
        count(ClassificationTier::Rule),
        count(ClassificationTier::Oracle),
        count(ClassificationTier::Default),
        log.degraded_count(),
        log.applied_adjustments.len(),
        log.pending_adjustments.len(),
        generation
    )
}
