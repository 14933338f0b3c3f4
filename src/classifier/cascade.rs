use super::{
    Classification, ClassificationTier, Classifier, DefaultClassifier, OracleClassifier,
    RuleClassifier,
};
use crate::schema::LineItem;
use crate::synonyms::SynonymTable;
use crate::taxonomy::ManagementBucket;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A line item together with its placement in both taxonomies.
#[derive(Debug, Clone)]
pub struct ClassifiedItem {
    pub item: LineItem,
    pub classification: Classification,
    pub management: ManagementBucket,
}

pub struct ClassifierCascade {
    tiers: Vec<Arc<dyn Classifier>>,
    synonyms: Arc<SynonymTable>,
    max_concurrency: usize,
}

impl ClassifierCascade {
    /// The fixed rule -> oracle -> default chain. Without an oracle the chain is
    /// rule -> default.
    pub fn new(
        synonyms: Arc<SynonymTable>,
        oracle: Option<Arc<OracleClassifier>>,
        max_concurrency: usize,
    ) -> Self {
        let mut tiers: Vec<Arc<dyn Classifier>> =
            vec![Arc::new(RuleClassifier::new(synonyms.clone()))];
        if let Some(oracle) = oracle {
            tiers.push(oracle);
        }
        tiers.push(Arc::new(DefaultClassifier::new(synonyms.clone())));

        Self::with_tiers(synonyms, tiers, max_concurrency)
    }

    pub fn with_tiers(
        synonyms: Arc<SynonymTable>,
        tiers: Vec<Arc<dyn Classifier>>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            tiers,
            synonyms,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Single-tier management mapping: current / non-current by subcategory,
    /// equity flat.
    pub fn classify_management(&self, item: &LineItem) -> ManagementBucket {
        let term = self.synonyms.term_signal(item.subcategory_text());
        ManagementBucket::for_category(item.category, term)
    }

    /// Runs the regulatory chain. Never fails: a chain that yields nothing ends
    /// in the default bucket.
    pub async fn classify_regulatory(
        &self,
        item: &LineItem,
        cancel: &CancellationToken,
    ) -> Classification {
        let mut degraded = Vec::new();

        for tier in &self.tiers {
            let kind = tier.tier();
            if kind == ClassificationTier::Oracle && cancel.is_cancelled() {
                degraded.push("transform cancelled before the oracle was consulted".to_string());
                continue;
            }

            match tier.classify(item).await {
                Ok(Some(leaf)) if leaf.category() == item.category => {
                    debug!(
                        "'{}' -> {} via {:?} tier",
                        item.account_name, leaf, kind
                    );
                    return Classification {
                        item_id: item.id,
                        account_name: item.account_name.clone(),
                        leaf,
                        tier: kind,
                        degraded,
                    };
                }
                Ok(Some(leaf)) => {
                    warn!(
                        "{:?} tier placed {} item '{}' in {}; ignoring",
                        kind, item.category, item.account_name, leaf
                    );
                    degraded.push(format!(
                        "{:?} tier proposed {} outside the item's category",
                        kind, leaf
                    ));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("{}", e);
                    degraded.push(e.to_string());
                }
            }
        }

        let leaf = DefaultClassifier::new(self.synonyms.clone()).leaf_for(item);
        Classification {
            item_id: item.id,
            account_name: item.account_name.clone(),
            leaf,
            tier: ClassificationTier::Default,
            degraded,
        }
    }

    /// Classifies every item with bounded concurrency. Output order matches
    /// input order.
    pub async fn classify_all(
        &self,
        items: &[LineItem],
        cancel: &CancellationToken,
    ) -> Vec<ClassifiedItem> {
        let classified: Vec<ClassifiedItem> = stream::iter(items.iter())
            .map(|item| async move {
                let classification = self.classify_regulatory(item, cancel).await;
                ClassifiedItem {
                    item: item.clone(),
                    classification,
                    management: self.classify_management(item),
                }
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let count = |tier: ClassificationTier| {
            classified
                .iter()
                .filter(|c| c.classification.tier == tier)
                .count()
        };
        info!(
            "Classified {} items: {} by rule, {} by oracle, {} by default ({} degraded)",
            classified.len(),
            count(ClassificationTier::Rule),
            count(ClassificationTier::Oracle),
            count(ClassificationTier::Default),
            classified
                .iter()
                .filter(|c| c.classification.is_degraded())
                .count()
        );

        classified
    }
}
