use super::{ClassificationTier, Classifier};
use crate::error::Result;
use crate::schema::LineItem;
use crate::synonyms::SynonymTable;
use crate::taxonomy::{LeafKey, Section};
use async_trait::async_trait;
use std::sync::Arc;

/// Last tier: the catch-all leaf of the item's section. Never fails.
pub struct DefaultClassifier {
    synonyms: Arc<SynonymTable>,
}

impl DefaultClassifier {
    pub fn new(synonyms: Arc<SynonymTable>) -> Self {
        Self { synonyms }
    }

    pub fn leaf_for(&self, item: &LineItem) -> LeafKey {
        let term = self.synonyms.term_signal(item.subcategory_text());
        Section::for_category(item.category, term).fallback_leaf()
    }
}

#[async_trait]
impl Classifier for DefaultClassifier {
    fn tier(&self) -> ClassificationTier {
        ClassificationTier::Default
    }

    async fn classify(&self, item: &LineItem) -> Result<Option<LeafKey>> {
        Ok(Some(self.leaf_for(item)))
    }
}
