use super::{ClassificationTier, Classifier};
use crate::error::Result;
use crate::schema::{Category, LineItem};
use crate::synonyms::SynonymTable;
use crate::taxonomy::{LeafKey, Term};
use crate::utils::normalize_text;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

/// One row of the rule table: when the account name contains a term of
/// `pattern`, the item has `category`, and its subcategory signal equals `term`
/// (or `term` is `None`), the item goes to `leaf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub pattern: &'static str,
    pub category: Category,
    pub term: Option<Term>,
    pub leaf: LeafKey,
}

const fn rule(
    pattern: &'static str,
    category: Category,
    term: Option<Term>,
    leaf: LeafKey,
) -> Rule {
    Rule {
        pattern,
        category,
        term,
        leaf,
    }
}

/// Ordered; the first matching row wins.
pub const BUILTIN_RULES: &[Rule] = &[
    rule("cash", Category::Assets, Some(Term::Current), LeafKey::CashAndEquivalents),
    rule("receivable", Category::Assets, Some(Term::Current), LeafKey::TradeReceivables),
    rule("inventory", Category::Assets, Some(Term::Current), LeafKey::Inventories),
    rule(
        "property_plant_equipment",
        Category::Assets,
        Some(Term::NonCurrent),
        LeafKey::PropertyPlantEquipment,
    ),
    rule("intangible", Category::Assets, Some(Term::NonCurrent), LeafKey::IntangibleAssets),
    rule("financial_asset", Category::Assets, Some(Term::NonCurrent), LeafKey::FinancialAssets),
    rule("deferred_tax", Category::Liabilities, Some(Term::NonCurrent), LeafKey::DeferredTax),
    rule("payable", Category::Liabilities, Some(Term::Current), LeafKey::TradePayables),
    rule("borrowing", Category::Liabilities, Some(Term::Current), LeafKey::ShortTermBorrowings),
    rule("borrowing", Category::Liabilities, Some(Term::NonCurrent), LeafKey::LongTermBorrowings),
    rule("provision", Category::Liabilities, Some(Term::Current), LeafKey::CurrentProvisions),
    rule("provision", Category::Liabilities, Some(Term::NonCurrent), LeafKey::NonCurrentProvisions),
    rule("reserve", Category::Equity, None, LeafKey::OtherReserves),
    rule("retained_earnings", Category::Equity, None, LeafKey::RetainedEarnings),
    rule("share_capital", Category::Equity, None, LeafKey::ShareCapital),
];

/// Deterministic tier. Pure: the same item always yields the same leaf.
pub struct RuleClassifier {
    synonyms: Arc<SynonymTable>,
    rules: Vec<Rule>,
}

impl RuleClassifier {
    pub fn new(synonyms: Arc<SynonymTable>) -> Self {
        Self::with_rules(synonyms, BUILTIN_RULES.to_vec())
    }

    pub fn with_rules(synonyms: Arc<SynonymTable>, rules: Vec<Rule>) -> Self {
        for rule in &rules {
            if !synonyms.contains_key(rule.pattern) {
                debug!(
                    "Rule for {} uses unknown synonym key '{}' and will never match",
                    rule.leaf, rule.pattern
                );
            }
        }
        Self { synonyms, rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn match_item(&self, item: &LineItem) -> Option<LeafKey> {
        let name = normalize_text(&item.account_name);
        let term = self.synonyms.term_signal(item.subcategory_text());

        self.rules
            .iter()
            .find(|rule| {
                rule.category == item.category
                    && rule.term.map_or(true, |t| t == term)
                    && self.synonyms.matches_normalized(rule.pattern, &name)
            })
            .map(|rule| rule.leaf)
    }
}

#[async_trait]
impl Classifier for RuleClassifier {
    fn tier(&self) -> ClassificationTier {
        ClassificationTier::Rule
    }

    async fn classify(&self, item: &LineItem) -> Result<Option<LeafKey>> {
        Ok(self.match_item(item))
    }
}
