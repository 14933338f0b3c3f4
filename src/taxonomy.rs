//! The two target taxonomies: the IFRS-style statement of financial position
//! (regulatory) and the management (MCFO) layout.
//!
//! Key names here are part of the serialized wire contract.

use crate::error::{Result, TransformError};
use crate::schema::{AdjustmentDirection, Category};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the serialized view shapes. Bump when any key name changes.
pub const VIEW_SCHEMA_VERSION: &str = "2.0";

/// Current / non-current split derived from a line item's subcategory text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    Current,
    NonCurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    NonCurrentAssets,
    CurrentAssets,
    Equity,
    NonCurrentLiabilities,
    CurrentLiabilities,
}

impl Section {
    /// Sections in statement order.
    pub const ALL: [Section; 5] = [
        Section::NonCurrentAssets,
        Section::CurrentAssets,
        Section::Equity,
        Section::NonCurrentLiabilities,
        Section::CurrentLiabilities,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Section::NonCurrentAssets => "non_current_assets",
            Section::CurrentAssets => "current_assets",
            Section::Equity => "equity",
            Section::NonCurrentLiabilities => "non_current_liabilities",
            Section::CurrentLiabilities => "current_liabilities",
        }
    }

    /// Key of the root the section hangs under.
    pub fn root_key(&self) -> &'static str {
        match self.category() {
            Category::Assets => "assets",
            Category::Liabilities | Category::Equity => "equity_and_liabilities",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Section::NonCurrentAssets | Section::CurrentAssets => Category::Assets,
            Section::Equity => Category::Equity,
            Section::NonCurrentLiabilities | Section::CurrentLiabilities => Category::Liabilities,
        }
    }

    pub fn for_category(category: Category, term: Term) -> Section {
        match (category, term) {
            (Category::Assets, Term::Current) => Section::CurrentAssets,
            (Category::Assets, Term::NonCurrent) => Section::NonCurrentAssets,
            (Category::Liabilities, Term::Current) => Section::CurrentLiabilities,
            (Category::Liabilities, Term::NonCurrent) => Section::NonCurrentLiabilities,
            (Category::Equity, _) => Section::Equity,
        }
    }

    pub fn leaves(&self) -> &'static [LeafKey] {
        match self {
            Section::NonCurrentAssets => &[
                LeafKey::PropertyPlantEquipment,
                LeafKey::IntangibleAssets,
                LeafKey::FinancialAssets,
                LeafKey::NonCurrentAssetsOther,
            ],
            Section::CurrentAssets => &[
                LeafKey::Inventories,
                LeafKey::TradeReceivables,
                LeafKey::CashAndEquivalents,
                LeafKey::CurrentAssetsOther,
            ],
            Section::Equity => &[
                LeafKey::ShareCapital,
                LeafKey::RetainedEarnings,
                LeafKey::OtherReserves,
            ],
            Section::NonCurrentLiabilities => &[
                LeafKey::LongTermBorrowings,
                LeafKey::DeferredTax,
                LeafKey::NonCurrentProvisions,
                LeafKey::NonCurrentLiabilitiesOther,
            ],
            Section::CurrentLiabilities => &[
                LeafKey::TradePayables,
                LeafKey::ShortTermBorrowings,
                LeafKey::CurrentProvisions,
                LeafKey::CurrentLiabilitiesOther,
            ],
        }
    }

    /// Catch-all leaf used by the default tier.
    pub fn fallback_leaf(&self) -> LeafKey {
        match self {
            Section::NonCurrentAssets => LeafKey::NonCurrentAssetsOther,
            Section::CurrentAssets => LeafKey::CurrentAssetsOther,
            Section::Equity => LeafKey::OtherReserves,
            Section::NonCurrentLiabilities => LeafKey::NonCurrentLiabilitiesOther,
            Section::CurrentLiabilities => LeafKey::CurrentLiabilitiesOther,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Section::NonCurrentAssets => "Non-Current Assets",
            Section::CurrentAssets => "Current Assets",
            Section::Equity => "Equity",
            Section::NonCurrentLiabilities => "Non-Current Liabilities",
            Section::CurrentLiabilities => "Current Liabilities",
        }
    }
}

/// A leaf bucket of the regulatory taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeafKey {
    PropertyPlantEquipment,
    IntangibleAssets,
    FinancialAssets,
    NonCurrentAssetsOther,
    Inventories,
    TradeReceivables,
    CashAndEquivalents,
    CurrentAssetsOther,
    ShareCapital,
    RetainedEarnings,
    OtherReserves,
    LongTermBorrowings,
    DeferredTax,
    NonCurrentProvisions,
    NonCurrentLiabilitiesOther,
    TradePayables,
    ShortTermBorrowings,
    CurrentProvisions,
    CurrentLiabilitiesOther,
}

impl LeafKey {
    pub fn all() -> impl Iterator<Item = LeafKey> {
        Section::ALL.iter().flat_map(|s| s.leaves().iter().copied())
    }

    pub fn section(&self) -> Section {
        match self {
            LeafKey::PropertyPlantEquipment
            | LeafKey::IntangibleAssets
            | LeafKey::FinancialAssets
            | LeafKey::NonCurrentAssetsOther => Section::NonCurrentAssets,
            LeafKey::Inventories
            | LeafKey::TradeReceivables
            | LeafKey::CashAndEquivalents
            | LeafKey::CurrentAssetsOther => Section::CurrentAssets,
            LeafKey::ShareCapital | LeafKey::RetainedEarnings | LeafKey::OtherReserves => {
                Section::Equity
            }
            LeafKey::LongTermBorrowings
            | LeafKey::DeferredTax
            | LeafKey::NonCurrentProvisions
            | LeafKey::NonCurrentLiabilitiesOther => Section::NonCurrentLiabilities,
            LeafKey::TradePayables
            | LeafKey::ShortTermBorrowings
            | LeafKey::CurrentProvisions
            | LeafKey::CurrentLiabilitiesOther => Section::CurrentLiabilities,
        }
    }

    pub fn category(&self) -> Category {
        self.section().category()
    }

    /// Key of the leaf inside its section, e.g. `provisions`.
    pub fn name(&self) -> &'static str {
        match self {
            LeafKey::PropertyPlantEquipment => "property_plant_equipment",
            LeafKey::IntangibleAssets => "intangible_assets",
            LeafKey::FinancialAssets => "financial_assets",
            LeafKey::Inventories => "inventories",
            LeafKey::TradeReceivables => "trade_receivables",
            LeafKey::CashAndEquivalents => "cash_and_equivalents",
            LeafKey::ShareCapital => "share_capital",
            LeafKey::RetainedEarnings => "retained_earnings",
            LeafKey::OtherReserves => "other_reserves",
            LeafKey::LongTermBorrowings => "long_term_borrowings",
            LeafKey::DeferredTax => "deferred_tax",
            LeafKey::NonCurrentProvisions | LeafKey::CurrentProvisions => "provisions",
            LeafKey::TradePayables => "trade_payables",
            LeafKey::ShortTermBorrowings => "short_term_borrowings",
            LeafKey::NonCurrentAssetsOther
            | LeafKey::CurrentAssetsOther
            | LeafKey::NonCurrentLiabilitiesOther
            | LeafKey::CurrentLiabilitiesOther => "other",
        }
    }

    /// Unambiguous `section.leaf` path, e.g. `current_liabilities.provisions`.
    pub fn path(&self) -> String {
        format!("{}.{}", self.section().key(), self.name())
    }

    pub fn label(&self) -> &'static str {
        match self {
            LeafKey::PropertyPlantEquipment => "Property Plant Equipment",
            LeafKey::IntangibleAssets => "Intangible Assets",
            LeafKey::FinancialAssets => "Financial Assets",
            LeafKey::Inventories => "Inventories",
            LeafKey::TradeReceivables => "Trade Receivables",
            LeafKey::CashAndEquivalents => "Cash and Equivalents",
            LeafKey::ShareCapital => "Share Capital",
            LeafKey::RetainedEarnings => "Retained Earnings",
            LeafKey::OtherReserves => "Other Reserves",
            LeafKey::LongTermBorrowings => "Long Term Borrowings",
            LeafKey::DeferredTax => "Deferred Tax",
            LeafKey::NonCurrentProvisions | LeafKey::CurrentProvisions => "Provisions",
            LeafKey::TradePayables => "Trade Payables",
            LeafKey::ShortTermBorrowings => "Short Term Borrowings",
            LeafKey::NonCurrentAssetsOther
            | LeafKey::CurrentAssetsOther
            | LeafKey::NonCurrentLiabilitiesOther
            | LeafKey::CurrentLiabilitiesOther => "Other",
        }
    }

    /// Direction that increases this leaf's balance.
    pub fn normal_direction(&self) -> AdjustmentDirection {
        match self.category() {
            Category::Assets => AdjustmentDirection::Debit,
            Category::Liabilities | Category::Equity => AdjustmentDirection::Credit,
        }
    }

    /// Parses a target key. Accepts a full path (`current_assets.other`) or a
    /// bare leaf name when it is unique across the taxonomy (`trade_receivables`).
    pub fn parse(key: &str) -> Result<LeafKey> {
        let key = key.trim();

        if let Some((section, leaf)) = key.split_once('.') {
            return LeafKey::all()
                .find(|l| l.section().key() == section && l.name() == leaf)
                .ok_or_else(|| {
                    TransformError::ValidationError(format!("Unknown regulatory leaf '{}'", key))
                });
        }

        let matches: Vec<LeafKey> = LeafKey::all().filter(|l| l.name() == key).collect();
        match matches.as_slice() {
            [leaf] => Ok(*leaf),
            [] => Err(TransformError::ValidationError(format!(
                "Unknown regulatory leaf '{}'",
                key
            ))),
            _ => Err(TransformError::ValidationError(format!(
                "Ambiguous regulatory leaf '{}': qualify it with a section, e.g. '{}'",
                key,
                matches[0].path()
            ))),
        }
    }

    /// Resolves an oracle answer (`category`, `subcategory_1`, `subcategory_2`)
    /// to a known leaf. Labels are matched loosely: case, punctuation and the
    /// word "and" are ignored.
    pub fn from_oracle_labels(category: &str, section: &str, leaf: &str) -> Option<LeafKey> {
        let section_label = compact_label(section);
        let section = Section::ALL
            .iter()
            .copied()
            .find(|s| compact_label(s.key()) == section_label)?;

        let category_label = compact_label(category);
        if !category_label.is_empty() && category_label != compact_label(section.root_key()) {
            return None;
        }

        let leaf_label = match compact_label(leaf).as_str() {
            "cashcashequivalents" => "cashequivalents".to_string(),
            "otherequity" => "otherreserves".to_string(),
            other => other.to_string(),
        };

        section
            .leaves()
            .iter()
            .copied()
            .find(|l| compact_label(l.name()) == leaf_label)
    }
}

impl fmt::Display for LeafKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section().key(), self.name())
    }
}

impl Serialize for LeafKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.path())
    }
}

impl<'de> Deserialize<'de> for LeafKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        LeafKey::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn compact_label(label: &str) -> String {
    label
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty() && *word != "and")
        .collect()
}

/// Bucket of the management (MCFO) layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagementBucket {
    AssetsCurrent,
    AssetsNonCurrent,
    LiabilitiesCurrent,
    LiabilitiesNonCurrent,
    Equity,
}

impl ManagementBucket {
    pub fn for_category(category: Category, term: Term) -> Self {
        match (category, term) {
            (Category::Assets, Term::Current) => ManagementBucket::AssetsCurrent,
            (Category::Assets, Term::NonCurrent) => ManagementBucket::AssetsNonCurrent,
            (Category::Liabilities, Term::Current) => ManagementBucket::LiabilitiesCurrent,
            (Category::Liabilities, Term::NonCurrent) => ManagementBucket::LiabilitiesNonCurrent,
            (Category::Equity, _) => ManagementBucket::Equity,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            ManagementBucket::AssetsCurrent | ManagementBucket::AssetsNonCurrent => {
                Category::Assets
            }
            ManagementBucket::LiabilitiesCurrent | ManagementBucket::LiabilitiesNonCurrent => {
                Category::Liabilities
            }
            ManagementBucket::Equity => Category::Equity,
        }
    }

    /// (group, list) keys, e.g. `("assets", "current")`.
    pub fn keys(&self) -> (&'static str, &'static str) {
        match self {
            ManagementBucket::AssetsCurrent => ("assets", "current"),
            ManagementBucket::AssetsNonCurrent => ("assets", "non_current"),
            ManagementBucket::LiabilitiesCurrent => ("liabilities", "current"),
            ManagementBucket::LiabilitiesNonCurrent => ("liabilities", "non_current"),
            ManagementBucket::Equity => ("equity", "items"),
        }
    }

    pub fn path(&self) -> String {
        let (group, list) = self.keys();
        format!("{}.{}", group, list)
    }
}
