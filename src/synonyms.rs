//! Declarative multilingual keyword table.
//!
//! Each canonical key maps to per-locale substrings. Rules and the
//! current / non-current signal refer to canonical keys only, so a new locale
//! is added by extending the table, either here or with [`SynonymTable::extend_from_json`].

use crate::error::Result;
use crate::taxonomy::Term;
use crate::utils::normalize_text;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CURRENT: &str = "current";
pub const NON_CURRENT: &str = "non_current";

type LocaleEntries = &'static [(&'static str, &'static [&'static str])];

const BUILTIN: &[(&str, LocaleEntries)] = &[
    (
        NON_CURRENT,
        &[
            (
                "en",
                &[
                    "non-current",
                    "non current",
                    "noncurrent",
                    "long-term",
                    "long term",
                    "fixed",
                ],
            ),
            ("ru", &["долгосроч", "внеоборот"]),
            ("uz", &["uzoq muddatli", "aylanmadan tashqari"]),
        ],
    ),
    (
        CURRENT,
        &[
            ("en", &["current", "short-term", "short term"]),
            ("ru", &["текущ", "краткосроч", "оборот"]),
            ("uz", &["joriy", "qisqa muddatli", "aylanma"]),
        ],
    ),
    (
        "cash",
        &[
            ("en", &["cash", "bank", "petty"]),
            ("ru", &["денежн", "касс", "расчетный счет", "расчётный счёт"]),
            ("uz", &["pul mablag", "kassa", "bank"]),
        ],
    ),
    (
        "receivable",
        &[
            ("en", &["receivable", "debtors"]),
            ("ru", &["дебитор"]),
            ("uz", &["debitorlik"]),
        ],
    ),
    (
        "inventory",
        &[
            ("en", &["inventor", "stock", "raw material", "finished goods", "merchandise"]),
            ("ru", &["запас", "товар", "сырь"]),
            ("uz", &["tovar", "zaxira"]),
        ],
    ),
    (
        "property_plant_equipment",
        &[
            (
                "en",
                &[
                    "property, plant",
                    "property plant",
                    "equipment",
                    "machinery",
                    "building",
                    "vehicle",
                    "furniture",
                    "fixed asset",
                ],
            ),
            ("ru", &["основные средства", "основных средств", "оборудован", "здани", "сооружен"]),
            ("uz", &["asosiy vosita", "uskuna", "bino"]),
        ],
    ),
    (
        "intangible",
        &[
            ("en", &["intangible", "goodwill", "software", "patent", "trademark"]),
            ("ru", &["нематериальн", "гудвил"]),
            ("uz", &["nomoddiy"]),
        ],
    ),
    (
        "financial_asset",
        &[
            ("en", &["investment", "financial asset", "securities"]),
            ("ru", &["финансовые вложения", "финансовых вложений", "инвестиц", "ценные бумаги"]),
            ("uz", &["investitsiya", "qimmatli qog"]),
        ],
    ),
    (
        "deferred_tax",
        &[
            ("en", &["deferred tax"]),
            ("ru", &["отложенн"]),
            ("uz", &["kechiktirilgan soliq"]),
        ],
    ),
    (
        "payable",
        &[
            ("en", &["payable", "creditors"]),
            ("ru", &["кредитор"]),
            ("uz", &["kreditorlik"]),
        ],
    ),
    (
        "borrowing",
        &[
            ("en", &["borrowing", "loan", "overdraft", "credit facility", "bond"]),
            ("ru", &["кредиты", "кредит банк", "заем", "заём", "займ"]),
            ("uz", &["kredit", "qarz"]),
        ],
    ),
    (
        "provision",
        &[
            ("en", &["provision"]),
            ("ru", &["оценочн"]),
            ("uz", &["rezerv"]),
        ],
    ),
    (
        "reserve",
        &[
            ("en", &["reserve"]),
            ("ru", &["резервный капитал", "добавочный капитал"]),
            ("uz", &["zaxira kapital", "qo'shimcha kapital"]),
        ],
    ),
    (
        "retained_earnings",
        &[
            ("en", &["retained", "earnings", "accumulated profit", "accumulated deficit"]),
            ("ru", &["нераспределенн", "нераспределённ"]),
            ("uz", &["taqsimlanmagan foyda"]),
        ],
    ),
    (
        "share_capital",
        &[
            ("en", &["capital", "common stock", "ordinary shares"]),
            ("ru", &["уставный капитал", "уставной капитал", "капитал"]),
            ("uz", &["ustav kapital", "kapital"]),
        ],
    ),
];

/// Canonical key -> locale -> substrings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymTable {
    entries: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl SynonymTable {
    pub fn builtin() -> Self {
        let mut table = Self::default();
        for (key, locales) in BUILTIN {
            for (locale, terms) in locales.iter() {
                table.add(key, locale, terms.iter().copied());
            }
        }
        table
    }

    /// Parses a table in the serialized shape `{"key": {"locale": ["term", ...]}}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let entries: BTreeMap<String, BTreeMap<String, Vec<String>>> = serde_json::from_str(json)?;
        let mut table = Self::default();
        for (key, locales) in entries {
            for (locale, terms) in locales {
                table.add(&key, &locale, terms.iter().map(String::as_str));
            }
        }
        Ok(table)
    }

    /// Merges additional locales or terms into this table.
    pub fn extend_from_json(&mut self, json: &str) -> Result<()> {
        let other = Self::from_json_str(json)?;
        for (key, locales) in other.entries {
            for (locale, terms) in locales {
                self.add(&key, &locale, terms.iter().map(String::as_str));
            }
        }
        Ok(())
    }

    pub fn add<'a, I>(&mut self, key: &str, locale: &str, terms: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let slot = self
            .entries
            .entry(key.to_string())
            .or_default()
            .entry(locale.to_string())
            .or_default();

        for term in terms {
            let term = normalize_text(term);
            if !term.is_empty() && !slot.contains(&term) {
                slot.push(term);
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn locales(&self) -> Vec<&str> {
        let mut locales: Vec<&str> = self
            .entries
            .values()
            .flat_map(|l| l.keys().map(String::as_str))
            .collect();
        locales.sort_unstable();
        locales.dedup();
        locales
    }

    /// True when `text` contains any term of `key`, in any locale.
    /// `text` must already be normalized with [`normalize_text`].
    pub fn matches_normalized(&self, key: &str, text: &str) -> bool {
        self.entries
            .get(key)
            .map(|locales| {
                locales
                    .values()
                    .flatten()
                    .any(|term| text.contains(term.as_str()))
            })
            .unwrap_or(false)
    }

    pub fn matches(&self, key: &str, text: &str) -> bool {
        self.matches_normalized(key, &normalize_text(text))
    }

    /// Current / non-current signal of a subcategory. Non-current markers win,
    /// since most languages spell "non-current" by prefixing "current". Text with
    /// neither marker is non-current.
    pub fn term_signal(&self, subcategory: &str) -> Term {
        let text = normalize_text(subcategory);
        if self.matches_normalized(NON_CURRENT, &text) {
            Term::NonCurrent
        } else if self.matches_normalized(CURRENT, &text) {
            Term::Current
        } else {
            Term::NonCurrent
        }
    }
}
