//! Turning uploaded ledger files into validated line items.

use crate::balance::{BalanceCheck, DEFAULT_BALANCE_EPSILON};
use crate::error::{Result, TransformError};
use crate::schema::{Category, NewLineItem};
use crate::utils::normalize_text;
use csv::{ReaderBuilder, StringRecord, Terminator, Trim, WriterBuilder};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Result of normalizing one upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLedger {
    pub success: bool,
    pub items: Vec<NewLineItem>,
    /// Per-row problems, e.g. `Row 4: Invalid amount 'abc'`.
    pub errors: Vec<String>,
    pub total_rows: usize,
    pub balance_check: BalanceCheck,
}

impl NormalizedLedger {
    pub fn from_items(
        items: Vec<NewLineItem>,
        errors: Vec<String>,
        total_rows: usize,
    ) -> Result<Self> {
        let balance_check = BalanceCheck::for_new_items(&items, DEFAULT_BALANCE_EPSILON)?;
        Ok(Self {
            success: true,
            items,
            errors,
            total_rows,
            balance_check,
        })
    }
}

pub trait Normalizer: Send + Sync {
    fn parse(&self, bytes: &[u8], filename: &str) -> Result<NormalizedLedger>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    AccountCode,
    AccountName,
    Amount,
    Category,
    Subcategory,
}

const COLUMN_NAMES: [(Column, &[&str]); 5] = [
    (
        Column::AccountCode,
        &["account code", "account_code", "код счета", "code", "код"],
    ),
    (
        Column::AccountName,
        &[
            "account name",
            "account_name",
            "наименование счета",
            "name",
            "наименование",
            "description",
        ],
    ),
    (Column::Amount, &["amount", "сумма", "balance", "value"]),
    (Column::Category, &["category", "категория", "type"]),
    (
        Column::Subcategory,
        &["subcategory", "sub category", "sub-category", "подкатегория"],
    ),
];

const CATEGORY_NAMES: [(Category, &[&str]); 3] = [
    (Category::Assets, &["assets", "asset", "активы"]),
    (
        Category::Liabilities,
        &["liabilities", "liability", "обязательства", "пассивы"],
    ),
    (Category::Equity, &["equity", "капитал", "собственный капитал"]),
];

const REQUIRED: [Column; 4] = [
    Column::AccountCode,
    Column::AccountName,
    Column::Amount,
    Column::Category,
];

fn column_label(column: Column) -> &'static str {
    match column {
        Column::AccountCode => "Account Code",
        Column::AccountName => "Account Name",
        Column::Amount => "Amount",
        Column::Category => "Category",
        Column::Subcategory => "Subcategory",
    }
}

/// Maps each known column to a header index. Exact header matches win over
/// substring matches, and a header is assigned at most once.
fn detect_columns(headers: &StringRecord) -> Vec<(Column, usize)> {
    let normalized: Vec<String> = headers
        .iter()
        .map(|h| normalize_text(h.trim_start_matches('\u{feff}')))
        .collect();
    let mut taken = vec![false; normalized.len()];
    let mut mapping = Vec::new();

    for exact in [true, false] {
        for (column, names) in COLUMN_NAMES {
            if mapping.iter().any(|(c, _)| *c == column) {
                continue;
            }
            let found = normalized.iter().enumerate().find(|(i, header)| {
                !taken[*i]
                    && names.iter().any(|name| {
                        if exact {
                            header.as_str() == *name
                        } else {
                            header.contains(name)
                        }
                    })
            });
            if let Some((index, _)) = found {
                taken[index] = true;
                mapping.push((column, index));
            }
        }
    }

    mapping
}

pub fn normalize_category(raw: &str) -> Option<Category> {
    let text = normalize_text(raw);
    CATEGORY_NAMES
        .iter()
        .find(|(_, names)| names.iter().any(|n| text.contains(n)))
        .map(|(category, _)| *category)
}

/// Parses an amount exactly. Spaces and comma groups of three digits are
/// thousands separators; a single comma followed by one or two digits is a
/// decimal separator. Anything else is rejected.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    if !compact.contains(',') {
        return Decimal::from_str(&compact).ok();
    }

    let (whole, fraction) = match compact.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (compact.as_str(), None),
    };
    let normalized = if is_thousands_grouped(whole) {
        let whole = whole.replace(',', "");
        match fraction {
            Some(fraction) => format!("{}.{}", whole, fraction),
            None => whole,
        }
    } else if fraction.is_none() && is_decimal_comma(whole) {
        whole.replacen(',', ".", 1)
    } else {
        return None;
    };
    Decimal::from_str(&normalized).ok()
}

/// `1,234` or `-1,234,567`: a leading group of one to three digits followed by
/// groups of exactly three.
fn is_thousands_grouped(whole: &str) -> bool {
    let digits = whole.strip_prefix('-').unwrap_or(whole);
    let mut groups = digits.split(',');
    let leading_ok = groups
        .next()
        .is_some_and(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()));
    let mut rest = groups.peekable();
    leading_ok
        && rest.peek().is_some()
        && rest.all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit()))
}

fn is_decimal_comma(whole: &str) -> bool {
    match whole.split_once(',') {
        Some((int_part, frac)) => {
            !int_part.contains(',')
                && (1..=2).contains(&frac.len())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// CSV normalizer with English and Russian header and category detection.
#[derive(Debug, Clone, Default)]
pub struct CsvNormalizer;

impl CsvNormalizer {
    pub fn new() -> Self {
        Self
    }

    fn parse_csv(&self, bytes: &[u8]) -> Result<NormalizedLedger> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(bytes);

        let headers = reader.headers()?.clone();
        let mapping = detect_columns(&headers);
        let missing: Vec<&str> = REQUIRED
            .iter()
            .filter(|c| !mapping.iter().any(|(m, _)| m == *c))
            .map(|c| column_label(*c))
            .collect();
        if !missing.is_empty() {
            return Err(TransformError::ValidationError(format!(
                "Missing required columns: {}",
                missing.join(", ")
            )));
        }
        let index_of = |column: Column| {
            mapping
                .iter()
                .find(|(c, _)| *c == column)
                .map(|(_, index)| *index)
        };
        let field = |record: &StringRecord, column: Column| -> String {
            index_of(column)
                .and_then(|i| record.get(i))
                .unwrap_or("")
                .trim()
                .to_string()
        };

        let mut items = Vec::new();
        let mut errors = Vec::new();
        let mut total_rows = 0;

        for (index, record) in reader.records().enumerate() {
            let row = index + 2;
            total_rows += 1;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    errors.push(format!("Row {}: {}", row, e));
                    continue;
                }
            };

            let code = field(&record, Column::AccountCode);
            let raw_amount = field(&record, Column::Amount);
            if code.is_empty() || raw_amount.is_empty() {
                continue;
            }

            let Some(amount) = parse_amount(&raw_amount) else {
                errors.push(format!("Row {}: Invalid amount '{}'", row, raw_amount));
                continue;
            };
            let raw_category = field(&record, Column::Category);
            let Some(category) = normalize_category(&raw_category) else {
                errors.push(format!("Row {}: Invalid category '{}'", row, raw_category));
                continue;
            };
            let subcategory = field(&record, Column::Subcategory);

            items.push(NewLineItem {
                account_code: code,
                account_name: field(&record, Column::AccountName),
                amount,
                category,
                subcategory: (!subcategory.is_empty()).then_some(subcategory),
            });
        }

        debug!(
            "Normalized {} of {} rows ({} errors)",
            items.len(),
            total_rows,
            errors.len()
        );
        NormalizedLedger::from_items(items, errors, total_rows)
    }
}

impl Normalizer for CsvNormalizer {
    fn parse(&self, bytes: &[u8], filename: &str) -> Result<NormalizedLedger> {
        if !filename.to_lowercase().ends_with(".csv") {
            return Err(TransformError::ValidationError(format!(
                "Unsupported file format: {}. Please upload a .csv file",
                filename
            )));
        }

        let ledger = self.parse_csv(bytes)?;
        if !ledger.balance_check.is_balanced {
            warn!(
                "{}: assets {} vs liabilities and equity {} (difference {})",
                filename,
                ledger.balance_check.total_assets,
                ledger.balance_check.total_liabilities_and_equity(),
                ledger.balance_check.difference
            );
        }
        Ok(ledger)
    }
}

/// Sample upload with the expected headers.
pub fn template_csv() -> Result<String> {
    let rows = [
        ("1010", "Cash on Hand", "50000", "assets", "Current Assets"),
        ("1020", "Bank Account", "150000", "assets", "Current Assets"),
        ("1030", "Accounts Receivable", "75000", "assets", "Current Assets"),
        ("2010", "Accounts Payable", "60000", "liabilities", "Current Liabilities"),
        ("2020", "Short-term Loan", "40000", "liabilities", "Current Liabilities"),
        ("3010", "Share Capital", "150000", "equity", "Share Capital"),
        ("3020", "Retained Earnings", "25000", "equity", "Retained Earnings"),
    ];

    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(["Account Code", "Account Name", "Amount", "Category", "Subcategory"])?;
    for (code, name, amount, category, subcategory) in rows {
        writer.write_record([code, name, amount, category, subcategory])?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes)
        .map_err(|e| TransformError::ValidationError(format!("Template is not UTF-8: {}", e)))
}
