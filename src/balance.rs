use crate::error::{Result, TransformError};
use crate::schema::{Category, LineItem, NewLineItem};
use crate::utils::{checked_add, checked_sub, decimal_to_f64};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Default tolerance for `assets = liabilities + equity`, in currency units.
pub const DEFAULT_BALANCE_EPSILON: Decimal = dec!(0.01);

/// Result of testing a ledger against the accounting equation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCheck {
    pub is_balanced: bool,
    pub total_assets: Decimal,
    pub total_liabilities: Decimal,
    pub total_equity: Decimal,
    /// Absolute difference between assets and liabilities plus equity.
    pub difference: Decimal,
}

impl BalanceCheck {
    pub fn from_totals(
        total_assets: Decimal,
        total_liabilities: Decimal,
        total_equity: Decimal,
        epsilon: Decimal,
    ) -> Result<Self> {
        let liabilities_and_equity = checked_add(total_liabilities, total_equity)?;
        let difference = checked_sub(total_assets, liabilities_and_equity)?.abs();
        Ok(Self {
            is_balanced: difference < epsilon,
            total_assets,
            total_liabilities,
            total_equity,
            difference,
        })
    }

    /// Fails with a validation error when a category total overflows.
    pub fn from_amounts<I>(amounts: I, epsilon: Decimal) -> Result<Self>
    where
        I: IntoIterator<Item = (Category, Decimal)>,
    {
        let mut assets = Decimal::ZERO;
        let mut liabilities = Decimal::ZERO;
        let mut equity = Decimal::ZERO;

        for (category, amount) in amounts {
            let total = match category {
                Category::Assets => &mut assets,
                Category::Liabilities => &mut liabilities,
                Category::Equity => &mut equity,
            };
            *total = checked_add(*total, amount)?;
        }

        Self::from_totals(assets, liabilities, equity, epsilon)
    }

    pub fn for_new_items(items: &[NewLineItem], epsilon: Decimal) -> Result<Self> {
        Self::from_amounts(items.iter().map(|i| (i.category, i.amount)), epsilon)
    }

    pub fn for_items(items: &[LineItem], epsilon: Decimal) -> Result<Self> {
        Self::from_amounts(items.iter().map(|i| (i.category, i.amount)), epsilon)
    }

    pub fn total_liabilities_and_equity(&self) -> Decimal {
        self.total_liabilities.saturating_add(self.total_equity)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "is_balanced": self.is_balanced,
            "total_assets": decimal_to_f64(self.total_assets),
            "total_liabilities": decimal_to_f64(self.total_liabilities),
            "total_equity": decimal_to_f64(self.total_equity),
            "difference": decimal_to_f64(self.difference),
        })
    }
}

/// Compares the grand totals a builder produced with the balance check captured
/// at ingestion. Mismatches are reported, never corrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCrossCheck {
    pub ingested: BalanceCheck,
    pub view_total_assets: Decimal,
    pub view_total_liabilities_and_equity: Decimal,
    pub view_is_balanced: bool,
    pub matches_ingestion: bool,
}

impl BalanceCrossCheck {
    pub fn new(
        ingested: &BalanceCheck,
        view_total_assets: Decimal,
        view_total_liabilities_and_equity: Decimal,
        epsilon: Decimal,
    ) -> Self {
        let view_is_balanced = verify_accounting_equation(
            view_total_assets,
            view_total_liabilities_and_equity,
            epsilon,
        )
        .is_ok();

        let within =
            |a: Decimal, b: Decimal| a.checked_sub(b).is_some_and(|d| d.abs() < epsilon);
        let matches_ingestion = within(ingested.total_assets, view_total_assets)
            && within(
                ingested.total_liabilities_and_equity(),
                view_total_liabilities_and_equity,
            );

        Self {
            ingested: ingested.clone(),
            view_total_assets,
            view_total_liabilities_and_equity,
            view_is_balanced,
            matches_ingestion,
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.view_is_balanced {
            warnings.push(format!(
                "Statement is unbalanced: total assets {} vs total liabilities and equity {}",
                self.view_total_assets, self.view_total_liabilities_and_equity
            ));
        }
        if !self.matches_ingestion {
            warnings.push(format!(
                "View totals ({} / {}) differ from ingestion totals ({} / {})",
                self.view_total_assets,
                self.view_total_liabilities_and_equity,
                self.ingested.total_assets,
                self.ingested.total_liabilities_and_equity()
            ));
        }
        warnings
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "ingested": self.ingested.to_json(),
            "view_is_balanced": self.view_is_balanced,
            "matches_ingestion": self.matches_ingestion,
        })
    }
}

pub fn verify_accounting_equation(
    total_assets: Decimal,
    total_liabilities_and_equity: Decimal,
    tolerance: Decimal,
) -> Result<()> {
    let difference = total_assets
        .checked_sub(total_liabilities_and_equity)
        .map_or(Decimal::MAX, |d| d.abs());

    if difference >= tolerance {
        return Err(TransformError::BalanceMismatch {
            assets: total_assets,
            liabilities_and_equity: total_liabilities_and_equity,
            difference,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_ledger() {
        let check = BalanceCheck::from_amounts(
            vec![
                (Category::Assets, dec!(275000)),
                (Category::Liabilities, dec!(100000)),
                (Category::Equity, dec!(175000)),
            ],
            DEFAULT_BALANCE_EPSILON,
        )
        .unwrap();

        assert!(check.is_balanced);
        assert_eq!(check.difference, dec!(0));
        assert_eq!(check.total_liabilities_and_equity(), dec!(275000));
    }

    #[test]
    fn test_unbalanced_ledger_reports_difference() {
        let check = BalanceCheck::from_amounts(
            vec![
                (Category::Assets, dec!(50000)),
                (Category::Liabilities, dec!(15000)),
                (Category::Assets, dec!(75000)),
                (Category::Equity, dec!(100000)),
            ],
            DEFAULT_BALANCE_EPSILON,
        )
        .unwrap();

        assert!(!check.is_balanced);
        assert_eq!(check.total_assets, dec!(125000));
        assert_eq!(check.difference, dec!(10000));
    }

    #[test]
    fn test_epsilon_boundary() {
        let inside =
            BalanceCheck::from_totals(dec!(100.009), dec!(100), dec!(0), dec!(0.01)).unwrap();
        assert!(inside.is_balanced);

        let outside =
            BalanceCheck::from_totals(dec!(100.01), dec!(100), dec!(0), dec!(0.01)).unwrap();
        assert!(!outside.is_balanced);
    }

    #[test]
    fn test_accounting_equation_violation() {
        let result = verify_accounting_equation(dec!(10000), dec!(3000), dec!(0.01));
        assert!(matches!(
            result,
            Err(TransformError::BalanceMismatch { difference, .. }) if difference == dec!(7000)
        ));
    }

    #[test]
    fn test_cross_check_flags_drift() {
        let ingested =
            BalanceCheck::from_totals(dec!(100), dec!(60), dec!(40), dec!(0.01)).unwrap();
        let cross = BalanceCrossCheck::new(&ingested, dec!(120), dec!(100), dec!(0.01));

        assert!(!cross.view_is_balanced);
        assert!(!cross.matches_ingestion);
        assert_eq!(cross.warnings().len(), 2);
    }

    #[test]
    fn test_overflowing_totals_are_rejected() {
        let result = BalanceCheck::from_amounts(
            vec![(Category::Assets, Decimal::MAX), (Category::Assets, Decimal::MAX)],
            DEFAULT_BALANCE_EPSILON,
        );
        assert!(matches!(result, Err(TransformError::ValidationError(_))));

        let result = BalanceCheck::from_totals(dec!(1), Decimal::MAX, Decimal::MAX, dec!(0.01));
        assert!(result.is_err());
    }
}
