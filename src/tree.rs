//! Explicit statement tree. Items and adjustments are attached to leaves only;
//! every total is produced by one recursive fold, never accumulated inline.

use crate::classifier::ClassificationTier;
use crate::error::{Result, TransformError};
use crate::schema::{AdjustmentDirection, Category, LineItem};
use crate::utils::{checked_add, decimal_to_f64, sum_amounts};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedItem {
    pub item_id: Uuid,
    pub code: String,
    pub name: String,
    pub amount: Decimal,
    pub category: Category,
    pub subcategory: Option<String>,
    pub tier: Option<ClassificationTier>,
}

impl PlacedItem {
    pub fn new(item: &LineItem, tier: Option<ClassificationTier>) -> Self {
        Self {
            item_id: item.id,
            code: item.account_code.clone(),
            name: item.account_name.clone(),
            amount: item.amount,
            category: item.category,
            subcategory: item.subcategory.clone(),
            tier,
        }
    }

    fn to_json(&self) -> Value {
        let mut entry = json!({
            "id": self.item_id,
            "code": self.code,
            "name": self.name,
            "amount": decimal_to_f64(self.amount),
            "subcategory": self.subcategory.as_deref().unwrap_or("Other"),
        });
        if let (Some(tier), Value::Object(map)) = (self.tier, &mut entry) {
            map.insert("tier".to_string(), json!(tier));
        }
        entry
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedAdjustment {
    pub adjustment_id: Uuid,
    pub description: String,
    pub direction: AdjustmentDirection,
    /// Effect on the leaf total.
    pub signed_amount: Decimal,
    pub line_item_id: Option<Uuid>,
}

impl AppliedAdjustment {
    fn to_json(&self) -> Value {
        json!({
            "id": self.adjustment_id,
            "description": self.description,
            "direction": self.direction,
            "amount": decimal_to_f64(self.signed_amount),
            "line_item_id": self.line_item_id,
        })
    }
}

/// How leaves are written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafStyle {
    /// A bare array of items; totals live on the parent.
    List,
    /// `{ "items": [...], "adjustments": [...], "total": n }`.
    Object,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub key: String,
    pub children: Vec<Node>,
    pub items: Vec<PlacedItem>,
    pub adjustments: Vec<AppliedAdjustment>,
}

impl Node {
    pub fn leaf(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            children: Vec::new(),
            items: Vec::new(),
            adjustments: Vec::new(),
        }
    }

    pub fn branch(key: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            key: key.into(),
            children,
            items: Vec::new(),
            adjustments: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn child_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|c| c.key == key)
    }

    fn fold(&self, path: &str, totals: &mut BTreeMap<String, Decimal>) -> Result<Decimal> {
        let total = if self.is_leaf() {
            checked_add(
                sum_amounts(self.items.iter().map(|i| i.amount))?,
                sum_amounts(self.adjustments.iter().map(|a| a.signed_amount))?,
            )?
        } else {
            self.children.iter().try_fold(Decimal::ZERO, |acc, child| {
                checked_add(acc, child.fold(&join_path(path, &child.key), totals)?)
            })?
        };
        totals.insert(path.to_string(), total);
        Ok(total)
    }

    fn collect_leaves<'a>(&'a self, path: &str, out: &mut Vec<(String, &'a Node)>) {
        if self.is_leaf() {
            out.push((path.to_string(), self));
        } else {
            for child in &self.children {
                child.collect_leaves(&join_path(path, &child.key), out);
            }
        }
    }

    fn to_json(&self, path: &str, totals: &Totals, style: LeafStyle, with_total: bool) -> Value {
        if self.is_leaf() {
            let items: Vec<Value> = self.items.iter().map(PlacedItem::to_json).collect();
            return match style {
                LeafStyle::List => Value::Array(items),
                LeafStyle::Object => json!({
                    "items": items,
                    "adjustments": self
                        .adjustments
                        .iter()
                        .map(AppliedAdjustment::to_json)
                        .collect::<Vec<_>>(),
                    "total": decimal_to_f64(totals.get(path)),
                }),
            };
        }

        let mut map = Map::new();
        for child in &self.children {
            let child_path = join_path(path, &child.key);
            map.insert(child.key.clone(), child.to_json(&child_path, totals, style, true));
        }
        if with_total {
            map.insert("total".to_string(), json!(decimal_to_f64(totals.get(path))));
        }
        Value::Object(map)
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

/// Totals for every node, keyed by dotted path. The root is the empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Totals(BTreeMap<String, Decimal>);

impl Totals {
    pub fn get(&self, path: &str) -> Decimal {
        self.0.get(path).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Decimal)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementTree {
    root: Node,
}

impl StatementTree {
    pub fn new(children: Vec<Node>) -> Self {
        Self {
            root: Node::branch("", children),
        }
    }

    fn leaf_mut(&mut self, path: &str) -> Option<&mut Node> {
        let node = path
            .split('.')
            .try_fold(&mut self.root, |node, key| node.child_mut(key))?;
        node.is_leaf().then_some(node)
    }

    pub fn place(&mut self, path: &str, item: PlacedItem) -> Result<()> {
        let leaf = self.leaf_mut(path).ok_or_else(|| TransformError::ConservationViolation {
            taxonomy: "tree".to_string(),
            details: format!("item '{}' targeted missing leaf '{}'", item.name, path),
        })?;
        leaf.items.push(item);
        Ok(())
    }

    pub fn apply_adjustment(&mut self, path: &str, adjustment: AppliedAdjustment) -> Result<()> {
        let leaf = self.leaf_mut(path).ok_or_else(|| {
            TransformError::ValidationError(format!("adjustment targets missing leaf '{}'", path))
        })?;
        leaf.adjustments.push(adjustment);
        Ok(())
    }

    /// One recursive pass computing every node's total.
    pub fn fold(&self) -> Result<Totals> {
        let mut totals = BTreeMap::new();
        self.root.fold("", &mut totals)?;
        Ok(Totals(totals))
    }

    pub fn leaves(&self) -> Vec<(String, &Node)> {
        let mut out = Vec::new();
        self.root.collect_leaves("", &mut out);
        out
    }

    pub fn placed_items(&self) -> impl Iterator<Item = &PlacedItem> {
        self.leaves()
            .into_iter()
            .flat_map(|(_, node)| node.items.iter())
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Serializes the children of the root; callers add grand totals.
    pub fn to_json(&self, totals: &Totals, style: LeafStyle) -> Map<String, Value> {
        match self.root.to_json("", totals, style, false) {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Every input item appears in exactly one leaf, nothing else appears, and
    /// per-category sums of placed amounts equal the inputs.
    pub fn verify_conservation(&self, taxonomy: &str, items: &[LineItem]) -> Result<()> {
        let violation = |details: String| TransformError::ConservationViolation {
            taxonomy: taxonomy.to_string(),
            details,
        };

        let mut seen: HashMap<Uuid, usize> = HashMap::new();
        let mut placed_by_category: BTreeMap<Category, Decimal> = BTreeMap::new();
        for placed in self.placed_items() {
            *seen.entry(placed.item_id).or_default() += 1;
            let total = placed_by_category.entry(placed.category).or_default();
            *total = checked_add(*total, placed.amount)?;
        }

        for item in items {
            match seen.remove(&item.id) {
                Some(1) => {}
                Some(n) => {
                    return Err(violation(format!(
                        "item '{}' placed {} times",
                        item.account_name, n
                    )))
                }
                None => {
                    return Err(violation(format!(
                        "item '{}' was not placed",
                        item.account_name
                    )))
                }
            }
        }
        if let Some(extra) = seen.keys().next() {
            return Err(violation(format!("unknown item {} placed", extra)));
        }

        for category in Category::ALL {
            let expected = sum_amounts(
                items
                    .iter()
                    .filter(|i| i.category == category)
                    .map(|i| i.amount),
            )?;
            let placed = placed_by_category
                .get(&category)
                .copied()
                .unwrap_or(Decimal::ZERO);
            if placed != expected {
                return Err(violation(format!(
                    "{} placed {} but ledger holds {}",
                    category, placed, expected
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(name: &str, amount: Decimal, category: Category) -> LineItem {
        LineItem {
            id: Uuid::new_v4(),
            statement_id: Uuid::nil(),
            account_code: "1".to_string(),
            account_name: name.to_string(),
            amount,
            category,
            subcategory: None,
        }
    }

    fn tree() -> StatementTree {
        StatementTree::new(vec![
            Node::branch(
                "assets",
                vec![Node::leaf("current"), Node::leaf("non_current")],
            ),
            Node::branch("equity", vec![Node::leaf("items")]),
        ])
    }

    #[test]
    fn test_fold_sums_children() {
        let mut tree = tree();
        let cash = line("Cash", dec!(100.10), Category::Assets);
        let land = line("Land", dec!(200.20), Category::Assets);
        tree.place("assets.current", PlacedItem::new(&cash, None)).unwrap();
        tree.place("assets.non_current", PlacedItem::new(&land, None)).unwrap();

        let totals = tree.fold().unwrap();
        assert_eq!(totals.get("assets.current"), dec!(100.10));
        assert_eq!(totals.get("assets"), dec!(300.30));
        assert_eq!(totals.get("equity"), dec!(0));
        assert_eq!(totals.get(""), dec!(300.30));
    }

    #[test]
    fn test_adjustment_counts_in_leaf_total() {
        let mut tree = tree();
        tree.apply_adjustment(
            "equity.items",
            AppliedAdjustment {
                adjustment_id: Uuid::new_v4(),
                description: "Correction".to_string(),
                direction: AdjustmentDirection::Debit,
                signed_amount: dec!(-5),
                line_item_id: None,
            },
        )
        .unwrap();

        assert_eq!(tree.fold().unwrap().get("equity"), dec!(-5));
    }

    #[test]
    fn test_fold_reports_overflow() {
        let mut tree = tree();
        let cash = line("Cash", Decimal::MAX, Category::Assets);
        let land = line("Land", Decimal::MAX, Category::Assets);
        tree.place("assets.current", PlacedItem::new(&cash, None)).unwrap();
        tree.place("assets.non_current", PlacedItem::new(&land, None)).unwrap();

        assert!(matches!(tree.fold(), Err(TransformError::ValidationError(_))));
    }

    #[test]
    fn test_place_rejects_branch_or_missing_path() {
        let mut tree = tree();
        let cash = line("Cash", dec!(1), Category::Assets);

        assert!(tree.place("assets", PlacedItem::new(&cash, None)).is_err());
        assert!(tree.place("assets.other", PlacedItem::new(&cash, None)).is_err());
    }

    #[test]
    fn test_conservation_detects_drop_and_duplicate() {
        let cash = line("Cash", dec!(100), Category::Assets);
        let land = line("Land", dec!(50), Category::Assets);

        let mut dropped = tree();
        dropped.place("assets.current", PlacedItem::new(&cash, None)).unwrap();
        assert!(dropped
            .verify_conservation("test", &[cash.clone(), land.clone()])
            .is_err());

        let mut duplicated = tree();
        duplicated.place("assets.current", PlacedItem::new(&cash, None)).unwrap();
        duplicated.place("assets.non_current", PlacedItem::new(&cash, None)).unwrap();
        assert!(duplicated.verify_conservation("test", &[cash.clone()]).is_err());

        let mut exact = tree();
        exact.place("assets.current", PlacedItem::new(&cash, None)).unwrap();
        exact.place("assets.non_current", PlacedItem::new(&land, None)).unwrap();
        assert!(exact.verify_conservation("test", &[cash, land]).is_ok());
    }

    #[test]
    fn test_leaf_styles() {
        let mut tree = tree();
        let cash = line("Cash", dec!(100), Category::Assets);
        tree.place("assets.current", PlacedItem::new(&cash, None)).unwrap();
        let totals = tree.fold().unwrap();

        let list = tree.to_json(&totals, LeafStyle::List);
        assert!(list["assets"]["current"].is_array());
        assert_eq!(list["assets"]["total"], json!(100.0));
        assert!(list.get("total").is_none());

        let object = tree.to_json(&totals, LeafStyle::Object);
        assert_eq!(object["assets"]["current"]["total"], json!(100.0));
        assert_eq!(object["assets"]["current"]["items"][0]["name"], json!("Cash"));
    }
}
