//! The order document passed between kitchen stages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Money amount represented in cents to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a dollar value.
    pub fn from_dollars(dollars: i64) -> Self {
        Self {
            cents: dollars * 100,
        }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents * quantity as i64,
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents += rhs.cents;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// One ordered dish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub name: String,
    pub qty: u32,
    /// Unit price, set by pricing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
}

impl OrderLine {
    pub fn new(name: impl Into<String>, qty: u32) -> Self {
        Self {
            name: name.into(),
            qty,
            price: None,
        }
    }

    /// Line total, if the line has been priced.
    pub fn total(&self) -> Option<Money> {
        self.price.map(|p| p.multiply(self.qty))
    }
}

/// Ingredient used while cooking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub qty: u32,
}

impl Ingredient {
    pub fn new(name: impl Into<String>, qty: u32) -> Self {
        Self {
            name: name.into(),
            qty,
        }
    }
}

/// Order document enriched by each stage.
///
/// `reference` is the stable identity every stage and the saga key on.
/// Cloning is a deep copy, so handlers receiving the same publication never
/// share mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDocument {
    pub reference: String,

    #[serde(default)]
    pub lines: Vec<OrderLine>,

    #[serde(default)]
    pub ingredients: Vec<Ingredient>,

    #[serde(default)]
    pub cooked: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooked_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cook_time_secs: Option<u32>,

    #[serde(default)]
    pub paid: bool,

    /// Free-form fields the kitchen passes through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl OrderDocument {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            lines: Vec::new(),
            ingredients: Vec::new(),
            cooked: false,
            cooked_by: None,
            cook_time_secs: None,
            paid: false,
            extra: BTreeMap::new(),
        }
    }

    /// Builder-style line addition.
    pub fn with_line(mut self, name: impl Into<String>, qty: u32) -> Self {
        self.add_line(name, qty);
        self
    }

    pub fn add_line(&mut self, name: impl Into<String>, qty: u32) {
        self.lines.push(OrderLine::new(name, qty));
    }

    /// Sets a pass-through field.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.extra.insert(name.into(), value.into());
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    /// True once every line carries a price.
    pub fn is_priced(&self) -> bool {
        !self.lines.is_empty() && self.lines.iter().all(|l| l.price.is_some())
    }

    /// Sum of all priced lines.
    pub fn total(&self) -> Money {
        self.lines.iter().filter_map(OrderLine::total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
        assert_eq!(Money::from_dollars(12).to_string(), "$12.00");
    }

    #[test]
    fn test_money_sum() {
        let total: Money = [Money::from_cents(100), Money::from_cents(250)]
            .into_iter()
            .sum();
        assert_eq!(total.cents(), 350);
    }

    #[test]
    fn test_total_counts_only_priced_lines() {
        let mut order = OrderDocument::new("ABC-1")
            .with_line("Cheese Pizza", 2)
            .with_line("Salad", 1);
        assert!(!order.is_priced());
        assert_eq!(order.total(), Money::zero());

        order.lines[0].price = Some(Money::from_dollars(12));
        assert!(!order.is_priced());
        assert_eq!(order.total(), Money::from_dollars(24));

        order.lines[1].price = Some(Money::from_dollars(5));
        assert!(order.is_priced());
        assert_eq!(order.total(), Money::from_dollars(29));
    }

    #[test]
    fn test_clone_is_deep() {
        let original = OrderDocument::new("ABC-1").with_line("Cheese Pizza", 1);
        let mut copy = original.clone();
        copy.lines[0].qty = 5;
        copy.set_field("table", 4);

        assert_eq!(original.lines[0].qty, 1);
        assert!(original.field("table").is_none());
    }

    #[test]
    fn test_extra_fields_survive_json() {
        let json = r#"{"reference":"ABC-7","lines":[{"name":"Cheese Pizza","qty":1}],"table":12,"notes":"no onions"}"#;
        let order: OrderDocument = serde_json::from_str(json).unwrap();

        assert_eq!(order.reference, "ABC-7");
        assert_eq!(order.lines[0].price, None);
        assert!(!order.cooked);
        assert_eq!(order.field("table"), Some(&Value::from(12)));
        assert_eq!(order.field("notes"), Some(&Value::from("no onions")));

        let back: Value = serde_json::to_value(&order).unwrap();
        assert_eq!(back["table"], 12);
        assert_eq!(back["notes"], "no onions");
    }
}
