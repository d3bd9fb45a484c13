//! Budget domain types.

use crate::error::{codes, Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

/// Monetary amount in integer cents.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Whole currency units, e.g. `Money::from_units(12)` is 12.00.
    pub const fn from_units(units: i64) -> Self {
        Money(units * 100)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }
}

fn overflow(what: &str) -> Error {
    Error::system(
        codes::AMOUNT_OVERFLOW,
        format!("{} is too large to represent", what),
    )
}

/// Sum without wrapping; `None` on overflow.
fn checked_total(amounts: impl IntoIterator<Item = Money>) -> Option<Money> {
    amounts
        .into_iter()
        .try_fold(Money::ZERO, |acc, amount| acc.checked_add(amount))
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategoryKind {
    Income,
    Expense,
}

impl CategoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryKind::Income => "Income",
            CategoryKind::Expense => "Expense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Income" => Some(CategoryKind::Income),
            "Expense" => Some(CategoryKind::Expense),
            _ => None,
        }
    }
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub kind: CategoryKind,
    /// `#RRGGBB`
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub kind: CategoryKind,
    pub color: String,
}

impl NewCategory {
    pub fn with_id(self, id: i64) -> Category {
        Category {
            id,
            name: self.name,
            kind: self.kind,
            color: self.color,
        }
    }
}

/// Categories every fresh ledger starts with.
pub const DEFAULT_CATEGORIES: &[(&str, CategoryKind, &str)] = &[
    ("Salary", CategoryKind::Income, "#2E7D32"),
    ("Housing", CategoryKind::Expense, "#6D4C41"),
    ("Food", CategoryKind::Expense, "#F9A825"),
    ("Transportation", CategoryKind::Expense, "#1565C0"),
    ("Utilities", CategoryKind::Expense, "#00838F"),
    ("Entertainment", CategoryKind::Expense, "#AD1457"),
    ("Healthcare", CategoryKind::Expense, "#C62828"),
    ("Other", CategoryKind::Expense, "#757575"),
];

pub fn default_categories() -> Vec<Category> {
    DEFAULT_CATEGORIES
        .iter()
        .zip(1_i64..)
        .map(|((name, kind, color), id)| Category {
            id,
            name: name.to_string(),
            kind: *kind,
            color: color.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Income {
    pub id: i64,
    pub date: NaiveDate,
    pub amount: Money,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIncome {
    pub date: NaiveDate,
    pub amount: Money,
    pub description: String,
}

impl NewIncome {
    pub fn with_id(self, id: i64) -> Income {
        Income {
            id,
            date: self.date,
            amount: self.amount,
            description: self.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spending {
    pub id: i64,
    pub date: NaiveDate,
    pub amount: Money,
    pub description: String,
    pub category_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSpending {
    pub date: NaiveDate,
    pub amount: Money,
    pub description: String,
    pub category_id: i64,
}

impl NewSpending {
    pub fn with_id(self, id: i64) -> Spending {
        Spending {
            id,
            date: self.date,
            amount: self.amount,
            description: self.description,
            category_id: self.category_id,
        }
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category_id: i64,
    pub name: String,
    pub total: Money,
}

/// Income and spending totals over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Day of month the budget cycle starts on.
    pub day: u32,
    pub total_income: Money,
    pub total_spending: Money,
    pub balance: Money,
    /// Spending per category, largest first.
    pub by_category: Vec<CategoryTotal>,
}

impl BudgetSummary {
    /// Summarize the rows that fall inside `range`.
    ///
    /// Spending on a category missing from `categories` is reported under
    /// the name `"Uncategorized"`.
    pub fn compute(
        range: DateRange,
        day: u32,
        categories: &[Category],
        income: &[Income],
        spending: &[Spending],
    ) -> Result<Self> {
        let total_income = checked_total(
            income
                .iter()
                .filter(|i| range.contains(i.date))
                .map(|i| i.amount),
        )
        .ok_or_else(|| overflow("Total income"))?;

        let mut per_category: HashMap<i64, Money> = HashMap::new();
        for s in spending.iter().filter(|s| range.contains(s.date)) {
            let total = per_category.entry(s.category_id).or_default();
            *total = total
                .checked_add(s.amount)
                .ok_or_else(|| overflow("Category spending"))?;
        }

        let names: HashMap<i64, &str> = categories
            .iter()
            .map(|c| (c.id, c.name.as_str()))
            .collect();

        let by_category = per_category
            .into_iter()
            .map(|(category_id, total)| CategoryTotal {
                category_id,
                name: names
                    .get(&category_id)
                    .copied()
                    .unwrap_or("Uncategorized")
                    .to_string(),
                total,
            })
            .collect();

        Self::from_totals(range, day, total_income, by_category)
    }

    /// Build a summary from precomputed totals; sorts `by_category`.
    ///
    /// # Errors
    /// - `System` (`AMOUNT_OVERFLOW`) if the totals do not fit in an `i64`
    ///   of cents
    pub fn from_totals(
        range: DateRange,
        day: u32,
        total_income: Money,
        mut by_category: Vec<CategoryTotal>,
    ) -> Result<Self> {
        by_category.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
        let total_spending = checked_total(by_category.iter().map(|c| c.total))
            .ok_or_else(|| overflow("Total spending"))?;
        let balance = total_income
            .checked_sub(total_spending)
            .ok_or_else(|| overflow("Balance"))?;

        Ok(BudgetSummary {
            start_date: range.start,
            end_date: range.end,
            day,
            total_income,
            total_spending,
            balance,
            by_category,
        })
    }
}
