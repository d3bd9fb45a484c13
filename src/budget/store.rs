//! Budget data access.
//!
//! The `BudgetService` trait decouples request handlers from where ledger
//! rows live. Two implementations ship with the crate:
//!
//! - [`InMemoryBudgetService`]: seeded with the default categories, used in
//!   tests and as a scratch ledger.
//! - `SqliteBudgetService` (feature `sqlite`): the persistent ledger.
//!
//! # Mocking for Tests
//!
//! Every method returns a boxed future, so a test double only has to
//! implement the calls it cares about by delegating the rest:
//!
//! ```ignore
//! struct CountingSummaries {
//!     inner: InMemoryBudgetService,
//!     calls: AtomicUsize,
//! }
//!
//! impl BudgetService for CountingSummaries {
//!     fn get_budget_summary(&self, range: DateRange, day: u32) -> BoxFuture<'_, Result<BudgetSummary>> {
//!         self.calls.fetch_add(1, Ordering::SeqCst);
//!         self.inner.get_budget_summary(range, day)
//!     }
//!     // ...
//! }
//! ```
//!
//! # Error Handling
//!
//! - Missing rows → `NotFound`
//! - Duplicate category names, deleting a category that is still in use →
//!   `Conflict`
//! - Storage failures → `System`

use super::models::{
    default_categories, BudgetSummary, Category, DateRange, Income, NewCategory, NewIncome,
    NewSpending, Spending,
};
use crate::error::{codes, Error, Result};
use futures::future::{self, BoxFuture};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Async access to categories, income and spending.
pub trait BudgetService: Send + Sync + 'static {
    fn get_categories(&self) -> BoxFuture<'_, Result<Vec<Category>>>;

    fn get_category(&self, id: i64) -> BoxFuture<'_, Result<Category>>;

    fn add_category(&self, category: NewCategory) -> BoxFuture<'_, Result<Category>>;

    fn update_category(&self, category: Category) -> BoxFuture<'_, Result<Category>>;

    fn delete_category(&self, id: i64) -> BoxFuture<'_, Result<()>>;

    /// Income rows dated inside `range`, oldest first.
    fn get_income(&self, range: DateRange) -> BoxFuture<'_, Result<Vec<Income>>>;

    fn add_income(&self, income: NewIncome) -> BoxFuture<'_, Result<Income>>;

    fn update_income(&self, income: Income) -> BoxFuture<'_, Result<Income>>;

    fn delete_income(&self, id: i64) -> BoxFuture<'_, Result<()>>;

    /// Spending rows dated inside `range`, oldest first.
    fn get_spending(&self, range: DateRange) -> BoxFuture<'_, Result<Vec<Spending>>>;

    fn add_spending(&self, spending: NewSpending) -> BoxFuture<'_, Result<Spending>>;

    fn update_spending(&self, spending: Spending) -> BoxFuture<'_, Result<Spending>>;

    fn delete_spending(&self, id: i64) -> BoxFuture<'_, Result<()>>;

    /// Totals for `range`.
    ///
    /// The default implementation loads the three row sets concurrently and
    /// folds them with [`BudgetSummary::compute`].
    fn get_budget_summary(&self, range: DateRange, day: u32) -> BoxFuture<'_, Result<BudgetSummary>> {
        Box::pin(async move {
            let (categories, income, spending) = futures::try_join!(
                self.get_categories(),
                self.get_income(range),
                self.get_spending(range)
            )?;
            BudgetSummary::compute(range, day, &categories, &income, &spending)
        })
    }
}

pub(crate) fn missing(entity: &str, id: i64) -> Error {
    Error::not_found(codes::NOT_FOUND, format!("{} {} not found", entity, id))
        .with_metadata("entity", entity)
        .with_metadata("id", id)
}

pub(crate) fn duplicate_category(name: &str) -> Error {
    Error::conflict(
        codes::CONFLICT,
        format!("A category named '{}' already exists", name),
    )
    .with_metadata("name", name)
}

pub(crate) fn category_in_use(id: i64) -> Error {
    Error::conflict(
        codes::CONFLICT,
        format!("Category {} still has spending recorded against it", id),
    )
    .with_metadata("id", id)
}

// ============================================================================
// In-Memory Ledger
// ============================================================================

#[derive(Debug)]
struct Ledger {
    categories: BTreeMap<i64, Category>,
    income: BTreeMap<i64, Income>,
    spending: BTreeMap<i64, Spending>,
    next_id: i64,
}

impl Ledger {
    fn seeded() -> Self {
        let categories: BTreeMap<i64, Category> = default_categories()
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        let next_id = categories.keys().max().copied().unwrap_or(0) + 1;
        Ledger {
            categories,
            income: BTreeMap::new(),
            spending: BTreeMap::new(),
            next_id,
        }
    }

    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn name_taken(&self, name: &str, except: Option<i64>) -> bool {
        self.categories
            .values()
            .any(|c| Some(c.id) != except && c.name.eq_ignore_ascii_case(name))
    }
}

/// Ledger kept in process memory.
///
/// Starts with the default categories. Ids are shared across categories,
/// income and spending and never reused.
#[derive(Debug)]
pub struct InMemoryBudgetService {
    ledger: RwLock<Ledger>,
}

impl Default for InMemoryBudgetService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBudgetService {
    pub fn new() -> Self {
        InMemoryBudgetService {
            ledger: RwLock::new(Ledger::seeded()),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Ledger) -> T) -> T {
        let ledger = self
            .ledger
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&ledger)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Ledger) -> T) -> T {
        let mut ledger = self
            .ledger
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut ledger)
    }
}

impl BudgetService for InMemoryBudgetService {
    fn get_categories(&self) -> BoxFuture<'_, Result<Vec<Category>>> {
        let categories = self.read(|l| l.categories.values().cloned().collect());
        Box::pin(future::ready(Ok(categories)))
    }

    fn get_category(&self, id: i64) -> BoxFuture<'_, Result<Category>> {
        let found = self.read(|l| l.categories.get(&id).cloned());
        Box::pin(future::ready(found.ok_or_else(|| missing("Category", id))))
    }

    fn add_category(&self, category: NewCategory) -> BoxFuture<'_, Result<Category>> {
        let result = self.write(|l| {
            if l.name_taken(&category.name, None) {
                return Err(duplicate_category(&category.name));
            }
            let created = category.with_id(l.allocate_id());
            l.categories.insert(created.id, created.clone());
            Ok(created)
        });
        Box::pin(future::ready(result))
    }

    fn update_category(&self, category: Category) -> BoxFuture<'_, Result<Category>> {
        let result = self.write(|l| {
            if !l.categories.contains_key(&category.id) {
                return Err(missing("Category", category.id));
            }
            if l.name_taken(&category.name, Some(category.id)) {
                return Err(duplicate_category(&category.name));
            }
            l.categories.insert(category.id, category.clone());
            Ok(category)
        });
        Box::pin(future::ready(result))
    }

    fn delete_category(&self, id: i64) -> BoxFuture<'_, Result<()>> {
        let result = self.write(|l| {
            if !l.categories.contains_key(&id) {
                return Err(missing("Category", id));
            }
            if l.spending.values().any(|s| s.category_id == id) {
                return Err(category_in_use(id));
            }
            l.categories.remove(&id);
            Ok(())
        });
        Box::pin(future::ready(result))
    }

    fn get_income(&self, range: DateRange) -> BoxFuture<'_, Result<Vec<Income>>> {
        let mut rows: Vec<Income> = self.read(|l| {
            l.income
                .values()
                .filter(|i| range.contains(i.date))
                .cloned()
                .collect()
        });
        rows.sort_by_key(|i| (i.date, i.id));
        Box::pin(future::ready(Ok(rows)))
    }

    fn add_income(&self, income: NewIncome) -> BoxFuture<'_, Result<Income>> {
        let created = self.write(|l| {
            let created = income.with_id(l.allocate_id());
            l.income.insert(created.id, created.clone());
            created
        });
        Box::pin(future::ready(Ok(created)))
    }

    fn update_income(&self, income: Income) -> BoxFuture<'_, Result<Income>> {
        let result = self.write(|l| match l.income.get_mut(&income.id) {
            Some(row) => {
                *row = income.clone();
                Ok(income)
            }
            None => Err(missing("Income", income.id)),
        });
        Box::pin(future::ready(result))
    }

    fn delete_income(&self, id: i64) -> BoxFuture<'_, Result<()>> {
        let result = self.write(|l| match l.income.remove(&id) {
            Some(_) => Ok(()),
            None => Err(missing("Income", id)),
        });
        Box::pin(future::ready(result))
    }

    fn get_spending(&self, range: DateRange) -> BoxFuture<'_, Result<Vec<Spending>>> {
        let mut rows: Vec<Spending> = self.read(|l| {
            l.spending
                .values()
                .filter(|s| range.contains(s.date))
                .cloned()
                .collect()
        });
        rows.sort_by_key(|s| (s.date, s.id));
        Box::pin(future::ready(Ok(rows)))
    }

    fn add_spending(&self, spending: NewSpending) -> BoxFuture<'_, Result<Spending>> {
        let result = self.write(|l| {
            if !l.categories.contains_key(&spending.category_id) {
                return Err(missing("Category", spending.category_id));
            }
            let created = spending.with_id(l.allocate_id());
            l.spending.insert(created.id, created.clone());
            Ok(created)
        });
        Box::pin(future::ready(result))
    }

    fn update_spending(&self, spending: Spending) -> BoxFuture<'_, Result<Spending>> {
        let result = self.write(|l| {
            if !l.categories.contains_key(&spending.category_id) {
                return Err(missing("Category", spending.category_id));
            }
            match l.spending.get_mut(&spending.id) {
                Some(row) => {
                    *row = spending.clone();
                    Ok(spending)
                }
                None => Err(missing("Spending", spending.id)),
            }
        });
        Box::pin(future::ready(result))
    }

    fn delete_spending(&self, id: i64) -> BoxFuture<'_, Result<()>> {
        let result = self.write(|l| match l.spending.remove(&id) {
            Some(_) => Ok(()),
            None => Err(missing("Spending", id)),
        });
        Box::pin(future::ready(result))
    }
}
