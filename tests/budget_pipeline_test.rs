//! Integration tests for budget requests dispatched through the mediator
//!
//! Every request passes validation, logging and a handler backed by a
//! counting ledger, so the tests can see which calls reached storage.

use budget_kit::budget::validators::{INVALID_AMOUNT, INVALID_DATE};
use budget_kit::budget::{
    self, AddCategoryCommand, AddIncomeCommand, AddSpendingCommand, BudgetService, BudgetSummary,
    Category, CategoryKind, DateRange, DeleteSpendingCommand, GetCategoriesQuery,
    GetDashboardSummaryQuery, GetSpendingQuery, InMemoryBudgetService, Income, Money, NewCategory,
    NewIncome, NewSpending, Spending,
};
use budget_kit::pipeline::CancellationSignal;
use budget_kit::{CacheService, ErrorKind, Mediator, RequestContext, Result};
use chrono::{Duration, NaiveDate, Utc};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Ledger that counts the reads the cache is supposed to absorb.
#[derive(Default)]
struct CountingLedger {
    inner: InMemoryBudgetService,
    summaries: AtomicUsize,
    category_reads: AtomicUsize,
}

impl CountingLedger {
    fn summaries(&self) -> usize {
        self.summaries.load(Ordering::SeqCst)
    }

    fn category_reads(&self) -> usize {
        self.category_reads.load(Ordering::SeqCst)
    }
}

impl BudgetService for CountingLedger {
    fn get_categories(&self) -> BoxFuture<'_, Result<Vec<Category>>> {
        self.category_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_categories()
    }

    fn get_category(&self, id: i64) -> BoxFuture<'_, Result<Category>> {
        self.inner.get_category(id)
    }

    fn add_category(&self, category: NewCategory) -> BoxFuture<'_, Result<Category>> {
        self.inner.add_category(category)
    }

    fn update_category(&self, category: Category) -> BoxFuture<'_, Result<Category>> {
        self.inner.update_category(category)
    }

    fn delete_category(&self, id: i64) -> BoxFuture<'_, Result<()>> {
        self.inner.delete_category(id)
    }

    fn get_income(&self, range: DateRange) -> BoxFuture<'_, Result<Vec<Income>>> {
        self.inner.get_income(range)
    }

    fn add_income(&self, income: NewIncome) -> BoxFuture<'_, Result<Income>> {
        self.inner.add_income(income)
    }

    fn update_income(&self, income: Income) -> BoxFuture<'_, Result<Income>> {
        self.inner.update_income(income)
    }

    fn delete_income(&self, id: i64) -> BoxFuture<'_, Result<()>> {
        self.inner.delete_income(id)
    }

    fn get_spending(&self, range: DateRange) -> BoxFuture<'_, Result<Vec<Spending>>> {
        self.inner.get_spending(range)
    }

    fn add_spending(&self, spending: NewSpending) -> BoxFuture<'_, Result<Spending>> {
        self.inner.add_spending(spending)
    }

    fn update_spending(&self, spending: Spending) -> BoxFuture<'_, Result<Spending>> {
        self.inner.update_spending(spending)
    }

    fn delete_spending(&self, id: i64) -> BoxFuture<'_, Result<()>> {
        self.inner.delete_spending(id)
    }

    fn get_budget_summary(
        &self,
        range: DateRange,
        day: u32,
    ) -> BoxFuture<'_, Result<BudgetSummary>> {
        self.summaries.fetch_add(1, Ordering::SeqCst);
        self.inner.get_budget_summary(range, day)
    }
}

fn setup() -> (Arc<CountingLedger>, CacheService, Mediator) {
    let _ = env_logger::builder().is_test(true).try_init();

    let ledger = Arc::new(CountingLedger::default());
    let cache = CacheService::in_memory();
    let mediator = budget::register(Mediator::builder(), ledger.clone(), cache.clone())
        .build()
        .expect("Failed to build mediator");
    (ledger, cache, mediator)
}

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).expect("valid date")
}

fn september() -> GetDashboardSummaryQuery {
    GetDashboardSummaryQuery {
        start_date: date(9, 1),
        end_date: date(9, 30),
        day: 1,
    }
}

/// A start date after the end date is rejected before any storage call.
#[tokio::test]
async fn test_inverted_range_never_reaches_ledger() {
    let (ledger, cache, mediator) = setup();
    let today = Utc::now().date_naive();

    let err = mediator
        .send(GetDashboardSummaryQuery {
            start_date: today + Duration::days(5),
            end_date: today,
            day: 15,
        })
        .await
        .expect_err("inverted range should be rejected");

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.code(), INVALID_DATE);
    assert!(err.metadata().contains_key("start_date"));
    assert_eq!(ledger.summaries(), 0);
    assert!(cache.keys().is_empty());
}

/// The second identical summary query is served from the cache.
#[tokio::test]
async fn test_summary_is_cached() {
    let (ledger, cache, mediator) = setup();

    let first = mediator.send(september()).await.expect("Failed to load summary");
    let second = mediator.send(september()).await.expect("Failed to load summary");

    assert_eq!(first, second);
    assert_eq!(ledger.summaries(), 1);
    assert_eq!(cache.keys().len(), 1);

    let other_day = GetDashboardSummaryQuery {
        day: 15,
        ..september()
    };
    mediator.send(other_day).await.expect("Failed to load summary");
    assert_eq!(ledger.summaries(), 2);
}

/// Writes drop cached summaries so the next read sees them.
#[tokio::test]
async fn test_commands_invalidate_summary() {
    let (ledger, _cache, mediator) = setup();

    let before = mediator.send(september()).await.expect("Failed to load summary");
    assert_eq!(before.balance, Money::ZERO);

    mediator
        .send(AddIncomeCommand {
            date: date(9, 5),
            amount: Money::from_units(3_000),
            description: "  Salary  ".to_string(),
        })
        .await
        .expect("Failed to add income");
    let rent = mediator
        .send(AddSpendingCommand {
            date: date(9, 6),
            amount: Money::from_units(1_200),
            description: "Rent".to_string(),
            category_id: 2,
        })
        .await
        .expect("Failed to add spending");

    let after = mediator.send(september()).await.expect("Failed to load summary");
    assert_eq!(after.total_income, Money::from_units(3_000));
    assert_eq!(after.total_spending, Money::from_units(1_200));
    assert_eq!(after.balance, Money::from_units(1_800));
    assert_eq!(after.by_category[0].name, "Housing");
    assert_eq!(ledger.summaries(), 2);

    mediator
        .send(DeleteSpendingCommand { id: rent.id })
        .await
        .expect("Failed to delete spending");
    let last = mediator.send(september()).await.expect("Failed to load summary");
    assert_eq!(last.total_spending, Money::ZERO);
    assert_eq!(ledger.summaries(), 3);
}

/// Category reads are cached until a category is added.
#[tokio::test]
async fn test_categories_cache_and_invalidation() {
    let (ledger, _cache, mediator) = setup();

    let seeded = mediator.send(GetCategoriesQuery).await.expect("Failed to list");
    mediator.send(GetCategoriesQuery).await.expect("Failed to list");
    assert_eq!(seeded.len(), 8);
    assert_eq!(ledger.category_reads(), 1);

    let pets = mediator
        .send(AddCategoryCommand {
            name: "Pets".to_string(),
            kind: CategoryKind::Expense,
            color: "#795548".to_string(),
        })
        .await
        .expect("Failed to add category");

    let listed = mediator.send(GetCategoriesQuery).await.expect("Failed to list");
    assert!(listed.contains(&pets));
    assert_eq!(ledger.category_reads(), 2);

    let duplicate = mediator
        .send(AddCategoryCommand {
            name: "pets".to_string(),
            kind: CategoryKind::Expense,
            color: "#795548".to_string(),
        })
        .await
        .expect_err("duplicate name should conflict");
    assert_eq!(duplicate.kind(), ErrorKind::Conflict);
}

/// Several invalid fields are reported together.
#[tokio::test]
async fn test_command_validation_collects_failures() {
    let (_ledger, _cache, mediator) = setup();

    let err = mediator
        .send(AddSpendingCommand {
            date: date(9, 1),
            amount: Money::ZERO,
            description: String::new(),
            category_id: 0,
        })
        .await
        .expect_err("invalid command should be rejected");

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.code(), INVALID_AMOUNT);
    for property in ["amount", "description", "category_id"] {
        assert!(err.metadata().contains_key(property), "missing {}", property);
    }

    let spending = mediator
        .send(GetSpendingQuery {
            start_date: date(9, 1),
            end_date: date(9, 30),
        })
        .await
        .expect("Failed to list spending");
    assert!(spending.is_empty());
}

/// Spending against a category that does not exist surfaces `NotFound`.
#[tokio::test]
async fn test_unknown_category_is_not_found() {
    let (_ledger, _cache, mediator) = setup();

    let err = mediator
        .send(AddSpendingCommand {
            date: date(9, 1),
            amount: Money::from_cents(500),
            description: "Coffee".to_string(),
            category_id: 999,
        })
        .await
        .expect_err("unknown category should fail");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// A cancelled context short-circuits before the handler runs.
#[tokio::test]
async fn test_cancelled_request() {
    let (ledger, _cache, mediator) = setup();

    let signal = CancellationSignal::new();
    signal.cancel();
    let ctx = RequestContext::with_cancellation(signal);

    let err = mediator
        .send_with(&ctx, september())
        .await
        .expect_err("cancelled request should fail");
    assert_eq!(err.kind(), ErrorKind::Cancellation);
    assert_eq!(ledger.summaries(), 0);
}

/// Amounts above the per-row bound are rejected, so summaries stay summable.
#[tokio::test]
async fn test_oversized_income_is_rejected() {
    let (ledger, _cache, mediator) = setup();

    for _ in 0..2 {
        let err = mediator
            .send(AddIncomeCommand {
                date: date(9, 2),
                amount: Money::from_cents(i64::MAX / 2 + 1),
                description: "Windfall".to_string(),
            })
            .await
            .expect_err("oversized amount should be rejected");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.code(), INVALID_AMOUNT);
    }

    let summary = mediator.send(september()).await.expect("Failed to load summary");
    assert_eq!(summary.total_income, Money::ZERO);
    assert_eq!(ledger.summaries(), 1);
}
