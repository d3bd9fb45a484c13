//! Request handlers backed by a [`BudgetService`] and the cache.

use super::models::{BudgetSummary, Category, DateRange, Income, NewCategory, NewIncome, NewSpending, Spending};
use super::requests::{
    AddCategoryCommand, AddIncomeCommand, AddSpendingCommand, DeleteIncomeCommand,
    DeleteSpendingCommand, GetCategoriesQuery, GetDashboardSummaryQuery, GetIncomeQuery,
    GetSpendingQuery,
};
use super::store::BudgetService;
use crate::error::Result;
use crate::key::CacheKeyBuilder;
use crate::pipeline::{Handler, RequestContext};
use crate::service::CacheService;
use futures::future::BoxFuture;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

pub const SUMMARY_CACHE_PREFIX: &str = "budget:summary";
pub const CATEGORIES_CACHE_KEY: &str = "budget:categories";

pub const SUMMARY_TTL: Duration = Duration::from_secs(5 * 60);
pub const CATEGORIES_TTL: Duration = Duration::from_secs(30 * 60);

const SUMMARY_PATTERN: &str = "budget:summary:*";

/// Cache key for one dashboard summary.
pub fn summary_key(query: &GetDashboardSummaryQuery) -> String {
    CacheKeyBuilder::build_with_prefix(
        SUMMARY_CACHE_PREFIX,
        &[
            query.start_date.into(),
            query.end_date.into(),
            query.day.into(),
        ],
    )
}

/// Handler for one budget request type `R`.
pub struct BudgetHandler<R> {
    service: Arc<dyn BudgetService>,
    cache: CacheService,
    _request: PhantomData<fn() -> R>,
}

impl<R> BudgetHandler<R> {
    pub fn new(service: Arc<dyn BudgetService>, cache: CacheService) -> Self {
        BudgetHandler {
            service,
            cache,
            _request: PhantomData,
        }
    }

    /// Drop cached entries matching each glob pattern.
    ///
    /// Failures are logged; the command that triggered them still succeeds.
    async fn invalidate(&self, patterns: &[&str]) {
        for pattern in patterns {
            match self.cache.remove_by_pattern(pattern).await {
                Ok(0) => {}
                Ok(removed) => debug!("✓ Invalidated {} cached entries for {}", removed, pattern),
                Err(e) => warn!("⚠ Cache invalidation failed for {}: {}", pattern, e),
            }
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

impl Handler for BudgetHandler<GetDashboardSummaryQuery> {
    type Request = GetDashboardSummaryQuery;

    fn handle<'a>(
        &'a self,
        query: &'a GetDashboardSummaryQuery,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<BudgetSummary>> {
        Box::pin(async move {
            let range = DateRange::new(query.start_date, query.end_date);
            self.cache
                .get_or_set(
                    &summary_key(query),
                    || self.service.get_budget_summary(range, query.day),
                    Some(SUMMARY_TTL),
                )
                .await
        })
    }
}

impl Handler for BudgetHandler<GetCategoriesQuery> {
    type Request = GetCategoriesQuery;

    fn handle<'a>(
        &'a self,
        _query: &'a GetCategoriesQuery,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Vec<Category>>> {
        Box::pin(async move {
            self.cache
                .get_or_set(
                    CATEGORIES_CACHE_KEY,
                    || self.service.get_categories(),
                    Some(CATEGORIES_TTL),
                )
                .await
        })
    }
}

impl Handler for BudgetHandler<GetIncomeQuery> {
    type Request = GetIncomeQuery;

    fn handle<'a>(
        &'a self,
        query: &'a GetIncomeQuery,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Vec<Income>>> {
        self.service
            .get_income(DateRange::new(query.start_date, query.end_date))
    }
}

impl Handler for BudgetHandler<GetSpendingQuery> {
    type Request = GetSpendingQuery;

    fn handle<'a>(
        &'a self,
        query: &'a GetSpendingQuery,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Vec<Spending>>> {
        self.service
            .get_spending(DateRange::new(query.start_date, query.end_date))
    }
}

// ============================================================================
// Commands
// ============================================================================

impl Handler for BudgetHandler<AddIncomeCommand> {
    type Request = AddIncomeCommand;

    fn handle<'a>(
        &'a self,
        command: &'a AddIncomeCommand,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Income>> {
        Box::pin(async move {
            let income = self
                .service
                .add_income(NewIncome {
                    date: command.date,
                    amount: command.amount,
                    description: command.description.trim().to_string(),
                })
                .await?;
            self.invalidate(&[SUMMARY_PATTERN]).await;
            Ok(income)
        })
    }
}

impl Handler for BudgetHandler<AddSpendingCommand> {
    type Request = AddSpendingCommand;

    fn handle<'a>(
        &'a self,
        command: &'a AddSpendingCommand,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Spending>> {
        Box::pin(async move {
            let spending = self
                .service
                .add_spending(NewSpending {
                    date: command.date,
                    amount: command.amount,
                    description: command.description.trim().to_string(),
                    category_id: command.category_id,
                })
                .await?;
            self.invalidate(&[SUMMARY_PATTERN]).await;
            Ok(spending)
        })
    }
}

impl Handler for BudgetHandler<DeleteIncomeCommand> {
    type Request = DeleteIncomeCommand;

    fn handle<'a>(
        &'a self,
        command: &'a DeleteIncomeCommand,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.service.delete_income(command.id).await?;
            self.invalidate(&[SUMMARY_PATTERN]).await;
            Ok(())
        })
    }
}

impl Handler for BudgetHandler<DeleteSpendingCommand> {
    type Request = DeleteSpendingCommand;

    fn handle<'a>(
        &'a self,
        command: &'a DeleteSpendingCommand,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.service.delete_spending(command.id).await?;
            self.invalidate(&[SUMMARY_PATTERN]).await;
            Ok(())
        })
    }
}

impl Handler for BudgetHandler<AddCategoryCommand> {
    type Request = AddCategoryCommand;

    fn handle<'a>(
        &'a self,
        command: &'a AddCategoryCommand,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Category>> {
        Box::pin(async move {
            let category = self
                .service
                .add_category(NewCategory {
                    name: command.name.trim().to_string(),
                    kind: command.kind,
                    color: command.color.clone(),
                })
                .await?;
            self.invalidate(&[CATEGORIES_CACHE_KEY, SUMMARY_PATTERN]).await;
            Ok(category)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::models::{CategoryKind, Money};
    use crate::budget::store::InMemoryBudgetService;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).expect("valid date")
    }

    fn handler<R>(service: &Arc<InMemoryBudgetService>, cache: &CacheService) -> BudgetHandler<R> {
        BudgetHandler::new(service.clone(), cache.clone())
    }

    fn september() -> GetDashboardSummaryQuery {
        GetDashboardSummaryQuery {
            start_date: date(1),
            end_date: date(30),
            day: 1,
        }
    }

    #[test]
    fn test_summary_key_format() {
        assert_eq!(
            summary_key(&september()),
            "budget:summary:2024-09-01T00:00:00:2024-09-30T00:00:00:1"
        );
    }

    #[tokio::test]
    async fn test_summary_is_cached() {
        let service = Arc::new(InMemoryBudgetService::new());
        let cache = CacheService::in_memory();
        let ctx = RequestContext::new();
        let summaries = handler::<GetDashboardSummaryQuery>(&service, &cache);

        let first = summaries
            .handle(&september(), &ctx)
            .await
            .expect("Failed to summarize");

        assert_eq!(first.total_income, Money::ZERO);
        assert!(cache.exists(&summary_key(&september())).await.expect("exists"));
        let ttl = cache
            .get_ttl(&summary_key(&september()))
            .await
            .expect("ttl")
            .expect("summary has a ttl");
        assert!(ttl <= SUMMARY_TTL);
    }

    #[tokio::test]
    async fn test_add_income_invalidates_summary() {
        let service = Arc::new(InMemoryBudgetService::new());
        let cache = CacheService::in_memory();
        let ctx = RequestContext::new();
        let summaries = handler::<GetDashboardSummaryQuery>(&service, &cache);
        let add_income = handler::<AddIncomeCommand>(&service, &cache);

        summaries.handle(&september(), &ctx).await.expect("summary");
        add_income
            .handle(
                &AddIncomeCommand {
                    date: date(5),
                    amount: Money::from_units(500),
                    description: "  Bonus  ".to_string(),
                },
                &ctx,
            )
            .await
            .expect("Failed to add income");

        assert!(!cache.exists(&summary_key(&september())).await.expect("exists"));
        let fresh = summaries.handle(&september(), &ctx).await.expect("summary");
        assert_eq!(fresh.total_income, Money::from_units(500));

        let rows = service
            .get_income(DateRange::new(date(1), date(30)))
            .await
            .expect("income");
        assert_eq!(rows[0].description, "Bonus");
    }

    #[tokio::test]
    async fn test_add_category_invalidates_categories() {
        let service = Arc::new(InMemoryBudgetService::new());
        let cache = CacheService::in_memory();
        let ctx = RequestContext::new();
        let categories = handler::<GetCategoriesQuery>(&service, &cache);
        let add_category = handler::<AddCategoryCommand>(&service, &cache);

        let before = categories.handle(&GetCategoriesQuery, &ctx).await.expect("list");
        assert!(cache.exists(CATEGORIES_CACHE_KEY).await.expect("exists"));

        add_category
            .handle(
                &AddCategoryCommand {
                    name: "Pets".to_string(),
                    kind: CategoryKind::Expense,
                    color: "#8D6E63".to_string(),
                },
                &ctx,
            )
            .await
            .expect("Failed to add category");

        let after = categories.handle(&GetCategoriesQuery, &ctx).await.expect("list");
        assert_eq!(after.len(), before.len() + 1);
    }

    #[tokio::test]
    async fn test_failed_command_keeps_cache() {
        let service = Arc::new(InMemoryBudgetService::new());
        let cache = CacheService::in_memory();
        let ctx = RequestContext::new();
        let summaries = handler::<GetDashboardSummaryQuery>(&service, &cache);
        let delete = handler::<DeleteSpendingCommand>(&service, &cache);

        summaries.handle(&september(), &ctx).await.expect("summary");
        let err = delete
            .handle(&DeleteSpendingCommand { id: 77 }, &ctx)
            .await
            .expect_err("missing row");

        assert!(err.is_not_found());
        assert!(cache.exists(&summary_key(&september())).await.expect("exists"));
    }

    #[tokio::test]
    async fn test_range_queries_read_through() {
        let service = Arc::new(InMemoryBudgetService::new());
        let cache = CacheService::in_memory();
        let ctx = RequestContext::new();
        let add = handler::<AddSpendingCommand>(&service, &cache);
        let list = handler::<GetSpendingQuery>(&service, &cache);

        let created = add
            .handle(
                &AddSpendingCommand {
                    date: date(9),
                    amount: Money::from_units(40),
                    description: "Fuel".to_string(),
                    category_id: 4,
                },
                &ctx,
            )
            .await
            .expect("add spending");

        let rows = list
            .handle(
                &GetSpendingQuery {
                    start_date: date(1),
                    end_date: date(30),
                },
                &ctx,
            )
            .await
            .expect("list spending");

        assert_eq!(rows, vec![created]);
        assert!(cache.keys().is_empty());
    }
}
