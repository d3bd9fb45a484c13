//! Budget application services: ledger storage, requests, validation rules
//! and handlers.
//!
//! [`register`] wires every budget request into a [`MediatorBuilder`]:
//!
//! ```ignore
//! let service: Arc<dyn BudgetService> = Arc::new(InMemoryBudgetService::new());
//! let cache = CacheService::from_config(CacheConfig::default())?;
//! let mediator = budget::register(Mediator::builder(), service, cache).build()?;
//!
//! let summary = mediator
//!     .send(GetDashboardSummaryQuery { start_date, end_date, day: 1 })
//!     .await?;
//! ```

pub mod handlers;
pub mod models;
pub mod requests;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;
pub mod validators;

pub use handlers::BudgetHandler;
pub use models::{
    BudgetSummary, Category, CategoryKind, CategoryTotal, DateRange, Income, Money, NewCategory,
    NewIncome, NewSpending, Spending,
};
pub use requests::{
    AddCategoryCommand, AddIncomeCommand, AddSpendingCommand, DeleteIncomeCommand,
    DeleteSpendingCommand, GetCategoriesQuery, GetDashboardSummaryQuery, GetIncomeQuery,
    GetSpendingQuery,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBudgetService;
pub use store::{BudgetService, InMemoryBudgetService};

use crate::pipeline::{FnValidator, MediatorBuilder};
use crate::service::CacheService;
use std::sync::Arc;
use validators::{
    validate_add_category, validate_add_income, validate_add_spending, validate_dashboard_summary,
    validate_delete_income, validate_delete_spending, validate_income_query,
    validate_spending_query,
};

/// Register handlers and validators for every budget request.
pub fn register(
    builder: MediatorBuilder,
    service: Arc<dyn BudgetService>,
    cache: CacheService,
) -> MediatorBuilder {
    fn handler<R>(service: &Arc<dyn BudgetService>, cache: &CacheService) -> BudgetHandler<R> {
        BudgetHandler::new(Arc::clone(service), cache.clone())
    }

    builder
        .handler(handler::<GetDashboardSummaryQuery>(&service, &cache))
        .validator(FnValidator::new(validate_dashboard_summary))
        .handler(handler::<GetCategoriesQuery>(&service, &cache))
        .handler(handler::<GetIncomeQuery>(&service, &cache))
        .validator(FnValidator::new(validate_income_query))
        .handler(handler::<GetSpendingQuery>(&service, &cache))
        .validator(FnValidator::new(validate_spending_query))
        .handler(handler::<AddIncomeCommand>(&service, &cache))
        .validator(FnValidator::new(validate_add_income))
        .handler(handler::<AddSpendingCommand>(&service, &cache))
        .validator(FnValidator::new(validate_add_spending))
        .handler(handler::<DeleteIncomeCommand>(&service, &cache))
        .validator(FnValidator::new(validate_delete_income))
        .handler(handler::<DeleteSpendingCommand>(&service, &cache))
        .validator(FnValidator::new(validate_delete_spending))
        .handler(handler::<AddCategoryCommand>(&service, &cache))
        .validator(FnValidator::new(validate_add_category))
}
