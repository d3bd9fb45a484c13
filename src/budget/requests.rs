//! Queries and commands dispatched by the budget UI.

use super::models::{BudgetSummary, Category, CategoryKind, Income, Money, Spending};
use crate::pipeline::{LogField, Request};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// Queries
// ============================================================================

/// Dashboard totals between two dates. Cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetDashboardSummaryQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Day of month the budget cycle starts on, `1..=31`.
    pub day: u32,
}

impl Request for GetDashboardSummaryQuery {
    type Response = BudgetSummary;

    fn log_fields(&self) -> Vec<LogField> {
        vec![
            LogField::new("start_date", self.start_date.to_string()),
            LogField::new("end_date", self.end_date.to_string()),
            LogField::new("day", self.day),
        ]
    }
}

/// Every category. Cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCategoriesQuery;

impl Request for GetCategoriesQuery {
    type Response = Vec<Category>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetIncomeQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Request for GetIncomeQuery {
    type Response = Vec<Income>;

    fn log_fields(&self) -> Vec<LogField> {
        vec![
            LogField::new("start_date", self.start_date.to_string()),
            LogField::new("end_date", self.end_date.to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSpendingQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Request for GetSpendingQuery {
    type Response = Vec<Spending>;

    fn log_fields(&self) -> Vec<LogField> {
        vec![
            LogField::new("start_date", self.start_date.to_string()),
            LogField::new("end_date", self.end_date.to_string()),
        ]
    }
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddIncomeCommand {
    pub date: NaiveDate,
    pub amount: Money,
    pub description: String,
}

impl Request for AddIncomeCommand {
    type Response = Income;

    // Free-text descriptions are never logged.
    fn log_fields(&self) -> Vec<LogField> {
        vec![
            LogField::new("date", self.date.to_string()),
            LogField::new("amount", self.amount.cents()),
            LogField::sensitive("description"),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddSpendingCommand {
    pub date: NaiveDate,
    pub amount: Money,
    pub description: String,
    pub category_id: i64,
}

impl Request for AddSpendingCommand {
    type Response = Spending;

    fn log_fields(&self) -> Vec<LogField> {
        vec![
            LogField::new("date", self.date.to_string()),
            LogField::new("amount", self.amount.cents()),
            LogField::sensitive("description"),
            LogField::new("category_id", self.category_id),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteIncomeCommand {
    pub id: i64,
}

impl Request for DeleteIncomeCommand {
    type Response = ();

    fn log_fields(&self) -> Vec<LogField> {
        vec![LogField::new("id", self.id)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSpendingCommand {
    pub id: i64,
}

impl Request for DeleteSpendingCommand {
    type Response = ();

    fn log_fields(&self) -> Vec<LogField> {
        vec![LogField::new("id", self.id)]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCategoryCommand {
    pub name: String,
    pub kind: CategoryKind,
    pub color: String,
}

impl Request for AddCategoryCommand {
    type Response = Category;

    fn log_fields(&self) -> Vec<LogField> {
        vec![
            LogField::new("name", self.name.clone()),
            LogField::new("kind", self.kind.as_str()),
            LogField::new("color", self.color.clone()),
        ]
    }
}
