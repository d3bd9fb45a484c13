//! Validation rules for budget requests.

use super::models::Money;
use super::requests::{
    AddCategoryCommand, AddIncomeCommand, AddSpendingCommand, DeleteIncomeCommand,
    DeleteSpendingCommand, GetDashboardSummaryQuery, GetIncomeQuery, GetSpendingQuery,
};
use crate::pipeline::ValidationFailure;
use chrono::NaiveDate;

pub const INVALID_DATE: &str = "INVALID_DATE";
pub const INVALID_DAY: &str = "INVALID_DAY";
pub const INVALID_AMOUNT: &str = "INVALID_AMOUNT";
pub const REQUIRED: &str = "REQUIRED";
pub const TOO_LONG: &str = "TOO_LONG";
pub const INVALID_ID: &str = "INVALID_ID";
pub const INVALID_COLOR: &str = "INVALID_COLOR";

/// Largest amount a single income or spending row may carry.
pub const MAX_AMOUNT: Money = Money::from_units(1_000_000_000);

pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const MAX_CATEGORY_NAME_LEN: usize = 50;

// ============================================================================
// Rules
// ============================================================================

fn date_range(start: NaiveDate, end: NaiveDate) -> Option<ValidationFailure> {
    (start > end).then(|| {
        ValidationFailure::new("start_date", "Start date must be on or before the end date")
            .with_code(INVALID_DATE)
    })
}

fn cycle_day(day: u32) -> Option<ValidationFailure> {
    (!(1..=31).contains(&day)).then(|| {
        ValidationFailure::new("day", "Day must be between 1 and 31").with_code(INVALID_DAY)
    })
}

fn positive_amount(amount: Money) -> Option<ValidationFailure> {
    if !amount.is_positive() {
        return Some(
            ValidationFailure::new("amount", "Amount must be greater than zero")
                .with_code(INVALID_AMOUNT),
        );
    }
    (amount > MAX_AMOUNT).then(|| {
        ValidationFailure::new("amount", format!("Amount must be at most {}", MAX_AMOUNT))
            .with_code(INVALID_AMOUNT)
    })
}

fn text(property: &str, value: &str, max_len: usize) -> Option<ValidationFailure> {
    if value.trim().is_empty() {
        return Some(
            ValidationFailure::new(property, format!("{} is required", property))
                .with_code(REQUIRED),
        );
    }
    (value.chars().count() > max_len).then(|| {
        ValidationFailure::new(
            property,
            format!("{} must be at most {} characters", property, max_len),
        )
        .with_code(TOO_LONG)
    })
}

fn positive_id(property: &str, id: i64) -> Option<ValidationFailure> {
    (id <= 0).then(|| {
        ValidationFailure::new(property, format!("{} must be a positive id", property))
            .with_code(INVALID_ID)
    })
}

fn hex_color(value: &str) -> Option<ValidationFailure> {
    let valid = value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit());
    (!valid).then(|| {
        ValidationFailure::new("color", "Color must look like #RRGGBB").with_code(INVALID_COLOR)
    })
}

// ============================================================================
// Per-request validators
// ============================================================================

pub fn validate_dashboard_summary(query: &GetDashboardSummaryQuery) -> Vec<ValidationFailure> {
    [
        date_range(query.start_date, query.end_date),
        cycle_day(query.day),
    ]
    .into_iter()
    .flatten()
    .collect()
}

pub fn validate_income_query(query: &GetIncomeQuery) -> Vec<ValidationFailure> {
    date_range(query.start_date, query.end_date)
        .into_iter()
        .collect()
}

pub fn validate_spending_query(query: &GetSpendingQuery) -> Vec<ValidationFailure> {
    date_range(query.start_date, query.end_date)
        .into_iter()
        .collect()
}

pub fn validate_add_income(command: &AddIncomeCommand) -> Vec<ValidationFailure> {
    [
        positive_amount(command.amount),
        text("description", &command.description, MAX_DESCRIPTION_LEN),
    ]
    .into_iter()
    .flatten()
    .collect()
}

pub fn validate_add_spending(command: &AddSpendingCommand) -> Vec<ValidationFailure> {
    [
        positive_amount(command.amount),
        text("description", &command.description, MAX_DESCRIPTION_LEN),
        positive_id("category_id", command.category_id),
    ]
    .into_iter()
    .flatten()
    .collect()
}

pub fn validate_delete_income(command: &DeleteIncomeCommand) -> Vec<ValidationFailure> {
    positive_id("id", command.id).into_iter().collect()
}

pub fn validate_delete_spending(command: &DeleteSpendingCommand) -> Vec<ValidationFailure> {
    positive_id("id", command.id).into_iter().collect()
}

pub fn validate_add_category(command: &AddCategoryCommand) -> Vec<ValidationFailure> {
    [
        text("name", &command.name, MAX_CATEGORY_NAME_LEN),
        hex_color(&command.color),
    ]
    .into_iter()
    .flatten()
    .collect()
}
