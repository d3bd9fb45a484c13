//! SQLite-backed ledger.
//!
//! Blocking rusqlite calls run on tokio-rusqlite's connection thread. The
//! schema is created on open and the default categories are seeded with
//! `INSERT OR IGNORE`, so opening an existing database is idempotent.

use super::models::{
    BudgetSummary, Category, CategoryKind, CategoryTotal, DateRange, Income, Money, NewCategory,
    NewIncome, NewSpending, Spending, DEFAULT_CATEGORIES,
};
use super::store::{category_in_use, missing, BudgetService};
use crate::error::{Error, Result};
use chrono::NaiveDate;
use futures::future::BoxFuture;
use rusqlite::{params, OptionalExtension, Row};
use std::path::Path;
use tokio_rusqlite::Connection;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub const CREATE_TABLES: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS Categories (
    Id INTEGER PRIMARY KEY AUTOINCREMENT,
    Name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    Kind TEXT NOT NULL,
    Color TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS Income (
    Id INTEGER PRIMARY KEY AUTOINCREMENT,
    Date TEXT NOT NULL,
    Amount INTEGER NOT NULL,
    Description TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS Spending (
    Id INTEGER PRIMARY KEY AUTOINCREMENT,
    Date TEXT NOT NULL,
    Amount INTEGER NOT NULL,
    Description TEXT NOT NULL,
    CategoryId INTEGER NOT NULL,
    FOREIGN KEY (CategoryId) REFERENCES Categories(Id)
);

CREATE TABLE IF NOT EXISTS AppSettings (
    Key TEXT PRIMARY KEY,
    Value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_income_date ON Income(Date);
CREATE INDEX IF NOT EXISTS idx_spending_date ON Spending(Date);
CREATE INDEX IF NOT EXISTS idx_spending_category ON Spending(CategoryId);
"#;

const SEED_CATEGORY: &str =
    "INSERT OR IGNORE INTO Categories (Id, Name, Kind, Color) VALUES (?1, ?2, ?3, ?4)";

const SELECT_CATEGORIES: &str = "SELECT Id, Name, Kind, Color FROM Categories ORDER BY Id";
const SELECT_CATEGORY: &str = "SELECT Id, Name, Kind, Color FROM Categories WHERE Id = ?1";
const INSERT_CATEGORY: &str = "INSERT INTO Categories (Name, Kind, Color) VALUES (?1, ?2, ?3)";
const UPDATE_CATEGORY: &str = "UPDATE Categories SET Name = ?2, Kind = ?3, Color = ?4 WHERE Id = ?1";
const DELETE_CATEGORY: &str = "DELETE FROM Categories WHERE Id = ?1";
const COUNT_CATEGORY_SPENDING: &str = "SELECT COUNT(*) FROM Spending WHERE CategoryId = ?1";

const SELECT_INCOME: &str = r#"
SELECT Id, Date, Amount, Description FROM Income
WHERE Date >= ?1 AND Date <= ?2
ORDER BY Date, Id
"#;
const INSERT_INCOME: &str = "INSERT INTO Income (Date, Amount, Description) VALUES (?1, ?2, ?3)";
const UPDATE_INCOME: &str =
    "UPDATE Income SET Date = ?2, Amount = ?3, Description = ?4 WHERE Id = ?1";
const DELETE_INCOME: &str = "DELETE FROM Income WHERE Id = ?1";

const SELECT_SPENDING: &str = r#"
SELECT Id, Date, Amount, Description, CategoryId FROM Spending
WHERE Date >= ?1 AND Date <= ?2
ORDER BY Date, Id
"#;
const INSERT_SPENDING: &str =
    "INSERT INTO Spending (Date, Amount, Description, CategoryId) VALUES (?1, ?2, ?3, ?4)";
const UPDATE_SPENDING: &str = r#"
UPDATE Spending SET Date = ?2, Amount = ?3, Description = ?4, CategoryId = ?5
WHERE Id = ?1
"#;
const DELETE_SPENDING: &str = "DELETE FROM Spending WHERE Id = ?1";

const SUM_INCOME: &str =
    "SELECT COALESCE(SUM(Amount), 0) FROM Income WHERE Date >= ?1 AND Date <= ?2";
const SUM_SPENDING_BY_CATEGORY: &str = r#"
SELECT s.CategoryId, COALESCE(c.Name, 'Uncategorized'), SUM(s.Amount)
FROM Spending s
LEFT JOIN Categories c ON c.Id = s.CategoryId
WHERE s.Date >= ?1 AND s.Date <= ?2
GROUP BY s.CategoryId
"#;

const SELECT_SETTING: &str = "SELECT Value FROM AppSettings WHERE Key = ?1";
const UPSERT_SETTING: &str = r#"
INSERT INTO AppSettings (Key, Value) VALUES (?1, ?2)
ON CONFLICT(Key) DO UPDATE SET Value = excluded.Value
"#;

// ============================================================================
// Row conversions
// ============================================================================

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_category(row: &Row<'_>) -> rusqlite::Result<Category> {
    let kind: String = row.get(2)?;
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: CategoryKind::parse(&kind).unwrap_or(CategoryKind::Expense),
        color: row.get(3)?,
    })
}

fn row_to_income(row: &Row<'_>) -> rusqlite::Result<Income> {
    Ok(Income {
        id: row.get(0)?,
        date: parse_date(row, 1)?,
        amount: Money::from_cents(row.get(2)?),
        description: row.get(3)?,
    })
}

fn row_to_spending(row: &Row<'_>) -> rusqlite::Result<Spending> {
    Ok(Spending {
        id: row.get(0)?,
        date: parse_date(row, 1)?,
        amount: Money::from_cents(row.get(2)?),
        description: row.get(3)?,
        category_id: row.get(4)?,
    })
}

fn category_exists(conn: &rusqlite::Connection, id: i64) -> Result<bool> {
    Ok(conn
        .query_row(SELECT_CATEGORY, [id], |_| Ok(()))
        .optional()?
        .is_some())
}

// ============================================================================
// Service
// ============================================================================

/// Ledger persisted in a SQLite database.
pub struct SqliteBudgetService {
    conn: Connection,
}

impl SqliteBudgetService {
    /// Open (or create) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        let service = SqliteBudgetService { conn };
        service
            .call(|conn| {
                conn.execute_batch(CREATE_TABLES)?;
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(SEED_CATEGORY)?;
                    for ((name, kind, color), id) in DEFAULT_CATEGORIES.iter().zip(1_i64..) {
                        stmt.execute(params![id, name, kind.as_str(), color])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        info!("✓ SQLite ledger ready");
        Ok(service)
    }

    /// Run `f` on the connection thread.
    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
    {
        self.conn
            .call(move |conn| f(conn).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e))))
            .await
            .map_err(Error::from)
    }

    /// Value stored under `key` in `AppSettings`.
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.call(move |conn| {
            Ok(conn
                .query_row(SELECT_SETTING, [&key], |row| row.get(0))
                .optional()?)
        })
        .await
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.call(move |conn| {
            conn.execute(UPSERT_SETTING, params![key, value])?;
            Ok(())
        })
        .await
    }
}

impl BudgetService for SqliteBudgetService {
    fn get_categories(&self) -> BoxFuture<'_, Result<Vec<Category>>> {
        Box::pin(self.call(|conn| {
            let mut stmt = conn.prepare(SELECT_CATEGORIES)?;
            let rows = stmt.query_map([], row_to_category)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        }))
    }

    fn get_category(&self, id: i64) -> BoxFuture<'_, Result<Category>> {
        Box::pin(self.call(move |conn| {
            conn.query_row(SELECT_CATEGORY, [id], row_to_category)
                .optional()?
                .ok_or_else(|| missing("Category", id))
        }))
    }

    fn add_category(&self, category: NewCategory) -> BoxFuture<'_, Result<Category>> {
        Box::pin(self.call(move |conn| {
            conn.execute(
                INSERT_CATEGORY,
                params![category.name, category.kind.as_str(), category.color],
            )?;
            let id = conn.last_insert_rowid();
            Ok(category.with_id(id))
        }))
    }

    fn update_category(&self, category: Category) -> BoxFuture<'_, Result<Category>> {
        Box::pin(self.call(move |conn| {
            let changed = conn.execute(
                UPDATE_CATEGORY,
                params![
                    category.id,
                    category.name,
                    category.kind.as_str(),
                    category.color
                ],
            )?;
            if changed == 0 {
                return Err(missing("Category", category.id));
            }
            Ok(category)
        }))
    }

    fn delete_category(&self, id: i64) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.call(move |conn| {
            let in_use: i64 = conn.query_row(COUNT_CATEGORY_SPENDING, [id], |row| row.get(0))?;
            if in_use > 0 {
                return Err(category_in_use(id));
            }
            match conn.execute(DELETE_CATEGORY, [id])? {
                0 => Err(missing("Category", id)),
                _ => Ok(()),
            }
        }))
    }

    fn get_income(&self, range: DateRange) -> BoxFuture<'_, Result<Vec<Income>>> {
        Box::pin(self.call(move |conn| {
            let mut stmt = conn.prepare(SELECT_INCOME)?;
            let rows = stmt.query_map(
                [format_date(range.start), format_date(range.end)],
                row_to_income,
            )?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        }))
    }

    fn add_income(&self, income: NewIncome) -> BoxFuture<'_, Result<Income>> {
        Box::pin(self.call(move |conn| {
            conn.execute(
                INSERT_INCOME,
                params![
                    format_date(income.date),
                    income.amount.cents(),
                    income.description
                ],
            )?;
            let id = conn.last_insert_rowid();
            Ok(income.with_id(id))
        }))
    }

    fn update_income(&self, income: Income) -> BoxFuture<'_, Result<Income>> {
        Box::pin(self.call(move |conn| {
            let changed = conn.execute(
                UPDATE_INCOME,
                params![
                    income.id,
                    format_date(income.date),
                    income.amount.cents(),
                    income.description
                ],
            )?;
            if changed == 0 {
                return Err(missing("Income", income.id));
            }
            Ok(income)
        }))
    }

    fn delete_income(&self, id: i64) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.call(move |conn| match conn.execute(DELETE_INCOME, [id])? {
            0 => Err(missing("Income", id)),
            _ => Ok(()),
        }))
    }

    fn get_spending(&self, range: DateRange) -> BoxFuture<'_, Result<Vec<Spending>>> {
        Box::pin(self.call(move |conn| {
            let mut stmt = conn.prepare(SELECT_SPENDING)?;
            let rows = stmt.query_map(
                [format_date(range.start), format_date(range.end)],
                row_to_spending,
            )?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        }))
    }

    fn add_spending(&self, spending: NewSpending) -> BoxFuture<'_, Result<Spending>> {
        Box::pin(self.call(move |conn| {
            if !category_exists(conn, spending.category_id)? {
                return Err(missing("Category", spending.category_id));
            }
            conn.execute(
                INSERT_SPENDING,
                params![
                    format_date(spending.date),
                    spending.amount.cents(),
                    spending.description,
                    spending.category_id
                ],
            )?;
            let id = conn.last_insert_rowid();
            Ok(spending.with_id(id))
        }))
    }

    fn update_spending(&self, spending: Spending) -> BoxFuture<'_, Result<Spending>> {
        Box::pin(self.call(move |conn| {
            if !category_exists(conn, spending.category_id)? {
                return Err(missing("Category", spending.category_id));
            }
            let changed = conn.execute(
                UPDATE_SPENDING,
                params![
                    spending.id,
                    format_date(spending.date),
                    spending.amount.cents(),
                    spending.description,
                    spending.category_id
                ],
            )?;
            if changed == 0 {
                return Err(missing("Spending", spending.id));
            }
            Ok(spending)
        }))
    }

    fn delete_spending(&self, id: i64) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.call(move |conn| match conn.execute(DELETE_SPENDING, [id])? {
            0 => Err(missing("Spending", id)),
            _ => Ok(()),
        }))
    }

    /// Aggregated in SQL instead of loading every row.
    fn get_budget_summary(&self, range: DateRange, day: u32) -> BoxFuture<'_, Result<BudgetSummary>> {
        Box::pin(self.call(move |conn| {
            let (start, end) = (format_date(range.start), format_date(range.end));
            let income: i64 = conn.query_row(SUM_INCOME, params![start, end], |row| row.get(0))?;

            let mut stmt = conn.prepare(SUM_SPENDING_BY_CATEGORY)?;
            let totals = stmt
                .query_map(params![start, end], |row| {
                    Ok(CategoryTotal {
                        category_id: row.get(0)?,
                        name: row.get(1)?,
                        total: Money::from_cents(row.get(2)?),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            BudgetSummary::from_totals(range, day, Money::from_cents(income), totals)
        }))
    }
}
