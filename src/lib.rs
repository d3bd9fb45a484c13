//! # budget-kit
//!
//! Application core for a personal-finance tracker.
//!
//! ## Features
//!
//! - **Memory cache:** [`CacheService`] with TTLs, priorities, size-limited
//!   compaction, glob invalidation, events and statistics
//! - **Deterministic keys:** [`CacheKeyBuilder`] and the [`cache_key!`] macro
//! - **Request pipeline:** [`Mediator`] routes queries and commands through
//!   validation and logging behaviors to exactly one handler
//! - **Budget services:** in-memory or SQLite (`sqlite` feature) ledger of
//!   categories, income and spending, with a cached dashboard summary
//! - **Settings and localization:** JSON settings file, UI strings, themes
//!
//! ## Quick Start
//!
//! ```ignore
//! use budget_kit::budget::{self, GetDashboardSummaryQuery, InMemoryBudgetService};
//! use budget_kit::{CacheConfig, CacheService, Mediator};
//! use std::sync::Arc;
//!
//! let cache = CacheService::from_config(CacheConfig::default())?;
//! let mediator = budget::register(
//!     Mediator::builder(),
//!     Arc::new(InMemoryBudgetService::new()),
//!     cache,
//! )
//! .build()?;
//!
//! let summary = mediator
//!     .send(GetDashboardSummaryQuery { start_date, end_date, day: 1 })
//!     .await?;
//! println!("Balance: {}", summary.balance);
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod budget;
pub mod config;
pub mod error;
pub mod events;
pub mod key;
pub mod localization;
pub mod observability;
pub mod pipeline;
pub mod service;
pub mod settings;

// Re-exports for convenience
pub use backend::{CacheBackend, CachePriority, EntryOptions, EvictionReason, InMemoryBackend};
pub use config::CacheConfig;
pub use error::{Error, ErrorKind, Result};
pub use events::{CacheEvent, SubscriptionId};
pub use key::{CacheKeyBuilder, KeyPart};
pub use localization::{Language, Localizer, Theme};
pub use observability::{CacheMetrics, CacheStatistics};
pub use pipeline::{
    Behavior, Handler, Mediator, MediatorBuilder, Request, RequestContext, ValidationFailure,
    Validator,
};
pub use service::CacheService;
pub use settings::{AppPaths, Settings, SettingsStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
