//! # Sales Data Engine
//!
//! A library for chain-store sales data: per-business-type metric schemas,
//! derived-field evaluation, daily-to-monthly aggregation, and an optimistic
//! client-side cache that applies edits instantly and rolls them back
//! exactly on remote failure.
//!
//! ## Core Concepts
//!
//! - **Field Definition**: one metric's type, visibility, editability, and
//!   rollup rule. Catalogs are per-business-type data, so tenants add
//!   metrics without code changes.
//! - **Calculated field**: always derived from other fields in the same
//!   daily record by a registered formula; never directly editable.
//! - **Monthly summary**: never stored as ground truth, always recomputable
//!   from the month's daily records via each field's aggregation method.
//! - **Optimistic mutation**: an edit is merged, evaluated, and re-aggregated
//!   into the cache before the remote write is sent; failure restores the
//!   exact pre-edit snapshot.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sales_data_engine::*;
//! use chrono::NaiveDate;
//!
//! let mut registry = FieldSchemaRegistry::new();
//! registry.insert("restaurant", standard_restaurant_fields());
//!
//! let mut engine = SalesEngine::new(remote, registry);
//! engine.assign_business_type("store-1", "restaurant");
//!
//! // read-through cache; a month the server has never seen comes back as a
//! // fully-formed empty month
//! let entry = engine.query("store-1", 2024, 1).await?;
//!
//! // optimistic edit: visible locally at once, reconciled after the write
//! let mut patch = RecordPatch::new();
//! patch.insert("store_net_sales".into(), FieldValue::Number(80000.0));
//! engine
//!     .mutate("store-1", 2024, 1, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), patch)
//!     .await?;
//! ```

pub mod aggregation;
pub mod cache;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod import;
pub mod migration;
pub mod record;
pub mod schema;
pub mod utils;

#[cfg(feature = "forecast")]
pub mod forecast;

pub use aggregation::{
    aggregate, aggregate_all, is_valid_aggregation_method, recommended_aggregation,
};
pub use cache::{CacheEntry, EntryState, MonthCache, MonthKey};
pub use engine::{RemoteStore, SalesEngine};
pub use error::{Result, SalesEngineError, ValidationError};
pub use evaluator::evaluate;
pub use import::{auto_map, export_csv, read_rows, HeaderMap};
pub use migration::{
    ensure_backward_compatibility, migrate_and_ensure_compatibility, migrate_field_configurations,
    migrate_single_field, needs_migration, render_report, FieldConfig, MigrationOutcome,
    MigrationRecord,
};
pub use record::{
    empty_month, DailyRecord, DayPatch, FieldValue, MonthlySummary, RecordPatch,
};
pub use schema::{
    standard_restaurant_fields, visible_fields, AggregationMethod, FieldCategory, FieldDefinition,
    FieldSchemaRegistry, FieldSource, FieldValueType, ViewPage,
};
