//! The seam between workflows and wherever the futures tables live.

use std::path::PathBuf;

use chrono::NaiveDate;
use polars::prelude::PolarsError;
use thiserror::Error;

use crate::catalog::{CatalogError, Contract, DateRange, DeliveryOrder, PricePoint, ProductSummary};
use crate::term_structure::TermPoint;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("warehouse query failed: {0}")]
    Warehouse(#[from] sqlx::Error),
    #[error("failed to start blocking runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to read dump: {0}")]
    Dump(#[from] PolarsError),
    #[error("dump I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("dump file not found: {0}")]
    MissingFile(PathBuf),
    #[error("invalid SQL identifier `{0}`")]
    Identifier(String),
    #[error("malformed row in {table}: {reason}")]
    Decode { table: String, reason: String },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("session is already closed")]
    Closed,
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Read-only access to the Datastream futures catalog and price tables.
///
/// Implementations may push filters down (SQL) or evaluate them in memory,
/// but must return the same rows the functions in [`crate::resolver`],
/// [`crate::prices`] and [`crate::term_structure`] would compute.
pub trait FuturesSource {
    /// Per-product aggregates, most contracts first.
    fn product_summaries(&mut self) -> SourceResult<Vec<ProductSummary>>;

    /// Products whose name contains `keyword`, case-insensitively.
    fn search_products(&mut self, keyword: &str) -> SourceResult<Vec<ProductSummary>>;

    /// Every contract of `product`.
    fn contracts(&mut self, product: i64, order: DeliveryOrder) -> SourceResult<Vec<Contract>>;

    /// Contracts of `product` whose lifetime overlaps `range`.
    fn active_contracts(
        &mut self,
        product: i64,
        range: DateRange,
        order: DeliveryOrder,
    ) -> SourceResult<Vec<Contract>>;

    /// Price rows for a batch of futcodes within `range`, one round trip.
    fn prices(&mut self, futcodes: &[i64], range: DateRange) -> SourceResult<Vec<PricePoint>>;

    /// Contract/price join for `product` on exactly `date`, settlement not null.
    fn settlement_rows(&mut self, product: i64, date: NaiveDate) -> SourceResult<Vec<TermPoint>>;

    /// Latest date strictly before `date` carrying a settlement for `product`.
    fn latest_settlement_date_before(
        &mut self,
        product: i64,
        date: NaiveDate,
    ) -> SourceResult<Option<NaiveDate>>;

    /// Most recent date in the price table.
    fn latest_price_date(&mut self) -> SourceResult<Option<NaiveDate>>;
}
