//! dsfut resolves WRDS Datastream futures products to their contracts, pulls
//! daily settlement prices in batches, and reconstructs point-in-time term
//! structures. Queries run against the live warehouse or a local dump of the
//! same two tables.

pub mod catalog;
pub mod config;
pub mod dump;
pub mod export;
pub mod frame;
pub mod logging;
pub mod prices;
pub mod resolver;
pub mod source;
pub mod term_structure;
pub mod universe;
pub mod warehouse;

pub use catalog::{
    CatalogError, Contract, DateRange, DeliveryMonth, DeliveryOrder, LifecycleStats, PricePoint,
    Product, ProductSummary,
};
pub use config::{ConfigError, WrdsConfig};
pub use dump::LocalDump;
pub use prices::{PriceQuality, filter_prices};
pub use resolver::resolve_contracts;
pub use source::{FuturesSource, SourceError, SourceResult};
pub use term_structure::{
    AssetClass, CurveShape, Spread, TermPoint, TermStructure, build_snapshot, snapshot,
};
pub use universe::{UniversePull, UniverseSummary, pull_product_prices, pull_universe};
pub use warehouse::WrdsSession;

pub type Result<T> = anyhow::Result<T>;
