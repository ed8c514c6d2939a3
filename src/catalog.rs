//! Product, contract and price records for the Datastream futures tables.
//!
//! A product (`contrcode`) owns many contracts (`futcode`), one per delivery
//! month. Each contract owns a daily price history. None of these links are
//! checked locally; rows are taken as the warehouse returns them.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("invalid delivery month code `{0}` (expected MMYY)")]
    DeliveryMonth(String),
    #[error("date range start {start} is after end {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
    #[error("unknown delivery order `{0}` (expected `chronological` or `literal`)")]
    DeliveryOrder(String),
}

/// A futures underlying, e.g. Gold (2020) or the 10Y T-Note (458).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub code: i64,
    pub name: String,
}

/// Delivery month code as stored in `contrdate`: `MMYY`, e.g. `0624` for June 2024.
///
/// The raw string sorts lexicographically, which is not chronological across
/// years. Use [`DeliveryMonth::resolve_year`] to place it on a calendar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct DeliveryMonth(String);

impl DeliveryMonth {
    pub fn parse(raw: &str) -> Result<Self, CatalogError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.len() > 4
            || !trimmed.chars().all(|c| c.is_ascii_digit())
        {
            return Err(CatalogError::DeliveryMonth(raw.to_string()));
        }

        // Columnar readers infer `0624` as the integer 624.
        let code = format!("{trimmed:0>4}");
        let month: u32 = code[..2]
            .parse()
            .map_err(|_| CatalogError::DeliveryMonth(raw.to_string()))?;
        if !(1..=12).contains(&month) {
            return Err(CatalogError::DeliveryMonth(raw.to_string()));
        }

        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn month(&self) -> u32 {
        self.0[..2].parse().unwrap_or(1)
    }

    /// Two-digit year.
    pub fn yy(&self) -> i32 {
        self.0[2..].parse().unwrap_or(0)
    }

    /// Full year whose last two digits are `yy`, choosing the century closest to
    /// `anchor_year`.
    pub fn resolve_year(&self, anchor_year: i32) -> i32 {
        let base = anchor_year - anchor_year.rem_euclid(100) + self.yy();
        [base - 100, base, base + 100]
            .into_iter()
            .min_by_key(|candidate| (candidate - anchor_year).abs())
            .unwrap_or(base)
    }
}

impl fmt::Display for DeliveryMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl TryFrom<String> for DeliveryMonth {
    type Error = CatalogError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl FromStr for DeliveryMonth {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// How contracts are ordered by delivery month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryOrder {
    /// Calendar order: year (resolved from the last-trade date), then month.
    #[default]
    Chronological,
    /// The warehouse's own `ORDER BY contrdate`, i.e. plain string order.
    Literal,
}

impl FromStr for DeliveryOrder {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chronological" | "calendar" => Ok(Self::Chronological),
            "literal" | "lexicographic" | "source" => Ok(Self::Literal),
            other => Err(CatalogError::DeliveryOrder(other.to_string())),
        }
    }
}

/// One delivery-month instance of a product (a row of `wrds_contract_info`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub futcode: i64,
    pub contrcode: i64,
    pub contrname: Option<String>,
    pub delivery: DeliveryMonth,
    pub start_date: NaiveDate,
    pub last_trade_date: NaiveDate,
}

impl Contract {
    pub fn delivery_year(&self) -> i32 {
        self.delivery.resolve_year(self.last_trade_date.year())
    }

    pub fn lifecycle_days(&self) -> i64 {
        (self.last_trade_date - self.start_date).num_days()
    }

    /// Whether the contract's trading lifetime intersects `range`.
    pub fn overlaps(&self, range: &DateRange) -> bool {
        self.last_trade_date >= range.start && self.start_date <= range.end
    }

    fn delivery_cmp(&self, other: &Self, order: DeliveryOrder) -> Ordering {
        let by_delivery = match order {
            DeliveryOrder::Chronological => (self.delivery_year(), self.delivery.month())
                .cmp(&(other.delivery_year(), other.delivery.month())),
            DeliveryOrder::Literal => self.delivery.cmp(&other.delivery),
        };
        by_delivery.then(self.futcode.cmp(&other.futcode))
    }
}

/// Sort contracts by delivery month under `order`, ties broken by futcode.
pub fn sort_contracts(contracts: &mut [Contract], order: DeliveryOrder) {
    contracts.sort_by(|a, b| a.delivery_cmp(b, order));
}

/// One daily observation from `wrds_fut_contract`. Every price field is nullable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub futcode: i64,
    pub date: NaiveDate,
    pub settlement: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CatalogError> {
        if start > end {
            return Err(CatalogError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Aggregate row describing a product in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub code: i64,
    pub name: String,
    pub num_contracts: usize,
    pub earliest_start: Option<NaiveDate>,
    pub latest_trade: Option<NaiveDate>,
}

/// Group contracts by `(contrcode, contrname)`, most contracts first.
pub fn summarize_products(contracts: &[Contract]) -> Vec<ProductSummary> {
    let mut groups: BTreeMap<(i64, String), ProductSummary> = BTreeMap::new();

    for contract in contracts {
        let name = contract.contrname.clone().unwrap_or_default();
        let entry = groups
            .entry((contract.contrcode, name.clone()))
            .or_insert_with(|| ProductSummary {
                code: contract.contrcode,
                name,
                num_contracts: 0,
                earliest_start: None,
                latest_trade: None,
            });
        entry.num_contracts += 1;
        entry.earliest_start = Some(
            entry
                .earliest_start
                .map_or(contract.start_date, |d| d.min(contract.start_date)),
        );
        entry.latest_trade = Some(
            entry
                .latest_trade
                .map_or(contract.last_trade_date, |d| d.max(contract.last_trade_date)),
        );
    }

    let mut summaries: Vec<ProductSummary> = groups.into_values().collect();
    summaries.sort_by(|a, b| {
        b.num_contracts
            .cmp(&a.num_contracts)
            .then(a.code.cmp(&b.code))
    });
    summaries
}

/// Distinct products, alphabetical by name.
pub fn distinct_products(contracts: &[Contract]) -> Vec<Product> {
    let mut products: Vec<Product> = summarize_products(contracts)
        .into_iter()
        .map(|summary| Product {
            code: summary.code,
            name: summary.name,
        })
        .collect();
    products.sort_by(|a, b| a.name.cmp(&b.name).then(a.code.cmp(&b.code)));
    products
}

/// Case-insensitive substring search over product names.
pub fn search_products(summaries: &[ProductSummary], keyword: &str) -> Vec<ProductSummary> {
    let needle = keyword.to_lowercase();
    summaries
        .iter()
        .filter(|summary| summary.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Distribution of contract lifetimes (start date to last trade), in days.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifecycleStats {
    pub count: usize,
    pub min: i64,
    pub median: f64,
    pub max: i64,
    pub mean: f64,
}

impl LifecycleStats {
    /// Contracts with a non-positive lifecycle are ignored. Returns `None` when
    /// nothing is left.
    pub fn measure(contracts: &[Contract]) -> Option<Self> {
        let mut days: Vec<i64> = contracts
            .iter()
            .map(Contract::lifecycle_days)
            .filter(|d| *d > 0)
            .collect();
        if days.is_empty() {
            return None;
        }
        days.sort_unstable();

        let count = days.len();
        let median = if count % 2 == 0 {
            (days[count / 2 - 1] + days[count / 2]) as f64 / 2.0
        } else {
            days[count / 2] as f64
        };
        let mean = days.iter().sum::<i64>() as f64 / count as f64;

        Some(Self {
            count,
            min: days[0],
            median,
            max: days[count - 1],
            mean,
        })
    }
}

/// Spans covered by one product's contracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractRanges {
    pub first_delivery: DeliveryMonth,
    pub last_delivery: DeliveryMonth,
    pub first_start: NaiveDate,
    pub last_start: NaiveDate,
    pub first_last_trade: NaiveDate,
    pub last_last_trade: NaiveDate,
}

impl ContractRanges {
    /// Delivery bounds follow `order`. `None` for an empty slice.
    pub fn measure(contracts: &[Contract], order: DeliveryOrder) -> Option<Self> {
        let first = contracts.iter().min_by(|a, b| a.delivery_cmp(b, order))?;
        let last = contracts.iter().max_by(|a, b| a.delivery_cmp(b, order))?;
        let starts = contracts.iter().map(|c| c.start_date);
        let last_trades = contracts.iter().map(|c| c.last_trade_date);

        Some(Self {
            first_delivery: first.delivery.clone(),
            last_delivery: last.delivery.clone(),
            first_start: starts.clone().min()?,
            last_start: starts.max()?,
            first_last_trade: last_trades.clone().min()?,
            last_last_trade: last_trades.max()?,
        })
    }
}

/// Distinct delivery months in first-seen order.
///
/// On a sorted contract list the head of this shows the listing cycle:
/// monthly for energy, quarterly (`03/06/09/12`) for Treasuries.
pub fn delivery_pattern(contracts: &[Contract]) -> Vec<DeliveryMonth> {
    let mut seen = HashSet::new();
    contracts
        .iter()
        .filter(|contract| seen.insert(&contract.delivery))
        .map(|contract| contract.delivery.clone())
        .collect()
}
