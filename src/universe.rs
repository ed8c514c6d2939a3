//! Multi-product price pulls: the commodity panel and the Treasury complex.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::catalog::{DateRange, DeliveryMonth, DeliveryOrder};
use crate::logging::log_event;
use crate::resolver::futcodes;
use crate::source::{FuturesSource, SourceResult};
use crate::term_structure::AssetClass;

/// A labelled product code to pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniverseProduct {
    pub label: &'static str,
    pub code: i64,
    pub class: AssetClass,
}

const fn commodity(label: &'static str, code: i64) -> UniverseProduct {
    UniverseProduct {
        label,
        code,
        class: AssetClass::Commodity,
    }
}

const fn rates(label: &'static str, code: i64) -> UniverseProduct {
    UniverseProduct {
        label,
        code,
        class: AssetClass::Rates,
    }
}

/// The 21-commodity panel of Szymanowska et al. (2014).
///
/// Some codes were discontinued (Platinum 2087 ended 2016, Soybeans 396 in
/// 2018) and come back empty for recent ranges.
pub const COMMODITIES: &[UniverseProduct] = &[
    // Energy
    commodity("Crude Oil", 1986),
    commodity("Heating Oil", 2091),
    commodity("Natural Gas", 2029),
    // Meats
    commodity("Live Cattle", 2675),
    commodity("Feeder Cattle", 2676),
    commodity("Lean Hogs", 3126),
    // Metals
    commodity("Gold", 2020),
    commodity("Silver", 2026),
    commodity("Platinum", 2087),
    // Grains
    commodity("Corn", 3247),
    commodity("Wheat", 3250),
    commodity("Oats", 3256),
    commodity("Rough Rice", 3847),
    // Oilseeds
    commodity("Soybeans", 396),
    commodity("Soybean Meal", 430),
    commodity("Soybean Oil", 379),
    // Softs
    commodity("Coffee", 2038),
    commodity("Orange Juice", 2060),
    commodity("Cocoa", 2032),
    // Industrials
    commodity("Cotton", 1992),
    commodity("Lumber", 2036),
];

/// CBOT Treasury futures with data through 2025.
pub const TREASURIES: &[UniverseProduct] = &[
    rates("2Y T-Note", 463),
    rates("5Y T-Note", 452),
    rates("10Y T-Note", 458),
    rates("30Y T-Bond", 448),
];

/// Look up a product's asset class from the built-in universes.
pub fn asset_class(code: i64) -> Option<AssetClass> {
    COMMODITIES
        .iter()
        .chain(TREASURIES)
        .find(|product| product.code == code)
        .map(|product| product.class)
}

/// A price row with its contract's delivery month attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractPrice {
    pub product: String,
    pub contrcode: i64,
    pub futcode: i64,
    /// `None` when the price's futcode has no contract row.
    pub delivery: Option<DeliveryMonth>,
    pub date: NaiveDate,
    pub settlement: Option<f64>,
}

/// Resolve a product's contracts for `range`, fetch their prices in one batch,
/// and attach each price's delivery month.
///
/// Returns an empty vec when no contract or no price matches.
pub fn pull_product_prices<S: FuturesSource + ?Sized>(
    source: &mut S,
    label: &str,
    product: i64,
    range: DateRange,
    order: DeliveryOrder,
) -> SourceResult<Vec<ContractPrice>> {
    let contracts = source.active_contracts(product, range, order)?;
    if contracts.is_empty() {
        return Ok(Vec::new());
    }

    let prices = source.prices(&futcodes(&contracts), range)?;
    let deliveries: HashMap<i64, &DeliveryMonth> = contracts
        .iter()
        .map(|contract| (contract.futcode, &contract.delivery))
        .collect();

    Ok(prices
        .into_iter()
        .map(|point| ContractPrice {
            product: label.to_string(),
            contrcode: product,
            futcode: point.futcode,
            delivery: deliveries.get(&point.futcode).map(|d| (*d).clone()),
            date: point.date,
            settlement: point.settlement,
        })
        .collect())
}

#[derive(Debug, Clone, Default)]
pub struct UniversePull {
    pub rows: Vec<ContractPrice>,
    /// Labels of products that returned nothing.
    pub missing: Vec<String>,
}

/// Pull every product in `products` sequentially.
///
/// Empty products are recorded in [`UniversePull::missing`] and logged as
/// `NO DATA`; any source error aborts the whole pull.
pub fn pull_universe<S: FuturesSource + ?Sized>(
    source: &mut S,
    products: &[UniverseProduct],
    range: DateRange,
    order: DeliveryOrder,
) -> SourceResult<UniversePull> {
    let mut pull = UniversePull::default();

    for product in products {
        let rows = pull_product_prices(source, product.label, product.code, range, order)?;
        let message = if rows.is_empty() {
            pull.missing.push(product.label.to_string());
            format!("{} (code={}) NO DATA", product.label, product.code)
        } else {
            let contracts: HashSet<i64> = rows.iter().map(|row| row.futcode).collect();
            format!(
                "{} (code={}) contracts={} records={}",
                product.label,
                product.code,
                contracts.len(),
                rows.len()
            )
        };
        log_event(
            file!(),
            "Universe",
            "pull_universe",
            "universe.pull",
            line!(),
            &message,
            None,
            Some(product.code),
        );
        pull.rows.extend(rows);
    }

    Ok(pull)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductBreakdown {
    pub product: String,
    pub records: usize,
    pub contracts: usize,
    pub settlement_min: Option<f64>,
    pub settlement_max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniverseSummary {
    pub records: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub products: usize,
    pub contracts: usize,
    pub settlement_nulls: usize,
    pub settlement_min: Option<f64>,
    pub settlement_max: Option<f64>,
    /// Sorted by product label.
    pub breakdown: Vec<ProductBreakdown>,
}

fn min_max(values: impl Iterator<Item = f64>) -> (Option<f64>, Option<f64>) {
    values.fold((None, None), |(lo, hi), v| {
        (
            Some(lo.map_or(v, |lo: f64| lo.min(v))),
            Some(hi.map_or(v, |hi: f64| hi.max(v))),
        )
    })
}

impl UniverseSummary {
    pub fn from_rows(rows: &[ContractPrice]) -> Self {
        let mut by_product: BTreeMap<&str, Vec<&ContractPrice>> = BTreeMap::new();
        for row in rows {
            by_product.entry(row.product.as_str()).or_default().push(row);
        }

        let breakdown = by_product
            .iter()
            .map(|(product, rows)| {
                let (settlement_min, settlement_max) =
                    min_max(rows.iter().filter_map(|row| row.settlement));
                ProductBreakdown {
                    product: product.to_string(),
                    records: rows.len(),
                    contracts: rows
                        .iter()
                        .map(|row| row.futcode)
                        .collect::<HashSet<_>>()
                        .len(),
                    settlement_min,
                    settlement_max,
                }
            })
            .collect();

        let (settlement_min, settlement_max) = min_max(rows.iter().filter_map(|r| r.settlement));

        Self {
            records: rows.len(),
            first_date: rows.iter().map(|row| row.date).min(),
            last_date: rows.iter().map(|row| row.date).max(),
            products: by_product.len(),
            contracts: rows.iter().map(|row| row.futcode).collect::<HashSet<_>>().len(),
            settlement_nulls: rows.iter().filter(|row| row.settlement.is_none()).count(),
            settlement_min,
            settlement_max,
            breakdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universes_have_expected_sizes_and_unique_codes() {
        assert_eq!(COMMODITIES.len(), 21);
        assert_eq!(TREASURIES.len(), 4);
        let codes: HashSet<i64> = COMMODITIES.iter().chain(TREASURIES).map(|p| p.code).collect();
        assert_eq!(codes.len(), 25);
    }

    #[test]
    fn asset_class_lookup() {
        assert_eq!(asset_class(2020), Some(AssetClass::Commodity));
        assert_eq!(asset_class(458), Some(AssetClass::Rates));
        assert_eq!(asset_class(1), None);
    }
}
