//! Point-in-time term structures: all contracts of one product settling on one date.
//!
//! Labeling a curve (contango, inverted, ...) depends on the asset class and
//! is left to callers; [`Spread::shape`] is provided for that.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::catalog::{Contract, DeliveryMonth, DeliveryOrder, PricePoint};
use crate::logging::log_event;
use crate::source::{FuturesSource, SourceResult};

/// One contract on the curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermPoint {
    pub futcode: i64,
    pub delivery: DeliveryMonth,
    pub last_trade_date: NaiveDate,
    pub settlement: f64,
    pub volume: Option<f64>,
}

impl TermPoint {
    fn delivery_key(&self) -> (i32, u32) {
        (
            self.delivery.resolve_year(self.last_trade_date.year()),
            self.delivery.month(),
        )
    }
}

pub fn sort_points(points: &mut [TermPoint], order: DeliveryOrder) {
    points.sort_by(|a, b| {
        let by_delivery = match order {
            DeliveryOrder::Chronological => a.delivery_key().cmp(&b.delivery_key()),
            DeliveryOrder::Literal => a.delivery.cmp(&b.delivery),
        };
        by_delivery.then(a.futcode.cmp(&b.futcode))
    });
}

/// Inner join of contracts and prices for `product` on exactly `date`.
///
/// Rows with a null settlement are skipped, as are price rows whose futcode
/// has no contract row.
pub fn settlement_rows(
    contracts: &[Contract],
    prices: &[PricePoint],
    product: i64,
    date: NaiveDate,
) -> Vec<TermPoint> {
    let by_futcode: HashMap<i64, &Contract> = contracts
        .iter()
        .filter(|contract| contract.contrcode == product)
        .map(|contract| (contract.futcode, contract))
        .collect();

    prices
        .iter()
        .filter(|point| point.date == date)
        .filter_map(|point| {
            let contract = by_futcode.get(&point.futcode)?;
            let settlement = point.settlement?;
            Some(TermPoint {
                futcode: point.futcode,
                delivery: contract.delivery.clone(),
                last_trade_date: contract.last_trade_date,
                settlement,
                volume: point.volume,
            })
        })
        .collect()
}

/// Latest date strictly before `date` with at least one non-null settlement
/// for `product`.
pub fn latest_settlement_date_before(
    contracts: &[Contract],
    prices: &[PricePoint],
    product: i64,
    date: NaiveDate,
) -> Option<NaiveDate> {
    let futcodes: HashSet<i64> = contracts
        .iter()
        .filter(|contract| contract.contrcode == product)
        .map(|contract| contract.futcode)
        .collect();

    prices
        .iter()
        .filter(|point| {
            point.date < date && point.settlement.is_some() && futcodes.contains(&point.futcode)
        })
        .map(|point| point.date)
        .max()
}

/// A product's curve on one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermStructure {
    pub product: i64,
    /// Date the caller asked for.
    pub requested: NaiveDate,
    /// Date the points were observed on; earlier than `requested` after a fallback.
    pub as_of: NaiveDate,
    pub points: Vec<TermPoint>,
}

impl TermStructure {
    pub fn is_fallback(&self) -> bool {
        self.as_of != self.requested
    }

    /// Front-to-back spread; needs at least two points.
    pub fn spread(&self) -> Option<Spread> {
        if self.points.len() < 2 {
            return None;
        }
        let front = self.points.first()?.settlement;
        let back = self.points.last()?.settlement;
        let change = back - front;
        let pct_change = if front.abs() < f64::EPSILON {
            None
        } else {
            Some((back / front - 1.0) * 100.0)
        };
        Some(Spread {
            front,
            back,
            change,
            pct_change,
        })
    }
}

impl fmt::Display for TermStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  {:<12} {:>8} {:>12} {:>10} {:>12}",
            "Delivery", "Futcode", "Settlement", "Volume", "Last Trade"
        )?;
        writeln!(f, "  {}", "-".repeat(60))?;
        for point in &self.points {
            let volume = point
                .volume
                .map_or_else(|| "N/A".to_string(), |v| format!("{v:.0}"));
            writeln!(
                f,
                "  {:<12} {:>8} {:>12.4} {:>10} {:>12}",
                point.delivery,
                point.futcode,
                point.settlement,
                volume,
                point.last_trade_date.to_string()
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spread {
    pub front: f64,
    pub back: f64,
    pub change: f64,
    /// Percent change from front to back; `None` when the front price is zero.
    pub pct_change: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssetClass {
    Commodity,
    Rates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CurveShape {
    Contango,
    Backwardation,
    UpwardSloping,
    Inverted,
}

impl fmt::Display for CurveShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Contango => "contango",
            Self::Backwardation => "backwardation",
            Self::UpwardSloping => "upward sloping",
            Self::Inverted => "downward sloping (inverted)",
        };
        f.pad(label)
    }
}

impl Spread {
    pub fn shape(&self, class: AssetClass) -> CurveShape {
        let rising = self.change > 0.0;
        match (class, rising) {
            (AssetClass::Commodity, true) => CurveShape::Contango,
            (AssetClass::Commodity, false) => CurveShape::Backwardation,
            (AssetClass::Rates, true) => CurveShape::UpwardSloping,
            (AssetClass::Rates, false) => CurveShape::Inverted,
        }
    }
}

/// Pure snapshot over already-fetched tables, with the same fallback rule as
/// [`snapshot`].
pub fn build_snapshot(
    contracts: &[Contract],
    prices: &[PricePoint],
    product: i64,
    reference: NaiveDate,
    order: DeliveryOrder,
) -> Option<TermStructure> {
    let mut as_of = reference;
    let mut points = settlement_rows(contracts, prices, product, reference);
    if points.is_empty() {
        as_of = latest_settlement_date_before(contracts, prices, product, reference)?;
        points = settlement_rows(contracts, prices, product, as_of);
    }
    if points.is_empty() {
        return None;
    }

    sort_points(&mut points, order);
    Some(TermStructure {
        product,
        requested: reference,
        as_of,
        points,
    })
}

/// Term structure of `product` on `reference`.
///
/// When nothing settles on the reference date, falls back to the latest
/// earlier date with a settlement for the product and queries that instead.
/// Never moves forward in time. `None` when neither date has rows.
pub fn snapshot<S: FuturesSource + ?Sized>(
    source: &mut S,
    product: i64,
    reference: NaiveDate,
    order: DeliveryOrder,
) -> SourceResult<Option<TermStructure>> {
    let mut as_of = reference;
    let mut points = source.settlement_rows(product, reference)?;

    if points.is_empty() {
        let Some(fallback) = source.latest_settlement_date_before(product, reference)? else {
            log_event(
                file!(),
                "TermStructure",
                "snapshot",
                "term_structure.fallback",
                line!(),
                &format!("NO DATA: no settlements on or before {reference}"),
                None,
                Some(product),
            );
            return Ok(None);
        };

        log_event(
            file!(),
            "TermStructure",
            "snapshot",
            "term_structure.fallback",
            line!(),
            &format!("No data on {reference}. Using latest earlier date {fallback}"),
            None,
            Some(product),
        );
        as_of = fallback;
        points = source.settlement_rows(product, fallback)?;
    }

    if points.is_empty() {
        return Ok(None);
    }

    sort_points(&mut points, order);
    log_event(
        file!(),
        "TermStructure",
        "snapshot",
        "term_structure.build",
        line!(),
        &format!("Built term structure with {} contracts as of {as_of}", points.len()),
        None,
        Some(product),
    );

    Ok(Some(TermStructure {
        product,
        requested: reference,
        as_of,
        points,
    }))
}
