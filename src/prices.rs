use std::collections::HashSet;

use chrono::NaiveDate;

use crate::catalog::{DateRange, PricePoint};
use crate::logging::log_event;

/// Price rows for `futcodes` dated within `range`, ordered by `(futcode, date)`.
///
/// An empty id set yields an empty result.
pub fn filter_prices(prices: &[PricePoint], futcodes: &[i64], range: DateRange) -> Vec<PricePoint> {
    if futcodes.is_empty() {
        return Vec::new();
    }

    let wanted: HashSet<i64> = futcodes.iter().copied().collect();
    let mut selected: Vec<PricePoint> = prices
        .iter()
        .filter(|point| wanted.contains(&point.futcode) && range.contains(point.date))
        .cloned()
        .collect();
    selected.sort_by(|a, b| a.futcode.cmp(&b.futcode).then(a.date.cmp(&b.date)));

    log_event(
        file!(),
        "PriceFetcher",
        "filter_prices",
        "prices.fetch",
        line!(),
        &format!(
            "Selected {} price rows for {} contracts within {range}",
            selected.len(),
            wanted.len()
        ),
        None,
        None,
    );

    selected
}

/// Render an id set as a single SQL `IN (...)` list.
///
/// Used for logging and for callers that splice the batch into hand-written
/// SQL; the live session binds the ids as one array parameter instead.
pub fn futcode_in_clause(futcodes: &[i64]) -> String {
    let joined = futcodes
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("IN ({joined})")
}

/// Data-quality profile of a batch of price rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuality {
    pub records: usize,
    pub unique_contracts: usize,
    pub settlement_nulls: usize,
    pub volume_nulls: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub settlement_min: Option<f64>,
    pub settlement_max: Option<f64>,
    pub settlement_mean: Option<f64>,
}

impl PriceQuality {
    pub fn measure(prices: &[PricePoint]) -> Self {
        let settlements: Vec<f64> = prices.iter().filter_map(|p| p.settlement).collect();
        let unique: HashSet<i64> = prices.iter().map(|p| p.futcode).collect();

        let (settlement_min, settlement_max, settlement_mean) = if settlements.is_empty() {
            (None, None, None)
        } else {
            let min = settlements.iter().copied().fold(f64::INFINITY, f64::min);
            let max = settlements.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = settlements.iter().sum::<f64>() / settlements.len() as f64;
            (Some(min), Some(max), Some(mean))
        };

        Self {
            records: prices.len(),
            unique_contracts: unique.len(),
            settlement_nulls: prices.len() - settlements.len(),
            volume_nulls: prices.iter().filter(|p| p.volume.is_none()).count(),
            first_date: prices.iter().map(|p| p.date).min(),
            last_date: prices.iter().map(|p| p.date).max(),
            settlement_min,
            settlement_max,
            settlement_mean,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_clause_joins_ids() {
        assert_eq!(futcode_in_clause(&[11, 12, 13]), "IN (11,12,13)");
    }

    #[test]
    fn quality_of_empty_batch() {
        let quality = PriceQuality::measure(&[]);
        assert_eq!(quality.records, 0);
        assert!(quality.settlement_mean.is_none());
        assert!(quality.first_date.is_none());
    }
}
