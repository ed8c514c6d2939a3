use std::collections::HashSet;

use approx::assert_abs_diff_eq;
use chrono::NaiveDate;

use dsfut::catalog::{
    Contract, DateRange, DeliveryMonth, DeliveryOrder, PricePoint, search_products,
    summarize_products,
};
use dsfut::prices::{PriceQuality, filter_prices};
use dsfut::resolver::{contracts_for_product, futcodes, resolve_contracts};
use dsfut::term_structure::{
    AssetClass, CurveShape, build_snapshot, latest_settlement_date_before, snapshot,
};
use dsfut::universe::{UniverseProduct, UniverseSummary, pull_product_prices, pull_universe};
use dsfut::{FuturesSource, LocalDump, logging};

const GOLD: i64 = 2020;
const TNOTE: i64 = 458;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn contract(futcode: i64, product: i64, delivery: &str, start: NaiveDate, last: NaiveDate) -> Contract {
    Contract {
        futcode,
        contrcode: product,
        contrname: Some(if product == GOLD { "GOLD 100 OZ" } else { "10 YEAR US TREASURY NOTE" }.into()),
        delivery: DeliveryMonth::parse(delivery).unwrap(),
        start_date: start,
        last_trade_date: last,
    }
}

fn price(futcode: i64, day: NaiveDate, settlement: Option<f64>, volume: Option<f64>) -> PricePoint {
    PricePoint {
        futcode,
        date: day,
        settlement,
        open: settlement,
        high: settlement,
        low: settlement,
        volume,
    }
}

/// Gold contracts A, B, C plus two T-Note contracts.
fn fixture_contracts() -> Vec<Contract> {
    vec![
        contract(101, GOLD, "0224", date(2023, 6, 1), date(2024, 2, 1)),
        contract(102, GOLD, "1224", date(2024, 3, 1), date(2025, 1, 1)),
        contract(103, GOLD, "0625", date(2025, 2, 1), date(2025, 6, 1)),
        contract(201, TNOTE, "0924", date(2023, 12, 1), date(2024, 9, 19)),
        contract(202, TNOTE, "1224", date(2024, 3, 1), date(2024, 12, 19)),
    ]
}

/// Prices around the 2024-07-04 holiday: data on the 3rd and the 5th only.
fn fixture_prices() -> Vec<PricePoint> {
    vec![
        price(102, date(2024, 7, 2), Some(2350.0), Some(900.0)),
        price(102, date(2024, 7, 3), Some(2360.5), Some(1000.0)),
        price(102, date(2024, 7, 5), Some(2390.0), Some(1100.0)),
        price(201, date(2024, 7, 3), Some(110.25), None),
        price(202, date(2024, 7, 3), Some(110.75), Some(50.0)),
        price(201, date(2024, 7, 4), None, None),
        price(202, date(2024, 7, 5), Some(111.0), Some(60.0)),
        price(101, date(2024, 1, 15), Some(2050.0), Some(400.0)),
        // No contract row for this futcode.
        price(999, date(2024, 7, 3), Some(1.0), Some(1.0)),
    ]
}

fn year_2024() -> DateRange {
    DateRange::new(date(2024, 1, 1), date(2024, 12, 31)).unwrap()
}

#[test]
fn resolver_returns_contracts_overlapping_the_range() {
    logging::init_logging().expect("logging initializes");

    let resolved = resolve_contracts(
        &fixture_contracts(),
        GOLD,
        year_2024(),
        DeliveryOrder::Chronological,
    );
    let codes: Vec<i64> = resolved.iter().map(|c| c.futcode).collect();
    assert_eq!(codes, vec![101, 102]);

    for contract in &resolved {
        assert!(contract.last_trade_date >= year_2024().start);
        assert!(contract.start_date <= year_2024().end);
    }
}

#[test]
fn resolver_returns_empty_for_unknown_or_inactive_products() {
    let contracts = fixture_contracts();
    assert!(resolve_contracts(&contracts, 1, year_2024(), DeliveryOrder::Literal).is_empty());

    let long_ago = DateRange::new(date(1990, 1, 1), date(1990, 12, 31)).unwrap();
    assert!(resolve_contracts(&contracts, GOLD, long_ago, DeliveryOrder::Literal).is_empty());
}

#[test]
fn resolver_ordering_policies_differ_across_year_boundaries() {
    let contracts = vec![
        contract(1, GOLD, "1224", date(2024, 1, 1), date(2024, 12, 27)),
        contract(2, GOLD, "0125", date(2024, 1, 1), date(2025, 1, 29)),
    ];
    let range = DateRange::new(date(2024, 6, 1), date(2024, 6, 30)).unwrap();

    let literal = resolve_contracts(&contracts, GOLD, range, DeliveryOrder::Literal);
    assert_eq!(futcodes(&literal), vec![2, 1]);

    let chronological = resolve_contracts(&contracts, GOLD, range, DeliveryOrder::Chronological);
    assert_eq!(futcodes(&chronological), vec![1, 2]);
}

#[test]
fn price_filter_keeps_only_requested_contracts_within_range() {
    let range = DateRange::new(date(2024, 7, 3), date(2024, 7, 4)).unwrap();
    let ids = [102, 201];
    let rows = filter_prices(&fixture_prices(), &ids, range);

    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert!(ids.contains(&row.futcode));
        assert!(range.contains(row.date));
    }
    let keys: Vec<(i64, NaiveDate)> = rows.iter().map(|r| (r.futcode, r.date)).collect();
    assert_eq!(
        keys,
        vec![
            (102, date(2024, 7, 3)),
            (201, date(2024, 7, 3)),
            (201, date(2024, 7, 4)),
        ]
    );
    // Null prices pass through untouched.
    assert!(rows[2].settlement.is_none());

    assert!(filter_prices(&fixture_prices(), &[], year_2024()).is_empty());
}

#[test]
fn price_quality_counts_nulls_and_ranges() {
    let rows = filter_prices(&fixture_prices(), &[201, 202], year_2024());
    let quality = PriceQuality::measure(&rows);

    assert_eq!(quality.records, 4);
    assert_eq!(quality.unique_contracts, 2);
    assert_eq!(quality.settlement_nulls, 1);
    assert_eq!(quality.volume_nulls, 2);
    assert_eq!(quality.first_date, Some(date(2024, 7, 3)));
    assert_eq!(quality.last_date, Some(date(2024, 7, 5)));
    assert_abs_diff_eq!(quality.settlement_min.unwrap(), 110.25, epsilon = 1e-12);
    assert_abs_diff_eq!(quality.settlement_max.unwrap(), 111.0, epsilon = 1e-12);
    assert_abs_diff_eq!(
        quality.settlement_mean.unwrap(),
        (110.25 + 110.75 + 111.0) / 3.0,
        epsilon = 1e-12
    );
}

#[test]
fn holiday_snapshot_falls_back_to_the_previous_trading_day() {
    let contracts = fixture_contracts();
    let prices = fixture_prices();
    let holiday = date(2024, 7, 4);

    let curve = build_snapshot(&contracts, &prices, TNOTE, holiday, DeliveryOrder::Chronological)
        .expect("a curve exists");
    assert_eq!(curve.requested, holiday);
    assert_eq!(curve.as_of, date(2024, 7, 3));
    assert!(curve.is_fallback());
    assert_eq!(
        curve.points.iter().map(|p| p.futcode).collect::<Vec<_>>(),
        vec![201, 202]
    );

    // No date strictly between the fallback and the reference has settlements.
    let fallback = latest_settlement_date_before(&contracts, &prices, TNOTE, holiday).unwrap();
    assert!(fallback < holiday);
    assert!(
        !prices
            .iter()
            .any(|p| p.date > fallback && p.date < holiday && p.settlement.is_some()
                && [201, 202].contains(&p.futcode))
    );
}

#[test]
fn snapshot_on_a_trading_day_uses_that_day_and_drops_orphan_prices() {
    let curve = build_snapshot(
        &fixture_contracts(),
        &fixture_prices(),
        GOLD,
        date(2024, 7, 3),
        DeliveryOrder::Chronological,
    )
    .unwrap();
    assert!(!curve.is_fallback());
    assert_eq!(curve.points.len(), 1);
    assert_eq!(curve.points[0].futcode, 102);
    assert!(curve.spread().is_none());
}

#[test]
fn snapshot_through_a_source_is_deterministic() -> anyhow::Result<()> {
    let mut dump = LocalDump::new(fixture_contracts(), fixture_prices());
    let holiday = date(2024, 7, 4);

    let first = snapshot(&mut dump, TNOTE, holiday, DeliveryOrder::Chronological)?;
    let second = snapshot(&mut dump, TNOTE, holiday, DeliveryOrder::Chronological)?;
    assert_eq!(first, second);

    let curve = first.expect("fallback curve");
    assert_eq!(curve.as_of, date(2024, 7, 3));
    assert_eq!(
        curve,
        build_snapshot(
            dump.contract_rows(),
            dump.price_rows(),
            TNOTE,
            holiday,
            DeliveryOrder::Chronological
        )
        .unwrap()
    );

    let spread = curve.spread().expect("two points");
    assert_abs_diff_eq!(spread.change, 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(
        spread.pct_change.unwrap(),
        (110.75 / 110.25 - 1.0) * 100.0,
        epsilon = 1e-9
    );
    assert_eq!(spread.shape(AssetClass::Rates), CurveShape::UpwardSloping);
    assert_eq!(spread.shape(AssetClass::Commodity), CurveShape::Contango);
    Ok(())
}

#[test]
fn snapshot_before_any_data_is_none() -> anyhow::Result<()> {
    let mut dump = LocalDump::new(fixture_contracts(), fixture_prices());
    assert!(snapshot(&mut dump, GOLD, date(2020, 1, 1), DeliveryOrder::Literal)?.is_none());
    assert!(snapshot(&mut dump, 1, date(2024, 7, 3), DeliveryOrder::Literal)?.is_none());
    Ok(())
}

#[test]
fn catalog_summaries_and_search() -> anyhow::Result<()> {
    let contracts = fixture_contracts();
    let summaries = summarize_products(&contracts);

    assert_eq!(summaries[0].code, GOLD);
    assert_eq!(summaries[0].num_contracts, 3);
    assert_eq!(summaries[0].earliest_start, Some(date(2023, 6, 1)));
    assert_eq!(summaries[0].latest_trade, Some(date(2025, 6, 1)));

    let treasury = search_products(&summaries, "TREASURY");
    assert_eq!(treasury.len(), 1);
    assert_eq!(treasury[0].code, TNOTE);

    let mut dump = LocalDump::new(contracts.clone(), Vec::new());
    assert!(dump.search_products("platinum")?.is_empty());
    assert_eq!(
        dump.contracts(GOLD, DeliveryOrder::Chronological)?,
        contracts_for_product(&contracts, GOLD, DeliveryOrder::Chronological)
    );
    Ok(())
}

#[test]
fn product_pull_attaches_delivery_months() -> anyhow::Result<()> {
    let mut dump = LocalDump::new(fixture_contracts(), fixture_prices());
    let rows = pull_product_prices(
        &mut dump,
        "10Y T-Note",
        TNOTE,
        year_2024(),
        DeliveryOrder::Chronological,
    )?;

    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|row| row.contrcode == TNOTE));
    let sept: Vec<_> = rows.iter().filter(|row| row.futcode == 201).collect();
    assert!(
        sept.iter()
            .all(|row| row.delivery.as_ref().map(|d| d.as_str()) == Some("0924"))
    );
    Ok(())
}

#[test]
fn universe_pull_records_missing_products() -> anyhow::Result<()> {
    let mut dump = LocalDump::new(fixture_contracts(), fixture_prices());
    let products = [
        UniverseProduct {
            label: "Gold",
            code: GOLD,
            class: AssetClass::Commodity,
        },
        UniverseProduct {
            label: "Platinum",
            code: 2087,
            class: AssetClass::Commodity,
        },
        UniverseProduct {
            label: "10Y T-Note",
            code: TNOTE,
            class: AssetClass::Rates,
        },
    ];

    let pull = pull_universe(&mut dump, &products, year_2024(), DeliveryOrder::Chronological)?;
    assert_eq!(pull.missing, vec!["Platinum".to_string()]);
    assert_eq!(pull.rows.len(), 8);

    let summary = UniverseSummary::from_rows(&pull.rows);
    assert_eq!(summary.records, 8);
    assert_eq!(summary.products, 2);
    assert_eq!(summary.contracts, 4);
    assert_eq!(summary.settlement_nulls, 1);
    assert_eq!(summary.first_date, Some(date(2024, 1, 15)));
    assert_eq!(
        summary
            .breakdown
            .iter()
            .map(|b| b.product.as_str())
            .collect::<Vec<_>>(),
        vec!["10Y T-Note", "Gold"]
    );
    let gold = &summary.breakdown[1];
    assert_eq!(gold.records, 4);
    assert_eq!(gold.contracts, 2);
    assert_abs_diff_eq!(gold.settlement_min.unwrap(), 2050.0, epsilon = 1e-12);
    assert_abs_diff_eq!(gold.settlement_max.unwrap(), 2390.0, epsilon = 1e-12);

    let futcodes: HashSet<i64> = pull.rows.iter().map(|r| r.futcode).collect();
    assert!(!futcodes.contains(&999));
    Ok(())
}
