use std::fs;
use std::path::Path;

use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use polars::prelude::*;
use tempfile::TempDir;

use dsfut::catalog::{DateRange, DeliveryOrder};
use dsfut::dump::{CONTRACTS_STEM, PRICES_STEM};
use dsfut::export::{contract_prices_frame, summary_frame, term_structure_frame, write_frame};
use dsfut::universe::{UniverseSummary, pull_product_prices};
use dsfut::{FuturesSource, LocalDump, SourceError, snapshot};

const CONTRACTS_CSV: &str = "\
futcode,contrcode,contrname,contrdate,startdate,lasttrddate
101,2020,GOLD 100 OZ,0224,2023-06-01,2024-02-01
102,2020,GOLD 100 OZ,1224,2024-03-01,2025-01-01
103,2020,GOLD 100 OZ,0625,2025-02-01,2025-06-01
201,458,10 YEAR US TREASURY NOTE,0924,2023-12-01,2024-09-19
202,458,10 YEAR US TREASURY NOTE,1224,2024-03-01,2024-12-19
";

const PRICES_CSV: &str = "\
futcode,date_,settlement,open_,high,low,volume
102,2024-07-02,2350.0,2345.0,2355.0,2340.0,900
102,2024-07-03,2360.5,2351.0,2362.0,2349.0,1000
102,2024-07-05,2390.0,2361.0,2395.0,2360.0,1100
201,2024-07-03,110.25,110.0,110.5,109.9,
202,2024-07-03,110.75,110.5,111.0,110.4,50
201,2024-07-04,,,,,
";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn write_csv_dump(dir: &Path) -> std::io::Result<()> {
    fs::write(dir.join(format!("{CONTRACTS_STEM}.csv")), CONTRACTS_CSV)?;
    fs::write(dir.join(format!("{PRICES_STEM}.csv")), PRICES_CSV)
}

fn read_back(path: &Path) -> PolarsResult<DataFrame> {
    if path.extension().and_then(|e| e.to_str()) == Some("csv") {
        LazyCsvReader::new(path).has_header(true).finish()?.collect()
    } else {
        LazyFrame::scan_parquet(path, ScanArgsParquet::default())?.collect()
    }
}

#[test]
fn csv_dump_decodes_both_tables() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_csv_dump(dir.path())?;

    let dump = LocalDump::from_dir(dir.path())?;
    assert_eq!(dump.contract_rows().len(), 5);
    assert_eq!(dump.price_rows().len(), 6);

    let gold_feb = &dump.contract_rows()[0];
    assert_eq!(gold_feb.futcode, 101);
    assert_eq!(gold_feb.delivery.as_str(), "0224");
    assert_eq!(gold_feb.contrname.as_deref(), Some("GOLD 100 OZ"));
    assert_eq!(gold_feb.start_date, date(2023, 6, 1));
    assert_eq!(gold_feb.last_trade_date, date(2024, 2, 1));

    let holiday = &dump.price_rows()[5];
    assert_eq!(holiday.date, date(2024, 7, 4));
    assert!(holiday.settlement.is_none());
    assert!(dump.price_rows()[3].volume.is_none());
    Ok(())
}

#[test]
fn missing_dump_files_are_reported() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    match LocalDump::from_dir(dir.path()) {
        Err(SourceError::MissingFile(path)) => {
            assert!(path.ends_with(format!("{CONTRACTS_STEM}.csv")));
        }
        other => panic!("expected a missing file error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn saved_parquet_dump_reloads_identically() -> anyhow::Result<()> {
    let csv_dir = TempDir::new()?;
    write_csv_dump(csv_dir.path())?;
    let original = LocalDump::from_dir(csv_dir.path())?;

    let parquet_dir = TempDir::new()?;
    original.save(parquet_dir.path())?;
    assert!(parquet_dir.path().join(format!("{PRICES_STEM}.parquet")).exists());

    let reloaded = LocalDump::from_dir(parquet_dir.path())?;
    assert_eq!(reloaded.contract_rows(), original.contract_rows());
    assert_eq!(reloaded.price_rows(), original.price_rows());
    Ok(())
}

#[test]
fn dump_answers_source_queries() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_csv_dump(dir.path())?;
    let mut dump = LocalDump::from_dir(dir.path())?;

    let summaries = dump.product_summaries()?;
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].code, 2020);

    let range = DateRange::new(date(2024, 1, 1), date(2024, 12, 31))?;
    let active = dump.active_contracts(2020, range, DeliveryOrder::Chronological)?;
    assert_eq!(active.iter().map(|c| c.futcode).collect::<Vec<_>>(), vec![101, 102]);

    assert!(dump.prices(&[], range)?.is_empty());
    assert_eq!(dump.prices(&[201, 202], range)?.len(), 3);

    assert_eq!(
        dump.latest_settlement_date_before(458, date(2024, 7, 4))?,
        Some(date(2024, 7, 3))
    );
    assert_eq!(dump.latest_price_date()?, Some(date(2024, 7, 5)));
    Ok(())
}

#[test]
fn exported_frames_keep_their_columns() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_csv_dump(dir.path())?;
    let mut dump = LocalDump::from_dir(dir.path())?;
    let range = DateRange::new(date(2024, 1, 1), date(2024, 12, 31))?;

    let rows = pull_product_prices(&mut dump, "Gold", 2020, range, DeliveryOrder::Chronological)?;
    assert_eq!(rows.len(), 3);

    let out = dir.path().join("out");
    let prices_path = out.join("gold.parquet");
    write_frame(&mut contract_prices_frame(&rows)?, &prices_path)?;
    let prices = read_back(&prices_path)?;
    assert_eq!(prices.height(), 3);
    assert_eq!(
        prices.get_column_names(),
        vec!["product", "contrcode", "futcode", "contrdate", "date_", "settlement"]
    );

    let summary_path = out.join("gold_summary.csv");
    write_frame(&mut summary_frame(&UniverseSummary::from_rows(&rows))?, &summary_path)?;
    let summary = read_back(&summary_path)?;
    assert_eq!(summary.height(), 1);
    let max = summary.column("settlement_max")?.f64()?.get(0).unwrap();
    assert_abs_diff_eq!(max, 2390.0, epsilon = 1e-9);

    let curve = snapshot(&mut dump, 458, date(2024, 7, 4), DeliveryOrder::Chronological)?
        .expect("fallback curve");
    let curve_path = out.join("curves").join("458.csv");
    write_frame(&mut term_structure_frame(&curve)?, &curve_path)?;
    let written = read_back(&curve_path)?;
    assert_eq!(written.height(), 2);
    let futcodes: Vec<Option<i64>> = written.column("futcode")?.i64()?.into_iter().collect();
    assert_eq!(futcodes, vec![Some(201), Some(202)]);
    Ok(())
}

#[test]
fn contracts_missing_dates_are_dropped_not_fatal() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let contracts = "\
futcode,contrcode,contrname,contrdate,startdate,lasttrddate
101,2020,GOLD 100 OZ,0224,2023-06-01,2024-02-01
102,2020,GOLD 100 OZ,1224,2024-03-01,
103,2020,GOLD 100 OZ,0625,,2025-06-01
";
    fs::write(dir.path().join(format!("{CONTRACTS_STEM}.csv")), contracts)?;
    fs::write(dir.path().join(format!("{PRICES_STEM}.csv")), PRICES_CSV)?;

    let mut dump = LocalDump::from_dir(dir.path())?;
    assert_eq!(dump.contract_rows().len(), 1);

    let range = DateRange::new(date(2024, 1, 1), date(2025, 12, 31))?;
    let active = dump.active_contracts(2020, range, DeliveryOrder::Chronological)?;
    assert_eq!(active.iter().map(|c| c.futcode).collect::<Vec<_>>(), vec![101]);
    assert_eq!(dump.contracts(2020, DeliveryOrder::Literal)?.len(), 1);
    Ok(())
}
