//! Conversions between polars frames and the typed records in [`crate::catalog`].
//!
//! Column names follow the warehouse tables: `futcode, contrcode, contrname,
//! contrdate, startdate, lasttrddate` for contracts and `futcode, date_,
//! settlement, open_, high, low, volume` for prices.

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

use crate::catalog::{Contract, DeliveryMonth, PricePoint};
use crate::logging::log_event;
use crate::source::{SourceError, SourceResult};

/// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
}

pub fn days_from_date(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn has_column(frame: &DataFrame, name: &str) -> bool {
    frame.get_column_names().contains(&name)
}

fn i64_column(frame: &DataFrame, name: &str) -> PolarsResult<Vec<Option<i64>>> {
    let series = frame.column(name)?.cast(&DataType::Int64)?;
    Ok(series.i64()?.into_iter().collect())
}

/// Optional float column; a missing column reads as all nulls.
fn f64_column(frame: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    if !has_column(frame, name) {
        return Ok(vec![None; frame.height()]);
    }
    let series = frame.column(name)?.cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

fn utf8_column(frame: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let series = frame.column(name)?.cast(&DataType::Utf8)?;
    Ok(series
        .utf8()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

/// Date column stored as `Date`, `Datetime`, or ISO text.
fn date_column(frame: &DataFrame, name: &str) -> PolarsResult<Vec<Option<NaiveDate>>> {
    let series = frame.column(name)?;
    if series.dtype() == &DataType::Utf8 {
        return Ok(series
            .utf8()?
            .into_iter()
            .map(|value| {
                value.and_then(|text| {
                    let day = text.get(..10).unwrap_or(text);
                    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
                })
            })
            .collect());
    }

    let days = series.cast(&DataType::Date)?.cast(&DataType::Int32)?;
    Ok(days
        .i32()?
        .into_iter()
        .map(|value| value.and_then(date_from_days))
        .collect())
}

pub(crate) fn dates_series(
    name: &str,
    dates: impl Iterator<Item = Option<NaiveDate>>,
) -> PolarsResult<Series> {
    let days: Vec<Option<i32>> = dates.map(|date| date.map(days_from_date)).collect();
    Series::new(name, days).cast(&DataType::Date)
}

fn decode_error(table: &str, row: usize, reason: impl Into<String>) -> SourceError {
    SourceError::Decode {
        table: table.to_string(),
        reason: format!("row {row}: {}", reason.into()),
    }
}

/// Decode a `wrds_contract_info` frame.
///
/// `futcode`, `contrcode` and `contrdate` must be non-null; `contrname` is
/// optional. Rows missing either date are skipped and logged, matching the
/// warehouse queries, which never return them.
pub fn contracts_from_frame(frame: &DataFrame) -> SourceResult<Vec<Contract>> {
    const TABLE: &str = "wrds_contract_info";

    let futcodes = i64_column(frame, "futcode")?;
    let contrcodes = i64_column(frame, "contrcode")?;
    let names = if has_column(frame, "contrname") {
        utf8_column(frame, "contrname")?
    } else {
        vec![None; frame.height()]
    };
    let deliveries = utf8_column(frame, "contrdate")?;
    let starts = date_column(frame, "startdate")?;
    let last_trades = date_column(frame, "lasttrddate")?;

    let mut contracts = Vec::with_capacity(frame.height());
    for row in 0..frame.height() {
        let futcode = futcodes[row].ok_or_else(|| decode_error(TABLE, row, "null futcode"))?;
        let contrcode =
            contrcodes[row].ok_or_else(|| decode_error(TABLE, row, "null contrcode"))?;
        let raw_delivery = deliveries[row]
            .as_deref()
            .ok_or_else(|| decode_error(TABLE, row, "null contrdate"))?;
        let delivery = DeliveryMonth::parse(raw_delivery)
            .map_err(|error| decode_error(TABLE, row, error.to_string()))?;
        let (Some(start_date), Some(last_trade_date)) = (starts[row], last_trades[row]) else {
            log_event(
                file!(),
                "Frame",
                "contracts_from_frame",
                "frame.decode",
                line!(),
                &format!(
                    "Skipping futcode {futcode} (row {row}): missing start or last trade date"
                ),
                None,
                Some(contrcode),
            );
            continue;
        };

        contracts.push(Contract {
            futcode,
            contrcode,
            contrname: names[row].clone(),
            delivery,
            start_date,
            last_trade_date,
        });
    }

    Ok(contracts)
}

/// Decode a `wrds_fut_contract` frame. Only `futcode` and `date_` are required.
pub fn prices_from_frame(frame: &DataFrame) -> SourceResult<Vec<PricePoint>> {
    const TABLE: &str = "wrds_fut_contract";

    let futcodes = i64_column(frame, "futcode")?;
    let dates = date_column(frame, "date_")?;
    let settlements = f64_column(frame, "settlement")?;
    let opens = f64_column(frame, "open_")?;
    let highs = f64_column(frame, "high")?;
    let lows = f64_column(frame, "low")?;
    let volumes = f64_column(frame, "volume")?;

    let mut prices = Vec::with_capacity(frame.height());
    for row in 0..frame.height() {
        let futcode = futcodes[row].ok_or_else(|| decode_error(TABLE, row, "null futcode"))?;
        let date = dates[row].ok_or_else(|| decode_error(TABLE, row, "null date_"))?;
        prices.push(PricePoint {
            futcode,
            date,
            settlement: settlements[row],
            open: opens[row],
            high: highs[row],
            low: lows[row],
            volume: volumes[row],
        });
    }

    Ok(prices)
}

pub fn contracts_to_frame(contracts: &[Contract]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Series::new(
            "futcode",
            contracts.iter().map(|c| c.futcode).collect::<Vec<_>>(),
        ),
        Series::new(
            "contrcode",
            contracts.iter().map(|c| c.contrcode).collect::<Vec<_>>(),
        ),
        Series::new(
            "contrname",
            contracts
                .iter()
                .map(|c| c.contrname.clone())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "contrdate",
            contracts
                .iter()
                .map(|c| c.delivery.as_str())
                .collect::<Vec<_>>(),
        ),
        dates_series("startdate", contracts.iter().map(|c| Some(c.start_date)))?,
        dates_series(
            "lasttrddate",
            contracts.iter().map(|c| Some(c.last_trade_date)),
        )?,
    ])
}

pub fn prices_to_frame(prices: &[PricePoint]) -> PolarsResult<DataFrame> {
    let floats = |f: fn(&PricePoint) -> Option<f64>| prices.iter().map(f).collect::<Vec<_>>();

    DataFrame::new(vec![
        Series::new(
            "futcode",
            prices.iter().map(|p| p.futcode).collect::<Vec<_>>(),
        ),
        dates_series("date_", prices.iter().map(|p| Some(p.date)))?,
        Series::new("settlement", floats(|p| p.settlement)),
        Series::new("open_", floats(|p| p.open)),
        Series::new("high", floats(|p| p.high)),
        Series::new("low", floats(|p| p.low)),
        Series::new("volume", floats(|p| p.volume)),
    ])
}
