use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;

use crate::catalog::{
    Contract, DateRange, DeliveryOrder, PricePoint, ProductSummary, search_products,
    summarize_products,
};
use crate::frame::{contracts_from_frame, contracts_to_frame, prices_from_frame, prices_to_frame};
use crate::logging::log_event;
use crate::prices::filter_prices;
use crate::resolver::{contracts_for_product, resolve_contracts};
use crate::source::{FuturesSource, SourceError, SourceResult};
use crate::term_structure::{self, TermPoint};

/// File stem of the contract table inside a dump directory.
pub const CONTRACTS_STEM: &str = "wrds_contract_info";
/// File stem of the price table inside a dump directory.
pub const PRICES_STEM: &str = "wrds_fut_contract";

/// Contract and price tables held in memory.
///
/// Every query is answered by the pure functions in `resolver`, `prices` and
/// `term_structure`, so a dump behaves exactly like the warehouse would on the
/// same rows.
#[derive(Debug, Clone, Default)]
pub struct LocalDump {
    contracts: Vec<Contract>,
    prices: Vec<PricePoint>,
}

fn read_table(path: &Path) -> SourceResult<DataFrame> {
    if !path.exists() {
        return Err(SourceError::MissingFile(path.to_path_buf()));
    }

    let is_parquet = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));

    let lazy = if is_parquet {
        LazyFrame::scan_parquet(path, ScanArgsParquet::default())
    } else {
        LazyCsvReader::new(path)
            .has_header(true)
            .with_try_parse_dates(true)
            .with_infer_schema_length(Some(2048))
            .finish()
    };

    let frame = lazy.and_then(LazyFrame::collect).map_err(|source| {
        log_event(
            file!(),
            "LocalDump",
            "read_table",
            "dump.load",
            line!(),
            &format!("Failed to load {}", path.display()),
            Some(&source.to_string()),
            None,
        );
        SourceError::Dump(source)
    })?;

    log_event(
        file!(),
        "LocalDump",
        "read_table",
        "dump.load",
        line!(),
        &format!("Loaded {} rows from {}", frame.height(), path.display()),
        None,
        None,
    );
    Ok(frame)
}

/// `<dir>/<stem>.parquet` if present, else `<dir>/<stem>.csv`.
fn locate(dir: &Path, stem: &str) -> PathBuf {
    let parquet = dir.join(format!("{stem}.parquet"));
    if parquet.exists() {
        parquet
    } else {
        dir.join(format!("{stem}.csv"))
    }
}

impl LocalDump {
    pub fn new(contracts: Vec<Contract>, prices: Vec<PricePoint>) -> Self {
        Self { contracts, prices }
    }

    /// Load both tables from explicit CSV or Parquet files.
    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(
        contracts_path: P,
        prices_path: Q,
    ) -> SourceResult<Self> {
        let contracts = contracts_from_frame(&read_table(contracts_path.as_ref())?)?;
        let prices = prices_from_frame(&read_table(prices_path.as_ref())?)?;
        Ok(Self::new(contracts, prices))
    }

    /// Load `wrds_contract_info` and `wrds_fut_contract` from a directory,
    /// preferring Parquet over CSV.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> SourceResult<Self> {
        let dir = dir.as_ref();
        Self::from_files(locate(dir, CONTRACTS_STEM), locate(dir, PRICES_STEM))
    }

    /// Write both tables as Parquet into `dir`, replacing earlier files.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> SourceResult<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut contracts = contracts_to_frame(&self.contracts)?;
        let mut prices = prices_to_frame(&self.prices)?;
        for (stem, frame) in [(CONTRACTS_STEM, &mut contracts), (PRICES_STEM, &mut prices)] {
            let path = dir.join(format!("{stem}.parquet"));
            let file = File::create(&path)?;
            ParquetWriter::new(file).finish(frame)?;
        }
        Ok(())
    }

    pub fn contract_rows(&self) -> &[Contract] {
        &self.contracts
    }

    pub fn price_rows(&self) -> &[PricePoint] {
        &self.prices
    }
}

impl FuturesSource for LocalDump {
    fn product_summaries(&mut self) -> SourceResult<Vec<ProductSummary>> {
        Ok(summarize_products(&self.contracts))
    }

    fn search_products(&mut self, keyword: &str) -> SourceResult<Vec<ProductSummary>> {
        Ok(search_products(&summarize_products(&self.contracts), keyword))
    }

    fn contracts(&mut self, product: i64, order: DeliveryOrder) -> SourceResult<Vec<Contract>> {
        Ok(contracts_for_product(&self.contracts, product, order))
    }

    fn active_contracts(
        &mut self,
        product: i64,
        range: DateRange,
        order: DeliveryOrder,
    ) -> SourceResult<Vec<Contract>> {
        Ok(resolve_contracts(&self.contracts, product, range, order))
    }

    fn prices(&mut self, futcodes: &[i64], range: DateRange) -> SourceResult<Vec<PricePoint>> {
        Ok(filter_prices(&self.prices, futcodes, range))
    }

    fn settlement_rows(&mut self, product: i64, date: NaiveDate) -> SourceResult<Vec<TermPoint>> {
        Ok(term_structure::settlement_rows(
            &self.contracts,
            &self.prices,
            product,
            date,
        ))
    }

    fn latest_settlement_date_before(
        &mut self,
        product: i64,
        date: NaiveDate,
    ) -> SourceResult<Option<NaiveDate>> {
        Ok(term_structure::latest_settlement_date_before(
            &self.contracts,
            &self.prices,
            product,
            date,
        ))
    }

    fn latest_price_date(&mut self) -> SourceResult<Option<NaiveDate>> {
        Ok(self.prices.iter().map(|point| point.date).max())
    }
}
