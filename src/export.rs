use std::fs::{self, File};
use std::path::Path;

use polars::prelude::*;
use thiserror::Error;

use crate::frame::dates_series;
use crate::logging::log_event;
use crate::term_structure::TermStructure;
use crate::universe::{ContractPrice, UniverseSummary};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to build frame: {0}")]
    Frame(#[from] PolarsError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

pub type ExportResult<T> = Result<T, ExportError>;

/// On-disk format, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Parquet,
    Csv,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::Parquet,
        }
    }
}

fn create(path: &Path) -> ExportResult<File> {
    let io_error = |source: std::io::Error| ExportError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    File::create(path).map_err(io_error)
}

/// Write `frame` to `path`, replacing any existing file.
pub fn write_frame<P: AsRef<Path>>(frame: &mut DataFrame, path: P) -> ExportResult<()> {
    let path = path.as_ref();
    let mut file = create(path)?;
    match FileFormat::from_path(path) {
        FileFormat::Parquet => {
            ParquetWriter::new(file).finish(frame)?;
        }
        FileFormat::Csv => {
            CsvWriter::new(&mut file).has_header(true).finish(frame)?;
        }
    }

    log_event(
        file!(),
        "Export",
        "write_frame",
        "export.write",
        line!(),
        &format!("Wrote {} rows to {}", frame.height(), path.display()),
        None,
        None,
    );
    Ok(())
}

pub fn contract_prices_frame(rows: &[ContractPrice]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Series::new(
            "product",
            rows.iter().map(|r| r.product.as_str()).collect::<Vec<_>>(),
        ),
        Series::new(
            "contrcode",
            rows.iter().map(|r| r.contrcode).collect::<Vec<_>>(),
        ),
        Series::new("futcode", rows.iter().map(|r| r.futcode).collect::<Vec<_>>()),
        Series::new(
            "contrdate",
            rows.iter()
                .map(|r| r.delivery.as_ref().map(|d| d.as_str()))
                .collect::<Vec<_>>(),
        ),
        dates_series("date_", rows.iter().map(|r| Some(r.date)))?,
        Series::new(
            "settlement",
            rows.iter().map(|r| r.settlement).collect::<Vec<_>>(),
        ),
    ])
}

pub fn term_structure_frame(term: &TermStructure) -> PolarsResult<DataFrame> {
    let points = &term.points;
    DataFrame::new(vec![
        Series::new("contrcode", vec![term.product; points.len()]),
        dates_series("date_", points.iter().map(|_| Some(term.as_of)))?,
        Series::new(
            "contrdate",
            points
                .iter()
                .map(|p| p.delivery.as_str())
                .collect::<Vec<_>>(),
        ),
        Series::new("futcode", points.iter().map(|p| p.futcode).collect::<Vec<_>>()),
        Series::new(
            "settlement",
            points.iter().map(|p| p.settlement).collect::<Vec<_>>(),
        ),
        Series::new("volume", points.iter().map(|p| p.volume).collect::<Vec<_>>()),
        dates_series("lasttrddate", points.iter().map(|p| Some(p.last_trade_date)))?,
    ])
}

/// Per-product breakdown of a universe pull.
pub fn summary_frame(summary: &UniverseSummary) -> PolarsResult<DataFrame> {
    let rows = &summary.breakdown;
    DataFrame::new(vec![
        Series::new(
            "product",
            rows.iter().map(|r| r.product.as_str()).collect::<Vec<_>>(),
        ),
        Series::new(
            "records",
            rows.iter().map(|r| r.records as u64).collect::<Vec<_>>(),
        ),
        Series::new(
            "contracts",
            rows.iter().map(|r| r.contracts as u64).collect::<Vec<_>>(),
        ),
        Series::new(
            "settlement_min",
            rows.iter().map(|r| r.settlement_min).collect::<Vec<_>>(),
        ),
        Series::new(
            "settlement_max",
            rows.iter().map(|r| r.settlement_max).collect::<Vec<_>>(),
        ),
    ])
}
