//! Live access to the WRDS PostgreSQL warehouse.
//!
//! [`WrdsSession`] is a blocking facade: it owns a current-thread runtime and a
//! single connection, and every query is driven to completion before the call
//! returns. The connection is closed on [`WrdsSession::close`] or, failing
//! that, when the session is dropped.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow, PgSslMode};
use sqlx::query::Query;
use sqlx::{Connection, Postgres, Row};
use tokio::runtime::{Builder, Runtime};

use crate::catalog::{
    Contract, DateRange, DeliveryMonth, DeliveryOrder, PricePoint, ProductSummary, sort_contracts,
};
use crate::config::WrdsConfig;
use crate::logging::log_event;
use crate::source::{FuturesSource, SourceError, SourceResult};
use crate::term_structure::TermPoint;

/// Tables inspected by [`WrdsSession::survey`] when none are named.
///
/// * `wrds_cseries_info`: catalog of pre-rolled continuous series
/// * `wrds_contract_info`: one row per contract (the lookup table)
/// * `wrds_fut_contract`: daily OHLCV and settlement per contract
/// * `dsfutcalcserval`: daily values of the continuous series
pub const KEY_TABLES: &[&str] = &[
    "wrds_cseries_info",
    "wrds_contract_info",
    "wrds_fut_contract",
    "dsfutcalcserval",
];

/// SQL text for every query the session issues.
///
/// Only validated identifiers are spliced in; all values are bound.
pub mod sql {
    use crate::source::{SourceError, SourceResult};

    /// Accept `[A-Za-z_][A-Za-z0-9_]*` and nothing else.
    pub fn identifier(name: &str) -> SourceResult<&str> {
        let mut chars = name.chars();
        let valid_head = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            Ok(name)
        } else {
            Err(SourceError::Identifier(name.to_string()))
        }
    }

    /// Lower-cased `LIKE` pattern matching `keyword` anywhere, with the
    /// pattern metacharacters escaped.
    pub fn like_pattern(keyword: &str) -> String {
        let mut escaped = String::with_capacity(keyword.len() + 2);
        escaped.push('%');
        for c in keyword.to_lowercase().chars() {
            if matches!(c, '%' | '_' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped.push('%');
        escaped
    }

    const SUMMARY_COLUMNS: &str = "contrcode::bigint AS contrcode, contrname::text AS contrname, \
         COUNT(*)::bigint AS num_contracts, MIN(startdate)::date AS earliest_start, \
         MAX(lasttrddate)::date AS latest_trade";

    pub fn product_summaries(library: &str) -> String {
        format!(
            "SELECT {SUMMARY_COLUMNS} FROM {library}.wrds_contract_info \
             GROUP BY contrcode, contrname ORDER BY num_contracts DESC, contrcode"
        )
    }

    /// `$1`: lower-cased `LIKE` pattern.
    pub fn search_products(library: &str) -> String {
        format!(
            "SELECT {SUMMARY_COLUMNS} FROM {library}.wrds_contract_info \
             WHERE LOWER(contrname) LIKE $1 \
             GROUP BY contrcode, contrname ORDER BY num_contracts DESC, contrcode"
        )
    }

    const CONTRACT_COLUMNS: &str = "futcode::bigint AS futcode, contrcode::bigint AS contrcode, \
         contrname::text AS contrname, contrdate::text AS contrdate, \
         startdate::date AS startdate, lasttrddate::date AS lasttrddate";

    /// `$1`: product code.
    pub fn contracts(library: &str) -> String {
        format!(
            "SELECT {CONTRACT_COLUMNS} FROM {library}.wrds_contract_info \
             WHERE contrcode = $1 AND startdate IS NOT NULL AND lasttrddate IS NOT NULL \
             ORDER BY contrdate, futcode"
        )
    }

    /// `$1`: product code, `$2`/`$3`: range start/end.
    pub fn active_contracts(library: &str) -> String {
        format!(
            "SELECT {CONTRACT_COLUMNS} FROM {library}.wrds_contract_info \
             WHERE contrcode = $1 AND lasttrddate >= $2 AND startdate <= $3 \
             ORDER BY contrdate, futcode"
        )
    }

    /// `$1`: futcode array, `$2`/`$3`: range start/end.
    pub fn prices(library: &str) -> String {
        format!(
            "SELECT futcode::bigint AS futcode, date_::date AS date_, \
             settlement::float8 AS settlement, open_::float8 AS open_, high::float8 AS high, \
             low::float8 AS low, volume::float8 AS volume \
             FROM {library}.wrds_fut_contract \
             WHERE futcode = ANY($1::bigint[]) AND date_ BETWEEN $2 AND $3 \
             ORDER BY futcode, date_"
        )
    }

    /// `$1`: product code, `$2`: date.
    pub fn settlement_rows(library: &str) -> String {
        format!(
            "SELECT ci.futcode::bigint AS futcode, ci.contrdate::text AS contrdate, \
             ci.lasttrddate::date AS lasttrddate, fc.settlement::float8 AS settlement, \
             fc.volume::float8 AS volume \
             FROM {library}.wrds_contract_info ci \
             JOIN {library}.wrds_fut_contract fc ON ci.futcode = fc.futcode \
             WHERE ci.contrcode = $1 AND fc.date_ = $2 AND fc.settlement IS NOT NULL \
             ORDER BY ci.contrdate"
        )
    }

    /// `$1`: product code, `$2`: exclusive upper bound date.
    pub fn latest_settlement_date_before(library: &str) -> String {
        format!(
            "SELECT MAX(fc.date_)::date AS max_date \
             FROM {library}.wrds_contract_info ci \
             JOIN {library}.wrds_fut_contract fc ON ci.futcode = fc.futcode \
             WHERE ci.contrcode = $1 AND fc.date_ < $2 AND fc.settlement IS NOT NULL"
        )
    }

    pub fn latest_price_date(library: &str) -> String {
        format!("SELECT MAX(date_)::date AS max_date FROM {library}.wrds_fut_contract")
    }

    /// `$1`: schema name.
    pub const LIST_TABLES: &str = "SELECT table_name::text AS table_name \
         FROM information_schema.tables WHERE table_schema = $1 ORDER BY table_name";

    /// `$1`: schema name, `$2`: table name.
    pub const DESCRIBE_TABLE: &str = "SELECT column_name::text AS column_name, \
         data_type::text AS data_type, is_nullable::text AS is_nullable \
         FROM information_schema.columns \
         WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position";

    pub fn row_count(library: &str, table: &str) -> String {
        format!("SELECT COUNT(*)::bigint AS row_count FROM {library}.{table}")
    }

    /// `$1`: row limit.
    pub fn sample_rows(library: &str, table: &str) -> String {
        format!(
            "SELECT row_to_json(t)::text AS row \
             FROM (SELECT * FROM {library}.{table} LIMIT $1) t"
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Results of inspecting one table. Each part fails independently.
#[derive(Debug, Clone, Serialize)]
pub struct TableSurvey {
    pub table: String,
    pub columns: Result<Vec<ColumnInfo>, String>,
    pub row_count: Result<i64, String>,
    pub sample: Result<Vec<Value>, String>,
}

fn contract_from_row(row: &PgRow) -> SourceResult<Contract> {
    let raw_delivery: String = row.try_get("contrdate")?;
    Ok(Contract {
        futcode: row.try_get("futcode")?,
        contrcode: row.try_get("contrcode")?,
        contrname: row.try_get("contrname")?,
        delivery: DeliveryMonth::parse(&raw_delivery)?,
        start_date: row.try_get("startdate")?,
        last_trade_date: row.try_get("lasttrddate")?,
    })
}

fn price_from_row(row: &PgRow) -> SourceResult<PricePoint> {
    Ok(PricePoint {
        futcode: row.try_get("futcode")?,
        date: row.try_get("date_")?,
        settlement: row.try_get("settlement")?,
        open: row.try_get("open_")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        volume: row.try_get("volume")?,
    })
}

fn summary_from_row(row: &PgRow) -> SourceResult<ProductSummary> {
    let num_contracts: i64 = row.try_get("num_contracts")?;
    let name: Option<String> = row.try_get("contrname")?;
    Ok(ProductSummary {
        code: row.try_get("contrcode")?,
        name: name.unwrap_or_default(),
        num_contracts: usize::try_from(num_contracts).unwrap_or_default(),
        earliest_start: row.try_get("earliest_start")?,
        latest_trade: row.try_get("latest_trade")?,
    })
}

fn term_point_from_row(row: &PgRow) -> SourceResult<TermPoint> {
    let raw_delivery: String = row.try_get("contrdate")?;
    Ok(TermPoint {
        futcode: row.try_get("futcode")?,
        delivery: DeliveryMonth::parse(&raw_delivery)?,
        last_trade_date: row.try_get("lasttrddate")?,
        settlement: row.try_get("settlement")?,
        volume: row.try_get("volume")?,
    })
}

/// Combine a unit of work with the result of closing its session.
fn settle<T, E: From<SourceError>>(outcome: Result<T, E>, closed: SourceResult<()>) -> Result<T, E> {
    let value = outcome?;
    closed?;
    Ok(value)
}

/// One open connection to the WRDS warehouse.
pub struct WrdsSession {
    runtime: Runtime,
    conn: Option<PgConnection>,
    library: String,
}

impl WrdsSession {
    pub fn connect(config: &WrdsConfig) -> SourceResult<Self> {
        let library = sql::identifier(&config.library)?.to_string();
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(SourceError::Runtime)?;

        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .database(&config.database)
            .ssl_mode(PgSslMode::Require)
            .application_name("dsfut");
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        let conn = runtime
            .block_on(PgConnection::connect_with(&options))
            .map_err(|error| {
                log_event(
                    file!(),
                    "WrdsSession",
                    "connect",
                    "warehouse.connect",
                    line!(),
                    &format!("Failed to connect to {}:{}", config.host, config.port),
                    Some(&error.to_string()),
                    None,
                );
                SourceError::Warehouse(error)
            })?;

        log_event(
            file!(),
            "WrdsSession",
            "connect",
            "warehouse.connect",
            line!(),
            &format!(
                "Connected to {}:{} as {} (library {library})",
                config.host, config.port, config.username
            ),
            None,
            None,
        );

        Ok(Self {
            runtime,
            conn: Some(conn),
            library,
        })
    }

    /// Open a session, run `work`, and close the session whatever `work` returned.
    ///
    /// An error from `work` takes precedence over one from closing.
    pub fn scoped<T, E, F>(config: &WrdsConfig, work: F) -> Result<T, E>
    where
        E: From<SourceError>,
        F: FnOnce(&mut WrdsSession) -> Result<T, E>,
    {
        let mut session = Self::connect(config)?;
        let outcome = work(&mut session);
        settle(outcome, session.close())
    }

    /// Close the connection gracefully.
    pub fn close(mut self) -> SourceResult<()> {
        if let Some(conn) = self.conn.take() {
            self.runtime.block_on(conn.close())?;
            log_event(
                file!(),
                "WrdsSession",
                "close",
                "warehouse.close",
                line!(),
                "Connection closed",
                None,
                None,
            );
        }
        Ok(())
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    fn fetch_all(&mut self, query: Query<'_, Postgres, PgArguments>) -> SourceResult<Vec<PgRow>> {
        let conn = self.conn.as_mut().ok_or(SourceError::Closed)?;
        Ok(self.runtime.block_on(query.fetch_all(conn))?)
    }

    fn fetch_one(&mut self, query: Query<'_, Postgres, PgArguments>) -> SourceResult<PgRow> {
        let conn = self.conn.as_mut().ok_or(SourceError::Closed)?;
        Ok(self.runtime.block_on(query.fetch_one(conn))?)
    }

    /// Tables and views in `library`.
    pub fn list_tables(&mut self, library: &str) -> SourceResult<Vec<String>> {
        let rows = self.fetch_all(sqlx::query(sql::LIST_TABLES).bind(library.to_string()))?;
        rows.iter()
            .map(|row| Ok(row.try_get::<String, _>("table_name")?))
            .collect()
    }

    pub fn describe_table(&mut self, table: &str) -> SourceResult<Vec<ColumnInfo>> {
        let table = sql::identifier(table)?.to_string();
        let rows = self.fetch_all(
            sqlx::query(sql::DESCRIBE_TABLE)
                .bind(self.library.clone())
                .bind(table.clone()),
        )?;
        if rows.is_empty() {
            return Err(SourceError::Decode {
                table,
                reason: "table does not exist or has no columns".to_string(),
            });
        }
        rows.iter()
            .map(|row| {
                let nullable: String = row.try_get("is_nullable")?;
                Ok(ColumnInfo {
                    name: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                    nullable: nullable.eq_ignore_ascii_case("yes"),
                })
            })
            .collect()
    }

    pub fn row_count(&mut self, table: &str) -> SourceResult<i64> {
        let text = sql::row_count(&self.library, sql::identifier(table)?);
        let row = self.fetch_one(sqlx::query(&text))?;
        Ok(row.try_get("row_count")?)
    }

    /// First `limit` rows of a table, each as a JSON object.
    pub fn sample_rows(&mut self, table: &str, limit: i64) -> SourceResult<Vec<Value>> {
        let text = sql::sample_rows(&self.library, sql::identifier(table)?);
        let rows = self.fetch_all(sqlx::query(&text).bind(limit))?;
        rows.iter()
            .map(|row| {
                let raw: String = row.try_get("row")?;
                serde_json::from_str(&raw).map_err(|error| SourceError::Decode {
                    table: table.to_string(),
                    reason: error.to_string(),
                })
            })
            .collect()
    }

    /// Schema, row count and a sample for each table. A failing query is
    /// recorded in that table's report and the survey moves on.
    pub fn survey(&mut self, tables: &[&str], sample_size: i64) -> Vec<TableSurvey> {
        let mut reports = Vec::with_capacity(tables.len());
        for table in tables {
            let report = TableSurvey {
                table: table.to_string(),
                columns: self.describe_table(table).map_err(|e| self.note(table, e)),
                row_count: self.row_count(table).map_err(|e| self.note(table, e)),
                sample: self
                    .sample_rows(table, sample_size)
                    .map_err(|e| self.note(table, e)),
            };
            reports.push(report);
        }
        reports
    }

    fn note(&self, table: &str, error: SourceError) -> String {
        let message = error.to_string();
        log_event(
            file!(),
            "WrdsSession",
            "survey",
            "warehouse.explore",
            line!(),
            &format!("Query against {}.{table} failed", self.library),
            Some(&message),
            None,
        );
        message
    }
}

impl Drop for WrdsSession {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let error = self.runtime.block_on(conn.close()).err().map(|e| e.to_string());
            log_event(
                file!(),
                "WrdsSession",
                "drop",
                "warehouse.close",
                line!(),
                "Connection released on drop",
                error.as_deref(),
                None,
            );
        }
    }
}

impl FuturesSource for WrdsSession {
    fn product_summaries(&mut self) -> SourceResult<Vec<ProductSummary>> {
        let text = sql::product_summaries(&self.library);
        let rows = self.fetch_all(sqlx::query(&text))?;
        rows.iter().map(summary_from_row).collect()
    }

    fn search_products(&mut self, keyword: &str) -> SourceResult<Vec<ProductSummary>> {
        let text = sql::search_products(&self.library);
        let rows = self.fetch_all(sqlx::query(&text).bind(sql::like_pattern(keyword)))?;
        rows.iter().map(summary_from_row).collect()
    }

    fn contracts(&mut self, product: i64, order: DeliveryOrder) -> SourceResult<Vec<Contract>> {
        let text = sql::contracts(&self.library);
        let rows = self.fetch_all(sqlx::query(&text).bind(product))?;
        let mut contracts = rows
            .iter()
            .map(contract_from_row)
            .collect::<SourceResult<Vec<_>>>()?;
        sort_contracts(&mut contracts, order);
        Ok(contracts)
    }

    fn active_contracts(
        &mut self,
        product: i64,
        range: DateRange,
        order: DeliveryOrder,
    ) -> SourceResult<Vec<Contract>> {
        let text = sql::active_contracts(&self.library);
        let rows = self.fetch_all(
            sqlx::query(&text)
                .bind(product)
                .bind(range.start)
                .bind(range.end),
        )?;
        let mut contracts = rows
            .iter()
            .map(contract_from_row)
            .collect::<SourceResult<Vec<_>>>()?;
        sort_contracts(&mut contracts, order);

        log_event(
            file!(),
            "WrdsSession",
            "active_contracts",
            "warehouse.contracts",
            line!(),
            &format!("{} contracts overlap {range}", contracts.len()),
            None,
            Some(product),
        );
        Ok(contracts)
    }

    fn prices(&mut self, futcodes: &[i64], range: DateRange) -> SourceResult<Vec<PricePoint>> {
        if futcodes.is_empty() {
            return Ok(Vec::new());
        }
        let text = sql::prices(&self.library);
        let rows = self.fetch_all(
            sqlx::query(&text)
                .bind(futcodes.to_vec())
                .bind(range.start)
                .bind(range.end),
        )?;
        rows.iter().map(price_from_row).collect()
    }

    fn settlement_rows(&mut self, product: i64, date: NaiveDate) -> SourceResult<Vec<TermPoint>> {
        let text = sql::settlement_rows(&self.library);
        let rows = self.fetch_all(sqlx::query(&text).bind(product).bind(date))?;
        rows.iter().map(term_point_from_row).collect()
    }

    fn latest_settlement_date_before(
        &mut self,
        product: i64,
        date: NaiveDate,
    ) -> SourceResult<Option<NaiveDate>> {
        let text = sql::latest_settlement_date_before(&self.library);
        let row = self.fetch_one(sqlx::query(&text).bind(product).bind(date))?;
        Ok(row.try_get("max_date")?)
    }

    fn latest_price_date(&mut self) -> SourceResult<Option<NaiveDate>> {
        let text = sql::latest_price_date(&self.library);
        let row = self.fetch_one(sqlx::query(&text))?;
        Ok(row.try_get("max_date")?)
    }
}
