//! # Survey the library (live only)
//! dsfut explore
//!
//! # Search the product catalog
//! dsfut search "crude oil" gold treasury
//!
//! # Gold and 10Y T-Note curves on a given day, from a local dump
//! dsfut --dump _data/dump term 2020 458 --date 2024-07-03
//!
//! # Pull the commodity and Treasury universes for 2024
//! dsfut pull --start 2024-01-01 --end 2024-12-31

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use dsfut::catalog::{
    ContractRanges, DeliveryOrder, LifecycleStats, ProductSummary, delivery_pattern,
    distinct_products,
};
use dsfut::config::{ConfigError, WrdsConfig};
use dsfut::export::{contract_prices_frame, summary_frame, term_structure_frame, write_frame};
use dsfut::prices::PriceQuality;
use dsfut::resolver::futcodes;
use dsfut::term_structure::snapshot;
use dsfut::universe::{self, UniverseSummary, pull_universe};
use dsfut::warehouse::{KEY_TABLES, WrdsSession};
use dsfut::{Contract, DateRange, FuturesSource, LocalDump, Product, Result, logging};

#[derive(Parser)]
#[command(name = "dsfut")]
#[command(about = "WRDS Datastream futures: contracts, prices and term structures")]
#[command(version)]
struct Cli {
    /// Read from a local dump directory instead of the live warehouse
    #[arg(long, global = true)]
    dump: Option<PathBuf>,

    /// Env file to load instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Delivery month ordering: chronological or literal
    #[arg(long, global = true)]
    order: Option<DeliveryOrder>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tables, schemas, row counts and sample rows
    Explore {
        /// Tables to inspect; defaults to the four key tables
        tables: Vec<String>,

        /// Sample rows per table
        #[arg(long, default_value_t = 5)]
        sample: i64,

        /// Skip the sample rows
        #[arg(long)]
        no_sample: bool,
    },

    /// Every product, alphabetically and by contract count
    Browse,

    /// Case-insensitive product name search
    Search {
        #[arg(required = true)]
        keywords: Vec<String>,
    },

    /// Contract metadata for products
    Contracts {
        #[arg(required = true)]
        codes: Vec<i64>,
    },

    /// Daily prices for one product's contracts
    Prices {
        code: i64,

        #[arg(long, default_value = "2024-01-01")]
        start: NaiveDate,

        #[arg(long, default_value = "2024-12-31")]
        end: NaiveDate,

        /// Write the rows to this .parquet or .csv file
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Term structure snapshots for products
    Term {
        #[arg(required = true)]
        codes: Vec<i64>,

        /// Reference date; defaults to the latest date in the price table
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Directory for one Parquet file per curve
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Pull the commodity and Treasury universes
    Pull {
        #[arg(long, default_value = "2024-01-01")]
        start: NaiveDate,

        #[arg(long, default_value = "2024-12-31")]
        end: NaiveDate,

        /// Output directory; defaults to DATA_DIR
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn load_config(cli: &Cli) -> Result<WrdsConfig> {
    let loaded = match &cli.env_file {
        Some(path) => WrdsConfig::from_env_file(path),
        None => WrdsConfig::from_env(),
    };
    let mut config = match loaded {
        Ok(config) => config,
        // A dump needs no credentials.
        Err(ConfigError::Missing(_)) if cli.dump.is_some() => WrdsConfig::new(String::new()),
        Err(error) => return Err(error.into()),
    };
    if let Some(order) = cli.order {
        config.delivery_order = order;
    }
    Ok(config)
}

fn banner(title: &str) {
    println!("{}", "=".repeat(60));
    println!("{title}");
    println!("{}", "=".repeat(60));
}

fn print_summaries(rows: &[ProductSummary]) {
    println!(
        "  {:<55} {:>6} {:>10} {:>12} {:>12}",
        "Product", "Code", "Contracts", "From", "To"
    );
    println!("  {}", "-".repeat(100));
    for row in rows {
        let day = |d: Option<NaiveDate>| d.map_or_else(|| "N/A".to_string(), |d| d.to_string());
        println!(
            "  {:<55} {:>6} {:>10} {:>12} {:>12}",
            row.name,
            row.code,
            row.num_contracts,
            day(row.earliest_start),
            day(row.latest_trade)
        );
    }
}

fn browse(source: &mut dyn FuturesSource) -> Result<()> {
    let summaries = source.product_summaries()?;

    banner("All Futures Products (alphabetical by name)");
    let mut products: Vec<Product> = summaries
        .iter()
        .map(|summary| Product {
            code: summary.code,
            name: summary.name.clone(),
        })
        .collect();
    products.sort_by(|a, b| a.name.cmp(&b.name).then(a.code.cmp(&b.code)));
    for product in &products {
        println!("  contrcode={:>6}  {}", product.code, product.name);
    }
    println!("\n  Total distinct products: {}\n", products.len());

    banner("Products by Number of Contracts (most contracts first)");
    print_summaries(&summaries);
    println!("\n  Total products: {}", summaries.len());
    Ok(())
}

fn search(source: &mut dyn FuturesSource, keywords: &[String]) -> Result<()> {
    for keyword in keywords {
        let results = source.search_products(keyword)?;
        println!("\n  Search: '{keyword}'");
        if results.is_empty() {
            println!("    No matches found.");
            continue;
        }
        print_summaries(&results);
        println!("  ({} matches)", results.len());
    }
    Ok(())
}

fn contracts(source: &mut dyn FuturesSource, codes: &[i64], order: DeliveryOrder) -> Result<()> {
    for &code in codes {
        let contracts = source.contracts(code, order)?;
        banner(&format!("contrcode={code}"));
        if contracts.is_empty() {
            println!("  No contracts found for contrcode={code}\n");
            continue;
        }

        if let Some(product) = distinct_products(&contracts).first() {
            println!("  Contract name: {}", product.name);
        }
        println!("  Total contracts: {}", contracts.len());
        if let Some(ranges) = ContractRanges::measure(&contracts, order) {
            println!(
                "  Delivery date range: {} to {}",
                ranges.first_delivery, ranges.last_delivery
            );
            println!(
                "  Data start range:    {} to {}",
                ranges.first_start, ranges.last_start
            );
            println!(
                "  Last trade range:    {} to {}",
                ranges.first_last_trade, ranges.last_last_trade
            );
        }

        let pattern = delivery_pattern(&contracts);
        let sample: Vec<&str> = pattern.iter().take(12).map(|d| d.as_str()).collect();
        println!("  Delivery months (first 12 unique): {}", sample.join(", "));
        println!("  Unique delivery months: {}", pattern.len());
        let show = |label: &str, rows: &[Contract]| {
            println!("  {label}:");
            for c in rows {
                println!(
                    "    futcode={:>8}  delivery={}  start={}  last_trade={}",
                    c.futcode, c.delivery, c.start_date, c.last_trade_date
                );
            }
        };
        let head = contracts.len().min(5);
        show("First 5 contracts", &contracts[..head]);
        show("Last 5 contracts", &contracts[contracts.len() - head..]);

        if let Some(stats) = LifecycleStats::measure(&contracts) {
            println!("  Contract lifecycle (start to last trade):");
            println!("    Min:    {} days", stats.min);
            println!("    Median: {:.0} days", stats.median);
            println!("    Max:    {} days", stats.max);
            println!("    Mean:   {:.0} days", stats.mean);
        }
        println!();
    }
    Ok(())
}

fn prices(
    source: &mut dyn FuturesSource,
    code: i64,
    range: DateRange,
    order: DeliveryOrder,
    out: Option<&Path>,
) -> Result<()> {
    banner(&format!("contrcode={code}  {range}"));
    let contracts = source.active_contracts(code, range, order)?;
    if contracts.is_empty() {
        println!("  NO DATA: no contracts overlap {range}");
        return Ok(());
    }
    println!("  Contracts overlapping range: {}", contracts.len());

    let rows = source.prices(&futcodes(&contracts), range)?;
    let quality = PriceQuality::measure(&rows);
    println!("  Price records fetched: {}", quality.records);
    println!("  Unique contracts with data: {}", quality.unique_contracts);
    println!(
        "  Settlement nulls: {} / {}",
        quality.settlement_nulls, quality.records
    );
    println!("  Volume nulls:     {} / {}", quality.volume_nulls, quality.records);
    if let (Some(min), Some(max), Some(mean)) = (
        quality.settlement_min,
        quality.settlement_max,
        quality.settlement_mean,
    ) {
        println!("  Settlement range: {min:.4} to {max:.4} (mean {mean:.4})");
    }

    if let Some(path) = out {
        let mut frame = dsfut::frame::prices_to_frame(&rows)?;
        write_frame(&mut frame, path)?;
    }
    Ok(())
}

fn term(
    source: &mut dyn FuturesSource,
    codes: &[i64],
    date: Option<NaiveDate>,
    order: DeliveryOrder,
    out: Option<&Path>,
) -> Result<()> {
    let reference = match date {
        Some(date) => date,
        None => source
            .latest_price_date()?
            .context("price table is empty; pass --date")?,
    };

    for &code in codes {
        banner(&format!("Term Structure: contrcode={code}  reference={reference}"));
        let Some(curve) = snapshot(source, code, reference, order)? else {
            println!("  No term structure data available.\n");
            continue;
        };
        if curve.is_fallback() {
            println!("  No data on {reference}. Using {}", curve.as_of);
        }
        println!("\n  Active contracts: {}\n", curve.points.len());
        print!("{curve}");

        if let Some(spread) = curve.spread() {
            println!("\n  Front month:  {:.4}", spread.front);
            println!("  Back month:   {:.4}", spread.back);
            let pct = spread
                .pct_change
                .map_or_else(|| "n/a".to_string(), |p| format!("{p:+.2}%"));
            println!("  Spread:       {:+.4} ({pct})", spread.change);
            if let Some(class) = universe::asset_class(code) {
                println!("  Structure:    {}", spread.shape(class));
            }
        }
        println!();

        if let Some(dir) = out {
            let mut frame = term_structure_frame(&curve)?;
            write_frame(&mut frame, dir.join(format!("term_{code}_{}.parquet", curve.as_of)))?;
        }
    }
    Ok(())
}

fn pull(
    source: &mut dyn FuturesSource,
    range: DateRange,
    order: DeliveryOrder,
    out: &Path,
) -> Result<()> {
    for (label, products, stem) in [
        ("Commodity", universe::COMMODITIES, "commodities"),
        ("Treasury", universe::TREASURIES, "treasuries"),
    ] {
        banner(&format!(
            "Pulling {} {label} Futures ({range})",
            products.len()
        ));
        let pulled = pull_universe(source, products, range, order)?;
        for missing in &pulled.missing {
            println!("  {missing:<20} NO DATA");
        }
        if pulled.rows.is_empty() {
            println!("  WARNING: No {label} data retrieved.\n");
            continue;
        }

        let summary = UniverseSummary::from_rows(&pulled.rows);
        println!("  Records:     {}", summary.records);
        if let (Some(first), Some(last)) = (summary.first_date, summary.last_date) {
            println!("  Date range:  {first} to {last}");
        }
        println!("  Products:    {}", summary.products);
        println!("  Contracts:   {}", summary.contracts);
        println!(
            "  Settlement nulls:  {} / {}",
            summary.settlement_nulls, summary.records
        );
        println!(
            "\n  {:<20} {:>8} {:>10} {:>12} {:>12}",
            "Product", "Records", "Contracts", "Min Price", "Max Price"
        );
        println!("  {}", "-".repeat(66));
        for row in &summary.breakdown {
            let price = |p: Option<f64>| p.map_or_else(|| "N/A".to_string(), |p| format!("{p:.2}"));
            println!(
                "  {:<20} {:>8} {:>10} {:>12} {:>12}",
                row.product,
                row.records,
                row.contracts,
                price(row.settlement_min),
                price(row.settlement_max)
            );
        }
        println!();

        let mut rows = contract_prices_frame(&pulled.rows)?;
        write_frame(&mut rows, out.join(format!("{stem}.parquet")))?;
        let mut stats = summary_frame(&summary)?;
        write_frame(&mut stats, out.join(format!("{stem}_summary.csv")))?;
    }
    Ok(())
}

fn explore(session: &mut WrdsSession, tables: &[String], sample: Option<i64>) -> Result<()> {
    let library = session.library().to_string();
    banner(&format!("Tables in '{library}'"));
    let all = session.list_tables(&library)?;
    for table in &all {
        println!("  {table}");
    }
    println!("\n  Total: {} tables\n", all.len());

    let names: Vec<&str> = if tables.is_empty() {
        KEY_TABLES.to_vec()
    } else {
        tables.iter().map(String::as_str).collect()
    };
    for report in session.survey(&names, sample.unwrap_or(0)) {
        banner(&format!("{library}.{}", report.table));
        match &report.columns {
            Ok(columns) => {
                for column in columns {
                    let null = if column.nullable { "NULL" } else { "NOT NULL" };
                    println!("  {:<24} {:<28} {null}", column.name, column.data_type);
                }
            }
            Err(error) => println!("  ERROR: {error}"),
        }
        match &report.row_count {
            Ok(count) => println!("  Rows: {count}"),
            Err(error) => println!("  Rows: ERROR: {error}"),
        }
        if sample.is_some() {
            match &report.sample {
                Ok(rows) => {
                    for row in rows {
                        println!("  {row}");
                    }
                }
                Err(error) => println!("  Sample: ERROR: {error}"),
            }
        }
        println!();
    }
    Ok(())
}

fn run(source: &mut dyn FuturesSource, command: &Commands, config: &WrdsConfig) -> Result<()> {
    let order = config.delivery_order;
    match command {
        Commands::Explore { .. } => bail!("explore needs a live warehouse session"),
        Commands::Browse => browse(source),
        Commands::Search { keywords } => search(source, keywords),
        Commands::Contracts { codes } => contracts(source, codes, order),
        Commands::Prices {
            code,
            start,
            end,
            out,
        } => prices(source, *code, DateRange::new(*start, *end)?, order, out.as_deref()),
        Commands::Term { codes, date, out } => term(source, codes, *date, order, out.as_deref()),
        Commands::Pull { start, end, out } => {
            let out = out.clone().unwrap_or_else(|| config.output_dir.clone());
            pull(source, DateRange::new(*start, *end)?, order, &out)
        }
    }
}

fn main() -> Result<()> {
    logging::init_logging()?;
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if let Some(dir) = &cli.dump {
        let mut dump = LocalDump::from_dir(dir)
            .with_context(|| format!("loading dump from {}", dir.display()))?;
        return run(&mut dump, &cli.command, &config);
    }

    WrdsSession::scoped(&config, |session| match &cli.command {
        Commands::Explore {
            tables,
            sample,
            no_sample,
        } => explore(session, tables, (!no_sample).then_some(*sample)),
        command => run(session, command, &config),
    })
}
