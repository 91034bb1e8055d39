//! QuantLab CLI — run backtests and validate data directories.
//!
//! Commands:
//! - `run` — execute a backtest from a TOML run spec against a CSV data
//!   directory, print a summary, optionally write the report JSON
//! - `check-data` — load the calendar and price files and report coverage
//!   and data-quality anomalies

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quantlab_core::data::{CsvMarketStore, PriceTable};
use quantlab_core::domain::Symbol;
use quantlab_runner::{BacktestService, RunReport, RunSpec};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quantlab", about = "QuantLab CLI — backtest simulation engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML run spec.
    Run {
        /// Path to the TOML run spec.
        #[arg(long)]
        config: PathBuf,

        /// Data directory (calendar.csv, prices.csv, factors.csv).
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Write the full report JSON to this path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate a data directory: calendar coverage and price anomalies.
    CheckData {
        /// Data directory (calendar.csv, prices.csv).
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Symbols to check; defaults to every symbol in prices.csv.
        #[arg()]
        symbols: Vec<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            data_dir,
            output,
        } => run_cmd(&config, &data_dir, output.as_deref()),
        Commands::CheckData { data_dir, symbols } => check_data_cmd(&data_dir, &symbols),
    }
}

fn run_cmd(
    config_path: &std::path::Path,
    data_dir: &std::path::Path,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let spec = RunSpec::from_file(config_path)
        .with_context(|| format!("loading run spec {}", config_path.display()))?;
    let request = spec.to_request().context("resolving run spec")?;

    let store = CsvMarketStore::new(data_dir);
    let service = BacktestService::new(
        Box::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store),
    );

    let report = match service.execute(&request) {
        Ok(report) => report,
        Err(failure) => {
            eprintln!("Run failed during {}: {}", failure.stage, failure.error);
            if !failure.snapshots.is_empty() {
                eprintln!(
                    "{} snapshot(s) retained through {}",
                    failure.snapshots.len(),
                    failure.snapshots[failure.snapshots.len() - 1].date
                );
            }
            std::process::exit(1);
        }
    };

    print_summary(&report);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing report to {}", path.display()))?;
        println!("Report saved to: {}", path.display());
    }
    Ok(())
}

fn check_data_cmd(data_dir: &std::path::Path, symbols: &[String]) -> Result<()> {
    let store = CsvMarketStore::new(data_dir);

    let calendar =
        quantlab_core::calendar::TradingCalendar::new(Box::new(store.clone()));
    let snapshot = calendar
        .snapshot()
        .with_context(|| format!("loading calendar from {}", data_dir.display()))?;
    let (first, last) = snapshot.coverage();
    println!(
        "Calendar: {} to {} ({} trading days)",
        first,
        last,
        snapshot.open_day_count()
    );

    let universe: Vec<Symbol> = symbols
        .iter()
        .map(|s| Symbol::parse(s).map_err(anyhow::Error::from))
        .collect::<Result<Vec<_>>>()?;
    let universe = if universe.is_empty() {
        store.list_symbols().context("scanning prices.csv")?
    } else {
        universe
    };

    let table = PriceTable::load_batch(&store, &universe, first, last)
        .context("loading price batch")?;
    println!(
        "Prices:   {} symbols, {} bars",
        universe.len(),
        table.bar_count()
    );

    if table.anomalies().is_empty() {
        println!("No data-quality anomalies found.");
    } else {
        println!("{} anomalies:", table.anomalies().len());
        for anomaly in table.anomalies() {
            println!("  {} {} {:?}", anomaly.symbol, anomaly.date, anomaly.kind);
        }
        std::process::exit(2);
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    let metrics = &report.metrics;
    println!();
    println!("=== Backtest Report ===");
    println!("Run id:         {}", report.run_id.short());
    if let Some(name) = &report.name {
        println!("Name:           {name}");
    }
    println!("Trading days:   {}", metrics.trading_days);
    println!("Skipped days:   {}", report.run.issues.len());
    println!();
    println!("--- Performance ---");
    println!("Total return:   {:.2}%", metrics.total_return * 100.0);
    println!("Annualized:     {:.2}%", metrics.annualized_return * 100.0);
    println!(
        "Volatility:     {:.2}%",
        metrics.annualized_volatility * 100.0
    );
    println!("Sharpe:         {:.3}", metrics.sharpe);
    println!("Max drawdown:   {:.2}%", metrics.max_drawdown * 100.0);
    println!("Turnover:       {:.2}x", metrics.turnover);
    if let Some(equity) = report.run.final_equity() {
        println!("Final equity:   {equity:.2}");
    }
    for anomaly in &report.run.anomalies {
        println!(
            "WARNING: data anomaly {} {} {:?}",
            anomaly.symbol, anomaly.date, anomaly.kind
        );
    }
    for issue in &report.run.issues {
        println!("WARNING: {} skipped: {}", issue.date, issue.message);
    }
    println!();
}
