//! data-loader: warm the price history store and print per-symbol analytics.
//!
//! For each symbol, fetches the full daily history from Polygon, persists it to
//! the `stock_prices` table and prints the summary and next-bar forecast as JSON.
//!
//! Usage:
//!   cargo run -p data-loader -- --symbols AAPL MSFT GOOGL
//!   cargo run -p data-loader -- --all
//!   cargo run -p data-loader -- --symbols AAPL --range 6M
//!   cargo run -p data-loader -- --compare AAPL MSFT
//!   cargo run -p data-loader -- --intraday AAPL

use analysis_core::{HistoryStore, TimeRange};
use analysis_orchestrator::{AnalysisOrchestrator, EngineConfig, SqliteHistoryStore};
use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Max concurrent symbol refreshes
const DEFAULT_CONCURRENCY: usize = 4;

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn flag_list(args: &[String], flag: &str) -> Vec<String> {
    match args.iter().position(|a| a == flag) {
        Some(idx) => args[idx + 1..]
            .iter()
            .take_while(|a| !a.starts_with("--"))
            .cloned()
            .collect(),
        None => Vec::new(),
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  data-loader --symbols AAPL MSFT ...    Specific symbols");
    eprintln!("  data-loader --all                      All known companies");
    eprintln!("  data-loader --compare A B              Compare 30-day mean daily returns");
    eprintln!("  data-loader --intraday SYMBOL          Today's 1-minute closes");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db URL           History store (default: $DATABASE_URL or sqlite:stocks.db)");
    eprintln!("  --range R          Also print the chart slice for R (1W 1M 6M 1Y 5Y MAX)");
    eprintln!("  --concurrency N    Max parallel symbols (default: {})", DEFAULT_CONCURRENCY);
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "data_loader=info,analysis_orchestrator=info,polygon_client=warn".into())
    };
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let mut config = EngineConfig::from_env().context("Invalid configuration")?;
    if let Some(db) = flag_value(&args, "--db") {
        config.database_url = db.to_string();
    }
    let concurrency: usize = flag_value(&args, "--concurrency")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CONCURRENCY)
        .max(1);
    let range = flag_value(&args, "--range").map(TimeRange::parse_or_default);

    let store = SqliteHistoryStore::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open {}", config.database_url))?;
    store.init().await.context("Failed to create stock_prices table")?;

    let engine = AnalysisOrchestrator::with_polygon(&config)
        .context("POLYGON_API_KEY must be set")?
        .with_history_store(Arc::new(store));
    let engine = Arc::new(engine);

    let compare = flag_list(&args, "--compare");
    if compare.len() == 2 {
        let result = engine.compare(&compare[0], &compare[1]).await?;
        return print_json(&serde_json::to_value(result)?);
    }

    if let Some(symbol) = flag_value(&args, "--intraday") {
        let points = engine.get_intraday(symbol).await?;
        return print_json(&serde_json::to_value(points)?);
    }

    let symbols = if args.iter().any(|a| a == "--all") {
        engine.list_companies()
    } else {
        flag_list(&args, "--symbols")
    };
    if symbols.is_empty() {
        print_usage();
        std::process::exit(1);
    }

    tracing::info!(
        "data-loader: {} symbols, db={}, concurrency={}",
        symbols.len(),
        config.database_url,
        concurrency
    );

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();
    for symbol in symbols {
        let engine = engine.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let summary = engine.get_summary(&symbol).await;
            let forecast = engine.get_forecast(&symbol).await;
            let chart = match range {
                Some(r) => Some(engine.get_display_slice(&symbol, r).await),
                None => None,
            };
            (symbol, summary, forecast, chart)
        });
    }

    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let (symbol, summary, forecast, chart) = joined.context("symbol task panicked")?;
        let summary = match summary {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("{}: {}", symbol, e);
                failed += 1;
                continue;
            }
        };

        let mut report = json!({
            "symbol": symbol,
            "summary": summary,
            "forecast": forecast.ok(),
        });
        if let Some(Ok(points)) = chart {
            report["chart"] = serde_json::to_value(points)?;
        }
        print_json(&report)?;
    }

    // Give the detached history writes a moment to land before exiting
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;

    if failed > 0 {
        tracing::warn!("{} symbols could not be loaded", failed);
    }
    Ok(())
}
