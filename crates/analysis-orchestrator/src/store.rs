use analysis_core::{AnalysisError, HistoryStore, PriceBar};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS stock_prices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    date TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume INTEGER NOT NULL,
    UNIQUE(symbol, date)
)";

fn persistence(e: sqlx::Error) -> AnalysisError {
    AnalysisError::Persistence(e.to_string())
}

/// Append-only daily price history in SQLite, keyed by (symbol, date).
#[derive(Clone)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Open (creating if missing) the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, AnalysisError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(persistence)?
            .create_if_missing(true);

        // Every in-memory connection is its own database
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await
        }
        .map_err(persistence)?;

        Ok(Self { pool })
    }

    /// Stored bars for `ticker`, oldest first.
    pub async fn load(&self, ticker: &str) -> Result<Vec<PriceBar>, AnalysisError> {
        let rows: Vec<(NaiveDate, f64, f64, f64, f64, i64)> = sqlx::query_as(
            "SELECT date, open, high, low, close, volume FROM stock_prices WHERE symbol = ? ORDER BY date",
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?;

        Ok(rows
            .into_iter()
            .map(|(date, open, high, low, close, volume)| PriceBar {
                date,
                open,
                high,
                low,
                close,
                volume: volume as f64,
            })
            .collect())
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn init(&self) -> Result<(), AnalysisError> {
        sqlx::query(SCHEMA).execute(&self.pool).await.map_err(persistence)?;
        Ok(())
    }

    async fn append(&self, ticker: &str, bars: &[PriceBar]) -> Result<u64, AnalysisError> {
        let mut tx = self.pool.begin().await.map_err(persistence)?;
        let mut inserted = 0;

        for bar in bars {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO stock_prices (symbol, date, open, high, low, close, volume)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(ticker)
            .bind(bar.date)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume.round() as i64)
            .execute(&mut *tx)
            .await
            .map_err(persistence)?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(persistence)?;
        tracing::debug!("Stored {} new bars for {} ({} offered)", inserted, ticker, bars.len());
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1_500.0,
        }
    }

    async fn store() -> SqliteHistoryStore {
        let store = SqliteHistoryStore::connect("sqlite::memory:").await.unwrap();
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let store = store().await;
        assert!(store.init().await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_dates_are_ignored() {
        let store = store().await;
        let first = store.append("AAPL", &[bar(2, 10.0), bar(3, 11.0)]).await.unwrap();
        assert_eq!(first, 2);

        // Day 3 already stored: the new close must not overwrite it
        let second = store.append("AAPL", &[bar(3, 99.0), bar(4, 12.0)]).await.unwrap();
        assert_eq!(second, 1);

        let stored = store.load("AAPL").await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[1].close, 11.0);
        assert_eq!(stored[2], bar(4, 12.0));
    }

    #[tokio::test]
    async fn test_tickers_are_kept_apart() {
        let store = store().await;
        store.append("AAPL", &[bar(2, 10.0)]).await.unwrap();
        assert_eq!(store.append("MSFT", &[bar(2, 20.0)]).await.unwrap(), 1);
        assert_eq!(store.load("MSFT").await.unwrap()[0].close, 20.0);
        assert!(store.load("TSLA").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_before_init_is_persistence_error() {
        let store = SqliteHistoryStore::connect("sqlite::memory:").await.unwrap();
        let err = store.append("AAPL", &[bar(2, 10.0)]).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Persistence(_)));
    }
}
