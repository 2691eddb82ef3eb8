use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Freshness window and optional size bound for the series cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    pub ttl: Duration,
    /// 0 disables the bound.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            max_entries: 0,
        }
    }
}

/// Fixed-delay retry policy for provider fetches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Overall deadline for one fetch cycle, retries included.
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
            timeout: Some(Duration::from_secs(10)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub polygon_api_key: Option<String>,
    pub polygon_rate_limit: usize,
    pub cache: CacheConfig,
    pub retry: RetryPolicy,
    /// Calendar days of daily history requested from the provider.
    pub history_days: i64,
    pub database_url: String,
    pub default_ticker_suffix: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            polygon_api_key: None,
            polygon_rate_limit: 500,
            cache: CacheConfig::default(),
            retry: RetryPolicy::default(),
            history_days: 3650,
            database_url: "sqlite:stocks.db".to_string(),
            default_ticker_suffix: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        // 0 disables the deadline
        let timeout_secs: u64 = env_or(
            "FETCH_TIMEOUT_SECS",
            defaults.retry.timeout.map_or(0, |t| t.as_secs()),
        )?;
        let config = Self {
            polygon_api_key: env::var("POLYGON_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            polygon_rate_limit: env_or("POLYGON_RATE_LIMIT", defaults.polygon_rate_limit)?,
            cache: CacheConfig {
                ttl: Duration::from_secs(env_or("CACHE_TTL_SECS", defaults.cache.ttl.as_secs())?),
                max_entries: env_or("CACHE_MAX_ENTRIES", defaults.cache.max_entries)?,
            },
            retry: RetryPolicy {
                max_attempts: env_or("FETCH_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
                delay: Duration::from_millis(env_or(
                    "FETCH_RETRY_DELAY_MS",
                    defaults.retry.delay.as_millis() as u64,
                )?),
                timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            },
            history_days: env_or("HISTORY_DAYS", defaults.history_days)?,
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            default_ticker_suffix: env::var("DEFAULT_TICKER_SUFFIX")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            anyhow::bail!("FETCH_MAX_ATTEMPTS must be at least 1");
        }
        if self.history_days <= 0 {
            anyhow::bail!("HISTORY_DAYS must be positive");
        }
        if self.polygon_rate_limit == 0 {
            anyhow::bail!("POLYGON_RATE_LIMIT must be at least 1");
        }
        Ok(())
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", name, raw)),
        _ => Ok(default),
    }
}
