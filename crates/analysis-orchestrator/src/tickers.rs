use analysis_core::AnalysisError;
use std::collections::BTreeMap;

/// Display symbols offered by default, with the provider ticker for each.
const DEFAULT_COMPANIES: &[(&str, &str)] = &[
    ("AAPL", "AAPL"),
    ("MSFT", "MSFT"),
    ("GOOGL", "GOOGL"),
    ("AMZN", "AMZN"),
    ("META", "META"),
    ("NVDA", "NVDA"),
    ("TSLA", "TSLA"),
    ("JPM", "JPM"),
    ("V", "V"),
    ("BRK.B", "BRK.B"),
    ("SPY", "SPY"),
    ("QQQ", "QQQ"),
];

/// Maps user-facing symbols onto provider tickers.
#[derive(Debug, Clone)]
pub struct TickerResolver {
    companies: BTreeMap<String, String>,
    default_suffix: Option<String>,
}

impl Default for TickerResolver {
    fn default() -> Self {
        Self::new(None)
    }
}

impl TickerResolver {
    pub fn new(default_suffix: Option<String>) -> Self {
        Self {
            companies: DEFAULT_COMPANIES
                .iter()
                .map(|(symbol, ticker)| (symbol.to_string(), ticker.to_string()))
                .collect(),
            default_suffix: default_suffix.filter(|s| !s.is_empty()),
        }
    }

    /// Replace the alias table.
    pub fn with_companies<I, S, T>(mut self, companies: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        self.companies = companies
            .into_iter()
            .map(|(s, t)| (s.into().to_ascii_uppercase(), t.into()))
            .collect();
        self
    }

    /// Provider ticker for `symbol`. Known symbols use the table; others get
    /// the default suffix unless they already carry an exchange suffix.
    pub fn resolve(&self, symbol: &str) -> Result<String, AnalysisError> {
        let symbol = symbol.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(AnalysisError::InvalidData("empty ticker symbol".to_string()));
        }

        if let Some(ticker) = self.companies.get(&symbol) {
            return Ok(ticker.clone());
        }
        Ok(match &self.default_suffix {
            Some(suffix) if !symbol.contains('.') => format!("{}{}", symbol, suffix),
            _ => symbol,
        })
    }

    pub fn list_companies(&self) -> Vec<String> {
        self.companies.keys().cloned().collect()
    }
}
