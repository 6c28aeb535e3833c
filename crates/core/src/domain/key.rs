use anyhow::ensure;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper-cased stock symbol, never empty and never a `.`/`..` path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let symbol = raw.trim().to_ascii_uppercase();
        ensure!(!symbol.is_empty(), "ticker must be non-empty");
        ensure!(
            !symbol.contains('/') && !symbol.chars().any(char::is_whitespace),
            "ticker must be a single path-safe symbol (got {symbol:?})"
        );
        ensure!(
            symbol != "." && symbol != "..",
            "ticker cannot be a relative path segment (got {symbol:?})"
        );
        ensure!(
            !symbol.chars().any(char::is_control),
            "ticker must not contain control characters"
        );
        Ok(Self(symbol))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Ticker {
    type Error = anyhow::Error;

    fn try_from(value: String) -> anyhow::Result<Self> {
        Self::parse(&value)
    }
}

impl From<Ticker> for String {
    fn from(value: Ticker) -> Self {
        value.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one dashboard view: a ticker as of a date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub ticker: Ticker,
    pub date: NaiveDate,
}

impl ResourceKey {
    pub fn new(ticker: Ticker, date: NaiveDate) -> Self {
        Self { ticker, date }
    }

    pub fn parse(ticker: &str, date: &str) -> anyhow::Result<Self> {
        let ticker = Ticker::parse(ticker)?;
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|e| anyhow::anyhow!("date must be YYYY-MM-DD (got {date:?}): {e}"))?;
        Ok(Self { ticker, date })
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.ticker, self.date)
    }
}
