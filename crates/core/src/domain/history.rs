use crate::domain::key::Ticker;
use anyhow::Context;
use chrono::NaiveDate;
use serde_json::Value;

/// Which field of a history row carries the score. The backend has shipped both;
/// a deployment picks one rather than guessing per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistorySchema {
    #[default]
    Creditworthiness,
    Score,
}

impl HistorySchema {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "creditworthiness" => Ok(Self::Creditworthiness),
            "score" => Ok(Self::Score),
            other => anyhow::bail!(
                "unknown history schema {other:?} (expected creditworthiness or score)"
            ),
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            Self::Creditworthiness => "creditworthiness",
            Self::Score => "score",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub score: f64,
}

/// Score history for one ticker, oldest first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreHistory {
    pub ticker: Option<Ticker>,
    pub points: Vec<HistoryPoint>,
}

impl ScoreHistory {
    pub fn empty(ticker: Ticker) -> Self {
        Self {
            ticker: Some(ticker),
            points: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Parses the `GET /scores/{ticker}` body. Rows arrive newest first and are
    /// reversed for charting.
    pub fn from_backend_rows(
        ticker: Ticker,
        body: &Value,
        schema: HistorySchema,
    ) -> anyhow::Result<Self> {
        let rows = body
            .as_array()
            .context("history body must be a JSON array")?;

        let field = schema.field();
        let mut points = Vec::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            let date = row
                .get("date")
                .and_then(Value::as_str)
                .with_context(|| format!("history row {idx}: missing date"))?;
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("history row {idx}: invalid date {date:?}"))?;
            let score = row
                .get(field)
                .and_then(Value::as_f64)
                .with_context(|| format!("history row {idx}: missing numeric {field}"))?;
            points.push(HistoryPoint { date, score });
        }
        points.reverse();

        Ok(Self {
            ticker: Some(ticker),
            points,
        })
    }
}
