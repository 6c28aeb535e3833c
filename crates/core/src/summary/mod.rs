pub mod anthropic;
pub mod error;

use crate::domain::key::Ticker;
use crate::domain::report::{Horizon, ScoreReport};
use crate::format::{format_feature_key, ScoreScale};

pub const SUMMARY_UNAVAILABLE: &str = "An automated summary is currently unavailable.";

const FACTORS_PER_SIDE: usize = 3;

/// What the summary model is told about one report.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryInput {
    pub ticker: Ticker,
    pub creditworthiness: f64,
    pub scale: ScoreScale,
    /// Features pushing default risk up, strongest first.
    pub increasing: Vec<String>,
    /// Features pushing default risk down, strongest first.
    pub decreasing: Vec<String>,
}

impl SummaryInput {
    /// Factors come from the 20-day explanation.
    pub fn from_report(ticker: Ticker, report: &ScoreReport, scale: ScoreScale) -> Self {
        let mut ranked: Vec<(&str, f64)> = report
            .explanation(Horizon::Mid)
            .map(|e| e.shap_values.iter().map(|(k, v)| (k, *v)).collect())
            .unwrap_or_default();
        ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));

        let pick = |keep: fn(f64) -> bool| -> Vec<String> {
            ranked
                .iter()
                .filter(|(_, v)| keep(*v))
                .take(FACTORS_PER_SIDE)
                .map(|(k, _)| format_feature_key(k))
                .collect()
        };

        Self {
            ticker,
            creditworthiness: report.creditworthiness,
            scale,
            increasing: pick(|v| v > 0.0),
            decreasing: pick(|v| v < 0.0),
        }
    }

    pub fn prompt(&self) -> String {
        let (_, max) = self.scale.range();
        format!(
            "Analyze the following financial data for the company with ticker symbol {ticker} to explain its credit score.\n\
The current creditworthiness score is {score:.2} (out of {max}, where higher is better).\n\n\
The primary factors INCREASING the credit risk (bad for the score) are: {increasing}.\n\
The primary factors DECREASING the credit risk (good for the score) are: {decreasing}.\n\n\
Based on this, generate a concise, two-line summary in plain language for a non-technical stakeholder, explaining why the credit score is what it is.",
            ticker = self.ticker,
            score = self.creditworthiness,
            increasing = join_or_none(&self.increasing),
            decreasing = join_or_none(&self.decreasing),
        )
    }
}

fn join_or_none(factors: &[String]) -> String {
    if factors.is_empty() {
        "None".to_string()
    } else {
        factors.join(", ")
    }
}

#[async_trait::async_trait]
pub trait SummaryClient: Send + Sync {
    async fn summarize(&self, input: &SummaryInput) -> anyhow::Result<String>;
}

/// The summary text, or the unavailable notice when generation fails.
pub async fn summary_or_unavailable(client: &dyn SummaryClient, input: &SummaryInput) -> String {
    match client.summarize(input).await {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(ticker = %input.ticker, error = %err, "summary generation failed");
            SUMMARY_UNAVAILABLE.to_string()
        }
    }
}
