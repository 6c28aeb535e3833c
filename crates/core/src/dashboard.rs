use crate::client::{DegradingHistoryFetcher, ScoreApiClient};
use crate::domain::history::ScoreHistory;
use crate::domain::key::{ResourceKey, Ticker};
use crate::domain::report::{Horizon, ScoreReport};
use crate::error::InvalidInputError;
use crate::format::{
    self, RiskLevel, ScoreCategory, ScoreScale, SentimentBar,
};
use crate::view::{ResourceFetcher, ResourceView, ViewOptions, ViewSnapshot};
use crate::waterfall::WaterfallChart;
use std::sync::Arc;

pub type ReportSnapshot = ViewSnapshot<ResourceKey, ScoreReport>;
pub type HistorySnapshot = ViewSnapshot<Ticker, ScoreHistory>;

/// Generations issued by one [`DashboardSession::select`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub report: u64,
    pub history: u64,
}

/// The report for the selected ticker/date plus that ticker's score history.
pub struct DashboardSession {
    report: ResourceView<ResourceKey, ScoreReport>,
    history: ResourceView<Ticker, ScoreHistory>,
}

impl DashboardSession {
    pub fn spawn<R, H>(reports: Arc<R>, history: Arc<H>, options: ViewOptions) -> Self
    where
        R: ResourceFetcher<ResourceKey, ScoreReport> + ?Sized + 'static,
        H: ResourceFetcher<Ticker, ScoreHistory> + ?Sized + 'static,
    {
        let history = Arc::new(DegradingHistoryFetcher::new(history));
        Self {
            report: ResourceView::spawn(reports, options.clone()),
            history: ResourceView::spawn(history, options),
        }
    }

    pub fn from_client(client: Arc<ScoreApiClient>, options: ViewOptions) -> Self {
        Self::spawn(Arc::clone(&client), client, options)
    }

    /// Every call fetches again, even for the key already shown.
    pub fn select(&mut self, key: Option<ResourceKey>) -> anyhow::Result<Selection> {
        let ticker = key.as_ref().map(|k| k.ticker.clone());
        Ok(Selection {
            report: self.report.observe(key)?,
            history: self.history.observe(ticker)?,
        })
    }

    /// Retries the current report; history is left alone.
    pub fn retry(&mut self) -> anyhow::Result<u64> {
        self.report.refresh()
    }

    pub fn report_view(&self) -> &ResourceView<ResourceKey, ScoreReport> {
        &self.report
    }

    pub fn history_view(&self) -> &ResourceView<Ticker, ScoreHistory> {
        &self.history
    }

    pub async fn settled(
        &self,
        selection: Selection,
    ) -> anyhow::Result<(ReportSnapshot, HistorySnapshot)> {
        let report = self.report.settled(selection.report).await?;
        let history = self.history.settled(selection.history).await?;
        Ok((report, history))
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.report.shutdown().await?;
        self.history.shutdown().await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreCard {
    pub value: f64,
    pub display: String,
    pub category: ScoreCategory,
    pub caption: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskRow {
    pub horizon: Horizon,
    pub label: &'static str,
    pub percent: f64,
    pub display: String,
    pub level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentimentGauge {
    pub bar: SentimentBar,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryChartPoint {
    pub label: String,
    pub score: f64,
}

/// Score history ready for a line chart, oldest first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoryChart {
    pub points: Vec<HistoryChartPoint>,
}

impl HistoryChart {
    pub fn from_history(history: &ScoreHistory) -> Self {
        Self {
            points: history
                .points
                .iter()
                .map(|p| HistoryChartPoint {
                    label: format::history_date_label(p.date),
                    score: p.score,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Everything the dashboard shows for one report.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardModel {
    pub score: ScoreCard,
    pub risks: Vec<RiskRow>,
    pub sentiment: SentimentGauge,
    pub features: Vec<FeatureRow>,
    pub waterfall: WaterfallChart,
}

impl DashboardModel {
    pub fn build(
        report: &ScoreReport,
        scale: ScoreScale,
        horizon: Horizon,
    ) -> Result<Self, InvalidInputError> {
        let category = format::score_category(report.creditworthiness, scale)?;
        let score = ScoreCard {
            value: report.creditworthiness,
            display: format!(
                "{:.*}",
                scale.precision(),
                report.creditworthiness
            ),
            category,
            caption: scale.caption(),
        };

        let mut risks = Vec::with_capacity(Horizon::ALL.len());
        for horizon in Horizon::ALL {
            let percent = format::risk_percent(report.risk_probs.get(horizon));
            risks.push(RiskRow {
                horizon,
                label: horizon.risk_label(),
                percent,
                display: format::format_percent(percent),
                level: format::risk_color(percent)?,
            });
        }

        let sentiment_value = report.decayed_sentiment().unwrap_or_else(|| {
            tracing::debug!("report has no decayed_sentiment; showing neutral");
            0.0
        });
        let bar = format::sentiment_bar(sentiment_value)?;
        let sentiment = SentimentGauge {
            bar,
            display: format!("{:.1}", bar.scaled),
        };

        let features = report
            .features
            .iter()
            .map(|(k, v)| FeatureRow {
                label: format::format_feature_key(k),
                value: format::format_feature_value(v),
            })
            .collect();

        Ok(Self {
            score,
            risks,
            sentiment,
            features,
            waterfall: WaterfallChart::for_horizon(report, horizon)?,
        })
    }
}
