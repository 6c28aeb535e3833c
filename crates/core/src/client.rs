use crate::config::{ApiConfig, Settings};
use crate::domain::contract::WireScoreReport;
use crate::domain::history::{HistorySchema, ScoreHistory};
use crate::domain::key::{ResourceKey, Ticker};
use crate::domain::report::ScoreReport;
use crate::error::FetchError;
use crate::format::ScoreScale;
use crate::view::ResourceFetcher;
use anyhow::Context;
use reqwest::Url;
use serde_json::Value;

/// Client for the score backend (`/scores/...`).
#[derive(Debug, Clone)]
pub struct ScoreApiClient {
    http: reqwest::Client,
    base_url: Url,
    scale: ScoreScale,
    history_schema: HistorySchema,
}

impl ScoreApiClient {
    pub fn new(
        config: ApiConfig,
        scale: ScoreScale,
        history_schema: HistorySchema,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !config.base_url.trim().is_empty(),
            "score API base URL must be non-empty"
        );
        let base_url = Url::parse(config.base_url.trim())
            .with_context(|| format!("invalid score API base URL {:?}", config.base_url))?;
        anyhow::ensure!(
            !base_url.cannot_be_a_base(),
            "score API base URL must be hierarchical (got {base_url})"
        );

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build score API http client")?;

        Ok(Self {
            http,
            base_url,
            scale,
            history_schema,
        })
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::new(
            settings.api_config()?,
            settings.score_scale,
            settings.history_schema,
        )
    }

    pub fn report_url(&self, key: &ResourceKey) -> Url {
        let date = key.date.format("%Y-%m-%d").to_string();
        self.endpoint(&["scores", key.ticker.as_str(), &date])
    }

    pub fn history_url(&self, ticker: &Ticker) -> Url {
        self.endpoint(&["scores", ticker.as_str()])
    }

    /// Appends percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Hierarchical base URLs are checked in `new`, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn fetch_report(&self, key: &ResourceKey) -> Result<ScoreReport, FetchError> {
        let raw = self.get_json(self.report_url(key)).await?;
        let wire = serde_json::from_value::<WireScoreReport>(raw).map_err(FetchError::decode)?;
        wire.validate_and_into_report(self.scale)
            .map_err(|e| FetchError::decode(format!("{e:#}")))
    }

    pub async fn fetch_history(&self, ticker: &Ticker) -> Result<ScoreHistory, FetchError> {
        let raw = self.get_json(self.history_url(ticker)).await?;
        ScoreHistory::from_backend_rows(ticker.clone(), &raw, self.history_schema)
            .map_err(|e| FetchError::decode(format!("{e:#}")))
    }

    async fn get_json(&self, url: Url) -> Result<Value, FetchError> {
        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(FetchError::network)?;

        let status = res.status();
        let text = res.text().await.map_err(FetchError::network)?;

        if !status.is_success() {
            return Err(FetchError::Server {
                status: status.as_u16(),
                detail: server_detail(&text),
            });
        }

        serde_json::from_str::<Value>(&text).map_err(FetchError::decode)
    }
}

/// `{"detail": "..."}` from an error body, when the body has one.
fn server_detail(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    value
        .get("detail")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait::async_trait]
impl ResourceFetcher<ResourceKey, ScoreReport> for ScoreApiClient {
    async fn fetch(&self, key: &ResourceKey) -> Result<ScoreReport, FetchError> {
        self.fetch_report(key).await
    }
}

#[async_trait::async_trait]
impl ResourceFetcher<Ticker, ScoreHistory> for ScoreApiClient {
    async fn fetch(&self, ticker: &Ticker) -> Result<ScoreHistory, FetchError> {
        self.fetch_history(ticker).await
    }
}

/// History is optional enrichment: any failure becomes an empty history.
pub struct DegradingHistoryFetcher<F: ?Sized> {
    inner: std::sync::Arc<F>,
}

impl<F: ?Sized> DegradingHistoryFetcher<F> {
    pub fn new(inner: std::sync::Arc<F>) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl<F> ResourceFetcher<Ticker, ScoreHistory> for DegradingHistoryFetcher<F>
where
    F: ResourceFetcher<Ticker, ScoreHistory> + ?Sized,
{
    async fn fetch(&self, ticker: &Ticker) -> Result<ScoreHistory, FetchError> {
        match self.inner.fetch(ticker).await {
            Ok(history) => Ok(history),
            Err(err) => {
                tracing::warn!(%ticker, error = %err, "history fetch failed; showing no data");
                Ok(ScoreHistory::empty(ticker.clone()))
            }
        }
    }
}
