pub mod client;
pub mod dashboard;
pub mod domain;
pub mod error;
pub mod format;
pub mod summary;
pub mod view;
pub mod waterfall;

pub mod config {
    use crate::domain::history::HistorySchema;
    use crate::format::ScoreScale;
    use anyhow::Context;
    use std::time::Duration;

    const DEFAULT_API_TIMEOUT_SECS: u64 = 60;
    const DEFAULT_SLOW_NOTICE_MS: u64 = 3000;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub api_base_url: Option<String>,
        pub api_timeout: Duration,
        pub score_scale: ScoreScale,
        pub history_schema: HistorySchema,
        pub slow_notice_after: Duration,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    /// Connection details for the score backend.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ApiConfig {
        pub base_url: String,
        pub timeout: Duration,
    }

    impl ApiConfig {
        pub fn new(base_url: impl Into<String>) -> Self {
            Self {
                base_url: base_url.into(),
                timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let score_scale = match env_non_empty("CREDITLENS_SCORE_SCALE") {
                Some(s) => ScoreScale::parse(&s)?,
                None => ScoreScale::Fico,
            };
            let history_schema = match env_non_empty("CREDITLENS_HISTORY_SCHEMA") {
                Some(s) => HistorySchema::parse(&s)?,
                None => HistorySchema::Creditworthiness,
            };

            Ok(Self {
                api_base_url: env_non_empty("CREDITLENS_API_URL"),
                api_timeout: Duration::from_secs(
                    env_parsed("CREDITLENS_API_TIMEOUT_SECS")?.unwrap_or(DEFAULT_API_TIMEOUT_SECS),
                ),
                score_scale,
                history_schema,
                slow_notice_after: Duration::from_millis(
                    env_parsed("CREDITLENS_SLOW_NOTICE_MS")?.unwrap_or(DEFAULT_SLOW_NOTICE_MS),
                ),
                anthropic_api_key: env_non_empty("ANTHROPIC_API_KEY"),
                sentry_dsn: env_non_empty("SENTRY_DSN"),
            })
        }

        pub fn require_api_base_url(&self) -> anyhow::Result<&str> {
            self.api_base_url
                .as_deref()
                .context("CREDITLENS_API_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn api_config(&self) -> anyhow::Result<ApiConfig> {
            Ok(ApiConfig {
                base_url: self.require_api_base_url()?.to_string(),
                timeout: self.api_timeout,
            })
        }
    }

    fn env_non_empty(name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn env_parsed(name: &str) -> anyhow::Result<Option<u64>> {
        env_non_empty(name)
            .map(|s| {
                s.parse::<u64>()
                    .with_context(|| format!("{name} must be a non-negative integer (got {s})"))
            })
            .transpose()
    }
}
