use crate::domain::report::FeatureValue;
use crate::error::{ensure_finite, InvalidInputError};
use chrono::NaiveDate;
use std::fmt;

pub const SLOW_NOTICE_MESSAGE: &str = "This is a new ticker. Please wait while we perform the analysis (this may take up to 30 seconds)...";
pub const FAILURE_FALLBACK_DETAIL: &str = "Please check the ticker and try again.";
pub const NO_HISTORY_MESSAGE: &str = "No historical data available for this ticker.";

/// Score range a deployment reports in. The two ranges have different
/// brackets and are never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreScale {
    /// 300..=850, five brackets.
    #[default]
    Fico,
    /// 0..=100, four brackets.
    Percent,
}

/// Display color class of a score bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTone {
    BrightGreen,
    Green,
    Yellow,
    Orange,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreCategory {
    pub label: &'static str,
    pub tone: ScoreTone,
}

const FICO_BRACKETS: &[(f64, ScoreCategory)] = &[
    (800.0, ScoreCategory { label: "Exceptional", tone: ScoreTone::BrightGreen }),
    (740.0, ScoreCategory { label: "Very Good", tone: ScoreTone::Green }),
    (670.0, ScoreCategory { label: "Good", tone: ScoreTone::Yellow }),
    (580.0, ScoreCategory { label: "Fair", tone: ScoreTone::Orange }),
];
const FICO_FLOOR: ScoreCategory = ScoreCategory { label: "Poor", tone: ScoreTone::Red };

const PERCENT_BRACKETS: &[(f64, ScoreCategory)] = &[
    (80.0, ScoreCategory { label: "Excellent", tone: ScoreTone::Green }),
    (60.0, ScoreCategory { label: "Good", tone: ScoreTone::Yellow }),
    (40.0, ScoreCategory { label: "Fair", tone: ScoreTone::Red }),
];
const PERCENT_FLOOR: ScoreCategory = ScoreCategory { label: "Poor", tone: ScoreTone::Red };

impl ScoreScale {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fico" | "300-850" => Ok(Self::Fico),
            "percent" | "0-100" => Ok(Self::Percent),
            other => anyhow::bail!("unknown score scale {other:?} (expected fico or percent)"),
        }
    }

    pub fn range(self) -> (f64, f64) {
        match self {
            Self::Fico => (300.0, 850.0),
            Self::Percent => (0.0, 100.0),
        }
    }

    pub fn caption(self) -> &'static str {
        match self {
            Self::Fico => "(Range: 300-850)",
            Self::Percent => "Out of 100",
        }
    }

    /// Decimals shown for the headline score.
    pub fn precision(self) -> usize {
        match self {
            Self::Fico => 0,
            Self::Percent => 2,
        }
    }

    fn brackets(self) -> (&'static [(f64, ScoreCategory)], ScoreCategory) {
        match self {
            Self::Fico => (FICO_BRACKETS, FICO_FLOOR),
            Self::Percent => (PERCENT_BRACKETS, PERCENT_FLOOR),
        }
    }
}

/// Highest bracket whose breakpoint the score reaches.
pub fn score_category(score: f64, scale: ScoreScale) -> Result<ScoreCategory, InvalidInputError> {
    let score = ensure_finite("score", score)?;
    let (brackets, floor) = scale.brackets();
    Ok(brackets
        .iter()
        .find(|(breakpoint, _)| score >= *breakpoint)
        .map(|(_, category)| *category)
        .unwrap_or(floor))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

pub fn risk_color(percent: f64) -> Result<RiskLevel, InvalidInputError> {
    let percent = ensure_finite("risk_percent", percent)?;
    Ok(if percent < 10.0 {
        RiskLevel::Low
    } else if percent < 40.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    })
}

pub fn risk_percent(probability: f64) -> f64 {
    probability * 100.0
}

pub fn format_percent(percent: f64) -> String {
    format!("{percent:.2}%")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentimentTone {
    Negative,
    Neutral,
    Positive,
}

/// Horizontal bar anchored at the midpoint of a 0..100 track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentBar {
    /// Sentiment mapped to -50..50 (unclamped, shown as the headline number).
    pub scaled: f64,
    pub width: f64,
    pub offset: f64,
    pub tone: SentimentTone,
}

pub fn sentiment_bar(sentiment: f64) -> Result<SentimentBar, InvalidInputError> {
    let scaled = ensure_finite("sentiment", sentiment)? * 50.0;
    let magnitude = scaled.abs().min(50.0);
    let offset = if scaled > 0.0 { 50.0 } else { 50.0 - magnitude };
    let tone = if scaled < -15.0 {
        SentimentTone::Negative
    } else if scaled > 15.0 {
        SentimentTone::Positive
    } else {
        SentimentTone::Neutral
    };

    Ok(SentimentBar {
        scaled,
        width: magnitude * 2.0,
        offset,
        tone,
    })
}

/// `prev_return_20d` -> `Prev Return 20D`, `debtToEquity` -> `Debt To Equity`.
pub fn format_feature_key(key: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in key.chars() {
        if c == '_' || c == '-' || c.is_whitespace() {
            flush_word(&mut words, &mut current);
            prev = None;
            continue;
        }
        let camel_boundary = c.is_uppercase() && prev.is_some_and(char::is_lowercase);
        if camel_boundary {
            flush_word(&mut words, &mut current);
        }
        current.push(c);
        prev = Some(c);
    }
    flush_word(&mut words, &mut current);

    words.join(" ")
}

fn flush_word(words: &mut Vec<String>, current: &mut String) {
    if current.is_empty() {
        return;
    }
    let word = std::mem::take(current);
    let mut chars = word.chars();
    let formatted = match chars.next() {
        Some(first) if first.is_ascii_digit() => word.to_uppercase(),
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    words.push(formatted);
}

pub fn format_feature_value(value: &FeatureValue) -> String {
    match value {
        FeatureValue::Number(v) => format!("{v:.4}"),
        FeatureValue::Text(s) => s.clone(),
        FeatureValue::Missing => "-".to_string(),
    }
}

/// Chart axis label, e.g. `Aug 22`.
pub fn history_date_label(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

pub fn loading_message(key: &impl fmt::Display) -> String {
    format!("Loading data for {key}...")
}

pub fn failure_message(key: &impl fmt::Display, detail: Option<&str>) -> String {
    format!(
        "Failed to fetch data for {key}. {}",
        detail.unwrap_or(FAILURE_FALLBACK_DETAIL)
    )
}
