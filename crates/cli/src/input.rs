use anyhow::{ensure, Context};
use chrono::NaiveDate;
use creditlens_core::domain::key::{ResourceKey, Ticker};

/// The requested as-of date, or `today` when none is given. Scores do not exist
/// for future dates, so those are rejected.
pub fn resolve_date(date_arg: Option<&str>, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    let Some(s) = date_arg else {
        return Ok(today);
    };

    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("date must be YYYY-MM-DD (got {s:?})"))?;
    ensure!(date <= today, "date {date} is in the future (today is {today})");
    Ok(date)
}

/// One `watch` line: `TICKER [YYYY-MM-DD]`. Blank lines select nothing.
pub fn parse_watch_line(
    line: &str,
    default_date: NaiveDate,
    today: NaiveDate,
) -> anyhow::Result<Option<ResourceKey>> {
    let mut parts = line.split_whitespace();
    let Some(ticker) = parts.next() else {
        return Ok(None);
    };
    let date = match parts.next() {
        Some(d) => resolve_date(Some(d), today)?,
        None => default_date,
    };
    ensure!(
        parts.next().is_none(),
        "expected `TICKER [YYYY-MM-DD]` (got {line:?})"
    );

    Ok(Some(ResourceKey::new(Ticker::parse(ticker)?, date)))
}
