use anyhow::Context;
use clap::{Parser, Subcommand};
use creditlens_core::client::ScoreApiClient;
use creditlens_core::config::Settings;
use creditlens_core::dashboard::{
    DashboardModel, DashboardSession, HistoryChart, HistorySnapshot, ReportSnapshot, Selection,
};
use creditlens_core::domain::key::{ResourceKey, Ticker};
use creditlens_core::domain::report::Horizon;
use creditlens_core::summary::anthropic::AnthropicSummaryClient;
use creditlens_core::summary::{summary_or_unavailable, SummaryInput};
use creditlens_core::view::{FetchState, ViewOptions};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod input;
mod render;

#[derive(Debug, Parser)]
#[command(name = "creditlens")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch one ticker's score and print the dashboard.
    Show {
        #[arg(long)]
        ticker: String,

        /// As-of date (YYYY-MM-DD). Defaults to today (UTC).
        #[arg(long)]
        date: Option<String>,

        /// Explanation tab: 5d, 20d or 60d.
        #[arg(long, default_value = "60d")]
        horizon: String,

        /// Skip the generated summary even when ANTHROPIC_API_KEY is set.
        #[arg(long)]
        no_summary: bool,
    },

    /// Read `TICKER [DATE]` lines from stdin and print every state change.
    Watch {
        /// Date used for lines without one. Defaults to today (UTC).
        #[arg(long)]
        date: Option<String>,

        #[arg(long, default_value = "60d")]
        horizon: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let today = chrono::Utc::now().date_naive();

    let result = match args.command {
        Command::Show {
            ticker,
            date,
            horizon,
            no_summary,
        } => {
            let key = ResourceKey::new(
                Ticker::parse(&ticker)?,
                input::resolve_date(date.as_deref(), today)?,
            );
            show(&settings, key, Horizon::parse(&horizon)?, !no_summary).await
        }
        Command::Watch { date, horizon } => {
            let default_date = input::resolve_date(date.as_deref(), today)?;
            watch(&settings, default_date, today, Horizon::parse(&horizon)?).await
        }
    };

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
    }
    result
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

fn open_session(settings: &Settings) -> anyhow::Result<DashboardSession> {
    let client = Arc::new(ScoreApiClient::from_settings(settings)?);
    let options = ViewOptions {
        slow_notice_after: settings.slow_notice_after,
    };
    Ok(DashboardSession::from_client(client, options))
}

async fn show(
    settings: &Settings,
    key: ResourceKey,
    horizon: Horizon,
    with_summary: bool,
) -> anyhow::Result<ExitCode> {
    let mut session = open_session(settings)?;
    let mut reports = session.report_view().subscribe();
    let selection = session.select(Some(key.clone()))?;

    let (report, history) = wait_printing_notices(&session, &mut reports, selection).await?;
    session.shutdown().await?;

    match report.state {
        FetchState::Ready { data, .. } => {
            let model = DashboardModel::build(&data, settings.score_scale, horizon)
                .with_context(|| format!("report for {key} cannot be displayed"))?;
            let chart = history.state.data().map(HistoryChart::from_history);

            let summary = if with_summary && settings.anthropic_api_key.is_some() {
                let client = AnthropicSummaryClient::from_settings(settings)?;
                let input = SummaryInput::from_report(key.ticker.clone(), &data, settings.score_scale);
                Some(summary_or_unavailable(&client, &input).await)
            } else {
                None
            };

            println!("{key}");
            render::emit(render::DashboardView {
                model: &model,
                history: chart.as_ref(),
                summary: summary.as_deref(),
            })?;
            tracing::info!(%key, score = data.creditworthiness, "dashboard rendered");
            Ok(ExitCode::SUCCESS)
        }
        FetchState::Failed { message, .. } => {
            eprintln!("{message}");
            Ok(ExitCode::FAILURE)
        }
        other => anyhow::bail!("report view settled in an unexpected state: {other:?}"),
    }
}

/// Prints each loading notice for `selection` until both views settle.
async fn wait_printing_notices(
    session: &DashboardSession,
    reports: &mut tokio::sync::watch::Receiver<ReportSnapshot>,
    selection: Selection,
) -> anyhow::Result<(ReportSnapshot, HistorySnapshot)> {
    let settled = session.settled(selection);
    tokio::pin!(settled);

    let mut last_notice: Option<String> = None;
    loop {
        tokio::select! {
            res = &mut settled => return res,
            changed = reports.changed() => {
                changed.context("report view task has stopped")?;
                let snapshot = reports.borrow_and_update().clone();
                if snapshot.generation != selection.report || !snapshot.state.is_loading() {
                    continue;
                }
                let notice = snapshot.message();
                if notice.is_some() && notice != last_notice {
                    if let Some(text) = &notice {
                        eprintln!("{text}");
                    }
                    last_notice = notice;
                }
            }
        }
    }
}

async fn watch(
    settings: &Settings,
    default_date: chrono::NaiveDate,
    today: chrono::NaiveDate,
    horizon: Horizon,
) -> anyhow::Result<ExitCode> {
    let mut session = open_session(settings)?;
    let mut reports = session.report_view().subscribe();
    let mut histories = session.history_view().subscribe();
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    let mut stdin_open = true;
    let mut pending: Option<Selection> = None;
    let mut history: Option<HistorySnapshot> = None;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line.context("failed to read stdin")? {
                    Some(line) => match input::parse_watch_line(&line, default_date, today) {
                        Ok(Some(key)) => {
                            tracing::debug!(%key, "selecting");
                            history = None;
                            pending = Some(session.select(Some(key))?);
                        }
                        Ok(None) => {}
                        Err(err) => eprintln!("{err:#}"),
                    },
                    None => stdin_open = false,
                }
            }
            changed = reports.changed() => {
                changed.context("report view task has stopped")?;
                let snapshot = reports.borrow_and_update().clone();
                print_report_change(&snapshot, history.as_ref(), settings, horizon)?;
            }
            changed = histories.changed() => {
                changed.context("history view task has stopped")?;
                let snapshot = histories.borrow_and_update().clone();
                // A report already on screen gets its history panel appended.
                let report_shown = matches!(
                    &reports.borrow().state,
                    FetchState::Ready { key, .. } if snapshot.state.key() == Some(&key.ticker)
                );
                if let (true, Some(data)) = (report_shown, snapshot.state.data()) {
                    render::emit(render::HistoryPanel(Some(&HistoryChart::from_history(data))))?;
                }
                history = Some(snapshot);
            }
        }

        if !stdin_open && drained(pending, &reports, &histories) {
            break;
        }
    }

    session.shutdown().await?;
    Ok(ExitCode::SUCCESS)
}

/// True once the last selection has settled and every change was printed.
fn drained(
    pending: Option<Selection>,
    reports: &tokio::sync::watch::Receiver<ReportSnapshot>,
    histories: &tokio::sync::watch::Receiver<HistorySnapshot>,
) -> bool {
    let Some(selection) = pending else {
        return true;
    };
    let report_done = {
        let s = reports.borrow();
        s.generation >= selection.report && !s.state.is_loading()
    };
    let history_done = {
        let s = histories.borrow();
        s.generation >= selection.history && !s.state.is_loading()
    };
    report_done
        && history_done
        && !reports.has_changed().unwrap_or(false)
        && !histories.has_changed().unwrap_or(false)
}

fn print_report_change(
    snapshot: &ReportSnapshot,
    history: Option<&HistorySnapshot>,
    settings: &Settings,
    horizon: Horizon,
) -> anyhow::Result<()> {
    match &snapshot.state {
        FetchState::Idle => {}
        FetchState::Loading { .. } | FetchState::Failed { .. } => {
            if let Some(text) = snapshot.message() {
                println!("{text}");
            }
        }
        FetchState::Ready { key, data } => {
            match DashboardModel::build(data, settings.score_scale, horizon) {
                Ok(model) => {
                    let chart = history
                        .and_then(|h| h.state.data())
                        .filter(|h| h.ticker.as_ref() == Some(&key.ticker))
                        .map(HistoryChart::from_history);
                    println!("{key}");
                    render::emit(render::DashboardView {
                        model: &model,
                        history: chart.as_ref(),
                        summary: None,
                    })?;
                }
                Err(err) => {
                    tracing::error!(%key, error = %err, "report cannot be displayed");
                    println!("Failed to display data for {key}. {err}");
                }
            }
        }
    }
    Ok(())
}
