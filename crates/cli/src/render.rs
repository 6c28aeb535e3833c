//! Dashboard panels as ratatui widgets, drawn inline below the prompt.

use anyhow::Context;
use creditlens_core::dashboard::{
    DashboardModel, FeatureRow, HistoryChart, RiskRow, ScoreCard, SentimentGauge,
};
use creditlens_core::domain::report::Horizon;
use creditlens_core::format::{RiskLevel, ScoreTone, SentimentTone, NO_HISTORY_MESSAGE};
use creditlens_core::waterfall::{StepKind, WaterfallChart};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Axis, Bar, BarChart, BarGroup, Block, Chart, Dataset, Gauge, GraphType, Paragraph, Row,
    Table, Tabs, Widget, Wrap,
};
use ratatui::{Terminal, TerminalOptions, Viewport};
use std::io::{self, IsTerminal};

/// Width used when stdout is not a terminal.
const PLAIN_WIDTH: u16 = 100;
const RISK_LABEL_WIDTH: u16 = 20;
const HISTORY_HEIGHT: u16 = 12;
/// Waterfall bars are integer lengths; contributions are scaled onto this range.
const WATERFALL_SCALE: u64 = 1_000;

/// A widget that knows how many rows it needs at a given width.
pub trait Panel: Widget {
    fn height(&self, width: u16) -> u16;
}

/// Draws `panel` into an inline viewport, or as plain text when stdout is piped.
pub fn emit<P: Panel>(panel: P) -> anyhow::Result<()> {
    let stdout = io::stdout();
    if !stdout.is_terminal() {
        println!("{}", to_text(panel, PLAIN_WIDTH));
        return Ok(());
    }

    let backend = CrosstermBackend::new(stdout);
    let width = backend.size().context("failed to read terminal size")?.width;
    let height = panel.height(width);
    let mut terminal = Terminal::with_options(
        backend,
        TerminalOptions {
            viewport: Viewport::Inline(height),
        },
    )
    .context("failed to open inline terminal viewport")?;

    let completed = terminal
        .draw(|frame| frame.render_widget(panel, frame.area()))
        .context("failed to draw dashboard")?;
    let bottom = completed.area.bottom().saturating_sub(1);
    terminal
        .set_cursor_position((0, bottom))
        .context("failed to move cursor below dashboard")?;
    terminal.show_cursor().context("failed to show cursor")?;
    println!();
    Ok(())
}

/// Renders into an off-screen buffer and returns its rows, right-trimmed.
pub fn to_text<P: Panel>(panel: P, width: u16) -> String {
    let height = panel.height(width);
    let mut buf = Buffer::empty(Rect::new(0, 0, width, height));
    panel.render(buf.area, &mut buf);
    buffer_lines(&buf).join("\n")
}

fn buffer_lines(buf: &Buffer) -> Vec<String> {
    let area = buf.area;
    (area.top()..area.bottom())
        .map(|y| {
            let row: String = (area.left()..area.right())
                .map(|x| buf[(x, y)].symbol())
                .collect();
            row.trim_end().to_string()
        })
        .collect()
}

/// The full dashboard for one report.
pub struct DashboardView<'a> {
    pub model: &'a DashboardModel,
    /// `None` while the history is still loading.
    pub history: Option<&'a HistoryChart>,
    pub summary: Option<&'a str>,
}

impl DashboardView<'_> {
    fn section_heights(&self, width: u16) -> Vec<u16> {
        let mut heights = vec![
            4,
            self.model.risks.len() as u16 + 2,
            3,
            waterfall_height(&self.model.waterfall),
            self.model.features.len() as u16 + 3,
            HistoryPanel(self.history).height(width),
        ];
        if let Some(text) = self.summary {
            heights.push(wrapped_height(text, width));
        }
        heights
    }
}

impl Panel for DashboardView<'_> {
    fn height(&self, width: u16) -> u16 {
        self.section_heights(width).iter().sum()
    }
}

impl Widget for DashboardView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let heights = self.section_heights(area.width);
        let areas = Layout::vertical(heights.iter().map(|h| Constraint::Length(*h))).split(area);

        render_score_card(&self.model.score, areas[0], buf);
        render_risks(&self.model.risks, areas[1], buf);
        render_sentiment(&self.model.sentiment, areas[2], buf);
        render_waterfall(&self.model.waterfall, areas[3], buf);
        render_features(&self.model.features, areas[4], buf);
        HistoryPanel(self.history).render(areas[5], buf);
        if let Some(text) = self.summary {
            Paragraph::new(text)
                .wrap(Wrap { trim: true })
                .block(Block::bordered().title("Summary"))
                .render(areas[6], buf);
        }
    }
}

/// Score history on its own, for redraws once the history arrives.
pub struct HistoryPanel<'a>(pub Option<&'a HistoryChart>);

impl Panel for HistoryPanel<'_> {
    fn height(&self, _width: u16) -> u16 {
        match self.0 {
            Some(chart) if !chart.is_empty() => HISTORY_HEIGHT,
            _ => 3,
        }
    }
}

impl Widget for HistoryPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::bordered().title("Score History");
        let chart = match self.0 {
            None => {
                Paragraph::new("Loading history...")
                    .style(Style::new().fg(Color::DarkGray))
                    .block(block)
                    .render(area, buf);
                return;
            }
            Some(chart) if chart.is_empty() => {
                Paragraph::new(NO_HISTORY_MESSAGE)
                    .style(Style::new().fg(Color::DarkGray))
                    .block(block)
                    .render(area, buf);
                return;
            }
            Some(chart) => chart,
        };

        let data: Vec<(f64, f64)> = chart
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (i as f64, p.score))
            .collect();
        let (mut min_y, mut max_y) = chart
            .points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p.score), hi.max(p.score))
            });
        if min_y == max_y {
            min_y -= 1.0;
            max_y += 1.0;
        }
        let max_x = (data.len().saturating_sub(1) as f64).max(1.0);
        let first = chart.points.first().map(|p| p.label.clone()).unwrap_or_default();
        let last = chart.points.last().map(|p| p.label.clone()).unwrap_or_default();

        let datasets = vec![Dataset::default()
            .name("Score")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::new().fg(Color::Cyan))
            .data(&data)];

        Chart::new(datasets)
            .block(block)
            .x_axis(
                Axis::default()
                    .style(Style::new().fg(Color::Gray))
                    .bounds([0.0, max_x])
                    .labels(vec![Span::raw(first), Span::raw(last)]),
            )
            .y_axis(
                Axis::default()
                    .style(Style::new().fg(Color::Gray))
                    .bounds([min_y, max_y])
                    .labels(vec![
                        Span::raw(format!("{min_y:.1}")),
                        Span::raw(format!("{max_y:.1}")),
                    ]),
            )
            .render(area, buf);
    }
}

fn render_score_card(card: &ScoreCard, area: Rect, buf: &mut Buffer) {
    let color = score_color(card.category.tone);
    let lines = vec![
        Line::from(vec![
            Span::styled(
                card.display.clone(),
                Style::new().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            Span::styled(card.caption, Style::new().fg(Color::Gray)),
        ]),
        Line::from(Span::styled(card.category.label, Style::new().fg(color))),
    ];
    Paragraph::new(lines)
        .block(Block::bordered().title("Creditworthiness Score"))
        .render(area, buf);
}

fn render_risks(rows: &[RiskRow], area: Rect, buf: &mut Buffer) {
    let block = Block::bordered().title("Probability of Default");
    let inner = block.inner(area);
    block.render(area, buf);

    let lines = Layout::vertical(rows.iter().map(|_| Constraint::Length(1))).split(inner);
    for (row, line) in rows.iter().zip(lines.iter()) {
        let [label, gauge] =
            Layout::horizontal([Constraint::Length(RISK_LABEL_WIDTH), Constraint::Fill(1)])
                .areas(*line);
        Paragraph::new(row.label).render(label, buf);
        Gauge::default()
            .gauge_style(Style::new().fg(risk_color(row.level)).bg(Color::DarkGray))
            .ratio((row.percent / 100.0).clamp(0.0, 1.0))
            .label(format!("{} ({})", row.display, row.level))
            .render(gauge, buf);
    }
}

fn render_sentiment(gauge: &SentimentGauge, area: Rect, buf: &mut Buffer) {
    let title = format!(
        "News Sentiment {} ({})",
        gauge.display,
        sentiment_label(gauge.bar.tone)
    );
    let block = Block::bordered().title(title);
    let track = block.inner(area);
    block.render(area, buf);

    // The bar grows out of the midpoint, left for negative and right for positive.
    let [_, fill, _] = Layout::horizontal([
        Constraint::Percentage(gauge.bar.offset.round() as u16),
        Constraint::Percentage(gauge.bar.width.round() as u16),
        Constraint::Fill(1),
    ])
    .areas(track);

    Block::new()
        .style(Style::new().fg(Color::DarkGray))
        .render(track, buf);
    let center = Rect::new(track.x + track.width / 2, track.y, 1.min(track.width), track.height);
    Paragraph::new(symbols::line::VERTICAL).render(center, buf);
    Block::new()
        .style(Style::new().bg(sentiment_color(gauge.bar.tone)))
        .render(fill, buf);
}

fn waterfall_height(chart: &WaterfallChart) -> u16 {
    3 + chart.steps.len().max(1) as u16
}

fn render_waterfall(chart: &WaterfallChart, area: Rect, buf: &mut Buffer) {
    let block = Block::bordered().title("Feature Contributions");
    let inner = block.inner(area);
    block.render(area, buf);

    let [tabs, body] =
        Layout::vertical([Constraint::Length(1), Constraint::Fill(1)]).areas(inner);
    let selected = Horizon::ALL
        .iter()
        .position(|h| *h == chart.horizon)
        .unwrap_or_default();
    Tabs::new(Horizon::ALL.iter().map(|h| h.tab_label()))
        .select(selected)
        .highlight_style(Style::new().add_modifier(Modifier::REVERSED))
        .render(tabs, buf);

    if chart.steps.is_empty() {
        Paragraph::new("No explanation available for this horizon.")
            .style(Style::new().fg(Color::DarkGray))
            .render(body, buf);
        return;
    }

    let largest = chart
        .steps
        .iter()
        .map(|s| s.value.abs())
        .fold(0.0_f64, f64::max);
    let bars: Vec<Bar> = chart
        .steps
        .iter()
        .map(|step| {
            let length = if largest > 0.0 {
                (step.value.abs() / largest * WATERFALL_SCALE as f64).round() as u64
            } else {
                0
            };
            Bar::default()
                .label(Line::from(step.label.clone()))
                .value(length)
                .text_value(step.text())
                .style(Style::new().fg(step_color(step.kind, step.value)))
        })
        .collect();

    BarChart::default()
        .direction(Direction::Horizontal)
        .bar_width(1)
        .bar_gap(0)
        .max(WATERFALL_SCALE)
        .value_style(Style::new().fg(Color::White).add_modifier(Modifier::BOLD))
        .data(BarGroup::default().bars(&bars))
        .render(body, buf);
}

fn render_features(rows: &[FeatureRow], area: Rect, buf: &mut Buffer) {
    let header = Row::new(["Feature", "Value"]).style(Style::new().add_modifier(Modifier::BOLD));
    let body = rows
        .iter()
        .map(|r| Row::new([r.label.clone(), r.value.clone()]));
    Table::new(body, [Constraint::Percentage(60), Constraint::Percentage(40)])
        .header(header)
        .block(Block::bordered().title("Key Features"))
        .render(area, buf);
}

fn wrapped_height(text: &str, width: u16) -> u16 {
    let inner = usize::from(width.saturating_sub(2)).max(1);
    let lines = text.chars().count().div_ceil(inner).max(1);
    lines as u16 + 2
}

fn score_color(tone: ScoreTone) -> Color {
    match tone {
        ScoreTone::BrightGreen => Color::LightGreen,
        ScoreTone::Green => Color::Green,
        ScoreTone::Yellow => Color::Yellow,
        ScoreTone::Orange => Color::Rgb(255, 165, 0),
        ScoreTone::Red => Color::Red,
    }
}

fn risk_color(level: RiskLevel) -> Color {
    match level {
        RiskLevel::Low => Color::Green,
        RiskLevel::Medium => Color::Yellow,
        RiskLevel::High => Color::Red,
    }
}

fn sentiment_color(tone: SentimentTone) -> Color {
    match tone {
        SentimentTone::Negative => Color::Red,
        SentimentTone::Neutral => Color::Gray,
        SentimentTone::Positive => Color::Green,
    }
}

fn sentiment_label(tone: SentimentTone) -> &'static str {
    match tone {
        SentimentTone::Negative => "negative",
        SentimentTone::Neutral => "neutral",
        SentimentTone::Positive => "positive",
    }
}

fn step_color(kind: StepKind, value: f64) -> Color {
    match kind {
        StepKind::Absolute | StepKind::Total => Color::Blue,
        StepKind::Relative if value >= 0.0 => Color::Red,
        StepKind::Relative => Color::Green,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use creditlens_core::dashboard::HistoryChartPoint;
    use creditlens_core::domain::contract::WireScoreReport;
    use creditlens_core::format::ScoreScale;
    use ratatui::backend::TestBackend;
    use serde_json::json;

    fn model(horizon: Horizon) -> DashboardModel {
        let wire: WireScoreReport = serde_json::from_value(json!({
            "creditworthiness": 812.2,
            "risk_probs": {"label_5d": 0.02, "label_20d": 0.25, "label_60d": 1.0},
            "features": {"vol_5d": 0.5, "decayed_sentiment": 0.4},
            "shap_explanations": {
                "label_5d": {"base_value": 0.0, "shap_values": {}},
                "label_20d": {"base_value": 0.0, "shap_values": {}},
                "label_60d": {
                    "base_value": 0.5,
                    "shap_values": {"vol_5d": -0.25, "de_ratio": 0.5}
                }
            }
        }))
        .unwrap();
        let report = wire.validate_and_into_report(ScoreScale::Fico).unwrap();
        DashboardModel::build(&report, ScoreScale::Fico, horizon).unwrap()
    }

    fn row_of(lines: &[String], needle: &str) -> usize {
        lines
            .iter()
            .position(|l| l.contains(needle))
            .unwrap_or_else(|| panic!("{needle:?} not rendered in:\n{}", lines.join("\n")))
    }

    #[test]
    fn dashboard_draws_every_panel() {
        let m = model(Horizon::Long);
        let view = DashboardView {
            model: &m,
            history: None,
            summary: Some("Solid balance sheet."),
        };
        let height = view.height(80);
        let mut terminal = Terminal::new(TestBackend::new(80, height)).unwrap();
        terminal
            .draw(|frame| frame.render_widget(view, frame.area()))
            .unwrap();

        let lines = buffer_lines(terminal.backend().buffer());
        let order = [
            "Creditworthiness Score",
            "Probability of Default",
            "News Sentiment",
            "Feature Contributions",
            "Key Features",
            "Score History",
            "Summary",
        ]
        .map(|title| row_of(&lines, title));
        assert!(order.windows(2).all(|w| w[0] < w[1]), "{order:?}");
        assert!(lines[row_of(&lines, "812")].contains("(Range: 300-850)"));
        assert!(lines[row_of(&lines, "Exceptional")].starts_with('│'));
        assert!(lines[row_of(&lines, "Loading history...")].contains("Loading"));
        assert!(lines[row_of(&lines, "Solid balance sheet.")].starts_with('│'));
    }

    #[test]
    fn risk_gauges_show_percent_and_level() {
        let m = model(Horizon::Long);
        let area = Rect::new(0, 0, 60, 5);
        let mut buf = Buffer::empty(area);
        render_risks(&m.risks, area, &mut buf);
        let lines = buffer_lines(&buf);

        assert!(lines[1].contains("Near-Term (5 Day)") && lines[1].contains("2.00% (low)"));
        assert!(lines[2].contains("25.00% (medium)"));
        assert!(lines[3].contains("100.00% (high)"));
        // A certain default fills the whole gauge in the high-risk color.
        let gauge_start = 1 + RISK_LABEL_WIDTH;
        assert_eq!(buf[(gauge_start, 3)].fg, Color::Red);
        assert_eq!(buf[(58, 3)].symbol(), symbols::block::FULL);
        assert_eq!(buf[(58, 3)].fg, Color::Red);
        assert_eq!(buf[(gauge_start, 1)].symbol(), symbols::block::FULL);
        assert_eq!(buf[(58, 1)].symbol(), " ");
    }

    #[test]
    fn sentiment_fills_right_of_center() {
        let m = model(Horizon::Long);
        let area = Rect::new(0, 0, 42, 3);
        let mut buf = Buffer::empty(area);
        render_sentiment(&m.sentiment, area, &mut buf);

        assert!(buffer_lines(&buf)[0].contains("News Sentiment 20.0 (positive)"));
        // Inner track is x=1..41; center at 21, positive fill covers 40% after it.
        assert_eq!(buf[(5, 1)].bg, Color::Reset);
        assert_eq!(buf[(21, 1)].bg, Color::Green);
        assert_eq!(buf[(36, 1)].bg, Color::Green);
        assert_eq!(buf[(38, 1)].bg, Color::Reset);
    }

    #[test]
    fn waterfall_bars_follow_step_order() {
        let m = model(Horizon::Long);
        let area = Rect::new(0, 0, 70, waterfall_height(&m.waterfall));
        let mut buf = Buffer::empty(area);
        render_waterfall(&m.waterfall, area, &mut buf);
        let lines = buffer_lines(&buf);

        assert!(lines[1].contains("Near-Term (5d)") && lines[1].contains("Long-Term (60d)"));
        let rows = ["Base Value", "De Ratio", "Vol 5D", "Final Prediction"]
            .map(|label| row_of(&lines, label));
        assert_eq!(rows, [2, 3, 4, 5]);
    }

    #[test]
    fn waterfall_without_explanation() {
        let wire: WireScoreReport = serde_json::from_value(json!({
            "creditworthiness": 700.0,
            "risk_probs": {"label_5d": 0.1, "label_20d": 0.1, "label_60d": 0.1},
            "shap_explanations": {}
        }))
        .unwrap();
        let report = wire.validate_and_into_report(ScoreScale::Fico).unwrap();
        let m = DashboardModel::build(&report, ScoreScale::Fico, Horizon::Mid).unwrap();
        let text = to_text(
            DashboardView {
                model: &m,
                history: None,
                summary: None,
            },
            80,
        );
        assert!(text.contains("No explanation available for this horizon."));
    }

    #[test]
    fn features_table_lists_rows() {
        let m = model(Horizon::Long);
        let area = Rect::new(0, 0, 50, m.features.len() as u16 + 3);
        let mut buf = Buffer::empty(area);
        render_features(&m.features, area, &mut buf);
        let lines = buffer_lines(&buf);

        assert!(lines[1].contains("Feature") && lines[1].contains("Value"));
        assert!(lines[2].contains("Vol 5D") && lines[2].contains("0.5000"));
        assert!(lines[3].contains("Decayed Sentiment"));
    }

    #[test]
    fn history_panel_states() {
        assert!(to_text(HistoryPanel(Some(&HistoryChart::default())), 60)
            .contains(NO_HISTORY_MESSAGE));

        let chart = HistoryChart {
            points: vec![
                HistoryChartPoint {
                    label: "Aug 21".to_string(),
                    score: 735.5,
                },
                HistoryChartPoint {
                    label: "Aug 22".to_string(),
                    score: 742.0,
                },
            ],
        };
        let text = to_text(HistoryPanel(Some(&chart)), 60);
        assert_eq!(text.lines().count(), HISTORY_HEIGHT as usize);
        assert!(text.lines().next().unwrap().contains("Score History"));
        assert!(text.contains("Aug 22"));
    }

    #[test]
    fn summary_height_grows_with_text() {
        assert_eq!(wrapped_height("short", 40), 3);
        assert_eq!(wrapped_height(&"x".repeat(80), 42), 4);
    }
}
