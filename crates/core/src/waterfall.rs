use crate::domain::report::{Horizon, ScoreReport, ShapExplanation};
use crate::error::{ensure_finite, InvalidInputError};
use crate::format::format_feature_key;

pub const BASE_LABEL: &str = "Base Value";
pub const TOTAL_LABEL: &str = "Final Prediction";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Absolute,
    Relative,
    Total,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaterfallStep {
    pub label: String,
    pub value: f64,
    pub kind: StepKind,
}

impl WaterfallStep {
    fn new(label: impl Into<String>, value: f64, kind: StepKind) -> Self {
        Self {
            label: label.into(),
            value,
            kind,
        }
    }

    /// Bar annotation.
    pub fn text(&self) -> String {
        format!("{:.4}", self.value)
    }
}

/// Base value, then deltas by descending magnitude, then the running total.
///
/// Ties keep the input order (`sort_by` is stable), so the output depends only on
/// the arguments.
pub fn sequence<I, K>(base: f64, deltas: I) -> Result<Vec<WaterfallStep>, InvalidInputError>
where
    I: IntoIterator<Item = (K, f64)>,
    K: AsRef<str>,
{
    let base = ensure_finite("base_value", base)?;

    let mut ordered = Vec::new();
    for (name, value) in deltas {
        let value = ensure_finite(name.as_ref(), value)?;
        ordered.push((name, value));
    }
    ordered.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));

    let mut steps = Vec::with_capacity(ordered.len() + 2);
    steps.push(WaterfallStep::new(BASE_LABEL, base, StepKind::Absolute));

    let mut cumulative = base;
    for (name, value) in ordered {
        cumulative += value;
        steps.push(WaterfallStep::new(
            format_feature_key(name.as_ref()),
            value,
            StepKind::Relative,
        ));
    }

    let total = ensure_finite("final_prediction", cumulative)?;
    steps.push(WaterfallStep::new(TOTAL_LABEL, total, StepKind::Total));
    Ok(steps)
}

pub fn sequence_explanation(
    explanation: &ShapExplanation,
) -> Result<Vec<WaterfallStep>, InvalidInputError> {
    sequence(
        explanation.base_value,
        explanation.shap_values.iter().map(|(k, v)| (k, *v)),
    )
}

/// Waterfall for one horizon tab. A report without that explanation yields no steps.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterfallChart {
    pub horizon: Horizon,
    pub steps: Vec<WaterfallStep>,
}

impl WaterfallChart {
    pub fn for_horizon(report: &ScoreReport, horizon: Horizon) -> Result<Self, InvalidInputError> {
        let steps = match report.explanation(horizon) {
            Some(explanation) => sequence_explanation(explanation)?,
            None => Vec::new(),
        };
        Ok(Self { horizon, steps })
    }

    pub fn final_value(&self) -> Option<f64> {
        self.steps
            .last()
            .filter(|s| s.kind == StepKind::Total)
            .map(|s| s.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::OrderedMap;

    fn step(label: &str, value: f64, kind: StepKind) -> WaterfallStep {
        WaterfallStep::new(label, value, kind)
    }

    #[test]
    fn empty_deltas_yield_base_and_total() {
        let steps = sequence(100.0, Vec::<(&str, f64)>::new()).unwrap();
        assert_eq!(
            steps,
            vec![
                step("Base Value", 100.0, StepKind::Absolute),
                step("Final Prediction", 100.0, StepKind::Total),
            ]
        );
    }

    #[test]
    fn deltas_sorted_by_magnitude_with_running_total() {
        let steps = sequence(0.0, [("a", 5.0), ("b", -3.0)]).unwrap();
        assert_eq!(
            steps,
            vec![
                step("Base Value", 0.0, StepKind::Absolute),
                step("A", 5.0, StepKind::Relative),
                step("B", -3.0, StepKind::Relative),
                step("Final Prediction", 2.0, StepKind::Total),
            ]
        );

        let reversed = sequence(0.0, [("small", 0.1), ("vol_20d", -0.9)]).unwrap();
        assert_eq!(reversed[1].label, "Vol 20D");
        assert_eq!(reversed[2].label, "Small");
    }

    #[test]
    fn ties_keep_input_order() {
        let steps = sequence(1.0, [("zeta", -2.0), ("alpha", 2.0), ("mid", 2.0)]).unwrap();
        let labels: Vec<_> = steps.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Base Value", "Zeta", "Alpha", "Mid", "Final Prediction"]
        );
        assert_eq!(steps.last().unwrap().value, 3.0);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let mut deltas = OrderedMap::new();
        for (i, name) in ["vol_5d", "vol_20d", "de_ratio", "decayed_sentiment", "drawdown_60d"]
            .iter()
            .enumerate()
        {
            deltas.insert(*name, if i % 2 == 0 { 0.25 } else { -0.25 });
        }
        let explanation = ShapExplanation {
            base_value: -0.4,
            shap_values: deltas,
            feature_values: OrderedMap::new(),
        };
        let first = sequence_explanation(&explanation).unwrap();
        let second = sequence_explanation(&explanation).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 7);
    }

    #[test]
    fn non_finite_inputs_are_rejected() {
        let err = sequence(0.0, [("a", 1.0), ("b", f64::NAN)]).unwrap_err();
        assert_eq!(err.field, "b");
        assert!(sequence(f64::INFINITY, Vec::<(&str, f64)>::new()).is_err());
        assert!(sequence(f64::MAX, [("a", f64::MAX)]).is_err());
    }

    #[test]
    fn step_text_uses_four_decimals() {
        assert_eq!(step("A", 0.123456, StepKind::Relative).text(), "0.1235");
        assert_eq!(step("B", -2.0, StepKind::Relative).text(), "-2.0000");
    }
}
