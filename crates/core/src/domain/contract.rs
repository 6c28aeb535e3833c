use crate::domain::report::{FeatureValue, Horizon, OrderedMap, RiskProbs, ScoreReport, ShapExplanation};
use crate::format::ScoreScale;
use anyhow::ensure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `GET /scores/{ticker}/{date}` body as the backend sends it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireScoreReport {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    pub creditworthiness: f64,
    pub risk_probs: RiskProbs,
    #[serde(default)]
    pub features: OrderedMap<FeatureValue>,
    #[serde(default)]
    pub shap_explanations: BTreeMap<String, ShapExplanation>,
}

impl WireScoreReport {
    pub fn validate_and_into_report(self, scale: ScoreScale) -> anyhow::Result<ScoreReport> {
        let (lo, hi) = scale.range();
        ensure!(
            self.creditworthiness.is_finite() && (lo..=hi).contains(&self.creditworthiness),
            "creditworthiness must be within {lo}..={hi} (got {})",
            self.creditworthiness
        );

        for horizon in Horizon::ALL {
            let p = self.risk_probs.get(horizon);
            ensure!(
                (0.0..=1.0).contains(&p),
                "risk probability {} must be between 0 and 1 (got {p})",
                horizon.key()
            );
        }

        let mut shap_explanations = BTreeMap::new();
        // Known horizons may be absent; their tab renders without a chart.
        for (key, explanation) in self.shap_explanations {
            let Some(horizon) = Horizon::from_key(&key) else {
                tracing::debug!(%key, "ignoring explanation for unknown horizon");
                continue;
            };
            ensure!(
                explanation.base_value.is_finite(),
                "{key}: base_value must be finite"
            );
            for (name, value) in explanation.shap_values.iter() {
                ensure!(value.is_finite(), "{key}: shap value for {name} must be finite");
            }
            for (name, value) in explanation.feature_values.iter() {
                ensure!(value.is_finite(), "{key}: feature value for {name} must be finite");
            }
            shap_explanations.insert(horizon, explanation);
        }

        Ok(ScoreReport {
            ticker: self.ticker,
            date: self.date,
            creditworthiness: self.creditworthiness,
            risk_probs: self.risk_probs,
            features: self.features,
            shap_explanations,
        })
    }
}
