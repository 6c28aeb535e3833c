use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

/// Prediction horizon of one risk model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Horizon {
    #[serde(rename = "label_5d")]
    Near,
    #[serde(rename = "label_20d")]
    Mid,
    #[serde(rename = "label_60d")]
    Long,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::Near, Horizon::Mid, Horizon::Long];

    pub fn key(self) -> &'static str {
        match self {
            Self::Near => "label_5d",
            Self::Mid => "label_20d",
            Self::Long => "label_60d",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.key() == key)
    }

    /// Accepts `5d`, `label_5d`, `near` and friends.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let s = raw.trim().to_ascii_lowercase();
        match s.as_str() {
            "5d" | "label_5d" | "near" => Ok(Self::Near),
            "20d" | "label_20d" | "mid" => Ok(Self::Mid),
            "60d" | "label_60d" | "long" => Ok(Self::Long),
            _ => anyhow::bail!("unknown horizon {raw:?} (expected 5d, 20d or 60d)"),
        }
    }

    pub fn risk_label(self) -> &'static str {
        match self {
            Self::Near => "Near-Term (5 Day)",
            Self::Mid => "Mid-Term (20 Day)",
            Self::Long => "Long-Term (60 Day)",
        }
    }

    pub fn tab_label(self) -> &'static str {
        match self {
            Self::Near => "Near-Term (5d)",
            Self::Mid => "Mid-Term (20d)",
            Self::Long => "Long-Term (60d)",
        }
    }
}

impl Default for Horizon {
    fn default() -> Self {
        Self::Long
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskProbs {
    pub label_5d: f64,
    pub label_20d: f64,
    pub label_60d: f64,
}

impl RiskProbs {
    pub fn get(&self, horizon: Horizon) -> f64 {
        match horizon {
            Horizon::Near => self.label_5d,
            Horizon::Mid => self.label_20d,
            Horizon::Long => self.label_60d,
        }
    }
}

/// JSON object decoded into a list that keeps the document's key order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (k, v) in iter {
            out.insert(k, v);
        }
        out
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut out = OrderedMap::new();
                while let Some((k, v)) = access.next_entry::<String, V>()? {
                    out.insert(k, v);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

/// A feature cell: the backend mixes numbers with a few labels (date, ticker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
    Missing,
}

impl FeatureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapExplanation {
    pub base_value: f64,
    pub shap_values: OrderedMap<f64>,
    #[serde(default)]
    pub feature_values: OrderedMap<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreReport {
    pub ticker: Option<String>,
    pub date: Option<String>,
    pub creditworthiness: f64,
    pub risk_probs: RiskProbs,
    pub features: OrderedMap<FeatureValue>,
    pub shap_explanations: BTreeMap<Horizon, ShapExplanation>,
}

impl ScoreReport {
    pub const SENTIMENT_FEATURE: &'static str = "decayed_sentiment";

    pub fn decayed_sentiment(&self) -> Option<f64> {
        self.features
            .get(Self::SENTIMENT_FEATURE)
            .and_then(FeatureValue::as_f64)
    }

    pub fn explanation(&self, horizon: Horizon) -> Option<&ShapExplanation> {
        self.shap_explanations.get(&horizon)
    }
}
