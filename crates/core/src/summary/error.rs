use serde_json::Value;
use std::fmt;

/// A summary request that failed after reaching the provider, with the raw body
/// kept for diagnostics.
#[derive(Debug, Clone)]
pub struct SummaryDiagnosticsError {
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl fmt::Display for SummaryDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "summary error (stage={}): {}", self.stage, self.detail)
    }
}

impl std::error::Error for SummaryDiagnosticsError {}
