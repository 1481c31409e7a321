use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Per-key failure recorded by a maintenance sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SweepError {
    pub key: String,
    pub reason: String,
}

/// Tally of one sweep over a prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<SweepError>,
}

impl SweepReport {
    pub fn record_success(&mut self) {
        self.success_count += 1;
    }

    pub fn record_failure(&mut self, key: impl Into<String>, reason: impl Into<String>) {
        self.error_count += 1;
        self.errors.push(SweepError {
            key: key.into(),
            reason: reason.into(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.error_count == 0
    }
}
