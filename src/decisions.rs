use serde::{Deserialize, Serialize};

use crate::types::ApplicationId;

/// verdict reported back by the external validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationDecision {
    pub loan_id: ApplicationId,
    /// name of the status to apply, e.g. "APROBADO"
    #[serde(default)]
    pub status: String,
}

impl ValidationDecision {
    pub fn new(loan_id: ApplicationId, status: impl Into<String>) -> Self {
        Self {
            loan_id,
            status: status.into(),
        }
    }

    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// blank verdicts carry nothing to apply
    pub fn is_actionable(&self) -> bool {
        !self.status.trim().is_empty()
    }
}
