//! Document lifecycle states and the allowed transition matrix

use serde::{Deserialize, Serialize};

use crate::error::SignError;

/// Document-level lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Processing,
    Active,
    Final,
    Failed,
    Archived,
}

impl DocumentStatus {
    /// The full transition matrix. Anything not listed here is rejected.
    pub fn can_transition(self, to: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, to),
            (Draft, Processing)
                | (Draft, Failed)
                | (Draft, Archived)
                | (Processing, Draft)
                | (Processing, Active)
                | (Processing, Failed)
                | (Active, Final)
                | (Active, Archived)
                | (Final, Archived)
                | (Failed, Draft)
                | (Failed, Processing)
        )
    }

    /// Validate and perform a transition.
    pub fn transition(self, to: DocumentStatus) -> Result<DocumentStatus, SignError> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(SignError::InvalidTransition { from: self, to })
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Active => "active",
            DocumentStatus::Final => "final",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Archived => "archived",
        };
        write!(f, "{}", s)
    }
}
