//! Shared error taxonomy for the signing pipeline
//!
//! Per-field failures (`AssetResolution`, `Embedding`) are isolated by the
//! embedding pass: the field is skipped and logged. Per-request failures
//! (authorization, persistence, invalid transitions) are fatal and surfaced
//! to the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::status::DocumentStatus;

/// The recipient a premature signer has to wait for, carried on
/// [`SignError::OutOfOrder`] for client messaging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextSigner {
    pub recipient_id: Uuid,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum SignError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not this signer's turn{}", next_hint(.next))]
    OutOfOrder { next: Option<NextSigner> },

    #[error("document {0} not found")]
    NotFound(Uuid),

    #[error("no asset resolved for field {0}")]
    AssetResolution(Uuid),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("stale document version: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("invalid geometry: {0}")]
    Geometry(String),
}

fn next_hint(next: &Option<NextSigner>) -> String {
    match next {
        Some(n) => format!("; please wait for {}", n.name),
        None => String::new(),
    }
}

impl SignError {
    /// Whether the failure aborts the whole signing request. Per-field
    /// failures are skipped by the pass instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SignError::AssetResolution(_) | SignError::Embedding(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_names_next_signer() {
        let err = SignError::OutOfOrder {
            next: Some(NextSigner {
                recipient_id: Uuid::new_v4(),
                name: "Alice".into(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("please wait for Alice"), "message: {msg}");
    }

    #[test]
    fn out_of_order_without_next_still_renders() {
        let err = SignError::OutOfOrder { next: None };
        assert_eq!(err.to_string(), "not this signer's turn");
    }

    #[test]
    fn per_field_errors_are_not_fatal() {
        assert!(!SignError::AssetResolution(Uuid::new_v4()).is_fatal());
        assert!(!SignError::Embedding("decode".into()).is_fatal());
        assert!(SignError::Persistence("write".into()).is_fatal());
    }
}
