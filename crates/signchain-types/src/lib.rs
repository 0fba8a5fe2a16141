//! Shared data model for sequential document signing
//!
//! This crate defines the document, field, and recipient types used across
//! the signing pipeline, the document status transition matrix, and the
//! shared error taxonomy.

pub mod error;
pub mod status;
pub mod types;

pub use error::{NextSigner, SignError};
pub use status::DocumentStatus;
pub use types::{
    BlobRef, CanonicalRect, Document, Field, FieldKind, PayloadAsset, PayloadKey, Recipient,
    SignatureStatus, Signer, SigningPayload,
};
