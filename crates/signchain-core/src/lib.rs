//! Sequential signing protocol core
//!
//! Ties the shared data model and the PDF engine into the signing use case:
//! tolerant payload-to-field resolution (`assets`), the recipient ordering
//! state machine (`recipients`), narrow interfaces to external services
//! (`store`), and the per-request signing orchestrator (`orchestrator`).

pub mod assets;
pub mod orchestrator;
pub mod recipients;
pub mod store;

pub use assets::{candidate_keys, resolve, Resolution};
pub use orchestrator::{Orchestrator, SignOutcome, SignRequest};
pub use recipients::{all_signed, can_sign, next_to_sign, validate_orders};
pub use store::{
    AuditEntry, AuditLogger, BlobStore, DocumentStore, IdentityProvider, MemoryAuditLogger,
    MemoryBlobStore, MemoryDocumentStore, MemoryNotifier, Notifier, Principal, SentNotification,
    StaticIdentityProvider,
};
