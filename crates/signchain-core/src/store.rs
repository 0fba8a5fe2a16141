//! Interfaces to external services, plus in-memory implementations
//!
//! The orchestrator only ever talks to these traits. The in-memory variants
//! back the test suite and double as reference semantics: in particular
//! [`MemoryDocumentStore::save`] defines the optimistic-versioning contract
//! any real store has to honor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use signchain_types::{BlobRef, Document, Recipient, SignError, Signer};

/// A resolved account, as the identity provider knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
}

/// Document persistence with optimistic concurrency.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Document, SignError>;

    /// Persist `doc`, rejecting the write with [`SignError::VersionConflict`]
    /// if the stored version no longer matches `doc.version`. The store owns
    /// the version counter: on success it bumps it and returns the saved
    /// document, which callers must use for any follow-up write.
    async fn save(&self, doc: Document) -> Result<Document, SignError>;
}

/// Content-addressed-ish byte storage. Refs are opaque to callers.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn read_bytes(&self, blob: &BlobRef) -> Result<Vec<u8>, SignError>;
    async fn write_bytes(&self, bytes: Vec<u8>) -> Result<BlobRef, SignError>;
}

/// Outbound "it's your turn" notifications.
///
/// Failures here are logged and swallowed by the orchestrator; a lost email
/// must never roll back a recorded signature.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_next(&self, document: &Document, recipient: &Recipient)
        -> Result<(), SignError>;
}

/// Append-only record of signing actions.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn record(&self, document_id: Uuid, actor: Signer, action: &str)
        -> Result<(), SignError>;
}

/// Account lookup for owner authorization.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn lookup(&self, user_id: Uuid) -> Result<Option<Principal>, SignError>;
}

/// In-memory [`DocumentStore`] with the reference versioning behavior.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<HashMap<Uuid, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn load(&self, id: Uuid) -> Result<Document, SignError> {
        self.docs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SignError::NotFound(id))
    }

    async fn save(&self, mut doc: Document) -> Result<Document, SignError> {
        let mut docs = self.docs.write().await;
        if let Some(stored) = docs.get(&doc.id) {
            if stored.version != doc.version {
                return Err(SignError::VersionConflict {
                    expected: doc.version,
                    found: stored.version,
                });
            }
        }
        doc.version += 1;
        docs.insert(doc.id, doc.clone());
        Ok(doc)
    }
}

/// In-memory [`BlobStore`] with counter-derived refs.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<BlobRef, Vec<u8>>>,
    next_id: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read_bytes(&self, blob: &BlobRef) -> Result<Vec<u8>, SignError> {
        self.blobs
            .read()
            .await
            .get(blob)
            .cloned()
            .ok_or_else(|| SignError::Persistence(format!("blob {blob} not found")))
    }

    async fn write_bytes(&self, bytes: Vec<u8>) -> Result<BlobRef, SignError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let blob = BlobRef(format!("mem-{id}"));
        self.blobs.write().await.insert(blob.clone(), bytes);
        Ok(blob)
    }
}

/// A notification as recorded by [`MemoryNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub document_id: Uuid,
    pub recipient_id: Uuid,
    pub email: String,
}

/// Records notifications instead of sending them.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: RwLock<Vec<SentNotification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentNotification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify_next(
        &self,
        document: &Document,
        recipient: &Recipient,
    ) -> Result<(), SignError> {
        self.sent.write().await.push(SentNotification {
            document_id: document.id,
            recipient_id: recipient.id,
            email: recipient.email.clone(),
        });
        Ok(())
    }
}

/// One audit line as recorded by [`MemoryAuditLogger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub document_id: Uuid,
    pub actor: Signer,
    pub action: String,
}

/// Records audit entries in order.
#[derive(Debug, Default)]
pub struct MemoryAuditLogger {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditLogger for MemoryAuditLogger {
    async fn record(
        &self,
        document_id: Uuid,
        actor: Signer,
        action: &str,
    ) -> Result<(), SignError> {
        self.entries.write().await.push(AuditEntry {
            document_id,
            actor,
            action: action.to_string(),
        });
        Ok(())
    }
}

/// Fixed account table, enough for tests and single-tenant deployments.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    principals: HashMap<Uuid, Principal>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, principal: Principal) -> Self {
        self.principals.insert(principal.user_id, principal);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn lookup(&self, user_id: Uuid) -> Result<Option<Principal>, SignError> {
        Ok(self.principals.get(&user_id).cloned())
    }
}
