//! The signing orchestrator
//!
//! One entry point per signing action, each of which runs under a
//! per-document async mutex so concurrent requests against the same document
//! serialize instead of racing read-modify-write cycles. The optimistic
//! version check in the store stays as a second line of defense against
//! out-of-band writers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use signchain_pdf::{
    embed, normalize, page_dimensions, Mark, MarkJob, RawFieldPosition, Viewport,
};
use signchain_types::{
    Document, DocumentStatus, Field, Recipient, SignError, Signer, SigningPayload,
};

use crate::assets::{resolve, Resolution};
use crate::recipients;
use crate::store::{AuditLogger, BlobStore, DocumentStore, IdentityProvider, Notifier};

/// One signing submission.
#[derive(Debug, Clone)]
pub struct SignRequest {
    pub document_id: Uuid,
    pub signer: Signer,
    pub payloads: Vec<SigningPayload>,
    /// Raw client geometry per field id. Fields not listed keep their stored
    /// rectangle.
    pub positions: HashMap<Uuid, RawFieldPosition>,
    /// The client's render viewport, if it reported one.
    pub viewport: Option<Viewport>,
}

impl SignRequest {
    pub fn new(document_id: Uuid, signer: Signer, payloads: Vec<SigningPayload>) -> Self {
        Self {
            document_id,
            signer,
            payloads,
            positions: HashMap::new(),
            viewport: None,
        }
    }
}

/// What a signing pass did.
#[derive(Debug, Clone)]
pub struct SignOutcome {
    /// The saved document, carrying the store's new version.
    pub document: Document,
    pub embedded_fields: Vec<Uuid>,
    /// Fields that resolved to no asset and were skipped.
    pub skipped_fields: Vec<Uuid>,
    /// True when this pass took the document to `Final`.
    pub completed: bool,
}

/// Coordinates stores, the PDF engine, and the recipient state machine.
pub struct Orchestrator {
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditLogger>,
    identity: Arc<dyn IdentityProvider>,
    /// Per-document serialization points, created on first touch.
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditLogger>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            documents,
            blobs,
            notifier,
            audit,
            identity,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn doc_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id).or_default().clone()
    }

    /// Drop a document's lock entry once no caller holds it. Safe under the
    /// map mutex: new clones are only handed out through [`Self::doc_lock`],
    /// which waits on the same mutex, so a strong count of one means the map
    /// holds the last reference.
    async fn evict_lock(&self, id: Uuid) {
        let mut locks = self.locks.lock().await;
        if locks.get(&id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&id);
        }
    }

    /// Number of live per-document lock entries.
    pub async fn lock_entries(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Upload a new document. Page count comes from parsing the bytes, so a
    /// broken upload fails here rather than at first signing.
    pub async fn create_document(
        &self,
        owner_id: Uuid,
        name: &str,
        pdf_bytes: Vec<u8>,
    ) -> Result<Document, SignError> {
        let dims =
            page_dimensions(&pdf_bytes).map_err(|e| SignError::Validation(e.to_string()))?;
        if dims.is_empty() {
            return Err(SignError::Validation("document has no pages".into()));
        }
        let page_count = dims.len() as u32;
        let original = self.blobs.write_bytes(pdf_bytes).await?;
        let doc = Document::new(owner_id, name, original, page_count, Utc::now());
        let saved = self.documents.save(doc).await?;
        self.record(saved.id, Signer::Owner { user_id: owner_id }, "created")
            .await;
        Ok(saved)
    }

    /// Replace the field layout. Draft only.
    pub async fn update_fields(
        &self,
        document_id: Uuid,
        fields: Vec<Field>,
    ) -> Result<Document, SignError> {
        let lock = self.doc_lock(document_id).await;
        let _guard = lock.lock().await;

        let mut doc = self.documents.load(document_id).await?;
        if doc.status != DocumentStatus::Draft {
            return Err(SignError::Validation(format!(
                "fields can only change while draft, document is {}",
                doc.status
            )));
        }
        for f in &fields {
            if f.page == 0 || f.page > doc.page_count {
                return Err(SignError::Validation(format!(
                    "field {} targets page {} of {}",
                    f.id, f.page, doc.page_count
                )));
            }
            if !f.rect.is_canonical() {
                return Err(SignError::Geometry(format!(
                    "field {} rect {:?} is outside the unit square",
                    f.id, f.rect
                )));
            }
        }
        doc.fields = fields;
        doc.updated_at = Utc::now();
        self.documents.save(doc).await
    }

    /// Replace the recipient list. Draft only; orders must be distinct and
    /// positive, and statuses are re-derived from scratch.
    pub async fn update_recipients(
        &self,
        document_id: Uuid,
        recipients: Vec<Recipient>,
    ) -> Result<Document, SignError> {
        let lock = self.doc_lock(document_id).await;
        let _guard = lock.lock().await;

        let mut doc = self.documents.load(document_id).await?;
        if doc.status != DocumentStatus::Draft {
            return Err(SignError::Validation(format!(
                "recipients can only change while draft, document is {}",
                doc.status
            )));
        }
        recipients::validate_orders(&recipients)?;
        doc.recipients = recipients;
        recipients::recompute(&mut doc.recipients, Utc::now());
        doc.updated_at = Utc::now();
        self.documents.save(doc).await
    }

    /// Move a draft into circulation: `draft -> processing -> active`, with
    /// the first recipient promoted and notified.
    pub async fn activate(&self, document_id: Uuid) -> Result<Document, SignError> {
        let lock = self.doc_lock(document_id).await;
        let _guard = lock.lock().await;

        let mut doc = self.documents.load(document_id).await?;
        if doc.recipients.is_empty() {
            return Err(SignError::Validation(
                "cannot activate a document with no recipients".into(),
            ));
        }
        recipients::validate_orders(&doc.recipients)?;

        let now = Utc::now();
        doc.status = doc.status.transition(DocumentStatus::Processing)?;
        recipients::recompute(&mut doc.recipients, now);
        stamp_notified(&mut doc, now);
        doc.status = doc.status.transition(DocumentStatus::Active)?;
        doc.updated_at = now;
        let saved = self.documents.save(doc).await?;

        self.notify_pending(&saved).await;
        self.record(
            saved.id,
            Signer::Owner {
                user_id: saved.owner_id,
            },
            "activated",
        )
        .await;
        Ok(saved)
    }

    /// Retire a document. Valid from draft, active, or final.
    pub async fn archive(&self, document_id: Uuid) -> Result<Document, SignError> {
        let lock = self.doc_lock(document_id).await;
        let saved = {
            let _guard = lock.lock().await;
            let mut doc = self.documents.load(document_id).await?;
            doc.status = doc.status.transition(DocumentStatus::Archived)?;
            doc.updated_at = Utc::now();
            self.documents.save(doc).await?
        };
        drop(lock);

        // Archived documents accept no further passes, so the serialization
        // point can go instead of living for the process lifetime.
        self.evict_lock(document_id).await;
        Ok(saved)
    }

    /// Run one signing pass: authorize, resolve, embed, persist, advance.
    ///
    /// Nothing is persisted until the new revision bytes exist, so a failed
    /// pass leaves both the document record and the previous revision
    /// untouched.
    pub async fn sign(&self, request: SignRequest) -> Result<SignOutcome, SignError> {
        let lock = self.doc_lock(request.document_id).await;
        let _guard = lock.lock().await;

        let mut doc = self.documents.load(request.document_id).await?;
        if doc.status != DocumentStatus::Active {
            return Err(SignError::Validation(format!(
                "document is {}, not active",
                doc.status
            )));
        }
        self.authorize(&doc, request.signer).await?;

        let base = self.blobs.read_bytes(doc.base_revision()).await?;
        let dims = page_dimensions(&base).map_err(|e| SignError::Embedding(e.to_string()))?;

        let signer = request.signer;
        let owns = move |f: &Field| match signer {
            Signer::Recipient { recipient_id } => f.recipient_id == Some(recipient_id),
            Signer::Owner { .. } => f.recipient_id.is_none(),
        };

        // Fold any submitted geometry into the stored layout first, so the
        // rectangles we draw with are the ones that persist. Only the
        // caller's own fields move; positions keyed to anyone else's fields
        // are ignored.
        for field in doc.fields.iter_mut().filter(|f| owns(f)) {
            let Some(raw) = request.positions.get(&field.id) else {
                continue;
            };
            let page = field
                .page
                .checked_sub(1)
                .and_then(|i| dims.get(i as usize));
            let Some(page) = page else {
                return Err(SignError::Geometry(format!(
                    "field {} targets missing page {}",
                    field.id, field.page
                )));
            };
            field.rect = normalize(raw, *page, request.viewport)
                .map_err(|e| SignError::Geometry(e.to_string()))?;
        }

        let mine: Vec<Field> = doc.fields.iter().filter(|f| owns(f)).cloned().collect();

        let mut jobs = Vec::new();
        let mut embedded_fields = Vec::new();
        let mut skipped_fields = Vec::new();
        for field in &mine {
            let mark = match resolve(field, &request.payloads) {
                Resolution::Image(data) => Mark::Image(data),
                Resolution::RenderText(text) => Mark::Text {
                    text,
                    cursive: field.kind.is_signature_style(),
                    font: field.font.clone(),
                },
                Resolution::NoAsset => {
                    warn!(field = %field.id, kind = %field.kind, "no asset resolved, skipping field");
                    skipped_fields.push(field.id);
                    continue;
                }
            };
            embedded_fields.push(field.id);
            jobs.push(MarkJob {
                field_id: field.id,
                page: field.page,
                rect: field.rect,
                mark,
            });
        }

        let revision = tokio::task::spawn_blocking(move || embed(&base, &jobs))
            .await
            .map_err(|e| SignError::Embedding(format!("embed task panicked: {e}")))?
            .map_err(|e| SignError::Embedding(e.to_string()))?;
        let revision_ref = self.blobs.write_bytes(revision).await?;

        let now = Utc::now();
        doc.signed_revision = Some(revision_ref.clone());
        if let Signer::Recipient { recipient_id } = request.signer {
            recipients::mark_signed(&mut doc.recipients, recipient_id, now)?;
        }
        let completed =
            doc.status == DocumentStatus::Active && recipients::all_signed(&doc.recipients);
        if completed {
            doc.status = doc.status.transition(DocumentStatus::Final)?;
            doc.final_pdf = Some(revision_ref);
        } else {
            stamp_notified(&mut doc, now);
        }
        doc.updated_at = now;
        let saved = self.documents.save(doc).await?;

        info!(
            document = %saved.id,
            signer = %request.signer,
            embedded = embedded_fields.len(),
            skipped = skipped_fields.len(),
            completed,
            "signing pass persisted"
        );
        if !completed {
            self.notify_pending(&saved).await;
        }
        self.record(saved.id, request.signer, "signed").await;

        Ok(SignOutcome {
            document: saved,
            embedded_fields,
            skipped_fields,
            completed,
        })
    }

    /// Record a decline. Terminal for the recipient; the chain moves on but
    /// the document can no longer reach `Final`.
    pub async fn decline(
        &self,
        document_id: Uuid,
        recipient_id: Uuid,
    ) -> Result<Document, SignError> {
        let lock = self.doc_lock(document_id).await;
        let _guard = lock.lock().await;

        let mut doc = self.documents.load(document_id).await?;
        if doc.status != DocumentStatus::Active {
            return Err(SignError::Validation(format!(
                "document is {}, not active",
                doc.status
            )));
        }
        let now = Utc::now();
        recipients::mark_declined(&mut doc.recipients, recipient_id, now)?;
        stamp_notified(&mut doc, now);
        doc.updated_at = now;
        let saved = self.documents.save(doc).await?;

        self.notify_pending(&saved).await;
        self.record(saved.id, Signer::Recipient { recipient_id }, "declined")
            .await;
        Ok(saved)
    }

    async fn authorize(&self, doc: &Document, signer: Signer) -> Result<(), SignError> {
        match signer {
            Signer::Recipient { recipient_id } => {
                if doc.recipient(recipient_id).is_none() {
                    return Err(SignError::Validation(format!(
                        "recipient {recipient_id} not on document"
                    )));
                }
                if !recipients::can_sign(&doc.recipients, recipient_id) {
                    return Err(SignError::OutOfOrder {
                        next: recipients::next_to_sign(&doc.recipients).map(|r| {
                            signchain_types::NextSigner {
                                recipient_id: r.id,
                                name: r.name.clone(),
                            }
                        }),
                    });
                }
                Ok(())
            }
            Signer::Owner { user_id } => {
                if user_id != doc.owner_id {
                    return Err(SignError::Validation(
                        "signer is not the document owner".into(),
                    ));
                }
                if self.identity.lookup(user_id).await?.is_none() {
                    return Err(SignError::Validation(format!("unknown user {user_id}")));
                }
                Ok(())
            }
        }
    }

    /// Notify whoever is currently pending. Best effort: a delivery failure
    /// is logged, never surfaced.
    async fn notify_pending(&self, doc: &Document) {
        let Some(next) = doc
            .recipients
            .iter()
            .find(|r| r.status == signchain_types::SignatureStatus::Pending)
        else {
            return;
        };
        if let Err(e) = self.notifier.notify_next(doc, next).await {
            warn!(document = %doc.id, recipient = %next.id, error = %e, "notification failed");
        }
    }

    async fn record(&self, document_id: Uuid, actor: Signer, action: &str) {
        if let Err(e) = self.audit.record(document_id, actor, action).await {
            warn!(document = %document_id, action, error = %e, "audit write failed");
        }
    }
}

/// Stamp the currently pending recipient's `notified_at` if it is about to
/// be notified for the first time.
fn stamp_notified(doc: &mut Document, now: chrono::DateTime<Utc>) {
    if let Some(r) = doc
        .recipients
        .iter_mut()
        .find(|r| r.status == signchain_types::SignatureStatus::Pending)
    {
        if r.notified_at.is_none() {
            r.notified_at = Some(now);
        }
    }
}
