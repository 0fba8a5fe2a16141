//! Core data types for documents, fields, recipients, and signing payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::DocumentStatus;

/// Opaque reference to bytes held by a blob store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(pub String);

impl std::fmt::Display for BlobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A field's position and size as fractions of page width/height.
///
/// This is the single geometry representation the embedding engine consumes:
/// all values lie in `[0, 1]`, with `x + w <= 1` and `y + h <= 1`. The y axis
/// runs top-down (client convention); the PDF bottom-left flip happens at
/// draw time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl CanonicalRect {
    /// All components finite and non-negative, with a positive-size box that
    /// stays inside the unit square.
    pub fn is_canonical(&self) -> bool {
        [self.x, self.y, self.w, self.h]
            .iter()
            .all(|v| v.is_finite())
            && self.x >= 0.0
            && self.y >= 0.0
            && self.w > 0.0
            && self.h > 0.0
            && self.x + self.w <= 1.0 + 1e-9
            && self.y + self.h <= 1.0 + 1e-9
    }
}

/// What kind of mark a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Signature,
    Initial,
    Date,
    Text,
    Name,
    Email,
    Phone,
    Address,
}

impl FieldKind {
    /// Signature-style kinds render literal text in a cursive register.
    pub fn is_signature_style(self) -> bool {
        matches!(self, FieldKind::Signature | FieldKind::Initial)
    }

    /// Every kind can fall back to rendering a literal value as text.
    pub fn is_text_renderable(self) -> bool {
        true
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FieldKind::Signature => "signature",
            FieldKind::Initial => "initial",
            FieldKind::Date => "date",
            FieldKind::Text => "text",
            FieldKind::Name => "name",
            FieldKind::Email => "email",
            FieldKind::Phone => "phone",
            FieldKind::Address => "address",
        };
        write!(f, "{}", s)
    }
}

/// One placeable mark on a document page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: Uuid,
    /// Owning recipient, or `None` for an unassigned placeholder the owner
    /// fills through the bypass path.
    pub recipient_id: Option<Uuid>,
    pub kind: FieldKind,
    /// 1-based page number.
    pub page: u32,
    pub rect: CanonicalRect,
    /// Literal value for text-like kinds.
    #[serde(default)]
    pub value: Option<String>,
    /// Chosen font/style id, mapped to a PDF standard font at draw time.
    #[serde(default)]
    pub font: Option<String>,
    /// Legacy client-side field id kept for payload lookup compatibility.
    #[serde(default)]
    pub alias: Option<String>,
}

/// Per-recipient signing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    Waiting,
    Pending,
    Signed,
    Declined,
}

impl SignatureStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SignatureStatus::Signed | SignatureStatus::Declined)
    }
}

impl std::fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignatureStatus::Waiting => "waiting",
            SignatureStatus::Pending => "pending",
            SignatureStatus::Signed => "signed",
            SignatureStatus::Declined => "declined",
        };
        write!(f, "{}", s)
    }
}

/// One signing party, ordered by `signing_order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Distinct positive integer defining the signing sequence.
    pub signing_order: u32,
    pub status: SignatureStatus,
    #[serde(default)]
    pub notified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub eligible_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub declined_at: Option<DateTime<Utc>>,
}

impl Recipient {
    pub fn new(name: impl Into<String>, email: impl Into<String>, signing_order: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            signing_order,
            status: SignatureStatus::Waiting,
            notified_at: None,
            eligible_at: None,
            signed_at: None,
            declined_at: None,
        }
    }
}

/// The signable artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    /// The original upload. Never rewritten.
    pub original_pdf: BlobRef,
    /// The current accumulated revision, replaced after each signing pass.
    #[serde(default)]
    pub signed_revision: Option<BlobRef>,
    /// Set only when `status` is `Final`.
    #[serde(default)]
    pub final_pdf: Option<BlobRef>,
    pub page_count: u32,
    pub fields: Vec<Field>,
    pub recipients: Vec<Recipient>,
    pub status: DocumentStatus,
    /// Optimistic concurrency token, bumped by the store on every save.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        owner_id: Uuid,
        name: impl Into<String>,
        original_pdf: BlobRef,
        page_count: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            original_pdf,
            signed_revision: None,
            final_pdf: None,
            page_count,
            fields: Vec::new(),
            recipients: Vec::new(),
            status: DocumentStatus::Draft,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The bytes the next embedding pass builds on: the latest signed
    /// revision if one exists, the original upload otherwise.
    pub fn base_revision(&self) -> &BlobRef {
        self.signed_revision.as_ref().unwrap_or(&self.original_pdf)
    }

    pub fn recipient(&self, id: Uuid) -> Option<&Recipient> {
        self.recipients.iter().find(|r| r.id == id)
    }

    pub fn field(&self, id: Uuid) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }
}

/// The calling party of a signing request.
///
/// An explicit tagged variant: owners bypass order checks entirely and never
/// consume a signing slot, recipients go through the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Signer {
    Owner { user_id: Uuid },
    Recipient { recipient_id: Uuid },
}

impl std::fmt::Display for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signer::Owner { user_id } => write!(f, "owner:{}", user_id),
            Signer::Recipient { recipient_id } => write!(f, "recipient:{}", recipient_id),
        }
    }
}

/// Lookup key attached to a submitted signing payload.
///
/// Clients have historically addressed fields in several formats; the
/// resolver tries a declared, ordered list of these constructors rather than
/// ad hoc string concatenation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadKey {
    FieldId { id: Uuid },
    Alias { alias: String },
    PageRecipientKind {
        page: u32,
        recipient_id: Uuid,
        field_kind: FieldKind,
    },
    PageRecipient { page: u32, recipient_id: Uuid },
    RecipientKind {
        recipient_id: Uuid,
        field_kind: FieldKind,
    },
    Recipient { recipient_id: Uuid },
    /// Hyphen-joined `page-recipient-kind` triple still sent by old clients.
    Legacy { key: String },
}

/// The visual asset carried by one payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayloadAsset {
    /// Raster image bytes (PNG or JPEG) from a drawn signature.
    Image { data: Vec<u8> },
    /// Literal text from a typed signature or text field.
    Text { text: String },
}

/// One submitted asset, tagged with the keys it answers to. Ephemeral:
/// consumed during a single embedding pass and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningPayload {
    pub keys: Vec<PayloadKey>,
    pub asset: PayloadAsset,
}

impl SigningPayload {
    pub fn image(keys: Vec<PayloadKey>, data: Vec<u8>) -> Self {
        Self {
            keys,
            asset: PayloadAsset::Image { data },
        }
    }

    pub fn text(keys: Vec<PayloadKey>, text: impl Into<String>) -> Self {
        Self {
            keys,
            asset: PayloadAsset::Text { text: text.into() },
        }
    }

    pub fn matches(&self, key: &PayloadKey) -> bool {
        self.keys.contains(key)
    }
}
