//! Signature asset resolution
//!
//! Clients have addressed fields by several key shapes over time. The
//! resolver declares the precedence once, as an ordered list of typed key
//! constructors, and returns the first payload that answers to any of them.

use signchain_types::{Field, PayloadAsset, PayloadKey, SigningPayload};

/// Outcome of resolving a field against the submitted payloads.
///
/// `RenderText` and `NoAsset` are distinct on purpose: a field with a
/// literal value still gets drawn, a field with neither payload nor value is
/// skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A matching raster payload.
    Image(Vec<u8>),
    /// Literal text to draw (typed payload or the field's own value).
    RenderText(String),
    /// Nothing to draw; the field is skipped and logged by the caller.
    NoAsset,
}

/// The ordered candidate keys for a field, most specific first.
pub fn candidate_keys(field: &Field) -> Vec<PayloadKey> {
    let mut keys = vec![PayloadKey::FieldId { id: field.id }];
    if let Some(alias) = &field.alias {
        keys.push(PayloadKey::Alias {
            alias: alias.clone(),
        });
    }
    if let Some(recipient_id) = field.recipient_id {
        keys.push(PayloadKey::PageRecipientKind {
            page: field.page,
            recipient_id,
            field_kind: field.kind,
        });
        keys.push(PayloadKey::PageRecipient {
            page: field.page,
            recipient_id,
        });
        keys.push(PayloadKey::RecipientKind {
            recipient_id,
            field_kind: field.kind,
        });
        keys.push(PayloadKey::Recipient { recipient_id });
        keys.push(PayloadKey::Legacy {
            key: format!("{}-{}-{}", field.page, recipient_id, field.kind),
        });
    }
    keys
}

/// Resolve a field to its visual asset.
pub fn resolve(field: &Field, payloads: &[SigningPayload]) -> Resolution {
    for key in candidate_keys(field) {
        if let Some(payload) = payloads.iter().find(|p| p.matches(&key)) {
            return match &payload.asset {
                PayloadAsset::Image { data } => Resolution::Image(data.clone()),
                PayloadAsset::Text { text } => Resolution::RenderText(text.clone()),
            };
        }
    }
    if field.kind.is_text_renderable() {
        if let Some(value) = &field.value {
            return Resolution::RenderText(value.clone());
        }
    }
    Resolution::NoAsset
}
