//! Recipient ordering state machine
//!
//! `waiting -> pending -> signed | declined`. At most one recipient is
//! `pending` at any time: the lowest `signing_order` not yet terminal. All
//! structural changes (add/remove/reorder) go through [`recompute`], which
//! re-derives every status from the ordered list instead of patching
//! statuses inline.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use signchain_types::{NextSigner, Recipient, SignError, SignatureStatus};

/// Validate the ordering invariant: distinct positive `signing_order`.
pub fn validate_orders(recipients: &[Recipient]) -> Result<(), SignError> {
    let mut seen = std::collections::HashSet::new();
    for r in recipients {
        if r.signing_order == 0 {
            return Err(SignError::Validation(format!(
                "recipient {} has signing_order 0; orders start at 1",
                r.id
            )));
        }
        if !seen.insert(r.signing_order) {
            return Err(SignError::Validation(format!(
                "duplicate signing_order {}",
                r.signing_order
            )));
        }
    }
    Ok(())
}

/// The lowest-order recipient not yet signed or declined.
pub fn next_to_sign(recipients: &[Recipient]) -> Option<&Recipient> {
    recipients
        .iter()
        .filter(|r| !r.status.is_terminal())
        .min_by_key(|r| r.signing_order)
}

/// True iff this recipient is the one currently allowed to sign.
///
/// The pending invariant is maintained by the mutators, not recomputed per
/// call.
pub fn can_sign(recipients: &[Recipient], recipient_id: Uuid) -> bool {
    recipients
        .iter()
        .any(|r| r.id == recipient_id && r.status == SignatureStatus::Pending)
}

fn next_signer_hint(recipients: &[Recipient]) -> Option<NextSigner> {
    next_to_sign(recipients).map(|r| NextSigner {
        recipient_id: r.id,
        name: r.name.clone(),
    })
}

/// Re-derive every status from the ordered list.
///
/// Terminal states are preserved; the first non-terminal recipient becomes
/// `pending` (gaining `eligible_at` if it was not already eligible), the
/// rest fall back to `waiting`. The single entry point after any structural
/// change, so no orphaned `pending` states survive a reorder.
pub fn recompute(recipients: &mut [Recipient], now: DateTime<Utc>) {
    let next_id = next_to_sign(recipients).map(|r| r.id);
    for r in recipients.iter_mut() {
        if r.status.is_terminal() {
            continue;
        }
        if Some(r.id) == next_id {
            if r.status != SignatureStatus::Pending {
                r.status = SignatureStatus::Pending;
                r.eligible_at = Some(now);
            }
        } else {
            r.status = SignatureStatus::Waiting;
            r.eligible_at = None;
        }
    }
}

fn mark_terminal(
    recipients: &mut [Recipient],
    recipient_id: Uuid,
    to: SignatureStatus,
    now: DateTime<Utc>,
) -> Result<(), SignError> {
    let Some(idx) = recipients.iter().position(|r| r.id == recipient_id) else {
        return Err(SignError::Validation(format!(
            "recipient {recipient_id} not on document"
        )));
    };
    if recipients[idx].status != SignatureStatus::Pending {
        return Err(SignError::OutOfOrder {
            next: next_signer_hint(recipients),
        });
    }
    recipients[idx].status = to;
    if to == SignatureStatus::Signed {
        recipients[idx].signed_at = Some(now);
    } else {
        recipients[idx].declined_at = Some(now);
    }
    // Promote whoever is next in line.
    recompute(recipients, now);
    Ok(())
}

/// Record a signature. Requires the recipient to be `pending`, then
/// promotes the next in line.
pub fn mark_signed(
    recipients: &mut [Recipient],
    recipient_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), SignError> {
    mark_terminal(recipients, recipient_id, SignatureStatus::Signed, now)
}

/// Record a decline. Terminal for the recipient; the sequence still moves
/// on so remaining signers are not blocked.
pub fn mark_declined(
    recipients: &mut [Recipient],
    recipient_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), SignError> {
    mark_terminal(recipients, recipient_id, SignatureStatus::Declined, now)
}

/// All recipients signed (and none declined). Empty lists do not count.
pub fn all_signed(recipients: &[Recipient]) -> bool {
    !recipients.is_empty()
        && recipients
            .iter()
            .all(|r| r.status == SignatureStatus::Signed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn three() -> Vec<Recipient> {
        let mut rs = vec![
            Recipient::new("Alice", "alice@example.com", 1),
            Recipient::new("Bob", "bob@example.com", 2),
            Recipient::new("Carol", "carol@example.com", 3),
        ];
        recompute(&mut rs, Utc::now());
        rs
    }

    #[test]
    fn recompute_promotes_lowest_order() {
        let rs = three();
        assert_eq!(rs[0].status, SignatureStatus::Pending);
        assert!(rs[0].eligible_at.is_some());
        assert_eq!(rs[1].status, SignatureStatus::Waiting);
        assert_eq!(rs[2].status, SignatureStatus::Waiting);
    }

    #[test]
    fn out_of_order_sign_names_next() {
        let mut rs = three();
        let bob = rs[1].id;
        let err = mark_signed(&mut rs, bob, Utc::now()).unwrap_err();
        match err {
            SignError::OutOfOrder { next: Some(next) } => {
                assert_eq!(next.recipient_id, rs[0].id);
                assert_eq!(next.name, "Alice");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn signing_promotes_in_sequence() {
        let mut rs = three();
        let (a, b, c) = (rs[0].id, rs[1].id, rs[2].id);

        mark_signed(&mut rs, a, Utc::now()).unwrap();
        assert_eq!(rs[0].status, SignatureStatus::Signed);
        assert!(rs[0].signed_at.is_some());
        assert_eq!(rs[1].status, SignatureStatus::Pending);

        mark_signed(&mut rs, b, Utc::now()).unwrap();
        assert_eq!(rs[2].status, SignatureStatus::Pending);

        mark_signed(&mut rs, c, Utc::now()).unwrap();
        assert!(all_signed(&rs));
        assert_eq!(next_to_sign(&rs), None);
    }

    #[test]
    fn double_sign_is_rejected() {
        let mut rs = three();
        let a = rs[0].id;
        mark_signed(&mut rs, a, Utc::now()).unwrap();
        let err = mark_signed(&mut rs, a, Utc::now()).unwrap_err();
        assert!(matches!(err, SignError::OutOfOrder { .. }));
    }

    #[test]
    fn decline_is_terminal_but_sequence_continues() {
        let mut rs = three();
        let a = rs[0].id;
        mark_declined(&mut rs, a, Utc::now()).unwrap();
        assert_eq!(rs[0].status, SignatureStatus::Declined);
        assert_eq!(rs[1].status, SignatureStatus::Pending);
        assert!(!all_signed(&rs));
    }

    #[test]
    fn decline_stamps_declined_at_not_signed_at() {
        let mut rs = three();
        let a = rs[0].id;
        mark_declined(&mut rs, a, Utc::now()).unwrap();
        assert!(rs[0].declined_at.is_some());
        assert_eq!(rs[0].signed_at, None);

        let b = rs[1].id;
        mark_signed(&mut rs, b, Utc::now()).unwrap();
        assert!(rs[1].signed_at.is_some());
        assert_eq!(rs[1].declined_at, None);
    }

    #[test]
    fn declined_documents_never_report_all_signed() {
        let mut rs = three();
        let ids: Vec<Uuid> = rs.iter().map(|r| r.id).collect();
        mark_declined(&mut rs, ids[0], Utc::now()).unwrap();
        mark_signed(&mut rs, ids[1], Utc::now()).unwrap();
        mark_signed(&mut rs, ids[2], Utc::now()).unwrap();
        assert!(!all_signed(&rs));
    }

    #[test]
    fn recompute_heals_orphaned_pending() {
        let mut rs = three();
        // Simulate a reorder that left a mid-list pending behind.
        rs[0].signing_order = 5;
        recompute(&mut rs, Utc::now());
        assert_eq!(rs[1].status, SignatureStatus::Pending, "Bob is now lowest");
        assert_eq!(rs[0].status, SignatureStatus::Waiting);
    }

    #[test]
    fn single_recipient_is_immediately_pending() {
        let mut rs = vec![Recipient::new("Solo", "solo@example.com", 1)];
        recompute(&mut rs, Utc::now());
        assert_eq!(rs[0].status, SignatureStatus::Pending);
        assert!(can_sign(&rs, rs[0].id));
    }

    #[test]
    fn duplicate_orders_rejected() {
        let rs = vec![
            Recipient::new("A", "a@example.com", 1),
            Recipient::new("B", "b@example.com", 1),
        ];
        assert!(matches!(
            validate_orders(&rs),
            Err(SignError::Validation(_))
        ));
    }

    #[test]
    fn zero_order_rejected() {
        let rs = vec![Recipient::new("A", "a@example.com", 0)];
        assert!(validate_orders(&rs).is_err());
    }

    #[test]
    fn empty_list_has_no_next() {
        assert_eq!(next_to_sign(&[]), None);
        assert!(!all_signed(&[]));
    }
}
