//! Authorization guard for slot and swap operations
//!
//! Authorization is ownership equality. The checks here run against state
//! read inside the acting transaction, and every write that follows repeats
//! the ownership condition in its WHERE clause.

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Slot, SlotStatus};

/// Generic failure for owner-initiated slot changes
pub const INVALID_REQUEST: &str = "invalid request";
/// The proposer's own slot is missing, not theirs, or not swappable
pub const INVALID_OFFERED_SLOT: &str = "invalid or non-swappable slot";
/// The desired slot is missing, the proposer's own, or not swappable
pub const INVALID_TARGET_SLOT: &str = "target slot invalid or no longer swappable";
/// The request cannot be answered by this caller
pub const NOT_RESPONDABLE: &str = "swap request not found, not yours, or no longer pending";

/// Status changes a slot owner may make directly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerAction {
    /// List a busy slot on the marketplace
    MakeSwappable,
    /// Withdraw a listed slot from the marketplace
    MakeBusy,
}

impl OwnerAction {
    /// The (from, to) status pair this action is allowed to perform.
    ///
    /// SWAP_PENDING never appears: a pinned slot only moves through the
    /// swap engine's respond path.
    pub fn transition(self) -> (SlotStatus, SlotStatus) {
        match self {
            OwnerAction::MakeSwappable => (SlotStatus::Busy, SlotStatus::Swappable),
            OwnerAction::MakeBusy => (SlotStatus::Swappable, SlotStatus::Busy),
        }
    }
}

/// Check the slot a proposer offers: theirs and swappable
pub fn ensure_offered_slot(slot: Option<Slot>, requester_id: Uuid) -> Result<Slot> {
    match slot {
        Some(slot) if slot.is_owned_by(requester_id) && slot.status == SlotStatus::Swappable => {
            Ok(slot)
        }
        _ => Err(Error::precondition(INVALID_OFFERED_SLOT)),
    }
}

/// Check the slot a proposer wants: someone else's and swappable
pub fn ensure_target_slot(slot: Option<Slot>, requester_id: Uuid) -> Result<Slot> {
    match slot {
        Some(slot) if !slot.is_owned_by(requester_id) && slot.status == SlotStatus::Swappable => {
            Ok(slot)
        }
        _ => Err(Error::precondition(INVALID_TARGET_SLOT)),
    }
}

/// A slot is only shown in full to its owner
pub fn ensure_owner(slot: Option<Slot>, user_id: Uuid) -> Result<Slot> {
    match slot {
        Some(slot) if slot.is_owned_by(user_id) => Ok(slot),
        _ => Err(Error::precondition(INVALID_REQUEST)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn slot(owner: Uuid, status: SlotStatus) -> Slot {
        let now = Utc::now();
        let mut slot = Slot::new(owner, "s".into(), now, now + chrono::Duration::hours(1));
        slot.status = status;
        slot
    }

    #[test]
    fn test_owner_transitions_never_touch_pinned() {
        for action in [OwnerAction::MakeSwappable, OwnerAction::MakeBusy] {
            let (from, to) = action.transition();
            assert_ne!(from, SlotStatus::SwapPending);
            assert_ne!(to, SlotStatus::SwapPending);
        }
    }

    #[test]
    fn test_offered_slot_rules() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(ensure_offered_slot(Some(slot(me, SlotStatus::Swappable)), me).is_ok());
        assert!(ensure_offered_slot(Some(slot(me, SlotStatus::Busy)), me).is_err());
        assert!(ensure_offered_slot(Some(slot(other, SlotStatus::Swappable)), me).is_err());
        assert!(ensure_offered_slot(None, me).is_err());
    }

    #[test]
    fn test_target_slot_rules() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(ensure_target_slot(Some(slot(other, SlotStatus::Swappable)), me).is_ok());
        assert!(ensure_target_slot(Some(slot(other, SlotStatus::SwapPending)), me).is_err());
        assert!(ensure_target_slot(Some(slot(me, SlotStatus::Swappable)), me).is_err());

        let err = ensure_target_slot(None, me).unwrap_err();
        assert_eq!(err.public_message(), INVALID_TARGET_SLOT);
    }

    #[test]
    fn test_failures_do_not_reveal_cause() {
        let me = Uuid::new_v4();
        let missing = ensure_owner(None, me).unwrap_err().public_message();
        let foreign = ensure_owner(Some(slot(Uuid::new_v4(), SlotStatus::Busy)), me)
            .unwrap_err()
            .public_message();
        assert_eq!(missing, foreign);
    }
}
