//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development,
//! plus a store audit that can be run against a live database.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PendingSwap, Slot, SlotStatus};

/// Validate that a slot's state is internally consistent
pub fn assert_slot_invariants(slot: &Slot) {
    debug_assert!(
        slot.start_time < slot.end_time,
        "Slot {} ends before it starts",
        slot.id
    );

    debug_assert!(
        slot.owner_id != Uuid::nil(),
        "Slot {} has nil owner",
        slot.id
    );
}

/// Validate the joined view of a pending swap before resolving it
pub fn assert_pending_swap_invariants(pending: &PendingSwap) {
    debug_assert!(
        pending.requester_slot_id != pending.receiver_slot_id,
        "Swap {} references slot {} on both sides",
        pending.request_id,
        pending.requester_slot_id
    );

    debug_assert!(
        pending.requester_slot_owner != pending.receiver_slot_owner,
        "Swap {} has the same owner {} on both sides",
        pending.request_id,
        pending.requester_slot_owner
    );
}

/// Validate that a freshly pinned pair of slots is consistent
pub fn assert_pinned_pair(offered: &Slot, target: &Slot) {
    debug_assert!(
        offered.owner_id != target.owner_id,
        "Slots {} and {} share owner {}",
        offered.id,
        target.id,
        offered.owner_id
    );

    debug_assert!(
        offered.status == SlotStatus::Swappable && target.status == SlotStatus::Swappable,
        "Pinning slots {} ({}) and {} ({}) that are not both swappable",
        offered.id,
        offered.status,
        target.id,
        target.status
    );
}

/// Cross-table consistency findings.
///
/// An empty report means every PENDING request pins both of its slots and
/// every pinned slot belongs to a PENDING request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    /// PENDING requests with a slot not in SWAP_PENDING
    pub unpinned_requests: Vec<Uuid>,
    /// SWAP_PENDING slots without a PENDING request
    pub orphaned_pins: Vec<Uuid>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.unpinned_requests.is_empty() && self.orphaned_pins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_slot(owner: Uuid) -> Slot {
        let now = Utc::now();
        let mut slot = Slot::new(owner, "Test".into(), now, now + chrono::Duration::minutes(30));
        slot.status = SlotStatus::Swappable;
        slot
    }

    #[test]
    fn test_valid_slot() {
        assert_slot_invariants(&make_slot(Uuid::new_v4()));
    }

    #[test]
    fn test_valid_pair() {
        assert_pinned_pair(&make_slot(Uuid::new_v4()), &make_slot(Uuid::new_v4()));
    }

    #[test]
    #[should_panic(expected = "share owner")]
    fn test_same_owner_pair_panics() {
        let owner = Uuid::new_v4();
        assert_pinned_pair(&make_slot(owner), &make_slot(owner));
    }

    #[test]
    fn test_empty_report_is_clean() {
        assert!(AuditReport::default().is_clean());
        let report = AuditReport {
            unpinned_requests: vec![Uuid::new_v4()],
            orphaned_pins: Vec::new(),
        };
        assert!(!report.is_clean());
    }
}
