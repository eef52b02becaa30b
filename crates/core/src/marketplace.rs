//! Read-only marketplace projections

use uuid::Uuid;

use crate::error::Result;
use crate::models::{MarketplaceSlot, MyRequests};
use crate::storage::{SlotRepository, SwapRepository};

/// Slots other users have listed, earliest first
pub fn swappable_slots<S>(store: &S, viewer_id: Uuid) -> Result<Vec<MarketplaceSlot>>
where
    S: SlotRepository + ?Sized,
{
    store.list_swappable_slots(viewer_id)
}

/// Incoming (awaiting the viewer) and outgoing (proposed by the viewer)
pub fn my_requests<S>(store: &S, viewer_id: Uuid) -> Result<MyRequests>
where
    S: SwapRepository + ?Sized,
{
    Ok(MyRequests {
        incoming: store.list_incoming(viewer_id)?,
        outgoing: store.list_outgoing(viewer_id)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IncomingRequest, OutgoingRequest, Slot, SwapStatus};
    use chrono::Utc;

    /// In-memory stand-in to exercise the projection without SQLite
    struct Fixed {
        viewer: Uuid,
    }

    impl SlotRepository for Fixed {
        fn find_slot(&self, _id: Uuid) -> Result<Option<Slot>> {
            Ok(None)
        }

        fn list_slots_for_owner(&self, _owner_id: Uuid) -> Result<Vec<Slot>> {
            Ok(Vec::new())
        }

        fn list_swappable_slots(&self, viewer_id: Uuid) -> Result<Vec<MarketplaceSlot>> {
            assert_eq!(viewer_id, self.viewer);
            Ok(Vec::new())
        }
    }

    impl SwapRepository for Fixed {
        fn list_incoming(&self, _user_id: Uuid) -> Result<Vec<IncomingRequest>> {
            Ok(vec![IncomingRequest {
                request_id: Uuid::new_v4(),
                requester_name: "alice".into(),
                offered_slot_title: "A".into(),
                my_slot_title: "B".into(),
                status: SwapStatus::Pending,
                created_at: Utc::now(),
            }])
        }

        fn list_outgoing(&self, _user_id: Uuid) -> Result<Vec<OutgoingRequest>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_my_requests_combines_lists() {
        let store = Fixed {
            viewer: Uuid::new_v4(),
        };
        let requests = my_requests(&store, store.viewer).unwrap();
        assert_eq!(requests.incoming.len(), 1);
        assert!(requests.outgoing.is_empty());
        assert!(swappable_slots(&store, store.viewer).unwrap().is_empty());
    }
}
