//! Read-side repository traits
//!
//! The marketplace projections are served through these traits so the
//! query layer does not depend on the SQLite handle directly.

use uuid::Uuid;

use crate::error::Result;
use crate::models::{IncomingRequest, MarketplaceSlot, OutgoingRequest, Slot};

/// Slot read operations
pub trait SlotRepository {
    /// Find slot by ID
    fn find_slot(&self, id: Uuid) -> Result<Option<Slot>>;

    /// List a user's slots ordered by start time
    fn list_slots_for_owner(&self, owner_id: Uuid) -> Result<Vec<Slot>>;

    /// Swappable slots not owned by the viewer
    fn list_swappable_slots(&self, viewer_id: Uuid) -> Result<Vec<MarketplaceSlot>>;
}

/// Swap request read operations
pub trait SwapRepository {
    /// Pending requests addressed to the user
    fn list_incoming(&self, user_id: Uuid) -> Result<Vec<IncomingRequest>>;

    /// Requests the user proposed
    fn list_outgoing(&self, user_id: Uuid) -> Result<Vec<OutgoingRequest>>;
}
