//! Read-only projections returned to callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SwapStatus;

/// A tradeable slot as seen by another user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceSlot {
    pub slot_id: Uuid,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub owner_id: Uuid,
    pub owner_name: String,
}

/// A pending request waiting on the viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingRequest {
    pub request_id: Uuid,
    pub requester_name: String,
    pub offered_slot_title: String,
    pub my_slot_title: String,
    pub status: SwapStatus,
    pub created_at: DateTime<Utc>,
}

/// A request the viewer proposed, in any status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingRequest {
    pub request_id: Uuid,
    pub receiver_name: String,
    pub my_slot_title: String,
    pub desired_slot_title: String,
    pub status: SwapStatus,
    pub created_at: DateTime<Utc>,
}

/// Both request lists for one viewer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MyRequests {
    pub incoming: Vec<IncomingRequest>,
    pub outgoing: Vec<OutgoingRequest>,
}
