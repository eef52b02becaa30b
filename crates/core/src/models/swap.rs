//! Swap request model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Swap request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwapStatus {
    /// Proposed, awaiting the receiver's answer
    Pending,
    /// Owners exchanged
    Accepted,
    /// Declined, slots returned to the marketplace
    Rejected,
}

impl SwapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStatus::Pending => "PENDING",
            SwapStatus::Accepted => "ACCEPTED",
            SwapStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(SwapStatus::Pending),
            "ACCEPTED" => Some(SwapStatus::Accepted),
            "REJECTED" => Some(SwapStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposal to exchange two slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub id: Uuid,
    /// Slot offered by the proposer
    pub requester_slot_id: Uuid,
    /// Slot the proposer wants
    pub receiver_slot_id: Uuid,
    /// Proposing user, captured at creation
    pub requester_id: Uuid,
    /// Receiving user, captured at creation
    pub receiver_id: Uuid,
    pub status: SwapStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SwapRequest {
    pub fn new(
        requester_slot_id: Uuid,
        receiver_slot_id: Uuid,
        requester_id: Uuid,
        receiver_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            requester_slot_id,
            receiver_slot_id,
            requester_id,
            receiver_id,
            status: SwapStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A pending request joined with the current owners of both slots.
///
/// Owners are read once inside the responding transaction and reused for
/// the ownership exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSwap {
    pub request_id: Uuid,
    pub requester_slot_id: Uuid,
    pub requester_slot_owner: Uuid,
    pub receiver_slot_id: Uuid,
    pub receiver_slot_owner: Uuid,
}
