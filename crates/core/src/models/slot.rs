//! Time-slot model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a slot sits in the swap lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    /// Not offered for trade (default at creation)
    Busy,
    /// Listed on the marketplace
    Swappable,
    /// Pinned by exactly one pending swap request
    SwapPending,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Busy => "BUSY",
            SlotStatus::Swappable => "SWAPPABLE",
            SlotStatus::SwapPending => "SWAP_PENDING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUSY" => Some(SlotStatus::Busy),
            "SWAPPABLE" => Some(SlotStatus::Swappable),
            "SWAP_PENDING" => Some(SlotStatus::SwapPending),
            _ => None,
        }
    }
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-owned time interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub owner_id: Uuid,
    pub status: SlotStatus,
}

impl Slot {
    pub fn new(
        owner_id: Uuid,
        title: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            start_time,
            end_time,
            owner_id,
            status: SlotStatus::Busy,
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_roundtrip() {
        for status in [SlotStatus::Busy, SlotStatus::Swappable, SlotStatus::SwapPending] {
            assert_eq!(SlotStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SlotStatus::parse("swappable"), None);
    }

    #[test]
    fn test_new_slot_is_busy() {
        let now = Utc::now();
        let slot = Slot::new(
            Uuid::new_v4(),
            "Standup".to_string(),
            now,
            now + chrono::Duration::hours(1),
        );
        assert_eq!(slot.status, SlotStatus::Busy);
    }

    #[test]
    fn test_status_serializes_screaming() {
        let json = serde_json::to_string(&SlotStatus::SwapPending).unwrap();
        assert_eq!(json, "\"SWAP_PENDING\"");
    }
}
