//! Network protocol message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire.
//!
//! A session opens with `Authenticate`, answered by `Authenticated` or
//! `AuthRejected`. After that the client sends `Request`s and the server
//! answers each with a `Response` carrying the same `seq`. Responses may
//! arrive out of order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use slotswap_core::{
    ErrorKind, MarketplaceSlot, MyRequests, Slot, SlotStatus, SwapRequest, SwapStatus,
};

/// One engine operation, performed as the authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    CreateSlot {
        title: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    GetSlot {
        slot_id: Uuid,
    },
    ListMySlots,
    MakeSwappable {
        slot_id: Uuid,
    },
    MakeBusy {
        slot_id: Uuid,
    },
    ProposeSwap {
        my_slot_id: Uuid,
        their_slot_id: Uuid,
    },
    RespondToSwap {
        request_id: Uuid,
        accepted: bool,
    },
    ListMarketplace,
    ListMyRequests,
}

impl Operation {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateSlot { .. } => "create_slot",
            Operation::GetSlot { .. } => "get_slot",
            Operation::ListMySlots => "list_my_slots",
            Operation::MakeSwappable { .. } => "make_swappable",
            Operation::MakeBusy { .. } => "make_busy",
            Operation::ProposeSwap { .. } => "propose_swap",
            Operation::RespondToSwap { .. } => "respond_to_swap",
            Operation::ListMarketplace => "list_marketplace",
            Operation::ListMyRequests => "list_my_requests",
        }
    }
}

/// Outcome of an [`Operation`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    Slot {
        slot: Slot,
    },
    Slots {
        slots: Vec<Slot>,
    },
    SlotStatus {
        slot_id: Uuid,
        status: SlotStatus,
    },
    SwapProposed {
        request: SwapRequest,
    },
    SwapResolved {
        request_id: Uuid,
        status: SwapStatus,
    },
    Marketplace {
        slots: Vec<MarketplaceSlot>,
    },
    Requests {
        requests: MyRequests,
    },
    /// The operation failed; nothing was applied
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

/// Network protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Client presents its credential
    Authenticate { credential: String },

    /// Server accepted the credential
    Authenticated { user_id: Uuid, display_name: String },

    /// Server refused the session
    AuthRejected { reason: String },

    /// Client asks for an operation
    Request { seq: u64, op: Operation },

    /// Server answers a request
    Response { seq: u64, reply: Reply },

    /// Keepalive
    Ping,

    /// Keepalive response
    Pong,
}

impl Message {
    /// Serialize message to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
