//! Slotswap Network Library
//!
//! TCP access to a [`SwapEngine`](slotswap_core::SwapEngine).
//!
//! # Architecture
//!
//! - **Server**: owns the engine, authenticates each connection once
//! - **Client**: typed calls, multiplexed over one connection by `seq`
//! - **Protocol**: Length-prefixed JSON messages
//!
//! # Usage
//!
//! ```ignore
//! let server = Server::start(addr, engine, identity, 64).await?;
//!
//! let client = Client::connect(server.addr(), "alice-token").await?;
//! let slot = client.create_slot("Standup", start, end).await?;
//! client.make_swappable(slot.id).await?;
//! ```

pub mod client;
pub mod error;
mod frame;
pub mod protocol;
pub mod server;

pub use client::Client;
pub use error::{Error, Result};
pub use frame::MAX_FRAME_SIZE;
pub use protocol::{Message, Operation, Reply};
pub use server::{Server, MAX_IN_FLIGHT};
pub use slotswap_core::config::DEFAULT_PORT;
