//! Slotswap Core Library
//!
//! Slot and swap-request models, SQLite storage, and the transactional swap
//! engine behind the slot marketplace.

pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod identity;
pub mod invariants;
pub mod marketplace;
pub mod models;
pub mod storage;

pub use config::{Config, IdentityConfig, IdentityEntry, ServerConfig, StoreConfig};
pub use engine::SwapEngine;
pub use error::{Error, ErrorKind, Result};
pub use identity::{Identity, IdentityProvider, StaticIdentity};
pub use invariants::AuditReport;
pub use models::*;
pub use storage::{Database, SlotRepository, SwapRepository, WriteOutcome};
