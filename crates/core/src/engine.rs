//! Swap engine
//!
//! Every mutating operation runs inside one `BEGIN IMMEDIATE` transaction on
//! a connection guarded by a mutex. Checks and writes share the transaction,
//! and there is a single rollback path: any `Err` drops the transaction
//! before commit.
//!
//! Slot lifecycle:
//!
//! ```text
//! BUSY --make_swappable--> SWAPPABLE --propose_swap--> SWAP_PENDING
//!   ^                          |  ^                         |
//!   +-------make_busy----------+  +------ rejected ---------+
//!   +------------------- accepted (new owner) --------------+
//! ```

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Datelike, SubsecRound, Utc};
use rusqlite::Connection;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::guard::{self, OwnerAction, INVALID_OFFERED_SLOT, INVALID_REQUEST, INVALID_TARGET_SLOT, NOT_RESPONDABLE};
use crate::invariants::{self, AuditReport};
use crate::marketplace;
use crate::models::{
    IncomingRequest, MarketplaceSlot, MyRequests, OutgoingRequest, Profile, Slot, SlotStatus,
    SwapRequest, SwapStatus,
};
use crate::storage::{Database, SlotRepository, SlotStore, SwapStore, UserStore};

/// Longest accepted slot title, in characters
pub const MAX_TITLE_LEN: usize = 200;
/// Longest accepted display name, in characters
pub const MAX_DISPLAY_NAME_LEN: usize = 100;

fn require_id(id: Uuid, what: &str) -> Result<()> {
    if id.is_nil() {
        return Err(Error::validation(format!("missing {what}")));
    }
    Ok(())
}

fn require_text(value: &str, what: &str, max_len: usize) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{what} must not be empty")));
    }
    if trimmed.chars().count() > max_len {
        return Err(Error::validation(format!(
            "{what} longer than {max_len} characters"
        )));
    }
    Ok(())
}

/// Truncate to the stored microsecond precision and keep the year within
/// the four digits the text encoding sorts correctly
fn storable_time(value: DateTime<Utc>, what: &str) -> Result<DateTime<Utc>> {
    if !(0..=9999).contains(&value.year()) {
        return Err(Error::validation(format!(
            "{what} must fall between years 0000 and 9999"
        )));
    }
    Ok(value.trunc_subsecs(6))
}

/// Transactional orchestrator for slots and swap requests
pub struct SwapEngine {
    db: Mutex<Database>,
}

impl SwapEngine {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open the configured database, creating its directory if needed
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let path = config.database_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open_with_timeout(&path, config.busy_timeout())?;
        info!(
            path = %path.display(),
            schema_version = db.schema_version()?,
            "Swap engine ready"
        );
        Ok(Self::new(db))
    }

    /// Engine over a fresh in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| Error::Unavailable("database handle poisoned".into()))
    }

    /// Run `f` in one write transaction, committing only if it succeeds
    fn in_transaction<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let result: Result<T> = (|| {
            let mut db = self.lock()?;
            let tx = db.begin()?;
            let value = f(&*tx)?;
            tx.commit()?;
            Ok(value)
        })();

        if let Err(e) = &result {
            match e.kind() {
                ErrorKind::Store => warn!(op, error = %e, "Transaction rolled back"),
                _ => debug!(op, error = %e, "Operation rejected"),
            }
        }
        result
    }

    /// Record or rename the display profile for an authenticated user
    #[instrument(skip(self, display_name))]
    pub fn register_profile(&self, user_id: Uuid, display_name: &str) -> Result<Profile> {
        require_id(user_id, "user id")?;
        require_text(display_name, "display name", MAX_DISPLAY_NAME_LEN)?;

        let profile = Profile::new(user_id, display_name.trim().to_string());
        self.in_transaction("register_profile", |conn| UserStore::new(conn).upsert(&profile))?;
        Ok(profile)
    }

    /// Create a BUSY slot for `owner_id`
    #[instrument(skip(self, title))]
    pub fn create_slot(
        &self,
        owner_id: Uuid,
        title: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Slot> {
        require_id(owner_id, "owner id")?;
        require_text(title, "title", MAX_TITLE_LEN)?;
        let start_time = storable_time(start_time, "start time")?;
        let end_time = storable_time(end_time, "end time")?;
        if start_time >= end_time {
            return Err(Error::validation("slot must start before it ends"));
        }

        let slot = self.in_transaction("create_slot", |conn| {
            if UserStore::new(conn).find_by_id(owner_id)?.is_none() {
                return Err(Error::precondition("caller has no profile"));
            }
            SlotStore::new(conn).create(owner_id, title.trim(), start_time, end_time)
        })?;

        invariants::assert_slot_invariants(&slot);
        info!(slot_id = %slot.id, owner_id = %owner_id, "Slot created");
        Ok(slot)
    }

    /// Fetch one of the caller's own slots
    #[instrument(skip(self))]
    pub fn get_slot(&self, viewer_id: Uuid, slot_id: Uuid) -> Result<Slot> {
        require_id(slot_id, "slot id")?;
        let db = self.lock()?;
        guard::ensure_owner(db.find_slot(slot_id)?, viewer_id)
    }

    /// The caller's slots, earliest first
    #[instrument(skip(self))]
    pub fn list_my_slots(&self, owner_id: Uuid) -> Result<Vec<Slot>> {
        let db = self.lock()?;
        db.list_slots_for_owner(owner_id)
    }

    /// BUSY -> SWAPPABLE, by the owner
    #[instrument(skip(self))]
    pub fn make_swappable(&self, user_id: Uuid, slot_id: Uuid) -> Result<SlotStatus> {
        self.owner_transition(user_id, slot_id, OwnerAction::MakeSwappable)
    }

    /// SWAPPABLE -> BUSY, by the owner
    #[instrument(skip(self))]
    pub fn make_busy(&self, user_id: Uuid, slot_id: Uuid) -> Result<SlotStatus> {
        self.owner_transition(user_id, slot_id, OwnerAction::MakeBusy)
    }

    fn owner_transition(
        &self,
        user_id: Uuid,
        slot_id: Uuid,
        action: OwnerAction,
    ) -> Result<SlotStatus> {
        require_id(slot_id, "slot id")?;
        let (from, to) = action.transition();

        self.in_transaction("owner_transition", |conn| {
            SlotStore::new(conn)
                .transition_status(slot_id, user_id, from, to)?
                .or_precondition(INVALID_REQUEST)
        })?;

        info!(slot_id = %slot_id, user_id = %user_id, status = %to, "Slot status changed");
        Ok(to)
    }

    /// Offer `my_slot_id` in exchange for `their_slot_id`.
    ///
    /// Both slots are pinned to SWAP_PENDING in the same transaction that
    /// creates the request, so a competing proposal for either slot sees
    /// SWAP_PENDING and fails.
    #[instrument(skip(self))]
    pub fn propose_swap(
        &self,
        requester_id: Uuid,
        my_slot_id: Uuid,
        their_slot_id: Uuid,
    ) -> Result<SwapRequest> {
        require_id(my_slot_id, "offered slot id")?;
        require_id(their_slot_id, "desired slot id")?;
        if my_slot_id == their_slot_id {
            return Err(Error::validation("cannot swap a slot with itself"));
        }

        let request = self.in_transaction("propose_swap", |conn| {
            let slots = SlotStore::new(conn);
            let swaps = SwapStore::new(conn);

            let offered = guard::ensure_offered_slot(slots.get_by_id(my_slot_id)?, requester_id)?;
            let target = guard::ensure_target_slot(slots.get_by_id(their_slot_id)?, requester_id)?;
            invariants::assert_pinned_pair(&offered, &target);

            let request = swaps.create(offered.id, target.id, requester_id, target.owner_id)?;

            slots
                .transition_status(
                    offered.id,
                    requester_id,
                    SlotStatus::Swappable,
                    SlotStatus::SwapPending,
                )?
                .or_precondition(INVALID_OFFERED_SLOT)?;
            slots
                .transition_status(
                    target.id,
                    target.owner_id,
                    SlotStatus::Swappable,
                    SlotStatus::SwapPending,
                )?
                .or_precondition(INVALID_TARGET_SLOT)?;

            Ok(request)
        })?;

        info!(
            request_id = %request.id,
            requester_slot = %request.requester_slot_id,
            receiver_slot = %request.receiver_slot_id,
            "Swap proposed"
        );
        Ok(request)
    }

    /// Accept or reject a pending request addressed to `responder_id`.
    ///
    /// On accept the owners read by the filtered fetch are exchanged
    /// directly, without a second read.
    #[instrument(skip(self))]
    pub fn respond_to_swap(
        &self,
        responder_id: Uuid,
        request_id: Uuid,
        accepted: bool,
    ) -> Result<SwapStatus> {
        require_id(request_id, "request id")?;

        let (pending, status) = self.in_transaction("respond_to_swap", |conn| {
            let slots = SlotStore::new(conn);
            let swaps = SwapStore::new(conn);

            let pending = swaps
                .get_pending_for_receiver(request_id, responder_id)?
                .ok_or_else(|| Error::precondition(NOT_RESPONDABLE))?;
            invariants::assert_pending_swap_invariants(&pending);

            let status = if accepted {
                slots
                    .set_owner_and_status(
                        pending.requester_slot_id,
                        pending.receiver_slot_owner,
                        SlotStatus::Busy,
                    )?
                    .or_precondition(NOT_RESPONDABLE)?;
                slots
                    .set_owner_and_status(
                        pending.receiver_slot_id,
                        pending.requester_slot_owner,
                        SlotStatus::Busy,
                    )?
                    .or_precondition(NOT_RESPONDABLE)?;
                SwapStatus::Accepted
            } else {
                slots
                    .set_status(
                        pending.requester_slot_id,
                        pending.requester_slot_owner,
                        SlotStatus::Swappable,
                    )?
                    .or_precondition(NOT_RESPONDABLE)?;
                slots
                    .set_status(
                        pending.receiver_slot_id,
                        pending.receiver_slot_owner,
                        SlotStatus::Swappable,
                    )?
                    .or_precondition(NOT_RESPONDABLE)?;
                SwapStatus::Rejected
            };

            swaps
                .set_status(pending.request_id, status)?
                .or_precondition(NOT_RESPONDABLE)?;

            Ok((pending, status))
        })?;

        info!(
            request_id = %pending.request_id,
            status = %status,
            requester_slot = %pending.requester_slot_id,
            receiver_slot = %pending.receiver_slot_id,
            "Swap resolved"
        );
        Ok(status)
    }

    /// Swappable slots owned by other users
    #[instrument(skip(self))]
    pub fn list_marketplace(&self, viewer_id: Uuid) -> Result<Vec<MarketplaceSlot>> {
        let db = self.lock()?;
        marketplace::swappable_slots(&*db, viewer_id)
    }

    /// Incoming and outgoing request lists
    #[instrument(skip(self))]
    pub fn list_my_requests(&self, viewer_id: Uuid) -> Result<MyRequests> {
        let mut db = self.lock()?;
        let tx = db.snapshot()?;
        let requests = marketplace::my_requests(&SwapStore::new(&tx), viewer_id)?;
        Ok(requests)
    }

    pub fn list_incoming_requests(&self, viewer_id: Uuid) -> Result<Vec<IncomingRequest>> {
        self.lock()?.swaps().list_incoming(viewer_id)
    }

    pub fn list_outgoing_requests(&self, viewer_id: Uuid) -> Result<Vec<OutgoingRequest>> {
        self.lock()?.swaps().list_outgoing(viewer_id)
    }

    /// Check the pinning invariants across both tables
    pub fn audit(&self) -> Result<AuditReport> {
        let db = self.lock()?;
        let report = AuditReport {
            unpinned_requests: db.swaps().unpinned_pending()?,
            orphaned_pins: db.slots().orphaned_pins()?,
        };
        if !report.is_clean() {
            warn!(?report, "Store audit found inconsistencies");
        }
        Ok(report)
    }
}
