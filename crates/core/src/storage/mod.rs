//! SQLite storage layer for the swap marketplace

mod migrations;
mod parse;
mod slots;
mod swaps;
mod traits;
mod users;

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{IncomingRequest, MarketplaceSlot, OutgoingRequest, Slot};

pub use slots::SlotStore;
pub use swaps::SwapStore;
pub use traits::{SlotRepository, SwapRepository};
pub use users::UserStore;

/// Default time a writer waits on another connection's lock
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a conditional write.
///
/// Conditional updates never signal failure through a bare row count.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The row matched and was updated
    Applied,
    /// No row matched the id plus its ownership/status conditions
    NotFoundOrUnauthorized,
}

impl WriteOutcome {
    fn from_rows(rows: usize) -> Self {
        if rows == 0 {
            WriteOutcome::NotFoundOrUnauthorized
        } else {
            WriteOutcome::Applied
        }
    }

    /// Turn a non-match into a precondition failure with a generic message
    pub fn or_precondition(self, msg: &str) -> Result<()> {
        match self {
            WriteOutcome::Applied => Ok(()),
            WriteOutcome::NotFoundOrUnauthorized => Err(Error::precondition(msg)),
        }
    }
}

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open or create database, waiting up to `busy_timeout` on locks held
    /// by other connections
    pub fn open_with_timeout<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "Database opened");
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> Result<u32> {
        migrations::get_current_version(&self.conn)
    }

    /// Begin a write transaction.
    ///
    /// Uses `BEGIN IMMEDIATE`, taking the write lock up front so two
    /// read-then-write sequences on different connections cannot interleave.
    /// Dropping the transaction without committing rolls it back.
    pub fn begin(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    /// Begin a read-only transaction.
    ///
    /// Every query inside it sees the same committed state, so a listing
    /// assembled from several statements cannot straddle another
    /// connection's commit. Dropping it ends the read.
    pub fn snapshot(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Deferred)?)
    }

    /// Get profile store
    pub fn users(&self) -> UserStore<'_> {
        UserStore::new(&self.conn)
    }

    /// Get slot store
    pub fn slots(&self) -> SlotStore<'_> {
        SlotStore::new(&self.conn)
    }

    /// Get swap request store
    pub fn swaps(&self) -> SwapStore<'_> {
        SwapStore::new(&self.conn)
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

impl SlotRepository for SlotStore<'_> {
    fn find_slot(&self, id: Uuid) -> Result<Option<Slot>> {
        self.get_by_id(id)
    }

    fn list_slots_for_owner(&self, owner_id: Uuid) -> Result<Vec<Slot>> {
        self.list_for_owner(owner_id)
    }

    fn list_swappable_slots(&self, viewer_id: Uuid) -> Result<Vec<MarketplaceSlot>> {
        self.list_swappable_excluding(viewer_id)
    }
}

impl SwapRepository for SwapStore<'_> {
    fn list_incoming(&self, user_id: Uuid) -> Result<Vec<IncomingRequest>> {
        SwapStore::list_incoming(self, user_id)
    }

    fn list_outgoing(&self, user_id: Uuid) -> Result<Vec<OutgoingRequest>> {
        SwapStore::list_outgoing(self, user_id)
    }
}

impl SlotRepository for Database {
    fn find_slot(&self, id: Uuid) -> Result<Option<Slot>> {
        self.slots().find_slot(id)
    }

    fn list_slots_for_owner(&self, owner_id: Uuid) -> Result<Vec<Slot>> {
        self.slots().list_slots_for_owner(owner_id)
    }

    fn list_swappable_slots(&self, viewer_id: Uuid) -> Result<Vec<MarketplaceSlot>> {
        self.slots().list_swappable_slots(viewer_id)
    }
}

impl SwapRepository for Database {
    fn list_incoming(&self, user_id: Uuid) -> Result<Vec<IncomingRequest>> {
        SwapRepository::list_incoming(&self.swaps(), user_id)
    }

    fn list_outgoing(&self, user_id: Uuid) -> Result<Vec<OutgoingRequest>> {
        SwapRepository::list_outgoing(&self.swaps(), user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_migrated() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.schema_version().unwrap() >= 1);
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let mut db = Database::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        {
            let tx = db.begin().unwrap();
            UserStore::new(&tx)
                .upsert(&crate::models::Profile::new(id, "temp".into()))
                .unwrap();
        }
        assert!(db.users().find_by_id(id).unwrap().is_none());
    }

    #[test]
    fn test_write_outcome_to_precondition() {
        assert!(WriteOutcome::Applied.or_precondition("x").is_ok());
        let err = WriteOutcome::NotFoundOrUnauthorized
            .or_precondition("invalid request")
            .unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(msg) if msg == "invalid request"));
    }

    #[test]
    fn test_snapshot_reads_ignore_later_commits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.db");
        let mut reader = Database::open(&path).unwrap();
        let writer = Database::open(&path).unwrap();
        let first = Uuid::new_v4();
        writer
            .users()
            .upsert(&crate::models::Profile::new(first, "first".into()))
            .unwrap();

        let tx = reader.snapshot().unwrap();
        assert!(UserStore::new(&tx).find_by_id(first).unwrap().is_some());

        let second = Uuid::new_v4();
        writer
            .users()
            .upsert(&crate::models::Profile::new(second, "second".into()))
            .unwrap();
        assert!(UserStore::new(&tx).find_by_id(second).unwrap().is_none());
        drop(tx);

        assert!(reader.users().find_by_id(second).unwrap().is_some());
    }
}
