//! Slot storage operations
//!
//! Status writes are conditional: the WHERE clause carries the expected
//! owner (and, for transitions, the expected status), so the check happens
//! at write time. A row that does not match is reported as
//! [`WriteOutcome::NotFoundOrUnauthorized`] without saying which part failed.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{format_datetime, parse_datetime, parse_slot_status, parse_uuid, OptionalExt};
use super::WriteOutcome;
use crate::error::Result;
use crate::models::{MarketplaceSlot, Slot, SlotStatus};

const SLOT_COLUMNS: &str = "id, title, start_time, end_time, owner_id, status";

fn slot_from_row(row: &Row<'_>) -> rusqlite::Result<Slot> {
    Ok(Slot {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        title: row.get(1)?,
        start_time: parse_datetime(&row.get::<_, String>(2)?)?,
        end_time: parse_datetime(&row.get::<_, String>(3)?)?,
        owner_id: parse_uuid(&row.get::<_, String>(4)?)?,
        status: parse_slot_status(&row.get::<_, String>(5)?)?,
    })
}

pub struct SlotStore<'a> {
    conn: &'a Connection,
}

impl<'a> SlotStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new slot in BUSY status
    #[instrument(skip(self, title), fields(owner_id = %owner_id))]
    pub fn create(
        &self,
        owner_id: Uuid,
        title: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Slot> {
        let slot = Slot::new(owner_id, title.to_string(), start_time, end_time);
        self.conn.execute(
            "INSERT INTO slots (id, title, start_time, end_time, status, owner_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                slot.id.to_string(),
                slot.title,
                format_datetime(&slot.start_time),
                format_datetime(&slot.end_time),
                slot.status.as_str(),
                slot.owner_id.to_string(),
            ],
        )?;
        Ok(slot)
    }

    /// Find slot by ID
    #[instrument(skip(self))]
    pub fn get_by_id(&self, id: Uuid) -> Result<Option<Slot>> {
        let slot = self
            .conn
            .query_row(
                &format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = ?1"),
                params![id.to_string()],
                slot_from_row,
            )
            .optional()?;

        Ok(slot)
    }

    /// Set status if the slot is owned by `expected_owner`
    #[instrument(skip(self))]
    pub fn set_status(
        &self,
        id: Uuid,
        expected_owner: Uuid,
        new_status: SlotStatus,
    ) -> Result<WriteOutcome> {
        let updated = self.conn.execute(
            "UPDATE slots SET status = ?1 WHERE id = ?2 AND owner_id = ?3",
            params![
                new_status.as_str(),
                id.to_string(),
                expected_owner.to_string()
            ],
        )?;
        Ok(WriteOutcome::from_rows(updated))
    }

    /// Move `from` to `to` if the slot is owned by `expected_owner` and
    /// currently in `from`
    #[instrument(skip(self))]
    pub fn transition_status(
        &self,
        id: Uuid,
        expected_owner: Uuid,
        from: SlotStatus,
        to: SlotStatus,
    ) -> Result<WriteOutcome> {
        let updated = self.conn.execute(
            "UPDATE slots SET status = ?1 WHERE id = ?2 AND owner_id = ?3 AND status = ?4",
            params![
                to.as_str(),
                id.to_string(),
                expected_owner.to_string(),
                from.as_str()
            ],
        )?;
        Ok(WriteOutcome::from_rows(updated))
    }

    /// Reassign owner and status. Only the swap engine calls this, after it
    /// has verified both sides of an accepted swap.
    #[instrument(skip(self))]
    pub fn set_owner_and_status(
        &self,
        id: Uuid,
        new_owner: Uuid,
        new_status: SlotStatus,
    ) -> Result<WriteOutcome> {
        let updated = self.conn.execute(
            "UPDATE slots SET owner_id = ?1, status = ?2 WHERE id = ?3",
            params![new_owner.to_string(), new_status.as_str(), id.to_string()],
        )?;
        Ok(WriteOutcome::from_rows(updated))
    }

    /// List a user's own slots by start time
    #[instrument(skip(self))]
    pub fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<Slot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SLOT_COLUMNS} FROM slots WHERE owner_id = ?1 ORDER BY start_time, id"
        ))?;

        let slots = stmt
            .query_map(params![owner_id.to_string()], slot_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(slots)
    }

    /// Swappable slots owned by anyone except `viewer_id`, with owner names
    #[instrument(skip(self))]
    pub fn list_swappable_excluding(&self, viewer_id: Uuid) -> Result<Vec<MarketplaceSlot>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.title, s.start_time, s.end_time, s.owner_id, u.display_name
             FROM slots s
             INNER JOIN users u ON u.id = s.owner_id
             WHERE s.status = ?1 AND s.owner_id <> ?2
             ORDER BY s.start_time, s.id",
        )?;

        let slots = stmt
            .query_map(
                params![SlotStatus::Swappable.as_str(), viewer_id.to_string()],
                |row| {
                    Ok(MarketplaceSlot {
                        slot_id: parse_uuid(&row.get::<_, String>(0)?)?,
                        title: row.get(1)?,
                        start_time: parse_datetime(&row.get::<_, String>(2)?)?,
                        end_time: parse_datetime(&row.get::<_, String>(3)?)?,
                        owner_id: parse_uuid(&row.get::<_, String>(4)?)?,
                        owner_name: row.get(5)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(slots)
    }

    /// SWAP_PENDING slots that no PENDING request references
    pub fn orphaned_pins(&self) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id FROM slots s
             WHERE s.status = 'SWAP_PENDING'
             AND NOT EXISTS (
                 SELECT 1 FROM swap_requests r
                 WHERE r.status = 'PENDING'
                 AND (r.requester_slot_id = s.id OR r.receiver_slot_id = s.id)
             )
             ORDER BY s.id",
        )?;

        let ids = stmt
            .query_map([], |row| parse_uuid(&row.get::<_, String>(0)?))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Profile;
    use crate::storage::Database;
    use chrono::TimeZone;

    fn setup() -> (Database, Uuid, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        db.users().upsert(&Profile::new(alice, "alice".into())).unwrap();
        db.users().upsert(&Profile::new(bob, "bob".into())).unwrap();
        (db, alice, bob)
    }

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, h, 0, 0).unwrap()
    }

    #[test]
    fn test_create_is_busy_and_readable() {
        let (db, alice, _) = setup();
        let slot = db.slots().create(alice, "Focus", hour(9), hour(10)).unwrap();

        let found = db.slots().get_by_id(slot.id).unwrap().unwrap();
        assert_eq!(found, slot);
        assert_eq!(found.status, SlotStatus::Busy);
    }

    #[test]
    fn test_end_before_start_rejected_by_schema() {
        let (db, alice, _) = setup();
        assert!(db.slots().create(alice, "Bad", hour(10), hour(9)).is_err());
    }

    #[test]
    fn test_set_status_wrong_owner_changes_nothing() {
        let (db, alice, bob) = setup();
        let slot = db.slots().create(alice, "Focus", hour(9), hour(10)).unwrap();

        let outcome = db
            .slots()
            .set_status(slot.id, bob, SlotStatus::Swappable)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::NotFoundOrUnauthorized);

        let outcome = db
            .slots()
            .set_status(Uuid::new_v4(), alice, SlotStatus::Swappable)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::NotFoundOrUnauthorized);

        let found = db.slots().get_by_id(slot.id).unwrap().unwrap();
        assert_eq!(found.status, SlotStatus::Busy);
    }

    #[test]
    fn test_transition_requires_expected_status() {
        let (db, alice, _) = setup();
        let slot = db.slots().create(alice, "Focus", hour(9), hour(10)).unwrap();

        let outcome = db
            .slots()
            .transition_status(slot.id, alice, SlotStatus::Swappable, SlotStatus::Busy)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::NotFoundOrUnauthorized);

        let outcome = db
            .slots()
            .transition_status(slot.id, alice, SlotStatus::Busy, SlotStatus::Swappable)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);
    }

    #[test]
    fn test_marketplace_excludes_viewer_and_non_swappable() {
        let (db, alice, bob) = setup();
        let a1 = db.slots().create(alice, "A1", hour(9), hour(10)).unwrap();
        let _a2 = db.slots().create(alice, "A2", hour(11), hour(12)).unwrap();
        let b1 = db.slots().create(bob, "B1", hour(8), hour(9)).unwrap();

        db.slots().set_status(a1.id, alice, SlotStatus::Swappable).unwrap();
        db.slots().set_status(b1.id, bob, SlotStatus::Swappable).unwrap();

        let for_bob = db.slots().list_swappable_excluding(bob).unwrap();
        assert_eq!(for_bob.len(), 1);
        assert_eq!(for_bob[0].slot_id, a1.id);
        assert_eq!(for_bob[0].owner_name, "alice");

        let for_alice = db.slots().list_swappable_excluding(alice).unwrap();
        assert_eq!(for_alice.len(), 1);
        assert_eq!(for_alice[0].slot_id, b1.id);
    }

    #[test]
    fn test_list_for_owner_ordered_by_start() {
        let (db, alice, _) = setup();
        db.slots().create(alice, "Late", hour(15), hour(16)).unwrap();
        db.slots().create(alice, "Early", hour(7), hour(8)).unwrap();

        let titles: Vec<String> = db
            .slots()
            .list_for_owner(alice)
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["Early", "Late"]);
    }
}
