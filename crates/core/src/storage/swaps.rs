//! Swap request storage operations

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{format_datetime, parse_datetime, parse_swap_status, parse_uuid, OptionalExt};
use super::WriteOutcome;
use crate::error::Result;
use crate::models::{IncomingRequest, OutgoingRequest, PendingSwap, SwapRequest, SwapStatus};

#[cfg(test)]
fn request_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SwapRequest> {
    Ok(SwapRequest {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        requester_slot_id: parse_uuid(&row.get::<_, String>(1)?)?,
        receiver_slot_id: parse_uuid(&row.get::<_, String>(2)?)?,
        requester_id: parse_uuid(&row.get::<_, String>(3)?)?,
        receiver_id: parse_uuid(&row.get::<_, String>(4)?)?,
        status: parse_swap_status(&row.get::<_, String>(5)?)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?)?,
        updated_at: parse_datetime(&row.get::<_, String>(7)?)?,
    })
}

pub struct SwapStore<'a> {
    conn: &'a Connection,
}

impl<'a> SwapStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new PENDING request
    #[instrument(skip(self))]
    pub fn create(
        &self,
        requester_slot_id: Uuid,
        receiver_slot_id: Uuid,
        requester_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<SwapRequest> {
        let request =
            SwapRequest::new(requester_slot_id, receiver_slot_id, requester_id, receiver_id);
        self.conn.execute(
            "INSERT INTO swap_requests
                (id, requester_slot_id, receiver_slot_id, requester_id, receiver_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                request.id.to_string(),
                request.requester_slot_id.to_string(),
                request.receiver_slot_id.to_string(),
                request.requester_id.to_string(),
                request.receiver_id.to_string(),
                request.status.as_str(),
                format_datetime(&request.created_at),
                format_datetime(&request.updated_at),
            ],
        )?;
        Ok(request)
    }

    #[cfg(test)]
    pub(crate) fn find_by_id(&self, id: Uuid) -> Result<Option<SwapRequest>> {
        let request = self
            .conn
            .query_row(
                "SELECT id, requester_slot_id, receiver_slot_id, requester_id, receiver_id, status, created_at, updated_at
                 FROM swap_requests WHERE id = ?1",
                params![id.to_string()],
                request_from_row,
            )
            .optional()?;

        Ok(request)
    }

    /// Fetch a PENDING request whose receiver slot is currently owned by
    /// `receiver_owner`, joined with both slots' owners.
    ///
    /// Wrong user, already resolved, and nonexistent all come back as `None`.
    #[instrument(skip(self))]
    pub fn get_pending_for_receiver(
        &self,
        request_id: Uuid,
        receiver_owner: Uuid,
    ) -> Result<Option<PendingSwap>> {
        let pending = self
            .conn
            .query_row(
                "SELECT r.id, rs.id, rs.owner_id, ts.id, ts.owner_id
                 FROM swap_requests r
                 INNER JOIN slots rs ON rs.id = r.requester_slot_id
                 INNER JOIN slots ts ON ts.id = r.receiver_slot_id
                 WHERE r.id = ?1 AND r.status = ?2 AND ts.owner_id = ?3",
                params![
                    request_id.to_string(),
                    SwapStatus::Pending.as_str(),
                    receiver_owner.to_string()
                ],
                |row| {
                    Ok(PendingSwap {
                        request_id: parse_uuid(&row.get::<_, String>(0)?)?,
                        requester_slot_id: parse_uuid(&row.get::<_, String>(1)?)?,
                        requester_slot_owner: parse_uuid(&row.get::<_, String>(2)?)?,
                        receiver_slot_id: parse_uuid(&row.get::<_, String>(3)?)?,
                        receiver_slot_owner: parse_uuid(&row.get::<_, String>(4)?)?,
                    })
                },
            )
            .optional()?;

        Ok(pending)
    }

    /// Resolve a PENDING request. Terminal rows are never updated.
    #[instrument(skip(self))]
    pub fn set_status(&self, id: Uuid, new_status: SwapStatus) -> Result<WriteOutcome> {
        let updated = self.conn.execute(
            "UPDATE swap_requests SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                new_status.as_str(),
                format_datetime(&Utc::now()),
                id.to_string(),
                SwapStatus::Pending.as_str(),
            ],
        )?;
        Ok(WriteOutcome::from_rows(updated))
    }

    /// PENDING requests waiting on `user_id`
    #[instrument(skip(self))]
    pub fn list_incoming(&self, user_id: Uuid) -> Result<Vec<IncomingRequest>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, u.display_name, rs.title, ts.title, r.status, r.created_at
             FROM swap_requests r
             INNER JOIN slots rs ON rs.id = r.requester_slot_id
             INNER JOIN slots ts ON ts.id = r.receiver_slot_id
             INNER JOIN users u ON u.id = rs.owner_id
             WHERE r.status = ?1 AND ts.owner_id = ?2
             ORDER BY r.created_at DESC, r.id",
        )?;

        let requests = stmt
            .query_map(
                params![SwapStatus::Pending.as_str(), user_id.to_string()],
                |row| {
                    Ok(IncomingRequest {
                        request_id: parse_uuid(&row.get::<_, String>(0)?)?,
                        requester_name: row.get(1)?,
                        offered_slot_title: row.get(2)?,
                        my_slot_title: row.get(3)?,
                        status: parse_swap_status(&row.get::<_, String>(4)?)?,
                        created_at: parse_datetime(&row.get::<_, String>(5)?)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(requests)
    }

    /// Every request `user_id` proposed, in any status
    #[instrument(skip(self))]
    pub fn list_outgoing(&self, user_id: Uuid) -> Result<Vec<OutgoingRequest>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, u.display_name, ms.title, ds.title, r.status, r.created_at
             FROM swap_requests r
             INNER JOIN slots ms ON ms.id = r.requester_slot_id
             INNER JOIN slots ds ON ds.id = r.receiver_slot_id
             INNER JOIN users u ON u.id = r.receiver_id
             WHERE r.requester_id = ?1
             ORDER BY r.created_at DESC, r.id",
        )?;

        let requests = stmt
            .query_map(params![user_id.to_string()], |row| {
                Ok(OutgoingRequest {
                    request_id: parse_uuid(&row.get::<_, String>(0)?)?,
                    receiver_name: row.get(1)?,
                    my_slot_title: row.get(2)?,
                    desired_slot_title: row.get(3)?,
                    status: parse_swap_status(&row.get::<_, String>(4)?)?,
                    created_at: parse_datetime(&row.get::<_, String>(5)?)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(requests)
    }

    /// PENDING requests whose slots are not both SWAP_PENDING
    pub fn unpinned_pending(&self) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id FROM swap_requests r
             INNER JOIN slots rs ON rs.id = r.requester_slot_id
             INNER JOIN slots ts ON ts.id = r.receiver_slot_id
             WHERE r.status = 'PENDING'
             AND (rs.status <> 'SWAP_PENDING' OR ts.status <> 'SWAP_PENDING')
             ORDER BY r.id",
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
    use crate::models::{Profile, SlotStatus};
    use crate::storage::Database;
    use chrono::{Duration, TimeZone};

    struct Fixture {
        db: Database,
        alice: Uuid,
        bob: Uuid,
        alice_slot: Uuid,
        bob_slot: Uuid,
    }

    fn setup() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        db.users().upsert(&Profile::new(alice, "alice".into())).unwrap();
        db.users().upsert(&Profile::new(bob, "bob".into())).unwrap();

        let start = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();
        let alice_slot = db
            .slots()
            .create(alice, "Alice standup", start, start + Duration::hours(1))
            .unwrap()
            .id;
        let bob_slot = db
            .slots()
            .create(bob, "Bob review", start, start + Duration::hours(2))
            .unwrap()
            .id;

        Fixture {
            db,
            alice,
            bob,
            alice_slot,
            bob_slot,
        }
    }

    #[test]
    fn test_pending_lookup_only_for_receiver() {
        let f = setup();
        let req = f
            .db
            .swaps()
            .create(f.alice_slot, f.bob_slot, f.alice, f.bob)
            .unwrap();

        assert!(f
            .db
            .swaps()
            .get_pending_for_receiver(req.id, f.alice)
            .unwrap()
            .is_none());

        let pending = f
            .db
            .swaps()
            .get_pending_for_receiver(req.id, f.bob)
            .unwrap()
            .unwrap();
        assert_eq!(pending.requester_slot_owner, f.alice);
        assert_eq!(pending.receiver_slot_owner, f.bob);
    }

    #[test]
    fn test_terminal_status_is_final() {
        let f = setup();
        let req = f
            .db
            .swaps()
            .create(f.alice_slot, f.bob_slot, f.alice, f.bob)
            .unwrap();

        assert_eq!(
            f.db.swaps().set_status(req.id, SwapStatus::Rejected).unwrap(),
            WriteOutcome::Applied
        );
        assert_eq!(
            f.db.swaps().set_status(req.id, SwapStatus::Accepted).unwrap(),
            WriteOutcome::NotFoundOrUnauthorized
        );
        assert!(f
            .db
            .swaps()
            .get_pending_for_receiver(req.id, f.bob)
            .unwrap()
            .is_none());

        let stored = f.db.swaps().find_by_id(req.id).unwrap().unwrap();
        assert_eq!(stored.status, SwapStatus::Rejected);
    }

    #[test]
    fn test_second_pending_on_same_slot_rejected_by_index() {
        let f = setup();
        f.db.swaps()
            .create(f.alice_slot, f.bob_slot, f.alice, f.bob)
            .unwrap();
        assert!(f
            .db
            .swaps()
            .create(f.alice_slot, f.bob_slot, f.alice, f.bob)
            .is_err());
    }

    #[test]
    fn test_incoming_and_outgoing_projections() {
        let f = setup();
        let req = f
            .db
            .swaps()
            .create(f.alice_slot, f.bob_slot, f.alice, f.bob)
            .unwrap();

        let incoming = f.db.swaps().list_incoming(f.bob).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].request_id, req.id);
        assert_eq!(incoming[0].requester_name, "alice");
        assert_eq!(incoming[0].offered_slot_title, "Alice standup");
        assert_eq!(incoming[0].my_slot_title, "Bob review");
        assert!(f.db.swaps().list_incoming(f.alice).unwrap().is_empty());

        let outgoing = f.db.swaps().list_outgoing(f.alice).unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].receiver_name, "bob");
        assert_eq!(outgoing[0].my_slot_title, "Alice standup");
        assert_eq!(outgoing[0].desired_slot_title, "Bob review");
        assert!(f.db.swaps().list_outgoing(f.bob).unwrap().is_empty());
    }

    #[test]
    fn test_audit_queries_flag_unpinned_request() {
        let f = setup();
        let req = f
            .db
            .swaps()
            .create(f.alice_slot, f.bob_slot, f.alice, f.bob)
            .unwrap();
        assert_eq!(f.db.swaps().unpinned_pending().unwrap(), vec![req.id]);

        f.db.slots()
            .set_status(f.alice_slot, f.alice, SlotStatus::SwapPending)
            .unwrap();
        f.db.slots()
            .set_status(f.bob_slot, f.bob, SlotStatus::SwapPending)
            .unwrap();
        assert!(f.db.swaps().unpinned_pending().unwrap().is_empty());
        assert!(f.db.slots().orphaned_pins().unwrap().is_empty());
    }
}
