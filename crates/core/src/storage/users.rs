//! Profile storage operations

use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{format_datetime, parse_datetime, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::Profile;

pub struct UserStore<'a> {
    conn: &'a Connection,
}

impl<'a> UserStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a profile, or rename it if it already exists
    #[instrument(skip(self, profile), fields(user_id = %profile.id))]
    pub fn upsert(&self, profile: &Profile) -> Result<()> {
        self.conn.execute(
            "INSERT INTO users (id, display_name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name",
            params![
                profile.id.to_string(),
                profile.display_name,
                format_datetime(&profile.created_at),
            ],
        )?;
        Ok(())
    }

    /// Find profile by user ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        let profile = self
            .conn
            .query_row(
                "SELECT id, display_name, created_at FROM users WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(Profile {
                        id: parse_uuid(&row.get::<_, String>(0)?)?,
                        display_name: row.get(1)?,
                        created_at: parse_datetime(&row.get::<_, String>(2)?)?,
                    })
                },
            )
            .optional()?;

        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use crate::models::Profile;
    use crate::storage::Database;
    use uuid::Uuid;

    #[test]
    fn test_upsert_renames() {
        let db = Database::open_in_memory().unwrap();
        let id = Uuid::new_v4();

        db.users().upsert(&Profile::new(id, "alice".into())).unwrap();
        db.users().upsert(&Profile::new(id, "Alice B.".into())).unwrap();

        let found = db.users().find_by_id(id).unwrap().unwrap();
        assert_eq!(found.display_name, "Alice B.");
    }

    #[test]
    fn test_missing_profile() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.users().find_by_id(Uuid::new_v4()).unwrap().is_none());
    }
}
