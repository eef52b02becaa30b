//! Database migration system
//!
//! Tracks schema versions and applies migrations in order.

use rusqlite::Connection;
use tracing::{info, instrument};

use crate::error::Result;

/// A database migration
pub struct Migration {
    /// Version number (must be sequential starting from 1)
    pub version: u32,
    /// Description of what this migration does
    pub description: &'static str,
    /// SQL to run for this migration
    pub sql: &'static str,
}

/// All migrations in order
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema",
        sql: r#"
            -- Display profiles (identity lives elsewhere)
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Time slots
            CREATE TABLE IF NOT EXISTS slots (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'BUSY'
                    CHECK (status IN ('BUSY', 'SWAPPABLE', 'SWAP_PENDING')),
                owner_id TEXT NOT NULL,
                CHECK (start_time < end_time),
                FOREIGN KEY (owner_id) REFERENCES users(id)
            );

            -- Swap requests between two slots
            CREATE TABLE IF NOT EXISTS swap_requests (
                id TEXT PRIMARY KEY,
                requester_slot_id TEXT NOT NULL,
                receiver_slot_id TEXT NOT NULL,
                requester_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING'
                    CHECK (status IN ('PENDING', 'ACCEPTED', 'REJECTED')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CHECK (requester_slot_id <> receiver_slot_id),
                CHECK (requester_id <> receiver_id),
                FOREIGN KEY (requester_slot_id) REFERENCES slots(id),
                FOREIGN KEY (receiver_slot_id) REFERENCES slots(id),
                FOREIGN KEY (requester_id) REFERENCES users(id),
                FOREIGN KEY (receiver_id) REFERENCES users(id)
            );
        "#,
    },
    Migration {
        version: 2,
        description: "Add indexes for marketplace and request queries",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_slots_owner ON slots(owner_id);
            CREATE INDEX IF NOT EXISTS idx_slots_status_start ON slots(status, start_time);

            CREATE INDEX IF NOT EXISTS idx_swap_requests_requester ON swap_requests(requester_id);
            CREATE INDEX IF NOT EXISTS idx_swap_requests_receiver_slot ON swap_requests(receiver_slot_id);
        "#,
    },
    Migration {
        version: 3,
        description: "Enforce at most one pending request per slot",
        sql: r#"
            -- Backstop for slot pinning: a second PENDING row on either side fails the insert
            CREATE UNIQUE INDEX IF NOT EXISTS uq_pending_requester_slot
                ON swap_requests(requester_slot_id) WHERE status = 'PENDING';
            CREATE UNIQUE INDEX IF NOT EXISTS uq_pending_receiver_slot
                ON swap_requests(receiver_slot_id) WHERE status = 'PENDING';
        "#,
    },
];

/// Initialize the migrations table
fn init_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version
pub(crate) fn get_current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

/// Record that a migration was applied
fn record_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            migration.version,
            migration.description,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

/// Run all pending migrations
#[instrument(skip(conn))]
pub fn run_migrations(conn: &Connection) -> Result<()> {
    init_migrations_table(conn)?;

    let current_version = get_current_version(conn)?;
    info!(current_version, "Checking for pending migrations");

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                description = migration.description,
                "Applying migration"
            );

            conn.execute_batch(migration.sql)?;
            record_migration(conn, migration)?;
        }
    }

    let new_version = get_current_version(conn)?;
    if new_version > current_version {
        info!(
            from = current_version,
            to = new_version,
            "Database schema updated"
        );
    }

    Ok(())
}
