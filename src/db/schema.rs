//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::SupplyError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), SupplyError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, SupplyError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    ).map_err(|e| SupplyError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), SupplyError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), SupplyError> {
    conn.execute_batch(LEDGER_SCHEMA)
        .map_err(|e| SupplyError::Internal(format!("Failed to create ledger tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| SupplyError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), SupplyError> {
    info!(from_version, "No migration steps registered");
    set_schema_version(conn, SCHEMA_VERSION)
}

const LEDGER_SCHEMA: &str = r#"
-- Proposed redistributions, created by the recommendation pipeline
CREATE TABLE IF NOT EXISTS solution_cards (
    id TEXT PRIMARY KEY NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'approved', 'rejected')),
    priority_score INTEGER NOT NULL DEFAULT 0,
    confidence_score REAL,
    ai_rationale_summary TEXT,
    source TEXT,

    -- Open document, flat or nested shape
    payload TEXT,

    -- Denormalized copies of the payload facilities
    from_facilityid TEXT,
    to_facilityid TEXT,

    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    decided_at TEXT
);

-- Stock per facility and item
CREATE TABLE IF NOT EXISTS inventory (
    id TEXT PRIMARY KEY NOT NULL,
    facility_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity >= 0),
    -- Classification maintained outside the ledger
    status TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (facility_id, item_id)
);

-- Staff and couriers
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    email TEXT,
    role TEXT NOT NULL,
    district TEXT,
    facility_id TEXT
);

-- Audit record of committed movements
CREATE TABLE IF NOT EXISTS transfers (
    id TEXT PRIMARY KEY NOT NULL,
    solution_card_id TEXT UNIQUE REFERENCES solution_cards(id),
    from_facility_id TEXT NOT NULL,
    to_facility_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    status TEXT NOT NULL,
    driver_id TEXT REFERENCES users(id),
    vehicle_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    CHECK (from_facility_id <> to_facility_id)
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_cards_status_priority ON solution_cards(status, priority_score DESC);
CREATE INDEX IF NOT EXISTS idx_cards_from ON solution_cards(from_facilityid);
CREATE INDEX IF NOT EXISTS idx_cards_to ON solution_cards(to_facilityid);
CREATE INDEX IF NOT EXISTS idx_inventory_item ON inventory(item_id);
CREATE INDEX IF NOT EXISTS idx_transfers_created_at ON transfers(created_at);
CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_negative_quantity_rejected_by_storage() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO inventory (id, facility_id, item_id, quantity, status, updated_at)
             VALUES ('i1', 'F1', 'ITM1', -1, 'Healthy', '2024-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }
}
