//! Courier lookup
//!
//! Couriers are users with the `DRIVER` role. Picking one is a local query
//! inside the approval transaction; finding none is not an error.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::context::roles;
use crate::error::SupplyError;

/// Courier bound to a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Courier {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

/// Pick any eligible courier
pub fn pick_courier(conn: &Connection) -> Result<Option<Courier>, SupplyError> {
    let courier = conn
        .query_row(
            "SELECT id, name, email FROM users WHERE role = ? ORDER BY RANDOM() LIMIT 1",
            params![roles::DRIVER],
            |row| {
                Ok(Courier {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(courier)
}

/// Register a user (seeding and fixtures)
pub fn insert_user(
    conn: &Connection,
    id: &str,
    name: &str,
    email: Option<&str>,
    role: &str,
) -> Result<(), SupplyError> {
    conn.execute(
        "INSERT INTO users (id, name, email, role) VALUES (?, ?, ?, ?)",
        params![id, name, email, role],
    )?;
    Ok(())
}
