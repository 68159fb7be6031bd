//! Inventory ledger primitives
//!
//! Quantity per (facility, item). Both mutating primitives are single SQL
//! statements so concurrent movements against the same row never lose an
//! update, and a debit can never drive a quantity below zero.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::current_timestamp;
use crate::error::SupplyError;

/// Inventory row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRow {
    pub id: String,
    pub facility_id: String,
    pub item_id: String,
    pub quantity: i64,
    pub status: String,
    pub updated_at: String,
}

impl InventoryRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            facility_id: row.get("facility_id")?,
            item_id: row.get("item_id")?,
            quantity: row.get("quantity")?,
            status: row.get("status")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Result of a debit attempt; only `Debited` mutated anything
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited { remaining: i64 },
    NotFound,
    Insufficient { available: i64 },
}

/// Get the inventory row for a facility and item
pub fn get_inventory(
    conn: &Connection,
    facility_id: &str,
    item_id: &str,
) -> Result<Option<InventoryRow>, SupplyError> {
    let row = conn
        .query_row(
            "SELECT * FROM inventory WHERE facility_id = ? AND item_id = ?",
            params![facility_id, item_id],
            |row| InventoryRow::from_row(row),
        )
        .optional()?;
    Ok(row)
}

/// Remove `quantity` units, failing closed
pub fn debit(
    conn: &Connection,
    facility_id: &str,
    item_id: &str,
    quantity: i64,
) -> Result<DebitOutcome, SupplyError> {
    ensure_positive(quantity)?;

    let changed = conn.execute(
        "UPDATE inventory SET quantity = quantity - ?1, updated_at = ?2
         WHERE facility_id = ?3 AND item_id = ?4 AND quantity >= ?1",
        params![quantity, current_timestamp(), facility_id, item_id],
    )?;

    let current = get_inventory(conn, facility_id, item_id)?;
    let outcome = match (changed, current) {
        (1, Some(row)) => DebitOutcome::Debited { remaining: row.quantity },
        (_, Some(row)) => DebitOutcome::Insufficient { available: row.quantity },
        (_, None) => DebitOutcome::NotFound,
    };

    debug!(facility_id, item_id, quantity, outcome = ?outcome, "Debit");
    Ok(outcome)
}

/// Add `quantity` units, creating the row with `neutral_status` if absent
///
/// Returns the quantity after the credit. An existing row keeps its status.
pub fn credit_upsert(
    conn: &Connection,
    facility_id: &str,
    item_id: &str,
    quantity: i64,
    neutral_status: &str,
) -> Result<i64, SupplyError> {
    ensure_positive(quantity)?;

    // The WHERE on the update keeps the sum inside i64; SQLite would
    // otherwise store an overflowed sum as REAL.
    let now = current_timestamp();
    let new_quantity: Option<i64> = conn
        .query_row(
            "INSERT INTO inventory (id, facility_id, item_id, quantity, status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(facility_id, item_id) DO UPDATE SET
             quantity = inventory.quantity + excluded.quantity,
             updated_at = excluded.updated_at
             WHERE inventory.quantity <= ?7
             RETURNING quantity",
            params![
                Uuid::new_v4().to_string(),
                facility_id,
                item_id,
                quantity,
                neutral_status,
                now,
                i64::MAX - quantity,
            ],
            |row| row.get(0),
        )
        .optional()?;

    let new_quantity = new_quantity.ok_or_else(|| {
        SupplyError::InvalidInput(format!(
            "Credit of {} would overflow stock of {} at {}",
            quantity, item_id, facility_id
        ))
    })?;

    debug!(facility_id, item_id, quantity, new_quantity, "Credit");
    Ok(new_quantity)
}

/// Set an absolute stock level (ingestion and fixtures)
pub fn set_stock(
    conn: &Connection,
    facility_id: &str,
    item_id: &str,
    quantity: i64,
    status: &str,
) -> Result<(), SupplyError> {
    if quantity < 0 {
        return Err(SupplyError::InvalidInput(format!("Negative stock level: {}", quantity)));
    }

    conn.execute(
        "INSERT INTO inventory (id, facility_id, item_id, quantity, status, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(facility_id, item_id) DO UPDATE SET
         quantity = excluded.quantity,
         status = excluded.status,
         updated_at = excluded.updated_at",
        params![
            Uuid::new_v4().to_string(),
            facility_id,
            item_id,
            quantity,
            status,
            current_timestamp(),
        ],
    )?;
    Ok(())
}

/// Quantity of an item summed over every facility
pub fn total_quantity(conn: &Connection, item_id: &str) -> Result<i64, SupplyError> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(quantity), 0) FROM inventory WHERE item_id = ?",
        params![item_id],
        |row| row.get(0),
    )?;
    Ok(total)
}

fn ensure_positive(quantity: i64) -> Result<(), SupplyError> {
    if quantity <= 0 {
        return Err(SupplyError::InvalidInput(format!("Quantity must be positive, got {}", quantity)));
    }
    Ok(())
}
