//! Transfer record writer
//!
//! A transfer is written once, inside the approval transaction. Its later
//! progression (pickup, transit, delivery) is driven by field updates that do
//! not go through this module, so there is no update or delete here.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::current_timestamp;
use crate::error::SupplyError;

/// Transfer lifecycle states
pub mod transfer_statuses {
    /// Approved, waiting for pickup
    pub const PENDING: &str = "PENDING";
}

/// Transfer row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRow {
    pub id: String,
    pub solution_card_id: Option<String>,
    pub from_facility_id: String,
    pub to_facility_id: String,
    pub item_id: String,
    pub quantity: i64,
    pub status: String,
    pub driver_id: Option<String>,
    pub vehicle_type: String,
    pub created_at: String,
}

impl TransferRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            solution_card_id: row.get("solution_card_id")?,
            from_facility_id: row.get("from_facility_id")?,
            to_facility_id: row.get("to_facility_id")?,
            item_id: row.get("item_id")?,
            quantity: row.get("quantity")?,
            status: row.get("status")?,
            driver_id: row.get("driver_id")?,
            vehicle_type: row.get("vehicle_type")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Input for writing a transfer
#[derive(Debug, Clone)]
pub struct NewTransfer<'a> {
    /// None only for movements created outside the approval flow
    pub solution_card_id: Option<&'a str>,
    pub from_facility_id: &'a str,
    pub to_facility_id: &'a str,
    pub item_id: &'a str,
    pub quantity: i64,
    pub driver_id: Option<&'a str>,
    pub vehicle_type: &'a str,
}

/// Write a transfer record, returning its id
pub fn create_transfer(conn: &Connection, input: &NewTransfer<'_>) -> Result<String, SupplyError> {
    if input.quantity <= 0 {
        return Err(SupplyError::InvalidInput(format!(
            "Transfer quantity must be positive, got {}",
            input.quantity
        )));
    }
    if input.from_facility_id == input.to_facility_id {
        return Err(SupplyError::InvalidInput(format!(
            "Transfer source and destination are both {}",
            input.from_facility_id
        )));
    }

    let id = Uuid::new_v4().to_string();

    conn.execute(
        r#"
        INSERT INTO transfers (
            id, solution_card_id, from_facility_id, to_facility_id, item_id,
            quantity, status, driver_id, vehicle_type, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            input.solution_card_id,
            input.from_facility_id,
            input.to_facility_id,
            input.item_id,
            input.quantity,
            transfer_statuses::PENDING,
            input.driver_id,
            input.vehicle_type,
            current_timestamp(),
        ],
    )?;

    debug!(transfer_id = %id, card_id = ?input.solution_card_id, "Created transfer");
    Ok(id)
}

/// Get transfer by ID
pub fn get_transfer(conn: &Connection, id: &str) -> Result<Option<TransferRow>, SupplyError> {
    let row = conn
        .query_row("SELECT * FROM transfers WHERE id = ?", params![id], |row| {
            TransferRow::from_row(row)
        })
        .optional()?;
    Ok(row)
}

/// Get the transfer a card authorized, if any
pub fn get_transfer_for_card(
    conn: &Connection,
    card_id: &str,
) -> Result<Option<TransferRow>, SupplyError> {
    let row = conn
        .query_row(
            "SELECT * FROM transfers WHERE solution_card_id = ?",
            params![card_id],
            |row| TransferRow::from_row(row),
        )
        .optional()?;
    Ok(row)
}

/// Count transfers authorized by a card (at most one)
pub fn count_for_card(conn: &Connection, card_id: &str) -> Result<u64, SupplyError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transfers WHERE solution_card_id = ?",
        params![card_id],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}
