//! SQLite ledger for solution cards, inventory and transfers
//!
//! ## Tables
//!
//! - `solution_cards` - Proposed redistributions and their decision status
//! - `inventory` - Quantity per (facility, item), unique per pair
//! - `transfers` - Immutable record of each committed stock movement
//! - `users` - Staff and couriers (drivers are courier candidates)
//!
//! All mutation of cards and inventory happens inside the single transaction
//! opened by the approval service. The functions in the submodules take a
//! `&Connection` so they run unchanged inside a `rusqlite::Transaction`.

pub mod schema;
pub mod context;
pub mod cards;
pub mod inventory;
pub mod transfers;
pub mod couriers;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{info, debug};

use crate::error::SupplyError;

/// Current timestamp in the format stored by every table
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// SQLite database holding the supply ledger
pub struct SupplyDb {
    conn: Mutex<Connection>,
}

impl SupplyDb {
    /// Open or create the ledger database
    pub fn open(storage_dir: &Path, busy_timeout: Duration) -> Result<Self, SupplyError> {
        let db_path = storage_dir.join("supply.db");
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(&db_path)?;

        // WAL keeps dashboard readers off the writer's lock
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(busy_timeout)?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, SupplyError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<(), SupplyError> {
        self.with_conn(|conn| schema::init_schema(conn))
    }

    /// Run a read with shared access to the connection
    pub fn with_conn<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<SupplyError>,
    {
        let conn = self.conn.lock()
            .map_err(|e| SupplyError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access (for transactions)
    pub fn with_conn_mut<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
        E: From<SupplyError>,
    {
        let mut conn = self.conn.lock()
            .map_err(|e| SupplyError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, SupplyError> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64, SupplyError> {
                let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                pending_cards: count("SELECT COUNT(*) FROM solution_cards WHERE status = 'pending'")?,
                inventory_rows: count("SELECT COUNT(*) FROM inventory")?,
                transfers: count("SELECT COUNT(*) FROM transfers")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub pending_cards: u64,
    pub inventory_rows: u64,
    pub transfers: u64,
}

// Re-exports
pub use cards::{card_statuses, CardQuery, NewSolutionCard, PriorityBand, SolutionCard};
pub use context::CallerContext;
pub use inventory::{DebitOutcome, InventoryRow};
pub use transfers::{transfer_statuses, NewTransfer, TransferRow};
pub use couriers::Courier;
