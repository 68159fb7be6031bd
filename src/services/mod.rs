//! Service layer for district-supply
//!
//! Services hold the business rules between HTTP handlers and the ledger:
//! - Decision state machine
//! - Transaction boundaries
//! - Event emission after commit
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (business logic)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod response;
pub mod events;
pub mod approval_service;

// Re-exports
pub use events::{EventBus, EventListener, SupplyEvent};
pub use approval_service::{ApprovalService, Decision, DecisionOutcome};

use crate::config::Config;
use crate::db::SupplyDb;
use std::sync::Arc;

/// Service container for dependency injection
pub struct Services {
    pub approvals: Arc<ApprovalService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services over a shared ledger
    pub fn new(db: Arc<SupplyDb>, config: &Config) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            approvals: Arc::new(ApprovalService::new(
                db,
                events.clone(),
                config.normalizer(),
                config.neutral_status.clone(),
            )),
            events,
        }
    }
}
