//! Approval service - turns a solution card decision into a stock movement
//!
//! A card moves `pending -> approved` or `pending -> rejected` exactly once.
//! Approval runs the whole movement in one IMMEDIATE SQLite transaction:
//!
//! ```text
//! BEGIN IMMEDIATE            (write lock: serializes decisions)
//!   read card, require pending
//!   normalize payload
//!   debit source             (fails closed)
//!   credit destination       (atomic upsert)
//!   pick courier             (optional)
//!   write transfer record
//!   mark card approved
//! COMMIT
//! ```
//!
//! Any early return drops the transaction, which rolls every step back. A
//! second decision on the same card waits for the lock and then sees the
//! terminal status, so it mutates nothing.

use std::sync::Arc;

use rusqlite::TransactionBehavior;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::db::{cards, couriers, inventory, transfers, SupplyDb};
use crate::db::{card_statuses, CallerContext, CardQuery, Courier, DebitOutcome, NewTransfer};
use crate::error::{ApprovalError, InvalidReason, SupplyError};
use crate::normalize::{normalize_with_columns, NormalizerConfig, TransferRequest};

use super::events::{EventBus, SupplyEvent};

/// Action requested on a card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn parse(action: &str) -> Option<Self> {
        match action.trim() {
            "approve" => Some(Decision::Approve),
            "reject" => Some(Decision::Reject),
            _ => None,
        }
    }
}

/// Result of an applied decision
#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    pub card_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier: Option<Courier>,
}

/// What an approval committed
struct Committed {
    request: TransferRequest,
    transfer_id: String,
    courier: Option<Courier>,
}

/// Approval coordinator over the supply ledger
pub struct ApprovalService {
    db: Arc<SupplyDb>,
    events: Arc<EventBus>,
    normalizer: NormalizerConfig,
    neutral_status: String,
}

impl ApprovalService {
    /// Create a new approval service
    pub fn new(
        db: Arc<SupplyDb>,
        events: Arc<EventBus>,
        normalizer: NormalizerConfig,
        neutral_status: impl Into<String>,
    ) -> Self {
        Self {
            db,
            events,
            normalizer,
            neutral_status: neutral_status.into(),
        }
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    /// Apply an approve or reject decision
    pub fn decide(&self, card_id: &str, decision: Decision) -> Result<DecisionOutcome, ApprovalError> {
        let result = match decision {
            Decision::Approve => self.approve(card_id),
            Decision::Reject => self.reject(card_id),
        };

        if let Err(ref e) = result {
            if e.is_retryable() {
                error!(card_id, error = %e, "Decision failed in storage, rolled back");
            } else {
                warn!(card_id, kind = e.kind(), reason = %e, "Decision rejected");
            }
        }

        result
    }

    /// Approve a card and move the stock it recommends
    pub fn approve(&self, card_id: &str) -> Result<DecisionOutcome, ApprovalError> {
        let committed = self.db.with_conn_mut(|conn| -> Result<Committed, ApprovalError> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let card = cards::get_card(&tx, card_id)?
                .ok_or_else(|| ApprovalError::CardNotFound(card_id.to_string()))?;
            if !card.is_pending() {
                return Err(ApprovalError::AlreadyDecided { status: card.status });
            }

            let request = normalize_with_columns(
                &card.payload,
                card.from_facility_id.as_deref(),
                card.to_facility_id.as_deref(),
                &self.normalizer,
            )?;
            if request.is_self_transfer() {
                return Err(ApprovalError::InvalidRecommendation {
                    reason: InvalidReason::SelfTransfer {
                        facility_id: request.source_facility_id,
                    },
                });
            }

            debug!(
                card_id,
                from = %request.source_facility_id,
                to = %request.dest_facility_id,
                item_id = %request.item_id,
                quantity = request.quantity,
                "Applying transfer"
            );

            match inventory::debit(&tx, &request.source_facility_id, &request.item_id, request.quantity)? {
                DebitOutcome::Debited { .. } => {}
                DebitOutcome::NotFound => {
                    return Err(ApprovalError::NoSourceStock {
                        facility_id: request.source_facility_id,
                        item_id: request.item_id,
                    });
                }
                DebitOutcome::Insufficient { available } => {
                    return Err(ApprovalError::InsufficientStock {
                        available,
                        requested: request.quantity,
                    });
                }
            }

            inventory::credit_upsert(
                &tx,
                &request.dest_facility_id,
                &request.item_id,
                request.quantity,
                &self.neutral_status,
            )?;

            let courier = couriers::pick_courier(&tx)?;

            let transfer_id = transfers::create_transfer(
                &tx,
                &NewTransfer {
                    solution_card_id: Some(&card.id),
                    from_facility_id: &request.source_facility_id,
                    to_facility_id: &request.dest_facility_id,
                    item_id: &request.item_id,
                    quantity: request.quantity,
                    driver_id: courier.as_ref().map(|c| c.id.as_str()),
                    vehicle_type: &request.vehicle_hint,
                },
            )?;

            if !cards::mark_decided(&tx, card_id, card_statuses::APPROVED)? {
                return Err(ApprovalError::AlreadyDecided {
                    status: card_statuses::APPROVED.to_string(),
                });
            }

            tx.commit()?;

            Ok(Committed { request, transfer_id, courier })
        })?;

        info!(
            card_id,
            transfer_id = %committed.transfer_id,
            courier = ?committed.courier.as_ref().map(|c| &c.id),
            "Transfer approved"
        );

        self.events.emit(SupplyEvent::StockMoved {
            item_id: committed.request.item_id.clone(),
            from_facility_id: committed.request.source_facility_id.clone(),
            to_facility_id: committed.request.dest_facility_id.clone(),
            quantity: committed.request.quantity,
        });
        self.events.emit(SupplyEvent::TransferCreated {
            transfer_id: committed.transfer_id.clone(),
            card_id: Some(card_id.to_string()),
            courier_id: committed.courier.as_ref().map(|c| c.id.clone()),
        });
        self.events.emit(SupplyEvent::CardApproved {
            card_id: card_id.to_string(),
            transfer_id: committed.transfer_id.clone(),
        });

        Ok(DecisionOutcome {
            card_id: card_id.to_string(),
            status: card_statuses::APPROVED.to_string(),
            transfer_id: Some(committed.transfer_id),
            courier: committed.courier,
        })
    }

    /// Reject a card; inventory is not touched
    pub fn reject(&self, card_id: &str) -> Result<DecisionOutcome, ApprovalError> {
        self.db.with_conn_mut(|conn| -> Result<(), ApprovalError> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let card = cards::get_card(&tx, card_id)?
                .ok_or_else(|| ApprovalError::CardNotFound(card_id.to_string()))?;
            if !card.is_pending() || !cards::mark_decided(&tx, card_id, card_statuses::REJECTED)? {
                return Err(ApprovalError::AlreadyDecided { status: card.status });
            }

            tx.commit()?;
            Ok(())
        })?;

        info!(card_id, "Card rejected");
        self.events.emit(SupplyEvent::CardRejected { card_id: card_id.to_string() });

        Ok(DecisionOutcome {
            card_id: card_id.to_string(),
            status: card_statuses::REJECTED.to_string(),
            transfer_id: None,
            courier: None,
        })
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Pending cards the caller may decide on
    pub fn queue(&self, ctx: &CallerContext, query: &CardQuery) -> Result<Vec<cards::SolutionCard>, SupplyError> {
        debug!(caller = %ctx, "Loading approval queue");
        self.db.with_conn(|conn| cards::list_pending(conn, ctx, query))
    }

    /// Get card by ID
    pub fn get_card(&self, card_id: &str) -> Result<Option<cards::SolutionCard>, SupplyError> {
        self.db.with_conn(|conn| cards::get_card(conn, card_id))
    }

    /// Get transfer by ID
    pub fn get_transfer(&self, transfer_id: &str) -> Result<Option<transfers::TransferRow>, SupplyError> {
        self.db.with_conn(|conn| transfers::get_transfer(conn, transfer_id))
    }

    /// Get the transfer a card authorized
    pub fn transfer_for_card(&self, card_id: &str) -> Result<Option<transfers::TransferRow>, SupplyError> {
        self.db.with_conn(|conn| transfers::get_transfer_for_card(conn, card_id))
    }

    /// Current stock of an item at a facility
    pub fn inventory(&self, facility_id: &str, item_id: &str) -> Result<Option<inventory::InventoryRow>, SupplyError> {
        self.db.with_conn(|conn| inventory::get_inventory(conn, facility_id, item_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::context::roles;
    use crate::db::NewSolutionCard;
    use serde_json::{json, Value};

    fn service() -> (ApprovalService, Arc<SupplyDb>) {
        let db = Arc::new(SupplyDb::open_in_memory().unwrap());
        let service = ApprovalService::new(
            db.clone(),
            Arc::new(EventBus::new()),
            NormalizerConfig::default(),
            "Healthy",
        );
        (service, db)
    }

    fn seed_card(db: &SupplyDb, id: &str, payload: Value) {
        db.with_conn(|conn| {
            cards::insert_card(conn, NewSolutionCard {
                id: Some(id.to_string()),
                payload,
                ..Default::default()
            })
        })
        .unwrap();
    }

    fn stock(db: &SupplyDb, facility: &str, item: &str) -> Option<i64> {
        db.with_conn(|conn| inventory::get_inventory(conn, facility, item))
            .unwrap()
            .map(|row| row.quantity)
    }

    fn flat(qty: i64) -> Value {
        json!({
            "source_facility_id": "F1",
            "destination_facility_id": "F2",
            "item_id": "ITM1",
            "quantity": qty
        })
    }

    #[test]
    fn test_decision_parse() {
        assert_eq!(Decision::parse("approve"), Some(Decision::Approve));
        assert_eq!(Decision::parse("reject"), Some(Decision::Reject));
        assert_eq!(Decision::parse("APPROVE"), None);
    }

    #[test]
    fn test_approve_moves_stock_and_records_transfer() {
        let (service, db) = service();
        db.with_conn(|conn| inventory::set_stock(conn, "F1", "ITM1", 10, "Healthy")).unwrap();
        seed_card(&db, "c1", flat(10));

        let outcome = service.approve("c1").unwrap();
        assert_eq!(outcome.status, card_statuses::APPROVED);
        assert!(outcome.courier.is_none());

        assert_eq!(stock(&db, "F1", "ITM1"), Some(0));
        assert_eq!(stock(&db, "F2", "ITM1"), Some(10));

        let transfer = service.get_transfer(outcome.transfer_id.as_deref().unwrap()).unwrap().unwrap();
        assert_eq!(transfer.status, transfers::transfer_statuses::PENDING);
        assert_eq!(transfer.solution_card_id.as_deref(), Some("c1"));
        assert_eq!(transfer.vehicle_type, "BIKE");
    }

    #[test]
    fn test_insufficient_stock_leaves_card_pending() {
        let (service, db) = service();
        db.with_conn(|conn| inventory::set_stock(conn, "F1", "ITM1", 3, "Critical")).unwrap();
        seed_card(&db, "c1", flat(5));

        let err = service.approve("c1").unwrap_err();
        assert!(matches!(err, ApprovalError::InsufficientStock { available: 3, requested: 5 }));
        assert_eq!(stock(&db, "F1", "ITM1"), Some(3));
        assert_eq!(stock(&db, "F2", "ITM1"), None);
        assert!(service.get_card("c1").unwrap().unwrap().is_pending());
    }

    #[test]
    fn test_missing_source_row() {
        let (service, db) = service();
        seed_card(&db, "c1", flat(5));
        assert!(matches!(service.approve("c1"), Err(ApprovalError::NoSourceStock { .. })));
        assert!(service.get_card("c1").unwrap().unwrap().is_pending());
    }

    #[test]
    fn test_self_transfer_rejected_before_mutation() {
        let (service, db) = service();
        db.with_conn(|conn| inventory::set_stock(conn, "F1", "ITM1", 10, "Healthy")).unwrap();
        seed_card(&db, "c1", json!({
            "source_facility_id": "F1",
            "destination_facility_id": "F1",
            "item_id": "ITM1",
            "quantity": 2
        }));

        let err = service.approve("c1").unwrap_err();
        assert!(matches!(
            err,
            ApprovalError::InvalidRecommendation { reason: InvalidReason::SelfTransfer { .. } }
        ));
        assert_eq!(stock(&db, "F1", "ITM1"), Some(10));
    }

    #[test]
    fn test_bad_payload_keeps_card_pending() {
        let (service, db) = service();
        db.with_conn(|conn| inventory::set_stock(conn, "F1", "ITM1", 10, "Healthy")).unwrap();
        seed_card(&db, "c1", json!({
            "source_facility_id": "F1",
            "destination_facility_id": "F2",
            "item_id": "ITM1",
            "quantity": 0
        }));

        let err = service.approve("c1").unwrap_err();
        assert_eq!(err.kind(), "MalformedQuantity");
        assert!(!err.is_retryable());
        assert!(service.get_card("c1").unwrap().unwrap().is_pending());
        assert!(service.transfer_for_card("c1").unwrap().is_none());
        assert_eq!(stock(&db, "F1", "ITM1"), Some(10));
        assert_eq!(stock(&db, "F2", "ITM1"), None);
    }

    #[test]
    fn test_destination_overflow_rolls_back_debit() {
        let (service, db) = service();
        db.with_conn(|conn| {
            inventory::set_stock(conn, "F1", "ITM1", 10, "Healthy")?;
            inventory::set_stock(conn, "F2", "ITM1", i64::MAX - 1, "Healthy")
        })
        .unwrap();
        seed_card(&db, "c1", flat(5));

        let err = service.approve("c1").unwrap_err();
        assert_eq!(err.kind(), "InvalidRecommendation");
        assert!(!err.is_retryable());
        assert_eq!(stock(&db, "F1", "ITM1"), Some(10));
        assert_eq!(stock(&db, "F2", "ITM1"), Some(i64::MAX - 1));
        assert!(service.get_card("c1").unwrap().unwrap().is_pending());
    }

    #[test]
    fn test_reject_then_approve() {
        let (service, db) = service();
        db.with_conn(|conn| inventory::set_stock(conn, "F1", "ITM1", 10, "Healthy")).unwrap();
        seed_card(&db, "c1", flat(5));

        let outcome = service.decide("c1", Decision::Reject).unwrap();
        assert_eq!(outcome.status, card_statuses::REJECTED);

        let err = service.decide("c1", Decision::Approve).unwrap_err();
        assert!(matches!(err, ApprovalError::AlreadyDecided { ref status } if status == "rejected"));
        assert_eq!(stock(&db, "F1", "ITM1"), Some(10));
        assert!(matches!(service.reject("c1"), Err(ApprovalError::AlreadyDecided { .. })));
    }

    #[test]
    fn test_unknown_card() {
        let (service, _db) = service();
        assert!(matches!(service.approve("nope"), Err(ApprovalError::CardNotFound(_))));
        assert!(matches!(service.reject("nope"), Err(ApprovalError::CardNotFound(_))));
    }

    #[test]
    fn test_courier_bound_when_available() {
        let (service, db) = service();
        db.with_conn(|conn| {
            inventory::set_stock(conn, "F1", "ITM1", 10, "Healthy")?;
            couriers::insert_user(conn, "d1", "Ravi", Some("ravi@fleet.example"), roles::DRIVER)
        })
        .unwrap();
        seed_card(&db, "c1", flat(4));

        let outcome = service.approve("c1").unwrap();
        assert_eq!(outcome.courier.as_ref().map(|c| c.id.as_str()), Some("d1"));

        let transfer = service.transfer_for_card("c1").unwrap().unwrap();
        assert_eq!(transfer.driver_id.as_deref(), Some("d1"));
    }

    #[tokio::test]
    async fn test_events_follow_commit() {
        let (service, db) = service();
        let mut receiver = service.events.subscribe();
        db.with_conn(|conn| inventory::set_stock(conn, "F1", "ITM1", 10, "Healthy")).unwrap();
        seed_card(&db, "c1", flat(2));
        seed_card(&db, "c2", flat(50));

        assert!(service.approve("c2").is_err());
        service.approve("c1").unwrap();

        match receiver.recv().await.unwrap() {
            SupplyEvent::StockMoved { quantity, .. } => assert_eq!(quantity, 2),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
