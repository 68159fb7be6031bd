//! District Supply - Recommendation-to-transfer approval engine
//!
//! Turns a pending redistribution recommendation ("solution card") into a
//! committed stock movement between two facilities of a district.
//!
//! ## Architecture
//!
//! - **Normalizer**: resolves the loosely-shaped recommendation payload into a
//!   strict [`TransferRequest`]
//! - **Approval service**: pending → approved | rejected, run as one SQLite
//!   transaction that debits the source, credits the destination and writes
//!   the transfer record
//! - **HTTP API**: approval queue and decision endpoints for district officers
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/district-supply/
//! ├── supply.db              # SQLite ledger (WAL mode)
//! └── config.toml            # Configuration
//! ```
//!
//! ## Guarantees
//!
//! A card is decided at most once. Approval either commits all of debit,
//! credit, transfer record and status change, or none of them. Stock of an
//! item is conserved across facilities by every approval.

pub mod config;
pub mod error;
pub mod normalize;
pub mod db;
pub mod services;
pub mod http;

// Re-exports
pub use config::Config;
pub use error::{ApprovalError, InvalidReason, NormalizationError, PayloadField, SupplyError};
pub use normalize::{normalize, normalize_with_columns, NormalizerConfig, TransferRequest};
pub use db::{CallerContext, SupplyDb};
pub use services::{ApprovalService, Decision, DecisionOutcome, EventBus, Services, SupplyEvent};
pub use http::HttpServer;
