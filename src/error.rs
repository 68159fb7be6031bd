//! Error types for district-supply

use thiserror::Error;

/// Repository and infrastructure errors
#[derive(Error, Debug)]
pub enum SupplyError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A payload field the normalizer resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadField {
    ItemId,
    SourceFacilityId,
    DestFacilityId,
    Quantity,
}

impl PayloadField {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadField::ItemId => "item_id",
            PayloadField::SourceFacilityId => "source_facility_id",
            PayloadField::DestFacilityId => "destination_facility_id",
            PayloadField::Quantity => "quantity",
        }
    }
}

impl std::fmt::Display for PayloadField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to turn a recommendation payload into a transfer request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("payload is empty or not an object")]
    EmptyPayload,

    #[error("missing field: {field}")]
    MissingField { field: PayloadField },

    #[error("malformed quantity: {value}")]
    MalformedQuantity { value: String },

    #[error("item '{value}' is a name, not an item id")]
    AmbiguousItem { value: String },
}

/// Why a recommendation cannot be turned into a transfer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    #[error(transparent)]
    Payload(#[from] NormalizationError),

    #[error("source and destination are the same facility ({facility_id})")]
    SelfTransfer { facility_id: String },

    /// The ledger refused the movement as stated (e.g. a credit past i64)
    #[error("{0}")]
    Ledger(String),
}

/// Outcome kinds of an approval decision that did not apply
///
/// Every variant except `StorageUnavailable` is a business rejection that left
/// all state unchanged.
#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("Solution card not found: {0}")]
    CardNotFound(String),

    #[error("Request already processed (status: {status})")]
    AlreadyDecided { status: String },

    #[error("Invalid recommendation: {reason}")]
    InvalidRecommendation { reason: InvalidReason },

    #[error("Source facility {facility_id} does not stock item {item_id}")]
    NoSourceStock { facility_id: String, item_id: String },

    #[error("Insufficient stock at donor facility: available {available}, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl ApprovalError {
    /// Stable machine-readable kind for the wire
    pub fn kind(&self) -> &'static str {
        match self {
            ApprovalError::CardNotFound(_) => "CardNotFound",
            ApprovalError::AlreadyDecided { .. } => "AlreadyDecided",
            ApprovalError::InvalidRecommendation { reason } => match reason {
                InvalidReason::Payload(NormalizationError::MissingField { .. }) => "MissingField",
                InvalidReason::Payload(NormalizationError::MalformedQuantity { .. }) => {
                    "MalformedQuantity"
                }
                InvalidReason::Payload(NormalizationError::AmbiguousItem { .. }) => "AmbiguousItem",
                _ => "InvalidRecommendation",
            },
            ApprovalError::NoSourceStock { .. } => "NoSourceStock",
            ApprovalError::InsufficientStock { .. } => "InsufficientStock",
            ApprovalError::StorageUnavailable(_) => "StorageUnavailable",
        }
    }

    /// Only a rolled-back storage failure may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApprovalError::StorageUnavailable(_))
    }
}

impl From<NormalizationError> for ApprovalError {
    fn from(e: NormalizationError) -> Self {
        ApprovalError::InvalidRecommendation { reason: InvalidReason::Payload(e) }
    }
}

impl From<rusqlite::Error> for ApprovalError {
    fn from(e: rusqlite::Error) -> Self {
        ApprovalError::StorageUnavailable(e.to_string())
    }
}

impl From<SupplyError> for ApprovalError {
    fn from(e: SupplyError) -> Self {
        match e {
            // Retrying the same input cannot succeed
            SupplyError::InvalidInput(msg) => ApprovalError::InvalidRecommendation {
                reason: InvalidReason::Ledger(msg),
            },
            other => ApprovalError::StorageUnavailable(other.to_string()),
        }
    }
}
