//! Business-rule failures of lot operations.

use thiserror::Error;

use lotkeeper_core::{DomainError, LotId, MaterialId, Quantity, WarehouseId};

/// Result type used across the lot domain.
pub type LotResult<T> = Result<T, LotError>;

/// Why a lot operation was rejected.
///
/// Every variant is detected before anything is written, so a rejected
/// operation leaves the lot store exactly as it was.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LotError {
    #[error("lot {0} not found")]
    NotFound(LotId),

    /// A non-positive or malformed amount.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("insufficient quantity: requested {requested}, available {available}")]
    InsufficientQuantity {
        requested: Quantity,
        available: Quantity,
    },

    /// The operation is forbidden while the lot is reserved.
    #[error("lot {0} is reserved")]
    ReservedConflict(LotId),

    #[error(
        "lot {lot_id} (material {material_id}, warehouse {warehouse_id}) cannot be merged with the other lots"
    )]
    IncompatibleMerge {
        lot_id: LotId,
        material_id: MaterialId,
        warehouse_id: WarehouseId,
    },

    /// An exhausted lot was supplied as merge input.
    #[error("lot {0} is empty")]
    EmptyLot(LotId),

    #[error("lot {0} is not reserved")]
    NotReserved(LotId),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl LotError {
    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Stable machine-readable kind, for presentation layers.
    pub fn kind(&self) -> &'static str {
        match self {
            LotError::NotFound(_) => "not_found",
            LotError::InvalidQuantity(_) => "invalid_quantity",
            LotError::InsufficientQuantity { .. } => "insufficient_quantity",
            LotError::ReservedConflict(_) => "reserved_conflict",
            LotError::IncompatibleMerge { .. } => "incompatible_merge",
            LotError::EmptyLot(_) => "empty_lot",
            LotError::NotReserved(_) => "not_reserved",
            LotError::InvalidOperation(_) => "invalid_operation",
        }
    }
}

impl From<DomainError> for LotError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => LotError::InvalidQuantity(msg),
            DomainError::InvalidId(msg) => LotError::InvalidOperation(msg),
        }
    }
}
