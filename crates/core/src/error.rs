//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic rejection of a single call. A call that
/// fails with any of these leaves the ledger exactly as it was.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The caller lacks the privilege the operation requires.
    #[error("unauthorized")]
    Unauthorized,

    /// The referenced product id or name does not exist.
    #[error("not found")]
    NotFound,

    /// The product has no units left.
    #[error("out of stock")]
    OutOfStock,

    /// The caller already holds an un-refunded unit of the product.
    #[error("product already purchased by this caller")]
    AlreadyPurchased,

    /// Refund requested without an active purchase.
    #[error("nothing to refund")]
    NothingToRefund,

    /// Refund requested after the refund window closed.
    #[error("refund window expired ({elapsed} blocks elapsed, window is {window})")]
    RefundWindowExpired { elapsed: u64, window: u64 },

    /// Malformed input (e.g. empty name, quantity overflow).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl DomainError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn refund_window_expired(elapsed: u64, window: u64) -> Self {
        Self::RefundWindowExpired { elapsed, window }
    }
}
