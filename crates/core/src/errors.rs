use thiserror::Error;

use crate::domain::order::OrderStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid order transition from {from:?} to {to:?}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },
    #[error("quantity must be at least 1")]
    QuantityZero,
    #[error("unit price cannot be negative")]
    NegativePrice,
    #[error("discount percentage must be between 0 and 100")]
    DiscountOutOfRange,
    #[error("invalid email address `{0}`")]
    InvalidEmail(String),
    #[error("no cart line for product `{0}`")]
    LineNotFound(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}
