use thiserror::Error;

use crate::{
    adjustments::AdjustmentError,
    db_types::{MixedGatewayModes, OrderError, OrderId},
    gateway::InvalidFeeSplit,
    state_machines::TransitionError,
    traits::{CollaboratorError, GatewayError, RepositoryError},
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("Invalid request. {0}")]
    Validation(String),
    #[error("{0}")]
    Gateway(#[from] GatewayError),
    #[error("Order {0} is being modified by another request. Reload the order and try again.")]
    ConcurrentModification(OrderId),
    #[error("Adjustments do not reconcile. {0}")]
    AdjustmentInconsistency(String),
    #[error("{0}")]
    Transition(#[from] TransitionError),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {0} has no payment that this operation applies to")]
    NoPayment(OrderId),
    #[error("{0}")]
    MixedGatewayModes(#[from] MixedGatewayModes),
    #[error("Database error: {0}")]
    Database(String),
    #[error("{0}")]
    Collaborator(#[from] CollaboratorError),
}

impl From<RepositoryError> for CheckoutError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::VersionConflict { id, .. } => CheckoutError::ConcurrentModification(id),
            RepositoryError::OrderNotFound(id) => CheckoutError::OrderNotFound(id),
            e => CheckoutError::Database(e.to_string()),
        }
    }
}

impl From<AdjustmentError> for CheckoutError {
    fn from(e: AdjustmentError) -> Self {
        match e {
            AdjustmentError::Order(e) => CheckoutError::Validation(e.to_string()),
            e @ AdjustmentError::DepositOverflow(_) => CheckoutError::Validation(e.to_string()),
            AdjustmentError::Collaborator(e) => CheckoutError::Collaborator(e),
            e @ AdjustmentError::Inconsistent { .. } => CheckoutError::AdjustmentInconsistency(e.to_string()),
        }
    }
}

impl From<OrderError> for CheckoutError {
    fn from(e: OrderError) -> Self {
        CheckoutError::Validation(e.to_string())
    }
}

impl From<InvalidFeeSplit> for CheckoutError {
    fn from(e: InvalidFeeSplit) -> Self {
        CheckoutError::Validation(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn version_conflicts_are_concurrent_modifications() {
        let e = RepositoryError::VersionConflict { id: OrderId(4), expected: 2, found: 3 };
        assert_eq!(CheckoutError::from(e), CheckoutError::ConcurrentModification(OrderId(4)));
        let e = RepositoryError::DatabaseError("disk full".into());
        assert_eq!(CheckoutError::from(e).to_string(), "Database error: Database error: disk full");
    }
}
