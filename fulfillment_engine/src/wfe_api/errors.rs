use thiserror::Error;

use crate::{
    db_types::OrderNumber,
    traits::{FulfillmentError, OrderQueryError, TransactionError},
};

#[derive(Debug, Clone, Error)]
pub enum RefundError {
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderNumber),
    #[error("The refund cannot be processed: {0}")]
    CannotRefund(String),
    #[error("An explicit amount is ambiguous when the order has more than one active payment")]
    OrderHasMultiplePayments,
    #[error("{0}")]
    FulfillmentError(#[from] FulfillmentError),
    #[error("{0}")]
    TransactionError(#[from] TransactionError),
    #[error("{0}")]
    QueryError(#[from] OrderQueryError),
}
