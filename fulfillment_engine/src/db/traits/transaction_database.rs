use thiserror::Error;
use wfe_common::Money;

use crate::{
    db_types::{
        Checkout,
        GrantedRefund,
        NewCheckout,
        NewTransaction,
        Order,
        TransactionEventRow,
        TransactionItem,
        TransactionUpdate,
    },
    traits::data_objects::{PaymentTransitions, TransactionFlowResult, TransactionOwner},
};

/// Payment-transaction aggregation flows.
///
/// Every create/update runs in a single write transaction that reads and writes the owner row
/// (order or checkout) together with the transaction row, so concurrent mutations of the same
/// pair are serialized and totals are never recomputed from a torn read.
#[allow(async_fn_in_trait)]
pub trait TransactionDatabase: Clone {
    /// Stores a checkout that can own transaction items before an order exists.
    async fn insert_checkout(&self, checkout: NewCheckout) -> Result<Checkout, TransactionError>;

    async fn fetch_checkout(&self, checkout_id: i64) -> Result<Option<Checkout>, TransactionError>;

    /// Creates a transaction item for the owner and recomputes the owner's aggregates and
    /// charge/authorize statuses. One calculation event is written per non-zero confirmed amount,
    /// carrying the full initial value.
    async fn create_transaction(
        &self,
        owner: TransactionOwner,
        transaction: NewTransaction,
    ) -> Result<TransactionFlowResult, TransactionError>;

    /// Applies a partial amount update and recomputes the owner's aggregates and statuses.
    ///
    /// One delta event (`new − previous`) is written per changed confirmed field; authorized
    /// changes write an `AuthorizationAdjustment` instead of an `AuthorizationSuccess`. Pending
    /// values change state without events.
    async fn update_transaction(
        &self,
        transaction_id: i64,
        update: TransactionUpdate,
    ) -> Result<TransactionFlowResult, TransactionError>;

    async fn fetch_transaction(&self, transaction_id: i64) -> Result<Option<TransactionItem>, TransactionError>;

    async fn fetch_transactions_for_order(&self, order_id: i64) -> Result<Vec<TransactionItem>, TransactionError>;

    async fn fetch_transaction_events(&self, transaction_id: i64)
        -> Result<Vec<TransactionEventRow>, TransactionError>;

    /// Grants a refund against the order, reducing its charge target, and re-derives the order's
    /// statuses. Reducing the target can itself cross the fully-paid edge, so the transitions are
    /// reported here too.
    async fn grant_refund(
        &self,
        order_id: i64,
        amount: Money,
        reason: &str,
    ) -> Result<(GrantedRefund, Order, PaymentTransitions), TransactionError>;

    /// The number of transaction items on the order that hold or expect money (a confirmed or
    /// pending authorized/charged amount). Used to reject ambiguous amount-based refunds.
    async fn active_transaction_count(&self, order_id: i64) -> Result<i64, TransactionError>;
}

#[derive(Debug, Clone, Error)]
pub enum TransactionError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The requested transaction {0} does not exist")]
    TransactionNotFound(i64),
    #[error("The transaction owner does not exist: {0:?}")]
    OwnerNotFound(TransactionOwner),
    #[error("Transaction currency {transaction} does not match the owner currency {owner}")]
    CurrencyMismatch { transaction: String, owner: String },
}

impl From<sqlx::Error> for TransactionError {
    fn from(e: sqlx::Error) -> Self {
        TransactionError::DatabaseError(e.to_string())
    }
}
