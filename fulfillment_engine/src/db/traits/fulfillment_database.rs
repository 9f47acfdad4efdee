use thiserror::Error;
use wfe_common::Money;

use crate::{
    db_types::{
        Allocation,
        Fulfillment,
        NewOrder,
        NewOrderLine,
        NewStock,
        Order,
        OrderEventRow,
        OrderEventType,
        OrderLine,
        OrderNumber,
        Stock,
        WarehouseId,
    },
    traits::{
        data_objects::{ApproveOutcome, CancelOutcome, FulfillmentBatch, FulfillmentLineInput, ReturnItemInput, ReturnOutcome},
        OrderManagement,
    },
};

/// This trait defines the write-side behaviour for backends supporting the fulfillment engine.
///
/// This behaviour includes:
/// * The stock ledger: allocations reserving quantity against order lines, and the
///   consume/restock pair that moves quantity in and out of warehouses.
/// * The fulfillment lifecycle flows (create, approve, cancel), each atomic with its ledger side
///   effects.
/// * The return/replace bookkeeping that splits requested lines into return and replace
///   fulfillments and spawns replacement orders.
/// * The order audit trail.
///
/// Every flow recomputes the owning order's status before returning, but only when the current
/// status is fulfillment-derived; `Draft`, `Unconfirmed` and `Canceled` are never overwritten.
#[allow(async_fn_in_trait)]
pub trait FulfillmentDatabase: Clone + OrderManagement {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Stores a new order together with its lines, in a single atomic transaction.
    /// Fails with [`FulfillmentError::OrderAlreadyExists`] when the order number is taken.
    async fn insert_order(&self, order: NewOrder, lines: Vec<NewOrderLine>)
        -> Result<(Order, Vec<OrderLine>), FulfillmentError>;

    /// Creates the stock record for `(warehouse, variant)`, or adds the quantity to an existing
    /// record.
    async fn upsert_stock(&self, stock: NewStock) -> Result<Stock, FulfillmentError>;

    /// Reserves `quantity` of the stock against the order line. Fails with
    /// [`FulfillmentError::InsufficientStock`] when the total allocation for the stock would
    /// exceed its on-hand quantity, unless `allow_exceed` is set.
    async fn allocate(
        &self,
        order_line_id: i64,
        stock_id: i64,
        quantity: i64,
        allow_exceed: bool,
    ) -> Result<Allocation, FulfillmentError>;

    /// Releases up to `quantity` of the reservation. Never goes below zero; a reservation that
    /// reaches zero is removed.
    async fn deallocate(&self, order_line_id: i64, stock_id: i64, quantity: i64) -> Result<(), FulfillmentError>;

    /// Creates one fulfillment per warehouse group out of the requested lines.
    ///
    /// With `approved`, stock is consumed and each line's `quantity_fulfilled` is bumped;
    /// otherwise availability is only validated and the fulfillments are created
    /// `WaitingForApproval`, consuming nothing.
    ///
    /// Ineligible or under-stocked lines are collected into [`FulfillmentBatch::rejected`], one
    /// entry per offending line; lines that succeed are retained. Duplicated
    /// `(warehouse, order line)` pairs in the input are a fatal
    /// [`FulfillmentError::DuplicatedInputItem`].
    async fn create_fulfillments(
        &self,
        order_id: i64,
        lines: &[FulfillmentLineInput],
        approved: bool,
        allow_exceed: bool,
        tracking_number: Option<&str>,
    ) -> Result<FulfillmentBatch, FulfillmentError>;

    /// Transitions a fulfillment from `WaitingForApproval` to `Fulfilled`, performing the
    /// deferred stock consumption for every line.
    ///
    /// The consumption is atomic: when any line lacks stock and `allow_exceed` is false, nothing
    /// is consumed, the fulfillment stays `WaitingForApproval`, and every shortfall is reported
    /// together in [`FulfillmentError::InsufficientStock`]. Unreleased preorder lines fail with
    /// [`FulfillmentError::FulfillOrderLine`].
    async fn approve_fulfillment(&self, fulfillment_id: i64, allow_exceed: bool)
        -> Result<ApproveOutcome, FulfillmentError>;

    /// Cancels a fulfillment.
    ///
    /// `WaitingForApproval` fulfillments are deleted outright; nothing was consumed, so the
    /// ledger is untouched. `Fulfilled` fulfillments require a `warehouse` to restock into: every
    /// line's quantity goes back to stock and into a fresh allocation, `quantity_fulfilled` is
    /// decremented, and the fulfillment is kept with status `Canceled`. Any other status fails
    /// with [`FulfillmentError::CannotCancelFulfillment`], as does a fulfillment containing
    /// gift-card lines.
    async fn cancel_fulfillment(
        &self,
        fulfillment_id: i64,
        warehouse: Option<&WarehouseId>,
    ) -> Result<CancelOutcome, FulfillmentError>;

    /// The ledger half of the return/replace orchestration: validates the requested tuples,
    /// splits them by `replace`, merges them into (or creates) the return and replace
    /// fulfillments, spawns at most one replacement order, and writes the `FulfillmentReturned`
    /// audit event. Money movement is the caller's concern.
    async fn process_return_and_replace(
        &self,
        order_id: i64,
        items: &[ReturnItemInput],
        refund: bool,
    ) -> Result<ReturnOutcome, FulfillmentError>;

    /// The ledger half of a refund without physical return: the quantities move into a `Refunded`
    /// fulfillment (merged via the same rule) with the same line accounting as a return, but no
    /// replacement order is ever spawned and `replace` flags on the inputs are ignored.
    async fn process_fulfillment_refund(
        &self,
        order_id: i64,
        items: &[ReturnItemInput],
    ) -> Result<ReturnOutcome, FulfillmentError>;

    /// Records the refund amounts computed for a return fulfillment.
    async fn set_fulfillment_refund_amounts(
        &self,
        fulfillment_id: i64,
        total: Money,
        shipping: Money,
    ) -> Result<Fulfillment, FulfillmentError>;

    /// Persists a new tracking number and writes the `TrackingUpdated` audit event.
    async fn update_tracking_number(&self, fulfillment_id: i64, tracking: &str)
        -> Result<Fulfillment, FulfillmentError>;

    /// Appends an entry to the order audit trail.
    async fn insert_order_event(
        &self,
        order_id: i64,
        event_type: OrderEventType,
        params: serde_json::Value,
    ) -> Result<OrderEventRow, FulfillmentError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), FulfillmentError> {
        Ok(())
    }
}

/// A single over-subscribed line, reported together with all its peers rather than fail-fast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsufficientStockLine {
    pub order_line_id: i64,
    pub warehouse_id: WarehouseId,
    pub requested: i64,
    pub available: i64,
}

#[derive(Debug, Clone, Error)]
pub enum FulfillmentError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Cannot insert order, since it already exists with number {0}")]
    OrderAlreadyExists(OrderNumber),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderNumber),
    #[error("The requested order (internal id {0}) does not exist")]
    OrderIdNotFound(i64),
    #[error("The requested fulfillment {0} does not exist")]
    FulfillmentNotFound(i64),
    #[error("The requested order line {0} does not exist")]
    OrderLineNotFound(i64),
    #[error("The requested fulfillment line {0} does not exist")]
    FulfillmentLineNotFound(i64),
    #[error("There is no stock record for the requested warehouse and variant")]
    StockNotFound,
    #[error("Insufficient stock for {} line(s)", .0.len())]
    InsufficientStock(Vec<InsufficientStockLine>),
    #[error("Requested quantity {requested} exceeds the refundable quantity {available} for line {order_line_id}")]
    InvalidQuantity { order_line_id: i64, requested: i64, available: i64 },
    #[error("Gift card lines cannot be refunded, returned, replaced or cancelled (line {0})")]
    GiftCardLine(i64),
    #[error("Cannot cancel fulfillment {fulfillment_id}: {reason}")]
    CannotCancelFulfillment { fulfillment_id: i64, reason: String },
    #[error("Cannot approve fulfillment {fulfillment_id} in status {status}")]
    CannotApproveFulfillment { fulfillment_id: i64, status: String },
    #[error("Site policy requires payment before fulfillment, and the order is not sufficiently paid")]
    CannotFulfillUnpaidOrder,
    #[error("Order line {order_line_id} cannot be fulfilled: {reason}")]
    FulfillOrderLine { order_line_id: i64, reason: String },
    #[error("The same item appears more than once in the request: {0}")]
    DuplicatedInputItem(String),
    #[error("Cancelling a fulfilled fulfillment requires a restock warehouse")]
    WarehouseRequired,
}

impl From<sqlx::Error> for FulfillmentError {
    fn from(e: sqlx::Error) -> Self {
        FulfillmentError::DatabaseError(e.to_string())
    }
}

impl From<crate::traits::OrderQueryError> for FulfillmentError {
    fn from(e: crate::traits::OrderQueryError) -> Self {
        FulfillmentError::DatabaseError(e.to_string())
    }
}
