use serde::{Deserialize, Serialize};
use wfe_common::Money;

use crate::db_types::{Checkout, Fulfillment, Order, TransactionEventRow, TransactionItem, WarehouseId};

/// One requested fulfillment line: ship `quantity` of `order_line_id` from `warehouse_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentLineInput {
    pub warehouse_id: WarehouseId,
    pub order_line_id: i64,
    pub quantity: i64,
}

impl FulfillmentLineInput {
    pub fn new(warehouse_id: WarehouseId, order_line_id: i64, quantity: i64) -> Self {
        Self { warehouse_id, order_line_id, quantity }
    }
}

/// Why a single line of a fulfillment batch was rejected. Rejections never abort lines that
/// succeeded; the caller reports them all in one round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineRejectReason {
    /// The warehouse cannot cover the requested quantity.
    InsufficientStock { available: i64 },
    /// The requested quantity exceeds the line's unfulfilled pool.
    ExceedsUnfulfilled { unfulfilled: i64 },
    /// The line is a preorder whose variant has not been released.
    PreorderNotReleased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedLine {
    pub order_line_id: i64,
    pub warehouse_id: WarehouseId,
    pub requested: i64,
    pub reason: LineRejectReason,
}

/// The outcome of a fulfillment batch: fulfillments that were created (one per warehouse group)
/// alongside the per-line rejections. Partial success is a first-class outcome.
#[derive(Debug, Clone)]
pub struct FulfillmentBatch {
    pub order: Order,
    pub fulfillments: Vec<Fulfillment>,
    pub rejected: Vec<RejectedLine>,
}

#[derive(Debug, Clone)]
pub struct ApproveOutcome {
    pub order: Order,
    pub fulfillment: Fulfillment,
}

#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub order: Order,
    /// `None` when an unapproved fulfillment was deleted outright.
    pub fulfillment: Option<Fulfillment>,
}

/// Where a return/replace tuple sources its quantity from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnSource {
    /// Unfulfilled quantity, straight off the order line.
    OrderLine(i64),
    /// Quantity already placed in a fulfillment.
    FulfillmentLine(i64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnItemInput {
    pub source: ReturnSource,
    pub quantity: i64,
    /// `true` routes the quantity to the replace set; a replacement order is spawned for it.
    pub replace: bool,
}

impl ReturnItemInput {
    pub fn order_line(order_line_id: i64, quantity: i64) -> Self {
        Self { source: ReturnSource::OrderLine(order_line_id), quantity, replace: false }
    }

    pub fn fulfillment_line(fulfillment_line_id: i64, quantity: i64) -> Self {
        Self { source: ReturnSource::FulfillmentLine(fulfillment_line_id), quantity, replace: false }
    }

    pub fn replaced(mut self) -> Self {
        self.replace = true;
        self
    }
}

/// The ledger-side outcome of a return/replace flow. The gateway call and refund-amount
/// bookkeeping happen afterwards, at the API layer.
#[derive(Debug, Clone)]
pub struct ReturnOutcome {
    pub order: Order,
    pub return_fulfillment: Option<Fulfillment>,
    pub replace_fulfillment: Option<Fulfillment>,
    pub replacement_order: Option<Order>,
    /// `(order_line_id, quantity)` for every line touched, return and replace sets alike.
    pub touched: Vec<(i64, i64)>,
    /// Σ(unit_price_gross × qty) over the return set only; replacements are never billed.
    pub return_subtotal: Money,
}

/// The owner of a transaction item. Exactly one of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionOwner {
    Order(i64),
    Checkout(i64),
}

/// Status edges crossed by a transaction create/update, used to fire the corresponding
/// notifications exactly once per transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaymentTransitions {
    pub newly_fully_paid: bool,
    pub newly_fully_authorized: bool,
    pub newly_fully_refunded: bool,
}

#[derive(Debug, Clone)]
pub struct TransactionFlowResult {
    pub transaction: TransactionItem,
    pub events: Vec<TransactionEventRow>,
    pub order: Option<Order>,
    pub checkout: Option<Checkout>,
    pub transitions: PaymentTransitions,
}
