use serde::{Deserialize, Serialize};
use wfe_common::Money;

use crate::{
    db_types::{Fulfillment, Order, OrderNumber},
    gateway::RefundTarget,
    traits::ReturnItemInput,
};

/// One return/replace/refund orchestration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub order_number: OrderNumber,
    /// The payment to refund against, or an explicit allocation list for multi-payment orders.
    pub payment: RefundTarget,
    pub items: Vec<ReturnItemInput>,
    /// Move money back to the customer for the return set.
    pub refund: bool,
    /// Add the order's gross shipping price to the refund.
    pub refund_shipping_costs: bool,
    /// Overrides the computed amount. Only legal against a single unambiguous payment.
    pub amount: Option<Money>,
}

impl ReturnRequest {
    pub fn new(order_number: OrderNumber, payment: RefundTarget, items: Vec<ReturnItemInput>) -> Self {
        Self { order_number, payment, items, refund: false, refund_shipping_costs: false, amount: None }
    }

    pub fn with_refund(mut self) -> Self {
        self.refund = true;
        self
    }

    pub fn with_shipping_costs(mut self) -> Self {
        self.refund_shipping_costs = true;
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// A refund for goods the customer keeps: the quantities land in a `Refunded` fulfillment and the
/// gateway is always asked to move the money.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundProductsRequest {
    pub order_number: OrderNumber,
    pub payment: RefundTarget,
    /// `replace` flags on the items are ignored; nothing is redelivered.
    pub items: Vec<ReturnItemInput>,
    pub refund_shipping_costs: bool,
    pub amount: Option<Money>,
}

impl RefundProductsRequest {
    pub fn new(order_number: OrderNumber, payment: RefundTarget, items: Vec<ReturnItemInput>) -> Self {
        Self { order_number, payment, items, refund_shipping_costs: false, amount: None }
    }

    pub fn with_shipping_costs(mut self) -> Self {
        self.refund_shipping_costs = true;
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ReturnAndReplaceResult {
    pub order: Order,
    pub return_fulfillment: Option<Fulfillment>,
    pub replace_fulfillment: Option<Fulfillment>,
    /// The draft order spawned to redeliver replaced goods, at most one per call.
    pub replacement_order: Option<Order>,
    /// `(order_line_id, quantity)` pairs for every line touched.
    pub touched: Vec<(i64, i64)>,
    /// The amount actually sent to the gateway, when a refund was performed.
    pub refunded_amount: Option<Money>,
}
