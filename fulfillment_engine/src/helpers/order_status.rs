use crate::db_types::OrderStatusType;

/// Per-order-line quantity buckets, summed from the fulfillment lines of non-cancelled
/// fulfillments.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFulfillmentTotals {
    /// The ordered quantity.
    pub quantity: i64,
    /// Quantity in fulfillments with status `Fulfilled` or `Replaced`.
    pub fulfilled: i64,
    /// Quantity in fulfillments with status `Returned` or `RefundedAndReturned`.
    pub returned: i64,
    /// Quantity in fulfillments awaiting approval. Counts as not fulfilled.
    pub awaiting: i64,
}

/// Derives the fulfillment-tier order status from the line buckets.
///
/// Any returned quantity takes priority over the fulfillment tier, and quantity awaiting approval
/// counts as not fulfilled, so an order whose only fulfillment awaits approval derives
/// `Unfulfilled`.
pub fn derive_order_status(lines: &[LineFulfillmentTotals]) -> OrderStatusType {
    let ordered: i64 = lines.iter().map(|l| l.quantity).sum();
    let fulfilled: i64 = lines.iter().map(|l| l.fulfilled).sum();
    let returned: i64 = lines.iter().map(|l| l.returned).sum();
    if ordered == 0 {
        return OrderStatusType::Unfulfilled;
    }
    if returned >= ordered {
        OrderStatusType::Returned
    } else if returned > 0 {
        OrderStatusType::PartiallyReturned
    } else if fulfilled >= ordered {
        OrderStatusType::Fulfilled
    } else if fulfilled > 0 {
        OrderStatusType::PartiallyFulfilled
    } else {
        OrderStatusType::Unfulfilled
    }
}
