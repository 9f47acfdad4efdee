use serde::{Deserialize, Serialize};

use crate::db_types::{Fulfillment, Order};

/// Fired after any engine flow mutates an order or its fulfillments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUpdatedEvent {
    pub order: Order,
}

impl OrderUpdatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Fired when the charge status newly covers the charge target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

/// Fired when the authorize status newly reaches `Full`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAuthorizedEvent {
    pub order: Order,
}

/// Fired when the refunded total newly covers the order's gross total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRefundedEvent {
    pub order: Order,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentApprovedEvent {
    pub order: Order,
    pub fulfillment: Fulfillment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingUpdatedEvent {
    pub fulfillment: Fulfillment,
    pub tracking_number: String,
}

#[derive(Debug, Clone)]
pub enum EventType {
    OrderUpdated(OrderUpdatedEvent),
    OrderPaid(OrderPaidEvent),
    OrderAuthorized(OrderAuthorizedEvent),
    OrderRefunded(OrderRefundedEvent),
    FulfillmentApproved(FulfillmentApprovedEvent),
    TrackingUpdated(TrackingUpdatedEvent),
}
