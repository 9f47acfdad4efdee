use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventListener,
    EventPublisher,
    FulfillmentApprovedEvent,
    Handler,
    OrderAuthorizedEvent,
    OrderPaidEvent,
    OrderRefundedEvent,
    OrderUpdatedEvent,
    TrackingUpdatedEvent,
};

/// The publishers handed to the API structs. Each flow publishes to every registered producer for
/// the event type.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_updated_producer: Vec<EventPublisher<OrderUpdatedEvent>>,
    pub order_paid_producer: Vec<EventPublisher<OrderPaidEvent>>,
    pub order_authorized_producer: Vec<EventPublisher<OrderAuthorizedEvent>>,
    pub order_refunded_producer: Vec<EventPublisher<OrderRefundedEvent>>,
    pub fulfillment_approved_producer: Vec<EventPublisher<FulfillmentApprovedEvent>>,
    pub tracking_updated_producer: Vec<EventPublisher<TrackingUpdatedEvent>>,
}

pub struct EventHandlers {
    pub on_order_updated: Option<EventListener<OrderUpdatedEvent>>,
    pub on_order_paid: Option<EventListener<OrderPaidEvent>>,
    pub on_order_authorized: Option<EventListener<OrderAuthorizedEvent>>,
    pub on_order_refunded: Option<EventListener<OrderRefundedEvent>>,
    pub on_fulfillment_approved: Option<EventListener<FulfillmentApprovedEvent>>,
    pub on_tracking_updated: Option<EventListener<TrackingUpdatedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_order_updated: hooks.on_order_updated.map(|f| EventListener::new(buffer_size, f)),
            on_order_paid: hooks.on_order_paid.map(|f| EventListener::new(buffer_size, f)),
            on_order_authorized: hooks.on_order_authorized.map(|f| EventListener::new(buffer_size, f)),
            on_order_refunded: hooks.on_order_refunded.map(|f| EventListener::new(buffer_size, f)),
            on_fulfillment_approved: hooks.on_fulfillment_approved.map(|f| EventListener::new(buffer_size, f)),
            on_tracking_updated: hooks.on_tracking_updated.map(|f| EventListener::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(listener) = &self.on_order_updated {
            result.order_updated_producer.push(listener.subscribe());
        }
        if let Some(listener) = &self.on_order_paid {
            result.order_paid_producer.push(listener.subscribe());
        }
        if let Some(listener) = &self.on_order_authorized {
            result.order_authorized_producer.push(listener.subscribe());
        }
        if let Some(listener) = &self.on_order_refunded {
            result.order_refunded_producer.push(listener.subscribe());
        }
        if let Some(listener) = &self.on_fulfillment_approved {
            result.fulfillment_approved_producer.push(listener.subscribe());
        }
        if let Some(listener) = &self.on_tracking_updated {
            result.tracking_updated_producer.push(listener.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(listener) = self.on_order_updated {
            tokio::spawn(listener.run());
        }
        if let Some(listener) = self.on_order_paid {
            tokio::spawn(listener.run());
        }
        if let Some(listener) = self.on_order_authorized {
            tokio::spawn(listener.run());
        }
        if let Some(listener) = self.on_order_refunded {
            tokio::spawn(listener.run());
        }
        if let Some(listener) = self.on_fulfillment_approved {
            tokio::spawn(listener.run());
        }
        if let Some(listener) = self.on_tracking_updated {
            tokio::spawn(listener.run());
        }
    }
}

/// Builder for the hook set. Each `on_*` method registers a boxed async handler for one
/// collaborator notification.
#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_updated: Option<Handler<OrderUpdatedEvent>>,
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_order_authorized: Option<Handler<OrderAuthorizedEvent>>,
    pub on_order_refunded: Option<Handler<OrderRefundedEvent>>,
    pub on_fulfillment_approved: Option<Handler<FulfillmentApprovedEvent>>,
    pub on_tracking_updated: Option<Handler<TrackingUpdatedEvent>>,
}

impl EventHooks {
    pub fn on_order_updated<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderUpdatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_updated = Some(Arc::new(f));
        self
    }

    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_order_authorized<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAuthorizedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_authorized = Some(Arc::new(f));
        self
    }

    pub fn on_order_refunded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderRefundedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_refunded = Some(Arc::new(f));
        self
    }

    pub fn on_fulfillment_approved<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(FulfillmentApprovedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_fulfillment_approved = Some(Arc::new(f));
        self
    }

    pub fn on_tracking_updated<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TrackingUpdatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_tracking_updated = Some(Arc::new(f));
        self
    }
}
