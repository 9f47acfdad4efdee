//! Simple stateless pub-sub event plumbing.
//!
//! Collaborators subscribe to engine notifications (order updated, fully paid, fulfillment
//! approved, ...) through async hooks. Delivery is fire-and-forget: a failed or slow subscriber
//! never fails the state transition that produced the event.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventListener, EventPublisher, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
