use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Fulfillment, WarehouseId},
    events::{EventProducers, FulfillmentApprovedEvent, OrderUpdatedEvent, TrackingUpdatedEvent},
    traits::{ApproveOutcome, CancelOutcome, FulfillmentBatch, FulfillmentDatabase, FulfillmentError},
    wfe_api::order_objects::{FulfillmentPolicy, FulfillmentRequest},
};
use crate::db_types::Order;

/// `FulfillmentApi` drives the fulfillment lifecycle: creating fulfillments against warehouse
/// stock, approving deferred ones, and cancelling.
pub struct FulfillmentApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for FulfillmentApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FulfillmentApi")
    }
}

impl<B> FulfillmentApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> FulfillmentApi<B>
where B: FulfillmentDatabase
{
    /// Creates fulfillments for the requested lines, one per warehouse.
    ///
    /// When the request resolves to immediate approval (explicitly, or through the policy's
    /// `auto_approve`), stock is consumed; otherwise the fulfillments wait for approval and only
    /// availability is validated. Offending lines are collected into the batch result without
    /// aborting the lines that succeeded; already-applied ledger changes for valid lines are
    /// retained.
    ///
    /// Fails fatally with [`FulfillmentError::CannotFulfillUnpaidOrder`] when policy forbids
    /// fulfilling unpaid orders, approval is requested, and the order's charge target is not
    /// covered.
    pub async fn create_fulfillments(
        &self,
        request: FulfillmentRequest,
        policy: &FulfillmentPolicy,
    ) -> Result<FulfillmentBatch, FulfillmentError> {
        let order = self
            .db
            .fetch_order_by_number(&request.order_number)
            .await?
            .ok_or_else(|| FulfillmentError::OrderNotFound(request.order_number.clone()))?;
        let approved = request.approved.unwrap_or(policy.auto_approve);
        if approved && !policy.allow_unpaid_fulfillment && !order.charge_status.is_fully_charged() {
            return Err(FulfillmentError::CannotFulfillUnpaidOrder);
        }
        let batch = self
            .db
            .create_fulfillments(
                order.id,
                &request.lines,
                approved,
                request.allow_stock_exceed,
                request.tracking_number.as_deref(),
            )
            .await?;
        debug!(
            "📦️ Order [{}]: {} fulfillment(s) created, {} line(s) rejected",
            batch.order.number,
            batch.fulfillments.len(),
            batch.rejected.len()
        );
        self.call_order_updated_hook(&batch.order).await;
        Ok(batch)
    }

    /// Approves a waiting fulfillment, performing the deferred stock consumption.
    ///
    /// The unpaid-order policy applies here exactly as on approved creation. Consumption is
    /// all-or-nothing: on any shortfall (without `allow_exceed`) the fulfillment stays waiting
    /// and every shortfall is reported together.
    pub async fn approve_fulfillment(
        &self,
        fulfillment_id: i64,
        policy: &FulfillmentPolicy,
        allow_exceed: bool,
    ) -> Result<ApproveOutcome, FulfillmentError> {
        let fulfillment = self
            .db
            .fetch_fulfillment(fulfillment_id)
            .await?
            .ok_or(FulfillmentError::FulfillmentNotFound(fulfillment_id))?;
        let order = self
            .db
            .fetch_order_by_id(fulfillment.order_id)
            .await?
            .ok_or(FulfillmentError::OrderIdNotFound(fulfillment.order_id))?;
        if !policy.allow_unpaid_fulfillment && !order.charge_status.is_fully_charged() {
            return Err(FulfillmentError::CannotFulfillUnpaidOrder);
        }
        let outcome = self.db.approve_fulfillment(fulfillment_id, allow_exceed).await?;
        self.call_fulfillment_approved_hook(&outcome).await;
        self.call_order_updated_hook(&outcome.order).await;
        Ok(outcome)
    }

    /// Cancels a fulfillment; fulfilled ones restock into the given warehouse.
    pub async fn cancel_fulfillment(
        &self,
        fulfillment_id: i64,
        warehouse: Option<&WarehouseId>,
    ) -> Result<CancelOutcome, FulfillmentError> {
        let outcome = self.db.cancel_fulfillment(fulfillment_id, warehouse).await?;
        self.call_order_updated_hook(&outcome.order).await;
        Ok(outcome)
    }

    /// Updates the tracking number and notifies the tracking collaborator.
    pub async fn update_tracking_number(
        &self,
        fulfillment_id: i64,
        tracking: &str,
    ) -> Result<Fulfillment, FulfillmentError> {
        let fulfillment = self.db.update_tracking_number(fulfillment_id, tracking).await?;
        for emitter in &self.producers.tracking_updated_producer {
            let event = TrackingUpdatedEvent { fulfillment: fulfillment.clone(), tracking_number: tracking.to_string() };
            emitter.publish(event).await;
        }
        Ok(fulfillment)
    }

    async fn call_order_updated_hook(&self, order: &Order) {
        for emitter in &self.producers.order_updated_producer {
            trace!("📦️ Notifying order updated hook subscribers");
            emitter.publish(OrderUpdatedEvent::new(order.clone())).await;
        }
    }

    async fn call_fulfillment_approved_hook(&self, outcome: &ApproveOutcome) {
        for emitter in &self.producers.fulfillment_approved_producer {
            let event = FulfillmentApprovedEvent {
                order: outcome.order.clone(),
                fulfillment: outcome.fulfillment.clone(),
            };
            emitter.publish(event).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
