use std::fmt::Debug;

use log::*;
use wfe_common::Money;

use crate::{
    db_types::{Checkout, GrantedRefund, NewCheckout, NewTransaction, Order, TransactionUpdate},
    events::{EventProducers, OrderAuthorizedEvent, OrderPaidEvent, OrderRefundedEvent},
    traits::{PaymentTransitions, TransactionDatabase, TransactionError, TransactionFlowResult, TransactionOwner},
};

/// `TransactionApi` is the transaction amount aggregator: every create/update recomputes the
/// owner's totals and derived statuses, and collaborators are notified exactly once whenever a
/// status newly reaches its full tier.
pub struct TransactionApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for TransactionApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransactionApi")
    }
}

impl<B> TransactionApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> TransactionApi<B>
where B: TransactionDatabase
{
    pub async fn create_checkout(&self, checkout: NewCheckout) -> Result<Checkout, TransactionError> {
        self.db.insert_checkout(checkout).await
    }

    /// Creates a transaction item on an order or checkout. Each non-zero amount field produces
    /// one calculation event carrying the full initial value.
    pub async fn create_transaction(
        &self,
        owner: TransactionOwner,
        transaction: NewTransaction,
    ) -> Result<TransactionFlowResult, TransactionError> {
        let result = self.db.create_transaction(owner, transaction).await?;
        self.call_transition_hooks(&result.order, result.transitions).await;
        Ok(result)
    }

    /// Applies a partial amount update. The four confirmed fields and their pending counterparts
    /// are independent: updating one never implicitly adjusts another. Changed confirmed fields
    /// produce delta events; authorized changes produce an `AuthorizationAdjustment`.
    pub async fn update_transaction(
        &self,
        transaction_id: i64,
        update: TransactionUpdate,
    ) -> Result<TransactionFlowResult, TransactionError> {
        let result = self.db.update_transaction(transaction_id, update).await?;
        self.call_transition_hooks(&result.order, result.transitions).await;
        Ok(result)
    }

    /// Grants a refund against the order. The charge target shrinks, which can itself push the
    /// charge status to its full tier.
    pub async fn grant_refund(
        &self,
        order_id: i64,
        amount: Money,
        reason: &str,
    ) -> Result<(GrantedRefund, Order), TransactionError> {
        let (granted, order, transitions) = self.db.grant_refund(order_id, amount, reason).await?;
        self.call_transition_hooks(&Some(order.clone()), transitions).await;
        Ok((granted, order))
    }

    async fn call_transition_hooks(&self, order: &Option<Order>, transitions: PaymentTransitions) {
        let Some(order) = order else { return };
        if transitions.newly_fully_paid {
            for emitter in &self.producers.order_paid_producer {
                debug!("💳️ Order [{}] is now fully paid; notifying subscribers", order.number);
                emitter.publish(OrderPaidEvent { order: order.clone() }).await;
            }
        }
        if transitions.newly_fully_authorized {
            for emitter in &self.producers.order_authorized_producer {
                debug!("💳️ Order [{}] is now fully authorized; notifying subscribers", order.number);
                emitter.publish(OrderAuthorizedEvent { order: order.clone() }).await;
            }
        }
        if transitions.newly_fully_refunded {
            for emitter in &self.producers.order_refunded_producer {
                debug!("💳️ Order [{}] is now fully refunded; notifying subscribers", order.number);
                emitter.publish(OrderRefundedEvent { order: order.clone() }).await;
            }
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
