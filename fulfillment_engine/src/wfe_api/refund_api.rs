use std::fmt::Debug;

use log::*;
use serde_json::json;
use wfe_common::Money;

use crate::{
    db_types::{Fulfillment, Order, OrderEventType, OrderNumber},
    events::{EventProducers, OrderUpdatedEvent},
    gateway::{PaymentGateway, RefundTarget},
    traits::{FulfillmentDatabase, TransactionDatabase},
    wfe_api::{
        errors::RefundError,
        refund_objects::{RefundProductsRequest, ReturnAndReplaceResult, ReturnRequest},
    },
};

/// `RefundApi` orchestrates the return/replace/refund flows: it validates the request against the
/// order's payments, hands the ledger work to the backend, and talks to the external payment
/// gateway.
///
/// The gateway call happens *after* the ledger mutations commit. A gateway failure is terminal
/// for the call and is recorded on the order's audit trail, but the quantity and ledger changes
/// stand; compensation, if any, is the caller's responsibility.
pub struct RefundApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
}

impl<B, G> Debug for RefundApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundApi")
    }
}

impl<B, G> RefundApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        Self { db, gateway, producers }
    }
}

impl<B, G> RefundApi<B, G>
where
    B: FulfillmentDatabase + TransactionDatabase,
    G: PaymentGateway,
{
    /// Processes a return/replace request, optionally refunding the return set.
    ///
    /// Replacements are never billed: the refund amount, unless given explicitly, is the sum of
    /// `unit_price_gross × quantity` over the return set, plus the gross shipping price when
    /// `refund_shipping_costs` is set. An explicit amount is rejected with
    /// [`RefundError::OrderHasMultiplePayments`] when the order holds more than one active
    /// payment.
    pub async fn return_and_replace(&self, request: ReturnRequest) -> Result<ReturnAndReplaceResult, RefundError> {
        let order = self.fetch_order_checked(&request.order_number, request.amount).await?;
        let outcome = self.db.process_return_and_replace(order.id, &request.items, request.refund).await?;

        let (return_fulfillment, refunded_amount) = if request.refund {
            self.move_money(
                &order,
                outcome.return_fulfillment,
                outcome.return_subtotal,
                &request.payment,
                request.refund_shipping_costs,
                request.amount,
            )
            .await?
        } else {
            (outcome.return_fulfillment, None)
        };

        self.call_order_updated_hook(&outcome.order).await;
        Ok(ReturnAndReplaceResult {
            order: outcome.order,
            return_fulfillment,
            replace_fulfillment: outcome.replace_fulfillment,
            replacement_order: outcome.replacement_order,
            touched: outcome.touched,
            refunded_amount,
        })
    }

    /// Refunds goods the customer keeps: the quantities move into a `Refunded` fulfillment and
    /// the gateway is asked to move the money. The same amount and multi-payment rules apply as
    /// for returns.
    pub async fn refund_products(&self, request: RefundProductsRequest) -> Result<ReturnAndReplaceResult, RefundError> {
        let order = self.fetch_order_checked(&request.order_number, request.amount).await?;
        let outcome = self.db.process_fulfillment_refund(order.id, &request.items).await?;

        let (return_fulfillment, refunded_amount) = self
            .move_money(
                &order,
                outcome.return_fulfillment,
                outcome.return_subtotal,
                &request.payment,
                request.refund_shipping_costs,
                request.amount,
            )
            .await?;

        self.call_order_updated_hook(&outcome.order).await;
        Ok(ReturnAndReplaceResult {
            order: outcome.order,
            return_fulfillment,
            replace_fulfillment: None,
            replacement_order: None,
            touched: outcome.touched,
            refunded_amount,
        })
    }

    /// Fetches the order and rejects an explicit amount when it would be ambiguous: an amount is
    /// only meaningful against a single unambiguous payment.
    async fn fetch_order_checked(
        &self,
        order_number: &OrderNumber,
        amount: Option<Money>,
    ) -> Result<Order, RefundError> {
        let order = self
            .db
            .fetch_order_by_number(order_number)
            .await?
            .ok_or_else(|| RefundError::OrderNotFound(order_number.clone()))?;
        if amount.is_some() {
            let active = TransactionDatabase::active_transaction_count(&self.db, order.id).await?;
            if active > 1 {
                return Err(RefundError::OrderHasMultiplePayments);
            }
        }
        Ok(order)
    }

    /// The money half of a refunding flow: computes the amount, calls the gateway, records the
    /// outcome on the audit trail and on the refund fulfillment. Zero amounts move nothing and
    /// skip the gateway.
    async fn move_money(
        &self,
        order: &Order,
        return_fulfillment: Option<Fulfillment>,
        subtotal: Money,
        payment: &RefundTarget,
        refund_shipping_costs: bool,
        explicit_amount: Option<Money>,
    ) -> Result<(Option<Fulfillment>, Option<Money>), RefundError> {
        let shipping = if refund_shipping_costs { order.shipping_price_gross } else { Money::ZERO };
        let amount = explicit_amount.unwrap_or(subtotal + shipping);
        if !amount.is_positive() {
            return Ok((return_fulfillment, None));
        }
        let target = payment.without_empty_allocations();
        let metadata = json!({ "order": order.number, "reason": "refund" });
        match self.gateway.refund(&target, amount, &metadata).await {
            Ok(confirmation) => {
                let fulfillment = match &return_fulfillment {
                    Some(fulfillment) => {
                        Some(self.db.set_fulfillment_refund_amounts(fulfillment.id, amount, shipping).await?)
                    },
                    None => None,
                };
                self.db
                    .insert_order_event(
                        order.id,
                        OrderEventType::PaymentRefunded,
                        json!({ "amount": amount.value(), "reference": confirmation.reference }),
                    )
                    .await?;
                debug!("↩️ Refunded {amount} for order [{}]", order.number);
                Ok((fulfillment, Some(amount)))
            },
            Err(e) => {
                error!("↩️ Gateway refused to refund {amount} for order [{}]: {e}", order.number);
                self.db
                    .insert_order_event(
                        order.id,
                        OrderEventType::PaymentRefundFailed,
                        json!({ "amount": amount.value(), "error": e.to_string() }),
                    )
                    .await?;
                Err(RefundError::CannotRefund(e.to_string()))
            },
        }
    }

    async fn call_order_updated_hook(&self, order: &Order) {
        for emitter in &self.producers.order_updated_producer {
            trace!("↩️ Notifying order updated hook subscribers");
            emitter.publish(OrderUpdatedEvent::new(order.clone())).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }
}
