//! `SqliteDatabase` is a concrete implementation of a fulfillment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the
//! [`crate::traits`] module. Each lifecycle flow runs inside a single database transaction, so
//! ledger side effects are atomic with the state transition that triggers them, and SQLite's
//! single-writer model serializes concurrent flows touching the same rows.
use std::{collections::HashMap, fmt::Debug};

use log::*;
use serde_json::json;
use sqlx::SqlitePool;
use wfe_common::Money;

use super::db::{self, events, fulfillments, orders, stock, transactions};
use crate::{
    db_types::{
        Allocation,
        Checkout,
        Fulfillment,
        FulfillmentLine,
        FulfillmentStatusType,
        GrantedRefund,
        NewCheckout,
        NewOrder,
        NewOrderLine,
        NewStock,
        NewTransaction,
        Order,
        OrderEventRow,
        OrderEventType,
        OrderLine,
        OrderNumber,
        Stock,
        TransactionEventRow,
        TransactionEventType,
        TransactionItem,
        TransactionUpdate,
        VariantId,
        WarehouseId,
    },
    traits::{
        ApproveOutcome,
        CancelOutcome,
        FulfillmentBatch,
        FulfillmentDatabase,
        FulfillmentError,
        FulfillmentLineInput,
        InsufficientStockLine,
        LineRejectReason,
        OrderManagement,
        OrderQueryError,
        PaymentTransitions,
        RejectedLine,
        ReturnItemInput,
        ReturnOutcome,
        ReturnSource,
        TransactionDatabase,
        TransactionError,
        TransactionFlowResult,
        TransactionOwner,
    },
    wfe_api::order_objects::OrderQueryFilter,
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database connection pool with `max_connections` connections.
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = db::new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db::db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// One validated fulfillment request line, paired with the stock it draws from.
struct AcceptedLine {
    input: FulfillmentLineInput,
    stock: Stock,
}

/// A resolved return/replace tuple: the backing order line plus, for fulfillment-sourced
/// quantity, the fulfillment line it splits off from.
struct ResolvedReturnItem {
    order_line: OrderLine,
    source_line: Option<FulfillmentLine>,
    quantity: i64,
    replace: bool,
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_number(number, &mut conn).await?)
    }

    async fn fetch_order_by_id(&self, order_id: i64) -> Result<Option<Order>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_id(order_id, &mut conn).await?)
    }

    async fn fetch_order_lines(&self, order_id: i64) -> Result<Vec<OrderLine>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_lines(order_id, &mut conn).await?)
    }

    async fn fetch_fulfillments(&self, order_id: i64) -> Result<Vec<Fulfillment>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(fulfillments::fetch_fulfillments_for_order(order_id, &mut conn).await?)
    }

    async fn fetch_fulfillment(&self, fulfillment_id: i64) -> Result<Option<Fulfillment>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(fulfillments::fetch_fulfillment(fulfillment_id, &mut conn).await?)
    }

    async fn fetch_fulfillment_lines(&self, fulfillment_id: i64) -> Result<Vec<FulfillmentLine>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(fulfillments::fetch_fulfillment_lines(fulfillment_id, &mut conn).await?)
    }

    async fn fetch_stock(
        &self,
        warehouse_id: &WarehouseId,
        variant_id: &VariantId,
    ) -> Result<Option<Stock>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(stock::fetch_stock(warehouse_id, variant_id, &mut conn).await?)
    }

    async fn fetch_allocations_for_line(&self, order_line_id: i64) -> Result<Vec<Allocation>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(stock::fetch_allocations_for_line(order_line_id, &mut conn).await?)
    }

    async fn fetch_order_events(&self, order_id: i64) -> Result<Vec<OrderEventRow>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::fetch_order_events(order_id, &mut conn).await?)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::search_orders(query, &mut conn).await?)
    }
}

impl FulfillmentDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(
        &self,
        order: NewOrder,
        lines: Vec<NewOrderLine>,
    ) -> Result<(Order, Vec<OrderLine>), FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        let mut inserted = Vec::with_capacity(lines.len());
        for line in lines {
            inserted.push(orders::insert_order_line(order.id, line, &mut tx).await?);
        }
        tx.commit().await?;
        Ok((order, inserted))
    }

    async fn upsert_stock(&self, stock: NewStock) -> Result<Stock, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let stock = stock::upsert_stock(stock, &mut tx).await?;
        tx.commit().await?;
        Ok(stock)
    }

    async fn allocate(
        &self,
        order_line_id: i64,
        stock_id: i64,
        quantity: i64,
        allow_exceed: bool,
    ) -> Result<Allocation, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let allocation = stock::allocate(order_line_id, stock_id, quantity, allow_exceed, &mut tx).await?;
        tx.commit().await?;
        Ok(allocation)
    }

    async fn deallocate(&self, order_line_id: i64, stock_id: i64, quantity: i64) -> Result<(), FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        stock::deallocate(order_line_id, stock_id, quantity, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_fulfillments(
        &self,
        order_id: i64,
        lines: &[FulfillmentLineInput],
        approved: bool,
        allow_exceed: bool,
        tracking_number: Option<&str>,
    ) -> Result<FulfillmentBatch, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        orders::fetch_order_by_id(order_id, &mut tx)
            .await?
            .ok_or(FulfillmentError::OrderIdNotFound(order_id))?;

        let mut seen = std::collections::HashSet::new();
        for input in lines {
            if !seen.insert((input.warehouse_id.clone(), input.order_line_id)) {
                return Err(FulfillmentError::DuplicatedInputItem(format!(
                    "warehouse {} / order line {}",
                    input.warehouse_id, input.order_line_id
                )));
            }
        }

        // Validate every line before touching the ledger, so each rejection is reported while
        // lines that pass are still honoured. In-batch reservations are tracked so two lines
        // cannot promise the same quantity.
        let mut accepted: Vec<AcceptedLine> = Vec::new();
        let mut rejected: Vec<RejectedLine> = Vec::new();
        let mut batch_reserved: HashMap<i64, i64> = HashMap::new();
        let mut batch_line_use: HashMap<i64, i64> = HashMap::new();
        for input in lines {
            let line = orders::fetch_order_line(input.order_line_id, &mut tx)
                .await?
                .ok_or(FulfillmentError::OrderLineNotFound(input.order_line_id))?;
            if line.is_preorder {
                rejected.push(RejectedLine {
                    order_line_id: line.id,
                    warehouse_id: input.warehouse_id.clone(),
                    requested: input.quantity,
                    reason: LineRejectReason::PreorderNotReleased,
                });
                continue;
            }
            let awaiting = orders::awaiting_quantity(line.id, &mut tx).await?;
            let used = batch_line_use.get(&line.id).copied().unwrap_or(0);
            let unfulfilled = line.quantity - line.quantity_fulfilled - awaiting - used;
            if input.quantity > unfulfilled {
                rejected.push(RejectedLine {
                    order_line_id: line.id,
                    warehouse_id: input.warehouse_id.clone(),
                    requested: input.quantity,
                    reason: LineRejectReason::ExceedsUnfulfilled { unfulfilled: unfulfilled.max(0) },
                });
                continue;
            }
            let stock = match stock::fetch_stock(&input.warehouse_id, &line.variant_id, &mut tx).await? {
                Some(s) => s,
                None => {
                    rejected.push(RejectedLine {
                        order_line_id: line.id,
                        warehouse_id: input.warehouse_id.clone(),
                        requested: input.quantity,
                        reason: LineRejectReason::InsufficientStock { available: 0 },
                    });
                    continue;
                },
            };
            let reserved = batch_reserved.get(&stock.id).copied().unwrap_or(0);
            let available = stock::available_for_line(&stock, line.id, &mut tx).await? - reserved;
            if !allow_exceed && input.quantity > available {
                rejected.push(RejectedLine {
                    order_line_id: line.id,
                    warehouse_id: input.warehouse_id.clone(),
                    requested: input.quantity,
                    reason: LineRejectReason::InsufficientStock { available: available.max(0) },
                });
                continue;
            }
            *batch_reserved.entry(stock.id).or_insert(0) += input.quantity;
            *batch_line_use.entry(line.id).or_insert(0) += input.quantity;
            accepted.push(AcceptedLine { input: input.clone(), stock });
        }

        // One fulfillment per warehouse, groups in first-appearance order.
        let mut groups: Vec<(WarehouseId, Vec<AcceptedLine>)> = Vec::new();
        for accepted_line in accepted {
            let warehouse = accepted_line.input.warehouse_id.clone();
            match groups.iter_mut().find(|(w, _)| *w == warehouse) {
                Some((_, group)) => group.push(accepted_line),
                None => groups.push((warehouse, vec![accepted_line])),
            }
        }

        let status =
            if approved { FulfillmentStatusType::Fulfilled } else { FulfillmentStatusType::WaitingForApproval };
        let mut created = Vec::with_capacity(groups.len());
        for (warehouse, group) in groups {
            let ordinal = fulfillments::next_ordinal(order_id, &mut tx).await?;
            let fulfillment =
                fulfillments::insert_fulfillment(order_id, ordinal, status, tracking_number, &mut tx).await?;
            let mut event_lines = Vec::with_capacity(group.len());
            for AcceptedLine { input, stock } in &group {
                fulfillments::upsert_fulfillment_line(
                    fulfillment.id,
                    input.order_line_id,
                    Some(stock.id),
                    input.quantity,
                    &mut tx,
                )
                .await?;
                if approved {
                    stock::consume(stock.id, input.order_line_id, input.quantity, &mut tx).await?;
                    orders::adjust_quantity_fulfilled(input.order_line_id, input.quantity, &mut tx).await?;
                }
                event_lines.push(json!({ "line": input.order_line_id, "quantity": input.quantity }));
            }
            events::insert_order_event(
                order_id,
                OrderEventType::FulfillmentCreated,
                json!({
                    "fulfillment": fulfillment.id,
                    "warehouse": warehouse,
                    "lines": event_lines,
                    "awaiting_approval": !approved,
                }),
                &mut tx,
            )
            .await?;
            created.push(fulfillment);
        }

        let order = orders::update_order_status(order_id, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "📦️ Fulfillment batch for order [{}]: {} created, {} rejected",
            order.number,
            created.len(),
            rejected.len()
        );
        Ok(FulfillmentBatch { order, fulfillments: created, rejected })
    }

    async fn approve_fulfillment(
        &self,
        fulfillment_id: i64,
        allow_exceed: bool,
    ) -> Result<ApproveOutcome, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let fulfillment = fulfillments::fetch_fulfillment(fulfillment_id, &mut tx)
            .await?
            .ok_or(FulfillmentError::FulfillmentNotFound(fulfillment_id))?;
        if fulfillment.status != FulfillmentStatusType::WaitingForApproval {
            return Err(FulfillmentError::CannotApproveFulfillment {
                fulfillment_id,
                status: fulfillment.status.to_string(),
            });
        }
        let lines = fulfillments::fetch_fulfillment_lines(fulfillment_id, &mut tx).await?;
        for line in &lines {
            let order_line = orders::fetch_order_line(line.order_line_id, &mut tx)
                .await?
                .ok_or(FulfillmentError::OrderLineNotFound(line.order_line_id))?;
            if order_line.is_preorder {
                return Err(FulfillmentError::FulfillOrderLine {
                    order_line_id: order_line.id,
                    reason: "the preorder variant has not been released".to_string(),
                });
            }
        }

        // Collect every shortfall before consuming anything; approval is all-or-nothing.
        let mut shortfalls: Vec<InsufficientStockLine> = Vec::new();
        let mut batch_reserved: HashMap<i64, i64> = HashMap::new();
        for line in &lines {
            let Some(stock_id) = line.stock_id else { continue };
            let stock =
                stock::fetch_stock_by_id(stock_id, &mut tx).await?.ok_or(FulfillmentError::StockNotFound)?;
            let reserved = batch_reserved.get(&stock.id).copied().unwrap_or(0);
            let available = stock::available_for_line(&stock, line.order_line_id, &mut tx).await? - reserved;
            if !allow_exceed && line.quantity > available {
                shortfalls.push(InsufficientStockLine {
                    order_line_id: line.order_line_id,
                    warehouse_id: stock.warehouse_id,
                    requested: line.quantity,
                    available: available.max(0),
                });
            } else {
                *batch_reserved.entry(stock.id).or_insert(0) += line.quantity;
            }
        }
        if !shortfalls.is_empty() {
            // Dropping the transaction rolls everything back; the fulfillment stays waiting.
            return Err(FulfillmentError::InsufficientStock(shortfalls));
        }

        let mut event_lines = Vec::with_capacity(lines.len());
        for line in &lines {
            if let Some(stock_id) = line.stock_id {
                stock::consume(stock_id, line.order_line_id, line.quantity, &mut tx).await?;
            }
            orders::adjust_quantity_fulfilled(line.order_line_id, line.quantity, &mut tx).await?;
            event_lines.push(json!({ "line": line.order_line_id, "quantity": line.quantity }));
        }
        let fulfillment = fulfillments::set_status(fulfillment_id, FulfillmentStatusType::Fulfilled, &mut tx).await?;
        events::insert_order_event(
            fulfillment.order_id,
            OrderEventType::FulfillmentApproved,
            json!({ "fulfillment": fulfillment.id, "lines": event_lines }),
            &mut tx,
        )
        .await?;
        let order = orders::update_order_status(fulfillment.order_id, &mut tx).await?;
        tx.commit().await?;
        debug!("📦️ Fulfillment #{} of order [{}] approved", fulfillment.ordinal, order.number);
        Ok(ApproveOutcome { order, fulfillment })
    }

    async fn cancel_fulfillment(
        &self,
        fulfillment_id: i64,
        warehouse: Option<&WarehouseId>,
    ) -> Result<CancelOutcome, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let fulfillment = fulfillments::fetch_fulfillment(fulfillment_id, &mut tx)
            .await?
            .ok_or(FulfillmentError::FulfillmentNotFound(fulfillment_id))?;
        if let Some(line_id) = fulfillments::first_gift_card_line(fulfillment_id, &mut tx).await? {
            return Err(FulfillmentError::CannotCancelFulfillment {
                fulfillment_id,
                reason: format!("order line {line_id} is a gift card"),
            });
        }
        match fulfillment.status {
            FulfillmentStatusType::WaitingForApproval => {
                let lines = fulfillments::fetch_fulfillment_lines(fulfillment_id, &mut tx).await?;
                let event_lines: Vec<_> =
                    lines.iter().map(|l| json!({ "line": l.order_line_id, "quantity": l.quantity })).collect();
                fulfillments::delete_fulfillment(fulfillment_id, &mut tx).await?;
                events::insert_order_event(
                    fulfillment.order_id,
                    OrderEventType::FulfillmentCanceled,
                    json!({ "fulfillment": fulfillment.id, "lines": event_lines, "restocked": false }),
                    &mut tx,
                )
                .await?;
                let order = orders::update_order_status(fulfillment.order_id, &mut tx).await?;
                tx.commit().await?;
                debug!("📦️ Unapproved fulfillment #{} of order [{}] deleted", fulfillment.ordinal, order.number);
                Ok(CancelOutcome { order, fulfillment: None })
            },
            FulfillmentStatusType::Fulfilled => {
                let warehouse = warehouse.ok_or(FulfillmentError::WarehouseRequired)?;
                let lines = fulfillments::fetch_fulfillment_lines(fulfillment_id, &mut tx).await?;
                let mut event_lines = Vec::with_capacity(lines.len());
                for line in &lines {
                    let order_line = orders::fetch_order_line(line.order_line_id, &mut tx)
                        .await?
                        .ok_or(FulfillmentError::OrderLineNotFound(line.order_line_id))?;
                    let target = match stock::fetch_stock(warehouse, &order_line.variant_id, &mut tx).await? {
                        Some(s) => s,
                        None => {
                            stock::upsert_stock(
                                NewStock::new(warehouse.clone(), order_line.variant_id.clone(), 0),
                                &mut tx,
                            )
                            .await?
                        },
                    };
                    stock::restock(target.id, order_line.id, line.quantity, &mut tx).await?;
                    orders::adjust_quantity_fulfilled(order_line.id, -line.quantity, &mut tx).await?;
                    event_lines.push(json!({ "line": line.order_line_id, "quantity": line.quantity }));
                }
                let fulfillment =
                    fulfillments::set_status(fulfillment_id, FulfillmentStatusType::Canceled, &mut tx).await?;
                events::insert_order_event(
                    fulfillment.order_id,
                    OrderEventType::FulfillmentCanceled,
                    json!({
                        "fulfillment": fulfillment.id,
                        "lines": event_lines,
                        "restocked": true,
                        "warehouse": warehouse,
                    }),
                    &mut tx,
                )
                .await?;
                let order = orders::update_order_status(fulfillment.order_id, &mut tx).await?;
                tx.commit().await?;
                debug!("📦️ Fulfillment #{} of order [{}] cancelled and restocked", fulfillment.ordinal, order.number);
                Ok(CancelOutcome { order, fulfillment: Some(fulfillment) })
            },
            status => Err(FulfillmentError::CannotCancelFulfillment {
                fulfillment_id,
                reason: format!("status {status} is terminal"),
            }),
        }
    }

    async fn process_return_and_replace(
        &self,
        order_id: i64,
        items: &[ReturnItemInput],
        refund: bool,
    ) -> Result<ReturnOutcome, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_id(order_id, &mut tx)
            .await?
            .ok_or(FulfillmentError::OrderIdNotFound(order_id))?;
        let resolved = resolve_return_items(items, &mut tx).await?;

        let mut touched: Vec<(i64, i64)> = Vec::new();
        let mut return_subtotal = Money::ZERO;

        // Return set.
        let return_status =
            if refund { FulfillmentStatusType::RefundedAndReturned } else { FulfillmentStatusType::Returned };
        let mut return_fulfillment = None;
        if resolved.iter().any(|r| !r.replace) {
            let fulfillment = match fulfillments::find_mergeable_fulfillment(order_id, return_status, &mut tx).await? {
                Some(f) => f,
                None => {
                    let ordinal = fulfillments::next_ordinal(order_id, &mut tx).await?;
                    fulfillments::insert_fulfillment(order_id, ordinal, return_status, None, &mut tx).await?
                },
            };
            for item in resolved.iter().filter(|r| !r.replace) {
                apply_return_item(fulfillment.id, item, &mut tx).await?;
                touched.push((item.order_line.id, item.quantity));
                return_subtotal = return_subtotal + item.order_line.unit_price_gross * item.quantity;
            }
            return_fulfillment = Some(fulfillment);
        }

        // Replace set: same accounting, plus the single replacement order for this call.
        let mut replace_fulfillment = None;
        let mut replacement_order = None;
        if resolved.iter().any(|r| r.replace) {
            let fulfillment = match fulfillments::find_mergeable_fulfillment(
                order_id,
                FulfillmentStatusType::Replaced,
                &mut tx,
            )
            .await?
            {
                Some(f) => f,
                None => {
                    let ordinal = fulfillments::next_ordinal(order_id, &mut tx).await?;
                    fulfillments::insert_fulfillment(
                        order_id,
                        ordinal,
                        FulfillmentStatusType::Replaced,
                        None,
                        &mut tx,
                    )
                    .await?
                },
            };
            let replacement = orders::insert_replacement_order(&order, &mut tx).await?;
            let mut replaced_lines = Vec::new();
            for item in resolved.iter().filter(|r| r.replace) {
                apply_return_item(fulfillment.id, item, &mut tx).await?;
                touched.push((item.order_line.id, item.quantity));
                let new_line =
                    orders::insert_replacement_line(replacement.id, &item.order_line, item.quantity, &mut tx).await?;
                replaced_lines.push(json!({ "line": item.order_line.id, "quantity": item.quantity, "replacement_line": new_line.id }));
            }
            events::insert_order_event(
                order_id,
                OrderEventType::FulfillmentReplaced,
                json!({ "fulfillment": fulfillment.id, "replacement_order": replacement.id, "lines": replaced_lines }),
                &mut tx,
            )
            .await?;
            // Totals accrued line by line; re-read the finished record.
            let replacement = orders::fetch_order_by_id(replacement.id, &mut tx)
                .await?
                .ok_or(FulfillmentError::OrderIdNotFound(replacement.id))?;
            replace_fulfillment = Some(fulfillment);
            replacement_order = Some(replacement);
        }

        if !touched.is_empty() {
            let event_lines: Vec<_> =
                touched.iter().map(|(line, quantity)| json!({ "line": line, "quantity": quantity })).collect();
            events::insert_order_event(
                order_id,
                OrderEventType::FulfillmentReturned,
                json!({ "lines": event_lines, "refund": refund }),
                &mut tx,
            )
            .await?;
        }

        let order = orders::update_order_status(order_id, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "↩️ Return/replace for order [{}]: {} line(s) touched, replacement: {}",
            order.number,
            touched.len(),
            replacement_order.as_ref().map(|o| o.number.to_string()).unwrap_or_else(|| "none".to_string())
        );
        Ok(ReturnOutcome { order, return_fulfillment, replace_fulfillment, replacement_order, touched, return_subtotal })
    }

    async fn process_fulfillment_refund(
        &self,
        order_id: i64,
        items: &[ReturnItemInput],
    ) -> Result<ReturnOutcome, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_id(order_id, &mut tx)
            .await?
            .ok_or(FulfillmentError::OrderIdNotFound(order_id))?;
        let resolved = resolve_return_items(items, &mut tx).await?;

        let mut touched: Vec<(i64, i64)> = Vec::new();
        let mut return_subtotal = Money::ZERO;
        let mut return_fulfillment = None;
        if !resolved.is_empty() {
            let fulfillment = match fulfillments::find_mergeable_fulfillment(
                order_id,
                FulfillmentStatusType::Refunded,
                &mut tx,
            )
            .await?
            {
                Some(f) => f,
                None => {
                    let ordinal = fulfillments::next_ordinal(order_id, &mut tx).await?;
                    fulfillments::insert_fulfillment(order_id, ordinal, FulfillmentStatusType::Refunded, None, &mut tx)
                        .await?
                },
            };
            for item in &resolved {
                apply_return_item(fulfillment.id, item, &mut tx).await?;
                touched.push((item.order_line.id, item.quantity));
                return_subtotal = return_subtotal + item.order_line.unit_price_gross * item.quantity;
            }
            let event_lines: Vec<_> =
                touched.iter().map(|(line, quantity)| json!({ "line": line, "quantity": quantity })).collect();
            events::insert_order_event(
                order_id,
                OrderEventType::FulfillmentRefunded,
                json!({ "fulfillment": fulfillment.id, "lines": event_lines }),
                &mut tx,
            )
            .await?;
            return_fulfillment = Some(fulfillment);
        }

        let order = orders::update_order_status(order.id, &mut tx).await?;
        tx.commit().await?;
        debug!("↩️ Fulfillment refund for order [{}]: {} line(s) touched", order.number, touched.len());
        Ok(ReturnOutcome {
            order,
            return_fulfillment,
            replace_fulfillment: None,
            replacement_order: None,
            touched,
            return_subtotal,
        })
    }

    async fn set_fulfillment_refund_amounts(
        &self,
        fulfillment_id: i64,
        total: Money,
        shipping: Money,
    ) -> Result<Fulfillment, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let fulfillment = fulfillments::set_refund_amounts(fulfillment_id, total, shipping, &mut tx).await?;
        tx.commit().await?;
        Ok(fulfillment)
    }

    async fn update_tracking_number(
        &self,
        fulfillment_id: i64,
        tracking: &str,
    ) -> Result<Fulfillment, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let fulfillment = fulfillments::set_tracking_number(fulfillment_id, tracking, &mut tx).await?;
        events::insert_order_event(
            fulfillment.order_id,
            OrderEventType::TrackingUpdated,
            json!({ "fulfillment": fulfillment.id, "tracking_number": tracking }),
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(fulfillment)
    }

    async fn insert_order_event(
        &self,
        order_id: i64,
        event_type: OrderEventType,
        params: serde_json::Value,
    ) -> Result<OrderEventRow, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let event = events::insert_order_event(order_id, event_type, params, &mut tx).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn close(&mut self) -> Result<(), FulfillmentError> {
        self.pool.close().await;
        Ok(())
    }
}

/// Resolves every requested tuple and validates quantities against what is still drawable,
/// tracking draws within the request so repeated tuples cannot overshoot together. Order-line
/// sources draw from the unfulfilled pool (net of quantity awaiting approval); fulfillment-line
/// sources draw from the line's current quantity.
async fn resolve_return_items(
    items: &[ReturnItemInput],
    tx: &mut sqlx::SqliteConnection,
) -> Result<Vec<ResolvedReturnItem>, FulfillmentError> {
    let mut line_draw: HashMap<i64, i64> = HashMap::new();
    let mut fline_draw: HashMap<i64, i64> = HashMap::new();
    let mut resolved: Vec<ResolvedReturnItem> = Vec::with_capacity(items.len());
    for item in items {
        match item.source {
            ReturnSource::OrderLine(line_id) => {
                let line = orders::fetch_order_line(line_id, &mut *tx)
                    .await?
                    .ok_or(FulfillmentError::OrderLineNotFound(line_id))?;
                if line.is_gift_card {
                    return Err(FulfillmentError::GiftCardLine(line.id));
                }
                let awaiting = orders::awaiting_quantity(line.id, &mut *tx).await?;
                let drawn = line_draw.get(&line.id).copied().unwrap_or(0);
                let available = line.quantity - line.quantity_fulfilled - awaiting - drawn;
                if item.quantity <= 0 || item.quantity > available {
                    return Err(FulfillmentError::InvalidQuantity {
                        order_line_id: line.id,
                        requested: item.quantity,
                        available: available.max(0),
                    });
                }
                *line_draw.entry(line.id).or_insert(0) += item.quantity;
                resolved.push(ResolvedReturnItem {
                    order_line: line,
                    source_line: None,
                    quantity: item.quantity,
                    replace: item.replace,
                });
            },
            ReturnSource::FulfillmentLine(fline_id) => {
                let fline = fulfillments::fetch_fulfillment_line(fline_id, &mut *tx)
                    .await?
                    .ok_or(FulfillmentError::FulfillmentLineNotFound(fline_id))?;
                let line = orders::fetch_order_line(fline.order_line_id, &mut *tx)
                    .await?
                    .ok_or(FulfillmentError::OrderLineNotFound(fline.order_line_id))?;
                if line.is_gift_card {
                    return Err(FulfillmentError::GiftCardLine(line.id));
                }
                let drawn = fline_draw.get(&fline.id).copied().unwrap_or(0);
                let available = fline.quantity - drawn;
                if item.quantity <= 0 || item.quantity > available {
                    return Err(FulfillmentError::InvalidQuantity {
                        order_line_id: line.id,
                        requested: item.quantity,
                        available: available.max(0),
                    });
                }
                *fline_draw.entry(fline.id).or_insert(0) += item.quantity;
                resolved.push(ResolvedReturnItem {
                    order_line: line,
                    source_line: Some(fline),
                    quantity: item.quantity,
                    replace: item.replace,
                });
            },
        }
    }
    Ok(resolved)
}

/// Moves one resolved tuple into the target fulfillment and keeps the ledger in step: order-line
/// quantity comes out of the unfulfilled pool and releases its reservation; fulfillment-line
/// quantity splits off its source line, keeping the stock provenance.
async fn apply_return_item(
    target_fulfillment_id: i64,
    item: &ResolvedReturnItem,
    tx: &mut sqlx::SqliteConnection,
) -> Result<(), FulfillmentError> {
    match &item.source_line {
        None => {
            orders::adjust_quantity_fulfilled(item.order_line.id, item.quantity, &mut *tx).await?;
            stock::deallocate_for_line(item.order_line.id, item.quantity, &mut *tx).await?;
            fulfillments::upsert_fulfillment_line(target_fulfillment_id, item.order_line.id, None, item.quantity, tx)
                .await?;
        },
        Some(source) => {
            fulfillments::decrement_fulfillment_line(source.id, item.quantity, &mut *tx).await?;
            fulfillments::upsert_fulfillment_line(
                target_fulfillment_id,
                item.order_line.id,
                source.stock_id,
                item.quantity,
                tx,
            )
            .await?;
        },
    }
    Ok(())
}

impl TransactionDatabase for SqliteDatabase {
    async fn insert_checkout(&self, checkout: NewCheckout) -> Result<Checkout, TransactionError> {
        let mut tx = self.pool.begin().await?;
        let checkout = transactions::insert_checkout(checkout, &mut tx).await?;
        tx.commit().await?;
        Ok(checkout)
    }

    async fn fetch_checkout(&self, checkout_id: i64) -> Result<Option<Checkout>, TransactionError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_checkout(checkout_id, &mut conn).await?)
    }

    async fn create_transaction(
        &self,
        owner: TransactionOwner,
        transaction: NewTransaction,
    ) -> Result<TransactionFlowResult, TransactionError> {
        let mut tx = self.pool.begin().await?;
        let item = transactions::insert_transaction(owner, transaction, &mut tx).await?;
        // During creation, one event per non-zero field carrying the full initial value.
        let creation_events = [
            (TransactionEventType::AuthorizationSuccess, item.authorized_value),
            (TransactionEventType::ChargeSuccess, item.charged_value),
            (TransactionEventType::RefundSuccess, item.refunded_value),
            (TransactionEventType::CancelSuccess, item.canceled_value),
        ];
        let mut written = Vec::new();
        for (event_type, amount) in creation_events {
            if !amount.is_zero() {
                written.push(
                    transactions::insert_transaction_event(
                        item.id,
                        event_type,
                        amount,
                        item.psp_reference.as_deref(),
                        &mut tx,
                    )
                    .await?,
                );
            }
        }
        let (order, checkout, transitions) = recompute_owner(owner, &mut tx).await?;
        tx.commit().await?;
        trace!("💳️ Transaction {} created for {owner:?}", item.id);
        Ok(TransactionFlowResult { transaction: item, events: written, order, checkout, transitions })
    }

    async fn update_transaction(
        &self,
        transaction_id: i64,
        update: TransactionUpdate,
    ) -> Result<TransactionFlowResult, TransactionError> {
        let mut tx = self.pool.begin().await?;
        let current = transactions::fetch_transaction(transaction_id, &mut tx)
            .await?
            .ok_or(TransactionError::TransactionNotFound(transaction_id))?;
        let mut next = current.clone();
        if let Some(v) = update.authorized_value {
            next.authorized_value = v;
        }
        if let Some(v) = update.charged_value {
            next.charged_value = v;
        }
        if let Some(v) = update.refunded_value {
            next.refunded_value = v;
        }
        if let Some(v) = update.canceled_value {
            next.canceled_value = v;
        }
        if let Some(v) = update.authorize_pending_value {
            next.authorize_pending_value = v;
        }
        if let Some(v) = update.charge_pending_value {
            next.charge_pending_value = v;
        }
        if let Some(v) = update.refund_pending_value {
            next.refund_pending_value = v;
        }
        if let Some(v) = update.cancel_pending_value {
            next.cancel_pending_value = v;
        }
        let item = transactions::store_transaction_amounts(&next, &mut tx).await?;

        // One delta event per changed confirmed field; authorization changes are adjustments.
        let deltas = [
            (TransactionEventType::AuthorizationAdjustment, item.authorized_value - current.authorized_value),
            (TransactionEventType::ChargeSuccess, item.charged_value - current.charged_value),
            (TransactionEventType::RefundSuccess, item.refunded_value - current.refunded_value),
            (TransactionEventType::CancelSuccess, item.canceled_value - current.canceled_value),
        ];
        let mut written = Vec::new();
        for (event_type, delta) in deltas {
            if !delta.is_zero() {
                written.push(
                    transactions::insert_transaction_event(
                        item.id,
                        event_type,
                        delta,
                        item.psp_reference.as_deref(),
                        &mut tx,
                    )
                    .await?,
                );
            }
        }
        let owner = match (item.order_id, item.checkout_id) {
            (Some(order_id), _) => TransactionOwner::Order(order_id),
            (None, Some(checkout_id)) => TransactionOwner::Checkout(checkout_id),
            (None, None) => {
                return Err(TransactionError::DatabaseError(format!(
                    "transaction {transaction_id} has no owner"
                )))
            },
        };
        let (order, checkout, transitions) = recompute_owner(owner, &mut tx).await?;
        tx.commit().await?;
        Ok(TransactionFlowResult { transaction: item, events: written, order, checkout, transitions })
    }

    async fn fetch_transaction(&self, transaction_id: i64) -> Result<Option<TransactionItem>, TransactionError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transaction(transaction_id, &mut conn).await?)
    }

    async fn fetch_transactions_for_order(&self, order_id: i64) -> Result<Vec<TransactionItem>, TransactionError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transactions_for_order(order_id, &mut conn).await?)
    }

    async fn fetch_transaction_events(
        &self,
        transaction_id: i64,
    ) -> Result<Vec<TransactionEventRow>, TransactionError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transaction_events(transaction_id, &mut conn).await?)
    }

    async fn grant_refund(
        &self,
        order_id: i64,
        amount: Money,
        reason: &str,
    ) -> Result<(GrantedRefund, Order, PaymentTransitions), TransactionError> {
        let mut tx = self.pool.begin().await?;
        let granted = orders::insert_granted_refund(order_id, amount, reason, &mut tx).await?;
        let (order, transitions) = transactions::recompute_order_aggregates(order_id, &mut tx).await?;
        tx.commit().await?;
        Ok((granted, order, transitions))
    }

    async fn active_transaction_count(&self, order_id: i64) -> Result<i64, TransactionError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::active_transaction_count(order_id, &mut conn).await?)
    }
}

async fn recompute_owner(
    owner: TransactionOwner,
    tx: &mut sqlx::SqliteConnection,
) -> Result<(Option<Order>, Option<Checkout>, PaymentTransitions), TransactionError> {
    match owner {
        TransactionOwner::Order(order_id) => {
            let (order, transitions) = transactions::recompute_order_aggregates(order_id, tx).await?;
            Ok((Some(order), None, transitions))
        },
        TransactionOwner::Checkout(checkout_id) => {
            let checkout = transactions::recompute_checkout_aggregates(checkout_id, tx).await?;
            Ok((None, Some(checkout), PaymentTransitions::default()))
        },
    }
}
