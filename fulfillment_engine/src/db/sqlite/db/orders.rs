use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};
use wfe_common::Money;

use crate::{
    db_types::{GrantedRefund, NewOrder, NewOrderLine, Order, OrderLine, OrderNumber, OrderOrigin, OrderStatusType},
    helpers::{derive_order_status, LineFulfillmentTotals},
    traits::FulfillmentError,
    wfe_api::order_objects::OrderQueryFilter,
};

/// Inserts a new order into the database using the given connection. This is not atomic. You can
/// embed this call inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as
/// the connection argument.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, FulfillmentError> {
    let number = order.number.clone();
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                number,
                currency,
                channel,
                total_gross,
                total_net,
                shipping_price_gross,
                shipping_price_net,
                shipping_address,
                billing_address,
                metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(order.number)
    .bind(order.currency)
    .bind(order.channel)
    .bind(order.total_gross)
    .bind(order.total_net)
    .bind(order.shipping_price_gross)
    .bind(order.shipping_price_net)
    .bind(order.shipping_address)
    .bind(order.billing_address)
    .bind(order.metadata)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => FulfillmentError::OrderAlreadyExists(number),
        _ => FulfillmentError::from(e),
    })?;
    debug!("🗃️ Order [{}] inserted with id {}", order.number, order.id);
    Ok(order)
}

pub async fn insert_order_line(
    order_id: i64,
    line: NewOrderLine,
    conn: &mut SqliteConnection,
) -> Result<OrderLine, FulfillmentError> {
    let line = sqlx::query_as(
        r#"
            INSERT INTO order_lines (
                order_id,
                variant_id,
                product_name,
                sku,
                quantity,
                unit_price_gross,
                unit_price_net,
                tax_rate,
                is_gift_card,
                is_preorder
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(line.variant_id)
    .bind(line.product_name)
    .bind(line.sku)
    .bind(line.quantity)
    .bind(line.unit_price_gross)
    .bind(line.unit_price_net)
    .bind(line.tax_rate)
    .bind(line.is_gift_card)
    .bind(line.is_preorder)
    .fetch_one(conn)
    .await?;
    Ok(line)
}

pub async fn fetch_order_by_number(
    number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE number = $1").bind(number.as_str()).fetch_optional(conn).await
}

pub async fn fetch_order_by_id(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id).fetch_optional(conn).await
}

pub async fn fetch_order_lines(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderLine>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_lines WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_order_line(
    order_line_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderLine>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_lines WHERE id = $1").bind(order_line_id).fetch_optional(conn).await
}

/// Moves quantity into (positive delta) or out of (negative delta) the line's fulfilled pool.
pub async fn adjust_quantity_fulfilled(
    order_line_id: i64,
    delta: i64,
    conn: &mut SqliteConnection,
) -> Result<OrderLine, FulfillmentError> {
    let line = sqlx::query_as(
        "UPDATE order_lines SET quantity_fulfilled = quantity_fulfilled + $1 WHERE id = $2 RETURNING *",
    )
    .bind(delta)
    .bind(order_line_id)
    .fetch_optional(conn)
    .await?
    .ok_or(FulfillmentError::OrderLineNotFound(order_line_id))?;
    Ok(line)
}

/// Quantity of the line currently reserved in fulfillments awaiting approval.
pub async fn awaiting_quantity(order_line_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
            SELECT COALESCE(SUM(fl.quantity), 0)
            FROM fulfillment_lines fl
            INNER JOIN fulfillments f ON f.id = fl.fulfillment_id
            WHERE fl.order_line_id = $1 AND f.status = 'WaitingForApproval'
        "#,
    )
    .bind(order_line_id)
    .fetch_one(conn)
    .await
}

/// The per-line quantity buckets feeding the order status derivation.
pub async fn line_fulfillment_totals(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<LineFulfillmentTotals>, sqlx::Error> {
    let rows: Vec<(i64, i64, i64, i64)> = sqlx::query_as(
        r#"
            SELECT
                ol.quantity,
                COALESCE(SUM(CASE WHEN f.status IN ('Fulfilled', 'Replaced') THEN fl.quantity ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN f.status IN ('Returned', 'RefundedAndReturned') THEN fl.quantity ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN f.status = 'WaitingForApproval' THEN fl.quantity ELSE 0 END), 0)
            FROM order_lines ol
            LEFT JOIN fulfillment_lines fl ON fl.order_line_id = ol.id
            LEFT JOIN fulfillments f ON f.id = fl.fulfillment_id
            WHERE ol.order_id = $1
            GROUP BY ol.id
        "#,
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(quantity, fulfilled, returned, awaiting)| LineFulfillmentTotals {
            quantity,
            fulfilled,
            returned,
            awaiting,
        })
        .collect())
}

/// Recomputes the order status from the fulfillment state. Statuses that are not
/// fulfillment-derived (`Draft`, `Unconfirmed`, `Canceled`) are left untouched.
pub async fn update_order_status(order_id: i64, conn: &mut SqliteConnection) -> Result<Order, FulfillmentError> {
    let order =
        fetch_order_by_id(order_id, conn).await?.ok_or(FulfillmentError::OrderIdNotFound(order_id))?;
    if !order.status.is_fulfillment_derived() {
        return Ok(order);
    }
    let totals = line_fulfillment_totals(order_id, conn).await?;
    let status = derive_order_status(&totals);
    if status == order.status {
        return Ok(order);
    }
    trace!("🗃️ Order [{}] status {} -> {status}", order.number, order.status);
    let order = sqlx::query_as(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(status)
    .bind(order_id)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Spawns the draft order that redelivers replaced goods. Addresses and metadata are cloned from
/// the source; totals are filled in by the caller as lines are added.
pub async fn insert_replacement_order(source: &Order, conn: &mut SqliteConnection) -> Result<Order, FulfillmentError> {
    let reissues: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE original_order_id = $1")
        .bind(source.id)
        .fetch_one(&mut *conn)
        .await?;
    let number = OrderNumber(format!("{}-R{}", source.number.as_str(), reissues + 1));
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                number,
                status,
                origin,
                original_order_id,
                currency,
                channel,
                shipping_address,
                billing_address,
                metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(number)
    .bind(OrderStatusType::Draft)
    .bind(OrderOrigin::Reissue)
    .bind(source.id)
    .bind(source.currency.as_str())
    .bind(source.channel.as_str())
    .bind(source.shipping_address.as_deref())
    .bind(source.billing_address.as_deref())
    .bind(source.metadata.as_deref())
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Replacement order [{}] spawned for [{}]", order.number, source.number);
    Ok(order)
}

/// Copies the salient fields of an order line onto a replacement order, with a fresh identity
/// and nothing fulfilled.
pub async fn insert_replacement_line(
    order_id: i64,
    source: &OrderLine,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<OrderLine, FulfillmentError> {
    let line = sqlx::query_as(
        r#"
            INSERT INTO order_lines (
                order_id,
                variant_id,
                product_name,
                sku,
                quantity,
                unit_price_gross,
                unit_price_net,
                tax_rate,
                is_gift_card,
                is_preorder
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(source.variant_id.clone())
    .bind(source.product_name.as_str())
    .bind(source.sku.as_str())
    .bind(quantity)
    .bind(source.unit_price_gross)
    .bind(source.unit_price_net)
    .bind(source.tax_rate)
    .bind(source.is_gift_card)
    .bind(source.is_preorder)
    .fetch_one(&mut *conn)
    .await?;
    sqlx::query(
        "UPDATE orders SET total_gross = total_gross + $1, total_net = total_net + $2, \
         updated_at = CURRENT_TIMESTAMP WHERE id = $3",
    )
    .bind(source.unit_price_gross * quantity)
    .bind(source.unit_price_net * quantity)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(line)
}

pub async fn insert_granted_refund(
    order_id: i64,
    amount: Money,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<GrantedRefund, sqlx::Error> {
    sqlx::query_as("INSERT INTO granted_refunds (order_id, amount, reason) VALUES ($1, $2, $3) RETURNING *")
        .bind(order_id)
        .bind(amount)
        .bind(reason)
        .fetch_one(conn)
        .await
}

pub async fn granted_refund_total(order_id: i64, conn: &mut SqliteConnection) -> Result<Money, sqlx::Error> {
    let total: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM granted_refunds WHERE order_id = $1")
            .bind(order_id)
            .fetch_one(conn)
            .await?;
    Ok(Money::from(total))
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at` in ascending order.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM orders
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(number) = query.number {
        where_clause.push("number = ");
        where_clause.push_bind_unseparated(number.0);
    }
    if let Some(channel) = query.channel {
        where_clause.push("channel = ");
        where_clause.push_bind_unseparated(channel);
    }
    if let Some(currency) = query.currency {
        where_clause.push("currency = ");
        where_clause.push_bind_unseparated(currency);
    }
    if let Some(origin) = query.origin {
        where_clause.push("origin = ");
        where_clause.push_bind_unseparated(origin.to_string());
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let mut statuses = vec![];
        query.status.as_ref().unwrap().iter().for_each(|s| {
            statuses.push(format!("'{s}'"));
        });
        let status_clause = statuses.join(",");
        where_clause.push(format!("status IN ({status_clause})"));
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");

    trace!("🗃️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Order>();
    let orders = query.fetch_all(conn).await?;
    Ok(orders)
}
