use log::debug;
use sqlx::SqliteConnection;
use wfe_common::Money;

use crate::{
    db_types::{Fulfillment, FulfillmentLine, FulfillmentStatusType},
    traits::FulfillmentError,
};

/// The next sequential ordinal for the order. Ordinals are assigned at creation and never reused,
/// even after a fulfillment is deleted.
pub async fn next_ordinal(order_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COALESCE(MAX(ordinal), 0) + 1 FROM fulfillments WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(conn)
        .await
}

pub async fn insert_fulfillment(
    order_id: i64,
    ordinal: i64,
    status: FulfillmentStatusType,
    tracking_number: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Fulfillment, FulfillmentError> {
    let fulfillment: Fulfillment = sqlx::query_as(
        r#"
            INSERT INTO fulfillments (order_id, ordinal, status, tracking_number)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(ordinal)
    .bind(status)
    .bind(tracking_number)
    .fetch_one(conn)
    .await?;
    debug!("📦️ Fulfillment #{} created for order id {order_id} ({status})", fulfillment.ordinal);
    Ok(fulfillment)
}

pub async fn fetch_fulfillment(
    fulfillment_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Fulfillment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM fulfillments WHERE id = $1").bind(fulfillment_id).fetch_optional(conn).await
}

pub async fn fetch_fulfillments_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Fulfillment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM fulfillments WHERE order_id = $1 ORDER BY ordinal")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_fulfillment_lines(
    fulfillment_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<FulfillmentLine>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM fulfillment_lines WHERE fulfillment_id = $1 ORDER BY id")
        .bind(fulfillment_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_fulfillment_line(
    fulfillment_line_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<FulfillmentLine>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM fulfillment_lines WHERE id = $1").bind(fulfillment_line_id).fetch_optional(conn).await
}

/// The merge rule for refund/return flows: the oldest non-terminal fulfillment of the order with
/// the exact target status, if any. Later orchestration calls accumulate lines into it instead of
/// duplicating fulfillments.
pub async fn find_mergeable_fulfillment(
    order_id: i64,
    status: FulfillmentStatusType,
    conn: &mut SqliteConnection,
) -> Result<Option<Fulfillment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM fulfillments WHERE order_id = $1 AND status = $2 ORDER BY ordinal LIMIT 1")
        .bind(order_id)
        .bind(status)
        .fetch_optional(conn)
        .await
}

/// Adds quantity of an order line to a fulfillment, merging into an existing line with the same
/// `(order line, stock)` provenance instead of duplicating it.
pub async fn upsert_fulfillment_line(
    fulfillment_id: i64,
    order_line_id: i64,
    stock_id: Option<i64>,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<FulfillmentLine, FulfillmentError> {
    let existing: Option<FulfillmentLine> = sqlx::query_as(
        "SELECT * FROM fulfillment_lines WHERE fulfillment_id = $1 AND order_line_id = $2 AND stock_id IS $3",
    )
    .bind(fulfillment_id)
    .bind(order_line_id)
    .bind(stock_id)
    .fetch_optional(&mut *conn)
    .await?;
    let line = match existing {
        Some(line) => {
            sqlx::query_as("UPDATE fulfillment_lines SET quantity = quantity + $1 WHERE id = $2 RETURNING *")
                .bind(quantity)
                .bind(line.id)
                .fetch_one(conn)
                .await?
        },
        None => {
            sqlx::query_as(
                r#"
                    INSERT INTO fulfillment_lines (fulfillment_id, order_line_id, stock_id, quantity)
                    VALUES ($1, $2, $3, $4)
                    RETURNING *;
                "#,
            )
            .bind(fulfillment_id)
            .bind(order_line_id)
            .bind(stock_id)
            .bind(quantity)
            .fetch_one(conn)
            .await?
        },
    };
    Ok(line)
}

/// Shrinks a fulfillment line as quantity is split off by a return/replace; the row is removed
/// once empty.
pub async fn decrement_fulfillment_line(
    fulfillment_line_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), FulfillmentError> {
    sqlx::query("UPDATE fulfillment_lines SET quantity = MAX(0, quantity - $1) WHERE id = $2")
        .bind(quantity)
        .bind(fulfillment_line_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM fulfillment_lines WHERE id = $1 AND quantity = 0")
        .bind(fulfillment_line_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_status(
    fulfillment_id: i64,
    status: FulfillmentStatusType,
    conn: &mut SqliteConnection,
) -> Result<Fulfillment, FulfillmentError> {
    let fulfillment = sqlx::query_as("UPDATE fulfillments SET status = $1 WHERE id = $2 RETURNING *")
        .bind(status)
        .bind(fulfillment_id)
        .fetch_optional(conn)
        .await?
        .ok_or(FulfillmentError::FulfillmentNotFound(fulfillment_id))?;
    Ok(fulfillment)
}

pub async fn set_tracking_number(
    fulfillment_id: i64,
    tracking: &str,
    conn: &mut SqliteConnection,
) -> Result<Fulfillment, FulfillmentError> {
    let fulfillment = sqlx::query_as("UPDATE fulfillments SET tracking_number = $1 WHERE id = $2 RETURNING *")
        .bind(tracking)
        .bind(fulfillment_id)
        .fetch_optional(conn)
        .await?
        .ok_or(FulfillmentError::FulfillmentNotFound(fulfillment_id))?;
    Ok(fulfillment)
}

pub async fn set_refund_amounts(
    fulfillment_id: i64,
    total: Money,
    shipping: Money,
    conn: &mut SqliteConnection,
) -> Result<Fulfillment, FulfillmentError> {
    let fulfillment = sqlx::query_as(
        "UPDATE fulfillments SET total_refund_amount = $1, shipping_refund_amount = $2 WHERE id = $3 RETURNING *",
    )
    .bind(total)
    .bind(shipping)
    .bind(fulfillment_id)
    .fetch_optional(conn)
    .await?
    .ok_or(FulfillmentError::FulfillmentNotFound(fulfillment_id))?;
    Ok(fulfillment)
}

/// Removes an unapproved fulfillment and its lines. Nothing was consumed, so there is no ledger
/// effect to reverse.
pub async fn delete_fulfillment(fulfillment_id: i64, conn: &mut SqliteConnection) -> Result<(), FulfillmentError> {
    sqlx::query("DELETE FROM fulfillment_lines WHERE fulfillment_id = $1")
        .bind(fulfillment_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM fulfillments WHERE id = $1").bind(fulfillment_id).execute(conn).await?;
    Ok(())
}

/// The id of the first gift-card order line in the fulfillment, if any. Gift-card lines make a
/// fulfillment ineligible for cancellation and refund flows.
pub async fn first_gift_card_line(
    fulfillment_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
            SELECT ol.id
            FROM fulfillment_lines fl
            INNER JOIN order_lines ol ON ol.id = fl.order_line_id
            WHERE fl.fulfillment_id = $1 AND ol.is_gift_card = 1
            ORDER BY ol.id
            LIMIT 1
        "#,
    )
    .bind(fulfillment_id)
    .fetch_optional(conn)
    .await
}
