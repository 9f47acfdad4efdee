use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderEventRow, OrderEventType},
    traits::FulfillmentError,
};

/// Appends an entry to the order audit trail. The sink is assumed to succeed; a failure here is a
/// database error, not a business outcome.
pub async fn insert_order_event(
    order_id: i64,
    event_type: OrderEventType,
    params: serde_json::Value,
    conn: &mut SqliteConnection,
) -> Result<OrderEventRow, FulfillmentError> {
    let event = sqlx::query_as(
        "INSERT INTO order_events (order_id, event_type, params) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(order_id)
    .bind(event_type)
    .bind(params.to_string())
    .fetch_one(conn)
    .await?;
    Ok(event)
}

pub async fn fetch_order_events(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderEventRow>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_events WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await
}
