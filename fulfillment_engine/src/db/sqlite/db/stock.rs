use sqlx::SqliteConnection;

use crate::{
    db_types::{Allocation, NewStock, Stock, VariantId, WarehouseId},
    traits::{FulfillmentError, InsufficientStockLine},
};

/// Creates the stock record for `(warehouse, variant)`, or adds the quantity to an existing one.
pub async fn upsert_stock(stock: NewStock, conn: &mut SqliteConnection) -> Result<Stock, FulfillmentError> {
    let stock = sqlx::query_as(
        r#"
            INSERT INTO stocks (warehouse_id, variant_id, quantity) VALUES ($1, $2, $3)
            ON CONFLICT (warehouse_id, variant_id)
            DO UPDATE SET quantity = quantity + excluded.quantity
            RETURNING *;
        "#,
    )
    .bind(stock.warehouse_id)
    .bind(stock.variant_id)
    .bind(stock.quantity)
    .fetch_one(conn)
    .await?;
    Ok(stock)
}

pub async fn fetch_stock(
    warehouse_id: &WarehouseId,
    variant_id: &VariantId,
    conn: &mut SqliteConnection,
) -> Result<Option<Stock>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM stocks WHERE warehouse_id = $1 AND variant_id = $2")
        .bind(warehouse_id)
        .bind(variant_id)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_stock_by_id(stock_id: i64, conn: &mut SqliteConnection) -> Result<Option<Stock>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM stocks WHERE id = $1").bind(stock_id).fetch_optional(conn).await
}

/// The total quantity reserved against the stock, across every order line.
pub async fn allocated_total(stock_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COALESCE(SUM(quantity_allocated), 0) FROM allocations WHERE stock_id = $1")
        .bind(stock_id)
        .fetch_one(conn)
        .await
}

/// The quantity a given order line may still draw from the stock: on-hand quantity less every
/// *other* line's reservation. The line's own reservation is not double-counted against it.
pub async fn available_for_line(
    stock: &Stock,
    order_line_id: i64,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    let total = allocated_total(stock.id, conn).await?;
    let own: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity_allocated), 0) FROM allocations WHERE stock_id = $1 AND order_line_id = $2",
    )
    .bind(stock.id)
    .bind(order_line_id)
    .fetch_one(conn)
    .await?;
    Ok(stock.quantity - total + own)
}

/// Reserves `quantity` of the stock against the order line.
pub async fn allocate(
    order_line_id: i64,
    stock_id: i64,
    quantity: i64,
    allow_exceed: bool,
    conn: &mut SqliteConnection,
) -> Result<Allocation, FulfillmentError> {
    let stock = fetch_stock_by_id(stock_id, conn).await?.ok_or(FulfillmentError::StockNotFound)?;
    if !allow_exceed {
        let total = allocated_total(stock_id, conn).await?;
        if total + quantity > stock.quantity {
            return Err(FulfillmentError::InsufficientStock(vec![InsufficientStockLine {
                order_line_id,
                warehouse_id: stock.warehouse_id,
                requested: quantity,
                available: stock.quantity - total,
            }]));
        }
    }
    let allocation = sqlx::query_as(
        r#"
            INSERT INTO allocations (order_line_id, stock_id, quantity_allocated) VALUES ($1, $2, $3)
            ON CONFLICT (order_line_id, stock_id)
            DO UPDATE SET quantity_allocated = quantity_allocated + excluded.quantity_allocated
            RETURNING *;
        "#,
    )
    .bind(order_line_id)
    .bind(stock_id)
    .bind(quantity)
    .fetch_one(conn)
    .await?;
    Ok(allocation)
}

/// Releases up to `quantity` of the reservation on one stock. Reservations never go below zero;
/// an empty reservation is removed.
pub async fn deallocate(
    order_line_id: i64,
    stock_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), FulfillmentError> {
    sqlx::query(
        "UPDATE allocations SET quantity_allocated = MAX(0, quantity_allocated - $1) \
         WHERE order_line_id = $2 AND stock_id = $3",
    )
    .bind(quantity)
    .bind(order_line_id)
    .bind(stock_id)
    .execute(&mut *conn)
    .await?;
    sqlx::query("DELETE FROM allocations WHERE order_line_id = $1 AND stock_id = $2 AND quantity_allocated = 0")
        .bind(order_line_id)
        .bind(stock_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Releases up to `quantity` from the line's reservations, across stocks, oldest first.
pub async fn deallocate_for_line(
    order_line_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), FulfillmentError> {
    let allocations = fetch_allocations_for_line(order_line_id, conn).await?;
    let mut remaining = quantity;
    for allocation in allocations {
        if remaining <= 0 {
            break;
        }
        let release = remaining.min(allocation.quantity_allocated);
        deallocate(order_line_id, allocation.stock_id, release, conn).await?;
        remaining -= release;
    }
    Ok(())
}

pub async fn fetch_allocations_for_line(
    order_line_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Allocation>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM allocations WHERE order_line_id = $1 ORDER BY id")
        .bind(order_line_id)
        .fetch_all(conn)
        .await
}

/// Physically removes quantity from the warehouse and releases the matching reservation. Used
/// when a fulfillment ships. Availability is the caller's concern; the caller collects shortfalls
/// across its whole batch before consuming anything.
pub async fn consume(
    stock_id: i64,
    order_line_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), FulfillmentError> {
    sqlx::query("UPDATE stocks SET quantity = quantity - $1 WHERE id = $2")
        .bind(quantity)
        .bind(stock_id)
        .execute(&mut *conn)
        .await?;
    deallocate(order_line_id, stock_id, quantity, conn).await?;
    Ok(())
}

/// The inverse of [`consume`]: puts quantity back into the warehouse and re-reserves it against
/// the originating order line. Used on cancellation.
pub async fn restock(
    stock_id: i64,
    order_line_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), FulfillmentError> {
    sqlx::query("UPDATE stocks SET quantity = quantity + $1 WHERE id = $2")
        .bind(quantity)
        .bind(stock_id)
        .execute(&mut *conn)
        .await?;
    allocate(order_line_id, stock_id, quantity, true, conn).await?;
    Ok(())
}
