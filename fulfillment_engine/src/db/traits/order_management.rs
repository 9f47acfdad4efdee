use thiserror::Error;

use crate::{
    db_types::{
        Allocation,
        Fulfillment,
        FulfillmentLine,
        Order,
        OrderEventRow,
        OrderLine,
        OrderNumber,
        Stock,
        VariantId,
        WarehouseId,
    },
    wfe_api::order_objects::OrderQueryFilter,
};

/// Read-side queries over orders, fulfillments, stock and the audit trail.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    async fn fetch_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, OrderQueryError>;

    async fn fetch_order_by_id(&self, order_id: i64) -> Result<Option<Order>, OrderQueryError>;

    async fn fetch_order_lines(&self, order_id: i64) -> Result<Vec<OrderLine>, OrderQueryError>;

    async fn fetch_fulfillments(&self, order_id: i64) -> Result<Vec<Fulfillment>, OrderQueryError>;

    async fn fetch_fulfillment(&self, fulfillment_id: i64) -> Result<Option<Fulfillment>, OrderQueryError>;

    async fn fetch_fulfillment_lines(&self, fulfillment_id: i64) -> Result<Vec<FulfillmentLine>, OrderQueryError>;

    async fn fetch_stock(&self, warehouse_id: &WarehouseId, variant_id: &VariantId)
        -> Result<Option<Stock>, OrderQueryError>;

    async fn fetch_allocations_for_line(&self, order_line_id: i64) -> Result<Vec<Allocation>, OrderQueryError>;

    async fn fetch_order_events(&self, order_id: i64) -> Result<Vec<OrderEventRow>, OrderQueryError>;

    /// Fetches orders according to criteria specified in the `OrderQueryFilter`.
    /// Resulting orders are ordered by `created_at` in ascending order.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderQueryError>;
}

#[derive(Debug, Clone, Error)]
pub enum OrderQueryError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User error constructing query: {0}")]
    QueryError(String),
}

impl From<sqlx::Error> for OrderQueryError {
    fn from(e: sqlx::Error) -> Self {
        OrderQueryError::DatabaseError(e.to_string())
    }
}
