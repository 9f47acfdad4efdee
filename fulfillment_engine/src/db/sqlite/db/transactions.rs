use log::trace;
use sqlx::SqliteConnection;
use wfe_common::Money;

use crate::{
    db_types::{
        AuthorizeStatusType,
        Checkout,
        NewCheckout,
        NewTransaction,
        Order,
        TransactionEventRow,
        TransactionEventType,
        TransactionItem,
    },
    helpers::{derive_authorize_status, derive_charge_status},
    sqlite::db::orders,
    traits::{PaymentTransitions, TransactionError, TransactionOwner},
};

pub async fn insert_checkout(checkout: NewCheckout, conn: &mut SqliteConnection) -> Result<Checkout, sqlx::Error> {
    sqlx::query_as("INSERT INTO checkouts (currency, total_gross) VALUES ($1, $2) RETURNING *")
        .bind(checkout.currency)
        .bind(checkout.total_gross)
        .fetch_one(conn)
        .await
}

pub async fn fetch_checkout(checkout_id: i64, conn: &mut SqliteConnection) -> Result<Option<Checkout>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM checkouts WHERE id = $1").bind(checkout_id).fetch_optional(conn).await
}

pub async fn fetch_transaction(
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<TransactionItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transaction_items WHERE id = $1").bind(transaction_id).fetch_optional(conn).await
}

pub async fn fetch_transactions_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<TransactionItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transaction_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_transaction_events(
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<TransactionEventRow>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transaction_events WHERE transaction_id = $1 ORDER BY id")
        .bind(transaction_id)
        .fetch_all(conn)
        .await
}

/// Transactions that hold or expect money. An order with more than one of these cannot take an
/// amount-based refund; the caller must supply an explicit allocation list.
pub async fn active_transaction_count(order_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
            SELECT COUNT(*) FROM transaction_items
            WHERE order_id = $1
              AND (authorized_value > 0 OR charged_value > 0
                   OR authorize_pending_value > 0 OR charge_pending_value > 0)
        "#,
    )
    .bind(order_id)
    .fetch_one(conn)
    .await
}

pub async fn insert_transaction(
    owner: TransactionOwner,
    transaction: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<TransactionItem, TransactionError> {
    let (order_id, checkout_id, owner_currency) = match owner {
        TransactionOwner::Order(id) => {
            let order = orders::fetch_order_by_id(id, &mut *conn)
                .await?
                .ok_or(TransactionError::OwnerNotFound(owner))?;
            (Some(id), None, order.currency)
        },
        TransactionOwner::Checkout(id) => {
            let checkout =
                fetch_checkout(id, &mut *conn).await?.ok_or(TransactionError::OwnerNotFound(owner))?;
            (None, Some(id), checkout.currency)
        },
    };
    if transaction.currency != owner_currency {
        return Err(TransactionError::CurrencyMismatch { transaction: transaction.currency, owner: owner_currency });
    }
    let item = sqlx::query_as(
        r#"
            INSERT INTO transaction_items (
                order_id,
                checkout_id,
                name,
                psp_reference,
                currency,
                authorized_value,
                charged_value,
                refunded_value,
                canceled_value,
                authorize_pending_value,
                charge_pending_value,
                refund_pending_value,
                cancel_pending_value
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(checkout_id)
    .bind(transaction.name)
    .bind(transaction.psp_reference)
    .bind(transaction.currency)
    .bind(transaction.authorized_value)
    .bind(transaction.charged_value)
    .bind(transaction.refunded_value)
    .bind(transaction.canceled_value)
    .bind(transaction.authorize_pending_value)
    .bind(transaction.charge_pending_value)
    .bind(transaction.refund_pending_value)
    .bind(transaction.cancel_pending_value)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

/// Overwrites the amount columns with the post-update values. The caller computes them; this
/// function only persists.
pub async fn store_transaction_amounts(
    item: &TransactionItem,
    conn: &mut SqliteConnection,
) -> Result<TransactionItem, TransactionError> {
    let updated = sqlx::query_as(
        r#"
            UPDATE transaction_items SET
                authorized_value = $1,
                charged_value = $2,
                refunded_value = $3,
                canceled_value = $4,
                authorize_pending_value = $5,
                charge_pending_value = $6,
                refund_pending_value = $7,
                cancel_pending_value = $8,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $9
            RETURNING *;
        "#,
    )
    .bind(item.authorized_value)
    .bind(item.charged_value)
    .bind(item.refunded_value)
    .bind(item.canceled_value)
    .bind(item.authorize_pending_value)
    .bind(item.charge_pending_value)
    .bind(item.refund_pending_value)
    .bind(item.cancel_pending_value)
    .bind(item.id)
    .fetch_one(conn)
    .await?;
    Ok(updated)
}

pub async fn insert_transaction_event(
    transaction_id: i64,
    event_type: TransactionEventType,
    amount: Money,
    reference: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<TransactionEventRow, TransactionError> {
    let event = sqlx::query_as(
        "INSERT INTO transaction_events (transaction_id, event_type, amount, reference) \
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(transaction_id)
    .bind(event_type)
    .bind(amount)
    .bind(reference)
    .fetch_one(conn)
    .await?;
    Ok(event)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerTotals {
    pub authorized: Money,
    pub charged: Money,
    pub refunded: Money,
    pub canceled: Money,
}

async fn sum_for_owner(
    column: &str,
    value: i64,
    conn: &mut SqliteConnection,
) -> Result<OwnerTotals, sqlx::Error> {
    let sql = format!(
        "SELECT COALESCE(SUM(authorized_value), 0), COALESCE(SUM(charged_value), 0), \
         COALESCE(SUM(refunded_value), 0), COALESCE(SUM(canceled_value), 0) \
         FROM transaction_items WHERE {column} = $1"
    );
    let (authorized, charged, refunded, canceled): (i64, i64, i64, i64) =
        sqlx::query_as(&sql).bind(value).fetch_one(conn).await?;
    Ok(OwnerTotals {
        authorized: Money::from(authorized),
        charged: Money::from(charged),
        refunded: Money::from(refunded),
        canceled: Money::from(canceled),
    })
}

/// Recomputes an order's aggregates and derived statuses from all its transactions plus the
/// legacy single-payment amounts, and reports which notification edges were crossed.
pub async fn recompute_order_aggregates(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<(Order, PaymentTransitions), TransactionError> {
    let old = orders::fetch_order_by_id(order_id, &mut *conn)
        .await?
        .ok_or(TransactionError::OwnerNotFound(TransactionOwner::Order(order_id)))?;
    let mut totals = sum_for_owner("order_id", order_id, &mut *conn).await?;
    totals.authorized = totals.authorized + old.legacy_authorized;
    totals.charged = totals.charged + old.legacy_charged;
    let granted = orders::granted_refund_total(order_id, &mut *conn).await?;
    let charge_status = derive_charge_status(totals.charged, old.charge_target(granted));
    let authorize_status = derive_authorize_status(totals.authorized, old.total_gross);
    let order: Order = sqlx::query_as(
        r#"
            UPDATE orders SET
                total_authorized = $1,
                total_charged = $2,
                total_refunded = $3,
                total_canceled = $4,
                charge_status = $5,
                authorize_status = $6,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $7
            RETURNING *;
        "#,
    )
    .bind(totals.authorized)
    .bind(totals.charged)
    .bind(totals.refunded)
    .bind(totals.canceled)
    .bind(charge_status)
    .bind(authorize_status)
    .bind(order_id)
    .fetch_one(conn)
    .await?;
    let transitions = PaymentTransitions {
        newly_fully_paid: !old.charge_status.is_fully_charged() && order.charge_status.is_fully_charged(),
        newly_fully_authorized: old.authorize_status != AuthorizeStatusType::Full
            && order.authorize_status == AuthorizeStatusType::Full,
        newly_fully_refunded: order.total_gross.is_positive()
            && old.total_refunded < old.total_gross
            && order.total_refunded >= order.total_gross,
    };
    trace!(
        "💳️ Order [{}] aggregates recomputed: charged {} ({}), authorized {} ({})",
        order.number,
        order.total_charged,
        order.charge_status,
        order.total_authorized,
        order.authorize_status
    );
    Ok((order, transitions))
}

/// The checkout flavour of the recomputation. Checkouts have no granted refunds and fire no
/// notifications.
pub async fn recompute_checkout_aggregates(
    checkout_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Checkout, TransactionError> {
    let old = fetch_checkout(checkout_id, &mut *conn)
        .await?
        .ok_or(TransactionError::OwnerNotFound(TransactionOwner::Checkout(checkout_id)))?;
    let totals = sum_for_owner("checkout_id", checkout_id, &mut *conn).await?;
    let charge_status = derive_charge_status(totals.charged, old.total_gross);
    let authorize_status = derive_authorize_status(totals.authorized, old.total_gross);
    let checkout = sqlx::query_as(
        r#"
            UPDATE checkouts SET
                total_authorized = $1,
                total_charged = $2,
                total_refunded = $3,
                total_canceled = $4,
                charge_status = $5,
                authorize_status = $6,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $7
            RETURNING *;
        "#,
    )
    .bind(totals.authorized)
    .bind(totals.charged)
    .bind(totals.refunded)
    .bind(totals.canceled)
    .bind(charge_status)
    .bind(authorize_status)
    .bind(checkout_id)
    .fetch_one(conn)
    .await?;
    Ok(checkout)
}
