use fulfillment_engine::{
    db_types::{
        AuthorizeStatusType,
        ChargeStatusType,
        NewCheckout,
        NewTransaction,
        TransactionEventType,
        TransactionUpdate,
    },
    events::EventProducers,
    traits::TransactionOwner,
    FulfillmentDatabase,
    SqliteDatabase,
    TransactionApi,
    TransactionDatabase,
    TransactionError,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use wfe_common::Money;

use crate::support::{
    fixtures::{seed_order, LineSpec, CURRENCY},
    prepare_env::{prepare_test_env, random_db_path},
};

mod support;

async fn setup() -> TransactionApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    TransactionApi::new(db, EventProducers::default())
}

async fn tear_down(mut api: TransactionApi<SqliteDatabase>) {
    let url = api.db().url().to_string();
    if let Err(e) = api.db_mut().close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

#[tokio::test]
async fn authorization_adjustments_record_the_signed_delta() {
    let api = setup().await;
    // Order total: 3 × 10.00.
    let seeded = seed_order(api.db(), 0, &[LineSpec::new(3, 1_000)]).await;

    let created = api
        .create_transaction(
            TransactionOwner::Order(seeded.order.id),
            NewTransaction::new("card", CURRENCY).authorized(Money::from(1_000)),
        )
        .await
        .unwrap();
    let order = created.order.clone().unwrap();
    assert_eq!(order.total_authorized, Money::from(1_000));
    assert_eq!(order.authorize_status, AuthorizeStatusType::Partial);
    assert_eq!(created.events.len(), 1);
    assert_eq!(created.events[0].event_type, TransactionEventType::AuthorizationSuccess);
    assert_eq!(created.events[0].amount, Money::from(1_000));

    let updated = api
        .update_transaction(created.transaction.id, TransactionUpdate::default().authorized(Money::ZERO))
        .await
        .unwrap();
    let order = updated.order.clone().unwrap();
    assert_eq!(order.total_authorized, Money::ZERO);
    assert_eq!(order.authorize_status, AuthorizeStatusType::None);
    assert_eq!(updated.events.len(), 1);
    assert_eq!(updated.events[0].event_type, TransactionEventType::AuthorizationAdjustment);
    assert_eq!(updated.events[0].amount, Money::from(-1_000));
    tear_down(api).await;
}

#[tokio::test]
async fn amount_fields_are_independent() {
    let api = setup().await;
    let seeded = seed_order(api.db(), 0, &[LineSpec::new(2, 2_000)]).await;
    let created = api
        .create_transaction(
            TransactionOwner::Order(seeded.order.id),
            NewTransaction::new("card", CURRENCY).authorized(Money::from(4_000)),
        )
        .await
        .unwrap();

    let updated = api
        .update_transaction(created.transaction.id, TransactionUpdate::default().refunded(Money::from(500)))
        .await
        .unwrap();
    assert_eq!(updated.transaction.authorized_value, Money::from(4_000));
    assert_eq!(updated.transaction.refunded_value, Money::from(500));
    assert_eq!(updated.events.len(), 1);
    assert_eq!(updated.events[0].event_type, TransactionEventType::RefundSuccess);
    assert_eq!(updated.events[0].amount, Money::from(500));
    let order = updated.order.unwrap();
    assert_eq!(order.total_authorized, Money::from(4_000));
    assert_eq!(order.total_refunded, Money::from(500));
    tear_down(api).await;
}

#[tokio::test]
async fn charge_status_tiers_follow_the_charge_target() {
    let api = setup().await;
    // Total 50.00.
    let seeded = seed_order(api.db(), 0, &[LineSpec::new(5, 1_000)]).await;
    let created = api
        .create_transaction(
            TransactionOwner::Order(seeded.order.id),
            NewTransaction::new("card", CURRENCY).charged(Money::from(3_000)),
        )
        .await
        .unwrap();
    assert_eq!(created.order.unwrap().charge_status, ChargeStatusType::Partial);

    // Granting a refund shrinks the target to what was charged.
    let (_, order) = api.grant_refund(seeded.order.id, Money::from(2_000), "damaged in transit").await.unwrap();
    assert_eq!(order.charge_status, ChargeStatusType::Full);
    assert_eq!(order.total_charged, Money::from(3_000));

    let updated = api
        .update_transaction(created.transaction.id, TransactionUpdate::default().charged(Money::from(6_000)))
        .await
        .unwrap();
    assert_eq!(updated.order.unwrap().charge_status, ChargeStatusType::Overcharged);
    tear_down(api).await;
}

#[tokio::test]
async fn transitions_fire_exactly_once_per_edge() {
    let api = setup().await;
    let seeded = seed_order(api.db(), 0, &[LineSpec::new(2, 1_000)]).await;
    let created = api
        .create_transaction(
            TransactionOwner::Order(seeded.order.id),
            NewTransaction::new("card", CURRENCY).charged(Money::from(2_000)),
        )
        .await
        .unwrap();
    assert!(created.transitions.newly_fully_paid);

    // Still fully charged afterwards: not a new edge.
    let updated = api
        .update_transaction(created.transaction.id, TransactionUpdate::default().refunded(Money::from(2_000)))
        .await
        .unwrap();
    assert!(!updated.transitions.newly_fully_paid);
    assert!(updated.transitions.newly_fully_refunded);
    tear_down(api).await;
}

#[tokio::test]
async fn totals_sum_over_every_transaction_of_the_order() {
    let api = setup().await;
    let seeded = seed_order(api.db(), 0, &[LineSpec::new(5, 1_000)]).await;
    api.create_transaction(
        TransactionOwner::Order(seeded.order.id),
        NewTransaction::new("card", CURRENCY).charged(Money::from(2_000)),
    )
    .await
    .unwrap();
    let second = api
        .create_transaction(
            TransactionOwner::Order(seeded.order.id),
            NewTransaction::new("wallet", CURRENCY).charged(Money::from(3_000)),
        )
        .await
        .unwrap();
    let order = second.order.unwrap();
    assert_eq!(order.total_charged, Money::from(5_000));
    assert_eq!(order.charge_status, ChargeStatusType::Full);
    assert!(second.transitions.newly_fully_paid);
    assert_eq!(api.db().active_transaction_count(seeded.order.id).await.unwrap(), 2);
    tear_down(api).await;
}

#[tokio::test]
async fn checkouts_aggregate_without_notifications() {
    let api = setup().await;
    let checkout = api.create_checkout(NewCheckout::new(CURRENCY, Money::from(4_000))).await.unwrap();
    let result = api
        .create_transaction(
            TransactionOwner::Checkout(checkout.id),
            NewTransaction::new("card", CURRENCY).charged(Money::from(4_000)),
        )
        .await
        .unwrap();
    assert!(result.order.is_none());
    let checkout = result.checkout.unwrap();
    assert_eq!(checkout.total_charged, Money::from(4_000));
    assert_eq!(checkout.charge_status, ChargeStatusType::Full);
    assert_eq!(result.transitions, Default::default());
    tear_down(api).await;
}

#[tokio::test]
async fn transaction_currency_must_match_the_owner() {
    let api = setup().await;
    let seeded = seed_order(api.db(), 0, &[LineSpec::new(1, 1_000)]).await;
    let err = api
        .create_transaction(TransactionOwner::Order(seeded.order.id), NewTransaction::new("card", "EUR"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransactionError::CurrencyMismatch { .. }), "unexpected error: {err}");
    tear_down(api).await;
}

#[tokio::test]
async fn pending_values_change_state_without_events() {
    let api = setup().await;
    let seeded = seed_order(api.db(), 0, &[LineSpec::new(1, 1_000)]).await;
    let created = api
        .create_transaction(TransactionOwner::Order(seeded.order.id), NewTransaction::new("card", CURRENCY))
        .await
        .unwrap();
    assert!(created.events.is_empty());

    let update = TransactionUpdate { charge_pending_value: Some(Money::from(1_000)), ..Default::default() };
    let updated = api.update_transaction(created.transaction.id, update).await.unwrap();
    assert!(updated.events.is_empty());
    assert_eq!(updated.transaction.charge_pending_value, Money::from(1_000));
    assert_eq!(updated.order.unwrap().total_charged, Money::ZERO);
    tear_down(api).await;
}

#[tokio::test]
async fn creation_writes_one_event_per_non_zero_field() {
    let api = setup().await;
    let seeded = seed_order(api.db(), 0, &[LineSpec::new(4, 1_000)]).await;
    let created = api
        .create_transaction(
            TransactionOwner::Order(seeded.order.id),
            NewTransaction::new("card", CURRENCY)
                .authorized(Money::from(4_000))
                .charged(Money::from(2_500))
                .refunded(Money::from(500)),
        )
        .await
        .unwrap();
    let kinds: Vec<_> = created.events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            TransactionEventType::AuthorizationSuccess,
            TransactionEventType::ChargeSuccess,
            TransactionEventType::RefundSuccess,
        ]
    );
    // Full values, not deltas, during creation.
    assert_eq!(created.events[1].amount, Money::from(2_500));
    let stored = api.db().fetch_transaction_events(created.transaction.id).await.unwrap();
    assert_eq!(stored.len(), 3);
    tear_down(api).await;
}
