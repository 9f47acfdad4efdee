use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use fulfillment_engine::{
    db_types::NewTransaction,
    events::{EventHandlers, EventHooks, EventProducers},
    order_objects::{FulfillmentPolicy, FulfillmentRequest},
    traits::{FulfillmentLineInput, TransactionOwner},
    FulfillmentApi,
    FulfillmentDatabase,
    SqliteDatabase,
    TransactionApi,
};
use futures_util::FutureExt;
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use wfe_common::Money;

use crate::support::{
    fixtures::{seed_order, warehouse, LineSpec, CURRENCY},
    prepare_env::{prepare_test_env, random_db_path},
};

mod support;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

async fn tear_down(mut db: SqliteDatabase) {
    let url = db.url().to_string();
    if let Err(e) = db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

async fn start_producers(hooks: EventHooks) -> EventProducers {
    let handlers = EventHandlers::new(16, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    producers
}

#[tokio::test]
async fn order_updated_fires_for_every_lifecycle_mutation() {
    let db = new_db().await;
    let event = HookCalled::default();
    let event_copy = event.clone();
    let mut hooks = EventHooks::default();
    hooks.on_order_updated(move |ev| {
        info!("🪝️ order updated: {}", ev.order.number);
        event_copy.called();
        async {}.boxed()
    });
    let api = FulfillmentApi::new(db.clone(), start_producers(hooks).await);

    let seeded = seed_order(&db, 0, &[LineSpec::new(2, 1_000)]).await;
    let request = FulfillmentRequest::new(
        seeded.order.number.clone(),
        vec![FulfillmentLineInput::new(warehouse(), seeded.lines[0].id, 2)],
    )
    .approved(true);
    let batch = api.create_fulfillments(request, &FulfillmentPolicy::default()).await.unwrap();
    api.cancel_fulfillment(batch.fulfillments[0].id, Some(&warehouse())).await.unwrap();

    drop(api);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(event.count(), 2);
    tear_down(db).await;
}

#[tokio::test]
async fn fully_paid_fires_once_per_transition() {
    let db = new_db().await;
    let event = HookCalled::default();
    let event_copy = event.clone();
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(move |ev| {
        info!("🪝️ order paid: {}", ev.order.number);
        event_copy.called();
        async {}.boxed()
    });
    let api = TransactionApi::new(db.clone(), start_producers(hooks).await);

    let seeded = seed_order(&db, 0, &[LineSpec::new(2, 1_000)]).await;
    let created = api
        .create_transaction(
            TransactionOwner::Order(seeded.order.id),
            NewTransaction::new("card", CURRENCY).charged(Money::from(2_000)),
        )
        .await
        .unwrap();
    // Already fully paid; bumping the refund field crosses no charge edge.
    api.update_transaction(
        created.transaction.id,
        fulfillment_engine::db_types::TransactionUpdate::default().refunded(Money::from(100)),
    )
    .await
    .unwrap();

    drop(api);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(event.count(), 1);
    tear_down(db).await;
}

#[tokio::test]
async fn approval_and_tracking_hooks_fire() {
    let db = new_db().await;
    let approved = HookCalled::default();
    let approved_copy = approved.clone();
    let tracking = HookCalled::default();
    let tracking_copy = tracking.clone();
    let mut hooks = EventHooks::default();
    hooks.on_fulfillment_approved(move |ev| {
        info!("🪝️ fulfillment approved: #{}", ev.fulfillment.ordinal);
        approved_copy.called();
        async {}.boxed()
    });
    hooks.on_tracking_updated(move |ev| {
        info!("🪝️ tracking updated: {}", ev.tracking_number);
        tracking_copy.called();
        async {}.boxed()
    });
    let api = FulfillmentApi::new(db.clone(), start_producers(hooks).await);

    let seeded = seed_order(&db, 0, &[LineSpec::new(1, 1_000)]).await;
    let request = FulfillmentRequest::new(
        seeded.order.number.clone(),
        vec![FulfillmentLineInput::new(warehouse(), seeded.lines[0].id, 1)],
    )
    .approved(false);
    let batch = api.create_fulfillments(request, &FulfillmentPolicy::default()).await.unwrap();
    let outcome =
        api.approve_fulfillment(batch.fulfillments[0].id, &FulfillmentPolicy::default(), false).await.unwrap();
    api.update_tracking_number(outcome.fulfillment.id, "TRK-7").await.unwrap();

    drop(api);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(approved.count(), 1);
    assert_eq!(tracking.count(), 1);
    tear_down(db).await;
}
