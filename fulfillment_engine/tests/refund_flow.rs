use fulfillment_engine::{
    db_types::{FulfillmentStatusType, NewTransaction, OrderEventType, OrderOrigin, OrderStatusType},
    events::EventProducers,
    gateway::{RefundAllocation, RefundTarget},
    order_objects::{FulfillmentPolicy, FulfillmentRequest},
    refund_objects::{RefundProductsRequest, ReturnRequest},
    traits::{FulfillmentLineInput, ReturnItemInput, TransactionOwner},
    FulfillmentApi,
    FulfillmentDatabase,
    FulfillmentError,
    OrderManagement,
    RefundApi,
    RefundError,
    SqliteDatabase,
    TransactionDatabase,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use wfe_common::Money;

use crate::support::{
    fixtures::{seed_order, warehouse, LineSpec, SeededOrder, CURRENCY},
    gateway::RecordingGateway,
    prepare_env::{prepare_test_env, random_db_path},
};

mod support;

struct TestRig {
    db: SqliteDatabase,
    fulfillments: FulfillmentApi<SqliteDatabase>,
    refunds: RefundApi<SqliteDatabase, RecordingGateway>,
    gateway: RecordingGateway,
}

async fn setup_with_gateway(gateway: RecordingGateway) -> TestRig {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    TestRig {
        db: db.clone(),
        fulfillments: FulfillmentApi::new(db.clone(), EventProducers::default()),
        refunds: RefundApi::new(db, gateway.clone(), EventProducers::default()),
        gateway,
    }
}

async fn setup() -> TestRig {
    setup_with_gateway(RecordingGateway::default()).await
}

async fn tear_down(mut rig: TestRig) {
    let url = rig.db.url().to_string();
    if let Err(e) = rig.db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

/// Fulfills every line of the seeded order in one approved batch.
async fn fulfill_all(rig: &TestRig, seeded: &SeededOrder) -> i64 {
    let lines = seeded
        .lines
        .iter()
        .map(|line| FulfillmentLineInput::new(warehouse(), line.id, line.quantity))
        .collect();
    let request = FulfillmentRequest::new(seeded.order.number.clone(), lines).approved(true);
    let batch = rig
        .fulfillments
        .create_fulfillments(request, &FulfillmentPolicy::default())
        .await
        .expect("Error fulfilling seeded order");
    assert!(batch.rejected.is_empty());
    batch.fulfillments[0].id
}

#[tokio::test]
async fn returning_with_refund_pays_out_goods_plus_shipping() {
    let rig = setup().await;
    let seeded = seed_order(&rig.db, 500, &[LineSpec::new(3, 1_000)]).await;
    let fulfillment_id = fulfill_all(&rig, &seeded).await;
    let flines = rig.db.fetch_fulfillment_lines(fulfillment_id).await.unwrap();

    let request = ReturnRequest::new(
        seeded.order.number.clone(),
        RefundTarget::Single("pay-1".to_string()),
        vec![ReturnItemInput::fulfillment_line(flines[0].id, 2)],
    )
    .with_refund()
    .with_shipping_costs();
    let result = rig.refunds.return_and_replace(request).await.unwrap();

    let return_fulfillment = result.return_fulfillment.expect("return fulfillment missing");
    assert_eq!(return_fulfillment.status, FulfillmentStatusType::RefundedAndReturned);
    assert_eq!(return_fulfillment.total_refund_amount, Some(Money::from(2_500)));
    assert_eq!(return_fulfillment.shipping_refund_amount, Some(Money::from(500)));
    assert_eq!(result.refunded_amount, Some(Money::from(2_500)));
    assert_eq!(result.order.status, OrderStatusType::PartiallyReturned);

    let calls = rig.gateway.refund_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], (RefundTarget::Single("pay-1".to_string()), Money::from(2_500)));

    // Two units split off the shipped line.
    let source = rig.db.fetch_fulfillment_lines(fulfillment_id).await.unwrap();
    assert_eq!(source[0].quantity, 1);
    let events = rig.db.fetch_order_events(seeded.order.id).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == OrderEventType::FulfillmentReturned));
    assert!(events.iter().any(|e| e.event_type == OrderEventType::PaymentRefunded));
    tear_down(rig).await;
}

#[tokio::test]
async fn replacing_spawns_a_single_draft_reissue_order() {
    let rig = setup().await;
    let seeded = seed_order(&rig.db, 0, &[LineSpec::new(2, 1_500)]).await;
    let fulfillment_id = fulfill_all(&rig, &seeded).await;
    let flines = rig.db.fetch_fulfillment_lines(fulfillment_id).await.unwrap();

    let request = ReturnRequest::new(
        seeded.order.number.clone(),
        RefundTarget::Single("pay-1".to_string()),
        vec![ReturnItemInput::fulfillment_line(flines[0].id, 1).replaced()],
    );
    let result = rig.refunds.return_and_replace(request).await.unwrap();

    let replacement = result.replacement_order.expect("replacement order missing");
    assert_eq!(replacement.status, OrderStatusType::Draft);
    assert_eq!(replacement.origin, OrderOrigin::Reissue);
    assert_eq!(replacement.original_order_id, Some(seeded.order.id));
    assert_eq!(replacement.currency, CURRENCY);
    let replacement_lines = rig.db.fetch_order_lines(replacement.id).await.unwrap();
    assert_eq!(replacement_lines.len(), 1);
    assert_eq!(replacement_lines[0].quantity, 1);
    assert_eq!(replacement_lines[0].quantity_fulfilled, 0);
    assert_eq!(replacement_lines[0].unit_price_gross, seeded.lines[0].unit_price_gross);
    assert_eq!(replacement_lines[0].variant_id, seeded.lines[0].variant_id);
    assert_eq!(replacement_lines[0].sku, seeded.lines[0].sku);

    let replace_fulfillment = result.replace_fulfillment.expect("replace fulfillment missing");
    assert_eq!(replace_fulfillment.status, FulfillmentStatusType::Replaced);
    // Replaced quantity still counts to the fulfilled tier, so the order stays fulfilled.
    assert_eq!(result.order.status, OrderStatusType::Fulfilled);
    // Replacements are never billed.
    assert!(rig.gateway.refund_calls().is_empty());
    assert!(result.refunded_amount.is_none());
    tear_down(rig).await;
}

#[tokio::test]
async fn returning_unfulfilled_quantity_consumes_the_pool_and_releases_reservations() {
    let rig = setup().await;
    let seeded = seed_order(&rig.db, 0, &[LineSpec::new(5, 1_000)]).await;
    let line = &seeded.lines[0];
    let request = FulfillmentRequest::new(
        seeded.order.number.clone(),
        vec![FulfillmentLineInput::new(warehouse(), line.id, 2)],
    )
    .approved(true);
    rig.fulfillments.create_fulfillments(request, &FulfillmentPolicy::default()).await.unwrap();

    let request = ReturnRequest::new(
        seeded.order.number.clone(),
        RefundTarget::Single("pay-1".to_string()),
        vec![ReturnItemInput::order_line(line.id, 2)],
    );
    let result = rig.refunds.return_and_replace(request).await.unwrap();

    let updated = rig.db.fetch_order_lines(seeded.order.id).await.unwrap();
    assert_eq!(updated[0].quantity_fulfilled, 4);
    assert_eq!(updated[0].quantity_unfulfilled(), 1);
    let reserved: i64 = rig
        .db
        .fetch_allocations_for_line(line.id)
        .await
        .unwrap()
        .iter()
        .map(|a| a.quantity_allocated)
        .sum();
    assert_eq!(reserved, 1);
    assert_eq!(result.order.status, OrderStatusType::PartiallyReturned);
    assert_eq!(result.touched, vec![(line.id, 2)]);

    // Only one unit remains unfulfilled; two is too many now.
    let request = ReturnRequest::new(
        seeded.order.number.clone(),
        RefundTarget::Single("pay-1".to_string()),
        vec![ReturnItemInput::order_line(line.id, 2)],
    );
    let err = rig.refunds.return_and_replace(request).await.unwrap_err();
    assert!(
        matches!(err, RefundError::FulfillmentError(FulfillmentError::InvalidQuantity { .. })),
        "unexpected error: {err}"
    );
    tear_down(rig).await;
}

#[tokio::test]
async fn later_returns_merge_into_the_existing_return_fulfillment() {
    let rig = setup().await;
    let seeded = seed_order(&rig.db, 0, &[LineSpec::new(4, 1_000)]).await;
    let fulfillment_id = fulfill_all(&rig, &seeded).await;
    let flines = rig.db.fetch_fulfillment_lines(fulfillment_id).await.unwrap();

    let first = ReturnRequest::new(
        seeded.order.number.clone(),
        RefundTarget::Single("pay-1".to_string()),
        vec![ReturnItemInput::fulfillment_line(flines[0].id, 1)],
    );
    let first_result = rig.refunds.return_and_replace(first).await.unwrap();
    let second = ReturnRequest::new(
        seeded.order.number.clone(),
        RefundTarget::Single("pay-1".to_string()),
        vec![ReturnItemInput::fulfillment_line(flines[0].id, 1)],
    );
    let second_result = rig.refunds.return_and_replace(second).await.unwrap();

    let first_id = first_result.return_fulfillment.unwrap().id;
    assert_eq!(second_result.return_fulfillment.unwrap().id, first_id);
    let return_lines = rig.db.fetch_fulfillment_lines(first_id).await.unwrap();
    assert_eq!(return_lines.len(), 1);
    assert_eq!(return_lines[0].quantity, 2);
    tear_down(rig).await;
}

#[tokio::test]
async fn gift_card_lines_cannot_be_returned() {
    let rig = setup().await;
    let seeded = seed_order(&rig.db, 0, &[LineSpec::new(1, 5_000).gift_card()]).await;
    let request = ReturnRequest::new(
        seeded.order.number.clone(),
        RefundTarget::Single("pay-1".to_string()),
        vec![ReturnItemInput::order_line(seeded.lines[0].id, 1)],
    );
    let err = rig.refunds.return_and_replace(request).await.unwrap_err();
    assert!(
        matches!(err, RefundError::FulfillmentError(FulfillmentError::GiftCardLine(_))),
        "unexpected error: {err}"
    );
    tear_down(rig).await;
}

#[tokio::test]
async fn explicit_amounts_are_ambiguous_with_multiple_payments() {
    let rig = setup().await;
    let seeded = seed_order(&rig.db, 0, &[LineSpec::new(2, 1_000)]).await;
    for name in ["card", "wallet"] {
        rig.db
            .create_transaction(
                TransactionOwner::Order(seeded.order.id),
                NewTransaction::new(name, CURRENCY).charged(Money::from(1_000)),
            )
            .await
            .unwrap();
    }
    let request = ReturnRequest::new(
        seeded.order.number.clone(),
        RefundTarget::Single("card".to_string()),
        vec![ReturnItemInput::order_line(seeded.lines[0].id, 1)],
    )
    .with_refund()
    .with_amount(Money::from(500));
    let err = rig.refunds.return_and_replace(request).await.unwrap_err();
    assert!(matches!(err, RefundError::OrderHasMultiplePayments), "unexpected error: {err}");
    tear_down(rig).await;
}

#[tokio::test]
async fn gateway_failures_abort_the_refund_but_keep_the_return() {
    let rig = setup_with_gateway(RecordingGateway::refusing()).await;
    let seeded = seed_order(&rig.db, 0, &[LineSpec::new(3, 1_000)]).await;
    let fulfillment_id = fulfill_all(&rig, &seeded).await;
    let flines = rig.db.fetch_fulfillment_lines(fulfillment_id).await.unwrap();

    let request = ReturnRequest::new(
        seeded.order.number.clone(),
        RefundTarget::Single("pay-1".to_string()),
        vec![ReturnItemInput::fulfillment_line(flines[0].id, 2)],
    )
    .with_refund();
    let err = rig.refunds.return_and_replace(request).await.unwrap_err();
    assert!(matches!(err, RefundError::CannotRefund(_)), "unexpected error: {err}");

    // The quantity split stands; only the money movement failed.
    let source = rig.db.fetch_fulfillment_lines(fulfillment_id).await.unwrap();
    assert_eq!(source[0].quantity, 1);
    let events = rig.db.fetch_order_events(seeded.order.id).await.unwrap();
    let failures: Vec<_> =
        events.iter().filter(|e| e.event_type == OrderEventType::PaymentRefundFailed).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].params_json()["amount"], 2_000);
    // No refund amounts were recorded on the return fulfillment.
    let returns = rig.db.fetch_fulfillments(seeded.order.id).await.unwrap();
    let return_fulfillment =
        returns.iter().find(|f| f.status == FulfillmentStatusType::RefundedAndReturned).unwrap();
    assert!(return_fulfillment.total_refund_amount.is_none());
    tear_down(rig).await;
}

#[tokio::test]
async fn zero_allocations_are_dropped_before_the_gateway_sees_them() {
    let rig = setup().await;
    let seeded = seed_order(&rig.db, 0, &[LineSpec::new(2, 1_000)]).await;
    let fulfillment_id = fulfill_all(&rig, &seeded).await;
    let flines = rig.db.fetch_fulfillment_lines(fulfillment_id).await.unwrap();

    let target = RefundTarget::Allocations(vec![
        RefundAllocation { reference: "card".to_string(), amount: Money::from(1_500) },
        RefundAllocation { reference: "wallet".to_string(), amount: Money::ZERO },
        RefundAllocation { reference: "credit".to_string(), amount: Money::from(500) },
    ]);
    let request = ReturnRequest::new(
        seeded.order.number.clone(),
        target,
        vec![ReturnItemInput::fulfillment_line(flines[0].id, 2)],
    )
    .with_refund();
    rig.refunds.return_and_replace(request).await.unwrap();

    let calls = rig.gateway.refund_calls();
    assert_eq!(calls.len(), 1);
    match &calls[0].0 {
        RefundTarget::Allocations(allocations) => {
            let refs: Vec<_> = allocations.iter().map(|a| a.reference.as_str()).collect();
            assert_eq!(refs, vec!["card", "credit"]);
        },
        other => panic!("unexpected target: {other:?}"),
    }
    tear_down(rig).await;
}

#[tokio::test]
async fn replace_only_requests_with_refund_do_not_call_the_gateway() {
    let rig = setup().await;
    let seeded = seed_order(&rig.db, 0, &[LineSpec::new(1, 1_000)]).await;
    let fulfillment_id = fulfill_all(&rig, &seeded).await;
    let flines = rig.db.fetch_fulfillment_lines(fulfillment_id).await.unwrap();

    let request = ReturnRequest::new(
        seeded.order.number.clone(),
        RefundTarget::Single("pay-1".to_string()),
        vec![ReturnItemInput::fulfillment_line(flines[0].id, 1).replaced()],
    )
    .with_refund();
    let result = rig.refunds.return_and_replace(request).await.unwrap();
    assert!(rig.gateway.refund_calls().is_empty());
    assert!(result.refunded_amount.is_none());
    assert!(result.replacement_order.is_some());
    tear_down(rig).await;
}

#[tokio::test]
async fn refunding_kept_goods_moves_them_into_a_refunded_fulfillment() {
    let rig = setup().await;
    let seeded = seed_order(&rig.db, 0, &[LineSpec::new(2, 1_000)]).await;
    let fulfillment_id = fulfill_all(&rig, &seeded).await;
    let flines = rig.db.fetch_fulfillment_lines(fulfillment_id).await.unwrap();

    let request = RefundProductsRequest::new(
        seeded.order.number.clone(),
        RefundTarget::Single("pay-1".to_string()),
        vec![ReturnItemInput::fulfillment_line(flines[0].id, 1)],
    );
    let result = rig.refunds.refund_products(request).await.unwrap();

    let refunded = result.return_fulfillment.expect("refunded fulfillment missing");
    assert_eq!(refunded.status, FulfillmentStatusType::Refunded);
    assert_eq!(refunded.total_refund_amount, Some(Money::from(1_000)));
    assert_eq!(result.refunded_amount, Some(Money::from(1_000)));
    assert_eq!(rig.gateway.refund_calls().len(), 1);
    // The customer keeps the goods, so the quantity counts in neither status bucket.
    assert_eq!(result.order.status, OrderStatusType::PartiallyFulfilled);
    let source = rig.db.fetch_fulfillment_lines(fulfillment_id).await.unwrap();
    assert_eq!(source[0].quantity, 1);
    let events = rig.db.fetch_order_events(seeded.order.id).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == OrderEventType::FulfillmentRefunded));
    tear_down(rig).await;
}

#[tokio::test]
async fn everything_returned_marks_the_order_returned() {
    let rig = setup().await;
    let seeded = seed_order(&rig.db, 0, &[LineSpec::new(2, 1_000)]).await;
    let fulfillment_id = fulfill_all(&rig, &seeded).await;
    let flines = rig.db.fetch_fulfillment_lines(fulfillment_id).await.unwrap();

    let request = ReturnRequest::new(
        seeded.order.number.clone(),
        RefundTarget::Single("pay-1".to_string()),
        vec![ReturnItemInput::fulfillment_line(flines[0].id, 2)],
    );
    let result = rig.refunds.return_and_replace(request).await.unwrap();
    assert_eq!(result.order.status, OrderStatusType::Returned);
    assert_eq!(
        result.return_fulfillment.unwrap().status,
        FulfillmentStatusType::Returned,
    );
    tear_down(rig).await;
}
