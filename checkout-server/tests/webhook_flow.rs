//! End-to-end webhook scenarios: idempotent replay, failure refund, state
//! conflict, and the post-reap 410.

mod common;

use std::time::Duration;

use checkout_server::{ExpiryReaper, ServiceError};
use shared::error::ErrorCode;
use shared::models::{OrderState, WebhookOutcome, WebhookRequest};

const PRODUCT_IDEMPOTENT: i64 = 920_001;
const PRODUCT_REFUND: i64 = 920_002;
const PRODUCT_CONFLICT: i64 = 920_003;
const PRODUCT_REAPED: i64 = 920_004;
const PRODUCT_LATE: i64 = 920_005;

fn webhook(key: &str, order_id: i64, status: &str) -> WebhookRequest {
    WebhookRequest {
        idempotency_key: key.to_string(),
        order_id,
        status: status.to_string(),
    }
}

#[tokio::test]
#[ignore] // Requires Redis and Postgres running
async fn success_webhook_is_idempotent() {
    let state = common::test_state().await;
    common::reset_product(&state, PRODUCT_IDEMPOTENT, 10).await;

    let hold = state.holds.create(PRODUCT_IDEMPOTENT, 2).await.unwrap();
    let order = state.orders.create_from_hold(&hold.hold_id).await.unwrap();
    assert_eq!(order.state, OrderState::PendingPayment);
    assert_eq!(order.quantity, 2);

    let key = format!("evt-{}", order.order_id);

    let first = state
        .webhooks
        .apply(&webhook(&key, order.order_id, "success"))
        .await
        .unwrap();
    assert_eq!(first.outcome, WebhookOutcome::Applied);
    assert_eq!(first.state, OrderState::Paid);

    for _ in 0..2 {
        let replay = state
            .webhooks
            .apply(&webhook(&key, order.order_id, "success"))
            .await
            .unwrap();
        // Replays land on the finalized short-circuit or the duplicate-key
        // path; either way the recorded state comes back unchanged
        assert_ne!(replay.outcome, WebhookOutcome::Applied);
        assert_eq!(replay.state, OrderState::Paid);
    }

    assert_eq!(common::idempotency_rows(&state, &key).await, 1);
    // Base stock decremented exactly once
    assert_eq!(common::durable_stock(&state, PRODUCT_IDEMPOTENT).await, 8);

    // Committed units left the counters entirely: available untouched by
    // the commit, reserved back to zero, hold gone
    let snapshot = state.ledger.snapshot(PRODUCT_IDEMPOTENT).await.unwrap();
    assert_eq!(snapshot.available, 8);
    assert_eq!(snapshot.reserved, 0);
    assert!(state.holds.get(&hold.hold_id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires Redis and Postgres running
async fn failure_webhook_refunds_reservation() {
    let state = common::test_state().await;
    common::reset_product(&state, PRODUCT_REFUND, 10).await;

    let hold = state.holds.create(PRODUCT_REFUND, 3).await.unwrap();
    let snapshot = state.ledger.snapshot(PRODUCT_REFUND).await.unwrap();
    assert_eq!(snapshot.available, 7);
    assert_eq!(snapshot.reserved, 3);

    let order = state.orders.create_from_hold(&hold.hold_id).await.unwrap();
    let response = state
        .webhooks
        .apply(&webhook("fail-1", order.order_id, "failure"))
        .await
        .unwrap();
    assert_eq!(response.outcome, WebhookOutcome::Applied);
    assert_eq!(response.state, OrderState::Cancelled);

    assert_eq!(common::order_state(&state, order.order_id).await, "cancelled");
    assert!(state.holds.get(&hold.hold_id).await.unwrap().is_none());

    let snapshot = state.ledger.snapshot(PRODUCT_REFUND).await.unwrap();
    assert_eq!(snapshot.available, 10);
    assert_eq!(snapshot.reserved, 0);
    // No commitment ever happened: durable stock untouched
    assert_eq!(common::durable_stock(&state, PRODUCT_REFUND).await, 10);
}

#[tokio::test]
#[ignore] // Requires Redis and Postgres running
async fn conflicting_webhook_after_finalization() {
    let state = common::test_state().await;
    common::reset_product(&state, PRODUCT_CONFLICT, 10).await;

    let hold = state.holds.create(PRODUCT_CONFLICT, 1).await.unwrap();
    let order = state.orders.create_from_hold(&hold.hold_id).await.unwrap();

    let paid = state
        .webhooks
        .apply(&webhook("conflict-a", order.order_id, "success"))
        .await
        .unwrap();
    assert_eq!(paid.state, OrderState::Paid);

    // Opposite outcome with a fresh key: no mutations, observed and recorded
    let conflicting = state
        .webhooks
        .apply(&webhook("conflict-b", order.order_id, "failure"))
        .await
        .unwrap();
    assert_eq!(conflicting.outcome, WebhookOutcome::AlreadyFinalized);
    assert_eq!(conflicting.state, OrderState::Paid);

    assert_eq!(common::idempotency_rows(&state, "conflict-a").await, 1);
    assert_eq!(common::idempotency_rows(&state, "conflict-b").await, 1);
    assert_eq!(common::durable_stock(&state, PRODUCT_CONFLICT).await, 9);
}

#[tokio::test]
#[ignore] // Requires Redis and Postgres running
async fn late_success_webhook_beats_reaper() {
    // The hold ages out after order creation, but the reaper has not run:
    // the success webhook still finds it active and commits
    let state = common::test_state_with_ttl(2).await;
    common::reset_product(&state, PRODUCT_LATE, 5).await;

    let hold = state.holds.create(PRODUCT_LATE, 2).await.unwrap();
    let order = state.orders.create_from_hold(&hold.hold_id).await.unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;

    let response = state
        .webhooks
        .apply(&webhook("late-win", order.order_id, "success"))
        .await
        .unwrap();
    assert_eq!(response.outcome, WebhookOutcome::Applied);
    assert_eq!(response.state, OrderState::Paid);

    assert_eq!(common::durable_stock(&state, PRODUCT_LATE).await, 3);
    let snapshot = state.ledger.snapshot(PRODUCT_LATE).await.unwrap();
    assert_eq!(snapshot.available, 3);
    assert_eq!(snapshot.reserved, 0);
    assert!(state.holds.get(&hold.hold_id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires Redis and Postgres running
async fn success_webhook_after_reap_returns_gone() {
    // Short TTL so the hold ages out between order creation and webhook
    let state = common::test_state_with_ttl(2).await;
    common::reset_product(&state, PRODUCT_REAPED, 5).await;

    let hold = state.holds.create(PRODUCT_REAPED, 2).await.unwrap();
    let order = state.orders.create_from_hold(&hold.hold_id).await.unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;

    let reaper = ExpiryReaper::new(
        state.fast.clone(),
        state.holds.clone(),
        state.ledger.clone(),
        &state.config,
    );
    let report = reaper.run_once().await.unwrap();
    assert!(report.expired >= 1);

    // Reaper refunded the reservation
    let snapshot = state.ledger.snapshot(PRODUCT_REAPED).await.unwrap();
    assert_eq!(snapshot.available, 5);
    assert_eq!(snapshot.reserved, 0);

    // The late success webhook observes the vanished hold: 410, cancelled
    match state
        .webhooks
        .apply(&webhook("late-1", order.order_id, "success"))
        .await
    {
        Err(ServiceError::App(app)) => assert_eq!(app.code, ErrorCode::HoldExpired),
        other => panic!("expected HoldExpired, got {other:?}"),
    }
    assert_eq!(common::order_state(&state, order.order_id).await, "cancelled");
    // Durable stock never decremented
    assert_eq!(common::durable_stock(&state, PRODUCT_REAPED).await, 5);
}

#[tokio::test]
#[ignore] // Requires Redis and Postgres running
async fn unknown_order_and_bad_status() {
    let state = common::test_state().await;

    match state
        .webhooks
        .apply(&webhook("missing-1", 999_999_999, "success"))
        .await
    {
        Err(ServiceError::App(app)) => assert_eq!(app.code, ErrorCode::OrderNotFound),
        other => panic!("expected OrderNotFound, got {other:?}"),
    }

    match state
        .webhooks
        .apply(&webhook("bad-status", 1, "settled"))
        .await
    {
        Err(ServiceError::App(app)) => assert_eq!(app.code, ErrorCode::WebhookInvalidStatus),
        other => panic!("expected WebhookInvalidStatus, got {other:?}"),
    }
}
