//! Concurrent hold-creation scenarios against limited stock
//!
//! The admission property under test: for N concurrent hold creations
//! against base stock K, successes total exactly min(N, K) units — never
//! more, regardless of optimistic-retry exhaustion or the pessimistic
//! fallback kicking in.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use checkout_server::holds::ExpireOutcome;
use checkout_server::ServiceError;
use shared::error::ErrorCode;

const PRODUCT_SINGLE: i64 = 910_001;
const PRODUCT_OVERSELL: i64 = 910_002;
const PRODUCT_ROUNDTRIP: i64 = 910_003;
const PRODUCT_BOUNDARY: i64 = 910_004;

#[tokio::test]
#[ignore] // Requires Redis and Postgres running
async fn single_unit_contention() {
    let state = Arc::new(common::test_state().await);
    common::reset_product(&state, PRODUCT_SINGLE, 1).await;

    let mut handles = Vec::new();
    for _ in 0..100 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            state.holds.create(PRODUCT_SINGLE, 1).await
        }));
    }

    let mut created = Vec::new();
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(hold) => created.push(hold.hold_id),
            Err(ServiceError::App(app)) if app.code == ErrorCode::InsufficientStock => {
                insufficient += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(created.len(), 1, "exactly one hold admitted");
    assert_eq!(insufficient, 99);
    assert_eq!(created.iter().collect::<HashSet<_>>().len(), created.len());

    let snapshot = state.ledger.snapshot(PRODUCT_SINGLE).await.unwrap();
    assert_eq!(snapshot.available, 0);
    assert_eq!(snapshot.reserved, 1);
}

#[tokio::test]
#[ignore] // Requires Redis and Postgres running
async fn oversell_stress() {
    let state = Arc::new(common::test_state().await);
    common::reset_product(&state, PRODUCT_OVERSELL, 5).await;

    let mut handles = Vec::new();
    for _ in 0..50 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            state.holds.create(PRODUCT_OVERSELL, 1).await
        }));
    }

    let mut ok = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(ServiceError::App(app)) if app.code == ErrorCode::InsufficientStock => {
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(ok, 5);
    assert_eq!(rejected, 45);

    let snapshot = state.ledger.snapshot(PRODUCT_OVERSELL).await.unwrap();
    assert_eq!(snapshot.available, 0);
    assert_eq!(snapshot.reserved, 5);

    let live = state.holds.list_by_product(PRODUCT_OVERSELL).await.unwrap();
    assert_eq!(live.len(), 5);
    assert_eq!(live.iter().map(|h| h.qty).sum::<i64>(), 5);
}

#[tokio::test]
#[ignore] // Requires Redis and Postgres running
async fn create_then_release_restores_snapshot() {
    let state = common::test_state().await;
    common::reset_product(&state, PRODUCT_ROUNDTRIP, 10).await;

    let created = state.holds.create(PRODUCT_ROUNDTRIP, 4).await.unwrap();
    let reserved_snap = state.ledger.snapshot(PRODUCT_ROUNDTRIP).await.unwrap();
    assert_eq!(reserved_snap.available, 6);
    assert_eq!(reserved_snap.reserved, 4);

    let released = state.holds.release(&created.hold_id).await.unwrap();
    assert_eq!(released.quantity_released, 4);
    assert_eq!(released.available_stock, 10);
    assert_eq!(released.reserved_stock, 0);
    // Version keeps moving forward across the round trip
    assert!(released.version > reserved_snap.version);

    // Record is gone; a second release is a 404
    assert!(state.holds.get(&created.hold_id).await.unwrap().is_none());
    match state.holds.release(&created.hold_id).await {
        Err(ServiceError::App(app)) => assert_eq!(app.code, ErrorCode::HoldNotFound),
        other => panic!("expected HoldNotFound, got {other:?}"),
    }
}

#[tokio::test]
#[ignore] // Requires Redis and Postgres running
async fn expiry_boundary_is_inclusive() {
    let state = common::test_state().await;
    common::reset_product(&state, PRODUCT_BOUNDARY, 3).await;

    let created = state.holds.create(PRODUCT_BOUNDARY, 2).await.unwrap();
    let hold = state.holds.get(&created.hold_id).await.unwrap().unwrap();

    // One second before the deadline: premature
    match state
        .holds
        .expire(&created.hold_id, hold.expires_at_epoch - 1)
        .await
        .unwrap()
    {
        ExpireOutcome::NotExpired { seconds_remaining } => assert_eq!(seconds_remaining, 1),
        other => panic!("expected NotExpired, got {other:?}"),
    }

    // expires_at_epoch == now counts as expired
    match state
        .holds
        .expire(&created.hold_id, hold.expires_at_epoch)
        .await
        .unwrap()
    {
        ExpireOutcome::Expired(released) => {
            assert_eq!(released.quantity_released, 2);
            assert_eq!(released.available_stock, 3);
            assert_eq!(released.reserved_stock, 0);
        }
        other => panic!("expected Expired, got {other:?}"),
    }

    // Second expire: nothing left to release
    match state
        .holds
        .expire(&created.hold_id, hold.expires_at_epoch)
        .await
        .unwrap()
    {
        ExpireOutcome::AlreadyGone => {}
        other => panic!("expected AlreadyGone, got {other:?}"),
    }
}
