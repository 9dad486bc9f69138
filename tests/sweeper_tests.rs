mod common;

use chrono::Duration;
use common::Harness;
use slotkeeper::domain::membership::{Credits, MembershipStatus};
use slotkeeper::error::BookingError;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::test]
async fn test_sweep_expires_only_lapsed_memberships() {
    let harness = Harness::in_memory();
    let lapsing = harness
        .add_membership(1, Credits::Metered(4), Duration::hours(1))
        .await;
    let unlimited = harness
        .add_membership(2, Credits::Unlimited, Duration::hours(1))
        .await;
    let current = harness
        .add_membership(3, Credits::Unlimited, Duration::days(30))
        .await;

    assert_eq!(harness.sweeper.run_once().await.unwrap(), 0);

    harness.clock.advance(Duration::hours(2));
    assert_eq!(harness.sweeper.run_once().await.unwrap(), 2);

    let lapsing = harness.membership(lapsing).await;
    assert_eq!(lapsing.status, MembershipStatus::Expired);
    // Expiry does not touch the balance.
    assert_eq!(lapsing.credits, Credits::Metered(4));
    assert_eq!(
        harness.membership(unlimited).await.status,
        MembershipStatus::Expired
    );
    assert_eq!(
        harness.membership(current).await.status,
        MembershipStatus::Active
    );
}

#[tokio::test]
async fn test_sweep_is_idempotent() {
    let harness = Harness::in_memory();
    harness
        .add_membership(1, Credits::Unlimited, Duration::minutes(10))
        .await;
    harness.clock.advance(Duration::hours(1));

    assert_eq!(harness.sweeper.run_once().await.unwrap(), 1);
    assert_eq!(harness.sweeper.run_once().await.unwrap(), 0);
    assert_eq!(harness.sweeper.run_once().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overlapping_sweep_is_refused() {
    let harness = Arc::new(Harness::in_memory());
    let membership = harness
        .add_membership(1, Credits::Unlimited, Duration::minutes(10))
        .await;
    harness.clock.advance(Duration::hours(1));

    // Hold the membership row so the first sweep waits on it.
    let mut holder = harness.store.begin().await.unwrap();
    holder.lock_membership(membership).await.unwrap();

    let first = {
        let harness = harness.clone();
        tokio::spawn(async move { harness.sweeper.run_once().await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert!(matches!(
        harness.sweeper.run_once().await,
        Err(BookingError::Busy)
    ));

    holder.rollback().await;
    assert_eq!(first.await.unwrap().unwrap(), 1);
    // The flag is cleared once the sweep is over.
    assert_eq!(harness.sweeper.run_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_sweep_skips_memberships_changed_meanwhile() {
    let harness = Harness::in_memory();
    let membership = harness
        .add_membership(1, Credits::Metered(1), Duration::minutes(10))
        .await;
    harness.clock.advance(Duration::hours(1));

    let mut uow = harness.store.begin().await.unwrap();
    let mut row = uow.lock_membership(membership).await.unwrap().unwrap();
    row.expire();
    uow.update_membership(row).await.unwrap();
    uow.commit().await.unwrap();

    assert_eq!(harness.sweeper.run_once().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_loop_sweeps_until_cancelled() {
    let harness = Arc::new(Harness::in_memory());
    let membership = harness
        .add_membership(1, Credits::Unlimited, Duration::minutes(10))
        .await;
    harness.clock.advance(Duration::hours(1));

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let sweeper = harness.sweeper.clone();
    let background = tokio::spawn(async move { sweeper.run(cancel_rx).await });

    let mut expired = false;
    for _ in 0..100 {
        if harness.membership(membership).await.status == MembershipStatus::Expired {
            expired = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(expired, "background sweep never ran");

    cancel_tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(2), background)
        .await
        .expect("sweeper did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_background_loop_stops_when_sender_is_dropped() {
    let harness = Harness::in_memory();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    drop(cancel_tx);
    tokio::time::timeout(
        std::time::Duration::from_secs(2),
        harness.sweeper.run(cancel_rx),
    )
    .await
    .expect("sweeper did not stop");
}
