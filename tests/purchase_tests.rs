mod common;

use chrono::{Duration, Months};
use common::Harness;
use rust_decimal_macros::dec;
use slotkeeper::domain::booking::Consumption;
use slotkeeper::domain::ids::UserId;
use slotkeeper::domain::membership::{Credits, MembershipStatus, Package};
use slotkeeper::domain::notification::Template;
use slotkeeper::domain::payment::PaymentStatus;
use slotkeeper::error::BookingError;

#[tokio::test]
async fn test_monthly_purchase_grants_unlimited_month() {
    let harness = Harness::in_memory();
    let payment = harness.add_payment(3, PaymentStatus::Success).await;

    let membership = harness
        .memberships
        .purchase(UserId(3), Package::Monthly, payment)
        .await
        .unwrap();

    assert_eq!(membership.user, UserId(3));
    assert_eq!(membership.credits, Credits::Unlimited);
    assert_eq!(membership.status, MembershipStatus::Active);
    assert_eq!(membership.start, harness.now());
    assert_eq!(
        membership.end,
        harness.now().checked_add_months(Months::new(1)).unwrap()
    );
    assert_eq!(membership.payment, Some(payment));

    let class = harness.add_class("Yoga", 5).await;
    let booking = harness
        .reservations
        .create_booking(UserId(3), class, None)
        .await
        .unwrap();
    assert_eq!(booking.consumption, Consumption::Membership(membership.id));
}

#[tokio::test]
async fn test_drop_in_buys_a_single_class() {
    let harness = Harness::in_memory();
    let payment = harness.add_payment(3, PaymentStatus::Success).await;
    let membership = harness
        .memberships
        .purchase(UserId(3), Package::DropIn, payment)
        .await
        .unwrap();
    assert_eq!(membership.credits, Credits::Metered(1));
    assert_eq!(membership.end, harness.now() + Duration::days(1));

    let first = harness.add_class("Yoga", 5).await;
    let second = harness.add_class("Spin", 5).await;
    harness
        .reservations
        .create_booking(UserId(3), first, None)
        .await
        .unwrap();
    let result = harness
        .reservations
        .create_booking(UserId(3), second, None)
        .await;
    assert!(matches!(result, Err(BookingError::NoEntitlement)));
}

#[tokio::test]
async fn test_payment_backs_at_most_one_membership_or_booking() {
    let harness = Harness::in_memory();
    let payment = harness.add_payment(3, PaymentStatus::Success).await;
    harness
        .memberships
        .purchase(UserId(3), Package::Quarterly, payment)
        .await
        .unwrap();

    let again = harness
        .memberships
        .purchase(UserId(3), Package::Monthly, payment)
        .await;
    assert!(matches!(again, Err(BookingError::PaymentAlreadyConsumed(_))));

    // A payment already spent on a booking cannot buy a membership either.
    let other = harness.add_payment(4, PaymentStatus::Success).await;
    let class = harness.add_class("Yoga", 5).await;
    harness
        .reservations
        .create_booking(UserId(4), class, Some(other))
        .await
        .unwrap();
    let result = harness
        .memberships
        .purchase(UserId(4), Package::Monthly, other)
        .await;
    assert!(matches!(result, Err(BookingError::PaymentAlreadyConsumed(_))));
}

#[tokio::test]
async fn test_purchase_rejections() {
    let harness = Harness::in_memory();
    let theirs = harness.add_payment(8, PaymentStatus::Success).await;
    let failed = harness.add_payment(3, PaymentStatus::Failed).await;
    let good = harness.add_payment(3, PaymentStatus::Success).await;

    let result = harness
        .memberships
        .purchase(UserId(3), Package::Monthly, theirs)
        .await;
    assert!(matches!(result, Err(BookingError::PaymentOwnershipMismatch(_))));

    let result = harness
        .memberships
        .purchase(UserId(3), Package::Monthly, failed)
        .await;
    assert!(matches!(result, Err(BookingError::PaymentNotSuccessful(_))));

    let result = harness
        .memberships
        .purchase(UserId(3), Package::Custom, good)
        .await;
    assert!(matches!(result, Err(BookingError::InvalidInput(_))));

    assert!(harness
        .memberships
        .memberships_for_user(UserId(3))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_memberships_listed_newest_first_with_receipts() {
    let harness = Harness::in_memory();
    let first = harness.add_payment(3, PaymentStatus::Success).await;
    let second = harness.add_payment(3, PaymentStatus::Success).await;

    let older = harness
        .memberships
        .purchase(UserId(3), Package::DropIn, first)
        .await
        .unwrap();
    harness.clock.advance(Duration::days(2));
    let newer = harness
        .memberships
        .purchase(UserId(3), Package::Monthly, second)
        .await
        .unwrap();

    let listed: Vec<_> = harness
        .memberships
        .memberships_for_user(UserId(3))
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(listed, vec![newer.id, older.id]);

    let delivered = harness.sink.wait_for(2).await;
    assert_eq!(delivered.len(), 2);
    assert!(delivered.iter().all(|n| matches!(
        &n.template,
        Template::PaymentReceipt { amount, .. } if *amount == dec!(25.00)
    )));
}
