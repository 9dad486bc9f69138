#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use mockable::Clock;
use rust_decimal_macros::dec;
use slotkeeper::application::membership::MembershipService;
use slotkeeper::application::notifier::Notifier;
use slotkeeper::application::reservation::ReservationService;
use slotkeeper::application::sweeper::ExpirySweeper;
use slotkeeper::domain::booking::Booking;
use slotkeeper::domain::class::NewClass;
use slotkeeper::domain::ids::{BookingId, ClassId, MembershipId, PaymentId, UserId};
use slotkeeper::domain::membership::{Credits, Membership, NewMembership, Package};
use slotkeeper::domain::notification::Notification;
use slotkeeper::domain::payment::{NewPayment, PaymentStatus};
use slotkeeper::domain::ports::{LedgerStore, LedgerStoreRef, NotificationSink};
use slotkeeper::error::Result;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};

pub const LOCK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
pub const OPERATION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// A clock tests can move by hand.
pub struct MutableClock {
    now: Mutex<DateTime<Utc>>,
}

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn start_of_term() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 6, 7, 0, 0).unwrap()
}

/// Keeps every notification it is handed.
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().unwrap().clone()
    }

    /// Waits for spawned deliveries to land.
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        for _ in 0..100 {
            let delivered = self.delivered();
            if delivered.len() >= count {
                return delivered;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.delivered()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.delivered.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Services wired over one store, with a hand-driven clock.
pub struct Harness {
    pub store: LedgerStoreRef,
    pub clock: Arc<MutableClock>,
    pub sink: Arc<RecordingSink>,
    pub reservations: ReservationService,
    pub memberships: MembershipService,
    pub sweeper: Arc<ExpirySweeper>,
}

impl Harness {
    pub fn in_memory() -> Self {
        Self::over(Arc::new(
            slotkeeper::infrastructure::in_memory::InMemoryLedger::in_memory(LOCK_TIMEOUT),
        ))
    }

    pub fn over(store: LedgerStoreRef) -> Self {
        let clock = Arc::new(MutableClock::new(start_of_term()));
        let sink = Arc::new(RecordingSink::default());
        let notifier = Notifier::new(sink.clone());
        Self {
            reservations: ReservationService::new(
                store.clone(),
                notifier.clone(),
                clock.clone(),
                OPERATION_TIMEOUT,
            ),
            memberships: MembershipService::new(
                store.clone(),
                notifier,
                clock.clone(),
                OPERATION_TIMEOUT,
            ),
            sweeper: Arc::new(ExpirySweeper::new(
                store.clone(),
                clock.clone(),
                std::time::Duration::from_millis(10),
                std::time::Duration::ZERO,
            )),
            store,
            clock,
            sink,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    pub async fn add_class(&self, name: &str, capacity: u32) -> ClassId {
        let mut uow = self.store.begin().await.unwrap();
        let class = uow
            .insert_class(NewClass {
                name: name.to_string(),
                capacity: NonZeroU32::new(capacity).unwrap(),
                schedule: "Mon 18:00".to_string(),
            })
            .await
            .unwrap();
        uow.commit().await.unwrap();
        class.id
    }

    pub async fn add_payment(&self, user: u64, status: PaymentStatus) -> PaymentId {
        let mut uow = self.store.begin().await.unwrap();
        let payment = uow
            .insert_payment(NewPayment {
                user: UserId(user),
                status,
                amount: dec!(25.00),
                currency: "AUD".to_string(),
            })
            .await
            .unwrap();
        uow.commit().await.unwrap();
        payment.id
    }

    /// A membership that started a week ago and ends `ends_in` from now.
    pub async fn add_membership(
        &self,
        user: u64,
        credits: Credits,
        ends_in: Duration,
    ) -> MembershipId {
        let mut uow = self.store.begin().await.unwrap();
        let now = self.now();
        let membership = uow
            .insert_membership(NewMembership {
                user: UserId(user),
                package: Package::Custom,
                credits,
                start: now - Duration::days(7),
                end: now + ends_in,
                payment: None,
            })
            .await
            .unwrap();
        uow.commit().await.unwrap();
        membership.id
    }

    pub async fn membership(&self, id: MembershipId) -> Membership {
        let mut uow = self.store.begin().await.unwrap();
        uow.membership(id).await.unwrap().unwrap()
    }

    pub async fn booking(&self, id: BookingId) -> Booking {
        let mut uow = self.store.begin().await.unwrap();
        uow.booking(id).await.unwrap().unwrap()
    }

    pub async fn occupied(&self, class: ClassId) -> u32 {
        let mut uow = self.store.begin().await.unwrap();
        uow.occupied_seats(class).await.unwrap()
    }
}
