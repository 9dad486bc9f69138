use super::ids::{BookingId, ClassId, MembershipId, PaymentId, UserId};
use crate::error::{BookingError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    /// Attendance recorded. Terminal, and still holds the seat.
    Completed,
}

/// The entitlement debited to authorize a booking.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Consumption {
    Membership(MembershipId),
    Payment(PaymentId),
}

impl Consumption {
    pub fn payment(&self) -> Option<PaymentId> {
        match self {
            Self::Payment(id) => Some(*id),
            Self::Membership(_) => None,
        }
    }
}

/// A reservation of one seat in a class. Bookings are never deleted;
/// cancellation only changes the status.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Booking {
    pub id: BookingId,
    pub user: UserId,
    pub class: ClassId,
    pub status: BookingStatus,
    pub consumption: Consumption,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NewBooking {
    pub user: UserId,
    pub class: ClassId,
    pub consumption: Consumption,
}

impl NewBooking {
    pub fn into_booking(self, id: BookingId, now: DateTime<Utc>) -> Booking {
        Booking {
            id,
            user: self.user,
            class: self.class,
            status: BookingStatus::Confirmed,
            consumption: self.consumption,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Booking {
    /// Whether the booking holds a seat in its class.
    pub fn occupies_seat(&self) -> bool {
        matches!(
            self.status,
            BookingStatus::Confirmed | BookingStatus::Completed
        )
    }

    fn ensure_confirmed(&self) -> Result<()> {
        match self.status {
            BookingStatus::Confirmed => Ok(()),
            BookingStatus::Cancelled => Err(BookingError::AlreadyCancelled(self.id.0)),
            BookingStatus::Completed => Err(BookingError::Immutable(self.id.0)),
        }
    }

    pub fn cancel(&mut self, reason: Option<String>, now: DateTime<Utc>) -> Result<()> {
        self.ensure_confirmed()?;
        self.status = BookingStatus::Cancelled;
        self.cancellation_reason = reason;
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_confirmed()?;
        self.status = BookingStatus::Completed;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn booking() -> Booking {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        NewBooking {
            user: UserId(1),
            class: ClassId(2),
            consumption: Consumption::Membership(MembershipId(3)),
        }
        .into_booking(BookingId(10), now)
    }

    #[test]
    fn test_cancel_records_reason() {
        let mut b = booking();
        let later = b.created_at + chrono::Duration::hours(1);
        b.cancel(Some("sick".to_string()), later).unwrap();
        assert_eq!(b.status, BookingStatus::Cancelled);
        assert_eq!(b.cancellation_reason.as_deref(), Some("sick"));
        assert_eq!(b.updated_at, later);
        assert!(!b.occupies_seat());
    }

    #[test]
    fn test_cancel_twice_fails() {
        let mut b = booking();
        let now = b.created_at;
        b.cancel(None, now).unwrap();
        assert!(matches!(
            b.cancel(None, now),
            Err(BookingError::AlreadyCancelled(10))
        ));
    }

    #[test]
    fn test_completed_booking_is_immutable() {
        let mut b = booking();
        let now = b.created_at;
        b.complete(now).unwrap();
        assert!(b.occupies_seat());
        assert!(matches!(b.cancel(None, now), Err(BookingError::Immutable(10))));
        assert!(matches!(b.complete(now), Err(BookingError::Immutable(10))));
    }

    #[test]
    fn test_consumption_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Consumption::Payment(PaymentId(5))).unwrap();
        assert_eq!(json, r#"{"payment":5}"#);
        assert_eq!(Consumption::Payment(PaymentId(5)).payment(), Some(PaymentId(5)));
        assert_eq!(Consumption::Membership(MembershipId(5)).payment(), None);
    }
}
