use super::booking::Booking;
use super::class::Class;
use super::ids::UserId;
use super::membership::{Membership, Package};
use super::payment::Payment;
use rust_decimal::Decimal;

/// Templated message types sent to members after a state change commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    BookingConfirmed {
        class_name: String,
        schedule: String,
    },
    BookingCancelled {
        class_name: String,
        schedule: String,
        reason: Option<String>,
    },
    PaymentReceipt {
        package: Package,
        amount: Decimal,
        currency: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: UserId,
    pub template: Template,
}

impl Notification {
    pub fn booking_confirmed(booking: &Booking, class: &Class) -> Self {
        Self {
            recipient: booking.user,
            template: Template::BookingConfirmed {
                class_name: class.name.clone(),
                schedule: class.schedule.clone(),
            },
        }
    }

    pub fn booking_cancelled(booking: &Booking, class: &Class) -> Self {
        Self {
            recipient: booking.user,
            template: Template::BookingCancelled {
                class_name: class.name.clone(),
                schedule: class.schedule.clone(),
                reason: booking.cancellation_reason.clone(),
            },
        }
    }

    pub fn payment_receipt(membership: &Membership, payment: &Payment) -> Self {
        Self {
            recipient: membership.user,
            template: Template::PaymentReceipt {
                package: membership.package,
                amount: payment.amount,
                currency: payment.currency.clone(),
            },
        }
    }

    pub fn subject(&self) -> &'static str {
        match self.template {
            Template::BookingConfirmed { .. } => "Booking confirmed",
            Template::BookingCancelled { .. } => "Booking cancelled",
            Template::PaymentReceipt { .. } => "Payment receipt",
        }
    }

    pub fn body(&self) -> String {
        match &self.template {
            Template::BookingConfirmed {
                class_name,
                schedule,
            } => format!("Your place in {class_name} ({schedule}) is confirmed."),
            Template::BookingCancelled {
                class_name,
                schedule,
                reason,
            } => match reason {
                Some(reason) => {
                    format!("Your booking for {class_name} ({schedule}) was cancelled: {reason}.")
                }
                None => format!("Your booking for {class_name} ({schedule}) was cancelled."),
            },
            Template::PaymentReceipt {
                package,
                amount,
                currency,
            } => format!("We received {amount} {currency} for your {package:?} membership."),
        }
    }
}
