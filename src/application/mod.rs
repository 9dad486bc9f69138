//! Application layer: the booking workflows built on the domain ports.
//!
//! [`reservation::ReservationService`] books, cancels and completes seats,
//! using [`admission`] for capacity and [`entitlement`] to decide what pays.
//! [`membership::MembershipService`] sells memberships and
//! [`sweeper::ExpirySweeper`] retires lapsed ones in the background.
//! Everything runs in units of work on a shared store, so any number of
//! callers may use these services concurrently.

pub mod admission;
mod attempt;
pub mod entitlement;
pub mod membership;
pub mod notifier;
pub mod reservation;
pub mod sweeper;
