//! Domain layer: records, their state transitions, and the ports the
//! application layer drives.

pub mod booking;
pub mod class;
pub mod ids;
pub mod membership;
pub mod notification;
pub mod payment;
pub mod ports;
