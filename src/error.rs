use std::fmt;
use thiserror::Error;

/// The record type named by a [`BookingError::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Class,
    Booking,
    Membership,
    Payment,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Class => "class",
            Entity::Booking => "booking",
            Entity::Membership => "membership",
            Entity::Payment => "payment",
        };
        f.write_str(name)
    }
}

/// Coarse grouping of errors for a transport layer (HTTP status, exit code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    PaymentRequired,
    Unavailable,
    Invalid,
    Internal,
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: u64 },
    #[error("class {0} is full")]
    ClassFull(u64),
    #[error("user already holds a booking for class {0}")]
    AlreadyBooked(u64),
    #[error("no active membership or valid payment provided")]
    NoEntitlement,
    #[error("payment {0} does not belong to the user")]
    PaymentOwnershipMismatch(u64),
    #[error("payment {0} has not succeeded")]
    PaymentNotSuccessful(u64),
    #[error("payment {0} has already been used")]
    PaymentAlreadyConsumed(u64),
    #[error("booking {0} is already cancelled")]
    AlreadyCancelled(u64),
    #[error("booking {0} is completed and can no longer change")]
    Immutable(u64),
    #[error("timed out waiting for a row lock")]
    Busy,
    #[error("store failure: {0}")]
    StoreFailure(String),
    #[error("notification failed: {0}")]
    Notification(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BookingError {
    pub fn not_found(entity: Entity, id: impl Into<u64>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable reason code for the rejection.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::ClassFull(_) => "class_full",
            Self::AlreadyBooked(_) => "already_booked",
            Self::NoEntitlement => "no_entitlement",
            Self::PaymentOwnershipMismatch(_) => "payment_ownership_mismatch",
            Self::PaymentNotSuccessful(_) => "payment_not_successful",
            Self::PaymentAlreadyConsumed(_) => "payment_already_consumed",
            Self::AlreadyCancelled(_) => "already_cancelled",
            Self::Immutable(_) => "immutable",
            Self::Busy => "busy",
            Self::StoreFailure(_) => "store_failure",
            Self::Notification(_) => "notification",
            Self::InvalidInput(_) => "invalid_input",
            Self::Config(_) => "config",
            Self::Csv(_) => "csv",
            Self::Io(_) => "io",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ClassFull(_)
            | Self::AlreadyBooked(_)
            | Self::AlreadyCancelled(_)
            | Self::Immutable(_) => ErrorKind::Conflict,
            Self::NoEntitlement
            | Self::PaymentOwnershipMismatch(_)
            | Self::PaymentNotSuccessful(_)
            | Self::PaymentAlreadyConsumed(_) => ErrorKind::PaymentRequired,
            Self::Busy => ErrorKind::Unavailable,
            Self::InvalidInput(_) | Self::Csv(_) => ErrorKind::Invalid,
            Self::StoreFailure(_) | Self::Notification(_) | Self::Config(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Business-rule rejections; these never leave partial state behind.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::Conflict | ErrorKind::PaymentRequired
        )
    }

    pub(crate) fn store(err: impl fmt::Display) -> Self {
        Self::StoreFailure(err.to_string())
    }
}

impl From<serde_json::Error> for BookingError {
    fn from(err: serde_json::Error) -> Self {
        Self::StoreFailure(format!("serialization error: {err}"))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for BookingError {
    fn from(err: rocksdb::Error) -> Self {
        Self::StoreFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BookingError>;
