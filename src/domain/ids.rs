use crate::error::{BookingError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a member. Always a fixed-width integer inside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MembershipId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub u64);

impl UserId {
    /// Normalizes a loosely typed identity claim into a `UserId`.
    ///
    /// Identity layers hand the subject over as a JSON integer, an integral
    /// float (`7.0`) or a numeric string. Negative, fractional and
    /// non-numeric values are rejected.
    pub fn from_claim(claim: &serde_json::Value) -> Result<Self> {
        match claim {
            serde_json::Value::Number(n) => {
                if let Some(id) = n.as_u64() {
                    return Ok(Self(id));
                }
                match n.as_f64() {
                    Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
                        Ok(Self(f as u64))
                    }
                    _ => Err(BookingError::InvalidInput(format!("invalid user id {n}"))),
                }
            }
            serde_json::Value::String(s) => s.parse(),
            other => Err(BookingError::InvalidInput(format!(
                "invalid user id {other}"
            ))),
        }
    }
}

impl FromStr for UserId {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(id) = trimmed.parse::<u64>() {
            return Ok(Self(id));
        }
        match trimmed.parse::<f64>() {
            Ok(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(Self(f as u64)),
            _ => Err(BookingError::InvalidInput(format!("invalid user id {s:?}"))),
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for MembershipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<ClassId> for u64 {
    fn from(id: ClassId) -> Self {
        id.0
    }
}

impl From<BookingId> for u64 {
    fn from(id: BookingId) -> Self {
        id.0
    }
}

impl From<MembershipId> for u64 {
    fn from(id: MembershipId) -> Self {
        id.0
    }
}

impl From<PaymentId> for u64 {
    fn from(id: PaymentId) -> Self {
        id.0
    }
}
