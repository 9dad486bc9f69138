use super::ids::{MembershipId, PaymentId, UserId};
use crate::error::{BookingError, Result};
use chrono::{DateTime, Days, Months, Utc};
use serde::{Deserialize, Serialize};

/// Persisted sentinel for an unlimited balance.
pub const UNLIMITED_CREDITS: i64 = -1;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum MembershipKind {
    Metered,
    Unlimited,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Expired,
}

/// The package a membership was sold as.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum Package {
    /// One class, valid for a day.
    DropIn,
    /// Unlimited classes for a month.
    Monthly,
    /// Unlimited classes for three months.
    Quarterly,
    /// Issued outside the standard catalogue (grants, migrations).
    Custom,
}

impl Package {
    /// End time and balance of a membership of this package starting at `start`.
    pub fn terms(self, start: DateTime<Utc>) -> Result<(DateTime<Utc>, Credits)> {
        let (end, credits) = match self {
            Package::DropIn => (start.checked_add_days(Days::new(1)), Credits::Metered(1)),
            Package::Monthly => (start.checked_add_months(Months::new(1)), Credits::Unlimited),
            Package::Quarterly => (start.checked_add_months(Months::new(3)), Credits::Unlimited),
            Package::Custom => {
                return Err(BookingError::InvalidInput(
                    "custom packages cannot be purchased".to_string(),
                ));
            }
        };
        let end = end.ok_or_else(|| {
            BookingError::InvalidInput(format!("membership end out of range for {start}"))
        })?;
        Ok((end, credits))
    }
}

/// Remaining balance of a membership.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Credits {
    Unlimited,
    Metered(u32),
}

impl Credits {
    pub fn kind(self) -> MembershipKind {
        match self {
            Credits::Unlimited => MembershipKind::Unlimited,
            Credits::Metered(_) => MembershipKind::Metered,
        }
    }

    /// The persisted integer form, `-1` for unlimited.
    pub fn as_raw(self) -> i64 {
        match self {
            Credits::Unlimited => UNLIMITED_CREDITS,
            Credits::Metered(n) => i64::from(n),
        }
    }

    pub fn is_spendable(self) -> bool {
        !matches!(self, Credits::Metered(0))
    }
}

/// Result of trying to spend one unit of a membership.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Debit {
    /// Unlimited membership used; nothing changed.
    Unlimited,
    /// One credit spent. The membership expired if this was the last one.
    Spent { remaining: u32 },
    /// The end time had passed; the membership was flipped to expired instead.
    Lapsed,
    /// Not usable (already expired or no credits left); nothing changed.
    Unusable,
}

impl Debit {
    pub fn authorizes(self) -> bool {
        matches!(self, Debit::Unlimited | Debit::Spent { .. })
    }

    /// Whether the membership row changed and has to be written back.
    pub fn changed(self) -> bool {
        matches!(self, Debit::Spent { .. } | Debit::Lapsed)
    }
}

/// A pre-purchased entitlement to attend classes.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(try_from = "MembershipRecord", into = "MembershipRecord")]
pub struct Membership {
    pub id: MembershipId,
    pub user: UserId,
    pub package: Package,
    pub credits: Credits,
    pub status: MembershipStatus,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// The payment this membership was bought with. One payment, one membership.
    pub payment: Option<PaymentId>,
}

impl Membership {
    pub fn kind(&self) -> MembershipKind {
        self.credits.kind()
    }

    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }

    /// Active and not yet past its end time.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.end > now
    }

    pub fn expire(&mut self) {
        self.status = MembershipStatus::Expired;
    }

    /// Spends one unit of the membership if it can authorize a booking at `now`.
    pub fn debit(&mut self, now: DateTime<Utc>) -> Debit {
        if !self.is_active() {
            return Debit::Unusable;
        }
        if self.end <= now {
            self.expire();
            return Debit::Lapsed;
        }
        match self.credits {
            Credits::Unlimited => Debit::Unlimited,
            Credits::Metered(0) => Debit::Unusable,
            Credits::Metered(n) => {
                let remaining = n - 1;
                self.credits = Credits::Metered(remaining);
                if remaining == 0 {
                    self.expire();
                }
                Debit::Spent { remaining }
            }
        }
    }
}

/// A membership about to be issued, before an id is assigned.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(try_from = "NewMembershipRecord")]
pub struct NewMembership {
    pub user: UserId,
    pub package: Package,
    pub credits: Credits,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub payment: Option<PaymentId>,
}

impl NewMembership {
    pub fn into_membership(self, id: MembershipId) -> Membership {
        let status = if self.credits.is_spendable() {
            MembershipStatus::Active
        } else {
            MembershipStatus::Expired
        };
        Membership {
            id,
            user: self.user,
            package: self.package,
            credits: self.credits,
            status,
            start: self.start,
            end: self.end,
            payment: self.payment,
        }
    }
}

/// Persisted layout: `kind` plus a `credits` column using the `-1` sentinel.
#[derive(Serialize, Deserialize)]
struct MembershipRecord {
    id: MembershipId,
    user: UserId,
    #[serde(default = "custom_package")]
    package: Package,
    kind: MembershipKind,
    credits: i64,
    status: MembershipStatus,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    #[serde(default)]
    payment: Option<PaymentId>,
}

#[derive(Deserialize)]
struct NewMembershipRecord {
    user: UserId,
    #[serde(default = "custom_package")]
    package: Package,
    kind: MembershipKind,
    credits: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    #[serde(default)]
    payment: Option<PaymentId>,
}

fn custom_package() -> Package {
    Package::Custom
}

fn parse_credits(kind: MembershipKind, raw: i64) -> std::result::Result<Credits, String> {
    match kind {
        MembershipKind::Unlimited if raw == UNLIMITED_CREDITS => Ok(Credits::Unlimited),
        MembershipKind::Metered => u32::try_from(raw)
            .map(Credits::Metered)
            .map_err(|_| format!("metered membership cannot hold {raw} credits")),
        MembershipKind::Unlimited => Err(format!(
            "unlimited membership must store {UNLIMITED_CREDITS} credits, found {raw}"
        )),
    }
}

impl TryFrom<MembershipRecord> for Membership {
    type Error = String;

    fn try_from(r: MembershipRecord) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            user: r.user,
            package: r.package,
            credits: parse_credits(r.kind, r.credits)?,
            status: r.status,
            start: r.start,
            end: r.end,
            payment: r.payment,
        })
    }
}

impl From<Membership> for MembershipRecord {
    fn from(m: Membership) -> Self {
        Self {
            id: m.id,
            user: m.user,
            package: m.package,
            kind: m.credits.kind(),
            credits: m.credits.as_raw(),
            status: m.status,
            start: m.start,
            end: m.end,
            payment: m.payment,
        }
    }
}

impl TryFrom<NewMembershipRecord> for NewMembership {
    type Error = String;

    fn try_from(r: NewMembershipRecord) -> std::result::Result<Self, Self::Error> {
        if r.end <= r.start {
            return Err("membership must end after it starts".to_string());
        }
        Ok(Self {
            user: r.user,
            package: r.package,
            credits: parse_credits(r.kind, r.credits)?,
            start: r.start,
            end: r.end,
            payment: r.payment,
        })
    }
}
