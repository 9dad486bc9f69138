use super::ids::{PaymentId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Gateway-reported state of a payment. Only `Success` authorizes anything.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Created,
    Success,
    Failed,
}

/// A verified one-off payment fact handed over by the payment gateway.
///
/// Amount and currency are carried for receipts only; the core never
/// prices anything.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Payment {
    pub id: PaymentId,
    pub user: UserId,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct NewPayment {
    pub user: UserId,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub currency: String,
}

impl NewPayment {
    pub fn into_payment(self, id: PaymentId) -> Payment {
        Payment {
            id,
            user: self.user,
            status: self.status,
            amount: self.amount,
            currency: self.currency,
        }
    }
}

impl Payment {
    pub fn is_successful(&self) -> bool {
        self.status == PaymentStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_payment_deserialization() {
        let raw = r#"{"user": 3, "status": "success", "amount": "25.50", "currency": "AUD"}"#;
        let payment = serde_json::from_str::<NewPayment>(raw)
            .unwrap()
            .into_payment(PaymentId(9));
        assert_eq!(payment.amount, dec!(25.50));
        assert!(payment.is_successful());

        let raw = r#"{"user": 3, "status": "refunded", "amount": "1", "currency": "AUD"}"#;
        assert!(serde_json::from_str::<NewPayment>(raw).is_err());
    }
}
