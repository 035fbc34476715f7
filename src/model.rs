//! Wire models for the billing API.
//!
//! Matches the backend's bill serializer: `GET /billing/bills/` returns an
//! ordered list of [`Bill`] values. The backend owns every field here, in
//! particular [`BillStatus`]: the client re-renders it but never flips it
//! on its own.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a bill, as reported by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "PAID")]
    Paid,
    #[serde(rename = "OVERDUE")]
    Overdue,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Pending => "PENDING",
            BillStatus::Paid => "PAID",
            BillStatus::Overdue => "OVERDUE",
        }
    }
}

/// One billing-period invoice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    /// Opaque backend identifier.
    pub id: String,
    /// ISO date, start of the billing period.
    pub period_start: String,
    /// ISO date, end of the billing period.
    pub period_end: String,
    /// Decimal pounds as a string, e.g. `"42.50"`.
    pub total_amount: String,
    pub status: BillStatus,
    /// ISO timestamp the bill was generated at.
    pub generated_at: String,
}

impl Bill {
    /// Whether the pay action may be offered. Settled bills are never
    /// payable.
    pub fn is_payable(&self) -> bool {
        !matches!(self.status, BillStatus::Paid)
    }

    /// The outstanding amount in pence, for the intent-creation request.
    pub fn amount_pence(&self) -> Result<i64, AmountError> {
        parse_amount_pence(&self.total_amount)
    }
}

/// Rejections from [`parse_amount_pence`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is not a decimal number: {0:?}")]
    Malformed(String),
    #[error("amount must not be negative: {0:?}")]
    Negative(String),
}

/// Parse a decimal pounds string (`"42.50"`, `"7"`, `"0.5"`) into pence.
///
/// At most two fractional digits are accepted; anything else is a
/// malformed amount, not something to round.
pub fn parse_amount_pence(raw: &str) -> Result<i64, AmountError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(AmountError::Malformed(raw.to_string()));
    }
    if s.starts_with('-') {
        return Err(AmountError::Negative(raw.to_string()));
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(AmountError::Malformed(raw.to_string()));
    }

    let pounds: i64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| AmountError::Malformed(raw.to_string()))?
    };

    if !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(AmountError::Malformed(raw.to_string()));
    }
    let pence: i64 = match frac.len() {
        0 => 0,
        1 | 2 => {
            let digits: i64 = frac
                .parse()
                .map_err(|_| AmountError::Malformed(raw.to_string()))?;
            if frac.len() == 1 {
                digits * 10
            } else {
                digits
            }
        }
        _ => return Err(AmountError::Malformed(raw.to_string())),
    };

    Ok(pounds * 100 + pence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bill(status: BillStatus, amount: &str) -> Bill {
        Bill {
            id: "b1".into(),
            period_start: "2025-06-01".into(),
            period_end: "2025-06-30".into(),
            total_amount: amount.into(),
            status,
            generated_at: "2025-07-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn pay_action_never_offered_for_paid_bills() {
        assert!(!bill(BillStatus::Paid, "42.50").is_payable());
        assert!(bill(BillStatus::Pending, "42.50").is_payable());
        assert!(bill(BillStatus::Overdue, "42.50").is_payable());
    }

    #[test]
    fn amounts_parse_to_pence() {
        assert_eq!(parse_amount_pence("42.50"), Ok(4250));
        assert_eq!(parse_amount_pence("42.5"), Ok(4250));
        assert_eq!(parse_amount_pence("42"), Ok(4200));
        assert_eq!(parse_amount_pence("0.07"), Ok(7));
        assert_eq!(parse_amount_pence(".5"), Ok(50));
    }

    #[test]
    fn bad_amounts_are_rejected() {
        assert!(matches!(
            parse_amount_pence("fourty"),
            Err(AmountError::Malformed(_))
        ));
        assert!(matches!(
            parse_amount_pence("42.505"),
            Err(AmountError::Malformed(_))
        ));
        assert!(matches!(parse_amount_pence(""), Err(AmountError::Malformed(_))));
        assert!(matches!(
            parse_amount_pence("-1.00"),
            Err(AmountError::Negative(_))
        ));
    }

    #[test]
    fn status_is_a_closed_set_on_the_wire() {
        let json = r#"{
            "id": "a9f0",
            "period_start": "2025-06-01",
            "period_end": "2025-06-30",
            "total_amount": "42.50",
            "status": "OVERDUE",
            "generated_at": "2025-07-01T00:00:00Z"
        }"#;
        let b: Bill = serde_json::from_str(json).unwrap();
        assert_eq!(b.status, BillStatus::Overdue);
        assert_eq!(b.amount_pence(), Ok(4250));

        let unknown = json.replace("OVERDUE", "SETTLED");
        assert!(serde_json::from_str::<Bill>(&unknown).is_err());
    }
}
