use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A coach's payout destination. The account number is encrypted at rest;
/// only the last four digits are ever surfaced. Accounts become eligible
/// for payouts once verified, and at most one per coach is the default.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BankAccount {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub routing_number: String,
    #[serde(skip_serializing)]
    pub account_number_enc: String,
    pub account_last4: String,
    pub account_holder: String,
    pub is_verified: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BankAccount {
    /// External representation of the account number.
    pub fn masked_account_number(&self) -> String {
        format!("****{}", self.account_last4)
    }
}

/// The routing number's ABA checksum is validated imperatively in the
/// registry service; the derive only covers shape.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterBankAccountRequest {
    pub coach_id: Uuid,
    #[validate(length(equal = 9))]
    pub routing_number: String,
    #[validate(length(min = 4, max = 17))]
    pub account_number: String,
    #[validate(length(min = 1, max = 100))]
    pub account_holder: String,
}

/// ABA routing number check: nine digits whose weighted checksum
/// `3(d0+d3+d6) + 7(d1+d4+d7) + (d2+d5+d8)` is divisible by ten.
pub fn is_valid_routing_number(routing: &str) -> bool {
    if routing.len() != 9 || !routing.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let d: Vec<i64> = routing.bytes().map(|b| i64::from(b - b'0')).collect();
    let checksum = 3 * (d[0] + d[3] + d[6]) + 7 * (d[1] + d[4] + d[7]) + (d[2] + d[5] + d[8]);
    checksum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_routing_numbers() {
        // Published Federal Reserve routing numbers.
        for routing in ["011000015", "021000021", "121000358", "071000013"] {
            assert!(is_valid_routing_number(routing), "{routing} should pass");
        }
    }

    #[test]
    fn rejects_bad_checksums_and_shapes() {
        assert!(!is_valid_routing_number("011000016")); // checksum off by one
        assert!(!is_valid_routing_number("12345678")); // too short
        assert!(!is_valid_routing_number("1234567890")); // too long
        assert!(!is_valid_routing_number("12345678a")); // non-digit
        assert!(!is_valid_routing_number(""));
    }

    #[test]
    fn masking_shows_only_last_four() {
        let account = BankAccount {
            id: Uuid::new_v4(),
            coach_id: Uuid::new_v4(),
            routing_number: "011000015".to_string(),
            account_number_enc: "ciphertext".to_string(),
            account_last4: "6789".to_string(),
            account_holder: "Jordan Coach".to_string(),
            is_verified: true,
            is_default: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert_eq!(account.masked_account_number(), "****6789");
    }
}
