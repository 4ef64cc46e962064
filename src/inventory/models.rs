//! Redemption code and order models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A single-use code belonging to a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionCode {
    pub id: Uuid,
    pub product_id: String,
    pub code: String,
    /// One-way: set when the code is bound to an order
    pub used: bool,
    pub order_id: Option<Uuid>,
    /// Set together with `used` and `order_id`
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A purchase that received a redemption code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub identity_id: String,
    pub product_id: String,
    pub cost: i64,
    pub code_id: Option<Uuid>,
    /// Code value; present only once the owner has revealed it
    pub code: Option<String>,
    pub revealed: bool,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Hide the code value of an order that has not been revealed yet
    pub fn redacted(mut self) -> Self {
        if !self.revealed {
            self.code = None;
        }
        self
    }
}

/// Result of a bulk code import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub inserted: usize,
    /// Duplicates, within the batch or against stored codes
    pub skipped: usize,
}

/// Trim each line, drop blanks and collapse repeats within the batch.
/// Returns the distinct codes in input order and the number of repeats.
pub fn normalize_codes<'a>(lines: impl IntoIterator<Item = &'a str>) -> (Vec<String>, usize) {
    let mut seen = HashSet::new();
    let mut codes = Vec::new();
    let mut repeats = 0;

    for line in lines {
        let code = line.trim();
        if code.is_empty() {
            continue;
        }
        if seen.insert(code) {
            codes.push(code.to_string());
        } else {
            repeats += 1;
        }
    }

    (codes, repeats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_codes() {
        let raw = "  AAAA-1111 \n\nBBBB-2222\nAAAA-1111\n   \nCCCC-3333";
        let (codes, repeats) = normalize_codes(raw.lines());

        assert_eq!(codes, vec!["AAAA-1111", "BBBB-2222", "CCCC-3333"]);
        assert_eq!(repeats, 1);
    }

    #[test]
    fn test_redacted_hides_unrevealed_code() {
        let order = Order {
            id: Uuid::new_v4(),
            identity_id: "user_1".into(),
            product_id: "gift_card_5".into(),
            cost: 500,
            code_id: Some(Uuid::new_v4()),
            code: Some("AAAA-1111".into()),
            revealed: false,
            used: false,
            created_at: Utc::now(),
        };

        assert!(order.clone().redacted().code.is_none());

        let revealed = Order { revealed: true, ..order };
        assert_eq!(revealed.redacted().code.as_deref(), Some("AAAA-1111"));
    }
}
