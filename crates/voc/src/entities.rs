//! Deterministic entity extraction: a regex battery over the raw text.
//!
//! Order-number patterns are tenant-specific (prefix list from tenant
//! policy); everything else is shared. AWB candidates are bare digit
//! runs, accepted only near a shipping keyword and never when they
//! collide with an already-extracted order number or phone.

use regex::Regex;

use rv_domain::voc::{Entity, EntityType};

/// How close (in characters) a digit run must be to a shipping keyword
/// to count as an AWB.
const AWB_PROXIMITY: usize = 30;

/// Build the order-number pattern for a prefix list, e.g.
/// `["Q", "ORD", "OD"]` → `Q2593VU`, `ORD-12345`, `od98765`.
///
/// The suffix must contain at least one digit — single-letter prefixes
/// would otherwise swallow ordinary words ("quick" under prefix `Q`).
pub fn order_pattern(prefixes: &[String]) -> Regex {
    let alternation = prefixes
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r"(?i)\b(?:{alternation})-?[A-Z0-9]{{0,10}}\d[A-Z0-9]{{0,10}}\b"
    ))
    .expect("order pattern")
}

/// Shared entity patterns, compiled once.
pub struct SharedPatterns {
    phone: Regex,
    email: Regex,
    amount: Regex,
    return_id: Regex,
    payment_id: Regex,
    awb_candidate: Regex,
    awb_keyword: Regex,
}

impl SharedPatterns {
    pub fn new() -> Self {
        Self {
            phone: Regex::new(r"(?:\+91[\s-]?)?\b[6-9]\d{9}\b").expect("phone pattern"),
            email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
                .expect("email pattern"),
            amount: Regex::new(r"₹\s?\d+(?:,\d{2,3})*(?:\.\d{1,2})?").expect("amount pattern"),
            return_id: Regex::new(r"(?i)\b(?:RET|RMA)-?\d{4,12}\b").expect("return-id pattern"),
            payment_id: Regex::new(r"\bpay_[A-Za-z0-9]{8,}\b").expect("payment-id pattern"),
            awb_candidate: Regex::new(r"\b\d{10,18}\b").expect("awb candidate pattern"),
            awb_keyword: Regex::new(r"(?i)\b(?:awb|tracking|shipment|courier)\b")
                .expect("awb keyword pattern"),
        }
    }

    /// Run the full battery, deduplicating AWB collisions.
    pub fn extract(&self, order: &Regex, text: &str) -> Vec<Entity> {
        let mut entities = Vec::new();

        for m in order.find_iter(text) {
            entities.push(Entity {
                entity_type: EntityType::OrderNumber,
                value: m.as_str().to_uppercase().replace('-', ""),
                raw_text: m.as_str().to_owned(),
                confidence: 0.9,
            });
        }

        for m in self.phone.find_iter(text) {
            let digits: String = m.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
            // Strip the country prefix so `+91 98765…` and `98765…`
            // normalize to the same 10-digit value.
            let value = if digits.len() == 12 && digits.starts_with("91") {
                digits[2..].to_owned()
            } else {
                digits
            };
            entities.push(Entity {
                entity_type: EntityType::Phone,
                value,
                raw_text: m.as_str().to_owned(),
                confidence: 0.95,
            });
        }

        for m in self.email.find_iter(text) {
            entities.push(Entity {
                entity_type: EntityType::Email,
                value: m.as_str().to_lowercase(),
                raw_text: m.as_str().to_owned(),
                confidence: 0.99,
            });
        }

        for m in self.amount.find_iter(text) {
            let value: String = m
                .as_str()
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            entities.push(Entity {
                entity_type: EntityType::Amount,
                value,
                raw_text: m.as_str().to_owned(),
                confidence: 0.9,
            });
        }

        for m in self.return_id.find_iter(text) {
            entities.push(Entity {
                entity_type: EntityType::ReturnId,
                value: m.as_str().to_uppercase().replace('-', ""),
                raw_text: m.as_str().to_owned(),
                confidence: 0.9,
            });
        }

        for m in self.payment_id.find_iter(text) {
            entities.push(Entity {
                entity_type: EntityType::PaymentId,
                value: m.as_str().to_owned(),
                raw_text: m.as_str().to_owned(),
                confidence: 0.95,
            });
        }

        // AWB: digit runs near a shipping keyword, minus collisions.
        let keyword_spans: Vec<(usize, usize)> = self
            .awb_keyword
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .collect();
        if !keyword_spans.is_empty() {
            for m in self.awb_candidate.find_iter(text) {
                let near = keyword_spans.iter().any(|(ks, ke)| {
                    m.start().saturating_sub(*ke) <= AWB_PROXIMITY
                        && ks.saturating_sub(m.end()) <= AWB_PROXIMITY
                });
                if !near {
                    continue;
                }
                let value = m.as_str().to_owned();
                let collides = entities.iter().any(|e| {
                    matches!(e.entity_type, EntityType::OrderNumber | EntityType::Phone)
                        && e.value == value
                });
                if collides {
                    continue;
                }
                entities.push(Entity {
                    entity_type: EntityType::Awb,
                    value,
                    raw_text: m.as_str().to_owned(),
                    confidence: 0.8,
                });
            }
        }

        entities
    }
}

impl Default for SharedPatterns {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<Entity> {
        let prefixes = vec!["Q".to_string(), "ORD".to_string()];
        SharedPatterns::new().extract(&order_pattern(&prefixes), text)
    }

    fn values_of(entities: &[Entity], t: EntityType) -> Vec<&str> {
        entities
            .iter()
            .filter(|e| e.entity_type == t)
            .map(|e| e.value.as_str())
            .collect()
    }

    #[test]
    fn order_numbers_normalize_uppercase() {
        let entities = extract("my orders q2593vu and ORD-88421 are late");
        assert_eq!(
            values_of(&entities, EntityType::OrderNumber),
            vec!["Q2593VU", "ORD88421"]
        );
    }

    #[test]
    fn phone_normalizes_country_prefix() {
        let entities = extract("call +91 9876543210 please");
        assert_eq!(values_of(&entities, EntityType::Phone), vec!["9876543210"]);
    }

    #[test]
    fn phone_requires_leading_six_to_nine() {
        let entities = extract("ref 1234567890");
        assert!(values_of(&entities, EntityType::Phone).is_empty());
    }

    #[test]
    fn email_and_amount() {
        let entities = extract("refund ₹1,499.50 to asha@example.com");
        assert_eq!(values_of(&entities, EntityType::Email), vec!["asha@example.com"]);
        assert_eq!(values_of(&entities, EntityType::Amount), vec!["1499.50"]);
    }

    #[test]
    fn awb_needs_keyword_proximity() {
        let with_keyword = extract("tracking number 12345678901234");
        assert_eq!(
            values_of(&with_keyword, EntityType::Awb),
            vec!["12345678901234"]
        );

        let without = extract("my invoice 12345678901234 from last month");
        assert!(values_of(&without, EntityType::Awb).is_empty());
    }

    #[test]
    fn awb_far_from_keyword_is_rejected() {
        let text = format!(
            "the courier lost it. {} anyway here is 12345678901234",
            "x".repeat(40)
        );
        let entities = extract(&text);
        assert!(values_of(&entities, EntityType::Awb).is_empty());
    }

    #[test]
    fn awb_colliding_with_phone_is_dropped() {
        let entities = extract("courier guy's number 9876543210");
        assert_eq!(values_of(&entities, EntityType::Phone), vec!["9876543210"]);
        assert!(values_of(&entities, EntityType::Awb).is_empty());
    }

    #[test]
    fn return_and_payment_ids() {
        let entities = extract("return RET-20241105 refund pay_Hx92kLmQ3f");
        assert_eq!(values_of(&entities, EntityType::ReturnId), vec!["RET20241105"]);
        assert_eq!(
            values_of(&entities, EntityType::PaymentId),
            vec!["pay_Hx92kLmQ3f"]
        );
    }
}
