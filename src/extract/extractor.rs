//! Pattern-based identifier extraction.
//!
//! Pure function over input text: category-specific patterns scan the message,
//! each match is normalized to its canonical form, and matches that fail
//! normalization are dropped rather than emitted as low-confidence guesses.
//! Confidence is fixed per type — a well-formed payment handle is near-certain,
//! a bare digit run is ambiguous without context.

use regex::Regex;
use tracing::{debug, warn};

use super::{EntityType, ExtractedEntity, ExtractionResult};

/// Canonical forms produced by normalization:
///
/// - phone: bare 10-digit national number (country prefix stripped)
/// - payment handle / email: lower-cased
/// - routing code: upper-cased
/// - URL: absolute, `https://` prepended when the scheme is missing
/// - bank account: digits only
pub struct EntityExtractor {
    patterns: Vec<(EntityType, Regex)>,
}

impl EntityExtractor {
    pub fn new() -> Self {
        let sources: &[(EntityType, &str)] = &[
            (
                EntityType::PaymentHandle,
                r"(?i)[a-z0-9._-]+@(?:paytm|phonepe|upi|ybl|oksbi|okicici|okaxis|okhdfcbank|axl|ibl|sbi|apl|axisbank|hdfcbank|icici|kotak|indus)\b",
            ),
            (EntityType::Phone, r"(?:\+91[-\s]?)?[6-9][0-9]{9}"),
            (EntityType::Phone, r"(?:\+91[-\s]?)?[0-9]{5}[-\s][0-9]{5}"),
            (EntityType::BankAccount, r"\b[0-9]{9,18}\b"),
            (EntityType::RoutingCode, r"\b[A-Z]{4}0[A-Z0-9]{6}\b"),
            (
                EntityType::Email,
                r"(?i)[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}",
            ),
            (EntityType::Url, r#"(?i)https?://[^\s<>"']+"#),
            (EntityType::Url, r#"(?i)www\.[^\s<>"']+"#),
            (EntityType::Url, r"(?i)bit\.ly/[a-zA-Z0-9]+"),
            (EntityType::Url, r"(?i)tinyurl\.com/[a-zA-Z0-9]+"),
            (EntityType::Amount, r"(?i)(?:Rs\.?|₹|INR)\s*[\d,]+(?:\.\d{2})?"),
            (EntityType::Amount, r"(?i)[\d,]+(?:\.\d{2})?\s*(?:rupees?|rs\.?|inr)"),
            (EntityType::Amount, r"(?:\$|USD)\s*[\d,]+(?:\.\d{2})?"),
        ];

        let mut patterns = Vec::with_capacity(sources.len());
        for (entity_type, source) in sources {
            match Regex::new(source) {
                Ok(re) => patterns.push((entity_type.clone(), re)),
                Err(e) => warn!(pattern = *source, error = %e, "failed to compile extraction pattern"),
            }
        }

        Self { patterns }
    }

    /// Extract all identifiers from `text`.
    ///
    /// Overlapping matches across types are allowed (a 10-digit phone number is
    /// also a plausible account-number run); deduplication happens within a
    /// type only.
    pub fn extract(&self, text: &str) -> ExtractionResult {
        let mut result = ExtractionResult::default();

        for (entity_type, pattern) in &self.patterns {
            for m in pattern.find_iter(text) {
                let raw = m.as_str();
                let Some(value) = normalize(entity_type, raw) else {
                    continue;
                };
                let confidence = type_confidence(entity_type, raw);
                result.add(ExtractedEntity {
                    entity_type: entity_type.clone(),
                    value,
                    confidence,
                    span: (m.start(), m.end()),
                    raw_match: raw.to_string(),
                });
            }
        }

        result.finish();
        debug!(
            entity_count = result.entity_count(),
            match_count = result.detailed.len(),
            "extraction complete"
        );
        result
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a raw match to its canonical form; `None` drops the match.
fn normalize(entity_type: &EntityType, raw: &str) -> Option<String> {
    match entity_type {
        EntityType::Phone => {
            let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
            let national = if digits.len() == 10 {
                digits
            } else if digits.len() == 12 && digits.starts_with("91") {
                digits[2..].to_string()
            } else {
                return None;
            };
            // Indian mobile numbers start 6-9; anything else is not a phone.
            national.starts_with(['6', '7', '8', '9']).then_some(national)
        }
        EntityType::PaymentHandle => {
            let handle = raw.trim().to_lowercase();
            handle.contains('@').then_some(handle)
        }
        EntityType::Email => Some(raw.trim().to_lowercase()),
        EntityType::RoutingCode => Some(raw.trim().to_uppercase()),
        EntityType::Url => {
            let url = raw.trim();
            if url.starts_with("http") {
                Some(url.to_string())
            } else {
                Some(format!("https://{url}"))
            }
        }
        EntityType::BankAccount => {
            let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
            (9..=18).contains(&digits.len()).then_some(digits)
        }
        EntityType::Amount | EntityType::Other(_) => Some(raw.trim().to_string()),
    }
}

/// Fixed per-type confidence, reflecting pattern specificity.
fn type_confidence(entity_type: &EntityType, raw: &str) -> f32 {
    match entity_type {
        EntityType::PaymentHandle | EntityType::RoutingCode => 0.95,
        EntityType::Email => 0.9,
        EntityType::Phone => {
            // Bare national numbers are unambiguous; prefixed forms carry
            // separators that occasionally glue unrelated digit groups together.
            let digits = raw.chars().filter(|c| c.is_ascii_digit()).count();
            if digits == 10 {
                0.9
            } else {
                0.7
            }
        }
        EntityType::Url => {
            let lowered = raw.to_lowercase();
            if ["bit.ly", "tinyurl", ".tk", ".ml"].iter().any(|s| lowered.contains(s)) {
                0.8
            } else {
                0.85
            }
        }
        EntityType::Amount => 0.85,
        // Ambiguous without corroborating context; the validator has the final say.
        EntityType::BankAccount => 0.6,
        EntityType::Other(_) => 0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(result: &ExtractionResult, t: &EntityType) -> Vec<String> {
        result.entities.get(t).cloned().unwrap_or_default()
    }

    #[test]
    fn extracts_payment_handle_lowercased() {
        let ex = EntityExtractor::new();
        let result = ex.extract("Send the fee to Claim@UPI right away");
        assert_eq!(values(&result, &EntityType::PaymentHandle), vec!["claim@upi"]);
    }

    #[test]
    fn extracts_phone_in_canonical_digit_form() {
        let ex = EntityExtractor::new();
        let result = ex.extract("call me at +91-98765 43210 or 9876543210");
        let phones = values(&result, &EntityType::Phone);
        assert_eq!(phones, vec!["9876543210"]);
    }

    #[test]
    fn non_mobile_digit_pair_is_dropped_not_guessed() {
        let ex = EntityExtractor::new();
        // Matches the spaced pattern but cannot be an Indian mobile number.
        let result = ex.extract("ticket id 12345 67890");
        assert!(values(&result, &EntityType::Phone).is_empty());
    }

    #[test]
    fn extracts_routing_code_uppercase() {
        let ex = EntityExtractor::new();
        let result = ex.extract("IFSC SBIN0001234 for the transfer");
        assert_eq!(values(&result, &EntityType::RoutingCode), vec!["SBIN0001234"]);
    }

    #[test]
    fn bare_url_gains_a_scheme() {
        let ex = EntityExtractor::new();
        let result = ex.extract("visit www.claim-prize.tk today");
        let urls = values(&result, &EntityType::Url);
        assert!(urls.iter().any(|u| u.starts_with("https://www.claim-prize.tk")));
    }

    #[test]
    fn phone_also_extracts_as_account_shaped_run() {
        let ex = EntityExtractor::new();
        let result = ex.extract("account 9876543210");
        assert_eq!(values(&result, &EntityType::Phone), vec!["9876543210"]);
        assert_eq!(values(&result, &EntityType::BankAccount), vec!["9876543210"]);
        let account = result
            .detailed
            .iter()
            .find(|e| e.entity_type == EntityType::BankAccount)
            .unwrap();
        assert!(account.confidence < 0.7);
    }

    #[test]
    fn extracts_email_and_amounts() {
        let ex = EntityExtractor::new();
        let result = ex.extract("Wire Rs. 50,000 and confirm to Fraud.Desk@example.com");
        assert_eq!(
            values(&result, &EntityType::Email),
            vec!["fraud.desk@example.com"]
        );
        assert_eq!(values(&result, &EntityType::Amount), vec!["Rs. 50,000"]);
    }

    #[test]
    fn clean_text_yields_nothing() {
        let ex = EntityExtractor::new();
        let result = ex.extract("see you at the cafe tomorrow");
        assert!(result.is_empty());
        assert_eq!(result.confidence, 0.0);
    }
}
