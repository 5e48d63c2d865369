//! Authenticity screening for extracted identifiers.
//!
//! Scammers hand honeypots placeholder data constantly — `test@upi`, sequential
//! phone numbers, `example.com` addresses. Validation is a pure function of
//! `(entity_type, value)`: structural checks first, then a library of known
//! placeholder patterns. Unrecognized entity types pass through as valid with
//! low confidence so the pipeline degrades gracefully to new types.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::EntityType;

/// Verdict on a single identifier value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub entity_type: EntityType,
    pub value: String,
    /// Whether the value has the right shape for its type at all.
    pub is_structurally_valid: bool,
    /// Whether the value looks like placeholder/test data.
    pub is_suspected_fake: bool,
    pub confidence: f32,
    pub reason: String,
}

impl ValidationResult {
    /// A value worth acting on: shaped correctly and not placeholder-looking.
    pub fn is_authentic(&self) -> bool {
        self.is_structurally_valid && !self.is_suspected_fake
    }

    fn new(
        entity_type: EntityType,
        value: &str,
        is_structurally_valid: bool,
        is_suspected_fake: bool,
        confidence: f32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            value: value.to_string(),
            is_structurally_valid,
            is_suspected_fake,
            confidence,
            reason: reason.into(),
        }
    }
}

const PAYMENT_PROVIDERS: &[&str] = &[
    "upi", "paytm", "phonepe", "ybl", "oksbi", "okicici", "okaxis", "okhdfcbank", "axl", "ibl",
    "sbi", "apl", "axisbank", "hdfcbank", "icici", "kotak", "indus",
];

const KNOWN_BANK_PREFIXES: &[&str] = &[
    "SBIN", "HDFC", "ICIC", "AXIS", "PUNB", "BARB", "UBIN", "CBIN", "UTIB",
];

const FAKE_EMAIL_DOMAINS: &[&str] = &[
    "example.com", "test.com", "fake.com", "dummy.com", "tempmail.com",
];

/// Per-type rule sets for placeholder detection.
pub struct EntityValidator {
    fake_handle_patterns: Vec<Regex>,
    fake_phone_patterns: Vec<Regex>,
    fake_account_patterns: Vec<Regex>,
    routing_format: Option<Regex>,
    email_format: Option<Regex>,
}

impl EntityValidator {
    pub fn new() -> Self {
        let fake_handles = [
            r"^test", r"^demo", r"^fake", r"^dummy", r"^example", r"^sample", r"^xxx+", r"^abc+",
            r"^123+", r"@example", r"@test",
        ];
        let fake_phones = [
            r"^0{10}$",
            r"^1{10}$",
            r"^1234567890$",
            r"^9876543210$",
            r"^9{10}$",
        ];
        let fake_accounts = [r"^0+$", r"^1+$", r"^123456789", r"^987654321"];

        Self {
            fake_handle_patterns: compile(&fake_handles, true),
            fake_phone_patterns: compile(&fake_phones, false),
            fake_account_patterns: compile(&fake_accounts, false),
            routing_format: Regex::new(r"^[A-Z]{4}0[A-Z0-9]{6}$").ok(),
            email_format: Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok(),
        }
    }

    /// Validate a single value. Pure; no shared state between calls.
    pub fn validate(&self, entity_type: &EntityType, value: &str) -> ValidationResult {
        match entity_type {
            EntityType::PaymentHandle => self.validate_payment_handle(value),
            EntityType::Phone => self.validate_phone(value),
            EntityType::BankAccount => self.validate_bank_account(value),
            EntityType::RoutingCode => self.validate_routing_code(value),
            EntityType::Email => self.validate_email(value),
            EntityType::Url => self.validate_url(value),
            other => ValidationResult::new(
                other.clone(),
                value,
                true,
                false,
                0.5,
                "no authenticity rules for this entity type",
            ),
        }
    }

    /// Validate every value in an entity map. Derived batch operation; each
    /// value is judged independently.
    pub fn validate_all(
        &self,
        entities: &HashMap<EntityType, Vec<String>>,
    ) -> HashMap<EntityType, Vec<ValidationResult>> {
        entities
            .iter()
            .map(|(entity_type, values)| {
                let results = values.iter().map(|v| self.validate(entity_type, v)).collect();
                (entity_type.clone(), results)
            })
            .collect()
    }

    /// Split an entity map into (authentic, suspect) halves.
    pub fn partition(
        &self,
        entities: &HashMap<EntityType, Vec<String>>,
    ) -> (HashMap<EntityType, Vec<String>>, HashMap<EntityType, Vec<String>>) {
        let mut authentic: HashMap<EntityType, Vec<String>> = HashMap::new();
        let mut suspect: HashMap<EntityType, Vec<String>> = HashMap::new();

        for (entity_type, values) in entities {
            for value in values {
                let bucket = if self.validate(entity_type, value).is_authentic() {
                    &mut authentic
                } else {
                    &mut suspect
                };
                bucket.entry(entity_type.clone()).or_default().push(value.clone());
            }
        }

        (authentic, suspect)
    }

    fn validate_payment_handle(&self, value: &str) -> ValidationResult {
        let t = EntityType::PaymentHandle;
        let Some((_, provider)) = value.rsplit_once('@') else {
            return ValidationResult::new(t, value, false, true, 0.95, "missing @ separator");
        };

        for pattern in &self.fake_handle_patterns {
            if pattern.is_match(value) {
                return ValidationResult::new(
                    t,
                    value,
                    true,
                    true,
                    0.85,
                    format!("matches placeholder pattern {}", pattern.as_str()),
                );
            }
        }

        let provider = provider.to_lowercase();
        if !PAYMENT_PROVIDERS.contains(&provider.as_str()) {
            return ValidationResult::new(
                t,
                value,
                false,
                true,
                0.9,
                format!("unknown payment provider: {provider}"),
            );
        }

        ValidationResult::new(t, value, true, false, 0.8, "well-formed payment handle")
    }

    fn validate_phone(&self, value: &str) -> ValidationResult {
        let t = EntityType::Phone;
        let mut digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() == 12 && digits.starts_with("91") {
            digits = digits[2..].to_string();
        }

        if digits.len() != 10 {
            return ValidationResult::new(
                t,
                value,
                false,
                true,
                0.95,
                format!("wrong length: {} digits", digits.len()),
            );
        }
        if !digits.starts_with(['6', '7', '8', '9']) {
            return ValidationResult::new(t, value, false, true, 0.9, "invalid leading digit for a mobile number");
        }

        for pattern in &self.fake_phone_patterns {
            if pattern.is_match(&digits) {
                return ValidationResult::new(t, value, true, true, 0.9, "matches placeholder number");
            }
        }

        let unique = {
            let mut seen = [false; 10];
            for b in digits.bytes() {
                seen[(b - b'0') as usize] = true;
            }
            seen.iter().filter(|s| **s).count()
        };
        if unique <= 2 {
            return ValidationResult::new(t, value, true, true, 0.85, "too few unique digits");
        }

        ValidationResult::new(t, value, true, false, 0.75, "plausible mobile number")
    }

    fn validate_bank_account(&self, value: &str) -> ValidationResult {
        let t = EntityType::BankAccount;
        let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();

        if !(9..=18).contains(&digits.len()) {
            return ValidationResult::new(
                t,
                value,
                false,
                true,
                0.9,
                format!("wrong length: {} digits", digits.len()),
            );
        }

        let all_same = digits.bytes().all(|b| b == digits.as_bytes()[0]);
        let matches_fake = all_same || self.fake_account_patterns.iter().any(|p| p.is_match(&digits));
        if matches_fake {
            return ValidationResult::new(t, value, true, true, 0.9, "matches placeholder account pattern");
        }

        // Without issuer verification a digit run can only ever be "plausible".
        ValidationResult::new(t, value, true, false, 0.6, "plausible account number")
    }

    fn validate_routing_code(&self, value: &str) -> ValidationResult {
        let t = EntityType::RoutingCode;
        let upper = value.to_uppercase();

        let well_formed = self
            .routing_format
            .as_ref()
            .is_some_and(|re| re.is_match(&upper));
        if !well_formed {
            return ValidationResult::new(t, value, false, true, 0.95, "not in routing-code format");
        }

        let bank = &upper[..4];
        if KNOWN_BANK_PREFIXES.contains(&bank) {
            ValidationResult::new(t, value, true, false, 0.85, format!("known bank prefix: {bank}"))
        } else {
            ValidationResult::new(t, value, true, false, 0.7, "valid format, unrecognized bank prefix")
        }
    }

    fn validate_email(&self, value: &str) -> ValidationResult {
        let t = EntityType::Email;
        let well_formed = self
            .email_format
            .as_ref()
            .is_some_and(|re| re.is_match(value));
        if !well_formed {
            return ValidationResult::new(t, value, false, true, 0.95, "malformed address");
        }

        let domain = value.rsplit_once('@').map(|(_, d)| d.to_lowercase()).unwrap_or_default();
        if FAKE_EMAIL_DOMAINS.contains(&domain.as_str()) {
            return ValidationResult::new(
                t,
                value,
                true,
                true,
                0.9,
                format!("reserved example domain: {domain}"),
            );
        }

        ValidationResult::new(t, value, true, false, 0.75, "well-formed address")
    }

    fn validate_url(&self, value: &str) -> ValidationResult {
        let t = EntityType::Url;
        let lowered = value.to_lowercase();

        if lowered.contains("localhost")
            || lowered.contains("127.0.0.1")
            || lowered.contains("example.com")
        {
            return ValidationResult::new(t, value, true, true, 0.95, "loopback or example host");
        }

        for tld in [".tk", ".ml", ".ga", ".cf", ".gq"] {
            if lowered.trim_end_matches('/').ends_with(tld) {
                // Suspicious hosting is a detection signal, not a fake value.
                return ValidationResult::new(
                    t,
                    value,
                    true,
                    false,
                    0.7,
                    format!("abuse-prone TLD: {tld}"),
                );
            }
        }

        ValidationResult::new(t, value, true, false, 0.8, "plausible URL")
    }
}

impl Default for EntityValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(sources: &[&str], case_insensitive: bool) -> Vec<Regex> {
    sources
        .iter()
        .filter_map(|source| {
            let pattern = if case_insensitive {
                format!("(?i){source}")
            } else {
                source.to_string()
            };
            match Regex::new(&pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = *source, error = %e, "failed to compile validation pattern");
                    None
                }
            }
        })
        .collect()
}
