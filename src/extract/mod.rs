//! Structured identifier extraction and authenticity screening.
//!
//! [`extractor::EntityExtractor`] pulls payment handles, phone numbers, account
//! numbers, routing codes, emails, URLs, and currency amounts out of free text.
//! [`validator::EntityValidator`] then scores each value for authenticity —
//! scammers routinely hand out placeholder or test identifiers, and only values
//! that pass the screen are worth registering in the identity graph.

pub mod extractor;
pub mod validator;

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use extractor::EntityExtractor;
pub use validator::{EntityValidator, ValidationResult};

/// Category of a structured identifier recovered from message text.
///
/// Serializes as its bare label so entity maps keyed by type stay plain JSON
/// objects in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityType {
    /// UPI-style payment handle (`name@provider`).
    PaymentHandle,
    /// Mobile phone number, canonicalized to its bare 10-digit national form.
    Phone,
    /// Bare 9–18 digit run shaped like a bank account number.
    BankAccount,
    /// Bank routing code (IFSC format: 4 letters, `0`, 6 alphanumerics).
    RoutingCode,
    Email,
    Url,
    /// Currency amount mention.
    Amount,
    /// Category this build does not know natively — carried through untouched
    /// so newer upstream extractors degrade gracefully.
    Other(String),
}

impl EntityType {
    /// Stable lower-snake label, used in logs and as the store key segment.
    pub fn label(&self) -> &str {
        match self {
            EntityType::PaymentHandle => "payment_handle",
            EntityType::Phone => "phone",
            EntityType::BankAccount => "bank_account",
            EntityType::RoutingCode => "routing_code",
            EntityType::Email => "email",
            EntityType::Url => "url",
            EntityType::Amount => "amount",
            EntityType::Other(name) => name,
        }
    }

    /// Inverse of [`EntityType::label`]; unknown labels land in `Other`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "payment_handle" => EntityType::PaymentHandle,
            "phone" => EntityType::Phone,
            "bank_account" => EntityType::BankAccount,
            "routing_code" => EntityType::RoutingCode,
            "email" => EntityType::Email,
            "url" => EntityType::Url,
            "amount" => EntityType::Amount,
            other => EntityType::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.label())
    }
}

impl Serialize for EntityType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for EntityType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(EntityType::from_label(&label))
    }
}

/// A single extracted identifier with its normalized value and source span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub entity_type: EntityType,
    /// Normalized value (see the per-type canonical forms on the extractor).
    pub value: String,
    pub confidence: f32,
    /// Byte range of the raw match in the input text.
    pub span: (usize, usize),
    /// The text as it appeared before normalization.
    pub raw_match: String,
}

/// All entities recovered from one piece of text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Normalized values grouped by type; unique within each type.
    pub entities: HashMap<EntityType, Vec<String>>,
    /// Every individual match, including duplicates of already-seen values.
    pub detailed: Vec<ExtractedEntity>,
    /// Mean per-match confidence, 0.0 when nothing was found.
    pub confidence: f32,
}

impl ExtractionResult {
    pub(crate) fn add(&mut self, entity: ExtractedEntity) {
        let values = self.entities.entry(entity.entity_type.clone()).or_default();
        if !values.contains(&entity.value) {
            values.push(entity.value.clone());
        }
        self.detailed.push(entity);
    }

    pub(crate) fn finish(&mut self) {
        if !self.detailed.is_empty() {
            self.confidence =
                self.detailed.iter().map(|e| e.confidence).sum::<f32>() / self.detailed.len() as f32;
        }
    }

    /// Total count of unique values across all types.
    pub fn entity_count(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.detailed.is_empty()
    }
}
