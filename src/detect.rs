//! Heuristic scam detection.
//!
//! Fast weighted pattern scan over an inbound message: categorized pattern
//! families (urgency, payment, prize, impersonation, threats, data requests,
//! links) plus free-form heuristics (capitalization, punctuation density,
//! short-message-with-link, embedded phone numbers). Produces a 0–1 suspicion
//! score with explainable per-signal evidence.
//!
//! The score is the *average* matched-signal strength — one strong match does
//! not saturate it, but many weak matches can. Pure with respect to stored
//! state; all patterns compile once at construction.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Recognized message-context flags that adjust scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionContext {
    /// Sender has never been seen before; all signal weights boost 1.2×.
    pub is_unknown_sender: bool,
    /// First message of a conversation; payment requests here add an extra signal.
    pub is_first_message: bool,
}

/// One piece of evidence contributing to the suspicion score. Immutable once
/// emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSignal {
    pub signal_type: String,
    pub description: String,
    /// Signal weight in [0, 1].
    pub weight: f32,
    pub matched_text: Option<String>,
    /// Match confidence in [0, 1]; grows with repeated matches.
    pub confidence: f32,
}

/// Outcome of one heuristic scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Average matched-signal strength, clamped to [0, 1].
    pub score: f32,
    pub signals: Vec<DetectionSignal>,
    pub is_suspicious: bool,
}

impl DetectionResult {
    const SUSPICION_THRESHOLD: f32 = 0.3;

    fn push(&mut self, signal: DetectionSignal) {
        self.signals.push(signal);
        self.recalculate();
    }

    fn recalculate(&mut self) {
        if self.signals.is_empty() {
            self.score = 0.0;
            self.is_suspicious = false;
            return;
        }
        let total: f32 = self.signals.iter().map(|s| s.weight * s.confidence).sum();
        self.score = (total / self.signals.len() as f32).min(1.0);
        self.is_suspicious = self.score > Self::SUSPICION_THRESHOLD;
    }
}

struct CompiledPattern {
    regex: Regex,
    category: &'static str,
    signal_type: &'static str,
    weight: f32,
}

/// Category-specific pattern table: (pattern, signal type, weight).
type PatternFamily = (&'static str, &'static [(&'static str, &'static str, f32)]);

const PATTERN_FAMILIES: &[PatternFamily] = &[
    (
        "urgency",
        &[
            (r"\b(urgent|immediately|right now|act now|hurry|asap|limited time)\b", "urgency", 0.4),
            (r"\b(last chance|final notice|expires? today|deadline)\b", "urgency", 0.5),
            (r"\b(don'?t wait|don'?t delay|time sensitive|act fast)\b", "urgency", 0.4),
            (r"\bwithin \d+ (hours?|minutes?)\b", "urgency", 0.5),
            (r"\b(send|pay|claim|transfer)\b[^.?!]*\bnow\b", "urgency", 0.4),
        ],
    ),
    (
        "financial",
        &[
            (r"\b(send money|transfer funds?|wire transfer|payment required)\b", "payment_request", 0.7),
            (r"\b(bank account|account number|routing number)\b", "financial_info_request", 0.6),
            (r"\b(upi|@paytm|@phonepe|@upi|@ybl|@oksbi|@okicici)\b", "payment_handle_mention", 0.5),
            (r"\b(pay now|pay immediately|make payment|send \$?\d+)\b", "payment_request", 0.7),
            (r"\b(processing fee|advance fee|registration fee|clearance fee)\b", "fee_request", 0.8),
            (r"\b(gift cards?|itunes|google play cards?|amazon cards?)\b", "gift_card_request", 0.9),
        ],
    ),
    (
        "prize",
        &[
            (r"\b(you'?ve won|you have won|winner|congratulations)\b", "prize_claim", 0.6),
            (r"\b(lottery|jackpot|prize money|cash prize)\b", "lottery_scam", 0.8),
            (r"\b(million dollars?|lakh rupees?|crore rupees?)\b", "large_amount", 0.5),
            (r"\b(selected|chosen|lucky winner|random selection)\b", "prize_claim", 0.5),
        ],
    ),
    (
        "impersonation",
        &[
            (r"\b(income tax|it department|irs|tax authority)\b", "tax_impersonation", 0.7),
            (r"\b(rbi|reserve bank|central bank)\b", "bank_impersonation", 0.7),
            (r"\b(police|cyber cell|crime branch|fbi|cia)\b", "authority_impersonation", 0.6),
            (r"\b(microsoft|apple|google|amazon) (support|team|security)\b", "tech_impersonation", 0.7),
            (r"\b(customer care|helpdesk|technical support)\b", "support_impersonation", 0.4),
        ],
    ),
    (
        "threat",
        &[
            (r"\b(arrest|legal action|police complaint|case filed)\b", "threat", 0.7),
            (r"\b(account (blocked|suspended|frozen)|access denied)\b", "threat", 0.6),
            (r"\b(warrant|summons|court order)\b", "legal_threat", 0.8),
            (r"\b(penalty|fine of|charged with)\b", "threat", 0.5),
        ],
    ),
    (
        "info_request",
        &[
            (r"\b(otp|one time password|verification code)\b", "otp_request", 0.8),
            (r"\b(cvv|card number|expiry date|pin number)\b", "card_info_request", 0.9),
            (r"\b(aadhaar|pan card|passport number|ssn)\b", "id_request", 0.7),
            (r"\b(password|login credentials|username)\b", "credential_request", 0.8),
        ],
    ),
    (
        "link",
        &[
            (r"bit\.ly/\w+", "shortened_link", 0.4),
            (r"tinyurl\.com/\w+", "shortened_link", 0.4),
            (r"\b(click here|click this link|click below)\b", "click_bait", 0.3),
            (r"https?://\S+\.(tk|ml|ga|cf|gq)\b", "suspicious_tld", 0.6),
        ],
    ),
];

/// Weighted pattern/keyword scanner.
pub struct HeuristicDetector {
    patterns: Vec<CompiledPattern>,
    phone_pattern: Option<Regex>,
}

impl HeuristicDetector {
    pub fn new() -> Self {
        let mut patterns = Vec::new();
        for &(category, family) in PATTERN_FAMILIES {
            for &(source, signal_type, weight) in family {
                match Regex::new(&format!("(?i){source}")) {
                    Ok(regex) => patterns.push(CompiledPattern {
                        regex,
                        category,
                        signal_type,
                        weight,
                    }),
                    Err(e) => warn!(pattern = source, error = %e, "failed to compile detection pattern"),
                }
            }
        }

        Self {
            patterns,
            phone_pattern: Regex::new(r"(\+91[-\s]?)?[6-9]\d{9}").ok(),
        }
    }

    /// Scan a message for scam indicators.
    pub fn detect(&self, message: &str, context: Option<&DetectionContext>) -> DetectionResult {
        let mut result = DetectionResult::default();
        let trimmed = message.trim();

        for pattern in &self.patterns {
            let match_count = pattern.regex.find_iter(trimmed).count();
            if match_count == 0 {
                continue;
            }
            let matched_text = pattern
                .regex
                .find(trimmed)
                .map(|m| m.as_str().to_string());
            result.push(DetectionSignal {
                signal_type: pattern.signal_type.to_string(),
                description: format!(
                    "{}: {}",
                    pattern.category,
                    pattern.signal_type.replace('_', " ")
                ),
                weight: pattern.weight,
                matched_text,
                confidence: signal_confidence(match_count),
            });
        }

        self.check_heuristics(trimmed, &mut result);

        if let Some(context) = context {
            self.apply_context(context, &mut result);
        }

        debug!(
            score = result.score,
            signal_count = result.signals.len(),
            is_suspicious = result.is_suspicious,
            "heuristic scan complete"
        );
        result
    }

    /// Free-form heuristics that plain keyword patterns miss.
    fn check_heuristics(&self, message: &str, result: &mut DetectionResult) {
        let caps_words: Vec<&str> = message
            .split_whitespace()
            .filter(|w| w.len() > 2 && w.chars().any(|c| c.is_alphabetic()))
            .filter(|w| w.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase()))
            .collect();
        if caps_words.len() > 3 {
            result.push(DetectionSignal {
                signal_type: "excessive_caps".into(),
                description: "excessive use of capital letters".into(),
                weight: 0.3,
                matched_text: Some(caps_words[..3].join(" ")),
                confidence: 0.7,
            });
        }

        let exclamations = message.chars().filter(|c| *c == '!').count();
        if exclamations > 3 {
            result.push(DetectionSignal {
                signal_type: "excessive_punctuation".into(),
                description: "excessive exclamation marks".into(),
                weight: 0.2,
                matched_text: Some(format!("{exclamations} exclamation marks")),
                confidence: 0.6,
            });
        }

        let lowered = message.to_lowercase();
        if message.len() < 50 && (lowered.contains("http") || lowered.contains("www")) {
            result.push(DetectionSignal {
                signal_type: "short_with_link".into(),
                description: "short message carrying a link".into(),
                weight: 0.4,
                matched_text: None,
                confidence: 0.5,
            });
        }

        if let Some(m) = self.phone_pattern.as_ref().and_then(|re| re.find(message)) {
            result.push(DetectionSignal {
                signal_type: "phone_number".into(),
                description: "embedded phone number".into(),
                // A phone number alone is not suspicious; it corroborates other signals.
                weight: 0.2,
                matched_text: Some(m.as_str().to_string()),
                confidence: 0.9,
            });
        }
    }

    fn apply_context(&self, context: &DetectionContext, result: &mut DetectionResult) {
        if context.is_unknown_sender {
            for signal in &mut result.signals {
                signal.weight = (signal.weight * 1.2).min(1.0);
            }
            result.recalculate();
        }

        if context.is_first_message {
            let has_payment_ask = result
                .signals
                .iter()
                .any(|s| s.signal_type.contains("payment") || s.signal_type.contains("fee"));
            if has_payment_ask {
                result.push(DetectionSignal {
                    signal_type: "first_message_payment".into(),
                    description: "payment request in the very first message".into(),
                    weight: 0.4,
                    matched_text: None,
                    confidence: 0.8,
                });
            }
        }
    }
}

impl Default for HeuristicDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn signal_confidence(match_count: usize) -> f32 {
    (0.85 + 0.05 * match_count as f32).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_signal(result: &DetectionResult, signal_type: &str) -> bool {
        result.signals.iter().any(|s| s.signal_type == signal_type)
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let detector = HeuristicDetector::new();
        let loaded = "URGENT!!!! Act now! You have won the lottery jackpot! Pay now, send $500 \
                      processing fee via gift cards to claim@upi, share your OTP and CVV!!!";
        let result = detector.detect(loaded, None);
        assert!(result.score >= 0.0 && result.score <= 1.0);
        assert!(result.is_suspicious);

        let clean = detector.detect("see you at lunch", None);
        assert_eq!(clean.score, 0.0);
        assert!(!clean.is_suspicious);
    }

    #[test]
    fn prize_fee_urgency_message_scores_high() {
        let detector = HeuristicDetector::new();
        let result = detector.detect(
            "You have won $1,000,000! Send $500 processing fee to claim@upi now!",
            None,
        );
        assert!(has_signal(&result, "prize_claim"));
        assert!(has_signal(&result, "fee_request"));
        assert!(has_signal(&result, "urgency"));
        assert!(result.score > 0.5, "score was {}", result.score);
        assert!(result.is_suspicious);
    }

    #[test]
    fn urgency_language_detected() {
        let detector = HeuristicDetector::new();
        let result = detector.detect("Act now! This offer expires today. Don't wait!", None);
        assert!(result.is_suspicious);
        assert!(has_signal(&result, "urgency"));
    }

    #[test]
    fn authority_impersonation_detected() {
        let detector = HeuristicDetector::new();
        let result = detector.detect(
            "This is the income tax department. A case filed against you, pay the penalty.",
            None,
        );
        assert!(has_signal(&result, "tax_impersonation"));
        assert!(has_signal(&result, "threat"));
        assert!(result.is_suspicious);
    }

    #[test]
    fn sensitive_data_request_detected() {
        let detector = HeuristicDetector::new();
        let result = detector.detect("Please share your OTP and CVV for verification.", None);
        assert!(has_signal(&result, "otp_request"));
        assert!(has_signal(&result, "card_info_request"));
    }

    #[test]
    fn excessive_caps_detected_on_original_casing() {
        let detector = HeuristicDetector::new();
        let result = detector.detect("YOU WON BIG MONEY TODAY friend", None);
        assert!(has_signal(&result, "excessive_caps"));
    }

    #[test]
    fn short_message_with_link_detected() {
        let detector = HeuristicDetector::new();
        let result = detector.detect("check https://bit.ly/x9z", None);
        assert!(has_signal(&result, "short_with_link"));
        assert!(has_signal(&result, "shortened_link"));
    }

    #[test]
    fn repeated_matches_raise_confidence() {
        let detector = HeuristicDetector::new();
        let once = detector.detect("this is urgent", None);
        let thrice = detector.detect("urgent urgent urgent", None);
        let conf_once = once.signals[0].confidence;
        let conf_thrice = thrice.signals[0].confidence;
        assert!(conf_thrice > conf_once);
    }

    #[test]
    fn unknown_sender_boosts_score() {
        let detector = HeuristicDetector::new();
        let message = "Your bank account will be suspended, pay the penalty";
        let plain = detector.detect(message, None);
        let boosted = detector.detect(
            message,
            Some(&DetectionContext {
                is_unknown_sender: true,
                ..Default::default()
            }),
        );
        assert!(boosted.score > plain.score);
        // Boosted weights still respect the unit interval.
        assert!(boosted.signals.iter().all(|s| s.weight <= 1.0));
    }

    #[test]
    fn first_message_payment_adds_signal() {
        let detector = HeuristicDetector::new();
        let result = detector.detect(
            "Please pay the processing fee immediately.",
            Some(&DetectionContext {
                is_first_message: true,
                ..Default::default()
            }),
        );
        assert!(has_signal(&result, "first_message_payment"));
        assert!(result.is_suspicious);
    }

    #[test]
    fn plain_greeting_is_clean() {
        let detector = HeuristicDetector::new();
        let result = detector.detect("Hello, how are you? Want to meet for coffee?", None);
        assert!(!result.is_suspicious);
        assert!(result.signals.is_empty());
    }
}
