//! Ensemble risk scoring.
//!
//! Combines the in-process heuristic scan with the external classifier's
//! opinion into one calibrated score. The classifier is optional and fallible:
//! a failure downgrades confidence and annotates the result, it never aborts
//! the analysis. Every contributing signal and reason from either layer is
//! retained so the verdict stays explainable.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::ScamClassifier;
use crate::detect::{DetectionContext, HeuristicDetector};

/// Which layer produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Heuristic,
    ExternalClassifier,
}

/// A detection signal tagged with its originating layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSignal {
    pub source: SignalSource,
    pub signal_type: String,
    pub description: String,
    pub weight: f32,
    pub confidence: f32,
    pub matched_text: Option<String>,
}

/// Risk banding over the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// Final analysis verdict. Produced fresh per call; never persisted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleResult {
    pub scam_detected: bool,
    pub risk_score: f32,
    pub confidence: f32,
    pub risk_level: RiskLevel,
    pub scam_category: Option<String>,
    pub signals: Vec<RiskSignal>,
    pub reasons: Vec<String>,
    pub source_models: Vec<String>,
}

impl EnsembleResult {
    /// Reasons and model names dedup while preserving first-seen order.
    fn add_reason(&mut self, reason: &str) {
        if !self.reasons.iter().any(|r| r.as_str() == reason) {
            self.reasons.push(reason.to_string());
        }
    }

    fn add_model(&mut self, model: &str) {
        if !self.source_models.iter().any(|m| m.as_str() == model) {
            self.source_models.push(model.to_string());
        }
    }

    /// Render a human-readable explanation of this verdict.
    pub fn explain(&self, verbose: bool) -> String {
        let mut lines = Vec::new();

        if self.scam_detected {
            lines.push(format!("SCAM DETECTED (risk: {})", self.risk_level));
        } else {
            lines.push(format!("message appears safe (risk: {})", self.risk_level));
        }
        lines.push(format!(
            "risk score: {:.2} (confidence: {:.2})",
            self.risk_score, self.confidence
        ));

        if let Some(category) = &self.scam_category {
            lines.push(format!("category: {}", category.replace('_', " ")));
        }

        if !self.reasons.is_empty() {
            lines.push("reasons:".to_string());
            for (i, reason) in self.reasons.iter().take(5).enumerate() {
                lines.push(format!("  {}. {reason}", i + 1));
            }
        }

        if verbose && !self.signals.is_empty() {
            lines.push("signals:".to_string());
            for signal in &self.signals {
                let source = match signal.source {
                    SignalSource::Heuristic => "heuristic",
                    SignalSource::ExternalClassifier => "external",
                };
                lines.push(format!("  [{source}] {}: {}", signal.signal_type, signal.description));
                if let Some(text) = &signal.matched_text {
                    lines.push(format!("    matched: '{text}'"));
                }
            }
        }

        lines.push(format!("models: {}", self.source_models.join(", ")));
        lines.join("\n")
    }
}

/// Ensemble weighting. Fixed heuristics with no stated calibration basis —
/// kept tunable rather than reinterpreted.
#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    pub heuristic_weight: f32,
    pub external_weight: f32,
    /// Added when both layers agree (both above `agree_high` or below `agree_low`).
    pub agreement_bonus: f32,
    pub agree_high: f32,
    pub agree_low: f32,
    pub scam_threshold: f32,
    pub high_threshold: f32,
    pub critical_threshold: f32,
    /// Fixed conservative confidence when the external layer is unavailable.
    pub degraded_confidence: f32,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            heuristic_weight: 0.4,
            external_weight: 0.6,
            agreement_bonus: 0.1,
            agree_high: 0.5,
            agree_low: 0.3,
            scam_threshold: 0.7,
            high_threshold: 0.8,
            critical_threshold: 0.9,
            degraded_confidence: 0.6,
        }
    }
}

/// Combines the heuristic detector with the external classifier.
pub struct RiskEnsemble {
    config: EnsembleConfig,
    detector: HeuristicDetector,
    classifier: Option<Box<dyn ScamClassifier>>,
}

impl RiskEnsemble {
    pub fn new(
        config: EnsembleConfig,
        detector: HeuristicDetector,
        classifier: Option<Box<dyn ScamClassifier>>,
    ) -> Self {
        Self {
            config,
            detector,
            classifier,
        }
    }

    /// Analyze one message. The heuristic layer always runs; the external
    /// classifier runs when present and `use_external` is set.
    pub fn analyze(
        &self,
        message: &str,
        context: Option<&DetectionContext>,
        use_external: bool,
    ) -> EnsembleResult {
        let heuristic = self.detector.detect(message, context);

        let mut result = EnsembleResult {
            scam_detected: false,
            risk_score: 0.0,
            confidence: 0.0,
            risk_level: RiskLevel::Low,
            scam_category: None,
            signals: Vec::new(),
            reasons: Vec::new(),
            source_models: Vec::new(),
        };
        result.add_model("heuristic");

        for signal in &heuristic.signals {
            result.signals.push(RiskSignal {
                source: SignalSource::Heuristic,
                signal_type: signal.signal_type.clone(),
                description: signal.description.clone(),
                weight: signal.weight,
                confidence: signal.confidence,
                matched_text: signal.matched_text.clone(),
            });
            result.add_reason(&signal.description);
        }

        let external_score = if use_external {
            self.consult_classifier(message, context, &mut result)
        } else {
            None
        };

        match external_score {
            Some(external) => {
                let raw = heuristic.score * self.config.heuristic_weight
                    + external * self.config.external_weight;
                let agree = (heuristic.score > self.config.agree_high
                    && external > self.config.agree_high)
                    || (heuristic.score < self.config.agree_low
                        && external < self.config.agree_low);
                let bonus = if agree { self.config.agreement_bonus } else { 0.0 };

                result.risk_score = (raw + bonus).min(1.0);
                // Confidence degrades as the two layers disagree.
                result.confidence = (1.0 - (heuristic.score - external).abs() * 0.5).max(0.0);
            }
            None => {
                result.risk_score = heuristic.score;
                result.confidence = self.config.degraded_confidence;
                result.add_reason("analysis degraded: heuristic patterns only, external classifier unavailable");
            }
        }

        result.risk_level = self.risk_level(result.risk_score);
        result.scam_detected = result.risk_score >= self.config.scam_threshold;

        info!(
            scam_detected = result.scam_detected,
            risk_score = result.risk_score,
            risk_level = %result.risk_level,
            signal_count = result.signals.len(),
            "ensemble analysis complete"
        );
        result
    }

    /// Returns the external layer's score contribution, or `None` when the
    /// classifier is absent or failed (failure is recovered, never propagated).
    fn consult_classifier(
        &self,
        message: &str,
        context: Option<&DetectionContext>,
        result: &mut EnsembleResult,
    ) -> Option<f32> {
        let classifier = self.classifier.as_ref()?;

        match classifier.classify(message, context) {
            Ok(verdict) => {
                result.add_model(classifier.name());
                let score = if verdict.is_scam { verdict.confidence } else { 0.0 };

                if verdict.is_scam {
                    result.signals.push(RiskSignal {
                        source: SignalSource::ExternalClassifier,
                        signal_type: "classifier_verdict".into(),
                        description: format!("classifier verdict: {}", verdict.category),
                        weight: 0.8,
                        confidence: verdict.confidence,
                        matched_text: None,
                    });
                    result.scam_category = Some(verdict.category);
                    for reason in &verdict.reasons {
                        result.add_reason(reason);
                    }
                }
                Some(score)
            }
            Err(e) => {
                warn!(error = %e, "external classification failed, degrading to heuristic-only");
                None
            }
        }
    }

    fn risk_level(&self, score: f32) -> RiskLevel {
        if score >= self.config.critical_threshold {
            RiskLevel::Critical
        } else if score >= self.config.high_threshold {
            RiskLevel::High
        } else if score >= self.config.scam_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClassifierVerdict;
    use crate::error::ClientError;

    /// Stub classifier returning a fixed verdict.
    struct FixedClassifier(ClassifierVerdict);

    impl ScamClassifier for FixedClassifier {
        fn classify(
            &self,
            _message: &str,
            _context: Option<&DetectionContext>,
        ) -> Result<ClassifierVerdict, ClientError> {
            Ok(self.0.clone())
        }
    }

    /// Stub classifier that always fails.
    struct BrokenClassifier;

    impl ScamClassifier for BrokenClassifier {
        fn classify(
            &self,
            _message: &str,
            _context: Option<&DetectionContext>,
        ) -> Result<ClassifierVerdict, ClientError> {
            Err(ClientError::RequestFailed {
                message: "connection refused".into(),
            })
        }
    }

    fn ensemble_with(classifier: Option<Box<dyn ScamClassifier>>) -> RiskEnsemble {
        RiskEnsemble::new(EnsembleConfig::default(), HeuristicDetector::new(), classifier)
    }

    fn scam_verdict(confidence: f32) -> ClassifierVerdict {
        ClassifierVerdict {
            is_scam: true,
            confidence,
            category: "advance_fee".into(),
            reasons: vec!["demands an upfront fee".into()],
        }
    }

    const SCAM: &str = "You have won $1,000,000! Send $500 processing fee to claim@upi now!";

    #[test]
    fn both_layers_agree_high() {
        let ensemble = ensemble_with(Some(Box::new(FixedClassifier(scam_verdict(0.9)))));
        let result = ensemble.analyze(SCAM, None, true);

        assert!(result.scam_detected);
        assert!(result.risk_score >= 0.7);
        assert_eq!(result.scam_category.as_deref(), Some("advance_fee"));
        assert!(result.source_models.contains(&"external_classifier".to_string()));
        assert!(result
            .signals
            .iter()
            .any(|s| s.source == SignalSource::ExternalClassifier));
    }

    #[test]
    fn agreement_bonus_is_applied() {
        // Heuristic score for SCAM is ~0.54; external 0.9 → both above 0.5.
        let with_agreement = ensemble_with(Some(Box::new(FixedClassifier(scam_verdict(0.9)))));
        let result = with_agreement.analyze(SCAM, None, true);
        let heuristic = HeuristicDetector::new().detect(SCAM, None);
        let raw = heuristic.score * 0.4 + 0.9 * 0.6;
        assert!((result.risk_score - (raw + 0.1).min(1.0)).abs() < 1e-5);
    }

    #[test]
    fn confidence_decreases_with_disagreement() {
        let mut previous = f32::MAX;
        for external in [0.6f32, 0.8, 1.0] {
            let ensemble = ensemble_with(Some(Box::new(FixedClassifier(scam_verdict(external)))));
            // A clean message keeps the heuristic score at 0: |h - x| grows with x.
            let result = ensemble.analyze("hello there, see you at lunch", None, true);
            assert!(result.confidence < previous);
            previous = result.confidence;
        }
    }

    #[test]
    fn classifier_failure_degrades_gracefully() {
        let ensemble = ensemble_with(Some(Box::new(BrokenClassifier)));
        let result = ensemble.analyze(SCAM, None, true);

        assert_eq!(result.confidence, 0.6);
        assert!(result.reasons.iter().any(|r| r.contains("degraded")));
        assert_eq!(result.source_models, vec!["heuristic"]);
        // Heuristic layer still carries the verdict.
        assert!(result.risk_score > 0.5);
    }

    #[test]
    fn external_disabled_is_heuristic_only() {
        let ensemble = ensemble_with(Some(Box::new(FixedClassifier(scam_verdict(0.9)))));
        let result = ensemble.analyze(SCAM, None, false);
        assert_eq!(result.confidence, 0.6);
        assert_eq!(result.source_models, vec!["heuristic"]);
    }

    #[test]
    fn clean_message_with_agreeing_classifier() {
        let ensemble = ensemble_with(Some(Box::new(FixedClassifier(ClassifierVerdict {
            is_scam: false,
            confidence: 0.9,
            category: "benign".into(),
            reasons: vec![],
        }))));
        let result = ensemble.analyze("lunch tomorrow?", None, true);

        // Both layers at/near zero: agreement bonus on the low side.
        assert!(!result.scam_detected);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!((result.risk_score - 0.1).abs() < 1e-5);
        assert!(result.confidence > 0.9);
        assert!(result.scam_category.is_none());
    }

    #[test]
    fn risk_bands_follow_thresholds() {
        let ensemble = ensemble_with(None);
        assert_eq!(ensemble.risk_level(0.65), RiskLevel::Low);
        assert_eq!(ensemble.risk_level(0.75), RiskLevel::Medium);
        assert_eq!(ensemble.risk_level(0.85), RiskLevel::High);
        assert_eq!(ensemble.risk_level(0.95), RiskLevel::Critical);
    }

    #[test]
    fn reasons_are_deduplicated_in_order() {
        let ensemble = ensemble_with(None);
        // Three distinct urgency patterns share one description; it must
        // appear once even though each contributes its own signal.
        let result = ensemble.analyze("urgent! act fast! offer expires today!", None, false);
        let urgency_signals = result
            .signals
            .iter()
            .filter(|s| s.signal_type == "urgency")
            .count();
        assert!(urgency_signals >= 3);
        let mut seen = std::collections::HashSet::new();
        for reason in &result.reasons {
            assert!(seen.insert(reason.clone()), "duplicate reason: {reason}");
        }
    }

    #[test]
    fn explanation_mentions_score_and_models() {
        let ensemble = ensemble_with(Some(Box::new(FixedClassifier(scam_verdict(0.9)))));
        let result = ensemble.analyze(SCAM, None, true);
        let text = result.explain(true);
        assert!(text.contains("SCAM DETECTED"));
        assert!(text.contains("risk score"));
        assert!(text.contains("heuristic"));
    }
}
