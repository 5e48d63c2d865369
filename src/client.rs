//! Clients for the external collaborators.
//!
//! Two narrow contracts are consumed over HTTP: a text **classifier** giving a
//! second opinion on scam likelihood, and a **response generator** producing
//! persona replies. Both are optional and fallible: every request carries a
//! timeout, transport failures retry with bounded exponential backoff, and a
//! client that keeps failing marks itself unavailable so callers route around
//! it instead of blocking. This core never inspects generator prompt
//! construction; it only consumes output text (which is screened separately).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::conversation::ConversationMessage;
use crate::detect::DetectionContext;
use crate::error::ClientError;

/// The external classifier's opinion on one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    pub is_scam: bool,
    pub confidence: f32,
    pub category: String,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Narrow interface to the external scam classifier.
pub trait ScamClassifier: Send + Sync {
    fn classify(
        &self,
        message: &str,
        context: Option<&DetectionContext>,
    ) -> Result<ClassifierVerdict, ClientError>;

    /// Stable name recorded in `EnsembleResult::source_models`.
    fn name(&self) -> &str {
        "external_classifier"
    }
}

/// Narrow interface to the external persona-reply generator.
pub trait ResponseGenerator: Send + Sync {
    fn generate(
        &self,
        history: &[ConversationMessage],
        persona_tag: &str,
        latest_message: &str,
    ) -> Result<String, ClientError>;
}

/// Configuration shared by both HTTP collaborator clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the service.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Extra attempts after the first failed request.
    pub max_retries: u32,
    /// Base backoff; doubles per retry.
    pub backoff_ms: u64,
    /// Consecutive failures before the client marks itself unavailable.
    pub failure_threshold: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8601".into(),
            timeout_secs: 30,
            max_retries: 2,
            backoff_ms: 250,
            failure_threshold: 3,
        }
    }
}

/// Shared availability tracking: consecutive failures trip the client into an
/// unavailable state until a probe or successful call restores it.
struct Availability {
    available: AtomicBool,
    consecutive_failures: AtomicU32,
}

impl Availability {
    fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.available.store(true, Ordering::SeqCst);
    }

    fn record_failure(&self, threshold: u32) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= threshold {
            self.available.store(false, Ordering::SeqCst);
            warn!(failures, "collaborator marked unavailable after repeated failures");
        }
    }
}

/// POST a JSON body with timeout, bounded retry, and exponential backoff.
fn post_json(
    config: &ClientConfig,
    path: &str,
    body: &serde_json::Value,
) -> Result<serde_json::Value, ClientError> {
    let url = format!("{}{path}", config.base_url);
    let agent = ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build();

    let body_str = serde_json::to_string(body).map_err(|e| ClientError::RequestFailed {
        message: format!("JSON serialize error: {e}"),
    })?;

    let mut last_err = None;
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.backoff_ms.saturating_mul(1 << (attempt - 1));
            std::thread::sleep(Duration::from_millis(backoff));
        }

        match agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body_str)
        {
            Ok(resp) => {
                let text = resp.into_string().map_err(|e| ClientError::ParseError {
                    message: e.to_string(),
                })?;
                return serde_json::from_str(&text).map_err(|e| ClientError::ParseError {
                    message: e.to_string(),
                });
            }
            Err(ureq::Error::Status(code, _)) => {
                // Server answered; a status error will not improve on retry.
                return Err(ClientError::RequestFailed {
                    message: format!("server returned status {code}"),
                });
            }
            Err(e) => {
                debug!(attempt, error = %e, url = %url, "collaborator request failed");
                last_err = Some(e);
            }
        }
    }

    let err = last_err.map(|e| e.to_string()).unwrap_or_default();
    if err.contains("timed out") {
        Err(ClientError::Timeout {
            timeout_secs: config.timeout_secs,
        })
    } else {
        Err(ClientError::RequestFailed { message: err })
    }
}

/// HTTP client for the external scam classifier.
pub struct HttpClassifier {
    config: ClientConfig,
    availability: Availability,
}

impl HttpClassifier {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            availability: Availability::new(),
        }
    }

    /// Lightweight health check; restores an unavailable client on success.
    pub fn probe(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(5))
            .build();

        match agent.get(&url).call() {
            Ok(resp) if resp.status() == 200 => {
                self.availability.record_success();
                true
            }
            _ => {
                self.availability
                    .record_failure(self.config.failure_threshold);
                false
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.availability.is_available()
    }
}

impl ScamClassifier for HttpClassifier {
    fn classify(
        &self,
        message: &str,
        context: Option<&DetectionContext>,
    ) -> Result<ClassifierVerdict, ClientError> {
        if !self.availability.is_available() {
            return Err(ClientError::Unavailable {
                url: self.config.base_url.clone(),
            });
        }

        let body = serde_json::json!({
            "message": message,
            "context": {
                "is_unknown_sender": context.map(|c| c.is_unknown_sender).unwrap_or(false),
                "is_first_message": context.map(|c| c.is_first_message).unwrap_or(false),
            },
        });

        match post_json(&self.config, "/v1/classify", &body) {
            Ok(json) => {
                let verdict = ClassifierVerdict {
                    is_scam: json["is_scam"].as_bool().unwrap_or(false),
                    confidence: json["confidence"].as_f64().unwrap_or(0.0) as f32,
                    category: json["category"].as_str().unwrap_or("unknown").to_string(),
                    reasons: json["reasons"]
                        .as_array()
                        .map(|arr| {
                            arr.iter()
                                .filter_map(|r| r.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default(),
                };
                self.availability.record_success();
                Ok(verdict)
            }
            Err(e) => {
                self.availability
                    .record_failure(self.config.failure_threshold);
                Err(e)
            }
        }
    }
}

/// HTTP client for the external reply generator.
pub struct HttpGenerator {
    config: ClientConfig,
    availability: Availability,
}

impl HttpGenerator {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            availability: Availability::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.availability.is_available()
    }
}

impl ResponseGenerator for HttpGenerator {
    fn generate(
        &self,
        history: &[ConversationMessage],
        persona_tag: &str,
        latest_message: &str,
    ) -> Result<String, ClientError> {
        if !self.availability.is_available() {
            return Err(ClientError::Unavailable {
                url: self.config.base_url.clone(),
            });
        }

        let turns: Vec<serde_json::Value> = history
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role,
                    "content": m.content,
                })
            })
            .collect();

        let body = serde_json::json!({
            "history": turns,
            "persona": persona_tag,
            "latest_message": latest_message,
        });

        match post_json(&self.config, "/v1/generate", &body) {
            Ok(json) => match json["response"].as_str() {
                Some(text) => {
                    self.availability.record_success();
                    Ok(text.to_string())
                }
                None => {
                    self.availability
                        .record_failure(self.config.failure_threshold);
                    Err(ClientError::ParseError {
                        message: "missing 'response' field".into(),
                    })
                }
            },
            Err(e) => {
                self.availability
                    .record_failure(self.config.failure_threshold);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for HttpClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClassifier")
            .field("base_url", &self.config.base_url)
            .field("available", &self.is_available())
            .finish()
    }
}

impl std::fmt::Debug for HttpGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGenerator")
            .field("base_url", &self.config.base_url)
            .field("available", &self.is_available())
            .finish()
    }
}
