//! Conversation lifecycle state machine.
//!
//! Every engagement is tracked by a [`ConversationContext`] owned exclusively
//! by the [`StateMachine`]. Transitions follow a fixed table keyed by
//! `(state, trigger)`; a trigger with no edge from the current state is a
//! logged no-op, never an error. Mutations on one conversation are serialized
//! (the registry shard lock is held for the whole operation) while distinct
//! conversations proceed in parallel.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConversationError;
use crate::extract::EntityType;

/// Lifecycle states. `Terminated` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Initial,
    Normal,
    ScamSuspected,
    Engaged,
    Extracting,
    SafeTermination,
    Terminated,
}

impl ConversationState {
    pub fn is_terminal(self) -> bool {
        self == ConversationState::Terminated
    }

    pub fn label(self) -> &'static str {
        match self {
            ConversationState::Initial => "initial",
            ConversationState::Normal => "normal",
            ConversationState::ScamSuspected => "scam_suspected",
            ConversationState::Engaged => "engaged",
            ConversationState::Extracting => "extracting",
            ConversationState::SafeTermination => "safe_termination",
            ConversationState::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Transition triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    ScamDetected,
    ScamConfirmed,
    ScamCleared,
    IntelReceived,
    MaxTurnsReached,
    SafetyTriggered,
    ScammerDisengaged,
    UserTerminated,
}

impl Trigger {
    pub fn label(self) -> &'static str {
        match self {
            Trigger::ScamDetected => "scam_detected",
            Trigger::ScamConfirmed => "scam_confirmed",
            Trigger::ScamCleared => "scam_cleared",
            Trigger::IntelReceived => "intel_received",
            Trigger::MaxTurnsReached => "max_turns_reached",
            Trigger::SafetyTriggered => "safety_triggered",
            Trigger::ScammerDisengaged => "scammer_disengaged",
            Trigger::UserTerminated => "user_terminated",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Safety violations recorded against a conversation. Every kind fires
/// [`Trigger::SafetyTriggered`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyViolation {
    PaymentAttempted,
    PiiLeaked,
    PromptInjection,
}

impl SafetyViolation {
    pub fn label(self) -> &'static str {
        match self {
            SafetyViolation::PaymentAttempted => "payment_attempted",
            SafetyViolation::PiiLeaked => "pii_leaked",
            SafetyViolation::PromptInjection => "prompt_injection_detected",
        }
    }
}

/// The fixed transition table. `None` means the trigger has no edge from this
/// state; callers treat that as a no-op. Exhaustive over both enums.
fn next_state(state: ConversationState, trigger: Trigger) -> Option<ConversationState> {
    use ConversationState as S;
    use Trigger as T;

    match (state, trigger) {
        (S::Initial, T::ScamDetected) => Some(S::ScamSuspected),
        (S::Initial, T::ScamCleared) => Some(S::Normal),
        (S::Initial, T::SafetyTriggered) => Some(S::SafeTermination),

        (S::Normal, T::ScamDetected) => Some(S::ScamSuspected),
        (S::Normal, T::UserTerminated) => Some(S::Terminated),
        (S::Normal, T::SafetyTriggered) => Some(S::SafeTermination),

        (S::ScamSuspected, T::ScamConfirmed) => Some(S::Engaged),
        (S::ScamSuspected, T::ScamCleared) => Some(S::Normal),
        (S::ScamSuspected, T::SafetyTriggered) => Some(S::SafeTermination),

        (S::Engaged, T::IntelReceived) => Some(S::Extracting),
        (S::Engaged, T::MaxTurnsReached) => Some(S::SafeTermination),
        (S::Engaged, T::SafetyTriggered) => Some(S::SafeTermination),
        (S::Engaged, T::ScammerDisengaged) => Some(S::SafeTermination),

        (S::Extracting, T::MaxTurnsReached) => Some(S::SafeTermination),
        (S::Extracting, T::SafetyTriggered) => Some(S::SafeTermination),
        (S::Extracting, T::ScammerDisengaged) => Some(S::SafeTermination),

        (S::SafeTermination, T::UserTerminated) => Some(S::Terminated),

        _ => None,
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Scammer,
    Honeypot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    pub turn: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: ConversationState,
    pub to: ConversationState,
    pub trigger: Trigger,
    pub timestamp: DateTime<Utc>,
}

/// Full per-conversation state. Mutated only through [`StateMachine`]
/// operations; eviction is an external retention concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: String,
    pub state: ConversationState,
    pub turn_count: u32,
    pub risk_score: f32,
    pub persona_tag: Option<String>,
    pub actor_identifier: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub extracted_entities: HashMap<EntityType, Vec<String>>,
    pub intel_count: usize,
    pub messages: Vec<ConversationMessage>,
    pub state_history: Vec<TransitionRecord>,
    pub safety_violations: Vec<String>,
    pub is_terminated: bool,
    pub termination_reason: Option<String>,
}

impl ConversationContext {
    fn new(conversation_id: String, actor_identifier: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id,
            state: ConversationState::Initial,
            turn_count: 0,
            risk_score: 0.0,
            persona_tag: None,
            actor_identifier,
            started_at: now,
            last_activity: now,
            extracted_entities: HashMap::new(),
            intel_count: 0,
            messages: Vec::new(),
            state_history: Vec::new(),
            safety_violations: Vec::new(),
            is_terminated: false,
            termination_reason: None,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

/// Tuning knobs for the state machine.
#[derive(Debug, Clone)]
pub struct StateMachineConfig {
    /// Turn ceiling; the append reaching it fires `MaxTurnsReached` once.
    pub max_turns: u32,
    /// Above this score an `Initial` conversation is flagged suspect.
    pub suspect_threshold: f32,
    /// Above this score a suspected scam is confirmed and engaged.
    pub confirm_threshold: f32,
    /// Below this score a suspected scam is cleared back to normal chat.
    pub clear_threshold: f32,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            suspect_threshold: 0.7,
            confirm_threshold: 0.8,
            clear_threshold: 0.4,
        }
    }
}

/// Registry of conversation contexts plus the guarded transition logic.
pub struct StateMachine {
    config: StateMachineConfig,
    contexts: DashMap<String, ConversationContext>,
}

impl StateMachine {
    pub fn new(config: StateMachineConfig) -> Self {
        Self {
            config,
            contexts: DashMap::new(),
        }
    }

    /// Create a fresh context in `Initial`.
    pub fn create(
        &self,
        conversation_id: &str,
        actor_identifier: Option<String>,
    ) -> ConversationContext {
        let context = ConversationContext::new(conversation_id.to_string(), actor_identifier);
        self.contexts.insert(conversation_id.to_string(), context.clone());
        info!(conversation_id, "conversation context created");
        context
    }

    /// Snapshot of a context. Unknown ids fail; they are never silently created.
    pub fn get(&self, conversation_id: &str) -> Result<ConversationContext, ConversationError> {
        self.contexts
            .get(conversation_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| ConversationError::NotFound {
                conversation_id: conversation_id.to_string(),
            })
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.contexts.contains_key(conversation_id)
    }

    /// Restore a previously externalized context (e.g. loaded from the KV store).
    pub fn restore(&self, context: ConversationContext) {
        self.contexts.insert(context.conversation_id.clone(), context);
    }

    /// Snapshot every live context, for persistence sync.
    pub fn snapshot_all(&self) -> Vec<ConversationContext> {
        self.contexts.iter().map(|entry| entry.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Attach the persona tag chosen by the external persona collaborator.
    pub fn set_persona(
        &self,
        conversation_id: &str,
        persona_tag: &str,
    ) -> Result<(), ConversationError> {
        let mut entry = self.entry(conversation_id)?;
        entry.persona_tag = Some(persona_tag.to_string());
        Ok(())
    }

    /// Attempt a transition. Returns the (possibly unchanged) state.
    pub fn transition(
        &self,
        conversation_id: &str,
        trigger: Trigger,
    ) -> Result<ConversationState, ConversationError> {
        let mut entry = self.entry(conversation_id)?;
        apply_transition(&mut entry, trigger);
        Ok(entry.state)
    }

    /// Append a message and advance the turn counter. Fires `MaxTurnsReached`
    /// exactly once, on the append that reaches the ceiling.
    pub fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<u32, ConversationError> {
        let mut entry = self.entry(conversation_id)?;
        let turn = entry.turn_count;
        entry.messages.push(ConversationMessage {
            role,
            content: content.to_string(),
            turn,
            timestamp: Utc::now(),
        });
        entry.turn_count += 1;
        entry.last_activity = Utc::now();

        if entry.turn_count == self.config.max_turns {
            apply_transition(&mut entry, Trigger::MaxTurnsReached);
        }
        Ok(entry.turn_count)
    }

    /// Record an extracted identifier. Dedups by normalized value; returns
    /// whether the value was new. Fires `IntelReceived` only while `Engaged`.
    pub fn record_intel(
        &self,
        conversation_id: &str,
        entity_type: &EntityType,
        value: &str,
    ) -> Result<bool, ConversationError> {
        let mut entry = self.entry(conversation_id)?;
        let values = entry.extracted_entities.entry(entity_type.clone()).or_default();
        if values.iter().any(|v| v.as_str() == value) {
            return Ok(false);
        }
        values.push(value.to_string());
        entry.intel_count += 1;
        info!(
            conversation_id,
            entity_type = %entity_type,
            intel_count = entry.intel_count,
            "intel recorded"
        );

        if entry.state == ConversationState::Engaged {
            apply_transition(&mut entry, Trigger::IntelReceived);
        }
        Ok(true)
    }

    /// Update the risk score and apply the auto-transition policy: scores in
    /// the hysteresis band leave the state unchanged to avoid flapping.
    pub fn update_score(
        &self,
        conversation_id: &str,
        score: f32,
    ) -> Result<ConversationState, ConversationError> {
        let mut entry = self.entry(conversation_id)?;
        entry.risk_score = score.clamp(0.0, 1.0);

        match entry.state {
            ConversationState::Initial => {
                if entry.risk_score > self.config.suspect_threshold {
                    apply_transition(&mut entry, Trigger::ScamDetected);
                } else {
                    apply_transition(&mut entry, Trigger::ScamCleared);
                }
            }
            ConversationState::ScamSuspected => {
                if entry.risk_score > self.config.confirm_threshold {
                    apply_transition(&mut entry, Trigger::ScamConfirmed);
                } else if entry.risk_score < self.config.clear_threshold {
                    apply_transition(&mut entry, Trigger::ScamCleared);
                }
            }
            _ => {}
        }
        Ok(entry.state)
    }

    /// Record a safety violation; every violation kind fires `SafetyTriggered`.
    pub fn record_safety_violation(
        &self,
        conversation_id: &str,
        violation: SafetyViolation,
    ) -> Result<ConversationState, ConversationError> {
        let mut entry = self.entry(conversation_id)?;
        entry.safety_violations.push(violation.label().to_string());
        warn!(
            conversation_id,
            violation = violation.label(),
            total = entry.safety_violations.len(),
            "safety violation recorded"
        );
        apply_transition(&mut entry, Trigger::SafetyTriggered);
        Ok(entry.state)
    }

    pub fn max_turns(&self) -> u32 {
        self.config.max_turns
    }

    fn entry(
        &self,
        conversation_id: &str,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, ConversationContext>, ConversationError>
    {
        self.contexts
            .get_mut(conversation_id)
            .ok_or_else(|| ConversationError::NotFound {
                conversation_id: conversation_id.to_string(),
            })
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new(StateMachineConfig::default())
    }
}

/// Apply one trigger to a held context. Invalid transitions are logged no-ops.
fn apply_transition(context: &mut ConversationContext, trigger: Trigger) {
    let Some(to) = next_state(context.state, trigger) else {
        warn!(
            conversation_id = %context.conversation_id,
            state = %context.state,
            trigger = %trigger,
            "no transition edge, ignoring trigger"
        );
        return;
    };

    let from = context.state;
    context.state_history.push(TransitionRecord {
        from,
        to,
        trigger,
        timestamp: Utc::now(),
    });
    context.state = to;
    context.last_activity = Utc::now();

    if to == ConversationState::Terminated {
        context.is_terminated = true;
        context.termination_reason = Some(trigger.label().to_string());
    }

    info!(
        conversation_id = %context.conversation_id,
        from = %from,
        to = %to,
        trigger = %trigger,
        "state transition"
    );
}
