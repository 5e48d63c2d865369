//! Rich diagnostic error types for the gavial engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so operators know exactly
//! what went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the gavial engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum GavialError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Conversation(#[from] ConversationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Conversation state machine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConversationError {
    #[error("conversation not found: {conversation_id}")]
    #[diagnostic(
        code(gavial::conversation::not_found),
        help(
            "No conversation with this id exists in the state machine. \
             Conversations are created only by `start_engagement` — check the id, \
             or start a new engagement. Unknown ids are never silently created."
        )
    )]
    NotFound { conversation_id: String },
}

// ---------------------------------------------------------------------------
// External collaborator (classifier / generator) errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ClientError {
    #[error("collaborator is not available at {url}")]
    #[diagnostic(
        code(gavial::client::unavailable),
        help(
            "The external service is down or has failed repeatedly and been marked \
             unavailable. Analysis degrades to heuristic-only; call `probe()` once \
             the service is back to restore it."
        )
    )]
    Unavailable { url: String },

    #[error("collaborator request failed: {message}")]
    #[diagnostic(
        code(gavial::client::request_failed),
        help("Check that the service is running and reachable at the configured URL.")
    )]
    RequestFailed { message: String },

    #[error("failed to parse collaborator response: {message}")]
    #[diagnostic(
        code(gavial::client::parse_error),
        help("The service returned an unexpected response format.")
    )]
    ParseError { message: String },

    #[error("collaborator request timed out after {timeout_secs}s")]
    #[diagnostic(
        code(gavial::client::timeout),
        help("Increase the configured timeout or check service load.")
    )]
    Timeout { timeout_secs: u64 },
}

// ---------------------------------------------------------------------------
// Identity graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum IdentityError {
    #[error("actor not found: {actor_id}")]
    #[diagnostic(
        code(gavial::identity::actor_not_found),
        help(
            "The actor has never been registered in the identity graph. \
             Register at least one validated identifier for it first."
        )
    )]
    ActorNotFound { actor_id: String },
}

// ---------------------------------------------------------------------------
// Key-value store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("key not found: {key}")]
    #[diagnostic(
        code(gavial::store::not_found),
        help("The requested key does not exist in the store, or its TTL has expired.")
    )]
    NotFound { key: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(gavial::store::serde),
        help(
            "Failed to serialize or deserialize stored data. This usually means \
             the stored format has changed between versions — clear the affected keys."
        )
    )]
    Serialization { message: String },

    #[error("store backend error: {message}")]
    #[diagnostic(
        code(gavial::store::backend),
        help("The persistence backend reported a failure. Check its connectivity and logs.")
    )]
    Backend { message: String },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("kill switch is active: {reason}")]
    #[diagnostic(
        code(gavial::engine::kill_switch),
        help(
            "All new and continuing engagements are refused while the kill switch \
             is on. Deactivate it via the safety layer once the incident is resolved."
        )
    )]
    KillSwitchActive { reason: String },

    #[error("daily engagement limit reached: {count}/{limit}")]
    #[diagnostic(
        code(gavial::engine::daily_limit),
        help(
            "No new engagements are started once the rolling daily counter hits the \
             configured ceiling. The counter resets at the UTC day boundary; \
             raise `max_daily_engagements` in EngineConfig if the ceiling is too low."
        )
    )]
    DailyLimitReached { count: u32, limit: u32 },

    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(gavial::engine::invalid_config),
        help("Check the EngineConfig fields. {message}")
    )]
    InvalidConfig { message: String },
}

/// Convenience alias for functions returning gavial results.
pub type GavialResult<T> = std::result::Result<T, GavialError>;
