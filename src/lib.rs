//! # gavial
//!
//! A scam-engagement honeypot core: decides per inbound message whether a
//! conversation is a scam, how to safely keep the sender talking long enough
//! to extract identifying intelligence, and whether multiple conversations
//! trace back to one coordinated actor.
//!
//! ## Architecture
//!
//! - **Heuristic detection** (`detect`): weighted pattern scan with explainable signals
//! - **Intel extraction** (`extract`): typed identifier extraction + authenticity screening
//! - **Ensemble scoring** (`ensemble`): heuristic layer combined with an external classifier
//! - **Lifecycle FSM** (`conversation`): guarded per-conversation state machine
//! - **Guardrails** (`safety`): input/output screens, engagement limits, kill switch
//! - **Identity graph** (`identity`): union-find clustering of actors by reused identifiers
//! - **Collaborator clients** (`client`): timeout/retry HTTP contracts for classifier & generator
//! - **Persistence** (`store`): pluggable key-value contract for state externalization
//!
//! ## Library usage
//!
//! ```no_run
//! use gavial::engine::{Engine, EngineConfig};
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let turn = engine
//!     .start_engagement("You won a prize! Send the fee to claim@upi now!", Some("+91-9876501234"))
//!     .unwrap();
//! println!("{} -> {}", turn.state, turn.response);
//! ```

pub mod client;
pub mod conversation;
pub mod detect;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod extract;
pub mod identity;
pub mod safety;
pub mod store;
