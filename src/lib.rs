//! Revenue copilot: an intent-routed conversation orchestrator for sales
//! teams.
//!
//! Inbound messages are classified into one of seven intents and dispatched
//! to a retrieval-augmented knowledge agent or a dealflow agent handling
//! lead capture, proposal copy, next-step scheduling, and deal status
//! updates. An effects ledger keyed by request id keeps side effects
//! exactly-once across webhook retries.

pub mod api;
pub mod config;
pub mod dealflow;
pub mod error;
pub mod intent;
pub mod knowledge;
pub mod llm;
pub mod router;
pub mod schedule;
pub mod store;

pub use error::{Error, Result};
