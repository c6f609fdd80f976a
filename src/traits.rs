//! Shared domain types + core interfaces (traits) used across the codebase.
//!
//! Kept as a thin re-export layer so `crate::traits::*` stays stable for
//! call sites while the individual areas evolve independently.

mod provider;
mod tools;

pub use provider::{
    ChatMessage, DelegationToken, LlmCompletion, LlmOutcome, LlmProvider, LlmRequest, ServiceType,
};
pub use tools::{Tool, ToolContext};
