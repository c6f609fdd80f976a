//! The interaction manager: pending-record registry, delegation signal
//! types, and the TTL reaper.

mod reaper;
mod registry;
mod types;

pub use reaper::spawn_reaper;
pub use registry::{InteractionRegistry, PendingRecord};
pub use types::{
    delegation_signal, detect_delegation_signal, DelegatedCallDetails, DelegationResult,
    InteractionOutcome, PendingInteraction, PENDING_INTERACTION_TYPE, PENDING_INTERACTION_URI,
};
