use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::DelegationConfig;
use crate::error::ProtocolError;

use super::registry::InteractionRegistry;

/// Background task that expires pending interactions past their TTL.
/// Expired records are rejected with `ERR_INTERACTION_TIMEOUT`, which is the
/// only timeout in the delegation path; the agent side is never cancelled.
pub fn spawn_reaper(
    registry: Arc<InteractionRegistry>,
    config: &DelegationConfig,
) -> JoinHandle<()> {
    let ttl = Duration::from_millis(config.ttl_ms);
    let tick = Duration::from_millis(config.reap_interval_ms.max(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        // The first tick fires immediately; skip it so a freshly inserted
        // record is never examined at t=0.
        interval.tick().await;
        loop {
            interval.tick().await;
            for record in registry.reap_expired(ttl) {
                warn!(
                    interaction_id = %record.interaction_id,
                    tool = %record.original_tool_name,
                    age_secs = record.created_at.elapsed().as_secs(),
                    "Reaping expired interaction"
                );
                let err = ProtocolError::timeout(&record.interaction_id);
                registry.finish(record, Err(err));
            }
        }
    })
}
