use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::session::Session;

use super::types::{DelegatedCallDetails, InteractionOutcome};

/// One outstanding delegation. Exists only while the interaction is in
/// flight; nothing here survives a process restart.
pub struct PendingRecord {
    pub interaction_id: String,
    pub original_tool_name: String,
    pub original_tool_args: Value,
    pub session: Session,
    pub details: DelegatedCallDetails,
    pub created_at: Instant,
    responders: Vec<oneshot::Sender<InteractionOutcome>>,
}

/// Process-wide map from interaction id to pending record.
///
/// Lifecycle invariant: each id is inserted exactly once and removed exactly
/// once — by fulfillment, rejection, or expiry. Removal happens through
/// [`InteractionRegistry::take`] or [`InteractionRegistry::reap_expired`], so
/// resolution is single-shot by construction: a second callback for the same
/// id finds nothing.
#[derive(Default)]
pub struct InteractionRegistry {
    records: Mutex<HashMap<String, PendingRecord>>,
}

impl InteractionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh record and return the original caller's continuation.
    /// Must be called *before* the directive dispatch is scheduled, so an
    /// unusually fast agent callback cannot arrive ahead of the record.
    pub fn insert(
        &self,
        interaction_id: impl Into<String>,
        original_tool_name: impl Into<String>,
        original_tool_args: Value,
        session: Session,
        details: DelegatedCallDetails,
    ) -> anyhow::Result<oneshot::Receiver<InteractionOutcome>> {
        let interaction_id = interaction_id.into();
        let (tx, rx) = oneshot::channel();
        let record = PendingRecord {
            interaction_id: interaction_id.clone(),
            original_tool_name: original_tool_name.into(),
            original_tool_args,
            session,
            details,
            created_at: Instant::now(),
            responders: vec![tx],
        };

        let mut records = self.records.lock().expect("interaction registry poisoned");
        if records.contains_key(&interaction_id) {
            anyhow::bail!("Interaction id '{}' is already pending", interaction_id);
        }
        records.insert(interaction_id, record);
        Ok(rx)
    }

    /// Attach an additional observer to a pending interaction. Observers get
    /// a clone of the terminal outcome; a missing id means the interaction
    /// already finished (or never existed).
    pub fn subscribe(
        &self,
        interaction_id: &str,
    ) -> Option<oneshot::Receiver<InteractionOutcome>> {
        let mut records = self.records.lock().expect("interaction registry poisoned");
        let record = records.get_mut(interaction_id)?;
        let (tx, rx) = oneshot::channel();
        record.responders.push(tx);
        Some(rx)
    }

    /// Atomically remove a record. The agent-callback path and the reaper
    /// both go through here, so exactly one of them wins.
    pub fn take(&self, interaction_id: &str) -> Option<PendingRecord> {
        self.records
            .lock()
            .expect("interaction registry poisoned")
            .remove(interaction_id)
    }

    /// Remove and return every record older than `ttl`.
    pub fn reap_expired(&self, ttl: Duration) -> Vec<PendingRecord> {
        let mut records = self.records.lock().expect("interaction registry poisoned");
        let expired_ids: Vec<String> = records
            .iter()
            .filter(|(_, record)| record.created_at.elapsed() >= ttl)
            .map(|(id, _)| id.clone())
            .collect();
        expired_ids
            .into_iter()
            .filter_map(|id| records.remove(&id))
            .collect()
    }

    /// Deliver the terminal outcome to everyone holding a continuation for
    /// this record. Consumes the record; combined with [`take`] this is the
    /// single-shot resolution point.
    pub fn finish(&self, record: PendingRecord, outcome: InteractionOutcome) {
        match &outcome {
            Ok(_) => debug!(
                interaction_id = %record.interaction_id,
                tool = %record.original_tool_name,
                "Interaction resolved"
            ),
            Err(e) => warn!(
                interaction_id = %record.interaction_id,
                tool = %record.original_tool_name,
                code = e.code.as_str(),
                "Interaction rejected: {}",
                e.message
            ),
        }
        for responder in record.responders {
            // A dropped receiver just means nobody was listening.
            let _ = responder.send(outcome.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .expect("interaction registry poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
