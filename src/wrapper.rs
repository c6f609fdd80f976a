use std::sync::{Arc, OnceLock};

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::broker::BROKER_TOOL_NAME;
use crate::error::ProtocolError;
use crate::interaction::{
    detect_delegation_signal, DelegationResult, InteractionRegistry, PendingInteraction,
};
use crate::savers::{SaveInput, SaverRegistry};
use crate::session::Session;
use crate::traits::{Tool, ToolContext};
use crate::utils::truncate_str;

/// Interposes on every tool invocation.
///
/// Outbound: when a tool's result carries the delegation signal, the wrapper
/// registers a pending record, schedules the directive dispatch in the
/// background, and returns the tool's result to the caller unchanged.
///
/// Inbound: when the broker tool yields an agent completion envelope, the
/// wrapper correlates it to the pending record, resolves it, fires the
/// command's post-processor, and acknowledges the agent. The ack never waits
/// on post-processing — persistence has its own failure domain.
pub struct ToolWrapper {
    registry: Arc<InteractionRegistry>,
    savers: Arc<SaverRegistry>,
    default_tag: String,
    /// Set when the broker registers on the channel; looked up lazily at
    /// dispatch time so a missing broker rejects the record instead of the
    /// registration order dictating behavior.
    broker: OnceLock<Arc<dyn Tool>>,
}

impl ToolWrapper {
    pub fn new(
        registry: Arc<InteractionRegistry>,
        savers: Arc<SaverRegistry>,
        default_tag: String,
    ) -> Self {
        Self {
            registry,
            savers,
            default_tag,
            broker: OnceLock::new(),
        }
    }

    pub fn set_broker(&self, broker: Arc<dyn Tool>) {
        let _ = self.broker.set(broker);
    }

    pub async fn run(
        &self,
        tool: Arc<dyn Tool>,
        args: Value,
        ctx: &ToolContext,
    ) -> anyhow::Result<Value> {
        let result = tool.call(args.clone(), ctx).await?;

        if let Some(pending) = detect_delegation_signal(&result) {
            return self.handle_delegation(tool.name(), args, ctx, pending, result);
        }

        if tool.name() == BROKER_TOOL_NAME
            && result.get("toolResponseSource").and_then(|v| v.as_str())
                == Some("agent_to_taskmaster")
        {
            return Ok(self.handle_agent_callback(&result));
        }

        Ok(result)
    }

    /// Outbound path: record the interaction, dispatch the directive in the
    /// background, hand the caller the untouched signal.
    fn handle_delegation(
        &self,
        tool_name: &str,
        args: Value,
        ctx: &ToolContext,
        pending: PendingInteraction,
        original_result: Value,
    ) -> anyhow::Result<Value> {
        let interaction_id = pending.interaction_id.clone();
        if interaction_id.is_empty() {
            return Ok(ProtocolError::dispatch_failed(
                "Delegation signal carries no interactionId",
            )
            .to_envelope());
        }

        // Insertion happens before the dispatch is scheduled, so even an
        // agent that answers instantly finds the record in place.
        let receiver = match self.registry.insert(
            &interaction_id,
            tool_name,
            args,
            ctx.session.clone(),
            pending.delegated_call_details.clone(),
        ) {
            Ok(receiver) => receiver,
            Err(e) => {
                return Ok(ProtocolError::dispatch_failed(e.to_string()).to_envelope());
            }
        };
        // The continuation is observability-only here; subscribers attach
        // through the registry when they need the terminal outcome.
        drop(receiver);
        info!(
            interaction_id = %interaction_id,
            session_id = ctx.session.id(),
            tool = tool_name,
            command = %pending.delegated_call_details.original_command,
            "Registered pending interaction"
        );

        let registry = self.registry.clone();
        let broker = self.broker.get().cloned();
        let dispatch_ctx = ctx.clone();
        let details = pending.delegated_call_details;
        let id = interaction_id;
        tokio::spawn(async move {
            let failure = match broker {
                None => Some("Broker tool is not registered".to_string()),
                Some(broker) => {
                    let directive = json!({
                        "interactionId": id,
                        "delegatedCallDetails": details,
                    });
                    match broker.call(directive, &dispatch_ctx).await {
                        Ok(response)
                            if response.get("status").and_then(|s| s.as_str())
                                == Some("pending_agent_llm_action") =>
                        {
                            debug!(interaction_id = %id, "Directive dispatched to agent");
                            None
                        }
                        Ok(response) => Some(format!(
                            "Broker returned unexpected status: {}",
                            truncate_str(&response.to_string(), 200)
                        )),
                        Err(e) => Some(format!("Directive dispatch failed: {}", e)),
                    }
                }
            };
            if let Some(message) = failure {
                // The record must not outlive a dispatch that never reached
                // the agent; reject it so listeners observe the failure.
                if let Some(record) = registry.take(&id) {
                    registry.finish(record, Err(ProtocolError::dispatch_failed(message)));
                }
            }
        });

        // The caller observes the delegation signal itself — the wrapper
        // never substitutes its own envelope for the tool's result.
        Ok(original_result)
    }

    /// Inbound path: resolve the pending record and ack the agent.
    fn handle_agent_callback(&self, result: &Value) -> Value {
        let interaction_id = result
            .get("interactionId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let Some(record) = self.registry.take(&interaction_id) else {
            warn!(interaction_id = %interaction_id, "Agent callback for unknown interaction");
            let mut envelope = ProtocolError::unknown_interaction(&interaction_id).to_envelope();
            envelope["interactionId"] = json!(interaction_id);
            return envelope;
        };

        let status = result.get("status").and_then(|v| v.as_str()).unwrap_or("");
        if status != "llm_response_completed" {
            let err = ProtocolError::agent_reported(
                result.get("error").unwrap_or(&Value::Null),
            );
            self.registry.finish(record, Err(err));
            return ack(&interaction_id);
        }

        let final_output = result.get("finalLLMOutput").cloned().unwrap_or(Value::Null);
        let tag_info = record
            .details
            .request_parameters
            .get("tagInfo")
            .cloned()
            .unwrap_or_else(|| json!({ "tag": self.default_tag }));
        let tag = tag_info
            .get("tag")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.default_tag)
            .to_string();

        let original_tool_name = record.original_tool_name.clone();
        let original_args = record.original_tool_args.clone();
        let session = record.session.clone();
        let details = record.details.clone();

        // Resolution first, persistence after: the resolver fires and the
        // record is gone before any saver byte hits disk.
        self.registry.finish(
            record,
            Ok(DelegationResult {
                main_result: final_output.clone(),
                telemetry_data: Value::Null,
                tag_info,
            }),
        );

        self.dispatch_saver(
            &interaction_id,
            original_tool_name,
            original_args,
            session,
            details,
            final_output,
            tag,
        );

        ack(&interaction_id)
    }

    /// Fire-and-forget post-processing. Outcomes are logged; the agent ack
    /// already left.
    #[allow(clippy::too_many_arguments)]
    fn dispatch_saver(
        &self,
        interaction_id: &str,
        original_tool_name: String,
        original_args: Value,
        session: Session,
        details: crate::interaction::DelegatedCallDetails,
        payload: Value,
        tag: String,
    ) {
        let Some(saver) = self
            .savers
            .lookup(&original_tool_name, &details.original_command)
        else {
            error!(
                interaction_id,
                tool = %original_tool_name,
                command = %details.original_command,
                "No post-processor registered; agent output dropped"
            );
            return;
        };

        let project_root = match session.resolve_project_root(&original_args) {
            Ok(root) => root,
            Err(e) => {
                error!(
                    interaction_id,
                    tool = %original_tool_name,
                    "Cannot resolve project root for post-processing: {}",
                    e
                );
                return;
            }
        };

        let input = SaveInput {
            payload,
            original_args,
            details,
            project_root,
            tag,
        };
        let id = interaction_id.to_string();
        tokio::spawn(async move {
            match saver.save(input).await {
                Ok(result) => info!(
                    interaction_id = %id,
                    "Post-processing complete: {}",
                    truncate_str(&result.to_string(), 300)
                ),
                Err(e) => error!(interaction_id = %id, "Post-processing failed: {:#}", e),
            }
        });
    }
}

fn ack(interaction_id: &str) -> Value {
    json!({
        "status": "agent_response_processed_by_taskmaster",
        "interactionId": interaction_id,
    })
}
