//! Delegation-aware command cores. Each command builds an LLM request,
//! hands it to the role-resolved provider, and inspects the tagged outcome:
//! a delegation token becomes the pending-interaction signal returned to the
//! caller; a direct completion runs the command's saver synchronously, so
//! both modes share one persistence path.

mod add_task;
mod analyze_complexity;
mod expand_task;
mod parse_requirements;
mod research;
mod update_subtask;
mod update_task;
mod update_tasks;

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

pub use add_task::AddTaskTool;
pub use analyze_complexity::AnalyzeComplexityTool;
pub use expand_task::ExpandTaskTool;
pub use parse_requirements::ParseRequirementsTool;
pub use research::ResearchTool;
pub use update_subtask::UpdateSubtaskTool;
pub use update_task::UpdateTaskTool;
pub use update_tasks::UpdateTasksTool;

use crate::channel::ToolChannel;
use crate::interaction::{delegation_signal, DelegatedCallDetails, PendingInteraction};
use crate::providers::{Role, RoleRouter};
use crate::savers::{SaveInput, SaverRegistry};
use crate::traits::{LlmOutcome, LlmRequest, ServiceType, Tool, ToolContext};

/// Shared dependencies every command core holds.
pub struct CommandKit {
    router: RoleRouter,
    savers: Arc<SaverRegistry>,
    default_tag: String,
}

/// One provider call plus everything needed to resume it later.
pub(crate) struct LlmCall<'a> {
    pub tool_name: &'static str,
    pub original_command: &'static str,
    pub role: Role,
    pub service: ServiceType,
    pub request: LlmRequest,
    /// Command-specific hints merged into the directive's request
    /// parameters; opaque to the agent, recovered by the saver.
    pub hints: Value,
    pub args: &'a Value,
    pub ctx: &'a ToolContext,
    pub tag: String,
}

impl CommandKit {
    pub fn new(router: RoleRouter, savers: Arc<SaverRegistry>, default_tag: String) -> Arc<Self> {
        Arc::new(Self {
            router,
            savers,
            default_tag,
        })
    }

    pub(crate) fn role(research: bool) -> Role {
        if research {
            Role::Research
        } else {
            Role::Main
        }
    }

    pub(crate) fn tag_of(&self, args: &Value) -> String {
        args.get("tag")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.default_tag)
            .to_string()
    }

    pub(crate) fn request(&self, role: Role, messages: Vec<crate::traits::ChatMessage>) -> LlmRequest {
        LlmRequest {
            model: self.router.model_for(role).to_string(),
            messages,
            ..Default::default()
        }
    }

    /// Run one LLM call and fold the outcome into the command's contract.
    pub(crate) async fn execute(&self, call: LlmCall<'_>) -> anyhow::Result<Value> {
        let provider = self.router.provider(call.role);
        let outcome = provider.call(call.service, call.request).await?;
        match outcome {
            LlmOutcome::Delegation(token) => {
                let mut parameters = serde_json::to_value(&token.details)?;
                let params = parameters
                    .as_object_mut()
                    .expect("request serializes to an object");
                if let Some(hints) = call.hints.as_object() {
                    for (key, value) in hints {
                        params.insert(key.clone(), value.clone());
                    }
                }
                params.insert("tagInfo".to_string(), json!({ "tag": call.tag }));

                let details = DelegatedCallDetails {
                    original_command: call.original_command.to_string(),
                    role: call.role.to_string(),
                    service_type: call.service,
                    request_parameters: parameters,
                };
                debug!(
                    interaction_id = %token.interaction_id,
                    command = call.original_command,
                    "Command returning pending interaction"
                );
                Ok(delegation_signal(&PendingInteraction::new(
                    token.interaction_id,
                    details,
                )))
            }
            LlmOutcome::Completion(completion) => {
                let saver = self
                    .savers
                    .lookup(call.tool_name, call.original_command)
                    .ok_or_else(|| {
                        anyhow::anyhow!("No post-processor registered for '{}'", call.tool_name)
                    })?;
                let mut parameters = serde_json::to_value(LlmRequest::default())?;
                if let Some(hints) = call.hints.as_object() {
                    let params = parameters
                        .as_object_mut()
                        .expect("request serializes to an object");
                    for (key, value) in hints {
                        params.insert(key.clone(), value.clone());
                    }
                }
                let input = SaveInput {
                    payload: completion.content,
                    original_args: call.args.clone(),
                    details: DelegatedCallDetails {
                        original_command: call.original_command.to_string(),
                        role: call.role.to_string(),
                        service_type: call.service,
                        request_parameters: parameters,
                    },
                    project_root: call.ctx.session.resolve_project_root(call.args)?,
                    tag: call.tag,
                };
                let result = saver.save(input).await?;
                Ok(json!({ "status": "success", "result": result }))
            }
        }
    }
}

/// Register every command core plus the broker on a channel.
pub fn install(channel: &ToolChannel, kit: &Arc<CommandKit>) {
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(ParseRequirementsTool::new(kit.clone())),
        Arc::new(ExpandTaskTool::new(kit.clone())),
        Arc::new(AnalyzeComplexityTool::new(kit.clone())),
        Arc::new(UpdateTaskTool::new(kit.clone())),
        Arc::new(UpdateSubtaskTool::new(kit.clone())),
        Arc::new(UpdateTasksTool::new(kit.clone())),
        Arc::new(AddTaskTool::new(kit.clone())),
        Arc::new(ResearchTool::new(kit.clone())),
    ];
    for tool in tools {
        channel.register(tool);
    }
}
