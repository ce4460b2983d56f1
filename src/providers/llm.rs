//! Tool-calling LLM provider (C6, concrete): drives a tool-calling-capable
//! chat model with the coordination tool surface (§4.5) registered as
//! callable functions, under a role-specific system prompt (§4.7's role
//! definitions). Generalizes a CloudLLM-style function-calling loop — call
//! the model, dispatch any tool calls it selects, feed the results back,
//! repeat until a plain-text reply — into per-`(role, agent_id)` turns
//! instead of one long-lived chat session.
//!
//! The core ships no concrete HTTP vendor client: `ChatModel` is the seam a
//! caller plugs a real SDK into, the same way ACP binary discovery (§1) is
//! left to an external collaborator.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::{ChunkCallback, Provider, ProviderCapabilities, StreamChunk, ToolCallStatus};
use crate::error::{Result, RoutaError};
use crate::models::AgentRole;
use crate::tools::{CoordinationTools, ToolResult};

/// Maximum number of model ↔ tool round-trips per turn before the provider
/// gives up and surfaces a transient error (a misbehaving model looping on
/// tool calls should not hang the pipeline forever).
const MAX_TOOL_ROUNDS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
        }
    }

    fn tool_result(tool_call_id: String, content: String) -> Self {
        Self {
            role: ChatRole::Tool,
            content,
            tool_call_id: Some(tool_call_id),
        }
    }
}

/// One native tool call the model selected, with a provider-assigned id so
/// the corresponding result can be correlated in the follow-up turn.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// What one model completion produced.
#[derive(Debug, Clone)]
pub enum ChatOutcome {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
}

/// Provider-agnostic tool schema handed to the model alongside a request.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Pluggable tool-calling chat backend. Implementations own API keys,
/// HTTP transport, and vendor-specific function-calling wire formats.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSchema]) -> Result<ChatOutcome>;
}

pub struct LlmProvider {
    model: Arc<dyn ChatModel>,
    tools: CoordinationTools,
    histories: RwLock<HashMap<String, Vec<ChatMessage>>>,
    capabilities: ProviderCapabilities,
}

impl LlmProvider {
    pub fn new(model: Arc<dyn ChatModel>, tools: CoordinationTools) -> Self {
        Self {
            model,
            tools,
            histories: RwLock::new(HashMap::new()),
            capabilities: ProviderCapabilities {
                name: "llm".to_string(),
                supports_streaming: false,
                supports_interrupt: false,
                supports_health_check: true,
                supports_file_editing: true,
                supports_terminal: false,
                supports_tool_calling: true,
                max_concurrent_agents: usize::MAX,
                priority: 1,
            },
        }
    }

    async fn history_for(&self, role: AgentRole, agent_id: &str) -> Vec<ChatMessage> {
        let mut histories = self.histories.write().await;
        histories
            .entry(agent_id.to_string())
            .or_insert_with(|| vec![ChatMessage::new(ChatRole::System, system_prompt_for(role))])
            .clone()
    }

    async fn persist_history(&self, agent_id: &str, history: Vec<ChatMessage>) {
        self.histories.write().await.insert(agent_id.to_string(), history);
    }
}

#[async_trait]
impl Provider for LlmProvider {
    #[instrument(name = "llm_turn", skip(self, prompt, on_chunk), fields(role = role.as_str(), agent_id))]
    async fn run_streaming(
        &self,
        role: AgentRole,
        agent_id: &str,
        prompt: &str,
        on_chunk: ChunkCallback<'_>,
    ) -> Result<String> {
        let mut history = self.history_for(role, agent_id).await;
        history.push(ChatMessage::new(ChatRole::User, prompt));

        let schemas = tool_schemas();

        for round in 0..MAX_TOOL_ROUNDS {
            let outcome = self.model.complete(&history, &schemas).await?;
            match outcome {
                ChatOutcome::Text(text) => {
                    history.push(ChatMessage::new(ChatRole::Assistant, text.clone()));
                    self.persist_history(agent_id, history).await;
                    on_chunk(StreamChunk::Text { content: text.clone() });
                    return Ok(text);
                }
                ChatOutcome::ToolCalls(calls) => {
                    debug!(round, calls = calls.len(), "llm provider dispatching tool calls");
                    history.push(ChatMessage::new(
                        ChatRole::Assistant,
                        format!("(requested {} tool call(s))", calls.len()),
                    ));
                    for call in calls {
                        on_chunk(StreamChunk::ToolCall {
                            name: call.name.clone(),
                            status: ToolCallStatus::Running,
                            arguments: Some(call.arguments.clone()),
                        });
                        let result = dispatch_tool_call(&self.tools, role, agent_id, &call.name, &call.arguments).await;
                        on_chunk(StreamChunk::ToolCall {
                            name: call.name.clone(),
                            status: if result.success { ToolCallStatus::Completed } else { ToolCallStatus::Failed },
                            arguments: None,
                        });
                        let content = result.to_mcp_content().to_string();
                        on_chunk(StreamChunk::ToolResult { name: call.name.clone(), content: content.clone() });
                        history.push(ChatMessage::tool_result(call.id, content));
                    }
                }
            }
        }

        warn!(agent_id, "llm provider exceeded max tool-call rounds");
        Err(RoutaError::Transient(format!(
            "agent {agent_id} exceeded {MAX_TOOL_ROUNDS} tool-call rounds without a final reply"
        )))
    }

    async fn is_healthy(&self, _agent_id: &str) -> bool {
        true
    }

    async fn interrupt(&self, _agent_id: &str) {
        // A synchronous model.complete() call has no in-flight handle to cancel;
        // the next ensureActive() check in the pipeline stops the caller instead.
    }

    async fn cleanup(&self, agent_id: &str) {
        self.histories.write().await.remove(agent_id);
    }

    async fn shutdown(&self) {
        self.histories.write().await.clear();
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities.clone()
    }
}

fn system_prompt_for(role: AgentRole) -> String {
    match role {
        AgentRole::Routa => crate::coordinator::ROUTA_SYSTEM_PROMPT.to_string(),
        AgentRole::Crafter => crate::coordinator::CRAFTER_SYSTEM_PROMPT.to_string(),
        AgentRole::Gate => crate::coordinator::GATE_SYSTEM_PROMPT.to_string(),
    }
}

/// Tool schemas for the §4.5 coordination surface, bit-exact by name with
/// the MCP re-export (§6).
fn tool_schemas() -> Vec<ToolSchema> {
    vec![
        ToolSchema {
            name: "list_agents".to_string(),
            description: "List every agent in a workspace".to_string(),
            parameters: json!({"type": "object", "properties": {"workspaceId": {"type": "string"}}, "required": ["workspaceId"]}),
        },
        ToolSchema {
            name: "read_agent_conversation".to_string(),
            description: "Read an agent's conversation history".to_string(),
            parameters: json!({"type": "object", "properties": {
                "agentId": {"type": "string"},
                "lastN": {"type": "integer"},
                "startTurn": {"type": "integer"},
                "endTurn": {"type": "integer"},
                "includeToolCalls": {"type": "boolean"}
            }, "required": ["agentId"]}),
        },
        ToolSchema {
            name: "create_agent".to_string(),
            description: "Create a new CRAFTER or GATE agent".to_string(),
            parameters: json!({"type": "object", "properties": {
                "name": {"type": "string"},
                "role": {"type": "string", "enum": ["CRAFTER", "GATE"]},
                "workspaceId": {"type": "string"},
                "parentId": {"type": "string"},
                "modelTier": {"type": "string", "enum": ["SMART", "FAST"]}
            }, "required": ["name", "role", "workspaceId"]}),
        },
        ToolSchema {
            name: "delegate_task".to_string(),
            description: "Assign a task to an agent".to_string(),
            parameters: json!({"type": "object", "properties": {
                "agentId": {"type": "string"}, "taskId": {"type": "string"}
            }, "required": ["agentId", "taskId"]}),
        },
        ToolSchema {
            name: "send_message_to_agent".to_string(),
            description: "Send a message to another agent's conversation".to_string(),
            parameters: json!({"type": "object", "properties": {
                "toAgentId": {"type": "string"}, "message": {"type": "string"}
            }, "required": ["toAgentId", "message"]}),
        },
        ToolSchema {
            name: "report_to_parent".to_string(),
            description: "Report task completion to the calling agent's parent".to_string(),
            parameters: json!({"type": "object", "properties": {
                "taskId": {"type": "string"},
                "summary": {"type": "string"},
                "filesModified": {"type": "array", "items": {"type": "string"}},
                "success": {"type": "boolean"}
            }, "required": ["taskId", "summary", "success"]}),
        },
        ToolSchema {
            name: "wake_or_create_task_agent".to_string(),
            description: "Wake the agent assigned to a task, or create one".to_string(),
            parameters: json!({"type": "object", "properties": {
                "taskId": {"type": "string"},
                "contextMessage": {"type": "string"},
                "workspaceId": {"type": "string"},
                "agentName": {"type": "string"},
                "modelTier": {"type": "string", "enum": ["SMART", "FAST"]}
            }, "required": ["taskId", "contextMessage", "workspaceId"]}),
        },
        ToolSchema {
            name: "send_message_to_task_agent".to_string(),
            description: "Send a message to whichever agent a task is assigned to".to_string(),
            parameters: json!({"type": "object", "properties": {
                "taskId": {"type": "string"}, "message": {"type": "string"}
            }, "required": ["taskId", "message"]}),
        },
        ToolSchema {
            name: "get_agent_status".to_string(),
            description: "Get an agent's status, tasks, and message count".to_string(),
            parameters: json!({"type": "object", "properties": {"agentId": {"type": "string"}}, "required": ["agentId"]}),
        },
        ToolSchema {
            name: "get_agent_summary".to_string(),
            description: "Get a condensed summary of an agent's recent activity".to_string(),
            parameters: json!({"type": "object", "properties": {"agentId": {"type": "string"}}, "required": ["agentId"]}),
        },
        ToolSchema {
            name: "subscribe_to_events".to_string(),
            description: "Subscribe to domain events".to_string(),
            parameters: json!({"type": "object", "properties": {
                "eventTypes": {"type": "array", "items": {"type": "string"}},
                "excludeSelf": {"type": "boolean"}
            }}),
        },
        ToolSchema {
            name: "unsubscribe_from_events".to_string(),
            description: "Cancel an event subscription".to_string(),
            parameters: json!({"type": "object", "properties": {"subscriptionId": {"type": "string"}}, "required": ["subscriptionId"]}),
        },
        ToolSchema {
            name: "read_file".to_string(),
            description: "Read a file from the workspace".to_string(),
            parameters: json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        },
        ToolSchema {
            name: "list_files".to_string(),
            description: "List a workspace directory".to_string(),
            parameters: json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        },
        ToolSchema {
            name: "write_file".to_string(),
            description: "Write a file in the workspace (CRAFTER only)".to_string(),
            parameters: json!({"type": "object", "properties": {
                "path": {"type": "string"}, "content": {"type": "string"}
            }, "required": ["path", "content"]}),
        },
    ]
}

/// Routes one model-selected tool call into the matching [`CoordinationTools`]
/// operation, honoring the same role restrictions the tool surface itself
/// enforces (§4.7).
async fn dispatch_tool_call(
    tools: &CoordinationTools,
    caller_role: AgentRole,
    caller_agent_id: &str,
    name: &str,
    args: &Value,
) -> ToolResult {
    let s = |key: &str| args.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    let opt_s = |key: &str| args.get(key).and_then(Value::as_str).map(str::to_string);

    match name {
        "list_agents" => tools.list_agents(&s("workspaceId")).await,
        "read_agent_conversation" => {
            let last_n = args.get("lastN").and_then(Value::as_u64).map(|n| n as usize);
            let turn_range = match (args.get("startTurn").and_then(Value::as_u64), args.get("endTurn").and_then(Value::as_u64)) {
                (Some(start), Some(end)) => Some((start, end)),
                _ => None,
            };
            let include_tool_calls = args.get("includeToolCalls").and_then(Value::as_bool).unwrap_or(false);
            tools.read_agent_conversation(&s("agentId"), last_n, turn_range, include_tool_calls).await
        }
        "create_agent" => {
            let role = match s("role").as_str() {
                "CRAFTER" => AgentRole::Crafter,
                "GATE" => AgentRole::Gate,
                "ROUTA" => AgentRole::Routa,
                other => return ToolResult::error(format!("unknown role {other}")),
            };
            let model_tier = match opt_s("modelTier").as_deref() {
                Some("FAST") => crate::models::ModelTier::Fast,
                _ => crate::models::ModelTier::Smart,
            };
            tools
                .create_agent(&s("name"), role, &s("workspaceId"), opt_s("parentId"), model_tier, caller_role)
                .await
        }
        "delegate_task" => tools.delegate_task(&s("agentId"), &s("taskId"), caller_agent_id, caller_role).await,
        "send_message_to_agent" => tools.send_message_to_agent(caller_agent_id, &s("toAgentId"), &s("message")).await,
        "report_to_parent" => {
            let report = crate::models::CompletionReport {
                agent_id: caller_agent_id.to_string(),
                task_id: s("taskId"),
                summary: s("summary"),
                files_modified: args
                    .get("filesModified")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()),
                verification_results: opt_s("verificationResults"),
                success: args.get("success").and_then(Value::as_bool).unwrap_or(false),
            };
            tools.report_to_parent(caller_agent_id, report).await
        }
        "wake_or_create_task_agent" => {
            let model_tier = match opt_s("modelTier").as_deref() {
                Some("FAST") => crate::models::ModelTier::Fast,
                _ => crate::models::ModelTier::Smart,
            };
            tools
                .wake_or_create_task_agent(&s("taskId"), &s("contextMessage"), caller_agent_id, &s("workspaceId"), opt_s("agentName"), model_tier)
                .await
        }
        "send_message_to_task_agent" => tools.send_message_to_task_agent(&s("taskId"), &s("message"), caller_agent_id).await,
        "get_agent_status" => tools.get_agent_status(&s("agentId")).await,
        "get_agent_summary" => tools.get_agent_summary(&s("agentId")).await,
        "subscribe_to_events" => {
            let event_types = args
                .get("eventTypes")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().and_then(parse_event_type)).collect())
                .unwrap_or_default();
            let exclude_self = args.get("excludeSelf").and_then(Value::as_bool).unwrap_or(true);
            tools.subscribe_to_events(caller_agent_id, caller_agent_id, event_types, exclude_self).await
        }
        "unsubscribe_from_events" => tools.unsubscribe_from_events(&s("subscriptionId")).await,
        "read_file" => tools.read_file(&s("path")).await,
        "list_files" => tools.list_files(args.get("path").and_then(Value::as_str).unwrap_or(".")).await,
        "write_file" => tools.write_file(&s("path"), &s("content"), caller_role).await,
        other => ToolResult::error(format!("unknown tool {other}")),
    }
}

fn parse_event_type(raw: &str) -> Option<crate::models::AgentEventType> {
    use crate::models::AgentEventType::*;
    match raw {
        "AGENT_CREATED" => Some(AgentCreated),
        "AGENT_STATUS_CHANGED" => Some(AgentStatusChanged),
        "TASK_ASSIGNED" => Some(TaskAssigned),
        "TASK_STATUS_CHANGED" => Some(TaskStatusChanged),
        "MESSAGE_SENT" => Some(MessageSent),
        "REPORT_SUBMITTED" => Some(ReportSubmitted),
        "QUEUE_OVERFLOW" => Some(QueueOverflow),
        _ => None,
    }
}
