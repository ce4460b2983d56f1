//! ACP subprocess provider (C6, §4.6/§6): one subprocess per agent id,
//! speaking newline-delimited JSON-RPC over stdin/stdout. A persistent
//! multi-turn session per agent rather than a one-shot invocation per call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::{mode_for_role, ChunkCallback, Provider, ProviderCapabilities, StreamChunk, ToolCallStatus};
use crate::config::ProviderPreset;
use crate::error::{Result, RoutaError};
use crate::models::AgentRole;

/// Command, environment and declared capabilities for one ACP-speaking
/// backend (§6). `priority` feeds the router's tie-break.
#[derive(Debug, Clone)]
pub struct AcpSessionConfig {
    pub name: String,
    pub preset: ProviderPreset,
    pub capabilities: ProviderCapabilities,
    pub spawn_timeout: Duration,
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize, Default)]
struct JsonRpcMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Deserialize)]
struct JsonRpcErrorBody {
    message: String,
}

struct AgentSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    session_id: String,
    mode: Option<&'static str>,
}

pub struct AcpProvider {
    config: AcpSessionConfig,
    sessions: RwLock<HashMap<String, Arc<Mutex<AgentSession>>>>,
    next_id: AtomicU64,
}

impl AcpProvider {
    pub fn new(config: AcpSessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    async fn session_for(&self, agent_id: &str) -> Result<Arc<Mutex<AgentSession>>> {
        if let Some(session) = self.sessions.read().await.get(agent_id) {
            return Ok(session.clone());
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(agent_id) {
            return Ok(session.clone());
        }

        let session = tokio::time::timeout(self.config.spawn_timeout, self.spawn_session())
            .await
            .map_err(|_| RoutaError::Transient(format!("spawn timed out for agent {agent_id}")))??;
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(agent_id.to_string(), handle.clone());
        Ok(handle)
    }

    async fn spawn_session(&self) -> Result<AgentSession> {
        let preset = &self.config.preset;
        let mut command = Command::new(&preset.command);
        command
            .args(&preset.args)
            .envs(&preset.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| RoutaError::Internal(anyhow::anyhow!("failed to spawn {}: {e}", preset.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RoutaError::Internal(anyhow::anyhow!("child has no stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RoutaError::Internal(anyhow::anyhow!("child has no stdout")))?;
        let stdout = BufReader::new(stdout).lines();

        let mut session = AgentSession {
            child,
            stdin,
            stdout,
            session_id: String::new(),
            mode: None,
        };

        self.call(&mut session, "initialize", json!({}), None).await?;
        let new_session = self
            .call(&mut session, "session/new", json!({}), None)
            .await?;
        session.session_id = new_session
            .get("sessionId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(session)
    }

    async fn call(
        &self,
        session: &mut AgentSession,
        method: &str,
        params: Value,
        on_chunk: Option<ChunkCallback<'_>>,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        session
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(RoutaError::Io)?;
        session.stdin.flush().await.map_err(RoutaError::Io)?;

        loop {
            let raw = session
                .stdout
                .next_line()
                .await
                .map_err(RoutaError::Io)?
                .ok_or_else(|| RoutaError::Transient("subprocess closed stdout".to_string()))?;
            if raw.trim().is_empty() {
                continue;
            }
            let message: JsonRpcMessage = match serde_json::from_str(&raw) {
                Ok(m) => m,
                Err(e) => {
                    warn!(%e, line = %raw, "unparseable line from acp subprocess");
                    continue;
                }
            };

            match message.id {
                Some(received_id) if received_id == json!(id) => {
                    if let Some(err) = message.error {
                        return Err(RoutaError::Transient(err.message));
                    }
                    return Ok(message.result.unwrap_or(Value::Null));
                }
                _ => {
                    if let (Some(notif_method), Some(callback)) = (message.method.as_deref(), on_chunk) {
                        if notif_method == "session/update" {
                            if let Some(chunk) = translate_update(message.params.unwrap_or(Value::Null)) {
                                callback(chunk);
                            }
                        }
                    } else {
                        debug!(line = %raw, "ignoring unrelated notification while awaiting response");
                    }
                }
            }
        }
    }
}

fn translate_update(params: Value) -> Option<StreamChunk> {
    let kind = params.get("kind")?.as_str()?;
    match kind {
        "text" => Some(StreamChunk::Text {
            content: params.get("content")?.as_str()?.to_string(),
        }),
        "tool_call" => Some(StreamChunk::ToolCall {
            name: params.get("name")?.as_str()?.to_string(),
            status: match params.get("status").and_then(Value::as_str) {
                Some("running") => ToolCallStatus::Running,
                Some("completed") => ToolCallStatus::Completed,
                Some("failed") => ToolCallStatus::Failed,
                _ => ToolCallStatus::Pending,
            },
            arguments: params.get("arguments").cloned(),
        }),
        "tool_result" => Some(StreamChunk::ToolResult {
            name: params.get("name")?.as_str()?.to_string(),
            content: params.get("content")?.as_str().unwrap_or_default().to_string(),
        }),
        "status" => Some(StreamChunk::Status {
            text: params.get("text")?.as_str()?.to_string(),
        }),
        _ => None,
    }
}

#[async_trait]
impl Provider for AcpProvider {
    async fn run_streaming(
        &self,
        role: AgentRole,
        agent_id: &str,
        prompt: &str,
        on_chunk: ChunkCallback<'_>,
    ) -> Result<String> {
        let handle = self.session_for(agent_id).await?;
        let mut session = handle.lock().await;

        let desired_mode = mode_for_role(role);
        if session.mode != Some(desired_mode) {
            let session_id = session.session_id.clone();
            self.call(
                &mut session,
                "session/set_mode",
                json!({ "sessionId": session_id, "modeId": desired_mode }),
                None,
            )
            .await?;
            session.mode = Some(desired_mode);
        }

        let collected = std::sync::Mutex::new(String::new());
        let sink: &dyn Fn(StreamChunk) = &|chunk| {
            if let StreamChunk::Text { content } = &chunk {
                collected.lock().unwrap().push_str(content);
            }
            on_chunk(chunk);
        };

        let result = self
            .call(
                &mut session,
                "session/prompt",
                json!({ "sessionId": session.session_id, "prompt": prompt }),
                Some(sink),
            )
            .await?;

        let mut collected = collected.into_inner().unwrap();
        if collected.is_empty() {
            if let Some(text) = result.get("text").and_then(Value::as_str) {
                collected.push_str(text);
            }
        }
        Ok(collected)
    }

    async fn is_healthy(&self, agent_id: &str) -> bool {
        let sessions = self.sessions.read().await;
        match sessions.get(agent_id) {
            Some(session) => {
                let mut session = session.lock().await;
                matches!(session.child.try_wait(), Ok(None))
            }
            None => false,
        }
    }

    async fn interrupt(&self, agent_id: &str) {
        if let Some(handle) = self.sessions.read().await.get(agent_id).cloned() {
            let mut session = handle.lock().await;
            let session_id = session.session_id.clone();
            let _ = self
                .call(&mut session, "session/cancel", json!({ "sessionId": session_id }), None)
                .await;
        }
    }

    async fn cleanup(&self, agent_id: &str) {
        if let Some(handle) = self.sessions.write().await.remove(agent_id) {
            let mut session = handle.lock().await;
            let _ = session.child.kill().await;
        }
    }

    async fn shutdown(&self) {
        let mut sessions = self.sessions.write().await;
        for (_, handle) in sessions.drain() {
            let mut session = handle.lock().await;
            let _ = session.child.kill().await;
        }
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.config.capabilities.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_update_maps_text_chunk() {
        let chunk = translate_update(json!({"kind": "text", "content": "hi"})).unwrap();
        assert!(matches!(chunk, StreamChunk::Text { content } if content == "hi"));
    }

    #[test]
    fn translate_update_maps_tool_call_status() {
        let chunk = translate_update(json!({"kind": "tool_call", "name": "read_file", "status": "running"})).unwrap();
        assert!(matches!(chunk, StreamChunk::ToolCall { status: ToolCallStatus::Running, .. }));
    }

    #[test]
    fn translate_update_ignores_unknown_kind() {
        assert!(translate_update(json!({"kind": "heartbeat"})).is_none());
    }

    #[test]
    fn config_carries_capabilities_through() {
        let config = AcpSessionConfig {
            name: "acp-tool".to_string(),
            preset: ProviderPreset {
                command: "acp-tool".to_string(),
                args: vec![],
                env: HashMap::new(),
                auto_approve: None,
                allowed_tools: None,
            },
            capabilities: ProviderCapabilities {
                name: "acp-tool".to_string(),
                supports_streaming: true,
                supports_interrupt: true,
                supports_health_check: true,
                supports_file_editing: true,
                supports_terminal: true,
                supports_tool_calling: true,
                max_concurrent_agents: 8,
                priority: 5,
            },
            spawn_timeout: Duration::from_secs(30),
        };
        let provider = AcpProvider::new(config);
        assert_eq!(provider.capabilities().priority, 5);
    }
}
