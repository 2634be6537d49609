//! Runs each turn through the agent CLI in bidirectional stream-json mode.
//!
//! One child process per turn. Its stdout is decoded into [`BackendEvent`]s and forwarded over
//! an unbounded channel; permission control requests are answered on their own tasks so a parked
//! permission prompt never stalls the reader.

use std::process::Stdio;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::protocol::{self, ControlRequest, StreamLine};
use crate::backend::{
    BackendError, BackendEvent, EventStream, ModelBackend, PermissionHandler, QueryRequest,
};

const STDERR_TAIL_LIMIT: usize = 4096;
const INITIALIZE_REQUEST_ID: &str = "agent-chat-init";

type EventSender = mpsc::UnboundedSender<Result<BackendEvent, BackendError>>;

#[derive(Debug, Clone)]
pub struct ClaudeCliBackend {
    command: String,
}

impl ClaudeCliBackend {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

/// Arguments for one turn, in the order the CLI documents them.
pub fn command_args(request: &QueryRequest) -> Vec<String> {
    let mut args: Vec<String> = [
        "--print",
        "--output-format",
        "stream-json",
        "--input-format",
        "stream-json",
        "--verbose",
        "--permission-prompt-tool",
        "stdio",
        "--strict-mcp-config",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    if request.include_partial_messages {
        args.push("--include-partial-messages".into());
    }
    args.extend(["--model".into(), request.model.clone()]);
    args.extend(["--system-prompt".into(), request.system_prompt.clone()]);
    args.extend(["--permission-mode".into(), request.permission_mode.clone()]);
    if let Some(session_id) = &request.resume_session_id {
        args.extend(["--resume".into(), session_id.clone()]);
    }
    if !request.disallowed_tools.is_empty() {
        args.extend([
            "--disallowedTools".into(),
            request.disallowed_tools.join(","),
        ]);
    }
    if let Some(servers) = &request.tool_servers {
        args.extend([
            "--mcp-config".into(),
            protocol::mcp_config(servers).to_string(),
        ]);
    }
    if !request.agents.is_empty() {
        args.extend([
            "--agents".into(),
            protocol::agents(&request.agents).to_string(),
        ]);
    }
    args
}

#[async_trait::async_trait]
impl ModelBackend for ClaudeCliBackend {
    async fn query(&self, request: QueryRequest) -> Result<EventStream, BackendError> {
        let args = command_args(&request);
        debug!(command = %self.command, request = ?request, "Starting backend turn");

        let mut child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| BackendError::Spawn(format!("{}: {err}", self.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::Spawn("Unable to retrieve stdin.".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Spawn("Unable to retrieve stdout.".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BackendError::Spawn("Unable to retrieve stderr.".to_string()))?;

        let stdin = Arc::new(Mutex::new(stdin));
        write_line(&stdin, &protocol::initialize_request(INITIALIZE_REQUEST_ID)).await?;
        write_line(&stdin, &protocol::user_message(&request.prompt)).await?;

        let stderr_tail = spawn_stderr_tail(stderr);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = TurnProcess {
            child,
            stdin,
            permissions: request.permissions,
            cancel: request.cancel,
            partial_messages: request.include_partial_messages,
            tx,
        };
        tokio::spawn(session.run(stdout, stderr_tail));

        let stream = futures_util::stream::poll_fn(move |cx| rx.poll_recv(cx));
        Ok(stream.boxed())
    }
}

struct TurnProcess {
    child: Child,
    stdin: Arc<Mutex<ChildStdin>>,
    permissions: Arc<dyn PermissionHandler>,
    cancel: CancellationToken,
    partial_messages: bool,
    tx: EventSender,
}

impl TurnProcess {
    async fn run(mut self, stdout: ChildStdout, stderr_tail: JoinHandle<String>) {
        let mut lines = BufReader::new(stdout).lines();
        let mut saw_result = false;

        loop {
            let line = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Backend turn cancelled; stopping child");
                    let _ = self.child.start_kill();
                    return;
                }
                _ = self.tx.closed() => {
                    let _ = self.child.start_kill();
                    return;
                }
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    let _ = self.tx.send(Err(BackendError::Io(err)));
                    let _ = self.child.start_kill();
                    return;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match protocol::parse_line(&line, self.partial_messages) {
                Ok(StreamLine::Events(events)) => {
                    for event in events {
                        saw_result |= matches!(event, BackendEvent::Result(_));
                        if self.tx.send(Ok(event)).is_err() {
                            let _ = self.child.start_kill();
                            return;
                        }
                    }
                }
                Ok(StreamLine::Control {
                    request_id,
                    request,
                }) => self.spawn_control_reply(request_id, request),
                Ok(StreamLine::Ignored) => {}
                Err(err) => debug!(error = %err, line = %line, "Skipping unparseable backend line"),
            }

            if saw_result {
                break;
            }
        }

        if saw_result {
            // The CLI keeps reading stdin for further turns; this turn is done.
            let _ = self.child.start_kill();
            let _ = self.child.wait().await;
            return;
        }

        let status = self.child.wait().await;
        let tail = stderr_tail.await.unwrap_or_default();
        let detail = match status {
            Ok(status) if tail.trim().is_empty() => status.to_string(),
            Ok(status) => format!("{status}: {}", tail.trim()),
            Err(err) => err.to_string(),
        };
        debug!(detail = %detail, "Backend exited without a result");
        let _ = self.tx.send(Err(BackendError::Exited(detail)));
    }

    fn spawn_control_reply(&self, request_id: String, request: ControlRequest) {
        let stdin = self.stdin.clone();
        let permissions = self.permissions.clone();
        tokio::spawn(async move {
            let reply = match request {
                ControlRequest::CanUseTool {
                    tool_name,
                    input,
                    suggestions,
                } => {
                    debug!(tool = %tool_name, request_id = %request_id, "Permission requested");
                    let decision = permissions
                        .can_use_tool(&tool_name, input, suggestions)
                        .await;
                    match serde_json::to_value(&decision) {
                        Ok(value) => protocol::control_success(&request_id, value),
                        Err(err) => protocol::control_error(&request_id, &err.to_string()),
                    }
                }
                ControlRequest::Unsupported(subtype) => protocol::control_error(
                    &request_id,
                    &format!("Unsupported control request: {subtype}"),
                ),
            };
            if let Err(err) = write_line(&stdin, &reply).await {
                debug!(error = %err, request_id = %request_id, "Failed to answer control request");
            }
        });
    }
}

async fn write_line(stdin: &Mutex<ChildStdin>, message: &Value) -> Result<(), BackendError> {
    let mut payload = message.to_string();
    payload.push('\n');
    let mut stdin = stdin.lock().await;
    stdin.write_all(payload.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

fn spawn_stderr_tail(stderr: ChildStderr) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr).lines();
        let mut tail = String::new();
        while let Ok(Some(line)) = reader.next_line().await {
            if !tail.is_empty() {
                tail.push('\n');
            }
            tail.push_str(&line);
            if tail.len() > STDERR_TAIL_LIMIT {
                let cut = tail.len() - STDERR_TAIL_LIMIT;
                let cut = (cut..tail.len())
                    .find(|i| tail.is_char_boundary(*i))
                    .unwrap_or(tail.len());
                tail.drain(..cut);
            }
        }
        tail
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::data::{AgentConfig, ToolServerConfig};
    use crate::mcp::permissions::PermissionDecision;
    use crate::mcp::registry::ToolServerEntry;
    use serde_json::Map;
    use std::collections::BTreeMap;

    struct AllowAll;

    #[async_trait::async_trait]
    impl PermissionHandler for AllowAll {
        async fn can_use_tool(
            &self,
            _tool_name: &str,
            input: Map<String, Value>,
            _suggestions: Vec<Value>,
        ) -> PermissionDecision {
            PermissionDecision::Allow {
                updated_input: input,
                updated_permissions: None,
            }
        }
    }

    fn request() -> QueryRequest {
        QueryRequest {
            prompt: "hello".into(),
            resume_session_id: None,
            tool_servers: None,
            system_prompt: "Be brief.".into(),
            model: "sonnet".into(),
            agents: BTreeMap::new(),
            disallowed_tools: Vec::new(),
            permission_mode: "default".into(),
            include_partial_messages: false,
            cancel: CancellationToken::new(),
            permissions: Arc::new(AllowAll),
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|arg| arg == flag)
            .and_then(|index| args.get(index + 1))
            .map(String::as_str)
    }

    #[test]
    fn minimal_turn_has_no_optional_flags() {
        let args = command_args(&request());
        assert_eq!(value_after(&args, "--model"), Some("sonnet"));
        assert_eq!(value_after(&args, "--system-prompt"), Some("Be brief."));
        for flag in [
            "--resume",
            "--mcp-config",
            "--agents",
            "--disallowedTools",
            "--include-partial-messages",
        ] {
            assert!(!args.iter().any(|arg| arg == flag), "{flag} unexpected");
        }
    }

    #[test]
    fn optional_flags_follow_the_request() {
        let mut request = request();
        request.resume_session_id = Some("s-1".into());
        request.include_partial_messages = true;
        request.disallowed_tools = vec!["Bash".into(), "mcp__github__merge".into()];
        request.tool_servers = Some(vec![ToolServerEntry::new(
            "github",
            ToolServerConfig {
                command: Some("bunx".into()),
                ..ToolServerConfig::default()
            },
        )]);
        request.agents.insert(
            "reviewer".into(),
            AgentConfig {
                description: "Reviews".into(),
                prompt: Some("Review.".into()),
                ..AgentConfig::default()
            },
        );

        let args = command_args(&request);
        assert_eq!(value_after(&args, "--resume"), Some("s-1"));
        assert_eq!(
            value_after(&args, "--disallowedTools"),
            Some("Bash,mcp__github__merge")
        );
        assert!(args.iter().any(|arg| arg == "--include-partial-messages"));
        let mcp: Value =
            serde_json::from_str(value_after(&args, "--mcp-config").expect("mcp config"))
                .expect("json");
        assert_eq!(mcp["mcpServers"]["github"]["command"], "bunx");
        let agents: Value =
            serde_json::from_str(value_after(&args, "--agents").expect("agents")).expect("json");
        assert_eq!(agents["reviewer"]["prompt"], "Review.");
    }

    #[tokio::test]
    async fn missing_command_is_a_spawn_error() {
        let backend = ClaudeCliBackend::new("agent-chat-definitely-missing-binary");
        let err = match backend.query(request()).await {
            Ok(_) => panic!("expected spawn failure"),
            Err(err) => err,
        };
        assert!(matches!(err, BackendError::Spawn(_)));
    }
}
