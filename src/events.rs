//! Agent SDK stream-json message types.
//!
//! The SDK emits newline-delimited JSON with a handful of top-level message
//! types. Every tagged layer has an `Unknown` (or `Other`) fallback arm so
//! that newer SDK versions adding message kinds never break deserialization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level message wrapper that discriminates by the "type" field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum SdkMessage {
    #[serde(rename = "system")]
    System(SystemMessage),
    #[serde(rename = "stream_event")]
    StreamEvent(StreamEventMessage),
    #[serde(rename = "assistant")]
    Assistant(AssistantMessage),
    #[serde(rename = "user")]
    User(UserMessage),
    #[serde(rename = "result")]
    Result(ResultMessage),
    #[serde(other)]
    Unknown,
}

impl SdkMessage {
    /// Short name of the message type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SdkMessage::System(_) => "system",
            SdkMessage::StreamEvent(_) => "stream_event",
            SdkMessage::Assistant(_) => "assistant",
            SdkMessage::User(_) => "user",
            SdkMessage::Result(_) => "result",
            SdkMessage::Unknown => "unknown",
        }
    }

    /// The nesting context declared by this message.
    ///
    /// `None` means the message did not carry the field at all, `Some(None)`
    /// means it was explicitly `null` (top-level context).
    pub fn parent_tool_use_id(&self) -> Option<Option<&str>> {
        let declared = match self {
            SdkMessage::StreamEvent(m) => &m.parent_tool_use_id,
            SdkMessage::Assistant(m) => &m.parent_tool_use_id,
            SdkMessage::User(m) => &m.parent_tool_use_id,
            SdkMessage::System(_) | SdkMessage::Result(_) | SdkMessage::Unknown => return None,
        };
        declared.as_ref().map(|parent| parent.as_deref())
    }
}

/// System messages, discriminated by "subtype".
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "subtype")]
pub enum SystemMessage {
    #[serde(rename = "init")]
    Init(InitInfo),
    #[serde(rename = "status")]
    Status(StatusInfo),
    #[serde(rename = "compact_boundary")]
    CompactBoundary(CompactBoundaryInfo),
    #[serde(rename = "task_notification")]
    TaskNotification(TaskNotificationInfo),
    #[serde(other)]
    Other,
}

/// Session initialization payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InitInfo {
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub cwd: Option<String>,
    #[serde(rename = "permissionMode")]
    pub permission_mode: Option<String>,
    pub tools: Vec<String>,
    pub mcp_servers: Vec<McpServerInfo>,
    pub plugins: Vec<PluginInfo>,
    pub skills: Vec<String>,
    pub slash_commands: Vec<String>,
}

/// MCP server entry as reported by the SDK. The status is free-form here and
/// validated when the `session-init` chunk is built.
#[derive(Debug, Clone, Deserialize)]
pub struct McpServerInfo {
    pub name: String,
    #[serde(default)]
    pub status: String,
}

/// Plugin loaded into the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatusInfo {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompactBoundaryInfo {
    pub compact_metadata: Option<CompactMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompactMetadata {
    pub trigger: Option<String>,
    pub pre_tokens: Option<u64>,
}

/// Background task status change reported by the SDK.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskNotificationInfo {
    pub task_id: String,
    #[serde(default)]
    pub shell_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
}

/// Wrapper around a raw model streaming event.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEventMessage {
    pub event: StreamEvent,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub parent_tool_use_id: Option<Option<String>>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Inner streaming events wrapped by stream_event.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "message_start")]
    MessageStart {
        #[serde(default)]
        message: StreamMessageInfo,
    },
    #[serde(rename = "message_delta")]
    MessageDelta {
        #[serde(default)]
        usage: Option<Usage>,
    },
    #[serde(rename = "content_block_start")]
    ContentBlockStart {
        #[serde(default)]
        index: Option<usize>,
        content_block: ContentBlock,
    },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta {
        #[serde(default)]
        index: Option<usize>,
        delta: BlockDelta,
    },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop {
        #[serde(default)]
        index: Option<usize>,
    },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(other)]
    Unknown,
}

/// Message metadata carried by message_start.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StreamMessageInfo {
    pub id: Option<String>,
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

/// Incremental content for the currently streaming block.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum BlockDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { thinking: String },
    #[serde(other)]
    Unknown,
}

/// Content block types, shared by streamed block starts and complete messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

/// A complete assistant turn.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    pub message: AssistantBody,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub parent_tool_use_id: Option<Option<String>>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssistantBody {
    pub id: Option<String>,
    pub model: Option<String>,
    pub content: Vec<ContentBlock>,
}

/// User message; from the transform's point of view, a carrier of tool results.
#[derive(Debug, Clone, Deserialize)]
pub struct UserMessage {
    pub message: UserBody,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub parent_tool_use_id: Option<Option<String>>,
    /// Structured tool result attached by the SDK, preferred over the block content.
    #[serde(default)]
    pub tool_use_result: Option<Value>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserBody {
    pub content: UserContent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Blocks(Vec<ContentBlock>),
    Text(String),
}

impl UserContent {
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            UserContent::Blocks(blocks) => blocks,
            UserContent::Text(_) => &[],
        }
    }
}

/// Terminal summary of the session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResultMessage {
    pub subtype: Option<String>,
    pub is_error: bool,
    pub duration_ms: Option<u64>,
    pub duration_api_ms: Option<u64>,
    pub num_turns: Option<u32>,
    pub session_id: Option<String>,
    pub total_cost_usd: Option<f64>,
    pub usage: Option<Usage>,
    #[serde(rename = "modelUsage")]
    pub model_usage: HashMap<String, ModelUsage>,
    pub result: Option<String>,
    pub uuid: Option<String>,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cache_creation_input_tokens: Option<u64>,
    pub cache_read_input_tokens: Option<u64>,
}

/// Per-model usage from the result message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_creation_input_tokens: u64,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
    pub context_window: Option<u64>,
}

/// Flattens tool result content into plain text.
///
/// Content is either a bare string or an array of `{type: "text", text}` parts.
pub fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
