//! Stream trackers, one per sub-stream kind.
//!
//! Each tracker owns at most one open unit. Starting a unit while another is
//! open closes the old one first, so the sink always sees `*-end` for the old
//! unit immediately before `*-start` for the new one. Ending with nothing
//! open emits nothing.

use std::collections::HashSet;

use serde_json::{Value, json};
use tracing::debug;

use crate::chunks::UIMessageChunk;
use crate::ids::generate_id;

/// Snapshot of a [`TextStreamTracker`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextStreamState {
    pub text_id: Option<String>,
    pub text_started: bool,
}

/// Text lane.
///
/// Unlike the tool and thinking lanes, a delta with no open block starts one
/// implicitly: some upstream configurations send text deltas without a
/// preceding block start.
#[derive(Debug, Default)]
pub struct TextStreamTracker {
    current: Option<String>,
    /// Nesting scope (the parent tool_use id, `None` at top level) that new
    /// blocks and dedup checks are attributed to.
    scope: Option<String>,
    /// Scopes in which streaming opened a text block during their current
    /// API call. An entry survives `end()`; `new_turn()` clears the current
    /// scope's entry and `reset()` clears them all.
    streamed_scopes: HashSet<Option<String>>,
}

impl TextStreamTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a text block, generating an id when none is given. Returns the id.
    pub fn start(&mut self, id: Option<String>, out: &mut Vec<UIMessageChunk>) -> String {
        self.end(out);
        let id = id.unwrap_or_else(|| generate_id("text"));
        out.push(UIMessageChunk::text_start(&id));
        self.current = Some(id.clone());
        self.streamed_scopes.insert(self.scope.clone());
        id
    }

    pub fn delta(&mut self, text: &str, out: &mut Vec<UIMessageChunk>) {
        let id = match &self.current {
            Some(id) => id.clone(),
            None => self.start(None, out),
        };
        out.push(UIMessageChunk::text_delta(id, text));
    }

    /// Closes the open block and returns its id.
    pub fn end(&mut self, out: &mut Vec<UIMessageChunk>) -> Option<String> {
        let id = self.current.take()?;
        out.push(UIMessageChunk::text_end(&id));
        Some(id)
    }

    /// Emits a whole, non-streamed text block (start, delta, end) and returns
    /// its id. Does not count as streaming for [`Self::text_started`].
    pub fn emit_complete(&mut self, text: &str, out: &mut Vec<UIMessageChunk>) -> String {
        self.end(out);
        let id = generate_id("text");
        out.push(UIMessageChunk::text_start(&id));
        out.push(UIMessageChunk::text_delta(&id, text));
        out.push(UIMessageChunk::text_end(&id));
        id
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Whether streaming opened a text block in the current scope's API call.
    pub fn text_started(&self) -> bool {
        self.streamed_scopes.contains(&self.scope)
    }

    /// Switches the nesting scope. An open block stays open.
    pub fn set_scope(&mut self, scope: Option<&str>) {
        if self.scope.as_deref() != scope {
            self.scope = scope.map(str::to_string);
        }
    }

    /// Forgets that streaming produced text in the current scope, for its
    /// next API call.
    pub fn new_turn(&mut self) {
        self.streamed_scopes.remove(&self.scope);
    }

    pub fn state(&self) -> TextStreamState {
        TextStreamState {
            text_id: self.current.clone(),
            text_started: self.text_started(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Identity of a tool call whose input is about to stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStreamStart {
    pub tool_call_id: String,
    pub tool_name: String,
    pub original_id: String,
}

/// A tool call whose input finished streaming.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedToolInput {
    pub tool_call_id: String,
    pub tool_name: String,
    pub original_id: String,
    pub input: Value,
}

/// Snapshot of a [`ToolStreamTracker`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolStreamState {
    pub tool_call_id: Option<String>,
    pub tool_name: Option<String>,
    pub original_id: Option<String>,
    pub accumulated_input: String,
}

#[derive(Debug)]
struct OpenToolStream {
    call: ToolStreamStart,
    buffer: String,
}

/// Tool-input lane. Partial JSON is accumulated and parsed once at `end()`.
#[derive(Debug, Default)]
pub struct ToolStreamTracker {
    current: Option<OpenToolStream>,
}

impl ToolStreamTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a tool stream. If one was open, it is completed first and
    /// returned so the caller can finish its bookkeeping.
    pub fn start(
        &mut self,
        call: ToolStreamStart,
        out: &mut Vec<UIMessageChunk>,
    ) -> Option<CompletedToolInput> {
        let previous = self.end(out);
        out.push(UIMessageChunk::tool_input_start(
            &call.tool_call_id,
            &call.tool_name,
        ));
        self.current = Some(OpenToolStream {
            call,
            buffer: String::new(),
        });
        previous
    }

    pub fn delta(&mut self, partial_json: &str, out: &mut Vec<UIMessageChunk>) {
        let Some(open) = self.current.as_mut() else {
            debug!(len = partial_json.len(), "tool_delta_without_open_stream");
            return;
        };
        open.buffer.push_str(partial_json);
        out.push(UIMessageChunk::tool_input_delta(
            &open.call.tool_call_id,
            partial_json,
        ));
    }

    pub fn end(&mut self, out: &mut Vec<UIMessageChunk>) -> Option<CompletedToolInput> {
        let OpenToolStream { call, buffer } = self.current.take()?;
        let input = parse_tool_input(&buffer);
        out.push(UIMessageChunk::tool_input_available(
            &call.tool_call_id,
            &call.tool_name,
            input.clone(),
        ));
        Some(CompletedToolInput {
            tool_call_id: call.tool_call_id,
            tool_name: call.tool_name,
            original_id: call.original_id,
            input,
        })
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Original id of the tool call currently streaming, if any.
    pub fn current_original_id(&self) -> Option<&str> {
        self.current.as_ref().map(|open| open.call.original_id.as_str())
    }

    pub fn state(&self) -> ToolStreamState {
        match &self.current {
            Some(open) => ToolStreamState {
                tool_call_id: Some(open.call.tool_call_id.clone()),
                tool_name: Some(open.call.tool_name.clone()),
                original_id: Some(open.call.original_id.clone()),
                accumulated_input: open.buffer.clone(),
            },
            None => ToolStreamState::default(),
        }
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// Parses accumulated tool input. Never fails: malformed JSON (e.g. a stream
/// cut off mid-object) degrades to `{_raw, _parseError: true}`.
pub fn parse_tool_input(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, len = raw.len(), "tool_input_parse_failed");
            json!({"_raw": raw, "_parseError": true})
        }
    }
}

/// Snapshot of a [`ThinkingStreamTracker`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThinkingStreamState {
    pub thinking_id: Option<String>,
}

/// Reasoning lane.
#[derive(Debug, Default)]
pub struct ThinkingStreamTracker {
    current: Option<String>,
}

impl ThinkingStreamTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, id: impl Into<String>, out: &mut Vec<UIMessageChunk>) {
        self.end(out);
        let id = id.into();
        out.push(UIMessageChunk::reasoning_start(&id));
        self.current = Some(id);
    }

    pub fn delta(&mut self, thinking: &str, out: &mut Vec<UIMessageChunk>) {
        let Some(id) = &self.current else {
            debug!(len = thinking.len(), "thinking_delta_without_open_stream");
            return;
        };
        out.push(UIMessageChunk::reasoning_delta(id, thinking));
    }

    pub fn end(&mut self, out: &mut Vec<UIMessageChunk>) -> Option<String> {
        let id = self.current.take()?;
        out.push(UIMessageChunk::reasoning_end(&id));
        Some(id)
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn state(&self) -> ThinkingStreamState {
        ThinkingStreamState {
            thinking_id: self.current.clone(),
        }
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}
