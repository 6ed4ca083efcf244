//! Per-message-type handlers.
//!
//! Each handler turns one upstream message into zero or more chunks by
//! driving the trackers, the id ledger and the tool registry held in a
//! [`SessionContext`].

mod assistant;
mod stream_event;
mod system;
mod user;

pub use assistant::AssistantHandler;
pub use stream_event::StreamEventHandler;
pub use system::SystemHandler;
pub use user::UserHandler;

use tracing::debug;

use crate::chunks::UIMessageChunk;
use crate::compact::SystemCompactEnhancer;
use crate::ids::IdManager;
use crate::state::StateManager;
use crate::tools::{ToolInputContext, ToolRegistry};
use crate::trackers::{
    CompletedToolInput, TextStreamTracker, ThinkingStreamTracker, ToolStreamTracker,
};

/// All per-session state, owned by one transformer.
#[derive(Debug, Default)]
pub struct SessionContext {
    pub ids: IdManager,
    pub state: StateManager,
    pub text: TextStreamTracker,
    pub tool: ToolStreamTracker,
    pub thinking: ThinkingStreamTracker,
    pub registry: ToolRegistry,
    pub compact: SystemCompactEnhancer,
}

impl SessionContext {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            ..Default::default()
        }
    }

    /// Moves into the nesting context of `parent`. Text dedup follows it, so
    /// a sub-agent's text is judged apart from its parent's.
    pub fn set_parent_tool_use_id(&mut self, parent: Option<String>) {
        self.text.set_scope(parent.as_deref());
        self.state.set_parent_tool_use_id(parent);
    }

    /// Closes the open text block and records it as the last closed text.
    pub fn close_text(&mut self, out: &mut Vec<UIMessageChunk>) {
        if let Some(id) = self.text.end(out) {
            self.state.set_last_text_id(id);
        }
    }

    /// Closes the open tool stream and finishes its bookkeeping.
    pub fn close_tool(&mut self, out: &mut Vec<UIMessageChunk>) {
        if let Some(done) = self.tool.end(out) {
            self.complete_tool_input(done);
        }
    }

    pub fn close_thinking(&mut self, out: &mut Vec<UIMessageChunk>) {
        self.thinking.end(out);
    }

    /// Closes every open lane, in text, tool, thinking order.
    pub fn close_all(&mut self, out: &mut Vec<UIMessageChunk>) {
        self.close_text(out);
        self.close_tool(out);
        self.close_thinking(out);
    }

    /// A streamed tool input is final: mark it emitted so the complete
    /// message does not repeat it, keep the input for result enhancement and
    /// let the enhancers see it.
    pub(crate) fn complete_tool_input(&mut self, done: CompletedToolInput) {
        debug!(
            tool_call_id = %done.tool_call_id,
            tool = %done.tool_name,
            "tool_input_complete"
        );
        self.ids.mark_emitted(&done.original_id);
        self.registry.notify_input_complete(&ToolInputContext {
            tool_call_id: &done.tool_call_id,
            original_id: &done.original_id,
            tool_name: &done.tool_name,
            input: &done.input,
        });
        self.ids.set_input(&done.original_id, done.input);
    }
}
