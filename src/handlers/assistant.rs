use tracing::{debug, trace};

use crate::chunks::UIMessageChunk;
use crate::events::{AssistantMessage, ContentBlock};
use crate::ids::{THINKING_STREAMED_KEY, generate_id, make_composite_id};
use crate::tools::ToolInputContext;

use super::SessionContext;

/// Complete assistant turns. Everything here is a fallback for content that
/// streaming did not already deliver.
pub struct AssistantHandler;

impl AssistantHandler {
    pub fn handle(
        ctx: &mut SessionContext,
        msg: &AssistantMessage,
        out: &mut Vec<UIMessageChunk>,
    ) {
        for block in &msg.message.content {
            match block {
                ContentBlock::Thinking { thinking } => Self::thinking(ctx, thinking, out),
                ContentBlock::Text { text } => Self::text(ctx, text, out),
                ContentBlock::ToolUse { id, name, input } => {
                    Self::tool_use(ctx, id, name, input, out)
                }
                ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {
                    trace!("ignored_assistant_block");
                }
            }
        }
    }

    fn thinking(ctx: &mut SessionContext, thinking: &str, out: &mut Vec<UIMessageChunk>) {
        if ctx.ids.is_emitted(THINKING_STREAMED_KEY) {
            trace!("thinking_already_streamed");
            return;
        }
        let id = generate_id("reasoning");
        ctx.thinking.start(id, out);
        ctx.thinking.delta(thinking, out);
        ctx.thinking.end(out);
        ctx.ids.mark_emitted(THINKING_STREAMED_KEY);
    }

    fn text(ctx: &mut SessionContext, text: &str, out: &mut Vec<UIMessageChunk>) {
        if ctx.text.text_started() {
            trace!("text_already_streamed");
            return;
        }
        if text.is_empty() {
            return;
        }
        ctx.close_text(out);
        let id = ctx.text.emit_complete(text, out);
        ctx.state.set_last_text_id(id);
    }

    fn tool_use(
        ctx: &mut SessionContext,
        id: &str,
        name: &str,
        input: &serde_json::Value,
        out: &mut Vec<UIMessageChunk>,
    ) {
        if ctx.ids.is_emitted(id) || ctx.tool.current_original_id() == Some(id) {
            trace!(tool_use_id = %id, "tool_use_already_streamed");
            return;
        }

        let composite = make_composite_id(id, ctx.state.parent_tool_use_id());
        ctx.ids.set_mapping(id, &composite, Some(name));
        ctx.ids.set_input(id, input.clone());
        ctx.ids.mark_emitted(id);
        ctx.registry.notify_input_complete(&ToolInputContext {
            tool_call_id: &composite,
            original_id: id,
            tool_name: name,
            input,
        });

        debug!(tool = %name, tool_call_id = %composite, "tool_input_from_complete_message");
        out.push(UIMessageChunk::tool_input_available(
            composite,
            name,
            input.clone(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::StreamEventHandler;
    use crate::events::StreamEvent;
    use serde_json::json;

    fn assistant(content: serde_json::Value) -> AssistantMessage {
        serde_json::from_value(json!({
            "type": "assistant",
            "message": {"id": "msg_1", "content": content}
        }))
        .unwrap()
    }

    fn stream(ctx: &mut SessionContext, event: serde_json::Value, out: &mut Vec<UIMessageChunk>) {
        let event: StreamEvent = serde_json::from_value(event).unwrap();
        StreamEventHandler::handle(ctx, &event, out);
    }

    #[test]
    fn test_complete_text_emitted_when_not_streamed() {
        let mut ctx = SessionContext::default();
        let mut out = Vec::new();
        AssistantHandler::handle(
            &mut ctx,
            &assistant(json!([{"type": "text", "text": "Hello"}])),
            &mut out,
        );
        let types: Vec<&str> = out.iter().map(UIMessageChunk::type_name).collect();
        assert_eq!(types, vec!["text-start", "text-delta", "text-end"]);
        let UIMessageChunk::TextDelta { id, delta } = &out[1] else {
            panic!("expected text-delta");
        };
        assert_eq!(delta, "Hello");
        assert_eq!(ctx.state.last_text_id(), Some(id.as_str()));
    }

    #[test]
    fn test_complete_text_skipped_after_streaming() {
        let mut ctx = SessionContext::default();
        let mut out = Vec::new();
        stream(
            &mut ctx,
            json!({"type": "content_block_delta", "delta": {"type": "text_delta", "text": "Hello"}}),
            &mut out,
        );
        stream(&mut ctx, json!({"type": "content_block_stop"}), &mut out);
        out.clear();

        AssistantHandler::handle(
            &mut ctx,
            &assistant(json!([{"type": "text", "text": "Hello"}])),
            &mut out,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_subagent_text_emitted_after_parent_streamed_text() {
        let mut ctx = SessionContext::default();
        let mut out = Vec::new();
        stream(
            &mut ctx,
            json!({"type": "content_block_delta", "delta": {"type": "text_delta", "text": "Delegating."}}),
            &mut out,
        );
        stream(&mut ctx, json!({"type": "content_block_stop"}), &mut out);
        AssistantHandler::handle(
            &mut ctx,
            &assistant(json!([{"type": "text", "text": "Delegating."}])),
            &mut out,
        );
        out.clear();

        ctx.set_parent_tool_use_id(Some("task_1".to_string()));
        AssistantHandler::handle(
            &mut ctx,
            &assistant(json!([{"type": "text", "text": "Sub-agent found 3 files"}])),
            &mut out,
        );
        let types: Vec<&str> = out.iter().map(UIMessageChunk::type_name).collect();
        assert_eq!(types, vec!["text-start", "text-delta", "text-end"]);
        let UIMessageChunk::TextDelta { delta, .. } = &out[1] else {
            panic!("expected text-delta");
        };
        assert_eq!(delta, "Sub-agent found 3 files");

        out.clear();
        ctx.set_parent_tool_use_id(None);
        AssistantHandler::handle(
            &mut ctx,
            &assistant(json!([{"type": "text", "text": "Delegating."}])),
            &mut out,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_streamed_tool_is_not_repeated() {
        let mut ctx = SessionContext::default();
        let mut out = Vec::new();
        stream(
            &mut ctx,
            json!({"type": "content_block_start", "content_block": {"type": "tool_use", "id": "toolu_1", "name": "Read", "input": {}}}),
            &mut out,
        );
        stream(
            &mut ctx,
            json!({"type": "content_block_delta", "delta": {"type": "input_json_delta", "partial_json": "{\"file_path\":\"a.rs\"}"}}),
            &mut out,
        );
        stream(&mut ctx, json!({"type": "content_block_stop"}), &mut out);
        out.clear();

        AssistantHandler::handle(
            &mut ctx,
            &assistant(json!([{"type": "tool_use", "id": "toolu_1", "name": "Read", "input": {"file_path": "a.rs"}}])),
            &mut out,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_tool_currently_streaming_is_skipped() {
        let mut ctx = SessionContext::default();
        let mut out = Vec::new();
        stream(
            &mut ctx,
            json!({"type": "content_block_start", "content_block": {"type": "tool_use", "id": "toolu_1", "name": "Read"}}),
            &mut out,
        );
        out.clear();

        AssistantHandler::handle(
            &mut ctx,
            &assistant(json!([{"type": "tool_use", "id": "toolu_1", "name": "Read", "input": {}}])),
            &mut out,
        );
        assert!(out.is_empty());
        assert!(ctx.tool.is_open());
    }

    #[test]
    fn test_unstreamed_tool_emits_input_available_with_composite_id() {
        let mut ctx = SessionContext::default();
        ctx.state.set_parent_tool_use_id(Some("task_9".to_string()));
        let mut out = Vec::new();
        AssistantHandler::handle(
            &mut ctx,
            &assistant(json!([{"type": "tool_use", "id": "toolu_2", "name": "Grep", "input": {"pattern": "fn"}}])),
            &mut out,
        );
        assert_eq!(
            out,
            vec![UIMessageChunk::tool_input_available(
                "task_9:toolu_2",
                "Grep",
                json!({"pattern": "fn"})
            )]
        );
        assert!(ctx.ids.is_emitted("toolu_2"));
        assert_eq!(ctx.ids.get_composite_id("toolu_2"), "task_9:toolu_2");
        assert_eq!(ctx.ids.get_input("toolu_2"), Some(&json!({"pattern": "fn"})));
    }

    #[test]
    fn test_thinking_not_repeated_after_streaming() {
        let mut ctx = SessionContext::default();
        let mut out = Vec::new();
        stream(
            &mut ctx,
            json!({"type": "content_block_start", "content_block": {"type": "thinking", "thinking": ""}}),
            &mut out,
        );
        stream(
            &mut ctx,
            json!({"type": "content_block_delta", "delta": {"type": "thinking_delta", "thinking": "Let me think"}}),
            &mut out,
        );
        stream(&mut ctx, json!({"type": "content_block_stop"}), &mut out);
        out.clear();

        AssistantHandler::handle(
            &mut ctx,
            &assistant(json!([{"type": "thinking", "thinking": "Let me think"}])),
            &mut out,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_unstreamed_thinking_emits_triple_once() {
        let mut ctx = SessionContext::default();
        let mut out = Vec::new();
        let msg = assistant(json!([{"type": "thinking", "thinking": "Hmm"}]));
        AssistantHandler::handle(&mut ctx, &msg, &mut out);
        let types: Vec<&str> = out.iter().map(UIMessageChunk::type_name).collect();
        assert_eq!(
            types,
            vec!["reasoning-start", "reasoning-delta", "reasoning-end"]
        );

        out.clear();
        AssistantHandler::handle(&mut ctx, &msg, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_thinking_sentinel_is_scoped_to_one_api_call() {
        let mut ctx = SessionContext::default();
        let mut out = Vec::new();
        stream(
            &mut ctx,
            json!({"type": "content_block_start", "content_block": {"type": "thinking"}}),
            &mut out,
        );
        stream(&mut ctx, json!({"type": "content_block_stop"}), &mut out);
        stream(
            &mut ctx,
            json!({"type": "message_start", "message": {"id": "msg_2"}}),
            &mut out,
        );
        out.clear();

        AssistantHandler::handle(
            &mut ctx,
            &assistant(json!([{"type": "thinking", "thinking": "Second call"}])),
            &mut out,
        );
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].type_name(), "reasoning-delta");
    }
}
