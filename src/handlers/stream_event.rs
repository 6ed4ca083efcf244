use tracing::{debug, trace};

use crate::chunks::UIMessageChunk;
use crate::events::{BlockDelta, ContentBlock, StreamEvent};
use crate::ids::{THINKING_STREAMED_KEY, generate_id, make_composite_id};
use crate::trackers::ToolStreamStart;

use super::SessionContext;

/// Demultiplexes raw streaming events into the text, tool and thinking lanes.
pub struct StreamEventHandler;

impl StreamEventHandler {
    pub fn handle(ctx: &mut SessionContext, event: &StreamEvent, out: &mut Vec<UIMessageChunk>) {
        match event {
            StreamEvent::MessageStart { message } => {
                debug!(message_id = ?message.id, model = ?message.model, "message_start");
                // A new API call: thinking and text dedup are scoped to it.
                ctx.thinking.reset();
                ctx.ids.clear_emitted(THINKING_STREAMED_KEY);
                ctx.text.new_turn();
                if let Some(usage) = &message.usage {
                    ctx.state.record_input_usage(usage);
                }
            }
            StreamEvent::MessageDelta { usage } => {
                if let Some(usage) = usage {
                    ctx.state.record_output_usage(usage);
                }
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => Self::block_start(ctx, *index, content_block, out),
            StreamEvent::ContentBlockDelta { delta, .. } => match delta {
                BlockDelta::TextDelta { text } => ctx.text.delta(text, out),
                // Forwarded without checking the open block kind, so
                // interleaved deltas still land in the tool stream.
                BlockDelta::InputJsonDelta { partial_json } => ctx.tool.delta(partial_json, out),
                BlockDelta::ThinkingDelta { thinking } => ctx.thinking.delta(thinking, out),
                BlockDelta::Unknown => trace!("unknown_block_delta"),
            },
            StreamEvent::ContentBlockStop { .. } => ctx.close_all(out),
            StreamEvent::MessageStop => trace!("message_stop"),
            StreamEvent::Unknown => trace!("unknown_stream_event"),
        }
    }

    fn block_start(
        ctx: &mut SessionContext,
        index: Option<usize>,
        block: &ContentBlock,
        out: &mut Vec<UIMessageChunk>,
    ) {
        match block {
            ContentBlock::Text { text } => {
                ctx.close_tool(out);
                ctx.close_text(out);
                ctx.text.start(None, out);
                if !text.is_empty() {
                    ctx.text.delta(text, out);
                }
            }
            ContentBlock::ToolUse { id, name, .. } => {
                ctx.close_text(out);
                ctx.close_tool(out);
                let composite = make_composite_id(id, ctx.state.parent_tool_use_id());
                ctx.ids.set_mapping(id, &composite, Some(name));
                debug!(?index, tool = %name, tool_call_id = %composite, "tool_stream_start");
                let call = ToolStreamStart {
                    tool_call_id: composite,
                    tool_name: name.clone(),
                    original_id: id.clone(),
                };
                if let Some(previous) = ctx.tool.start(call, out) {
                    ctx.complete_tool_input(previous);
                }
            }
            ContentBlock::Thinking { thinking } => {
                // Marked before any delta so the complete message never repeats it.
                ctx.ids.mark_emitted(THINKING_STREAMED_KEY);
                ctx.thinking.start(generate_id("reasoning"), out);
                if !thinking.is_empty() {
                    ctx.thinking.delta(thinking, out);
                }
            }
            ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {
                trace!(?index, "ignored_block_start");
            }
        }
    }
}
