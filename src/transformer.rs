//! Session orchestrator.
//!
//! A [`Transformer`] owns all per-session state and turns each upstream SDK
//! message into the UI chunks it implies. It moves through three phases:
//! not started, started (after the first message of any kind) and finished
//! (after the `result` message). Messages arriving once finished are ignored.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::chunks::{MessageMetadata, ModelUsageSummary, UIMessageChunk};
use crate::error::TransformError;
use crate::events::{ResultMessage, SdkMessage};
use crate::handlers::{
    AssistantHandler, SessionContext, StreamEventHandler, SystemHandler, UserHandler,
};
use crate::tools::{ToolEnhancer, ToolRegistry};

/// Construction options. Neither changes chunk semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformOptions {
    /// Include the result message's uuid in the aggregate metadata.
    pub emit_sdk_message_uuid: bool,
    /// Log every raw upstream message at DEBUG instead of TRACE.
    pub is_using_ollama: bool,
}

#[derive(Debug)]
pub struct Transformer {
    options: TransformOptions,
    session: SessionContext,
    finished: bool,
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new(TransformOptions::default())
    }
}

impl Transformer {
    /// A transformer with the built-in tool enhancers.
    pub fn new(options: TransformOptions) -> Self {
        Self::with_registry(options, ToolRegistry::with_defaults())
    }

    pub fn with_registry(options: TransformOptions, registry: ToolRegistry) -> Self {
        let mut session = SessionContext::new(registry);
        session.ids.reset();
        Self {
            options,
            session,
            finished: false,
        }
    }

    pub fn options(&self) -> TransformOptions {
        self.options
    }

    /// Adds a tool enhancer. Only allowed before the first message.
    pub fn register_enhancer(
        &mut self,
        enhancer: Box<dyn ToolEnhancer>,
    ) -> Result<(), TransformError> {
        if self.session.state.is_started() {
            return Err(TransformError::RegistrationAfterStart);
        }
        self.session.registry.register(enhancer)
    }

    pub fn is_started(&self) -> bool {
        self.session.state.is_started()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Read access to the session state, for inspection.
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Transforms one upstream message. The returned chunks must be consumed
    /// before the next message is processed.
    pub fn process(&mut self, message: &SdkMessage) -> Vec<UIMessageChunk> {
        let mut out = Vec::new();

        if self.finished {
            debug!(kind = message.kind(), "message_after_finish_ignored");
            return out;
        }

        if !self.session.state.is_started() {
            if let Err(e) = self.session.state.start() {
                warn!(error = %e, "session_start_failed");
            }
            info!("transform_session_start");
            out.push(UIMessageChunk::Start);
            out.push(UIMessageChunk::StartStep);
        }

        // Handlers read the nesting context synchronously, so it must be
        // updated before dispatch.
        if let Some(parent) = message.parent_tool_use_id() {
            self.session.set_parent_tool_use_id(parent.map(str::to_string));
        }

        let ctx = &mut self.session;
        match message {
            SdkMessage::System(msg) => SystemHandler::handle(ctx, msg, &mut out),
            SdkMessage::StreamEvent(msg) => StreamEventHandler::handle(ctx, &msg.event, &mut out),
            SdkMessage::Assistant(msg) => AssistantHandler::handle(ctx, msg, &mut out),
            SdkMessage::User(msg) => UserHandler::handle(ctx, msg, &mut out),
            SdkMessage::Result(result) => self.finish(result, &mut out),
            SdkMessage::Unknown => trace!("unknown_message_type"),
        }

        out
    }

    /// Parses and transforms one JSON value. Values that do not deserialize
    /// as an SDK message produce no chunks.
    pub fn process_value(&mut self, value: Value) -> Vec<UIMessageChunk> {
        self.log_raw(&value);
        match serde_json::from_value::<SdkMessage>(value) {
            Ok(message) => self.process(&message),
            Err(e) => {
                warn!(error = %e, "malformed_sdk_message");
                Vec::new()
            }
        }
    }

    /// Parses and transforms one NDJSON line. Blank lines and invalid JSON
    /// produce no chunks.
    pub fn process_line(&mut self, line: &str) -> Vec<UIMessageChunk> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => self.process_value(value),
            Err(e) => {
                warn!(error = %e, line_len = line.len(), "invalid_json_line");
                Vec::new()
            }
        }
    }

    fn log_raw(&self, value: &Value) {
        if self.options.is_using_ollama {
            debug!(json = %value, "raw_sdk_message");
        } else {
            trace!(json = %value, "raw_sdk_message");
        }
    }

    fn finish(&mut self, result: &ResultMessage, out: &mut Vec<UIMessageChunk>) {
        self.session.close_all(out);

        let metadata = self.build_metadata(result);
        info!(
            session_id = ?metadata.session_id,
            input_tokens = metadata.input_tokens,
            output_tokens = metadata.output_tokens,
            total_cost_usd = ?metadata.total_cost_usd,
            duration_ms = ?metadata.duration_ms,
            is_error = metadata.is_error,
            "transform_session_end"
        );

        out.push(UIMessageChunk::message_metadata(metadata));
        out.push(UIMessageChunk::FinishStep);
        out.push(UIMessageChunk::Finish);
        self.finished = true;
    }

    fn build_metadata(&self, result: &ResultMessage) -> MessageMetadata {
        let usage = result.usage.clone().unwrap_or_default();
        let input_tokens = usage.input_tokens.unwrap_or(0);
        let output_tokens = usage.output_tokens.unwrap_or(0);
        let cache_creation_input_tokens = usage.cache_creation_input_tokens.unwrap_or(0);
        let cache_read_input_tokens = usage.cache_read_input_tokens.unwrap_or(0);

        let model_usage: BTreeMap<String, ModelUsageSummary> = result
            .model_usage
            .iter()
            .map(|(model, usage)| {
                (
                    model.clone(),
                    ModelUsageSummary {
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                        cache_read_input_tokens: usage.cache_read_input_tokens,
                        cache_creation_input_tokens: usage.cache_creation_input_tokens,
                        cost_usd: usage.cost_usd,
                        context_window: usage.context_window,
                    },
                )
            })
            .collect();

        let last_call = self.session.state.last_usage();

        MessageMetadata {
            session_id: result.session_id.clone(),
            result_subtype: result.subtype.clone(),
            is_error: result.is_error,
            num_turns: result.num_turns,
            input_tokens,
            output_tokens,
            cache_creation_input_tokens,
            cache_read_input_tokens,
            total_tokens: input_tokens
                .saturating_add(output_tokens)
                .saturating_add(cache_creation_input_tokens)
                .saturating_add(cache_read_input_tokens),
            model_usage,
            total_cost_usd: result.total_cost_usd,
            duration_ms: self.session.state.elapsed_ms(),
            api_duration_ms: result.duration_api_ms,
            final_text_id: self.session.state.last_text_id().map(str::to_string),
            last_call_input_tokens: last_call.context_input_tokens(),
            last_call_output_tokens: last_call.output_tokens,
            sdk_message_uuid: if self.options.emit_sdk_message_uuid {
                result.uuid.clone()
            } else {
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnhancerError;
    use crate::tools::ToolOutputContext;
    use serde_json::json;

    fn run(transformer: &mut Transformer, lines: &[Value]) -> Vec<UIMessageChunk> {
        lines
            .iter()
            .flat_map(|line| transformer.process_value(line.clone()))
            .collect()
    }

    fn types(chunks: &[UIMessageChunk]) -> Vec<&'static str> {
        chunks.iter().map(UIMessageChunk::type_name).collect()
    }

    fn metadata(chunks: &[UIMessageChunk]) -> &MessageMetadata {
        chunks
            .iter()
            .find_map(|c| match c {
                UIMessageChunk::MessageMetadata { message_metadata } => Some(message_metadata),
                _ => None,
            })
            .expect("message-metadata chunk")
    }

    #[test]
    fn test_minimal_text_session() {
        let mut transformer = Transformer::default();
        let out = run(
            &mut transformer,
            &[
                json!({"type": "stream_event", "event": {"type": "content_block_start", "content_block": {"type": "text"}}}),
                json!({"type": "stream_event", "event": {"type": "content_block_delta", "delta": {"type": "text_delta", "text": "Hi"}}}),
                json!({"type": "stream_event", "event": {"type": "content_block_stop"}}),
                json!({"type": "result", "session_id": "s1", "usage": {"input_tokens": 10, "output_tokens": 2}}),
            ],
        );

        assert_eq!(
            types(&out),
            vec![
                "start",
                "start-step",
                "text-start",
                "text-delta",
                "text-end",
                "message-metadata",
                "finish-step",
                "finish",
            ]
        );
        let UIMessageChunk::TextStart { id } = &out[2] else {
            panic!("expected text-start");
        };
        assert_eq!(out[3], UIMessageChunk::text_delta(id, "Hi"));
        assert_eq!(out[4], UIMessageChunk::text_end(id));

        let meta = metadata(&out);
        assert_eq!(meta.session_id.as_deref(), Some("s1"));
        assert_eq!(meta.input_tokens, 10);
        assert_eq!(meta.output_tokens, 2);
        assert_eq!(meta.total_tokens, 12);
        assert_eq!(meta.final_text_id.as_deref(), Some(id.as_str()));
        assert!(meta.duration_ms.is_some());
        assert!(transformer.is_finished());
    }

    #[test]
    fn test_start_emitted_once() {
        let mut transformer = Transformer::default();
        let first = transformer.process_value(json!({"type": "system", "subtype": "hook_response"}));
        let second = transformer.process_value(json!({"type": "system", "subtype": "hook_response"}));
        assert_eq!(types(&first), vec!["start", "start-step"]);
        assert!(second.is_empty());
    }

    #[test]
    fn test_messages_after_result_are_ignored() {
        let mut transformer = Transformer::default();
        run(&mut transformer, &[json!({"type": "result"})]);
        let after = transformer.process_value(json!({
            "type": "assistant",
            "message": {"content": [{"type": "text", "text": "late"}]}
        }));
        assert!(after.is_empty());
    }

    #[test]
    fn test_streamed_then_complete_tool_dedups() {
        let mut transformer = Transformer::default();
        let out = run(
            &mut transformer,
            &[
                json!({"type": "stream_event", "event": {"type": "content_block_start", "content_block": {"type": "tool_use", "id": "toolu_1", "name": "Bash", "input": {}}}}),
                json!({"type": "stream_event", "event": {"type": "content_block_delta", "delta": {"type": "input_json_delta", "partial_json": "{\"command\":\"ls\"}"}}}),
                json!({"type": "stream_event", "event": {"type": "content_block_stop"}}),
                json!({"type": "assistant", "message": {"content": [{"type": "tool_use", "id": "toolu_1", "name": "Bash", "input": {"command": "ls"}}]}}),
            ],
        );
        let available = out
            .iter()
            .filter(|c| matches!(c, UIMessageChunk::ToolInputAvailable { .. }))
            .count();
        assert_eq!(available, 1);
    }

    #[test]
    fn test_nested_tool_calls_get_composite_ids() {
        let mut transformer = Transformer::default();
        let out = run(
            &mut transformer,
            &[
                json!({"type": "assistant", "parent_tool_use_id": null, "message": {"content": [{"type": "tool_use", "id": "task_1", "name": "Task", "input": {"prompt": "explore"}}]}}),
                json!({"type": "assistant", "parent_tool_use_id": "task_1", "message": {"content": [{"type": "tool_use", "id": "toolu_9", "name": "Read", "input": {"file_path": "a.rs"}}]}}),
                json!({"type": "user", "parent_tool_use_id": "task_1", "message": {"content": [{"type": "tool_result", "tool_use_id": "toolu_9", "content": "fn main() {}"}]}}),
                json!({"type": "user", "parent_tool_use_id": null, "message": {"content": [{"type": "tool_result", "tool_use_id": "task_1", "content": "done"}]}}),
            ],
        );

        let ids: Vec<&str> = out
            .iter()
            .filter_map(|c| match c {
                UIMessageChunk::ToolInputAvailable { tool_call_id, .. }
                | UIMessageChunk::ToolOutputAvailable { tool_call_id, .. } => {
                    Some(tool_call_id.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["task_1", "task_1:toolu_9", "task_1:toolu_9", "task_1"]);
    }

    #[test]
    fn test_absent_parent_keeps_nesting_context() {
        let mut transformer = Transformer::default();
        run(
            &mut transformer,
            &[
                json!({"type": "stream_event", "parent_tool_use_id": "task_1", "event": {"type": "message_start", "message": {}}}),
                json!({"type": "system", "subtype": "status", "status": null}),
            ],
        );
        assert_eq!(transformer.session().state.parent_tool_use_id(), Some("task_1"));

        run(
            &mut transformer,
            &[json!({"type": "stream_event", "parent_tool_use_id": null, "event": {"type": "message_stop"}})],
        );
        assert_eq!(transformer.session().state.parent_tool_use_id(), None);
    }

    #[test]
    fn test_finish_closes_open_streams_and_reports_last_call_usage() {
        let mut transformer = Transformer::default();
        let out = run(
            &mut transformer,
            &[
                json!({"type": "stream_event", "event": {"type": "message_start", "message": {"id": "msg_1", "usage": {"input_tokens": 5, "cache_read_input_tokens": 100, "cache_creation_input_tokens": 20}}}}),
                json!({"type": "stream_event", "event": {"type": "content_block_delta", "delta": {"type": "text_delta", "text": "partial"}}}),
                json!({"type": "stream_event", "event": {"type": "message_delta", "usage": {"output_tokens": 33}}}),
                json!({
                    "type": "result",
                    "subtype": "success",
                    "num_turns": 1,
                    "duration_api_ms": 812,
                    "total_cost_usd": 0.0123,
                    "uuid": "u-1",
                    "modelUsage": {"claude-sonnet": {"inputTokens": 5, "outputTokens": 33, "cacheReadInputTokens": 100, "cacheCreationInputTokens": 20, "costUSD": 0.0123, "contextWindow": 200000}}
                }),
            ],
        );

        assert_eq!(
            &types(&out)[out.len() - 4..],
            &["text-end", "message-metadata", "finish-step", "finish"]
        );
        let meta = metadata(&out);
        assert_eq!(meta.result_subtype.as_deref(), Some("success"));
        assert_eq!(meta.num_turns, Some(1));
        assert_eq!(meta.api_duration_ms, Some(812));
        assert_eq!(meta.last_call_input_tokens, Some(125));
        assert_eq!(meta.last_call_output_tokens, Some(33));
        assert_eq!(meta.model_usage["claude-sonnet"].context_window, Some(200000));
        assert!(meta.final_text_id.is_some());
        assert!(meta.sdk_message_uuid.is_none());
    }

    #[test]
    fn test_sdk_message_uuid_is_opt_in() {
        let mut transformer = Transformer::new(TransformOptions {
            emit_sdk_message_uuid: true,
            ..Default::default()
        });
        let out = run(&mut transformer, &[json!({"type": "result", "uuid": "u-42"})]);
        assert_eq!(metadata(&out).sdk_message_uuid.as_deref(), Some("u-42"));
    }

    #[test]
    fn test_malformed_input_produces_no_chunks() {
        let mut transformer = Transformer::default();
        assert!(transformer.process_line("{not json").is_empty());
        assert!(transformer.process_line("   ").is_empty());
        assert!(
            transformer
                .process_value(json!({"type": "assistant", "message": 7}))
                .is_empty()
        );
        assert!(!transformer.is_started());
    }

    #[test]
    fn test_unknown_message_type_only_starts_session() {
        let mut transformer = Transformer::default();
        let out = transformer.process_line(r#"{"type":"rate_limit","retry_after":3}"#);
        assert_eq!(types(&out), vec!["start", "start-step"]);
    }

    struct Failing;

    impl ToolEnhancer for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn matches(&self, _tool_name: &str) -> bool {
            true
        }

        fn enhance_output(
            &mut self,
            _ctx: &ToolOutputContext<'_>,
        ) -> Result<Vec<UIMessageChunk>, EnhancerError> {
            Err(EnhancerError::Message("boom".to_string()))
        }
    }

    #[test]
    fn test_enhancer_failure_does_not_interrupt_output() {
        let mut transformer = Transformer::default();
        transformer.register_enhancer(Box::new(Failing)).unwrap();
        let out = run(
            &mut transformer,
            &[
                json!({"type": "assistant", "message": {"content": [{"type": "tool_use", "id": "toolu_1", "name": "Read", "input": {}}]}}),
                json!({"type": "user", "message": {"content": [{"type": "tool_result", "tool_use_id": "toolu_1", "content": "ok"}]}}),
            ],
        );
        assert_eq!(
            out.last(),
            Some(&UIMessageChunk::tool_output_available("toolu_1", json!("ok")))
        );
    }

    #[test]
    fn test_registration_rules() {
        let mut transformer = Transformer::default();
        transformer.register_enhancer(Box::new(Failing)).unwrap();
        assert_eq!(
            transformer.register_enhancer(Box::new(Failing)),
            Err(TransformError::DuplicateEnhancer("failing".to_string()))
        );

        transformer.process_line(r#"{"type":"system","subtype":"init"}"#);
        assert_eq!(
            transformer.register_enhancer(Box::new(Failing)),
            Err(TransformError::RegistrationAfterStart)
        );
    }
}
