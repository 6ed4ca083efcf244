use serde_json::Value;
use tracing::{debug, trace};

use crate::chunks::UIMessageChunk;
use crate::events::{ContentBlock, UserMessage, content_text};
use crate::tools::ToolOutputContext;

use super::SessionContext;

/// Tool results carried by user messages.
pub struct UserHandler;

impl UserHandler {
    pub fn handle(ctx: &mut SessionContext, msg: &UserMessage, out: &mut Vec<UIMessageChunk>) {
        for block in msg.message.content.blocks() {
            let ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } = block
            else {
                trace!("ignored_user_block");
                continue;
            };

            let tool_call_id = ctx.ids.get_composite_id(tool_use_id).to_string();

            let output = if *is_error {
                content.clone()
            } else {
                resolve_output(msg.tool_use_result.as_ref(), content)
            };

            // Enhancers see failed results too, so they can drop per-call state.
            if let Some(tool_name) = ctx.ids.get_tool_name(tool_use_id) {
                let enhanced = ctx.registry.collect_enhanced_output(&ToolOutputContext {
                    tool_call_id: &tool_call_id,
                    original_id: tool_use_id,
                    tool_name,
                    input: ctx.ids.get_input(tool_use_id),
                    output: &output,
                    raw_content: content,
                    is_error: *is_error,
                });
                out.extend(enhanced);
            }

            if *is_error {
                debug!(tool_call_id = %tool_call_id, "tool_output_error");
                out.push(UIMessageChunk::tool_output_error(
                    tool_call_id,
                    content_text(content),
                ));
            } else {
                out.push(UIMessageChunk::tool_output_available(tool_call_id, output));
            }
        }
    }
}

/// Picks the tool output: the structured `tool_use_result` when present,
/// then string content parsed as JSON, then the content as-is.
fn resolve_output(tool_use_result: Option<&Value>, content: &Value) -> Value {
    if let Some(result) = tool_use_result {
        return result.clone();
    }
    if let Value::String(s) = content
        && let Ok(parsed) = serde_json::from_str::<Value>(s)
    {
        return parsed;
    }
    content.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunks::TaskNotification;
    use crate::tools::{ToolInputContext, ToolRegistry};
    use serde_json::json;

    fn user(value: serde_json::Value) -> UserMessage {
        serde_json::from_value(value).unwrap()
    }

    fn tool_result(id: &str, content: serde_json::Value, is_error: bool) -> serde_json::Value {
        json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{"type": "tool_result", "tool_use_id": id, "content": content, "is_error": is_error}]
            }
        })
    }

    #[test]
    fn test_error_result_emits_output_error() {
        let mut ctx = SessionContext::default();
        ctx.ids.set_mapping("toolu_1", "p:toolu_1", Some("Bash"));
        let mut out = Vec::new();
        UserHandler::handle(
            &mut ctx,
            &user(tool_result("toolu_1", json!("command not found"), true)),
            &mut out,
        );
        assert_eq!(
            out,
            vec![UIMessageChunk::tool_output_error("p:toolu_1", "command not found")]
        );
    }

    #[test]
    fn test_output_prefers_tool_use_result() {
        let mut ctx = SessionContext::default();
        let mut out = Vec::new();
        let mut value = tool_result("toolu_1", json!("plain text"), false);
        value["tool_use_result"] = json!({"stdout": "plain text", "stderr": ""});
        UserHandler::handle(&mut ctx, &user(value), &mut out);
        assert_eq!(
            out,
            vec![UIMessageChunk::tool_output_available(
                "toolu_1",
                json!({"stdout": "plain text", "stderr": ""})
            )]
        );
    }

    #[test]
    fn test_output_parses_json_string_content() {
        let mut ctx = SessionContext::default();
        let mut out = Vec::new();
        UserHandler::handle(
            &mut ctx,
            &user(tool_result("toolu_1", json!("{\"ok\":true}"), false)),
            &mut out,
        );
        assert_eq!(
            out,
            vec![UIMessageChunk::tool_output_available("toolu_1", json!({"ok": true}))]
        );
    }

    #[test]
    fn test_output_falls_back_to_raw_content() {
        let mut ctx = SessionContext::default();
        let mut out = Vec::new();
        let parts = json!([{"type": "text", "text": "line one"}]);
        UserHandler::handle(
            &mut ctx,
            &user(tool_result("toolu_1", parts.clone(), false)),
            &mut out,
        );
        assert_eq!(
            out,
            vec![UIMessageChunk::tool_output_available("toolu_1", parts)]
        );

        out.clear();
        UserHandler::handle(
            &mut ctx,
            &user(tool_result("toolu_2", json!("not json"), false)),
            &mut out,
        );
        assert_eq!(
            out,
            vec![UIMessageChunk::tool_output_available("toolu_2", json!("not json"))]
        );
    }

    #[test]
    fn test_enhanced_chunks_precede_output() {
        let mut ctx = SessionContext::new(ToolRegistry::with_defaults());
        ctx.ids.set_mapping("toolu_1", "toolu_1", Some("Bash"));
        ctx.ids.set_input("toolu_1", json!({"command": "npm start"}));
        let mut out = Vec::new();
        let mut value = tool_result(
            "toolu_1",
            json!("Command running in background with ID: shell_3"),
            false,
        );
        value["tool_use_result"] = json!({"backgroundTaskId": "shell_3"});
        UserHandler::handle(&mut ctx, &user(value), &mut out);

        assert_eq!(out.len(), 2);
        let UIMessageChunk::TaskNotification(TaskNotification {
            task_id, command, ..
        }) = &out[0]
        else {
            panic!("expected task-notification, got {:?}", out[0]);
        };
        assert_eq!(task_id, "shell_3");
        assert_eq!(command.as_deref(), Some("npm start"));
        assert_eq!(out[1].type_name(), "tool-output-available");
    }

    #[test]
    fn test_error_result_reaches_enhancers() {
        let mut ctx = SessionContext::new(ToolRegistry::with_defaults());
        ctx.ids.set_mapping("toolu_1", "toolu_1", Some("Bash"));
        let input = json!({"command": "make"});
        ctx.registry.notify_input_complete(&ToolInputContext {
            tool_call_id: "toolu_1",
            original_id: "toolu_1",
            tool_name: "Bash",
            input: &input,
        });
        let mut out = Vec::new();
        UserHandler::handle(
            &mut ctx,
            &user(tool_result(
                "toolu_1",
                json!("Command running in background with ID: shell_9"),
                true,
            )),
            &mut out,
        );

        assert_eq!(
            out,
            vec![UIMessageChunk::tool_output_error(
                "toolu_1",
                "Command running in background with ID: shell_9"
            )]
        );
        let pending = ctx
            .registry
            .collect_enhanced_output(&ToolOutputContext {
                tool_call_id: "toolu_1",
                original_id: "toolu_1",
                tool_name: "Bash",
                input: None,
                output: &json!({"backgroundTaskId": "shell_9"}),
                raw_content: &Value::Null,
                is_error: false,
            });
        let [UIMessageChunk::TaskNotification(task)] = pending.as_slice() else {
            panic!("expected one task notification, got {:?}", pending);
        };
        assert_eq!(task.command, None);
    }

    #[test]
    fn test_plain_string_user_message_is_ignored() {
        let mut ctx = SessionContext::default();
        let mut out = Vec::new();
        UserHandler::handle(
            &mut ctx,
            &user(json!({"type": "user", "message": {"role": "user", "content": "hi"}})),
            &mut out,
        );
        assert!(out.is_empty());
    }
}
