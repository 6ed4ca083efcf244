//! Tool enhancer plugins.
//!
//! Enhancers are matched by tool name and run in ascending priority order.
//! They observe tool input completion and may synthesize extra chunks once a
//! tool's output arrives. A failing enhancer is logged and skipped; it never
//! stops the other enhancers or the core emission.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::chunks::{TaskNotification, UIMessageChunk};
use crate::error::{EnhancerError, TransformError};
use crate::events::content_text;

pub const DEFAULT_PRIORITY: i32 = 100;

/// Maximum length of a command quoted in a task summary.
const COMMAND_SUMMARY_MAX_LEN: usize = 60;

static OUTPUT_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Output is being written to: (\S+)").expect("valid regex")
});

static BACKGROUND_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Command running in background with ID: (\S+)").expect("valid regex")
});

/// Passed to enhancers once a tool's full input is known.
#[derive(Debug, Clone, Copy)]
pub struct ToolInputContext<'a> {
    /// Id used downstream; composite for sub-agent calls.
    pub tool_call_id: &'a str,
    /// Id as issued by the model.
    pub original_id: &'a str,
    pub tool_name: &'a str,
    pub input: &'a Value,
}

/// Passed to enhancers once a tool's result is known.
#[derive(Debug, Clone, Copy)]
pub struct ToolOutputContext<'a> {
    pub tool_call_id: &'a str,
    pub original_id: &'a str,
    pub tool_name: &'a str,
    pub input: Option<&'a Value>,
    /// Resolved output, as it will appear in `tool-output-available`.
    pub output: &'a Value,
    /// The tool_result block content, string or array of parts.
    pub raw_content: &'a Value,
    /// The call failed. `output` is then the raw content and the core
    /// emits `tool-output-error` instead of `tool-output-available`.
    pub is_error: bool,
}

pub trait ToolEnhancer {
    /// Unique identity within a registry.
    fn name(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    fn matches(&self, tool_name: &str) -> bool;

    fn on_input_complete(&mut self, _ctx: &ToolInputContext<'_>) -> Result<(), EnhancerError> {
        Ok(())
    }

    fn enhance_output(
        &mut self,
        _ctx: &ToolOutputContext<'_>,
    ) -> Result<Vec<UIMessageChunk>, EnhancerError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    enhancers: Vec<Box<dyn ToolEnhancer>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.enhancers.iter().map(|e| e.name()).collect();
        f.debug_struct("ToolRegistry")
            .field("enhancers", &names)
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in enhancers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.enhancers.push(Box::new(BashEnhancer::new()));
        registry
    }

    /// Adds an enhancer, keeping the list sorted by priority. Ties keep
    /// registration order.
    pub fn register(&mut self, enhancer: Box<dyn ToolEnhancer>) -> Result<(), TransformError> {
        if self.enhancers.iter().any(|e| e.name() == enhancer.name()) {
            return Err(TransformError::DuplicateEnhancer(enhancer.name().to_string()));
        }
        debug!(name = enhancer.name(), priority = enhancer.priority(), "enhancer_registered");
        self.enhancers.push(enhancer);
        self.enhancers.sort_by_key(|e| e.priority());
        Ok(())
    }

    pub fn find_enhancers<'a>(
        &'a self,
        tool_name: &'a str,
    ) -> impl Iterator<Item = &'a dyn ToolEnhancer> + 'a {
        self.enhancers
            .iter()
            .filter(move |e| e.matches(tool_name))
            .map(|e| &**e)
    }

    /// Names of all registered enhancers in run order.
    pub fn names(&self) -> Vec<&str> {
        self.enhancers.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.enhancers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enhancers.is_empty()
    }

    pub fn notify_input_complete(&mut self, ctx: &ToolInputContext<'_>) {
        for enhancer in self
            .enhancers
            .iter_mut()
            .filter(|e| e.matches(ctx.tool_name))
        {
            if let Err(e) = enhancer.on_input_complete(ctx) {
                warn!(
                    enhancer = enhancer.name(),
                    tool = ctx.tool_name,
                    tool_call_id = ctx.tool_call_id,
                    error = %e,
                    "enhancer_input_failed"
                );
            }
        }
    }

    pub fn collect_enhanced_output(&mut self, ctx: &ToolOutputContext<'_>) -> Vec<UIMessageChunk> {
        let mut chunks = Vec::new();
        for enhancer in self
            .enhancers
            .iter_mut()
            .filter(|e| e.matches(ctx.tool_name))
        {
            match enhancer.enhance_output(ctx) {
                Ok(extra) => chunks.extend(extra),
                Err(e) => {
                    warn!(
                        enhancer = enhancer.name(),
                        tool = ctx.tool_name,
                        tool_call_id = ctx.tool_call_id,
                        error = %e,
                        "enhancer_output_failed"
                    );
                }
            }
        }
        chunks
    }
}

/// The part of a `Bash` input this enhancer reads.
#[derive(Debug, Deserialize)]
struct BashInput {
    command: Option<String>,
}

/// Detects `Bash` commands that were moved to the background and announces
/// them with a `task-notification` chunk.
#[derive(Debug, Default)]
pub struct BashEnhancer {
    /// Command strings keyed by original tool id.
    commands: HashMap<String, String>,
}

impl BashEnhancer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ToolEnhancer for BashEnhancer {
    fn name(&self) -> &str {
        "bash-background"
    }

    fn matches(&self, tool_name: &str) -> bool {
        tool_name == "Bash"
    }

    fn on_input_complete(&mut self, ctx: &ToolInputContext<'_>) -> Result<(), EnhancerError> {
        let input: BashInput = serde_json::from_value(ctx.input.clone())?;
        if let Some(command) = input.command {
            self.commands.insert(ctx.original_id.to_string(), command);
        }
        Ok(())
    }

    fn enhance_output(
        &mut self,
        ctx: &ToolOutputContext<'_>,
    ) -> Result<Vec<UIMessageChunk>, EnhancerError> {
        let remembered = self.commands.remove(ctx.original_id);
        if ctx.is_error {
            return Ok(Vec::new());
        }

        let Some(task_id) = background_task_id(ctx.output, ctx.raw_content) else {
            return Ok(Vec::new());
        };

        let command = remembered.or_else(|| {
            ctx.input
                .and_then(|input| input.get("command"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        let summary = match &command {
            Some(cmd) => format!(
                "Background command started: {}",
                truncate_str(cmd, COMMAND_SUMMARY_MAX_LEN)
            ),
            None => "Background command started".to_string(),
        };

        debug!(task_id = %task_id, tool_call_id = ctx.tool_call_id, "background_task_detected");

        Ok(vec![UIMessageChunk::TaskNotification(TaskNotification {
            shell_id: task_id.clone(),
            task_id,
            status: "running".to_string(),
            output_file: extract_output_file(ctx.raw_content),
            summary: Some(summary),
            command,
        })])
    }
}

/// Finds the background task id, preferring the structured marker.
fn background_task_id(output: &Value, raw_content: &Value) -> Option<String> {
    if let Some(id) = output
        .get("backgroundTaskId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
    {
        return Some(id.to_string());
    }
    let text = content_text(raw_content);
    BACKGROUND_ID
        .captures(&text)
        .map(|caps| caps[1].to_string())
}

/// Extracts the output file path announced in the raw tool result text.
/// Handles both string content and arrays of text parts.
pub fn extract_output_file(raw_content: &Value) -> Option<String> {
    let text = content_text(raw_content);
    OUTPUT_FILE
        .captures(&text)
        .map(|caps| caps[1].to_string())
}

/// Truncates a string to `max_len` characters, appending "..." if truncated.
/// Newlines become spaces so the result stays on one line.
fn truncate_str(s: &str, max_len: usize) -> String {
    let single_line: String = s.chars().map(|c| if c == '\n' { ' ' } else { c }).collect();

    if single_line.chars().count() <= max_len {
        single_line
    } else {
        let kept: String = single_line
            .chars()
            .take(max_len.saturating_sub(3))
            .collect();
        format!("{}...", kept)
    }
}
