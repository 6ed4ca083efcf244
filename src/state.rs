use std::time::Instant;

use tracing::debug;

use crate::error::TransformError;
use crate::events::Usage;

/// Token counts observed for the most recent model API call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastCallUsage {
    pub input_tokens: Option<u64>,
    pub cache_creation_input_tokens: Option<u64>,
    pub cache_read_input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

impl LastCallUsage {
    /// Everything the call read as context: uncached plus both cache counts.
    pub fn context_input_tokens(&self) -> Option<u64> {
        let parts = [
            self.input_tokens,
            self.cache_creation_input_tokens,
            self.cache_read_input_tokens,
        ];
        if parts.iter().all(Option::is_none) {
            return None;
        }
        Some(parts.iter().flatten().fold(0u64, |acc, n| acc.saturating_add(*n)))
    }
}

/// Session-scoped state shared by the handlers.
#[derive(Debug, Default)]
pub struct StateManager {
    started: bool,
    start_time: Option<Instant>,
    current_parent_tool_use_id: Option<String>,
    last_text_id: Option<String>,
    last_usage: LastCallUsage,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the session as started. Starting twice is a caller bug.
    pub fn start(&mut self) -> Result<(), TransformError> {
        if self.started {
            return Err(TransformError::SessionAlreadyStarted);
        }
        self.started = true;
        self.start_time = Some(Instant::now());
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Milliseconds since `start()`, if the session has started.
    pub fn elapsed_ms(&self) -> Option<u64> {
        self.start_time
            .map(|t| u64::try_from(t.elapsed().as_millis()).unwrap_or(u64::MAX))
    }

    pub fn set_parent_tool_use_id(&mut self, parent: Option<String>) {
        if self.current_parent_tool_use_id != parent {
            debug!(parent = ?parent, "parent_tool_use_id_changed");
        }
        self.current_parent_tool_use_id = parent;
    }

    pub fn parent_tool_use_id(&self) -> Option<&str> {
        self.current_parent_tool_use_id.as_deref()
    }

    pub fn set_last_text_id(&mut self, id: impl Into<String>) {
        self.last_text_id = Some(id.into());
    }

    pub fn last_text_id(&self) -> Option<&str> {
        self.last_text_id.as_deref()
    }

    /// Records input-side usage from a message_start event.
    pub fn record_input_usage(&mut self, usage: &Usage) {
        self.last_usage.input_tokens = usage.input_tokens;
        self.last_usage.cache_creation_input_tokens = usage.cache_creation_input_tokens;
        self.last_usage.cache_read_input_tokens = usage.cache_read_input_tokens;
        self.last_usage.output_tokens = usage.output_tokens;
    }

    /// Records output-side usage from a message_delta event.
    pub fn record_output_usage(&mut self, usage: &Usage) {
        if let Some(output) = usage.output_tokens {
            self.last_usage.output_tokens = Some(output);
        }
    }

    pub fn last_usage(&self) -> &LastCallUsage {
        &self.last_usage
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
