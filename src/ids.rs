//! Tool-call id bookkeeping.
//!
//! Sub-agents run their own tool calls, so the same original id space is
//! nested under the tool call that spawned the sub-agent. Composite ids keep
//! those calls distinct downstream.

use std::collections::{HashMap, HashSet};

use rand::Rng;
use serde_json::Value;

/// Dedup key marking that a thinking block was streamed during the current API call.
pub const THINKING_STREAMED_KEY: &str = "thinking-streamed";

/// Builds the nesting-aware id for a tool call: `parent:original`, or just
/// `original` at the top level. The parent may itself be composite.
pub fn make_composite_id(original_id: &str, parent_id: Option<&str>) -> String {
    match parent_id {
        Some(parent) => format!("{}:{}", parent, original_id),
        None => original_id.to_string(),
    }
}

/// Generates a block id like `text_1a2b3c4d5e6f`.
pub fn generate_id(prefix: &str) -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 6] = rng.random();
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}_{}", prefix, hex)
}

#[derive(Debug, Default)]
pub struct IdManager {
    tool_id_mapping: HashMap<String, String>,
    tool_name_mapping: HashMap<String, String>,
    tool_input_mapping: HashMap<String, Value>,
    emitted_tool_ids: HashSet<String>,
}

impl IdManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_composite_id(&self, original_id: &str, parent_id: Option<&str>) -> String {
        make_composite_id(original_id, parent_id)
    }

    pub fn set_mapping(&mut self, original_id: &str, composite_id: &str, tool_name: Option<&str>) {
        self.tool_id_mapping
            .insert(original_id.to_string(), composite_id.to_string());
        if let Some(name) = tool_name {
            self.tool_name_mapping
                .insert(original_id.to_string(), name.to_string());
        }
    }

    /// Returns the composite id for `original_id`, or `original_id` itself if unmapped.
    pub fn get_composite_id<'a>(&'a self, original_id: &'a str) -> &'a str {
        self.tool_id_mapping
            .get(original_id)
            .map(String::as_str)
            .unwrap_or(original_id)
    }

    pub fn get_tool_name(&self, original_id: &str) -> Option<&str> {
        self.tool_name_mapping.get(original_id).map(String::as_str)
    }

    pub fn set_input(&mut self, original_id: &str, input: Value) {
        self.tool_input_mapping
            .insert(original_id.to_string(), input);
    }

    pub fn get_input(&self, original_id: &str) -> Option<&Value> {
        self.tool_input_mapping.get(original_id)
    }

    pub fn mark_emitted(&mut self, id: &str) {
        self.emitted_tool_ids.insert(id.to_string());
    }

    pub fn is_emitted(&self, id: &str) -> bool {
        self.emitted_tool_ids.contains(id)
    }

    /// Removes a single key from the dedup ledger. Only used for the
    /// per-API-call thinking sentinel; tool ids stay emitted for the session.
    pub fn clear_emitted(&mut self, id: &str) {
        self.emitted_tool_ids.remove(id);
    }

    pub fn reset(&mut self) {
        self.tool_id_mapping.clear();
        self.tool_name_mapping.clear();
        self.tool_input_mapping.clear();
        self.emitted_tool_ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_composite_id_top_level() {
        assert_eq!(make_composite_id("toolu_1", None), "toolu_1");
    }

    #[test]
    fn test_composite_id_nested() {
        assert_eq!(make_composite_id("toolu_1", Some("p")), "p:toolu_1");
        assert_eq!(make_composite_id("toolu_1", Some("p1:p2")), "p1:p2:toolu_1");
    }

    #[test]
    fn test_composite_id_nesting_is_associative() {
        let inner = make_composite_id("b", Some("a"));
        let nested = make_composite_id("c", Some(&inner));
        assert_eq!(nested, "a:b:c");
    }

    #[test]
    fn test_get_composite_id_is_total() {
        let mut ids = IdManager::new();
        assert_eq!(ids.get_composite_id("unknown"), "unknown");

        ids.set_mapping("toolu_1", "parent:toolu_1", Some("Bash"));
        assert_eq!(ids.get_composite_id("toolu_1"), "parent:toolu_1");
        assert_eq!(ids.get_tool_name("toolu_1"), Some("Bash"));
    }

    #[test]
    fn test_set_mapping_without_name_keeps_previous_name() {
        let mut ids = IdManager::new();
        ids.set_mapping("toolu_1", "toolu_1", Some("Read"));
        ids.set_mapping("toolu_1", "p:toolu_1", None);
        assert_eq!(ids.get_tool_name("toolu_1"), Some("Read"));
        assert_eq!(ids.get_composite_id("toolu_1"), "p:toolu_1");
    }

    #[test]
    fn test_emitted_ledger() {
        let mut ids = IdManager::new();
        assert!(!ids.is_emitted("toolu_1"));
        ids.mark_emitted("toolu_1");
        assert!(ids.is_emitted("toolu_1"));
        ids.mark_emitted("toolu_1");
        assert!(ids.is_emitted("toolu_1"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut ids = IdManager::new();
        ids.set_mapping("a", "p:a", Some("Bash"));
        ids.set_input("a", json!({"command": "ls"}));
        ids.mark_emitted("a");

        ids.reset();

        assert_eq!(ids.get_composite_id("a"), "a");
        assert!(ids.get_tool_name("a").is_none());
        assert!(ids.get_input("a").is_none());
        assert!(!ids.is_emitted("a"));
    }

    #[test]
    fn test_generate_id_is_prefixed_and_unique() {
        let a = generate_id("text");
        let b = generate_id("text");
        assert!(a.starts_with("text_"));
        assert_eq!(a.len(), "text_".len() + 12);
        assert_ne!(a, b);
    }
}
