use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

/// Pairs a context compaction start with its boundary notification.
///
/// At most one compaction is pending; starting again replaces it.
#[derive(Debug, Default)]
pub struct SystemCompactEnhancer {
    counter: u64,
    pending: Option<String>,
}

impl SystemCompactEnhancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a fresh compaction id, remembers it and returns it.
    pub fn start_compacting(&mut self) -> String {
        self.counter += 1;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let id = format!("compact-{}-{}", millis, self.counter);
        if let Some(replaced) = self.pending.replace(id.clone()) {
            debug!(replaced = %replaced, "compaction_restarted");
        }
        id
    }

    /// Returns and clears the pending compaction id, if any.
    pub fn finish_compacting(&mut self) -> Option<String> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn reset(&mut self) {
        self.pending = None;
    }
}
