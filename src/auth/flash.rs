//! One-shot flash messages
//!
//! Messages are queued per visitor and removed the first time they are read,
//! so they show up on the next rendered page only.

use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use serde::Serialize;
use std::time::Duration;

use super::visitor::VisitorId;

/// Unread messages are dropped after this long
const FLASH_TTL: Duration = Duration::from_secs(30 * 60);

/// Severity, used as the CSS class suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Danger,
}

impl FlashLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub message: String,
}

/// Flash message store keyed by visitor session
///
/// `add` and `take` both go through moka's per-key entry operations, so a
/// message pushed while the queue is being drained lands either in the
/// drained batch or in a fresh queue, never in neither.
pub struct FlashBag {
    queues: Cache<String, Vec<FlashMessage>>,
}

impl FlashBag {
    pub fn new() -> Self {
        let queues = Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(FLASH_TTL)
            .build();

        Self { queues }
    }

    /// Queue a message for the visitor's next page
    pub async fn add(&self, visitor: &VisitorId, level: FlashLevel, message: impl Into<String>) {
        let flash = FlashMessage {
            level,
            message: message.into(),
        };

        self.queues
            .entry_by_ref(visitor.as_str())
            .and_upsert_with(|existing| async move {
                let mut queue = existing.map(|entry| entry.into_value()).unwrap_or_default();
                queue.push(flash);
                queue
            })
            .await;
    }

    /// Remove and return all queued messages, oldest first
    pub async fn take(&self, visitor: &VisitorId) -> Vec<FlashMessage> {
        let result = self
            .queues
            .entry_by_ref(visitor.as_str())
            .and_compute_with(|_| async { Op::Remove })
            .await;

        match result {
            CompResult::Removed(entry) => entry.into_value(),
            _ => Vec::new(),
        }
    }
}

impl Default for FlashBag {
    fn default() -> Self {
        Self::new()
    }
}
