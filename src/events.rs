//! Engine event notification
//!
//! A plain listener set with best-effort delivery: every listener sees every
//! event, a panicking listener is caught and logged, and nothing ever aborts
//! the orchestration or the remaining listeners.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

use crate::types::SelectionReason;

/// Events pushed to host listeners (analytics/telemetry sinks).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A content swap was accepted; emitted before the transition window opens
    ContentAdaptation {
        engine_id: String,
        from_variant: String,
        to_variant: String,
        sections: Vec<String>,
        confidence: f64,
        reason: SelectionReason,
        timestamp: DateTime<Utc>,
    },
    /// The transition window closed
    ContentSwapComplete {
        engine_id: String,
        variant_id: String,
        sections: Vec<String>,
        /// Measured wall-clock duration of the swap
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
pub type ListenerId = u64;

type Listener = Box<dyn Fn(&EngineEvent) + Send>;

/// Listener registry with per-listener error isolation.
pub struct EventBus {
    listeners: Vec<(ListenerId, Listener)>,
    next_id: ListenerId,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a listener. Returns an id for [`EventBus::unsubscribe`].
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&EngineEvent) + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false when the id is unknown.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver an event to every listener, isolating failures per listener.
    pub fn emit(&self, event: &EngineEvent) {
        for (id, listener) in &self.listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!(listener_id = id, "event listener panicked; continuing");
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
