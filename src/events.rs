//! Presentation signals.
//!
//! The core is headless: anything a front end would render (warnings,
//! countdown ticks, degraded-capture notices, export confirmations) is
//! published on a broadcast channel. Emission never blocks and tolerates
//! there being no subscriber.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MonitorEvent {
    /// Sustained off-task activity detected; the UI should surface the
    /// intervention prompt.
    WarningRaised { session_id: String },
    CountdownStarted {
        session_id: String,
        duration_secs: u32,
    },
    CountdownTick {
        session_id: String,
        remaining_secs: u32,
    },
    /// Countdown reached zero; the UI should dismiss the prompt.
    CountdownExpired { session_id: String },
    /// Repeated consecutive capture failures. The loop keeps retrying.
    CaptureDegraded {
        session_id: String,
        consecutive_failures: u32,
    },
    ContextExported {
        session_id: String,
        commit: String,
        path: PathBuf,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: MonitorEvent) {
        // A send error only means nobody is listening right now.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
