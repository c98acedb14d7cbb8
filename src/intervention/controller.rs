use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;

use crate::events::{EventBus, MonitorEvent};
use crate::models::ActivityState;

use super::state::{CountdownStep, InterventionState, ObserveOutcome};

/// Async shell around [`InterventionState`]: serializes access, runs the
/// countdown ticker task, and translates transitions into presentation
/// events on the bus.
pub struct InterventionController {
    session_id: String,
    state: Arc<Mutex<InterventionState>>,
    events: EventBus,
    ticker: Mutex<Option<JoinHandle<()>>>,
    tick_interval: Duration,
}

impl InterventionController {
    pub fn new(
        session_id: String,
        off_task_threshold: u32,
        countdown_duration_secs: u32,
        tick_interval: Duration,
        events: EventBus,
    ) -> Self {
        Self {
            session_id,
            state: Arc::new(Mutex::new(InterventionState::new(
                off_task_threshold,
                countdown_duration_secs,
            ))),
            events,
            ticker: Mutex::new(None),
            tick_interval,
        }
    }

    pub async fn snapshot(&self) -> InterventionState {
        self.state.lock().await.clone()
    }

    /// Called by the scheduler once the session's initial delay elapsed.
    pub async fn begin_monitoring(&self) {
        self.state.lock().await.begin_monitoring();
    }

    /// Feed one classification from the pipeline.
    pub async fn observe(&self, activity: ActivityState) {
        let outcome = self.state.lock().await.observe(activity);
        if outcome == ObserveOutcome::WarningRaised {
            info!(
                "off-task threshold reached for session {}, raising warning",
                self.session_id
            );
            self.events.emit(MonitorEvent::WarningRaised {
                session_id: self.session_id.clone(),
            });
        }
    }

    /// Inbound acknowledgment from the presentation layer. Idempotent;
    /// the first call starts the countdown ticker.
    pub async fn acknowledge(&self) {
        let started = {
            let mut state = self.state.lock().await;
            state.acknowledge().then(|| state.countdown_duration_secs)
        };
        let Some(duration_secs) = started else {
            return;
        };

        self.events.emit(MonitorEvent::CountdownStarted {
            session_id: self.session_id.clone(),
            duration_secs,
        });
        self.spawn_ticker().await;
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let session_id = self.session_id.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            // The first tick of a tokio interval completes immediately;
            // consume it so the countdown advances once per period.
            interval.tick().await;
            loop {
                interval.tick().await;
                let step = state.lock().await.tick();
                match step {
                    CountdownStep::Running(remaining) => {
                        events.emit(MonitorEvent::CountdownTick {
                            session_id: session_id.clone(),
                            remaining_secs: remaining,
                        });
                    }
                    CountdownStep::Expired => {
                        events.emit(MonitorEvent::CountdownTick {
                            session_id: session_id.clone(),
                            remaining_secs: 0,
                        });
                        events.emit(MonitorEvent::CountdownExpired {
                            session_id: session_id.clone(),
                        });
                        break;
                    }
                    CountdownStep::Ignored => break,
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    /// Session teardown: cancel any running countdown without emitting
    /// expiry, return the machine to `Idle`.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
        self.state.lock().await.stop();
    }
}
