//! Session lifecycle facade.
//!
//! One `Monitor` owns the capture provider, the classification gateway,
//! and a registry of running sessions. Each started session gets its own
//! ring buffer, capture loop, intervention controller, and (when a
//! repository is attached) git trigger; stopping a session tears all of
//! that down and drains the buffer before returning.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use tokio::sync::broadcast;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::buffer::RingBuffer;
use crate::capture::CaptureProvider;
use crate::classify::{ClassificationGateway, GatewayAdapter};
use crate::config::MonitorConfig;
use crate::events::{EventBus, MonitorEvent};
use crate::intervention::{InterventionController, InterventionState};
use crate::models::{ActivityRecord, Session, SessionSpec};
use crate::privacy::PrivacyGate;
use crate::sensing::{PipelineCtx, SensingController};
use crate::trigger::{ContextReporter, GitTrigger};

struct SessionRuntime {
    session: Arc<Session>,
    buffer: Arc<RingBuffer>,
    intervention: Arc<InterventionController>,
    sensing: Mutex<SensingController>,
    trigger: Mutex<Option<GitTrigger>>,
}

pub struct Monitor {
    config: Arc<MonitorConfig>,
    provider: Arc<dyn CaptureProvider>,
    gateway: Arc<GatewayAdapter>,
    privacy: Arc<PrivacyGate>,
    events: EventBus,
    sessions: Mutex<HashMap<String, Arc<SessionRuntime>>>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        provider: Arc<dyn CaptureProvider>,
        gateway: Arc<dyn ClassificationGateway>,
    ) -> Result<Self> {
        config.validate()?;

        let gateway = Arc::new(GatewayAdapter::new(
            gateway,
            config.classify_timeout,
            config.classify_max_retries,
            config.max_requests_per_minute,
        ));
        let privacy = Arc::new(PrivacyGate::new(config.privacy_app_blocklist.iter()));

        Ok(Self {
            config: Arc::new(config),
            provider,
            gateway,
            privacy,
            events: EventBus::default(),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Receiver for presentation signals (warnings, countdown ticks,
    /// degraded capture, export confirmations).
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Create a session and start monitoring it.
    pub async fn start_session(&self, spec: SessionSpec) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(
            session_id.clone(),
            spec,
            &self.config.temp_root,
        ));
        std::fs::create_dir_all(&session.temp_dir).with_context(|| {
            format!(
                "failed to create session frame directory {}",
                session.temp_dir.display()
            )
        })?;

        let buffer = Arc::new(RingBuffer::new(self.config.buffer_capacity));
        let intervention = Arc::new(InterventionController::new(
            session_id.clone(),
            self.config.off_task_threshold,
            self.config.countdown_duration_secs,
            self.config.countdown_tick_interval,
            self.events.clone(),
        ));

        let mut sensing = SensingController::new();
        sensing.start(PipelineCtx {
            session: Arc::clone(&session),
            buffer: Arc::clone(&buffer),
            provider: Arc::clone(&self.provider),
            gateway: Arc::clone(&self.gateway),
            privacy: Arc::clone(&self.privacy),
            intervention: Arc::clone(&intervention),
            events: self.events.clone(),
            config: Arc::clone(&self.config),
        })?;

        let trigger = match &session.repo_path {
            Some(repo) => GitTrigger::spawn(
                Arc::clone(&session),
                Arc::clone(&buffer),
                ContextReporter::new(repo.clone(), self.config.export_window),
                self.events.clone(),
            ),
            None => None,
        };

        info!(
            "created session {} for project {}",
            session_id, session.project_name
        );

        let runtime = Arc::new(SessionRuntime {
            session,
            buffer,
            intervention,
            sensing: Mutex::new(sensing),
            trigger: Mutex::new(trigger),
        });
        self.sessions
            .lock()
            .await
            .insert(session_id.clone(), runtime);

        Ok(session_id)
    }

    /// Stop a session. Cancels the next capture tick immediately, lets at
    /// most one in-flight classification finish (result discarded), stops
    /// the trigger and any countdown, drains the buffer, and removes the
    /// frame directory, all before returning.
    pub async fn stop_session(&self, session_id: &str) -> Result<()> {
        let runtime = self
            .sessions
            .lock()
            .await
            .remove(session_id)
            .ok_or_else(|| anyhow!("session {session_id} not found"))?;

        runtime.sensing.lock().await.stop().await?;
        if let Some(mut trigger) = runtime.trigger.lock().await.take() {
            trigger.stop().await;
        }
        runtime.intervention.shutdown().await;

        let drained = runtime.buffer.drain();
        if let Err(err) = std::fs::remove_dir_all(&runtime.session.temp_dir) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "failed to remove frame directory {}: {err}",
                    runtime.session.temp_dir.display()
                );
            }
        }

        info!("stopped session {session_id} ({drained} records drained)");
        Ok(())
    }

    pub async fn stop_all(&self) -> Result<()> {
        let ids: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        for id in ids {
            self.stop_session(&id).await?;
        }
        Ok(())
    }

    /// Point-in-time ordered copy of a session's visible records.
    pub async fn snapshot(&self, session_id: &str) -> Result<Vec<Arc<ActivityRecord>>> {
        Ok(self.runtime(session_id).await?.buffer.snapshot())
    }

    /// Visible records newer than `window`, oldest first.
    pub async fn recent_activity(
        &self,
        session_id: &str,
        window: std::time::Duration,
    ) -> Result<Vec<Arc<ActivityRecord>>> {
        Ok(self.runtime(session_id).await?.buffer.recent(window))
    }

    /// Inbound acknowledgment of an intervention warning. Idempotent.
    pub async fn acknowledge(&self, session_id: &str) -> Result<()> {
        self.runtime(session_id)
            .await?
            .intervention
            .acknowledge()
            .await;
        Ok(())
    }

    pub async fn intervention_state(&self, session_id: &str) -> Result<InterventionState> {
        Ok(self
            .runtime(session_id)
            .await?
            .intervention
            .snapshot()
            .await)
    }

    /// Metadata of every running session.
    pub async fn sessions(&self) -> Vec<Session> {
        self.sessions
            .lock()
            .await
            .values()
            .map(|runtime| (*runtime.session).clone())
            .collect()
    }

    async fn runtime(&self, session_id: &str) -> Result<Arc<SessionRuntime>> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| anyhow!("session {session_id} not found"))
    }
}
