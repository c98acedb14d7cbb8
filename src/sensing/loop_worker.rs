use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::buffer::RingBuffer;
use crate::capture::{CaptureProvider, WindowMetadata};
use crate::classify::{Classification, ClassifyError, ClassifyRequest, GatewayAdapter};
use crate::config::{ClassifyFailurePolicy, MonitorConfig};
use crate::events::{EventBus, MonitorEvent};
use crate::intervention::InterventionController;
use crate::models::{ActivityRecord, ImageRef, PrivacyState, Session};
use crate::privacy::PrivacyGate;

use super::phash::{frame_hash, hash_distance};

// Set to false to silence the per-cycle capture logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Everything one session's pipeline needs, threaded in at start.
#[derive(Clone)]
pub(crate) struct PipelineCtx {
    pub session: Arc<Session>,
    pub buffer: Arc<RingBuffer>,
    pub provider: Arc<dyn CaptureProvider>,
    pub gateway: Arc<GatewayAdapter>,
    pub privacy: Arc<PrivacyGate>,
    pub intervention: Arc<InterventionController>,
    pub events: EventBus,
    pub config: Arc<MonitorConfig>,
}

/// Last real classification, kept to skip gateway calls for visually
/// unchanged frames.
struct ReuseState {
    phash: String,
    classification: Classification,
    classified_at: Instant,
}

type SharedReuse = Arc<tokio::sync::Mutex<Option<ReuseState>>>;

enum Cycle {
    /// Frame captured and handed to the classification task.
    Handed(JoinHandle<()>),
    /// Cycle intentionally produced nothing (privacy gate, persistence
    /// failure). Not a capture failure.
    Skipped,
}

pub(crate) async fn capture_loop(ctx: PipelineCtx, cancel: CancellationToken) {
    if !ctx.config.initial_delay.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(ctx.config.initial_delay) => {}
            _ = cancel.cancelled() => return,
        }
    }

    ctx.intervention.begin_monitoring().await;

    // interval() panics on zero; a zero configured interval means
    // back-to-back cycles bounded only by pipeline latency.
    let period = ctx.config.capture_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // An interval's first tick completes immediately; consume it so each
    // cycle starts a full period after the initial delay.
    ticker.tick().await;

    let reuse: SharedReuse = Arc::new(tokio::sync::Mutex::new(None));
    let mut in_flight: Option<JoinHandle<()>> = None;
    let mut consecutive_failures: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // One classification unit in flight at a time. This keeps
                // insertion in capture order and bounds queued work; the
                // ticker itself is never delayed by a slow gateway.
                if let Some(handle) = &in_flight {
                    if !handle.is_finished() {
                        log_warn!(
                            "classification still in flight for session {}, skipping cycle",
                            ctx.session.id
                        );
                        continue;
                    }
                }

                match run_cycle(&ctx, &cancel, &reuse).await {
                    Ok(Cycle::Handed(handle)) => {
                        consecutive_failures = 0;
                        in_flight = Some(handle);
                    }
                    Ok(Cycle::Skipped) => {
                        consecutive_failures = 0;
                    }
                    Err(err) => {
                        consecutive_failures += 1;
                        log_error!(
                            "capture failed for session {} ({consecutive_failures} in a row): {err:?}",
                            ctx.session.id
                        );
                        if consecutive_failures == ctx.config.degraded_after_failures {
                            ctx.events.emit(MonitorEvent::CaptureDegraded {
                                session_id: ctx.session.id.clone(),
                                consecutive_failures,
                            });
                        }
                    }
                }
            }
            _ = cancel.cancelled() => {
                log_info!("capture loop for session {} shutting down", ctx.session.id);
                break;
            }
        }
    }

    // Let the single in-flight classification finish; it observes the
    // cancelled token and discards its result.
    if let Some(handle) = in_flight.take() {
        let _ = handle.await;
    }
}

struct Frame {
    png: Arc<Vec<u8>>,
    image: Arc<ImageRef>,
    metadata: WindowMetadata,
    timestamp: DateTime<Utc>,
}

async fn run_cycle(
    ctx: &PipelineCtx,
    cancel: &CancellationToken,
    reuse: &SharedReuse,
) -> Result<Cycle> {
    let cycle_start = Instant::now();
    let timestamp = Utc::now();

    let metadata = match ctx.provider.active_window_metadata().await {
        Ok(metadata) => metadata,
        Err(err) => {
            log_warn!("active window metadata unavailable: {err}");
            WindowMetadata::default()
        }
    };

    // Pre-capture privacy gate: no image is ever created for a
    // blocklisted app.
    if !ctx.privacy.allows_app(&metadata.app_name) {
        log_info!(
            "[{}] privacy blocklist skipped capture of {}",
            ctx.session.project_name,
            metadata.app_name
        );
        return Ok(Cycle::Skipped);
    }

    let png = match ctx.provider.capture_active_window().await {
        Ok(bytes) => bytes,
        Err(err) => {
            log_warn!("active window capture failed ({err}), falling back to full screen");
            ctx.provider
                .capture_full_screen()
                .await
                .context("full-screen fallback capture failed")?
        }
    };

    let file_name = format!("frame_{}.png", timestamp.format("%Y%m%d_%H%M%S_%6f"));
    let path = ctx.session.temp_dir.join(file_name);
    if let Err(err) = tokio::fs::write(&path, &png).await {
        // Persistence trouble drops this cycle's record; the loop goes on.
        log_error!("failed to persist frame {}: {err}", path.display());
        return Ok(Cycle::Skipped);
    }

    log_info!(
        "captured {} bytes for session {} in {}ms",
        png.len(),
        ctx.session.id,
        cycle_start.elapsed().as_millis()
    );

    let frame = Frame {
        png: Arc::new(png),
        image: Arc::new(ImageRef::new(path)),
        metadata,
        timestamp,
    };

    let handle = tokio::spawn(classify_and_insert(
        ctx.clone(),
        frame,
        cancel.clone(),
        Arc::clone(reuse),
    ));
    Ok(Cycle::Handed(handle))
}

/// The independent per-frame unit of work: hash, classify (or reuse),
/// gate, insert, feed the intervention machine.
async fn classify_and_insert(
    ctx: PipelineCtx,
    frame: Frame,
    cancel: CancellationToken,
    reuse: SharedReuse,
) {
    let classify_start = Instant::now();

    let phash = {
        let bytes = Arc::clone(&frame.png);
        match tokio::task::spawn_blocking(move || frame_hash(&bytes)).await {
            Ok(Ok(hash)) => Some(hash),
            Ok(Err(err)) => {
                log_warn!("frame hash failed: {err}");
                None
            }
            Err(err) => {
                log_warn!("frame hash worker join failed: {err}");
                None
            }
        }
    };

    let reused = match &phash {
        Some(hash) => previous_result_for(&ctx, hash, &reuse).await,
        None => None,
    };

    let outcome = match reused {
        Some(classification) => {
            log_info!(
                "[{}] frame visually unchanged, reusing previous classification",
                ctx.session.project_name
            );
            Ok(classification)
        }
        None => {
            let request = ClassifyRequest {
                image_png: Arc::clone(&frame.png),
                goal: ctx.session.goal.clone(),
                allowed: ctx.session.allowed_description.clone(),
                blocked: ctx.session.blocked_description.clone(),
                focus_hint: Some(frame.metadata.clone()),
            };
            let result = ctx.gateway.classify(&request).await;
            if let (Ok(classification), Some(hash)) = (&result, &phash) {
                *reuse.lock().await = Some(ReuseState {
                    phash: hash.clone(),
                    classification: classification.clone(),
                    classified_at: Instant::now(),
                });
            }
            result
        }
    };

    let mut record = match outcome {
        Ok(classification) => classified_record(&ctx, &frame, classification),
        Err(ClassifyError::RateLimited) => {
            // Over the request ceiling: degrade by skipping the cycle.
            log_warn!(
                "[{}] classification rate limited, skipping cycle",
                ctx.session.project_name
            );
            frame.image.delete();
            return;
        }
        Err(err) => {
            log_warn!(
                "[{}] classification failed: {err}",
                ctx.session.project_name
            );
            match ctx.config.on_classify_failure {
                ClassifyFailurePolicy::Skip => {
                    frame.image.delete();
                    return;
                }
                ClassifyFailurePolicy::InsertUnknown => unknown_record(&ctx, &frame, &err),
            }
        }
    };

    ctx.privacy.redact_blocked(&mut record);

    if cancel.is_cancelled() {
        // The session is stopping; this result is discarded.
        frame.image.delete();
        return;
    }

    let inserted = ctx.buffer.insert(record);
    if !inserted.privacy_state.is_allowed() {
        // Blocked records count toward occupancy only transiently: their
        // image is already gone and the record leaves within the cycle.
        ctx.buffer.purge_blocked();
    }

    log_info!(
        "[{}] buffered frame - task={} app={} state={} ({}ms)",
        ctx.session.project_name,
        inserted.task,
        inserted.app_name,
        inserted.state.as_str(),
        classify_start.elapsed().as_millis()
    );

    ctx.intervention.observe(inserted.state).await;
}

async fn previous_result_for(
    ctx: &PipelineCtx,
    current_hash: &str,
    reuse: &SharedReuse,
) -> Option<Classification> {
    if ctx.config.reuse_max_age.is_zero() {
        return None;
    }
    let guard = reuse.lock().await;
    let previous = guard.as_ref()?;
    if previous.classified_at.elapsed() > ctx.config.reuse_max_age {
        return None;
    }
    if hash_distance(current_hash, &previous.phash) >= ctx.config.reclassify_distance {
        return None;
    }
    Some(previous.classification.clone())
}

fn classified_record(
    ctx: &PipelineCtx,
    frame: &Frame,
    classification: Classification,
) -> ActivityRecord {
    ActivityRecord {
        timestamp: frame.timestamp,
        session_id: ctx.session.id.clone(),
        task: classification.task,
        activity_type: classification.activity_type,
        technical_context: classification.technical_context,
        app_name: classification.app_name,
        active_app: frame.metadata.app_name.clone(),
        window_title: frame.metadata.window_title.clone(),
        focus_bounds: frame.metadata.bounds,
        alignment_score: classification.alignment_score,
        state: classification.state,
        privacy_state: classification.privacy_state,
        error_code: classification.error_code,
        function_target: classification.function_target,
        documentation_title: classification.documentation_title,
        doc_url: classification.doc_url,
        image: Some(Arc::clone(&frame.image)),
    }
}

/// A classification failure still leaves a mark on the timeline: an
/// imageless `unknown` record. The frame itself is deleted; without a
/// classification there is no basis for retaining pixels.
fn unknown_record(ctx: &PipelineCtx, frame: &Frame, err: &ClassifyError) -> ActivityRecord {
    frame.image.delete();
    ActivityRecord {
        timestamp: frame.timestamp,
        session_id: ctx.session.id.clone(),
        task: "Unknown Task".to_string(),
        activity_type: "UNKNOWN".to_string(),
        technical_context: format!("classification failed: {err}"),
        app_name: frame.metadata.app_name.clone(),
        active_app: frame.metadata.app_name.clone(),
        window_title: frame.metadata.window_title.clone(),
        focus_bounds: frame.metadata.bounds,
        alignment_score: None,
        state: crate::models::ActivityState::Unknown,
        privacy_state: PrivacyState::Allowed,
        error_code: None,
        function_target: None,
        documentation_title: None,
        doc_url: None,
        image: None,
    }
}
