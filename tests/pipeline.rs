//! End-to-end pipeline tests with a mock capture provider and a scripted
//! classification gateway: capture -> classify -> privacy gate -> buffer,
//! consumed by the intervention machine and the commit exporter.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use devscope::{
    ActivityState, CaptureError, CaptureProvider, Classification, ClassificationGateway,
    ClassifyError, ClassifyRequest, InterventionPhase, Monitor, MonitorConfig, MonitorEvent,
    PrivacyState, SessionSpec, WindowMetadata,
};

#[derive(Clone, Copy, PartialEq)]
enum CaptureBehavior {
    Ok,
    /// Window capture fails, full-screen fallback succeeds.
    FailActive,
    /// Both capture paths fail.
    FailBoth,
}

struct MockProvider {
    app_name: String,
    behavior: CaptureBehavior,
    captures: AtomicU32,
    fallbacks: AtomicU32,
}

impl MockProvider {
    fn new(app_name: &str) -> Arc<Self> {
        Self::with_behavior(app_name, CaptureBehavior::Ok)
    }

    fn with_behavior(app_name: &str, behavior: CaptureBehavior) -> Arc<Self> {
        Arc::new(Self {
            app_name: app_name.to_string(),
            behavior,
            captures: AtomicU32::new(0),
            fallbacks: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl CaptureProvider for MockProvider {
    async fn active_window_metadata(&self) -> Result<WindowMetadata, CaptureError> {
        Ok(WindowMetadata {
            app_name: self.app_name.clone(),
            window_title: "main.rs".to_string(),
            bounds: None,
        })
    }

    async fn capture_active_window(&self) -> Result<Vec<u8>, CaptureError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            CaptureBehavior::Ok => Ok(tiny_png()),
            _ => Err(CaptureError::NoActiveWindow),
        }
    }

    async fn capture_full_screen(&self) -> Result<Vec<u8>, CaptureError> {
        self.fallbacks.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            CaptureBehavior::FailBoth => Err(CaptureError::PermissionDenied),
            _ => Ok(tiny_png()),
        }
    }
}

struct StaticGateway {
    result: Result<Classification, ClassifyError>,
    delay: Duration,
    calls: AtomicU32,
}

impl StaticGateway {
    fn new(result: Result<Classification, ClassifyError>) -> Arc<Self> {
        Arc::new(Self {
            result,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        })
    }

    fn slow(result: Result<Classification, ClassifyError>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            result,
            delay,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ClassificationGateway for StaticGateway {
    async fn classify(
        &self,
        _request: &ClassifyRequest,
    ) -> Result<Classification, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

fn tiny_png() -> Vec<u8> {
    use image::{ImageBuffer, ImageFormat, Rgb};
    let img = ImageBuffer::from_pixel(16, 16, Rgb([90u8, 90, 90]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn classification(state: ActivityState, privacy: PrivacyState) -> Classification {
    Classification {
        task: "Testing the pipeline".to_string(),
        activity_type: "CODING".to_string(),
        state,
        privacy_state: privacy,
        alignment_score: Some(75),
        ..Classification::default()
    }
}

fn fast_config(temp_root: &Path) -> MonitorConfig {
    MonitorConfig {
        capture_interval: Duration::from_millis(20),
        off_task_threshold: 3,
        countdown_duration_secs: 2,
        countdown_tick_interval: Duration::from_millis(20),
        max_requests_per_minute: 60_000,
        reuse_max_age: Duration::ZERO,
        temp_root: temp_root.to_path_buf(),
        ..MonitorConfig::default()
    }
}

fn spec(project: &str, repo: Option<PathBuf>) -> SessionSpec {
    SessionSpec {
        project_name: project.to_string(),
        goal: "finish the release".to_string(),
        allowed_description: "editor, terminal, docs".to_string(),
        blocked_description: "social media".to_string(),
        repo_path: repo,
    }
}

async fn wait_for(
    rx: &mut tokio::sync::broadcast::Receiver<MonitorEvent>,
    wait: Duration,
    predicate: impl Fn(&MonitorEvent) -> bool,
) -> MonitorEvent {
    timeout(wait, async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn sustained_off_task_raises_warning_and_countdown_completes() {
    let temp = tempfile::tempdir().unwrap();
    let provider = MockProvider::new("Editor");
    let gateway = StaticGateway::new(Ok(classification(
        ActivityState::Procrastinating,
        PrivacyState::Allowed,
    )));

    let monitor = Monitor::new(fast_config(temp.path()), provider, gateway).unwrap();
    let mut rx = monitor.subscribe();
    let session_id = monitor.start_session(spec("focus", None)).await.unwrap();

    wait_for(&mut rx, Duration::from_secs(10), |event| {
        matches!(event, MonitorEvent::WarningRaised { .. })
    })
    .await;

    let state = monitor.intervention_state(&session_id).await.unwrap();
    assert_eq!(state.phase, InterventionPhase::Warning);
    // Three consecutive off-task records were needed.
    assert!(monitor.snapshot(&session_id).await.unwrap().len() >= 3);

    monitor.acknowledge(&session_id).await.unwrap();
    // A second acknowledgment is a no-op, not a second countdown.
    monitor.acknowledge(&session_id).await.unwrap();

    let mut remaining = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("countdown stalled")
            .unwrap();
        match event {
            MonitorEvent::CountdownStarted { duration_secs, .. } => {
                assert_eq!(duration_secs, 2)
            }
            MonitorEvent::CountdownTick { remaining_secs, .. } => remaining.push(remaining_secs),
            MonitorEvent::CountdownExpired { .. } => break,
            _ => {}
        }
    }
    assert_eq!(remaining, vec![2, 1, 0]);

    let state = monitor.intervention_state(&session_id).await.unwrap();
    assert_eq!(state.phase, InterventionPhase::Monitoring);
    assert_eq!(state.off_task_streak, 0);

    monitor.stop_session(&session_id).await.unwrap();
}

#[tokio::test]
async fn blocklisted_app_is_never_captured() {
    let temp = tempfile::tempdir().unwrap();
    let provider = MockProvider::new("1Password");
    let gateway = StaticGateway::new(Ok(classification(
        ActivityState::DeepWork,
        PrivacyState::Allowed,
    )));

    let mut config = fast_config(temp.path());
    config.privacy_app_blocklist = ["1password".to_string()].into_iter().collect();

    let monitor = Monitor::new(config, provider.clone(), gateway.clone()).unwrap();
    let session_id = monitor.start_session(spec("private", None)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(provider.captures.load(Ordering::SeqCst), 0);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    assert!(monitor.snapshot(&session_id).await.unwrap().is_empty());

    monitor.stop_session(&session_id).await.unwrap();
}

#[tokio::test]
async fn blocked_classifications_stay_invisible_and_frameless() {
    let temp = tempfile::tempdir().unwrap();
    let provider = MockProvider::new("Browser");
    let gateway = StaticGateway::new(Ok(classification(
        ActivityState::Distracted,
        PrivacyState::Blocked,
    )));

    let mut config = fast_config(temp.path());
    config.off_task_threshold = 1_000; // keep the machine quiet here

    let monitor = Monitor::new(config, provider, gateway.clone()).unwrap();
    let session_id = monitor.start_session(spec("browsing", None)).await.unwrap();

    // Let several cycles classify and purge.
    timeout(Duration::from_secs(10), async {
        while gateway.calls.load(Ordering::SeqCst) < 5 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("pipeline made no progress");

    assert!(monitor.snapshot(&session_id).await.unwrap().is_empty());

    let session_dir = temp.path().join("browsing");
    let frames = std::fs::read_dir(&session_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    // At most the frame of the cycle currently in flight may exist.
    assert!(frames <= 1, "blocked frames left on disk: {frames}");

    monitor.stop_session(&session_id).await.unwrap();
    assert!(!session_dir.exists());
}

#[tokio::test]
async fn classification_failures_insert_unknown_records() {
    let temp = tempfile::tempdir().unwrap();
    let provider = MockProvider::new("Editor");
    let gateway = StaticGateway::new(Err(ClassifyError::InvalidResponse(
        "model returned prose".to_string(),
    )));

    let mut config = fast_config(temp.path());
    config.off_task_threshold = 1_000;
    config.classify_max_retries = 0;

    let monitor = Monitor::new(config, provider, gateway).unwrap();
    let mut rx = monitor.subscribe();
    let session_id = monitor.start_session(spec("flaky", None)).await.unwrap();

    timeout(Duration::from_secs(10), async {
        loop {
            if !monitor.snapshot(&session_id).await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("no unknown record appeared");

    let snapshot = monitor.snapshot(&session_id).await.unwrap();
    assert!(snapshot
        .iter()
        .all(|record| record.state == ActivityState::Unknown && record.image.is_none()));

    // Unknown records never trip the intervention machine.
    assert!(timeout(Duration::from_millis(200), async {
        loop {
            if let Ok(MonitorEvent::WarningRaised { .. }) = rx.recv().await {
                return;
            }
        }
    })
    .await
    .is_err());

    monitor.stop_session(&session_id).await.unwrap();
}

#[tokio::test]
async fn buffer_capacity_holds_under_sustained_capture() {
    let temp = tempfile::tempdir().unwrap();
    let provider = MockProvider::new("Editor");
    let gateway = StaticGateway::new(Ok(classification(
        ActivityState::DeepWork,
        PrivacyState::Allowed,
    )));

    let mut config = fast_config(temp.path());
    config.buffer_capacity = 4;
    config.off_task_threshold = 1_000;

    let monitor = Monitor::new(config, provider, gateway.clone()).unwrap();
    let session_id = monitor.start_session(spec("steady", None)).await.unwrap();

    timeout(Duration::from_secs(10), async {
        while gateway.calls.load(Ordering::SeqCst) < 10 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("pipeline made no progress");

    let snapshot = monitor.snapshot(&session_id).await.unwrap();
    assert!(snapshot.len() <= 4, "buffer exceeded capacity");
    // Strict capture order.
    for pair in snapshot.windows(2) {
        assert!(pair[0].timestamp < pair[1].timestamp);
    }

    monitor.stop_session(&session_id).await.unwrap();
}

#[tokio::test]
async fn duplicate_commit_events_export_one_artifact() {
    let temp = tempfile::tempdir().unwrap();
    let repo = tempfile::tempdir().unwrap();
    let logs_dir = repo.path().join(".git").join("logs");
    std::fs::create_dir_all(&logs_dir).unwrap();
    let head_log = logs_dir.join("HEAD");
    std::fs::write(&head_log, "").unwrap();

    let provider = MockProvider::new("Editor");
    let gateway = StaticGateway::new(Ok(classification(
        ActivityState::DeepWork,
        PrivacyState::Allowed,
    )));

    let mut config = fast_config(temp.path());
    config.off_task_threshold = 1_000;

    let monitor = Monitor::new(config, provider, gateway.clone()).unwrap();
    let mut rx = monitor.subscribe();
    let session_id = monitor
        .start_session(spec("exported", Some(repo.path().to_path_buf())))
        .await
        .unwrap();

    // Wait for some activity to accumulate, then "commit" twice in quick
    // succession with the same hash (an amend-style double event).
    timeout(Duration::from_secs(10), async {
        while monitor.snapshot(&session_id).await.unwrap().len() < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("no activity accumulated");

    let line = "0000000000 abc123def456789 tester <t@example.com> 1700000000 +0000\tcommit: wire exporter\n";
    append(&head_log, line);
    append(&head_log, line);

    let event = wait_for(&mut rx, Duration::from_secs(10), |event| {
        matches!(event, MonitorEvent::ContextExported { .. })
    })
    .await;
    let MonitorEvent::ContextExported { commit, path, .. } = event else {
        unreachable!()
    };
    assert_eq!(commit, "abc123def456789");
    assert!(path.exists());

    // Give the duplicate event time to (not) produce a second artifact.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let exports: Vec<_> = std::fs::read_dir(repo.path().join(".devscope"))
        .unwrap()
        .collect();
    assert_eq!(exports.len(), 1, "duplicate commit event double-exported");

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("# DevScope Commit Context"));
    assert!(text.contains("abc123def456789"));
    assert!(text.contains("## Visual Timeline"));

    monitor.stop_session(&session_id).await.unwrap();
}

#[tokio::test]
async fn stop_waits_for_in_flight_classification_and_drains() {
    let temp = tempfile::tempdir().unwrap();
    let provider = MockProvider::new("Editor");
    let gateway = StaticGateway::slow(
        Ok(classification(
            ActivityState::DeepWork,
            PrivacyState::Allowed,
        )),
        Duration::from_millis(400),
    );

    let monitor = Monitor::new(fast_config(temp.path()), provider, gateway.clone()).unwrap();
    let session_id = monitor.start_session(spec("slowmodel", None)).await.unwrap();

    // Ensure a classification call is in flight.
    timeout(Duration::from_secs(5), async {
        while gateway.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no classification started");

    monitor.stop_session(&session_id).await.unwrap();

    // Session fully gone: queries fail, frames directory removed.
    assert!(monitor.snapshot(&session_id).await.is_err());
    assert!(!temp.path().join("slowmodel").exists());
}

#[tokio::test]
async fn window_capture_failure_falls_back_to_full_screen() {
    let temp = tempfile::tempdir().unwrap();
    let provider = MockProvider::with_behavior("Editor", CaptureBehavior::FailActive);
    let gateway = StaticGateway::new(Ok(classification(
        ActivityState::DeepWork,
        PrivacyState::Allowed,
    )));

    let mut config = fast_config(temp.path());
    config.off_task_threshold = 1_000;

    let monitor = Monitor::new(config, provider.clone(), gateway).unwrap();
    let session_id = monitor.start_session(spec("fallback", None)).await.unwrap();

    timeout(Duration::from_secs(10), async {
        while monitor.snapshot(&session_id).await.unwrap().len() < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("fallback captures produced no records");

    assert!(provider.fallbacks.load(Ordering::SeqCst) >= 2);
    monitor.stop_session(&session_id).await.unwrap();
}

#[tokio::test]
async fn repeated_capture_failures_signal_degraded_state() {
    let temp = tempfile::tempdir().unwrap();
    let provider = MockProvider::with_behavior("Editor", CaptureBehavior::FailBoth);
    let gateway = StaticGateway::new(Ok(classification(
        ActivityState::DeepWork,
        PrivacyState::Allowed,
    )));

    let monitor = Monitor::new(fast_config(temp.path()), provider, gateway.clone()).unwrap();
    let mut rx = monitor.subscribe();
    let session_id = monitor.start_session(spec("broken", None)).await.unwrap();

    let event = wait_for(&mut rx, Duration::from_secs(10), |event| {
        matches!(event, MonitorEvent::CaptureDegraded { .. })
    })
    .await;
    let MonitorEvent::CaptureDegraded {
        consecutive_failures,
        ..
    } = event
    else {
        unreachable!()
    };
    assert_eq!(consecutive_failures, 3);

    // No frames, no classifications, no records, but the loop is alive.
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    assert!(monitor.snapshot(&session_id).await.unwrap().is_empty());

    monitor.stop_session(&session_id).await.unwrap();
}

fn append(path: &Path, line: &str) {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(line.as_bytes()).unwrap();
    file.flush().unwrap();
}
