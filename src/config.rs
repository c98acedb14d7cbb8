use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

/// What the pipeline does with a cycle whose classification failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyFailurePolicy {
    /// Insert a record with `state = unknown` (image redacted).
    InsertUnknown,
    /// Drop the cycle entirely.
    Skip,
}

/// Configuration for one monitor instance. Passed in at construction and
/// threaded through every component; there is no ambient settings state.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between capture cycles. Zero means back-to-back cycles bounded
    /// only by pipeline latency.
    pub capture_interval: Duration,
    /// Grace period before the first capture of a session.
    pub initial_delay: Duration,
    /// Ring buffer capacity per session.
    pub buffer_capacity: usize,
    /// Consecutive off-task classifications required to raise a warning.
    pub off_task_threshold: u32,
    /// Countdown length started on user acknowledgment, in seconds.
    pub countdown_duration_secs: u32,
    /// App names whose frames are never captured (case-insensitive).
    pub privacy_app_blocklist: HashSet<String>,
    /// Ceiling on classification calls; enforced as minimum call spacing.
    pub max_requests_per_minute: u32,
    /// Per-attempt budget for one classification call.
    pub classify_timeout: Duration,
    /// Extra attempts after a retryable classification failure.
    pub classify_max_retries: u32,
    pub on_classify_failure: ClassifyFailurePolicy,
    /// Lookback window for commit context exports.
    pub export_window: Duration,
    /// Consecutive capture failures before a degraded-state event.
    pub degraded_after_failures: u32,
    /// Minimum perceptual-hash distance that forces a fresh classification.
    pub reclassify_distance: u32,
    /// How long a previous classification may be reused for a visually
    /// unchanged frame. Zero disables reuse.
    pub reuse_max_age: Duration,
    /// Countdown tick cadence. One second in production; tests shorten it.
    pub countdown_tick_interval: Duration,
    /// Root under which per-session frame directories are created.
    pub temp_root: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_secs(10),
            initial_delay: Duration::ZERO,
            buffer_capacity: 180,
            off_task_threshold: 1,
            countdown_duration_secs: 15,
            privacy_app_blocklist: HashSet::new(),
            max_requests_per_minute: 6,
            classify_timeout: Duration::from_secs(20),
            classify_max_retries: 1,
            on_classify_failure: ClassifyFailurePolicy::InsertUnknown,
            export_window: Duration::from_secs(30 * 60),
            degraded_after_failures: 3,
            reclassify_distance: 8,
            reuse_max_age: Duration::from_secs(20),
            countdown_tick_interval: Duration::from_secs(1),
            temp_root: std::env::temp_dir().join("devscope"),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            bail!("buffer_capacity must be greater than zero");
        }
        if self.off_task_threshold == 0 {
            bail!("off_task_threshold must be at least 1");
        }
        if self.countdown_duration_secs == 0 {
            bail!("countdown_duration_secs must be greater than zero");
        }
        if self.max_requests_per_minute == 0 {
            bail!("max_requests_per_minute must be at least 1");
        }
        if self.countdown_tick_interval.is_zero() {
            bail!("countdown_tick_interval must be greater than zero");
        }
        Ok(())
    }
}
