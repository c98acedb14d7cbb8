//! Activity record data model.
//!
//! One `ActivityRecord` is a single timestamped, classified observation of
//! on-screen activity. Every producer (capture pipeline, frame reuse, test
//! fixtures) emits this structure so downstream consumers rely on
//! consistent fields.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a sample relative to the stated session goal.
///
/// Covers both vocabularies the classifier may speak: the focus-partner
/// pair (`productive`/`procrastinating`) and the team-context pair
/// (`deep_work`/`distracted`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    DeepWork,
    Productive,
    Distracted,
    Procrastinating,
    Unknown,
}

impl Default for ActivityState {
    fn default() -> Self {
        ActivityState::Unknown
    }
}

impl ActivityState {
    /// Aligned with the session goal.
    pub fn is_aligned(&self) -> bool {
        matches!(self, ActivityState::DeepWork | ActivityState::Productive)
    }

    /// Deviating from the session goal. `Unknown` is neither aligned nor
    /// off-task.
    pub fn is_off_task(&self) -> bool {
        matches!(
            self,
            ActivityState::Distracted | ActivityState::Procrastinating
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityState::DeepWork => "deep_work",
            ActivityState::Productive => "productive",
            ActivityState::Distracted => "distracted",
            ActivityState::Procrastinating => "procrastinating",
            ActivityState::Unknown => "unknown",
        }
    }

    /// Parse either vocabulary, case-insensitively. Anything unrecognized
    /// maps to `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "deep_work" | "deepwork" => ActivityState::DeepWork,
            "productive" => ActivityState::Productive,
            "distracted" => ActivityState::Distracted,
            "procrastinating" => ActivityState::Procrastinating,
            _ => ActivityState::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyState {
    Allowed,
    Blocked,
}

impl PrivacyState {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PrivacyState::Allowed)
    }
}

/// Geometry of the focused window, in screen coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FocusBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Owned reference to a frame PNG on disk.
///
/// The ring buffer is the only component that retains these past a capture
/// cycle; `delete` is idempotent so eviction, privacy redaction, and the
/// `Drop` backstop can race without double-deleting.
#[derive(Debug)]
pub struct ImageRef {
    path: PathBuf,
    deleted: AtomicBool,
}

impl ImageRef {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            deleted: AtomicBool::new(false),
        }
    }

    /// Path to the backing file, or `None` once deleted.
    pub fn path(&self) -> Option<&Path> {
        if self.is_deleted() {
            None
        } else {
            Some(&self.path)
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Remove the backing file. Returns true only for the call that
    /// actually performed the removal.
    pub fn delete(&self) -> bool {
        if self.deleted.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                log::debug!("failed to delete frame {}: {err}", self.path.display());
            }
        }
        true
    }
}

impl Drop for ImageRef {
    fn drop(&mut self) {
        self.delete();
    }
}

/// One classified sample of on-screen activity.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub task: String,
    pub activity_type: String,
    pub technical_context: String,
    /// App name as reported by the classifier.
    pub app_name: String,
    /// Frontmost app as reported by the OS at capture time.
    pub active_app: String,
    pub window_title: String,
    pub focus_bounds: Option<FocusBounds>,
    /// 0–100, higher = more aligned with the session goal.
    pub alignment_score: Option<u8>,
    pub state: ActivityState,
    pub privacy_state: PrivacyState,
    pub error_code: Option<String>,
    pub function_target: Option<String>,
    pub documentation_title: Option<String>,
    pub doc_url: Option<String>,
    #[serde(skip)]
    pub image: Option<Arc<ImageRef>>,
}
