//! Capture provider seam.
//!
//! The core never talks to the OS directly; the embedding application
//! supplies an implementation (ScreenCaptureKit, CGWindowList, a test
//! mock). Metadata lookup and pixel capture are separate calls so the
//! pre-capture privacy gate can skip a cycle before any image exists.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::FocusBounds;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("screen capture permission denied")]
    PermissionDenied,
    #[error("no focusable window to capture")]
    NoActiveWindow,
    #[error("capture unavailable: {0}")]
    Unavailable(String),
}

/// Foreground-window metadata at capture time. All fields are best-effort;
/// providers that cannot resolve a title report `"Unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowMetadata {
    pub app_name: String,
    pub window_title: String,
    pub bounds: Option<FocusBounds>,
}

impl Default for WindowMetadata {
    fn default() -> Self {
        Self {
            app_name: "Unknown".to_string(),
            window_title: "Unknown".to_string(),
            bounds: None,
        }
    }
}

#[async_trait]
pub trait CaptureProvider: Send + Sync {
    /// Metadata for the currently focused window, without capturing pixels.
    async fn active_window_metadata(&self) -> Result<WindowMetadata, CaptureError>;

    /// PNG bytes of the focused window.
    async fn capture_active_window(&self) -> Result<Vec<u8>, CaptureError>;

    /// PNG bytes of the whole screen; the fallback when window capture
    /// fails.
    async fn capture_full_screen(&self) -> Result<Vec<u8>, CaptureError>;
}
