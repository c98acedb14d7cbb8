//! Privacy gate.
//!
//! Two checkpoints guard the pipeline. Pre-capture: a configured app
//! blocklist skips the whole cycle before any image exists; the cheapest
//! gate. Post-classification: the model may flag a sensitive on-screen
//! context the blocklist missed; those records lose their image
//! immediately and are purged from the buffer within the same cycle.

use std::collections::HashSet;

use crate::models::ActivityRecord;

pub struct PrivacyGate {
    blocklist: HashSet<String>,
}

impl PrivacyGate {
    pub fn new<I, S>(blocklist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blocklist: blocklist
                .into_iter()
                .map(|name| name.as_ref().trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    /// Seed the blocklist from `DEVSCOPE_PRIVACY_APPS` (comma-separated).
    pub fn from_env() -> Self {
        let raw = std::env::var("DEVSCOPE_PRIVACY_APPS").unwrap_or_default();
        Self::new(raw.split(','))
    }

    /// Pre-capture checkpoint: may the frontmost app be captured at all?
    pub fn allows_app(&self, app_name: &str) -> bool {
        !self.blocklist.contains(&app_name.trim().to_lowercase())
    }

    /// Post-classification checkpoint: a blocked record's image is deleted
    /// now and the reference stripped, so the frame cannot outlive the
    /// cycle that produced it.
    pub fn redact_blocked(&self, record: &mut ActivityRecord) {
        if record.privacy_state.is_allowed() {
            return;
        }
        if let Some(image) = record.image.take() {
            image.delete();
            log::info!(
                "[{}] dropped frame for privacy (state={})",
                record.session_id,
                record.state.as_str()
            );
        }
    }
}
