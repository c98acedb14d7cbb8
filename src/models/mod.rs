pub mod activity;
pub mod session;

pub use activity::{ActivityRecord, ActivityState, FocusBounds, ImageRef, PrivacyState};
pub use session::{Session, SessionSpec};
