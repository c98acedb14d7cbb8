pub mod buffer;
pub mod capture;
pub mod classify;
pub mod config;
pub mod events;
pub mod intervention;
pub mod models;
pub mod monitor;
pub mod privacy;
pub mod sensing;
pub mod trigger;
pub mod utils;

pub use capture::{CaptureError, CaptureProvider, WindowMetadata};
pub use classify::{
    parse_classification, Classification, ClassificationGateway, ClassifyError, ClassifyRequest,
};
pub use config::{ClassifyFailurePolicy, MonitorConfig};
pub use events::{EventBus, MonitorEvent};
pub use intervention::{InterventionPhase, InterventionState};
pub use models::{
    ActivityRecord, ActivityState, FocusBounds, ImageRef, PrivacyState, Session, SessionSpec,
};
pub use monitor::Monitor;
pub use privacy::PrivacyGate;
pub use trigger::ContextReporter;
