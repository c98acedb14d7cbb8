pub mod controller;
pub mod state;

pub use controller::InterventionController;
pub use state::{CountdownStep, InterventionPhase, InterventionState, ObserveOutcome};
