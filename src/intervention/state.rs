use serde::{Deserialize, Serialize};

use crate::models::ActivityState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum InterventionPhase {
    Idle,
    Monitoring,
    Warning,
    Countdown,
}

impl Default for InterventionPhase {
    fn default() -> Self {
        InterventionPhase::Idle
    }
}

/// Result of feeding one classification into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    /// Streak unchanged or reset; still monitoring.
    Monitoring,
    /// Threshold reached on this observation; a warning must be surfaced.
    WarningRaised,
    /// Machine is not in `Monitoring`; the observation was ignored.
    Ignored,
}

/// Result of one countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    /// Countdown running; carries the seconds remaining to display.
    Running(u32),
    /// Countdown hit zero: the machine is back in `Monitoring` with the
    /// streak reset, and the prompt should be dismissed.
    Expired,
    /// Not in `Countdown`.
    Ignored,
}

/// The intervention machine, driven purely by the classification stream
/// and elapsed time. No timers, no I/O; the controller supplies both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionState {
    pub phase: InterventionPhase,
    /// Consecutive off-task classifications observed while monitoring.
    pub off_task_streak: u32,
    pub off_task_threshold: u32,
    pub countdown_duration_secs: u32,
    pub countdown_remaining_secs: u32,
}

impl InterventionState {
    pub fn new(off_task_threshold: u32, countdown_duration_secs: u32) -> Self {
        Self {
            phase: InterventionPhase::Idle,
            off_task_streak: 0,
            off_task_threshold: off_task_threshold.max(1),
            countdown_duration_secs,
            countdown_remaining_secs: 0,
        }
    }

    /// `Idle -> Monitoring`, entered once the session's initial delay has
    /// elapsed. No-op in any other phase.
    pub fn begin_monitoring(&mut self) {
        if self.phase == InterventionPhase::Idle {
            self.phase = InterventionPhase::Monitoring;
            self.off_task_streak = 0;
        }
    }

    /// Feed one classification. Off-task increments the streak, aligned
    /// resets it, `unknown` does neither. Raising the streak to the
    /// threshold moves `Monitoring -> Warning` exactly once.
    pub fn observe(&mut self, state: ActivityState) -> ObserveOutcome {
        if self.phase != InterventionPhase::Monitoring {
            return ObserveOutcome::Ignored;
        }
        if state.is_off_task() {
            self.off_task_streak += 1;
            if self.off_task_streak >= self.off_task_threshold {
                self.phase = InterventionPhase::Warning;
                return ObserveOutcome::WarningRaised;
            }
        } else if state.is_aligned() {
            self.off_task_streak = 0;
        }
        ObserveOutcome::Monitoring
    }

    /// User acknowledged the warning: `Warning -> Countdown`. Idempotent:
    /// repeated signals while already counting down (or in any other
    /// phase) change nothing.
    pub fn acknowledge(&mut self) -> bool {
        if self.phase != InterventionPhase::Warning {
            return false;
        }
        self.phase = InterventionPhase::Countdown;
        self.countdown_remaining_secs = self.countdown_duration_secs;
        true
    }

    /// Advance the countdown by one second. Emits `duration, …, 1` on
    /// successive ticks; the tick after `1` expires the countdown,
    /// returning to `Monitoring` with the streak cleared.
    pub fn tick(&mut self) -> CountdownStep {
        if self.phase != InterventionPhase::Countdown {
            return CountdownStep::Ignored;
        }
        let current = self.countdown_remaining_secs;
        if current == 0 {
            self.phase = InterventionPhase::Monitoring;
            self.off_task_streak = 0;
            return CountdownStep::Expired;
        }
        self.countdown_remaining_secs = current - 1;
        CountdownStep::Running(current)
    }

    /// Session stop from any phase: timers are cancelled by the caller,
    /// the machine returns to `Idle` immediately.
    pub fn stop(&mut self) {
        self.phase = InterventionPhase::Idle;
        self.off_task_streak = 0;
        self.countdown_remaining_secs = 0;
    }
}
