use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::TaskId;
use crate::timer::{TimerPhase, TimerState};

/// Every state change of the timer engine produces an Event.
/// The CLI prints them; tests assert on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        phase: TimerPhase,
        remaining_seconds: u64,
        /// True when the start came from the auto-start grace delay.
        automatic: bool,
        at: DateTime<Utc>,
    },
    TimerPaused {
        phase: TimerPhase,
        remaining_seconds: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        phase: TimerPhase,
        remaining_seconds: u64,
        at: DateTime<Utc>,
    },
    ModeSwitched {
        from: TimerPhase,
        to: TimerPhase,
        remaining_seconds: u64,
        at: DateTime<Utc>,
    },
    PhaseCompleted {
        phase: TimerPhase,
        next_phase: TimerPhase,
        task_id: Option<TaskId>,
        /// When the next phase will start on its own, if it will.
        auto_start_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
    /// A phase duration was changed from the running timer.
    DurationAdjusted {
        phase: TimerPhase,
        minutes: u32,
        remaining_seconds: u64,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        state: TimerState,
        total_seconds: u64,
        progress: f64,
        at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_snake_case() {
        let event = Event::TimerPaused {
            phase: TimerPhase::Work,
            remaining_seconds: 1490,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "timer_paused");
        assert_eq!(json["phase"], "work");
        assert_eq!(json["remaining_seconds"], 1490);
    }
}
