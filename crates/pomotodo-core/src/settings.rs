//! Timer settings and the provider seam the engine reads them through.
//!
//! The provider is the single clamping authority for durations: anything
//! handed to the engine has already passed through [`TimerSettings::clamped`].

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::timer::TimerPhase;

pub const MIN_WORK_MINUTES: u32 = 1;
pub const MAX_WORK_MINUTES: u32 = 60;
pub const MIN_BREAK_MINUTES: u32 = 1;
pub const MAX_BREAK_MINUTES: u32 = 30;

/// Minutes one `+`/`-` press moves each duration by.
pub const WORK_ADJUST_STEP: i32 = 5;
pub const BREAK_ADJUST_STEP: i32 = 1;

/// Durations and flags the timer engine is configured by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSettings {
    #[serde(default = "default_work_duration")]
    pub work_duration_min: u32,
    #[serde(default = "default_break_duration")]
    pub break_duration_min: u32,
    #[serde(default = "default_true")]
    pub auto_start_break: bool,
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
}

fn default_work_duration() -> u32 {
    25
}
fn default_break_duration() -> u32 {
    5
}
fn default_true() -> bool {
    true
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            work_duration_min: default_work_duration(),
            break_duration_min: default_break_duration(),
            auto_start_break: true,
            sound_enabled: true,
        }
    }
}

impl TimerSettings {
    /// Copy with both durations forced into their allowed ranges.
    pub fn clamped(self) -> Self {
        Self {
            work_duration_min: self
                .work_duration_min
                .clamp(MIN_WORK_MINUTES, MAX_WORK_MINUTES),
            break_duration_min: self
                .break_duration_min
                .clamp(MIN_BREAK_MINUTES, MAX_BREAK_MINUTES),
            ..self
        }
    }

    pub fn duration_min(&self, phase: TimerPhase) -> u32 {
        match phase {
            TimerPhase::Work => self.work_duration_min,
            TimerPhase::Break => self.break_duration_min,
        }
    }

    pub fn duration_secs(&self, phase: TimerPhase) -> u64 {
        u64::from(self.duration_min(phase)).saturating_mul(60)
    }

    pub fn adjust_step(phase: TimerPhase) -> i32 {
        match phase {
            TimerPhase::Work => WORK_ADJUST_STEP,
            TimerPhase::Break => BREAK_ADJUST_STEP,
        }
    }

    /// Shift a phase duration by `delta` minutes, then clamp.
    pub fn adjust(&mut self, phase: TimerPhase, delta: i32) {
        let slot = match phase {
            TimerPhase::Work => &mut self.work_duration_min,
            TimerPhase::Break => &mut self.break_duration_min,
        };
        let shifted = i64::from(*slot) + i64::from(delta);
        *slot = u32::try_from(shifted.max(0)).unwrap_or(u32::MAX);
        *self = self.clamped();
    }
}

/// Source of the current timer settings.
///
/// Read on demand by the engine; implementations may change between reads.
pub trait SettingsProvider: Send + Sync {
    fn timer_settings(&self) -> TimerSettings;
}

impl SettingsProvider for TimerSettings {
    fn timer_settings(&self) -> TimerSettings {
        self.clamped()
    }
}

/// Settings handle that can be mutated while an engine holds a clone.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<TimerSettings>>,
}

impl SharedSettings {
    pub fn new(settings: TimerSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings.clamped())),
        }
    }

    pub fn get(&self) -> TimerSettings {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update(&self, f: impl FnOnce(&mut TimerSettings)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
        *guard = guard.clamped();
    }
}

impl SettingsProvider for SharedSettings {
    fn timer_settings(&self) -> TimerSettings {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_pomodoro() {
        let s = TimerSettings::default();
        assert_eq!(s.work_duration_min, 25);
        assert_eq!(s.break_duration_min, 5);
        assert!(s.auto_start_break);
        assert!(s.sound_enabled);
        assert_eq!(s.duration_secs(TimerPhase::Work), 1500);
        assert_eq!(s.duration_secs(TimerPhase::Break), 300);
    }

    #[test]
    fn clamped_bounds_both_durations() {
        let s = TimerSettings {
            work_duration_min: 0,
            break_duration_min: 90,
            ..TimerSettings::default()
        }
        .clamped();
        assert_eq!(s.work_duration_min, MIN_WORK_MINUTES);
        assert_eq!(s.break_duration_min, MAX_BREAK_MINUTES);
    }

    #[test]
    fn adjust_saturates_at_bounds() {
        let mut s = TimerSettings::default();
        s.adjust(TimerPhase::Work, 5);
        assert_eq!(s.work_duration_min, 30);
        s.adjust(TimerPhase::Work, 100);
        assert_eq!(s.work_duration_min, 60);
        s.adjust(TimerPhase::Break, -10);
        assert_eq!(s.break_duration_min, 1);
    }

    #[test]
    fn shared_settings_clamp_on_update() {
        let shared = SharedSettings::new(TimerSettings::default());
        let view = shared.clone();
        shared.update(|s| s.work_duration_min = 500);
        assert_eq!(view.timer_settings().work_duration_min, 60);
    }
}
