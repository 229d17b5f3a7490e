//! Timer engine implementation.
//!
//! The timer engine is a wall-clock-based state machine. It does not use
//! internal threads - the caller is responsible for calling `tick()` periodically.
//!
//! ## Drift correction
//!
//! Remaining time is never decremented per tick. Each run anchors the
//! instant it started; every tick recomputes
//!
//! ```text
//! elapsed   = previously_elapsed + (now - run_started_at)
//! remaining = max(0, total - floor(elapsed))
//! ```
//!
//! and `pause()` folds the current run into `previously_elapsed`. Late or
//! missing ticks therefore catch up on the next one. If the wall clock
//! steps backwards mid-run, the time counted up to the last observed
//! instant is folded in and the run is re-anchored at the new "now".
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> Paused -> Running -> (complete) -> Idle in next phase
//!                                                    \-> Running (auto-start break)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(clock, settings);
//! engine.start();
//! // In a loop:
//! engine.tick(); // Returns Some(Event::PhaseCompleted) when the phase ends
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::phase::TimerPhase;
use crate::events::Event;
use crate::notify::{NotificationSink, PhaseMessage, SilentSink};
use crate::session::{CompletedSession, SessionCounter};
use crate::settings::SettingsProvider;
use crate::store::TaskId;

/// Seconds between a work phase completing and the break auto-starting.
pub const AUTO_START_GRACE_SECS: i64 = 1;

/// A tick this close before the auto-start deadline still fires it.
pub const AUTO_START_TOLERANCE_MS: i64 = 50;

/// Complete observable state of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub phase: TimerPhase,
    pub running: bool,
    pub paused: bool,
    pub remaining_seconds: u64,
    #[serde(default)]
    pub associated_task_id: Option<TaskId>,
}

/// Core timer engine.
///
/// Operates on wall-clock deltas -- no internal thread.
/// Collaborators are invoked one-way and never touch the state.
pub struct TimerEngine {
    clock: Arc<dyn Clock>,
    settings: Arc<dyn SettingsProvider>,
    sink: Box<dyn NotificationSink>,
    counter: Option<Box<dyn SessionCounter>>,

    phase: TimerPhase,
    running: bool,
    paused: bool,
    remaining_secs: u64,
    /// Length of the current phase, captured on reset/switch so that
    /// settings changes never reach an in-progress session.
    total_secs: u64,
    task_id: Option<TaskId>,
    /// Anchor of the current run; `Some` exactly while running.
    run_started_at: Option<DateTime<Utc>>,
    /// Latest instant seen during the current run.
    last_seen: Option<DateTime<Utc>>,
    /// Time spent running in earlier runs of this phase.
    previously_elapsed: Duration,
    auto_start_at: Option<DateTime<Utc>>,
}

impl TimerEngine {
    /// Create an idle engine in the work phase with the configured work
    /// duration.
    pub fn new(clock: Arc<dyn Clock>, settings: Arc<dyn SettingsProvider>) -> Self {
        let total_secs = settings.timer_settings().duration_secs(TimerPhase::Work);
        Self {
            clock,
            settings,
            sink: Box::new(SilentSink),
            counter: None,
            phase: TimerPhase::Work,
            running: false,
            paused: false,
            remaining_secs: total_secs,
            total_secs,
            task_id: None,
            run_started_at: None,
            last_seen: None,
            previously_elapsed: Duration::zero(),
            auto_start_at: None,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_session_counter(mut self, counter: Box<dyn SessionCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        TimerState {
            phase: self.phase,
            running: self.running,
            paused: self.paused,
            remaining_seconds: self.remaining_secs,
            associated_task_id: self.task_id.clone(),
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_secs
    }

    pub fn total_seconds(&self) -> u64 {
        self.total_secs
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    /// When a pending auto-start will fire, if one is pending.
    pub fn pending_auto_start(&self) -> Option<DateTime<Utc>> {
        self.auto_start_at
    }

    /// 0.0 .. 1.0 progress within the current phase.
    pub fn progress(&self) -> f64 {
        if self.total_secs == 0 {
            return 0.0;
        }
        1.0 - (self.remaining_secs as f64 / self.total_secs as f64)
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot {
            state: self.state(),
            total_seconds: self.total_secs,
            progress: self.progress(),
            at: self.clock.now(),
        }
    }

    /// Attribute future work sessions to `task_id` (or to no task).
    pub fn set_task(&mut self, task_id: Option<TaskId>) {
        self.task_id = task_id;
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start or resume the countdown. Returns `None` if already running.
    pub fn start(&mut self) -> Option<Event> {
        self.auto_start_at = None;
        self.begin_run(false)
    }

    /// Stop the countdown and keep the remaining time.
    ///
    /// Always leaves the engine paused; returns `None` if it already was.
    pub fn pause(&mut self) -> Option<Event> {
        self.auto_start_at = None;
        if self.paused {
            return None;
        }
        if self.running {
            let now = self.clock.now();
            self.previously_elapsed = self.observe(now);
            self.run_started_at = None;
            self.last_seen = None;
            self.recompute_remaining();
        }
        self.running = false;
        self.paused = true;
        debug!(phase = %self.phase, remaining = self.remaining_secs, "timer paused");
        Some(Event::TimerPaused {
            phase: self.phase,
            remaining_seconds: self.remaining_secs,
            at: self.clock.now(),
        })
    }

    /// Start if not running, pause otherwise.
    pub fn toggle(&mut self) -> Option<Event> {
        if self.running {
            self.pause()
        } else {
            self.start()
        }
    }

    /// Return to the full configured duration of the current phase.
    pub fn reset(&mut self) -> Option<Event> {
        self.load_phase(self.phase);
        debug!(phase = %self.phase, remaining = self.remaining_secs, "timer reset");
        Some(Event::TimerReset {
            phase: self.phase,
            remaining_seconds: self.remaining_secs,
            at: self.clock.now(),
        })
    }

    /// Move to `target` with its full configured duration, idle.
    ///
    /// Never notifies or counts sessions; only completion does that.
    pub fn switch_mode(&mut self, target: TimerPhase) -> Option<Event> {
        let from = self.phase;
        self.load_phase(target);
        debug!(%from, to = %target, "mode switched");
        Some(Event::ModeSwitched {
            from,
            to: target,
            remaining_seconds: self.remaining_secs,
            at: self.clock.now(),
        })
    }

    /// Call periodically. Returns `Some(Event::PhaseCompleted)` when the
    /// phase finishes, or `Some(Event::TimerStarted)` when a pending
    /// auto-start fires.
    pub fn tick(&mut self) -> Option<Event> {
        let now = self.clock.now();

        if !self.running {
            return match self.auto_start_at {
                Some(deadline)
                    if now + Duration::milliseconds(AUTO_START_TOLERANCE_MS) >= deadline =>
                {
                    self.auto_start_at = None;
                    info!(phase = %self.phase, "auto-starting after grace delay");
                    self.begin_run(true)
                }
                _ => None,
            };
        }

        let elapsed = self.observe(now);
        // min() keeps the countdown monotonic if the wall clock steps back.
        self.remaining_secs = self
            .remaining_secs
            .min(self.total_secs.saturating_sub(whole_secs(elapsed)));

        if self.remaining_secs == 0 {
            return Some(self.complete(now));
        }
        None
    }

    /// While idle, follow the configured duration of the current phase.
    ///
    /// Returns true when the remaining time changed. Running or paused
    /// sessions and a pending auto-start are left alone.
    pub fn sync_idle_duration(&mut self) -> bool {
        if self.running || self.paused || self.auto_start_at.is_some() {
            return false;
        }
        let configured = self.settings.timer_settings().duration_secs(self.phase);
        if configured == self.total_secs && configured == self.remaining_secs {
            return false;
        }
        self.total_secs = configured;
        self.remaining_secs = configured;
        true
    }

    /// Report that the configured duration of `phase` changed.
    ///
    /// An idle engine picks the new duration up right away; a running or
    /// paused session keeps its own.
    pub fn duration_adjusted(&mut self, phase: TimerPhase) -> Event {
        self.sync_idle_duration();
        let minutes = self.settings.timer_settings().duration_min(phase);
        debug!(%phase, minutes, "duration adjusted");
        Event::DurationAdjusted {
            phase,
            minutes,
            remaining_seconds: self.remaining_secs,
            at: self.clock.now(),
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn begin_run(&mut self, automatic: bool) -> Option<Event> {
        if self.running {
            return None;
        }
        let now = self.clock.now();
        self.running = true;
        self.paused = false;
        self.run_started_at = Some(now);
        self.last_seen = Some(now);
        debug!(phase = %self.phase, remaining = self.remaining_secs, automatic, "timer started");
        Some(Event::TimerStarted {
            phase: self.phase,
            remaining_seconds: self.remaining_secs,
            automatic,
            at: now,
        })
    }

    fn load_phase(&mut self, phase: TimerPhase) {
        let total = self.settings.timer_settings().duration_secs(phase);
        self.phase = phase;
        self.total_secs = total;
        self.remaining_secs = total;
        self.running = false;
        self.paused = false;
        self.run_started_at = None;
        self.last_seen = None;
        self.previously_elapsed = Duration::zero();
        self.auto_start_at = None;
    }

    /// Total running time of this phase as of `now`.
    ///
    /// A `now` earlier than the last observed instant means the wall clock
    /// stepped back: the run so far is folded into `previously_elapsed`
    /// and re-anchored at `now`, so the countdown keeps moving.
    fn observe(&mut self, now: DateTime<Utc>) -> Duration {
        let Some(started) = self.run_started_at else {
            return self.previously_elapsed;
        };
        if let Some(seen) = self.last_seen {
            if now < seen {
                debug!(stepped_back_ms = (seen - now).num_milliseconds(), "wall clock stepped back");
                self.previously_elapsed = self.previously_elapsed + elapsed_between(started, seen);
                self.run_started_at = Some(now);
                self.last_seen = Some(now);
                return self.previously_elapsed;
            }
        }
        self.last_seen = Some(now);
        self.previously_elapsed + elapsed_between(started, now)
    }

    fn recompute_remaining(&mut self) {
        self.remaining_secs = self
            .remaining_secs
            .min(self.total_secs.saturating_sub(whole_secs(self.previously_elapsed)));
    }

    fn complete(&mut self, now: DateTime<Utc>) -> Event {
        let ended = self.phase;
        self.running = false;
        self.run_started_at = None;
        self.last_seen = None;
        self.remaining_secs = 0;

        let settings = self.settings.timer_settings();
        info!(phase = %ended, task = ?self.task_id, "phase complete");

        if settings.sound_enabled {
            if let Err(e) = self.sink.play_tone(ended) {
                warn!(error = %e, "could not play completion tone");
            }
        }

        let message = PhaseMessage::for_phase(ended);
        if let Err(e) = self.sink.show_notification(message.title, message.body) {
            warn!(error = %e, "could not show completion notification");
        }

        if ended == TimerPhase::Work {
            if let Some(counter) = self.counter.as_mut() {
                let session = CompletedSession {
                    task_id: self.task_id.clone(),
                    focus_minutes: u32::try_from(self.total_secs / 60).unwrap_or(u32::MAX),
                    completed_at: now,
                };
                if let Err(e) = counter.on_work_session_complete(&session) {
                    warn!(error = %e, "could not record work session");
                }
            }
        }

        let next = ended.next();
        self.load_phase(next);

        if ended == TimerPhase::Work && settings.auto_start_break {
            self.auto_start_at = Some(now + Duration::seconds(AUTO_START_GRACE_SECS));
        }

        Event::PhaseCompleted {
            phase: ended,
            next_phase: next,
            task_id: self.task_id.clone(),
            auto_start_at: self.auto_start_at,
            at: now,
        }
    }
}

/// Elapsed time between two instants, never negative.
fn elapsed_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).max(Duration::zero())
}

fn whole_secs(d: Duration) -> u64 {
    u64::try_from(d.num_seconds()).unwrap_or(0)
}
