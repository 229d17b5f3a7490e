//! Periodic tick loop around a [`TimerEngine`].
//!
//! Runs on whatever executor polls it; the CLI uses a current-thread tokio
//! runtime so commands and ticks share one execution context and never
//! interleave. The interval lives inside `run` and is dropped on every
//! exit path.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use super::engine::TimerEngine;
use super::phase::TimerPhase;
use crate::events::Event;
use crate::settings::SharedSettings;
use crate::store::TaskId;

/// Roughly how often the engine is ticked.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// User-triggered operations, delivered to the loop over a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerCommand {
    Start,
    Pause,
    Toggle,
    Reset,
    SwitchMode(TimerPhase),
    /// Shift a phase duration by some minutes, within its bounds.
    AdjustDuration { phase: TimerPhase, delta: i32 },
    AttachTask(Option<TaskId>),
    Snapshot,
    Quit,
}

#[derive(Debug, Clone, Default)]
pub struct TimerDriver {
    snapshots: bool,
    settings: Option<SharedSettings>,
}

impl TimerDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also emit a `StateSnapshot` after every tick while running.
    pub fn with_snapshots(mut self, enabled: bool) -> Self {
        self.snapshots = enabled;
        self
    }

    /// Settings that `AdjustDuration` writes to. Without them the command
    /// is ignored.
    pub fn with_settings(mut self, settings: SharedSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Drive `engine` until `Quit` arrives or every command sender is
    /// dropped. Returns the engine so callers can inspect its final state.
    pub async fn run(
        &self,
        mut engine: TimerEngine,
        mut commands: mpsc::Receiver<TimerCommand>,
        events: mpsc::UnboundedSender<Event>,
    ) -> TimerEngine {
        let mut ticker = interval(TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if command == TimerCommand::Quit {
                        break;
                    }
                    if let Some(event) = self.apply(&mut engine, command) {
                        let _ = events.send(event);
                    }
                }
                _ = ticker.tick() => {
                    let synced = engine.sync_idle_duration();
                    let event = engine.tick();
                    let changed = synced || event.is_some();
                    if let Some(event) = event {
                        let _ = events.send(event);
                    }
                    if self.snapshots && (engine.is_running() || changed) {
                        let _ = events.send(engine.snapshot());
                    }
                }
            }
        }

        debug!("timer driver stopped");
        engine
    }

    /// Apply one command to the engine.
    pub fn apply(&self, engine: &mut TimerEngine, command: TimerCommand) -> Option<Event> {
        match command {
            TimerCommand::Start => engine.start(),
            TimerCommand::Pause => engine.pause(),
            TimerCommand::Toggle => engine.toggle(),
            TimerCommand::Reset => engine.reset(),
            TimerCommand::SwitchMode(phase) => engine.switch_mode(phase),
            TimerCommand::AdjustDuration { phase, delta } => {
                let Some(settings) = &self.settings else {
                    debug!(%phase, delta, "no adjustable settings; ignoring");
                    return None;
                };
                settings.update(|s| s.adjust(phase, delta));
                Some(engine.duration_adjusted(phase))
            }
            TimerCommand::AttachTask(task_id) => {
                engine.set_task(task_id);
                Some(engine.snapshot())
            }
            TimerCommand::Snapshot => Some(engine.snapshot()),
            TimerCommand::Quit => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::settings::TimerSettings;
    use crate::timer::clock::ManualClock;

    fn engine(clock: &ManualClock) -> TimerEngine {
        TimerEngine::new(Arc::new(clock.clone()), Arc::new(TimerSettings::default()))
    }

    fn shared_engine(clock: &ManualClock, settings: &SharedSettings) -> TimerEngine {
        TimerEngine::new(Arc::new(clock.clone()), Arc::new(settings.clone()))
    }

    #[tokio::test(start_paused = true)]
    async fn commands_are_applied_in_order() {
        let clock = ManualClock::default();
        let (tx, rx) = mpsc::channel(8);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        tx.send(TimerCommand::Start).await.unwrap();
        tx.send(TimerCommand::Pause).await.unwrap();
        tx.send(TimerCommand::SwitchMode(TimerPhase::Break)).await.unwrap();
        tx.send(TimerCommand::Quit).await.unwrap();

        let engine = TimerDriver::new().run(engine(&clock), rx, events_tx).await;
        assert_eq!(engine.phase(), TimerPhase::Break);
        assert!(!engine.is_running());

        let mut kinds = Vec::new();
        while let Ok(event) = events_rx.try_recv() {
            kinds.push(serde_json::to_value(&event).unwrap()["type"].clone());
        }
        assert_eq!(
            kinds,
            vec!["timer_started", "timer_paused", "mode_switched"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_drive_completion_and_auto_start() {
        let clock = ManualClock::default();
        let (tx, rx) = mpsc::channel(8);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let script = async {
            tx.send(TimerCommand::Start).await.unwrap();
            tokio::time::sleep(Duration::from_millis(1500)).await;
            clock.advance_secs(1500);
            tokio::time::sleep(Duration::from_secs(2)).await;
            clock.advance_secs(1);
            tokio::time::sleep(Duration::from_secs(2)).await;
            tx.send(TimerCommand::Quit).await.unwrap();
        };

        let driver = TimerDriver::new();
        let (engine, ()) = tokio::join!(
            driver.run(engine(&clock), rx, events_tx),
            script
        );

        assert_eq!(engine.phase(), TimerPhase::Break);
        assert!(engine.is_running());

        let mut completions = 0;
        let mut auto_starts = 0;
        while let Ok(event) = events_rx.try_recv() {
            match event {
                Event::PhaseCompleted { .. } => completions += 1,
                Event::TimerStarted { automatic: true, .. } => auto_starts += 1,
                _ => {}
            }
        }
        assert_eq!(completions, 1);
        assert_eq!(auto_starts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn adjusting_while_idle_updates_settings_and_countdown() {
        let clock = ManualClock::default();
        let settings = SharedSettings::new(TimerSettings::default());
        let (tx, rx) = mpsc::channel(8);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        tx.send(TimerCommand::AdjustDuration { phase: TimerPhase::Work, delta: 5 })
            .await
            .unwrap();
        tx.send(TimerCommand::AdjustDuration { phase: TimerPhase::Break, delta: -10 })
            .await
            .unwrap();
        tx.send(TimerCommand::Quit).await.unwrap();

        let engine = TimerDriver::new()
            .with_settings(settings.clone())
            .run(shared_engine(&clock, &settings), rx, events_tx)
            .await;

        assert_eq!(engine.remaining_seconds(), 1800);
        assert_eq!(settings.get().work_duration_min, 30);
        assert_eq!(settings.get().break_duration_min, 1);

        let mut adjusted = Vec::new();
        while let Ok(event) = events_rx.try_recv() {
            if let Event::DurationAdjusted { phase, minutes, .. } = event {
                adjusted.push((phase, minutes));
            }
        }
        assert_eq!(adjusted, vec![(TimerPhase::Work, 30), (TimerPhase::Break, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn adjusting_while_running_leaves_the_session_alone() {
        let clock = ManualClock::default();
        let settings = SharedSettings::new(TimerSettings::default());
        let (tx, rx) = mpsc::channel(8);
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        tx.send(TimerCommand::Start).await.unwrap();
        tx.send(TimerCommand::AdjustDuration { phase: TimerPhase::Work, delta: -5 })
            .await
            .unwrap();
        tx.send(TimerCommand::Reset).await.unwrap();
        tx.send(TimerCommand::Quit).await.unwrap();

        let driver = TimerDriver::new().with_settings(settings.clone());
        let engine = driver.run(shared_engine(&clock, &settings), rx, events_tx).await;
        assert_eq!(engine.total_seconds(), 1200);
    }

    #[test]
    fn adjusting_without_settings_is_ignored() {
        let clock = ManualClock::default();
        let mut engine = engine(&clock);
        let driver = TimerDriver::new();
        let event = driver.apply(
            &mut engine,
            TimerCommand::AdjustDuration { phase: TimerPhase::Work, delta: 5 },
        );
        assert!(event.is_none());
        assert_eq!(engine.remaining_seconds(), 1500);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_duration_change_emits_a_snapshot() {
        let clock = ManualClock::default();
        let settings = SharedSettings::new(TimerSettings::default());
        let (tx, rx) = mpsc::channel(8);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let engine = shared_engine(&clock, &settings);
        settings.update(|s| s.work_duration_min = 50);

        let script = async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            tx.send(TimerCommand::Quit).await.unwrap();
        };
        let driver = TimerDriver::new().with_snapshots(true);
        let (engine, ()) = tokio::join!(
            driver.run(engine, rx, events_tx),
            script
        );
        assert_eq!(engine.remaining_seconds(), 3000);

        let mut snapshots = Vec::new();
        while let Ok(event) = events_rx.try_recv() {
            if let Event::StateSnapshot { state, .. } = event {
                snapshots.push(state.remaining_seconds);
            }
        }
        assert_eq!(snapshots, vec![3000]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_sender_stops_the_loop() {
        let clock = ManualClock::default();
        let (tx, rx) = mpsc::channel(1);
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        drop(tx);
        let engine = TimerDriver::new().run(engine(&clock), rx, events_tx).await;
        assert!(!engine.is_running());
    }
}
