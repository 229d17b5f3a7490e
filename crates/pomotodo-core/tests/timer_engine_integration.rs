//! Integration tests for the timer engine.
//!
//! Drives the engine with a virtual clock through full work/break cycles,
//! with real storage behind the session counter.

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use pomotodo_core::{
    Database, Event, ManualClock, NotificationSink, NotifyError, PersistentStore, SharedSettings,
    TimerEngine, TimerPhase, TimerSettings,
};
use proptest::prelude::*;

#[derive(Clone, Default)]
struct CountingSink {
    tones: Arc<Mutex<Vec<TimerPhase>>>,
    notifications: Arc<Mutex<Vec<String>>>,
}

impl NotificationSink for CountingSink {
    fn play_tone(&mut self, phase: TimerPhase) -> Result<(), NotifyError> {
        self.tones.lock().unwrap().push(phase);
        Ok(())
    }

    fn show_notification(&mut self, title: &str, _body: &str) -> Result<(), NotifyError> {
        self.notifications.lock().unwrap().push(title.to_string());
        Ok(())
    }
}

fn engine_with_store(
    settings: TimerSettings,
) -> (ManualClock, SharedSettings, CountingSink, TimerEngine, String) {
    let clock = ManualClock::new(Utc::now());
    let settings = SharedSettings::new(settings);
    let sink = CountingSink::default();

    let mut store = PersistentStore::load(Database::open_memory().unwrap()).unwrap();
    let id = store.add_todo("write the quarterly report").unwrap();

    let mut engine = TimerEngine::new(Arc::new(clock.clone()), Arc::new(settings.clone()))
        .with_sink(Box::new(sink.clone()))
        .with_session_counter(Box::new(store));
    engine.set_task(Some(id.clone()));
    (clock, settings, sink, engine, id)
}

#[test]
fn test_full_work_cycle_with_auto_start_break() {
    let (clock, _settings, sink, mut engine, task_id) = engine_with_store(TimerSettings {
        work_duration_min: 25,
        break_duration_min: 5,
        auto_start_break: true,
        sound_enabled: true,
    });

    engine.start();
    assert_eq!(engine.remaining_seconds(), 1500);

    // One tick per second for the whole phase.
    let mut completions = Vec::new();
    for _ in 0..1500 {
        clock.advance_secs(1);
        if let Some(event) = engine.tick() {
            completions.push(event);
        }
    }

    assert_eq!(completions.len(), 1);
    match &completions[0] {
        Event::PhaseCompleted {
            phase,
            next_phase,
            task_id: attributed,
            ..
        } => {
            assert_eq!(*phase, TimerPhase::Work);
            assert_eq!(*next_phase, TimerPhase::Break);
            assert_eq!(attributed.as_deref(), Some(task_id.as_str()));
        }
        other => panic!("expected PhaseCompleted, got {other:?}"),
    }
    assert_eq!(*sink.notifications.lock().unwrap(), vec!["Work Session Complete!"]);
    assert_eq!(*sink.tones.lock().unwrap(), vec![TimerPhase::Work]);
    assert_eq!(engine.phase(), TimerPhase::Break);
    assert_eq!(engine.remaining_seconds(), 300);

    clock.advance_secs(1);
    engine.tick();
    assert!(engine.is_running());
    assert_eq!(engine.phase(), TimerPhase::Break);
}

#[test]
fn test_break_completion_returns_to_idle_work() {
    let (clock, _settings, sink, mut engine, _) = engine_with_store(TimerSettings::default());

    engine.start();
    clock.advance_secs(1500);
    engine.tick();
    clock.advance_secs(1);
    engine.tick();
    assert!(engine.is_running());

    clock.advance_secs(300);
    engine.tick();
    assert_eq!(engine.phase(), TimerPhase::Work);
    assert!(!engine.is_running());
    assert_eq!(engine.remaining_seconds(), 1500);

    clock.advance_secs(120);
    assert!(engine.tick().is_none());
    assert!(!engine.is_running());
    assert_eq!(
        *sink.notifications.lock().unwrap(),
        vec!["Work Session Complete!", "Break Time Over!"]
    );
}

#[test]
fn test_pause_does_not_accrue_time() {
    let (clock, _settings, _sink, mut engine, _) = engine_with_store(TimerSettings::default());

    engine.start();
    for _ in 0..10 {
        clock.advance_secs(1);
        engine.tick();
    }
    engine.pause();
    assert_eq!(engine.remaining_seconds(), 1490);

    clock.advance_secs(5000);
    assert!(engine.tick().is_none());
    engine.start();
    assert_eq!(engine.remaining_seconds(), 1490);

    clock.advance_secs(1);
    engine.tick();
    assert_eq!(engine.remaining_seconds(), 1489);
    clock.advance_secs(4);
    engine.tick();
    assert_eq!(engine.remaining_seconds(), 1485);
}

#[test]
fn test_duration_changes_respect_idle_versus_running() {
    let (clock, settings, _sink, mut engine, _) = engine_with_store(TimerSettings::default());

    settings.update(|s| s.work_duration_min = 50);
    engine.reset();
    assert_eq!(engine.remaining_seconds(), 3000);

    engine.start();
    clock.advance_secs(60);
    engine.tick();
    settings.update(|s| s.work_duration_min = 15);
    clock.advance_secs(1);
    engine.tick();
    assert_eq!(engine.remaining_seconds(), 2939);
}

#[test]
fn test_throttled_ticks_still_complete_once() {
    let (clock, _settings, _sink, mut engine, _) = engine_with_store(TimerSettings {
        auto_start_break: false,
        ..TimerSettings::default()
    });

    engine.start();
    // A background-throttled host delivers a tick every 7 minutes.
    let mut completions = 0;
    for _ in 0..10 {
        clock.advance(Duration::minutes(7));
        if matches!(engine.tick(), Some(Event::PhaseCompleted { .. })) {
            completions += 1;
        }
    }
    assert_eq!(completions, 1);
    assert_eq!(engine.phase(), TimerPhase::Break);
    assert!(!engine.is_running());
}

proptest! {
    /// Wall-clock time spent running always matches the consumed part of
    /// the phase, whatever the pause pattern and tick jitter.
    #[test]
    fn prop_remaining_tracks_running_time(
        segments in prop::collection::vec((0u32..60_000, 0u32..600_000, 1u32..3_000), 1..20)
    ) {
        let clock = ManualClock::new(Utc::now());
        let settings = TimerSettings { work_duration_min: 60, ..TimerSettings::default() };
        let mut engine = TimerEngine::new(Arc::new(clock.clone()), Arc::new(settings));
        let total = engine.total_seconds();

        let mut running_ms: i64 = 0;
        for (run_ms, pause_ms, tick_every_ms) in segments {
            engine.start();
            let mut left = i64::from(run_ms);
            while left > 0 {
                let step = left.min(i64::from(tick_every_ms));
                clock.advance(Duration::milliseconds(step));
                left -= step;
                running_ms += step;
                engine.tick();
                let consumed = total - engine.remaining_seconds();
                prop_assert!((running_ms / 1000 - consumed as i64).abs() <= 1);
            }
            engine.pause();
            clock.advance(Duration::milliseconds(i64::from(pause_ms)));
            engine.tick();
        }

        let consumed = total - engine.remaining_seconds();
        prop_assert!((running_ms / 1000 - consumed as i64).abs() <= 1);
        prop_assert!(!(engine.is_running() && engine.is_paused()));
    }
}
