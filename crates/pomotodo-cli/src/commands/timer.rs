//! Interactive timer command for CLI.
//!
//! `timer run` drives the engine on a current-thread runtime. Keys read
//! from stdin become [`TimerCommand`]s; events go to stdout, one JSON
//! object per line, with a plain status line for each running tick.

use std::sync::Arc;

use clap::Subcommand;
use pomotodo_core::{
    format_clock, Config, Database, Event, NotificationSink, PersistentStore, SharedSettings,
    SystemClock, TimerCommand, TimerDriver, TimerEngine, TimerPhase, TimerSettings,
    ValidationError,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Run the timer in the foreground.
    ///
    /// Keys (followed by Enter): s start/pause, p pause, r reset,
    /// w work mode, b break mode, +w/-w work ±5 min, +b/-b break ±1 min,
    /// q quit. Adjusted durations are saved to the config.
    Run {
        /// Attribute finished work sessions to this task
        #[arg(long)]
        task: Option<String>,
        /// Work duration in minutes for this run
        #[arg(long)]
        work: Option<u32>,
        /// Break duration in minutes for this run
        #[arg(long = "break")]
        break_min: Option<u32>,
        /// Do not start the break automatically after a work session
        #[arg(long)]
        no_auto_break: bool,
        /// Do not ring on phase completion
        #[arg(long)]
        no_sound: bool,
    },
    /// Print the idle timer state for the current configuration
    Status,
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    match action {
        TimerAction::Status => {
            let engine = TimerEngine::new(Arc::new(SystemClock), Arc::new(config));
            println!("{}", serde_json::to_string_pretty(&engine.state())?);
            Ok(())
        }
        TimerAction::Run {
            task,
            work,
            break_min,
            no_auto_break,
            no_sound,
        } => {
            let settings = SharedSettings::new(config.timer);
            settings.update(|s| {
                if let Some(minutes) = work {
                    s.work_duration_min = minutes;
                }
                if let Some(minutes) = break_min {
                    s.break_duration_min = minutes;
                }
                if no_auto_break {
                    s.auto_start_break = false;
                }
                if no_sound {
                    s.sound_enabled = false;
                }
            });

            let store = PersistentStore::load(Database::open()?)?;
            if let Some(id) = &task {
                if store.store().todo(id).is_none() {
                    return Err(ValidationError::TaskNotFound(id.clone()).into());
                }
            }

            let mut engine = TimerEngine::new(Arc::new(SystemClock), Arc::new(settings.clone()))
                .with_sink(sink())
                .with_session_counter(Box::new(store));
            engine.set_task(task);

            run_interactive(engine, settings)
        }
    }
}

#[cfg(feature = "desktop")]
fn sink() -> Box<dyn NotificationSink> {
    Box::new(pomotodo_core::notify::DesktopSink::new("Pomotodo"))
}

#[cfg(not(feature = "desktop"))]
fn sink() -> Box<dyn NotificationSink> {
    Box::new(pomotodo_core::TerminalSink::stderr())
}

fn run_interactive(
    engine: TimerEngine,
    settings: SharedSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let engine = runtime.block_on(async {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        print_event(&engine.snapshot());

        tokio::spawn(read_commands(command_tx.clone()));
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = command_tx.send(TimerCommand::Quit).await;
            }
        });
        let printer = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if let Event::DurationAdjusted { phase, minutes, .. } = &event {
                    save_duration(*phase, *minutes);
                }
                print_event(&event);
            }
        });

        let engine = TimerDriver::new()
            .with_snapshots(true)
            .with_settings(settings)
            .run(engine, command_rx, event_tx)
            .await;
        let _ = printer.await;
        engine
    });

    // The stdin reader may still be parked on a blocking read.
    runtime.shutdown_background();

    info!(
        phase = %engine.phase(),
        remaining = engine.remaining_seconds(),
        "timer stopped"
    );
    Ok(())
}

async fn read_commands(commands: mpsc::Sender<TimerCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let command = match lines.next_line().await {
            Ok(Some(line)) => match parse_key(&line) {
                Some(command) => command,
                None => {
                    if !line.trim().is_empty() {
                        eprintln!("unknown key '{}' (s p r w b +w -w +b -b q)", line.trim());
                    }
                    continue;
                }
            },
            Ok(None) => TimerCommand::Quit,
            Err(e) => {
                debug!(error = %e, "stdin closed");
                TimerCommand::Quit
            }
        };
        let quit = command == TimerCommand::Quit;
        if commands.send(command).await.is_err() || quit {
            return;
        }
    }
}

fn parse_key(line: &str) -> Option<TimerCommand> {
    match line.trim() {
        "s" => Some(TimerCommand::Toggle),
        "p" => Some(TimerCommand::Pause),
        "r" => Some(TimerCommand::Reset),
        "w" => Some(TimerCommand::SwitchMode(TimerPhase::Work)),
        "b" => Some(TimerCommand::SwitchMode(TimerPhase::Break)),
        "+w" => Some(adjust(TimerPhase::Work, 1)),
        "-w" => Some(adjust(TimerPhase::Work, -1)),
        "+b" => Some(adjust(TimerPhase::Break, 1)),
        "-b" => Some(adjust(TimerPhase::Break, -1)),
        "q" => Some(TimerCommand::Quit),
        _ => None,
    }
}

fn adjust(phase: TimerPhase, sign: i32) -> TimerCommand {
    TimerCommand::AdjustDuration {
        phase,
        delta: sign * TimerSettings::adjust_step(phase),
    }
}

/// Write an adjusted duration back to the config file.
fn save_duration(phase: TimerPhase, minutes: u32) {
    let result = Config::load().and_then(|mut config| {
        match phase {
            TimerPhase::Work => config.timer.work_duration_min = minutes,
            TimerPhase::Break => config.timer.break_duration_min = minutes,
        }
        config.save()
    });
    if let Err(e) = result {
        warn!(error = %e, %phase, "could not save adjusted duration");
    }
}

fn print_event(event: &Event) {
    match event {
        Event::StateSnapshot { state, .. } => {
            let status = if state.running {
                "running"
            } else if state.paused {
                "paused"
            } else {
                "idle"
            };
            println!(
                "[{}] {} {status}",
                state.phase,
                format_clock(state.remaining_seconds)
            );
        }
        other => match serde_json::to_string(other) {
            Ok(json) => println!("{json}"),
            Err(e) => debug!(error = %e, "unprintable event"),
        },
    }
}
