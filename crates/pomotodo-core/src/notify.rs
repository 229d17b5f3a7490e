//! Notification sinks: the tone and banner raised when a phase ends.
//!
//! Sinks report failures through [`NotifyError`]; the engine logs and
//! drops them, so a blocked speaker or a denied notification permission
//! never stalls the countdown.

use std::io::Write;

use crate::error::NotifyError;
use crate::timer::TimerPhase;

/// A short sine tone. Work and break use different pitches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration_ms: u32,
}

impl Tone {
    pub const WORK_COMPLETE: Tone = Tone {
        frequency_hz: 800,
        duration_ms: 500,
    };
    pub const BREAK_COMPLETE: Tone = Tone {
        frequency_hz: 600,
        duration_ms: 500,
    };

    pub fn for_phase(phase: TimerPhase) -> Self {
        match phase {
            TimerPhase::Work => Self::WORK_COMPLETE,
            TimerPhase::Break => Self::BREAK_COMPLETE,
        }
    }
}

/// Title and body shown when `phase` ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseMessage {
    pub title: &'static str,
    pub body: &'static str,
}

impl PhaseMessage {
    pub fn for_phase(phase: TimerPhase) -> Self {
        match phase {
            TimerPhase::Work => PhaseMessage {
                title: "Work Session Complete!",
                body: "Great job! Time for a break.",
            },
            TimerPhase::Break => PhaseMessage {
                title: "Break Time Over!",
                body: "Break time is over. Ready to focus?",
            },
        }
    }
}

pub trait NotificationSink {
    /// Play the completion tone for the phase that just ended.
    fn play_tone(&mut self, phase: TimerPhase) -> Result<(), NotifyError>;

    fn show_notification(&mut self, title: &str, body: &str) -> Result<(), NotifyError>;
}

/// Sink that swallows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSink;

impl NotificationSink for SilentSink {
    fn play_tone(&mut self, _phase: TimerPhase) -> Result<(), NotifyError> {
        Ok(())
    }

    fn show_notification(&mut self, _title: &str, _body: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Terminal sink: rings the bell and prints a banner line.
///
/// A terminal cannot choose a pitch, so the higher work tone rings once
/// and the lower break tone rings twice.
pub struct TerminalSink<W: Write> {
    out: W,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl TerminalSink<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write> NotificationSink for TerminalSink<W> {
    fn play_tone(&mut self, phase: TimerPhase) -> Result<(), NotifyError> {
        let bells = if Tone::for_phase(phase) == Tone::WORK_COMPLETE {
            "\x07"
        } else {
            "\x07\x07"
        };
        self.out.write_all(bells.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    fn show_notification(&mut self, title: &str, body: &str) -> Result<(), NotifyError> {
        writeln!(self.out, "\n** {title} ** {body}")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Desktop notifications via the platform notification service, with the
/// tone delegated to the terminal bell.
#[cfg(feature = "desktop")]
pub struct DesktopSink {
    bell: TerminalSink<std::io::Stderr>,
    app_name: String,
}

#[cfg(feature = "desktop")]
impl DesktopSink {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            bell: TerminalSink::stderr(),
            app_name: app_name.into(),
        }
    }
}

#[cfg(feature = "desktop")]
impl NotificationSink for DesktopSink {
    fn play_tone(&mut self, phase: TimerPhase) -> Result<(), NotifyError> {
        self.bell.play_tone(phase)
    }

    fn show_notification(&mut self, title: &str, body: &str) -> Result<(), NotifyError> {
        notify_rust::Notification::new()
            .summary(title)
            .body(body)
            .appname(&self.app_name)
            .show()
            .map(|_| ())
            .map_err(|e| NotifyError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tones_differ_by_phase() {
        assert_eq!(Tone::for_phase(TimerPhase::Work).frequency_hz, 800);
        assert_eq!(Tone::for_phase(TimerPhase::Break).frequency_hz, 600);
    }

    #[test]
    fn terminal_sink_rings_and_prints() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.play_tone(TimerPhase::Break).unwrap();
        let msg = PhaseMessage::for_phase(TimerPhase::Break);
        sink.show_notification(msg.title, msg.body).unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert!(out.starts_with("\x07\x07"));
        assert!(out.contains("Break Time Over!"));
        assert!(out.contains("Ready to focus?"));
    }
}
