mod clock;
mod driver;
mod engine;
mod phase;

pub use clock::{format_clock, Clock, ManualClock, SystemClock};
pub use driver::{TimerCommand, TimerDriver, TICK_PERIOD};
pub use engine::{TimerEngine, TimerState, AUTO_START_GRACE_SECS, AUTO_START_TOLERANCE_MS};
pub use phase::TimerPhase;
