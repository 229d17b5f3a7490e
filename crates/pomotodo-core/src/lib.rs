//! # Pomotodo Core Library
//!
//! Core logic for Pomotodo, a task list paired with a work/break interval
//! timer. The CLI binary is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Timer Engine**: a wall-clock-based state machine with drift-corrected
//!   countdown; the caller (or [`TimerDriver`]) invokes `tick()` periodically
//! - **Collaborators**: the engine reads [`TimerSettings`] through a
//!   [`SettingsProvider`], and reports phase completion to a
//!   [`NotificationSink`] and a [`SessionCounter`]
//! - **Storage**: SQLite session history and key-value records, TOML
//!   configuration
//! - **Store**: task list and daily statistics, mutated through
//!   [`StoreCommand`]s
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Core timer state machine
//! - [`Config`]: Application configuration management
//! - [`PersistentStore`]: Task list, daily stats and session counting

pub mod error;
pub mod events;
pub mod notify;
pub mod session;
pub mod settings;
pub mod storage;
pub mod store;
pub mod timer;

pub use error::{ConfigError, CoreError, DatabaseError, NotifyError, ValidationError};
pub use events::Event;
pub use notify::{NotificationSink, PhaseMessage, SilentSink, TerminalSink, Tone};
pub use session::{CompletedSession, SessionCounter};
pub use settings::{SettingsProvider, SharedSettings, TimerSettings};
pub use storage::{Config, Database, SessionStats, Theme};
pub use store::{DailyStats, PersistentStore, Store, StoreCommand, TaskId, Todo};
pub use timer::{
    format_clock, Clock, ManualClock, SystemClock, TimerCommand, TimerDriver, TimerEngine,
    TimerPhase, TimerState,
};
