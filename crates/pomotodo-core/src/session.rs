//! The session-counter seam: where finished work phases get recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::store::TaskId;

/// One completed work phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedSession {
    pub task_id: Option<TaskId>,
    pub focus_minutes: u32,
    pub completed_at: DateTime<Utc>,
}

/// Receives exactly one call per completed work phase. Break completions
/// are never reported.
pub trait SessionCounter {
    fn on_work_session_complete(&mut self, session: &CompletedSession) -> Result<(), CoreError>;
}
