//! Task list and daily statistics.
//!
//! `Store` is the single owner of this state. Every mutation is a
//! [`StoreCommand`] applied by [`Store::apply`]. [`PersistentStore`] runs
//! each one as a read-modify-write of the `kv` table inside one write
//! transaction, so a long-running timer and short-lived `task` commands
//! can share the database without overwriting each other. It is also the
//! session counter the timer engine reports finished work phases to.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{CoreError, ValidationError};
use crate::session::{CompletedSession, SessionCounter};
use crate::storage::Database;

pub type TaskId = String;

const TODOS_KEY: &str = "todos";
const DAILY_STATS_KEY: &str = "daily_stats";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: TaskId,
    pub text: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pomodoro_sessions: u32,
}

/// Aggregates for one local calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub completed_todos: u32,
    pub total_todos: u32,
    pub pomodoro_sessions: u32,
    pub total_focus_time_min: u32,
}

impl DailyStats {
    pub fn fresh(date: NaiveDate) -> Self {
        Self {
            date,
            completed_todos: 0,
            total_todos: 0,
            pomodoro_sessions: 0,
            total_focus_time_min: 0,
        }
    }

    /// These stats if they belong to `date`, otherwise a fresh record.
    pub fn for_date(self, date: NaiveDate) -> Self {
        if self.date == date {
            self
        } else {
            Self::fresh(date)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCommand {
    AddTodo { id: TaskId, text: String },
    UpdateTodo { id: TaskId, text: String },
    ToggleTodo { id: TaskId },
    /// Move a todo to `position` (0-based, clamped to the end of the list).
    MoveTodo { id: TaskId, position: usize },
    DeleteTodo { id: TaskId },
    RecordWorkSession {
        task_id: Option<TaskId>,
        focus_minutes: u32,
    },
}

impl StoreCommand {
    /// `AddTodo` with a freshly generated id.
    pub fn add_todo(text: impl Into<String>) -> Self {
        StoreCommand::AddTodo {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    todos: Vec<Todo>,
    daily_stats: DailyStats,
}

impl Store {
    pub fn new(todos: Vec<Todo>, daily_stats: DailyStats) -> Self {
        Self { todos, daily_stats }
    }

    pub fn empty(today: NaiveDate) -> Self {
        Self::new(Vec::new(), DailyStats::fresh(today))
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn todo(&self, id: &str) -> Option<&Todo> {
        self.todos.iter().find(|t| t.id == id)
    }

    pub fn daily_stats(&self) -> &DailyStats {
        &self.daily_stats
    }

    /// Apply one command at `now`. Stats roll over to a fresh record when
    /// `now` falls on a later local day than the stored one.
    pub fn apply(&mut self, command: StoreCommand, now: DateTime<Utc>) -> Result<(), ValidationError> {
        let today = now.with_timezone(&Local).date_naive();
        if self.daily_stats.date != today {
            self.daily_stats = DailyStats::fresh(today);
        }

        match command {
            StoreCommand::AddTodo { id, text } => {
                let text = validated_text(&text)?;
                self.todos.push(Todo {
                    id,
                    text,
                    completed: false,
                    created_at: now,
                    completed_at: None,
                    pomodoro_sessions: 0,
                });
                self.daily_stats.total_todos = count(self.todos.len());
            }
            StoreCommand::UpdateTodo { id, text } => {
                let text = validated_text(&text)?;
                self.todo_mut(&id)?.text = text;
            }
            StoreCommand::MoveTodo { id, position } => {
                let from = self
                    .todos
                    .iter()
                    .position(|t| t.id == id)
                    .ok_or(ValidationError::TaskNotFound(id))?;
                let todo = self.todos.remove(from);
                let to = position.min(self.todos.len());
                self.todos.insert(to, todo);
            }
            StoreCommand::ToggleTodo { id } => {
                let todo = self.todo_mut(&id)?;
                todo.completed = !todo.completed;
                todo.completed_at = todo.completed.then_some(now);
                self.daily_stats.completed_todos = self.completed_count();
            }
            StoreCommand::DeleteTodo { id } => {
                let before = self.todos.len();
                self.todos.retain(|t| t.id != id);
                if self.todos.len() == before {
                    return Err(ValidationError::TaskNotFound(id));
                }
                self.daily_stats.total_todos = count(self.todos.len());
                self.daily_stats.completed_todos = self.completed_count();
            }
            StoreCommand::RecordWorkSession {
                task_id,
                focus_minutes,
            } => {
                self.daily_stats.pomodoro_sessions += 1;
                self.daily_stats.total_focus_time_min += focus_minutes;
                if let Some(id) = task_id {
                    match self.todos.iter_mut().find(|t| t.id == id) {
                        Some(todo) => todo.pomodoro_sessions += 1,
                        None => debug!(task = %id, "session for unknown task counted in daily stats only"),
                    }
                }
            }
        }
        Ok(())
    }

    fn todo_mut(&mut self, id: &str) -> Result<&mut Todo, ValidationError> {
        self.todos
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ValidationError::TaskNotFound(id.to_string()))
    }

    fn completed_count(&self) -> u32 {
        count(self.todos.iter().filter(|t| t.completed).count())
    }
}

fn validated_text(text: &str) -> Result<String, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "text".into(),
            message: "todo text must not be empty".into(),
        });
    }
    Ok(text.to_string())
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// `Store` backed by the database `kv` table.
pub struct PersistentStore {
    db: Database,
    store: Store,
}

impl PersistentStore {
    /// Load todos and today's stats. Unreadable records start empty.
    pub fn load(db: Database) -> Result<Self, CoreError> {
        let store = read_store(&db, Local::now().date_naive())?;
        Ok(Self { db, store })
    }

    /// The state as of the last load or write.
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Add a todo and return its id.
    pub fn add_todo(&mut self, text: impl Into<String>) -> Result<TaskId, CoreError> {
        let id = Uuid::new_v4().to_string();
        self.dispatch(StoreCommand::AddTodo {
            id: id.clone(),
            text: text.into(),
        })?;
        Ok(id)
    }

    pub fn dispatch(&mut self, command: StoreCommand) -> Result<(), CoreError> {
        self.dispatch_at(command, Utc::now())
    }

    pub fn dispatch_at(&mut self, command: StoreCommand, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.write(command, now, |_| Ok(()))
    }

    /// Apply `command` on top of the latest persisted state and write it
    /// back, together with `also`, in one transaction.
    fn write(
        &mut self,
        command: StoreCommand,
        now: DateTime<Utc>,
        also: impl FnOnce(&Database) -> Result<(), CoreError>,
    ) -> Result<(), CoreError> {
        let tx = self.db.begin_write()?;
        let mut store = read_store(&self.db, now.with_timezone(&Local).date_naive())?;
        store.apply(command, now)?;
        self.db.kv_set(TODOS_KEY, &serde_json::to_string(&store.todos)?)?;
        self.db
            .kv_set(DAILY_STATS_KEY, &serde_json::to_string(&store.daily_stats)?)?;
        also(&self.db)?;
        tx.commit()?;
        self.store = store;
        Ok(())
    }
}

fn read_store(db: &Database, today: NaiveDate) -> Result<Store, CoreError> {
    let todos = match db.kv_get(TODOS_KEY)? {
        Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "discarding unreadable todo list");
            Vec::new()
        }),
        None => Vec::new(),
    };
    let daily_stats = match db.kv_get(DAILY_STATS_KEY)? {
        Some(json) => serde_json::from_str::<DailyStats>(&json)
            .map(|s| s.for_date(today))
            .unwrap_or_else(|_| DailyStats::fresh(today)),
        None => DailyStats::fresh(today),
    };
    Ok(Store::new(todos, daily_stats))
}

impl SessionCounter for PersistentStore {
    fn on_work_session_complete(&mut self, session: &CompletedSession) -> Result<(), CoreError> {
        let command = StoreCommand::RecordWorkSession {
            task_id: session.task_id.clone(),
            focus_minutes: session.focus_minutes,
        };
        self.write(command, session.completed_at, |db| {
            db.record_session(
                session.task_id.as_deref(),
                session.focus_minutes,
                session.completed_at,
            )?;
            Ok(())
        })
    }
}
