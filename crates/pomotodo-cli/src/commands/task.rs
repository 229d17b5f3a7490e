//! Task list commands for CLI.

use clap::Subcommand;
use pomotodo_core::{Database, PersistentStore, StoreCommand};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Add a task
    Add {
        /// Task text
        text: String,
    },
    /// List tasks as JSON
    List,
    /// Change a task's text
    Edit {
        /// Task ID
        id: String,
        /// New text
        text: String,
    },
    /// Move a task to a new position in the list
    Move {
        /// Task ID
        id: String,
        /// New 0-based position; past the end moves it last
        position: usize,
    },
    /// Toggle a task between open and done
    Done {
        /// Task ID
        id: String,
    },
    /// Remove a task
    Remove {
        /// Task ID
        id: String,
    },
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = PersistentStore::load(Database::open()?)?;

    match action {
        TaskAction::Add { text } => {
            let id = store.add_todo(text)?;
            println!("Task created: {id}");
            if let Some(todo) = store.store().todo(&id) {
                println!("{}", serde_json::to_string_pretty(todo)?);
            }
        }
        TaskAction::List => {
            println!("{}", serde_json::to_string_pretty(store.store().todos())?);
        }
        TaskAction::Edit { id, text } => {
            store.dispatch(StoreCommand::UpdateTodo {
                id: id.clone(),
                text,
            })?;
            if let Some(todo) = store.store().todo(&id) {
                println!("{}", serde_json::to_string_pretty(todo)?);
            }
        }
        TaskAction::Move { id, position } => {
            store.dispatch(StoreCommand::MoveTodo { id, position })?;
            println!("{}", serde_json::to_string_pretty(store.store().todos())?);
        }
        TaskAction::Done { id } => {
            store.dispatch(StoreCommand::ToggleTodo { id: id.clone() })?;
            if let Some(todo) = store.store().todo(&id) {
                println!("{}", serde_json::to_string_pretty(todo)?);
            }
        }
        TaskAction::Remove { id } => {
            store.dispatch(StoreCommand::DeleteTodo { id: id.clone() })?;
            println!("Task deleted: {id}");
        }
    }
    Ok(())
}
