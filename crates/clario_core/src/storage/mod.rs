use crate::error::AppError;
use crate::model::{ChatMessage, ChatRole, NewTask, Task, TaskId, TaskStatus, TaskUpdate, UserId};

mod migrations;
pub mod sqlite_store;

pub use sqlite_store::{SqliteStore, database_path};

/// Owner-scoped CRUD over task records. Every call fails with `NotFound` when
/// the task id does not belong to `owner`.
pub trait TaskStore {
    fn create_task(&self, owner: UserId, task: &NewTask) -> Result<Task, AppError>;

    fn list_tasks_by_owner(&self, owner: UserId) -> Result<Vec<Task>, AppError>;

    fn get_task(&self, owner: UserId, id: TaskId) -> Result<Task, AppError>;

    fn update_task(&self, owner: UserId, id: TaskId, update: &TaskUpdate)
    -> Result<Task, AppError>;

    fn update_status(&self, owner: UserId, id: TaskId, status: TaskStatus)
    -> Result<Task, AppError>;

    fn delete_task(&self, owner: UserId, id: TaskId) -> Result<Task, AppError>;
}

/// Append-only log of mentor turns per user.
pub trait HistoryStore {
    fn append_message(&self, owner: UserId, role: ChatRole, text: &str) -> Result<(), AppError>;

    /// Writes the user turn and the assistant turn together or not at all.
    fn append_exchange(
        &self,
        owner: UserId,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(), AppError>;

    /// The newest `limit` turns, oldest first.
    fn list_recent_messages(&self, owner: UserId, limit: usize)
    -> Result<Vec<ChatMessage>, AppError>;
}
