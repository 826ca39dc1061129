mod chat;
mod task;

pub use chat::{ChatMessage, ChatRole};
pub use task::{NewTask, TaskId, UserId, Task, TaskPriority, TaskStatus, TaskUpdate};
