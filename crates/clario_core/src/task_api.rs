use crate::calendar::parse_timestamp;
use crate::error::AppError;
use crate::model::{NewTask, Task, TaskId, TaskPriority, TaskStatus, TaskUpdate, UserId};
use crate::storage::TaskStore;
use time::OffsetDateTime;

/// Raw fields for a new task as they arrive from a client.
#[derive(Debug, Default, Clone)]
pub struct TaskInput {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
}

/// Partial edit; unset fields keep their stored value.
#[derive(Debug, Default, Clone)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    pub clear_due_date: bool,
}

pub fn require_user(owner: UserId) -> Result<UserId, AppError> {
    if owner <= 0 {
        return Err(AppError::invalid_input("user id must be positive"));
    }
    Ok(owner)
}

fn required_title(title: &str) -> Result<String, AppError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("title is required"));
    }
    Ok(trimmed.to_string())
}

fn optional_due_date(raw: Option<&str>) -> Result<Option<OffsetDateTime>, AppError> {
    match raw.map(str::trim) {
        Some(value) if !value.is_empty() => parse_timestamp(value)
            .map(Some)
            .map_err(|_| AppError::invalid_input("due date must be RFC3339")),
        _ => Ok(None),
    }
}

pub fn add_task(store: &dyn TaskStore, owner: UserId, input: &TaskInput) -> Result<Task, AppError> {
    let owner = require_user(owner)?;
    let task = NewTask {
        title: required_title(&input.title)?,
        description: input
            .description
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string(),
        status: input
            .status
            .as_deref()
            .map(str::parse::<TaskStatus>)
            .transpose()?
            .unwrap_or_default(),
        priority: input
            .priority
            .as_deref()
            .map(str::parse::<TaskPriority>)
            .transpose()?
            .unwrap_or_default(),
        due_date: optional_due_date(input.due_date.as_deref())?,
    };

    store.create_task(owner, &task)
}

pub fn list_tasks(store: &dyn TaskStore, owner: UserId) -> Result<Vec<Task>, AppError> {
    store.list_tasks_by_owner(require_user(owner)?)
}

pub fn edit_task(
    store: &dyn TaskStore,
    owner: UserId,
    id: TaskId,
    edit: &TaskEdit,
) -> Result<Task, AppError> {
    let owner = require_user(owner)?;
    if edit.clear_due_date && edit.due_date.is_some() {
        return Err(AppError::invalid_input(
            "cannot set and clear the due date at once",
        ));
    }

    let existing = store.get_task(owner, id)?;
    let update = TaskUpdate {
        title: match edit.title.as_deref() {
            Some(title) => required_title(title)?,
            None => existing.title,
        },
        description: edit
            .description
            .as_deref()
            .map(|value| value.trim().to_string())
            .unwrap_or(existing.description),
        status: match edit.status.as_deref() {
            Some(raw) => raw.parse::<TaskStatus>()?,
            None => existing.status,
        },
        priority: match edit.priority.as_deref() {
            Some(raw) => raw.parse::<TaskPriority>()?,
            None => existing.priority,
        },
        due_date: if edit.clear_due_date {
            None
        } else if edit.due_date.is_some() {
            optional_due_date(edit.due_date.as_deref())?
        } else {
            existing.due_date
        },
    };

    store.update_task(owner, id, &update)
}

pub fn set_status(
    store: &dyn TaskStore,
    owner: UserId,
    id: TaskId,
    status: &str,
) -> Result<Task, AppError> {
    let owner = require_user(owner)?;
    let status: TaskStatus = status.parse()?;
    store.update_status(owner, id, status)
}

pub fn delete_task(store: &dyn TaskStore, owner: UserId, id: TaskId) -> Result<Task, AppError> {
    store.delete_task(require_user(owner)?, id)
}

#[cfg(test)]
mod tests {
    use super::{TaskEdit, TaskInput, add_task, delete_task, edit_task, list_tasks, set_status};
    use crate::model::{TaskPriority, TaskStatus};
    use crate::storage::SqliteStore;
    use time::macros::datetime;

    fn input(title: &str) -> TaskInput {
        TaskInput {
            title: title.to_string(),
            ..TaskInput::default()
        }
    }

    #[test]
    fn add_task_applies_defaults() {
        let store = SqliteStore::open_in_memory().unwrap();
        let task = add_task(&store, 1, &input("  read a chapter ")).unwrap();

        assert_eq!(task.title, "read a chapter");
        assert_eq!(task.description, "");
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.due_date, None);
        assert_eq!(task.completed_at, None);
    }

    #[test]
    fn add_task_rejects_blank_title() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = add_task(&store, 1, &input("   ")).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
        assert!(list_tasks(&store, 1).unwrap().is_empty());
    }

    #[test]
    fn add_task_rejects_unknown_priority_and_bad_due_date() {
        let store = SqliteStore::open_in_memory().unwrap();

        let err = add_task(
            &store,
            1,
            &TaskInput {
                priority: Some("urgent".into()),
                ..input("gym")
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let err = add_task(
            &store,
            1,
            &TaskInput {
                due_date: Some("tomorrow".into()),
                ..input("gym")
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn add_task_created_complete_is_stamped() {
        let store = SqliteStore::open_in_memory().unwrap();
        let task = add_task(
            &store,
            1,
            &TaskInput {
                status: Some("complete".into()),
                due_date: Some("2099-01-01T00:00:00Z".into()),
                ..input("already done")
            },
        )
        .unwrap();

        assert_eq!(task.status, TaskStatus::Complete);
        assert!(task.completed_at.is_some());
        assert!(task.completed_on_time());
    }

    #[test]
    fn rejects_non_positive_user() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = add_task(&store, 0, &input("x")).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
        let err = list_tasks(&store, -3).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn edit_task_keeps_unset_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let task = add_task(
            &store,
            1,
            &TaskInput {
                description: Some("chapter 3".into()),
                priority: Some("high".into()),
                due_date: Some("2024-05-10T09:00:00Z".into()),
                ..input("read")
            },
        )
        .unwrap();

        let edited = edit_task(
            &store,
            1,
            task.id,
            &TaskEdit {
                title: Some("read more".into()),
                ..TaskEdit::default()
            },
        )
        .unwrap();

        assert_eq!(edited.title, "read more");
        assert_eq!(edited.description, "chapter 3");
        assert_eq!(edited.priority, TaskPriority::High);
        assert_eq!(edited.due_date, Some(datetime!(2024-05-10 09:00 UTC)));
    }

    #[test]
    fn edit_task_can_clear_due_date() {
        let store = SqliteStore::open_in_memory().unwrap();
        let task = add_task(
            &store,
            1,
            &TaskInput {
                due_date: Some("2024-05-10T09:00:00Z".into()),
                ..input("read")
            },
        )
        .unwrap();

        let edited = edit_task(
            &store,
            1,
            task.id,
            &TaskEdit {
                clear_due_date: true,
                ..TaskEdit::default()
            },
        )
        .unwrap();
        assert_eq!(edited.due_date, None);

        let err = edit_task(
            &store,
            1,
            task.id,
            &TaskEdit {
                clear_due_date: true,
                due_date: Some("2024-05-11T09:00:00Z".into()),
                ..TaskEdit::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn edit_task_rejects_blank_title_and_missing_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let task = add_task(&store, 1, &input("read")).unwrap();

        let err = edit_task(
            &store,
            1,
            task.id,
            &TaskEdit {
                title: Some(" ".into()),
                ..TaskEdit::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let err = edit_task(&store, 1, task.id + 100, &TaskEdit::default()).unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn set_status_parses_and_stamps_completion() {
        let store = SqliteStore::open_in_memory().unwrap();
        let task = add_task(&store, 1, &input("read")).unwrap();

        let err = set_status(&store, 1, task.id, "finished").unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let progressing = set_status(&store, 1, task.id, "in_progress").unwrap();
        assert_eq!(progressing.status, TaskStatus::InProgress);
        assert!(progressing.completed_at.is_none());

        let done = set_status(&store, 1, task.id, "complete").unwrap();
        assert_eq!(done.status, TaskStatus::Complete);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn delete_task_is_scoped_to_owner() {
        let store = SqliteStore::open_in_memory().unwrap();
        let task = add_task(&store, 1, &input("read")).unwrap();

        let err = delete_task(&store, 2, task.id).unwrap_err();
        assert_eq!(err.code(), "not_found");

        let removed = delete_task(&store, 1, task.id).unwrap();
        assert_eq!(removed.title, "read");
        assert!(list_tasks(&store, 1).unwrap().is_empty());
    }
}
