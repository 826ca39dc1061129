use crate::calendar::format_timestamp;
use crate::error::AppError;
use crate::model::{
    ChatMessage, ChatRole, NewTask, Task, TaskId, TaskStatus, TaskUpdate, UserId,
};
use crate::storage::migrations::run_migrations;
use crate::storage::{HistoryStore, TaskStore};
use log::{debug, info, warn};
use rusqlite::{Connection, Row, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const DB_FILE_NAME: &str = "clario.db";
const DB_ENV_VAR: &str = "CLARIO_DB_PATH";

const TASK_COLUMNS: &str = "id, user_id, title, description, status, priority, due_date, \
                            completed_at, created_at, updated_at";

/// Resolves the database file: `$CLARIO_DB_PATH`, then the configured path,
/// then the per-user config directory.
pub fn database_path(configured: Option<&str>) -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(DB_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if let Some(path) = configured
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join("clario").join(DB_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("clario")
            .join(DB_FILE_NAME))
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|err| {
                AppError::io(format!("failed to create {}: {}", parent.display(), err))
            })?;
        }

        let conn = Connection::open(path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!("failed to enable WAL mode: {err}");
        }
        info!("opened task database at {}", path.display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, AppError> {
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn execute<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| AppError::storage("database connection lock poisoned"))?;
        op(&mut guard)
    }
}

fn parse_stored_timestamp(value: &str, column: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|err| AppError::invalid_data(format!("invalid {column} '{value}': {err}")))
}

fn parse_optional_timestamp(
    value: Option<String>,
    column: &str,
) -> Result<Option<OffsetDateTime>, AppError> {
    value
        .map(|raw| parse_stored_timestamp(&raw, column))
        .transpose()
}

fn optional_timestamp(value: Option<OffsetDateTime>) -> Result<Option<String>, AppError> {
    value.map(format_timestamp).transpose()
}

fn row_to_task(row: &Row<'_>) -> Result<Task, AppError> {
    let status: String = row.get("status")?;
    let priority: String = row.get("priority")?;
    let due_date: Option<String> = row.get("due_date")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Task {
        id: row.get("id")?,
        owner: row.get("user_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: status
            .parse()
            .map_err(|_| AppError::invalid_data(format!("unknown stored status '{status}'")))?,
        priority: priority
            .parse()
            .map_err(|_| AppError::invalid_data(format!("unknown stored priority '{priority}'")))?,
        due_date: parse_optional_timestamp(due_date, "due_date")?,
        completed_at: parse_optional_timestamp(completed_at, "completed_at")?,
        created_at: parse_stored_timestamp(&created_at, "created_at")?,
        updated_at: parse_stored_timestamp(&updated_at, "updated_at")?,
    })
}

fn row_to_message(row: &Row<'_>) -> Result<ChatMessage, AppError> {
    let role: String = row.get("role")?;
    let created_at: String = row.get("created_at")?;

    Ok(ChatMessage {
        id: row.get("id")?,
        owner: row.get("user_id")?,
        role: role.parse()?,
        message: row.get("message")?,
        created_at: parse_stored_timestamp(&created_at, "created_at")?,
    })
}

fn select_task(conn: &Connection, owner: UserId, id: TaskId) -> Result<Task, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2"
    ))?;
    let mut rows = stmt.query(params![id, owner])?;
    match rows.next()? {
        Some(row) => row_to_task(row),
        None => Err(AppError::not_found(format!("task {id} not found"))),
    }
}

/// `completed_at` is stamped on the first move into `complete` and never cleared.
fn next_completed_at(
    existing: Option<OffsetDateTime>,
    status: TaskStatus,
    now: OffsetDateTime,
) -> Option<OffsetDateTime> {
    match (existing, status) {
        (Some(stamp), _) => Some(stamp),
        (None, TaskStatus::Complete) => Some(now),
        (None, _) => None,
    }
}

impl TaskStore for SqliteStore {
    fn create_task(&self, owner: UserId, task: &NewTask) -> Result<Task, AppError> {
        self.execute(|conn| {
            let now = OffsetDateTime::now_utc();
            let stamp = format_timestamp(now)?;
            let completed_at = next_completed_at(None, task.status, now);

            conn.execute(
                "INSERT INTO tasks (user_id, title, description, status, priority, due_date,
                                    completed_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    owner,
                    task.title,
                    task.description,
                    task.status.as_str(),
                    task.priority.as_str(),
                    optional_timestamp(task.due_date)?,
                    optional_timestamp(completed_at)?,
                    stamp,
                    stamp,
                ],
            )?;

            let id = conn.last_insert_rowid();
            debug!("created task {id} for user {owner}");
            select_task(conn, owner, id)
        })
    }

    fn list_tasks_by_owner(&self, owner: UserId) -> Result<Vec<Task>, AppError> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 ORDER BY id DESC"
            ))?;
            let mut rows = stmt.query(params![owner])?;
            let mut tasks = Vec::new();
            while let Some(row) = rows.next()? {
                tasks.push(row_to_task(row)?);
            }
            Ok(tasks)
        })
    }

    fn get_task(&self, owner: UserId, id: TaskId) -> Result<Task, AppError> {
        self.execute(|conn| select_task(conn, owner, id))
    }

    fn update_task(
        &self,
        owner: UserId,
        id: TaskId,
        update: &TaskUpdate,
    ) -> Result<Task, AppError> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            let existing = select_task(&tx, owner, id)?;
            let now = OffsetDateTime::now_utc();
            let completed_at = next_completed_at(existing.completed_at, update.status, now);

            tx.execute(
                "UPDATE tasks
                 SET title = ?1, description = ?2, status = ?3, priority = ?4, due_date = ?5,
                     completed_at = ?6, updated_at = ?7
                 WHERE id = ?8 AND user_id = ?9",
                params![
                    update.title,
                    update.description,
                    update.status.as_str(),
                    update.priority.as_str(),
                    optional_timestamp(update.due_date)?,
                    optional_timestamp(completed_at)?,
                    format_timestamp(now)?,
                    id,
                    owner,
                ],
            )?;

            let updated = select_task(&tx, owner, id)?;
            tx.commit()?;
            Ok(updated)
        })
    }

    fn update_status(
        &self,
        owner: UserId,
        id: TaskId,
        status: TaskStatus,
    ) -> Result<Task, AppError> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            let existing = select_task(&tx, owner, id)?;
            let now = OffsetDateTime::now_utc();
            let completed_at = next_completed_at(existing.completed_at, status, now);

            tx.execute(
                "UPDATE tasks SET status = ?1, completed_at = ?2, updated_at = ?3
                 WHERE id = ?4 AND user_id = ?5",
                params![
                    status.as_str(),
                    optional_timestamp(completed_at)?,
                    format_timestamp(now)?,
                    id,
                    owner,
                ],
            )?;

            let updated = select_task(&tx, owner, id)?;
            tx.commit()?;
            Ok(updated)
        })
    }

    fn delete_task(&self, owner: UserId, id: TaskId) -> Result<Task, AppError> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            let removed = select_task(&tx, owner, id)?;
            tx.execute(
                "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
                params![id, owner],
            )?;
            tx.commit()?;
            Ok(removed)
        })
    }
}

impl HistoryStore for SqliteStore {
    fn append_message(&self, owner: UserId, role: ChatRole, text: &str) -> Result<(), AppError> {
        self.execute(|conn| {
            conn.execute(
                "INSERT INTO ai_chats (user_id, role, message, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    owner,
                    role.as_str(),
                    text,
                    format_timestamp(OffsetDateTime::now_utc())?
                ],
            )?;
            Ok(())
        })
    }

    fn append_exchange(
        &self,
        owner: UserId,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(), AppError> {
        self.execute(|conn| {
            let stamp = format_timestamp(OffsetDateTime::now_utc())?;
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO ai_chats (user_id, role, message, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                stmt.execute(params![owner, ChatRole::User.as_str(), user_text, stamp])?;
                stmt.execute(params![
                    owner,
                    ChatRole::Assistant.as_str(),
                    assistant_text,
                    stamp
                ])?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn list_recent_messages(
        &self,
        owner: UserId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, AppError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.execute(|conn| {
            // Row ids follow insertion order, which is also created_at order.
            let mut stmt = conn.prepare(
                "SELECT id, user_id, role, message, created_at
                 FROM ai_chats
                 WHERE user_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )?;
            let mut rows = stmt.query(params![owner, limit])?;
            let mut messages = Vec::new();
            while let Some(row) = rows.next()? {
                messages.push(row_to_message(row)?);
            }
            messages.reverse();
            Ok(messages)
        })
    }
}

impl SqliteStore {
    /// Number of stored turns for `owner`.
    pub fn count_messages(&self, owner: UserId) -> Result<usize, AppError> {
        self.execute(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM ai_chats WHERE user_id = ?1",
                params![owner],
                |row| row.get(0),
            )?;
            usize::try_from(count)
                .map_err(|_| AppError::invalid_data(format!("invalid message count {count}")))
        })
    }
}
