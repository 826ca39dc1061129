use crate::calendar::day_of;
use crate::mentor::DEFAULT_HISTORY_LIMIT;
use crate::mentor::provider::Turn;
use crate::model::{Task, TaskStatus, UserId};
use crate::storage::{HistoryStore, TaskStore};
use log::warn;
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub due_today: u32,
    pub completed_today: u32,
    pub overdue: u32,
}

/// A non-fatal problem met while assembling the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ContextWarning {
    TasksUnavailable(String),
    HistoryUnavailable(String),
    EmptyCompletion,
}

impl ContextWarning {
    pub fn describe(&self) -> String {
        match self {
            Self::TasksUnavailable(detail) => format!("task list unavailable: {detail}"),
            Self::HistoryUnavailable(detail) => format!("chat history unavailable: {detail}"),
            Self::EmptyCompletion => "model returned no content".to_string(),
        }
    }
}

/// Everything sent to the model for one mentor request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentorContextWindow {
    pub stats: TaskStats,
    pub task_report: Vec<String>,
    pub history: Vec<Turn>,
    pub system_prompt: String,
    pub prompt: String,
    pub warnings: Vec<ContextWarning>,
}

/// Counts and report lines for tasks due on `now`'s calendar day or overdue.
/// `now` carries the offset that defines the day.
pub fn summarize_tasks(tasks: &[Task], now: OffsetDateTime) -> (TaskStats, Vec<String>) {
    let today = now.date();
    let offset = now.offset();

    let mut dated: Vec<(&Task, OffsetDateTime)> = tasks
        .iter()
        .filter_map(|task| task.due_date.map(|due| (task, due)))
        .collect();
    dated.sort_by_key(|(task, due)| (*due, task.id));

    let mut stats = TaskStats::default();
    let mut report = Vec::new();

    for (task, due) in dated {
        let due_day = day_of(due, offset);
        let complete = task.status == TaskStatus::Complete;

        if due_day == today {
            stats.due_today += 1;
            let label = if complete {
                stats.completed_today += 1;
                "DONE"
            } else {
                "PENDING"
            };
            report.push(format!(
                "- Status: {label}, Title: {}, Description: {}, Priority: {}",
                task.title, task.description, task.priority
            ));
        } else if due < now && !complete {
            stats.overdue += 1;
            report.push(format!("- OVERDUE: {} Due: {}", task.title, due_day));
        }
    }

    (stats, report)
}

pub fn compose_system_prompt(stats: &TaskStats, report: &[String]) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are Clario, a wise, empathetic, but firm accountability mentor.\n\n",
    );

    prompt.push_str("USER STATS:\n");
    prompt.push_str(&format!("- Tasks Due Today: {}\n", stats.due_today));
    prompt.push_str(&format!("- Completed Today: {}\n", stats.completed_today));
    prompt.push_str(&format!("- Overdue: {}\n", stats.overdue));

    prompt.push_str("\nSPECIFIC TASKS ON THEIR PLATE:\n");
    if report.is_empty() {
        prompt.push_str("- Nothing due today and nothing overdue.\n");
    }
    for line in report {
        prompt.push_str(line);
        prompt.push('\n');
    }

    prompt.push_str(
        "\nINSTRUCTIONS:\n\
         - Look at the specific tasks in the list above.\n\
         - If they finished a hard task (High Priority), mention it specifically.\n\
         - If they missed a specific task, ask about it directly.\n\
         - Keep responses short (2-3 sentences).\n",
    );

    prompt
}

pub fn compose_prompt(system_prompt: &str, utterance: &str) -> String {
    format!("{system_prompt}\n\nUser: {utterance}")
}

/// Reads the user's tasks and recent turns and builds the window. Fetch
/// failures degrade to empty context and are recorded as warnings.
/// `history_limit` never exceeds [`DEFAULT_HISTORY_LIMIT`] turns.
pub fn assemble_context(
    tasks: &dyn TaskStore,
    history: &dyn HistoryStore,
    user_id: UserId,
    utterance: &str,
    now: OffsetDateTime,
    history_limit: usize,
) -> MentorContextWindow {
    let history_limit = history_limit.min(DEFAULT_HISTORY_LIMIT);
    let mut warnings = Vec::new();

    let owned = match tasks.list_tasks_by_owner(user_id) {
        Ok(owned) => owned,
        Err(err) => {
            warn!("mentor context for user {user_id}: continuing without tasks: {err}");
            warnings.push(ContextWarning::TasksUnavailable(err.to_string()));
            Vec::new()
        }
    };

    let turns = match history.list_recent_messages(user_id, history_limit) {
        Ok(messages) => {
            // Never trust the store to honour the cap.
            let skip = messages.len().saturating_sub(history_limit);
            messages.iter().skip(skip).map(Turn::from).collect()
        }
        Err(err) => {
            warn!("mentor context for user {user_id}: continuing without history: {err}");
            warnings.push(ContextWarning::HistoryUnavailable(err.to_string()));
            Vec::new()
        }
    };

    let (stats, task_report) = summarize_tasks(&owned, now);
    let system_prompt = compose_system_prompt(&stats, &task_report);
    let prompt = compose_prompt(&system_prompt, utterance);

    MentorContextWindow {
        stats,
        task_report,
        history: turns,
        system_prompt,
        prompt,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::{TaskStats, compose_system_prompt, summarize_tasks};
    use crate::model::{Task, TaskPriority, TaskStatus};
    use time::macros::{datetime, offset};
    use time::{Duration, OffsetDateTime};

    fn task(id: i64, title: &str, status: TaskStatus, due: Option<OffsetDateTime>) -> Task {
        Task {
            id,
            owner: 1,
            title: title.to_string(),
            description: format!("{title} details"),
            status,
            priority: TaskPriority::High,
            due_date: due,
            completed_at: None,
            created_at: datetime!(2024-05-01 00:00 UTC),
            updated_at: datetime!(2024-05-01 00:00 UTC),
        }
    }

    #[test]
    fn due_today_and_overdue_are_partitioned() {
        let now = datetime!(2024-05-10 15:00 UTC);
        let tasks = vec![
            task(1, "A", TaskStatus::Complete, Some(datetime!(2024-05-10 09:00 UTC))),
            task(2, "B", TaskStatus::Todo, Some(datetime!(2024-05-10 20:00 UTC))),
            task(3, "C", TaskStatus::Todo, Some(now - Duration::days(3))),
        ];

        let (stats, report) = summarize_tasks(&tasks, now);
        assert_eq!(
            stats,
            TaskStats {
                due_today: 2,
                completed_today: 1,
                overdue: 1,
            }
        );
        assert_eq!(report.len(), 3);
        assert_eq!(report.iter().filter(|line| line.contains("DONE")).count(), 1);
        assert_eq!(report.iter().filter(|line| line.contains("PENDING")).count(), 1);
        assert_eq!(report.iter().filter(|line| line.contains("OVERDUE")).count(), 1);
        assert!(report[0].contains("OVERDUE: C Due: 2024-05-07"));
        assert!(report[1].contains("Status: DONE, Title: A"));
        assert!(report[2].contains("Status: PENDING, Title: B"));
    }

    #[test]
    fn overdue_never_counts_as_due_today() {
        let now = datetime!(2024-05-10 15:00 UTC);
        // Earlier today and incomplete: due today, not overdue.
        let tasks = vec![task(
            1,
            "morning run",
            TaskStatus::Todo,
            Some(datetime!(2024-05-10 06:00 UTC)),
        )];

        let (stats, _) = summarize_tasks(&tasks, now);
        assert_eq!(stats.due_today, 1);
        assert_eq!(stats.overdue, 0);
    }

    #[test]
    fn completed_or_future_or_undated_tasks_are_ignored() {
        let now = datetime!(2024-05-10 15:00 UTC);
        let tasks = vec![
            task(1, "old done", TaskStatus::Complete, Some(now - Duration::days(2))),
            task(2, "future", TaskStatus::Todo, Some(now + Duration::days(2))),
            task(3, "undated", TaskStatus::InProgress, None),
        ];

        let (stats, report) = summarize_tasks(&tasks, now);
        assert_eq!(stats, TaskStats::default());
        assert!(report.is_empty());
    }

    #[test]
    fn today_follows_the_offset_of_now() {
        // 22:00 UTC on the 9th is the 10th at +03:00.
        let now = datetime!(2024-05-10 09:00 +3);
        let tasks = vec![task(
            1,
            "late night",
            TaskStatus::Todo,
            Some(datetime!(2024-05-09 22:00 UTC)),
        )];

        let (stats, _) = summarize_tasks(&tasks, now);
        assert_eq!(stats.due_today, 1);
        assert_eq!(stats.overdue, 0);

        let (utc_stats, _) = summarize_tasks(&tasks, now.to_offset(offset!(UTC)));
        assert_eq!(utc_stats.due_today, 0);
        assert_eq!(utc_stats.overdue, 1);
    }

    #[test]
    fn system_prompt_embeds_stats_report_and_brevity() {
        let stats = TaskStats {
            due_today: 2,
            completed_today: 1,
            overdue: 4,
        };
        let report = vec!["- OVERDUE: taxes Due: 2024-04-15".to_string()];

        let prompt = compose_system_prompt(&stats, &report);
        assert!(prompt.contains("accountability mentor"));
        assert!(prompt.contains("Tasks Due Today: 2"));
        assert!(prompt.contains("Completed Today: 1"));
        assert!(prompt.contains("Overdue: 4"));
        assert!(prompt.contains("- OVERDUE: taxes Due: 2024-04-15"));
        assert!(prompt.contains("Keep responses short"));
    }
}
