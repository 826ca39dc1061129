mod cli;

use clap::Parser;
use clario_core::analytics::{self, Heatmap, MonthSelector};
use clario_core::calendar::now_in;
use clario_core::config::{self, Config};
use clario_core::error::AppError;
use clario_core::mentor::{GeminiClient, MentorReply, MentorService};
use clario_core::model::{ChatMessage, Task, UserId};
use clario_core::storage::{HistoryStore, SqliteStore, database_path};
use clario_core::task_api::{self, TaskEdit, TaskInput};
use cli::{Cli, Command, TaskCommand, TaskFields, collect_config_overrides};
use log::debug;
use std::io::{self, BufRead, Write};
use tabled::{Table, Tabled};
use time::UtcOffset;

struct Runtime {
    config: Config,
    store: SqliteStore,
    offset: UtcOffset,
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Due")]
    due: String,
    #[tabled(rename = "Completed")]
    completed: String,
}

fn display_time(value: Option<time::OffsetDateTime>, offset: UtcOffset) -> String {
    let format = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]");
    value
        .and_then(|stamp| stamp.to_offset(offset).format(&format).ok())
        .unwrap_or_else(|| "-".to_string())
}

fn print_tasks_plain(tasks: &[Task], offset: UtcOffset) {
    if tasks.is_empty() {
        println!("No tasks.");
        return;
    }

    let rows: Vec<TaskRow> = tasks
        .iter()
        .map(|task| TaskRow {
            id: task.id,
            title: task.title.clone(),
            status: task.status.to_string(),
            priority: task.priority.to_string(),
            due: display_time(task.due_date, offset),
            completed: display_time(task.completed_at, offset),
        })
        .collect();
    println!("{}", Table::new(rows));
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let rendered =
        serde_json::to_string(value).map_err(|err| AppError::invalid_data(err.to_string()))?;
    println!("{rendered}");
    Ok(())
}

fn print_heatmap(month: MonthSelector, heatmap: &Heatmap, json: bool) -> Result<(), AppError> {
    if json {
        let days: serde_json::Map<String, serde_json::Value> = heatmap
            .iter()
            .map(|(day, count)| (day.to_string(), serde_json::Value::from(*count)))
            .collect();
        return print_json(&serde_json::json!({
            "month": month.to_string(),
            "days": days,
        }));
    }

    println!("On-time completions for {month}:");
    for (day, count) in heatmap {
        println!("{day} {count}");
    }
    Ok(())
}

fn print_history(messages: &[ChatMessage], json: bool) -> Result<(), AppError> {
    if json {
        return print_json(messages);
    }
    if messages.is_empty() {
        println!("No conversation yet.");
    }
    for message in messages {
        println!("[{}] {}", message.role, message.message);
    }
    Ok(())
}

fn print_reply(reply: &MentorReply, json: bool) -> Result<(), AppError> {
    for warning in &reply.warnings {
        eprintln!("WARNING: {}", warning.describe());
    }
    if reply.is_empty() {
        return Err(AppError::upstream("mentor returned an empty reply"));
    }
    if json {
        return print_json(reply);
    }
    println!("{}", reply.text);
    Ok(())
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

fn require_user(cli: &Cli) -> Result<UserId, AppError> {
    let user = cli
        .user
        .ok_or_else(|| AppError::invalid_input("user id is required (--user or CLARIO_USER_ID)"))?;
    task_api::require_user(user)
}

fn task_input(title: String, fields: TaskFields) -> TaskInput {
    TaskInput {
        title,
        description: fields.description,
        status: fields.status,
        priority: fields.priority,
        due_date: fields.due,
    }
}

fn load_runtime(cli: &Cli) -> Result<Runtime, AppError> {
    let loaded = config::load_config_with_fallback();
    if let Some(err) = loaded.error {
        eprintln!("WARNING: using default configuration: {err}");
    }

    let overrides =
        collect_config_overrides(&cli.config_override).map_err(AppError::invalid_input)?;
    let config = config::merge_overrides(&loaded.config, &overrides)?;
    let offset = config.offset()?;
    let path = database_path(config.database_path.as_deref())?;
    debug!("using database {}", path.display());
    let store = SqliteStore::open(&path)?;

    Ok(Runtime {
        config,
        store,
        offset,
    })
}

fn chat_once(
    mentor: &MentorService<'_>,
    user: UserId,
    message: &str,
    json: bool,
) -> Result<(), AppError> {
    match mentor.reply(user, message) {
        Ok(reply) => print_reply(&reply, json),
        Err(AppError::HistoryOutOfSync { reply, message }) => {
            println!("{reply}");
            Err(AppError::HistoryOutOfSync { reply, message })
        }
        Err(err) => Err(err),
    }
}

fn run_chat_interactive(
    mentor: &MentorService<'_>,
    user: UserId,
    json: bool,
) -> Result<(), AppError> {
    let mut input = String::new();
    let stdin = io::stdin();
    let mut stdin_lock = stdin.lock();

    loop {
        print!("> ");
        io::stdout()
            .flush()
            .map_err(|err| AppError::io(err.to_string()))?;

        input.clear();
        let bytes = stdin_lock
            .read_line(&mut input)
            .map_err(|err| AppError::io(err.to_string()))?;

        if bytes == 0 {
            break;
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        if let Err(err) = chat_once(mentor, user, line, json) {
            eprintln!("ERROR: {}", err);
        }
    }

    Ok(())
}

fn run_task_command(
    runtime: &Runtime,
    user: UserId,
    command: TaskCommand,
    json: bool,
) -> Result<(), AppError> {
    let store = &runtime.store;
    match command {
        TaskCommand::Add { title, fields } => {
            let task = task_api::add_task(store, user, &task_input(title, fields))?;
            if json {
                print_json(&task)?;
            } else {
                println!("Added task: {} ({})", task.title, task.id);
            }
        }
        TaskCommand::List => {
            let tasks = task_api::list_tasks(store, user)?;
            if json {
                print_json(&tasks)?;
            } else {
                print_tasks_plain(&tasks, runtime.offset);
            }
        }
        TaskCommand::Edit {
            id,
            title,
            fields,
            clear_due,
        } => {
            let edit = TaskEdit {
                title,
                description: fields.description,
                status: fields.status,
                priority: fields.priority,
                due_date: fields.due,
                clear_due_date: clear_due,
            };
            let task = task_api::edit_task(store, user, id, &edit)?;
            if json {
                print_json(&task)?;
            } else {
                println!("Updated task: {} ({})", task.title, task.id);
            }
        }
        TaskCommand::Status { id, status } => {
            let task = task_api::set_status(store, user, id, &status)?;
            if json {
                print_json(&task)?;
            } else {
                println!("Task {} is now {}", task.id, task.status);
            }
        }
        TaskCommand::Delete { id } => {
            let task = task_api::delete_task(store, user, id)?;
            if json {
                print_json(&task)?;
            } else {
                println!("Deleted task: {} ({})", task.title, task.id);
            }
        }
    }

    Ok(())
}

fn run_command(cli: Cli) -> Result<(), AppError> {
    let user = require_user(&cli)?;
    let runtime = load_runtime(&cli)?;
    let json = cli.json;

    match cli.command {
        Command::Task { task } => run_task_command(&runtime, user, task, json)?,
        Command::Streak => {
            let streak = analytics::streak_for_user(&runtime.store, user, runtime.offset)?;
            if json {
                print_json(&serde_json::json!({ "streak": streak }))?;
            } else {
                let unit = if streak == 1 { "day" } else { "days" };
                println!("Current streak: {streak} {unit}");
            }
        }
        Command::Heatmap { month } => {
            let month = match month {
                Some(raw) => raw.parse()?,
                None => MonthSelector::containing(now_in(runtime.offset).date()),
            };
            let heatmap =
                analytics::heatmap_for_user(&runtime.store, user, month, runtime.offset)?;
            print_heatmap(month, &heatmap, json)?;
        }
        Command::History { limit } => {
            let messages = runtime.store.list_recent_messages(user, limit)?;
            print_history(&messages, json)?;
        }
        Command::Chat { message } => {
            let client = GeminiClient::from_settings(&runtime.config.model_settings())?;
            let mentor = MentorService::new(
                &runtime.store,
                &runtime.store,
                &client,
                runtime.config.mentor_settings(),
                runtime.offset,
            );
            match message {
                Some(message) => chat_once(&mentor, user, &message, json)?,
                None => run_chat_interactive(&mentor, user, json)?,
            }
        }
    }

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err)
            if matches!(
                err.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) =>
        {
            err.exit()
        }
        Err(err) => {
            eprintln!("ERROR: {}", normalize_parse_error(err));
            std::process::exit(1);
        }
    };

    if let Err(err) = run_command(cli) {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}
