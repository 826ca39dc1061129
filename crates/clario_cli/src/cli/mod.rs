use clap::{Args, Parser, Subcommand};
use clario_core::config::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(name = "clario", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Authenticated user id
    #[arg(long, global = true, env = "CLARIO_USER_ID")]
    pub user: Option<i64>,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage tasks
    Task {
        #[command(subcommand)]
        task: TaskCommand,
    },
    /// Show the current on-time completion streak
    ///
    /// Example: clario streak
    Streak,
    /// Show on-time completions per day for a month
    ///
    /// Example: clario heatmap --month 2024-05
    Heatmap {
        /// Month as YYYY-MM (defaults to the current month)
        #[arg(long)]
        month: Option<String>,
    },
    /// Talk to the mentor; without a message, read messages from stdin
    ///
    /// Example: clario chat "I skipped the gym today"
    Chat { message: Option<String> },
    /// Show recent mentor conversation turns
    ///
    /// Example: clario history --limit 10
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Add a new task
    ///
    /// Example: clario task add "Leetcode x2" --priority high --due 2024-05-10T18:00:00Z
    Add {
        title: String,
        #[command(flatten)]
        fields: TaskFields,
    },
    /// List all tasks
    List,
    /// Edit a task; unset fields keep their value
    ///
    /// Example: clario task edit 3 --title "Leetcode x3" --clear-due
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        fields: TaskFields,
        #[arg(long = "clear-due", conflicts_with = "due")]
        clear_due: bool,
    },
    /// Change a task's status (todo, in_progress, complete)
    ///
    /// Example: clario task status 3 complete
    Status { id: i64, status: String },
    /// Delete a task
    ///
    /// Example: clario task delete 3
    Delete { id: i64 },
}

#[derive(Args, Debug)]
pub struct TaskFields {
    #[arg(long)]
    pub description: Option<String>,
    /// todo, in_progress or complete
    #[arg(long)]
    pub status: Option<String>,
    /// low, medium or high
    #[arg(long)]
    pub priority: Option<String>,
    /// Due date as RFC3339
    #[arg(long)]
    pub due: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    DatabasePath,
    HistoryLimit,
    UtcOffset,
    ModelEndpoint,
    ModelName,
    ModelApiKeyEnv,
    ModelTimeoutSecs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfigOverride {
    pub target: ConfigOverrideTarget,
    pub value: String,
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ParsedConfigOverride, String> {
    let trimmed = raw.trim();
    let (key_raw, value_raw) = trimmed
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;

    let value = value_raw.trim().to_string();
    let (field, remainder) = key_raw
        .split_once('.')
        .map(|(field, rest)| (field.trim(), Some(rest.trim())))
        .unwrap_or((key_raw.trim(), None));

    let canonical_field =
        canonicalize_flag_name(field).ok_or_else(|| "override key cannot be empty".to_string())?;

    let target = match (canonical_field.as_str(), remainder) {
        ("database_path" | "db", None) => ConfigOverrideTarget::DatabasePath,
        ("history_limit", None) => ConfigOverrideTarget::HistoryLimit,
        ("utc_offset" | "offset", None) => ConfigOverrideTarget::UtcOffset,
        ("model", Some(sub)) => {
            let sub = canonicalize_flag_name(sub)
                .ok_or_else(|| "model override requires a field name".to_string())?;
            match sub.as_str() {
                "endpoint" => ConfigOverrideTarget::ModelEndpoint,
                "name" => ConfigOverrideTarget::ModelName,
                "api_key_env" => ConfigOverrideTarget::ModelApiKeyEnv,
                "timeout_secs" | "timeout" => ConfigOverrideTarget::ModelTimeoutSecs,
                other => return Err(format!("unknown model field '{other}'")),
            }
        }
        ("model", None) => return Err("model override requires a field name".to_string()),
        (other, Some(_)) => {
            return Err(format!("{other} override cannot have subfields"));
        }
        (other, _) => return Err(format!("unknown config field '{other}'")),
    };

    Ok(ParsedConfigOverride { target, value })
}

/// Folds parsed overrides into the structure the core config understands.
pub fn collect_config_overrides(raw: &[String]) -> Result<ConfigOverrides, String> {
    let mut overrides = ConfigOverrides::default();

    for entry in raw {
        let parsed = parse_config_override(entry)?;
        let value = parsed.value;
        match parsed.target {
            ConfigOverrideTarget::DatabasePath => overrides.database_path = Some(value),
            ConfigOverrideTarget::HistoryLimit => {
                let limit = value
                    .parse()
                    .map_err(|_| format!("history_limit must be a number, got '{value}'"))?;
                overrides.history_limit = Some(limit);
            }
            ConfigOverrideTarget::UtcOffset => overrides.utc_offset = Some(value),
            ConfigOverrideTarget::ModelEndpoint => overrides.model_endpoint = Some(value),
            ConfigOverrideTarget::ModelName => overrides.model_name = Some(value),
            ConfigOverrideTarget::ModelApiKeyEnv => overrides.model_api_key_env = Some(value),
            ConfigOverrideTarget::ModelTimeoutSecs => {
                let secs = value
                    .parse()
                    .map_err(|_| format!("model.timeout_secs must be a number, got '{value}'"))?;
                overrides.model_timeout_secs = Some(secs);
            }
        }
    }

    Ok(overrides)
}

fn canonicalize_flag_name(name: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
