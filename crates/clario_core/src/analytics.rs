use crate::calendar::day_of;
use crate::error::AppError;
use crate::model::{Task, UserId};
use crate::storage::TaskStore;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use time::{Date, Month, UtcOffset};

/// Per-day on-time completion counts for one month, every day present.
pub type Heatmap = BTreeMap<Date, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthSelector {
    pub year: i32,
    pub month: Month,
}

impl MonthSelector {
    pub fn new(year: i32, month: Month) -> Self {
        Self { year, month }
    }

    pub fn containing(date: Date) -> Self {
        Self::new(date.year(), date.month())
    }

    pub fn first_day(&self) -> Result<Date, AppError> {
        Date::from_calendar_date(self.year, self.month, 1)
            .map_err(|err| AppError::invalid_input(err.to_string()))
    }

    pub fn days(&self) -> Result<Vec<Date>, AppError> {
        let first = self.first_day()?;
        let length = self.month.length(self.year);
        let mut days = Vec::with_capacity(usize::from(length));
        let mut current = first;
        for _ in 0..length {
            days.push(current);
            match current.next_day() {
                Some(next) => current = next,
                None => break,
            }
        }
        Ok(days)
    }
}

impl fmt::Display for MonthSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, u8::from(self.month))
    }
}

impl FromStr for MonthSelector {
    type Err = AppError;

    /// Parses `YYYY-MM`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let invalid = || AppError::invalid_input(format!("month must be YYYY-MM, got '{trimmed}'"));

        let (year_raw, month_raw) = trimmed.split_once('-').ok_or_else(invalid)?;
        if year_raw.len() != 4 || month_raw.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year_raw.parse().map_err(|_| invalid())?;
        let month_number: u8 = month_raw.parse().map_err(|_| invalid())?;
        let month = Month::try_from(month_number).map_err(|_| invalid())?;

        Ok(Self::new(year, month))
    }
}

/// Calendar days, newest first, with at least one on-time completion.
fn qualifying_days(tasks: &[Task], offset: UtcOffset) -> Vec<Date> {
    let days: BTreeSet<Date> = tasks
        .iter()
        .filter(|task| task.completed_on_time())
        .filter_map(|task| task.completed_at)
        .map(|completed_at| day_of(completed_at, offset))
        .collect();
    days.into_iter().rev().collect()
}

/// Consecutive-day run of on-time completions, counted backwards from the most
/// recent qualifying day (which need not be today).
pub fn compute_streak(tasks: &[Task], offset: UtcOffset) -> u32 {
    let days = qualifying_days(tasks, offset);
    let mut iter = days.into_iter();
    let Some(mut last_day) = iter.next() else {
        return 0;
    };

    let mut streak = 1;
    for day in iter {
        if last_day.previous_day() != Some(day) {
            break;
        }
        streak += 1;
        last_day = day;
    }

    streak
}

/// On-time completions per day of `month`; days without any are present as 0.
pub fn compute_heatmap(
    tasks: &[Task],
    month: MonthSelector,
    offset: UtcOffset,
) -> Result<Heatmap, AppError> {
    let mut heatmap: Heatmap = month.days()?.into_iter().map(|day| (day, 0)).collect();

    for task in tasks.iter().filter(|task| task.completed_on_time()) {
        let Some(completed_at) = task.completed_at else {
            continue;
        };
        if let Some(count) = heatmap.get_mut(&day_of(completed_at, offset)) {
            *count += 1;
        }
    }

    Ok(heatmap)
}

pub fn streak_for_user(
    store: &dyn TaskStore,
    user_id: UserId,
    offset: UtcOffset,
) -> Result<u32, AppError> {
    let tasks = store.list_tasks_by_owner(user_id)?;
    Ok(compute_streak(&tasks, offset))
}

pub fn heatmap_for_user(
    store: &dyn TaskStore,
    user_id: UserId,
    month: MonthSelector,
    offset: UtcOffset,
) -> Result<Heatmap, AppError> {
    let tasks = store.list_tasks_by_owner(user_id)?;
    compute_heatmap(&tasks, month, offset)
}
