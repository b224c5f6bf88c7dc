use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::{clock_time_serde, task_date_serde};

pub const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Priority::Low),
            "medium" | "m" => Ok(Priority::Medium),
            "high" | "h" => Ok(Priority::High),
            other => Err(anyhow!("invalid priority: {other} (expected low, medium or high)")),
        }
    }
}

/// Which of the two widget schemas a board runs with.
///
/// `Full` carries every field, filters, sorts, confirms deletes and emits
/// notifications. `Simple` only knows `name`, `date` and `completed`, and
/// identifies records by their `(name, date)` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Full,
    Simple,
}

impl Profile {
    pub fn is_full(self) -> bool {
        self == Profile::Full
    }
}

impl FromStr for Profile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Profile::Full),
            "simple" => Ok(Profile::Simple),
            other => Err(anyhow!("invalid profile: {other} (expected full or simple)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: u64,

    #[serde(alias = "name")]
    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default = "default_category")]
    pub category: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, with = "task_date_serde")]
    pub date: Option<NaiveDate>,

    #[serde(default, with = "clock_time_serde")]
    pub time: Option<NaiveTime>,

    #[serde(default)]
    pub completed: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub reminder_sent: bool,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// The reduced record written by the simple profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleRecord {
    pub name: String,
    #[serde(default, with = "task_date_serde")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
}

impl From<&Task> for SimpleRecord {
    fn from(task: &Task) -> Self {
        Self {
            name: task.title.clone(),
            date: task.date,
            completed: task.completed,
        }
    }
}

/// User input for a new task, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub priority: Priority,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

impl Task {
    pub fn from_draft(draft: &TaskDraft, id: u64, now: DateTime<Utc>) -> Self {
        let category = draft
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(default_category);

        Self {
            id,
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            category,
            priority: draft.priority,
            date: draft.date,
            time: draft.time,
            completed: false,
            created_at: now,
            reminder_sent: false,
        }
    }

    pub fn same_identity(&self, other: &Task) -> bool {
        self.title == other.title && self.date == other.date
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.date.map(|d| d < today).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_record_uses_camel_case_and_hh_mm_time() {
        let now = Utc::now();
        let mut draft = TaskDraft::new("  Essay draft ").with_priority(Priority::High);
        draft.date = NaiveDate::from_ymd_opt(2024, 1, 5);
        draft.time = NaiveTime::from_hms_opt(14, 30, 0);
        let task = Task::from_draft(&draft, 7, now);

        let value = serde_json::to_value(&task).expect("serialize");
        assert_eq!(value["title"], "Essay draft");
        assert_eq!(value["priority"], "high");
        assert_eq!(value["date"], "2024-01-05");
        assert_eq!(value["time"], "14:30");
        assert_eq!(value["reminderSent"], false);
        assert!(value.get("createdAt").is_some());
        assert!(value.get("description").is_none());
        assert_eq!(task.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn simple_record_decodes_as_task() {
        let raw = r#"{"name":"Buy milk","date":"","completed":true}"#;
        let task: Task = serde_json::from_str(raw).expect("decode");
        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.date, None);
        assert!(task.completed);
        assert_eq!(task.id, 0);
        assert_eq!(task.priority, Priority::Medium);
    }

    #[test]
    fn priority_parses_short_forms() {
        assert_eq!("H".parse::<Priority>().expect("parse"), Priority::High);
        assert_eq!("low".parse::<Priority>().expect("parse"), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn overdue_requires_incomplete_and_past_date() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).expect("date");
        let mut task = Task::from_draft(
            &TaskDraft::new("x").with_date(today.pred_opt().expect("date")),
            1,
            Utc::now(),
        );
        assert!(task.is_overdue(today));
        task.completed = true;
        assert!(!task.is_overdue(today));
        task.completed = false;
        task.date = Some(today);
        assert!(!task.is_overdue(today));
    }
}
