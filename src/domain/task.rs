//! Task entity: status lifecycle, six-level priority, linear ordering, and
//! the recurrence config used to schedule follow-up occurrences.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Blocked,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "todo" => Some(TaskStatus::Todo),
            "in_progress" | "in-progress" => Some(TaskStatus::InProgress),
            "blocked" => Some(TaskStatus::Blocked),
            "completed" | "done" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Priority levels from most to least urgent. `rank` 0 sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Critical,
    Blocker,
    Major,
    #[default]
    Normal,
    Minor,
    Trivial,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Critical => "critical",
            TaskPriority::Blocker => "blocker",
            TaskPriority::Major => "major",
            TaskPriority::Normal => "normal",
            TaskPriority::Minor => "minor",
            TaskPriority::Trivial => "trivial",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Some(TaskPriority::Critical),
            "blocker" => Some(TaskPriority::Blocker),
            "major" => Some(TaskPriority::Major),
            "normal" => Some(TaskPriority::Normal),
            "minor" => Some(TaskPriority::Minor),
            "trivial" => Some(TaskPriority::Trivial),
            _ => None,
        }
    }

    /// Sort key: lower is more urgent.
    pub fn rank(&self) -> u8 {
        match self {
            TaskPriority::Critical => 0,
            TaskPriority::Blocker => 1,
            TaskPriority::Major => 2,
            TaskPriority::Normal => 3,
            TaskPriority::Minor => 4,
            TaskPriority::Trivial => 5,
        }
    }

    /// One step in the fixed click-to-cycle order. Trivial wraps to Critical.
    pub fn next_in_cycle(&self) -> Self {
        match self {
            TaskPriority::Critical => TaskPriority::Blocker,
            TaskPriority::Blocker => TaskPriority::Major,
            TaskPriority::Major => TaskPriority::Normal,
            TaskPriority::Normal => TaskPriority::Minor,
            TaskPriority::Minor => TaskPriority::Trivial,
            TaskPriority::Trivial => TaskPriority::Critical,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Recurrence config, stored as JSON alongside the task.
///
/// `days_of_week` uses 0 = Sunday through 6 = Saturday and only applies to
/// weekly patterns. `count` is the remaining-occurrence budget: each spawned
/// occurrence carries `count - 1`, and 0 stops the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    pub pattern: RecurrencePattern,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default)]
    pub days_of_week: Vec<u32>,
    #[serde(default)]
    pub day_of_month: Option<u32>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub count: Option<u32>,
}

fn default_interval() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// User ids. Empty means unassigned.
    #[serde(default)]
    pub assigned_to: Vec<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// "HH:MM", display-only.
    #[serde(default)]
    pub due_time: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub related_account_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Position in the linearized board ordering.
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    /// Derived from the recurrence config on completion.
    #[serde(default)]
    pub next_recurrence_date: Option<NaiveDate>,
    #[serde(default)]
    pub blocked_by_task_id: Option<String>,
    #[serde(default)]
    pub sequence_enrollment_id: Option<String>,
    #[serde(default)]
    pub sequence_step_number: Option<u32>,
    #[serde(default)]
    pub completed_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: None,
            assigned_to: Vec::new(),
            due_date: None,
            due_time: None,
            priority: TaskPriority::default(),
            status: TaskStatus::default(),
            category: None,
            related_account_id: None,
            labels: Vec::new(),
            order: 0,
            is_recurring: false,
            recurrence: None,
            next_recurrence_date: None,
            blocked_by_task_id: None,
            sequence_enrollment_id: None,
            sequence_step_number: None,
            completed_date: None,
            created_at: now,
            updated_at: now,
        }
    }
}
