//! In-app notifications plus the composite identity used for dedup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskAssigned,
    TaskOverdue,
    TaskDueToday,
    TaskReminder,
    RenewalReminder,
    NeglectedAccount,
    EndOfYearAnalysis,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TaskAssigned => "task_assigned",
            NotificationKind::TaskOverdue => "task_overdue",
            NotificationKind::TaskDueToday => "task_due_today",
            NotificationKind::TaskReminder => "task_reminder",
            NotificationKind::RenewalReminder => "renewal_reminder",
            NotificationKind::NeglectedAccount => "neglected_account",
            NotificationKind::EndOfYearAnalysis => "end_of_year_analysis",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "task_assigned" => Some(NotificationKind::TaskAssigned),
            "task_overdue" => Some(NotificationKind::TaskOverdue),
            "task_due_today" => Some(NotificationKind::TaskDueToday),
            "task_reminder" => Some(NotificationKind::TaskReminder),
            "renewal_reminder" => Some(NotificationKind::RenewalReminder),
            "neglected_account" => Some(NotificationKind::NeglectedAccount),
            "end_of_year_analysis" => Some(NotificationKind::EndOfYearAnalysis),
            _ => None,
        }
    }

    /// Kinds that hang off a task's due date and get superseded together.
    pub fn is_due_date_kind(&self) -> bool {
        matches!(
            self,
            NotificationKind::TaskOverdue
                | NotificationKind::TaskDueToday
                | NotificationKind::TaskReminder
        )
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a notification points at. A notification references a task or an
/// account, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NotificationTarget {
    Task(String),
    Account(String),
}

/// Dedup identity of a notification: one unread row per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationKey {
    pub user_id: String,
    pub kind: NotificationKind,
    pub target: NotificationTarget,
}

impl NotificationKey {
    pub fn task(user_id: &str, kind: NotificationKind, task_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind,
            target: NotificationTarget::Task(task_id.to_string()),
        }
    }

    pub fn account(user_id: &str, kind: NotificationKind, account_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind,
            target: NotificationTarget::Account(account_id.to_string()),
        }
    }
}

impl PartialOrd for NotificationKind {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NotificationKind {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub related_task_id: Option<String>,
    #[serde(default)]
    pub related_account_id: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn for_task(
        user_id: &str,
        kind: NotificationKind,
        title: &str,
        message: &str,
        task_id: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind,
            title: title.to_string(),
            message: message.to_string(),
            related_task_id: Some(task_id.to_string()),
            related_account_id: None,
            is_read: false,
            scheduled_for: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_account(
        user_id: &str,
        kind: NotificationKind,
        title: &str,
        message: &str,
        account_id: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind,
            title: title.to_string(),
            message: message.to_string(),
            related_task_id: None,
            related_account_id: Some(account_id.to_string()),
            is_read: false,
            scheduled_for: None,
            created_at: Utc::now(),
        }
    }

    /// The dedup key this row answers to, when it references anything.
    pub fn key(&self) -> Option<NotificationKey> {
        if let Some(task_id) = &self.related_task_id {
            return Some(NotificationKey::task(&self.user_id, self.kind, task_id));
        }
        if let Some(account_id) = &self.related_account_id {
            return Some(NotificationKey::account(&self.user_id, self.kind, account_id));
        }
        None
    }
}

/// Suppression window for a notification kind, optionally scoped to one
/// account. Global: applies to every user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSnooze {
    pub id: String,
    pub kind: NotificationKind,
    #[serde(default)]
    pub related_account_id: Option<String>,
    pub snoozed_until: DateTime<Utc>,
    pub snoozed_by: String,
    pub created_at: DateTime<Utc>,
}

impl NotificationSnooze {
    pub fn new(
        kind: NotificationKind,
        related_account_id: Option<&str>,
        snoozed_until: DateTime<Utc>,
        snoozed_by: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            related_account_id: related_account_id.map(|s| s.to_string()),
            snoozed_until,
            snoozed_by: snoozed_by.to_string(),
            created_at: Utc::now(),
        }
    }
}
