//! Due-date buckets and the per-task notification sync that runs when a
//! task is created or edited.

use chrono::NaiveDate;
use tracing::warn;

use crate::domain::{Notification, NotificationKind, Task, TaskStatus};
use crate::store::{AccountStore, NotificationStore, Page};

use super::{resolve_recipients, Reconciler, SweepOutcome};

/// How close a due date is, in notification terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueBucket {
    Overdue,
    DueToday,
    DueTomorrow,
    /// Due in 2..=7 days.
    DueThisWeek(i64),
}

/// Which bucket a due date falls in, seen from `today`. `None` once the due
/// date is more than a week out.
pub fn bucket_for(due: NaiveDate, today: NaiveDate) -> Option<DueBucket> {
    let days = (due - today).num_days();
    if days < 0 {
        return Some(DueBucket::Overdue);
    }
    match days {
        0 => Some(DueBucket::DueToday),
        1 => Some(DueBucket::DueTomorrow),
        2..=7 => Some(DueBucket::DueThisWeek(days)),
        _ => None,
    }
}

impl DueBucket {
    pub fn kind(&self) -> NotificationKind {
        match self {
            DueBucket::Overdue => NotificationKind::TaskOverdue,
            DueBucket::DueToday => NotificationKind::TaskDueToday,
            DueBucket::DueTomorrow | DueBucket::DueThisWeek(_) => NotificationKind::TaskReminder,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            DueBucket::Overdue => "Task overdue",
            DueBucket::DueToday => "Task due today",
            DueBucket::DueTomorrow => "Task due tomorrow",
            DueBucket::DueThisWeek(_) => "Task due soon",
        }
    }

    fn message(&self, task: &Task) -> String {
        match self {
            DueBucket::Overdue => format!("'{}' is past its due date", task.title),
            DueBucket::DueToday => format!("'{}' is due today", task.title),
            DueBucket::DueTomorrow => format!("'{}' is due tomorrow", task.title),
            DueBucket::DueThisWeek(days) => format!("'{}' is due in {days} days", task.title),
        }
    }

    /// Build the unread row this bucket produces for one recipient.
    pub fn notification(&self, user_id: &str, task: &Task) -> Notification {
        Notification::for_task(user_id, self.kind(), self.title(), &self.message(task), &task.id)
    }
}

impl Reconciler {
    /// Refresh one task's due-date notifications after a create or edit.
    ///
    /// Prior due-today and reminder rows for the task are marked read before
    /// the current bucket fires; overdue and assignment rows stand until the
    /// overdue sweep rules on them. No-op for completed tasks and tasks
    /// without a due date.
    pub async fn sync_task_notifications(
        &self,
        task: &Task,
        acting_user: Option<&str>,
        today: NaiveDate,
    ) -> anyhow::Result<SweepOutcome> {
        let mut outcome = SweepOutcome::default();
        if task.status == TaskStatus::Completed {
            return Ok(outcome);
        }
        let Some(due) = task.due_date else {
            return Ok(outcome);
        };

        let superseded = self
            .store
            .mark_task_due_notifications_read(&task.id, Some(NotificationKind::TaskOverdue))
            .await?;
        outcome.marked_read += superseded as usize;

        let Some(bucket) = bucket_for(due, today) else {
            return Ok(outcome);
        };

        let raw: Vec<String> = if task.assigned_to.is_empty() {
            acting_user.map(str::to_string).into_iter().collect()
        } else {
            task.assigned_to.clone()
        };
        if raw.is_empty() {
            return Ok(outcome);
        }
        let users = self.store.list_users(Page::default()).await?;
        for user_id in resolve_recipients(&raw, &users) {
            let notification = bucket.notification(&user_id, task);
            match self.store.create_notification(&notification).await {
                Ok(true) => outcome.created += 1,
                Ok(false) => outcome.skipped += 1,
                Err(e) => {
                    outcome.errors += 1;
                    warn!(
                        task_id = %task.id,
                        user_id = %user_id,
                        "failed to create due-date notification: {e:#}"
                    );
                }
            }
        }
        Ok(outcome)
    }
}
