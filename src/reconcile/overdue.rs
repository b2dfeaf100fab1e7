//! Overdue-task sweep.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::domain::{Notification, NotificationKind, Task, User};
use crate::store::{AccountStore, NotificationStore, Page, TaskStore};

use super::diff::{reconcile, DiffPolicy, StaleAction};
use super::due::DueBucket;
use super::{resolve_recipients, Reconciler, SweepOutcome};

/// Dismissed rows come back while the task stays overdue; rows for tasks
/// that stopped being overdue are kept as read history.
const POLICY: DiffPolicy = DiffPolicy {
    resurrect: true,
    stale: StaleAction::MarkRead,
};

impl Reconciler {
    /// Reconcile overdue notifications against the task table.
    ///
    /// Desired: one unread row per recipient per open task whose due date is
    /// in the past. Recipients are the task's assignees, or every user when
    /// nobody is assigned.
    pub async fn sweep_overdue(&self, today: NaiveDate) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        if let Err(e) = self.sweep_overdue_inner(today, &mut outcome).await {
            outcome.errors += 1;
            warn!("overdue sweep could not load state: {e:#}");
        }
        info!(
            created = outcome.created,
            resurrected = outcome.resurrected,
            marked_read = outcome.marked_read,
            skipped = outcome.skipped,
            errors = outcome.errors,
            "overdue sweep done"
        );
        outcome
    }

    async fn sweep_overdue_inner(
        &self,
        today: NaiveDate,
        outcome: &mut SweepOutcome,
    ) -> anyhow::Result<()> {
        let tasks = self.store.get_open_tasks_with_due_dates().await?;
        let users = self.store.list_users(Page::default()).await?;
        let actual = self
            .store
            .get_notifications_by_kind(NotificationKind::TaskOverdue)
            .await?;

        let plan = reconcile(desired_overdue(&tasks, &users, today), &actual, POLICY);
        self.apply_plan(plan, outcome).await;
        Ok(())
    }
}

fn desired_overdue(tasks: &[Task], users: &[User], today: NaiveDate) -> Vec<Notification> {
    let mut desired = Vec::new();
    for task in tasks {
        let Some(due) = task.due_date else { continue };
        if due >= today {
            continue;
        }
        let recipients = if task.assigned_to.is_empty() {
            users.iter().map(|u| u.id.clone()).collect()
        } else {
            resolve_recipients(&task.assigned_to, users)
        };
        for user_id in recipients {
            desired.push(DueBucket::Overdue.notification(&user_id, task));
        }
    }
    desired
}
