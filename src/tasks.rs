//! Task status transitions, priority cycling, and the global re-linearize
//! pass that keeps `order` consistent across the whole task set.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::domain::{Recurrence, Task, TaskStatus};
use crate::recurrence::compute_next_recurrence_date;
use crate::reconcile::due::bucket_for;
use crate::store::{CrmStore, NotificationStore, TaskStore};

/// What a status transition did, beyond the task row itself.
#[derive(Debug, Default)]
pub struct StatusChange {
    pub task: Option<Task>,
    pub unblocked: Vec<String>,
    pub spawned: Option<Task>,
}

pub struct TaskLifecycle {
    store: Arc<dyn CrmStore>,
}

impl TaskLifecycle {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    /// Move a task to `new_status`. A blocked task may not complete until its
    /// blocker does. Completion marks the task's due-date notifications read,
    /// unblocks dependents, and spawns the next occurrence of a recurring
    /// task. Moving away from completed clears `completed_date` and puts the
    /// task's due-date notifications back.
    pub async fn change_status(
        &self,
        task_id: &str,
        new_status: TaskStatus,
        acting_user: Option<&str>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<StatusChange> {
        let Some(mut task) = self.store.get_task(task_id).await? else {
            anyhow::bail!("task not found: {task_id}");
        };

        if task.status == new_status {
            return Ok(StatusChange {
                task: Some(task),
                ..Default::default()
            });
        }
        if new_status == TaskStatus::Completed && task.status == TaskStatus::Blocked {
            anyhow::bail!(
                "task '{}' is blocked and cannot be completed until its blocker is done",
                task.title
            );
        }

        let was_completed = task.status == TaskStatus::Completed;
        task.status = new_status;
        task.updated_at = now;

        let mut change = StatusChange::default();

        if new_status == TaskStatus::Completed {
            task.completed_date = Some(now);
            self.store.update_task(&task).await?;

            let cleared = self
                .store
                .mark_task_due_notifications_read(&task.id, None)
                .await?;
            if cleared > 0 {
                info!(task_id = %task.id, cleared, "cleared due-date notifications");
            }

            change.unblocked = self.unblock_dependents(&task.id, now).await?;
            change.spawned = self.spawn_next_occurrence(&task, now).await?;
        } else {
            if was_completed {
                task.completed_date = None;
            }
            self.store.update_task(&task).await?;
            if was_completed {
                self.restore_due_notifications(&task, acting_user).await?;
            }
        }

        info!(task_id = %task.id, status = %task.status.as_str(), "task status changed");
        change.task = Some(task);
        Ok(change)
    }

    /// Flip every blocked task waiting on `task_id` back to todo. The chain
    /// is linear in practice, but the fan-out stays correct if several tasks
    /// share a blocker. The back-reference is kept for history.
    async fn unblock_dependents(
        &self,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<String>> {
        let mut unblocked = Vec::new();
        for mut dependent in self.store.get_tasks_blocked_by(task_id).await? {
            if dependent.status != TaskStatus::Blocked {
                continue;
            }
            dependent.status = TaskStatus::Todo;
            dependent.updated_at = now;
            if self.store.update_task(&dependent).await? {
                info!(task_id = %dependent.id, blocker = %task_id, "unblocked task");
                unblocked.push(dependent.id);
            }
        }
        Ok(unblocked)
    }

    /// Create the next occurrence of a recurring task that just completed.
    /// `count` is the remaining spawn budget; None means unbounded.
    async fn spawn_next_occurrence(
        &self,
        task: &Task,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Task>> {
        if !task.is_recurring {
            return Ok(None);
        }
        let Some(recurrence) = &task.recurrence else {
            return Ok(None);
        };
        if recurrence.count == Some(0) {
            info!(task_id = %task.id, "recurrence budget exhausted");
            return Ok(None);
        }

        let today = now.date_naive();
        let Some(next_due) = compute_next_recurrence_date(task, today) else {
            info!(task_id = %task.id, "recurrence ended");
            return Ok(None);
        };

        let mut next = Task::new(&task.title);
        next.description = task.description.clone();
        next.assigned_to = task.assigned_to.clone();
        next.due_date = Some(next_due);
        next.due_time = task.due_time.clone();
        next.priority = task.priority;
        next.category = task.category.clone();
        next.related_account_id = task.related_account_id.clone();
        next.labels = task.labels.clone();
        next.order = task.order;
        next.is_recurring = true;
        next.recurrence = Some(Recurrence {
            count: recurrence.count.map(|c| c.saturating_sub(1)),
            ..recurrence.clone()
        });
        next.next_recurrence_date = compute_next_recurrence_date(&next, today);
        next.created_at = now;
        next.updated_at = now;

        self.store.create_task(&next).await?;
        info!(
            task_id = %task.id,
            next_task_id = %next.id,
            due = %next_due,
            "spawned next recurring occurrence"
        );
        Ok(Some(next))
    }

    /// Undo path: the task is open again, so its due-date notifications come
    /// back. Recipients are the assignees, falling back to the acting user
    /// for unassigned tasks.
    async fn restore_due_notifications(
        &self,
        task: &Task,
        acting_user: Option<&str>,
    ) -> anyhow::Result<()> {
        let Some(due) = task.due_date else {
            return Ok(());
        };
        let Some(bucket) = bucket_for(due, Utc::now().date_naive()) else {
            return Ok(());
        };

        let recipients: Vec<String> = if task.assigned_to.is_empty() {
            acting_user.map(str::to_string).into_iter().collect()
        } else {
            task.assigned_to.clone()
        };
        for user_id in &recipients {
            let notification = bucket.notification(user_id, task);
            if self.store.create_notification(&notification).await? {
                info!(task_id = %task.id, user_id = %user_id, "restored due-date notification");
            }
        }
        Ok(())
    }

    /// Advance the task one step in the fixed priority cycle, then recompute
    /// the global order.
    pub async fn cycle_priority(
        &self,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Task> {
        let Some(mut task) = self.store.get_task(task_id).await? else {
            anyhow::bail!("task not found: {task_id}");
        };

        task.priority = task.priority.next_in_cycle();
        task.updated_at = now;
        self.store.update_task(&task).await?;
        info!(task_id = %task.id, priority = %task.priority, "cycled task priority");

        self.relinearize().await?;

        let refreshed = self.store.get_task(task_id).await?.unwrap_or(task);
        Ok(refreshed)
    }

    /// Recompute `order` across all tasks and batch-apply the rows that
    /// moved. Returns how many rows changed.
    pub async fn relinearize(&self) -> anyhow::Result<usize> {
        let tasks = self.store.get_all_tasks().await?;
        let changes = linearize(&tasks);
        if !changes.is_empty() {
            self.store.apply_order_changes(&changes).await?;
            info!(changed = changes.len(), "re-linearized task order");
        }
        Ok(changes.len())
    }
}

/// Compute the canonical total order: priority first (critical at the top),
/// then due date ascending with undated tasks last, id as the final tiebreak.
/// Returns only the `(id, order)` pairs that differ from what is stored.
pub fn linearize(tasks: &[Task]) -> Vec<(String, i64)> {
    let mut ordered: Vec<&Task> = tasks.iter().collect();
    ordered.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then_with(|| match (a.due_date, b.due_date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| a.id.cmp(&b.id))
    });

    ordered
        .iter()
        .enumerate()
        .filter(|(position, task)| task.order != *position as i64)
        .map(|(position, task)| (task.id.clone(), position as i64))
        .collect()
}
