//! Notification reconciliation. Every sweep recomputes desired state from
//! scratch, diffs it against what is persisted, and applies the difference.
//! Per-item failures are logged and counted, never fatal; the next sweep
//! picks up whatever a crash left behind.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::User;
use crate::store::{CrmStore, NotificationStore};

pub mod diff;
pub mod due;
mod neglected;
mod overdue;
mod renewals;
mod year_end;

use diff::ReconcilePlan;

/// Aggregate counts for one sweep (or several merged).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SweepOutcome {
    pub created: usize,
    pub resurrected: usize,
    pub marked_read: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl SweepOutcome {
    pub fn absorb(&mut self, other: SweepOutcome) {
        self.created += other.created;
        self.resurrected += other.resurrected;
        self.marked_read += other.marked_read;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

pub struct Reconciler {
    store: Arc<dyn CrmStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    /// Run every sweep once. This is the heartbeat entry point.
    pub async fn run_sweeps(&self, now: DateTime<Utc>) -> SweepOutcome {
        let mut total = self.sweep_overdue(now.date_naive()).await;
        total.absorb(self.sweep_renewals(now).await);
        total.absorb(self.sweep_neglected(now).await);
        total.absorb(self.sweep_year_end(now).await);
        info!(
            created = total.created,
            resurrected = total.resurrected,
            marked_read = total.marked_read,
            deleted = total.deleted,
            skipped = total.skipped,
            errors = total.errors,
            "notification sweeps finished"
        );
        total
    }

    /// Apply a computed plan. Unique-violation rejections on create count as
    /// skipped; anything else is logged and counted, and the loop continues.
    pub(crate) async fn apply_plan(&self, plan: ReconcilePlan, outcome: &mut SweepOutcome) {
        for notification in plan.create {
            match self.store.create_notification(&notification).await {
                Ok(true) => outcome.created += 1,
                Ok(false) => outcome.skipped += 1,
                Err(e) => {
                    outcome.errors += 1;
                    warn!(
                        user_id = %notification.user_id,
                        kind = %notification.kind,
                        "failed to create notification: {e:#}"
                    );
                }
            }
        }
        for id in plan.resurrect {
            match self.store.mark_notification_unread(&id).await {
                Ok(_) => outcome.resurrected += 1,
                Err(e) => {
                    outcome.errors += 1;
                    warn!(notification_id = %id, "failed to resurrect notification: {e:#}");
                }
            }
        }
        for id in plan.mark_read {
            match self.store.mark_notification_read(&id).await {
                Ok(_) => outcome.marked_read += 1,
                Err(e) => {
                    outcome.errors += 1;
                    warn!(notification_id = %id, "failed to mark notification read: {e:#}");
                }
            }
        }
        for id in plan.delete {
            match self.store.delete_notification(&id).await {
                Ok(_) => outcome.deleted += 1,
                Err(e) => {
                    outcome.errors += 1;
                    warn!(notification_id = %id, "failed to delete notification: {e:#}");
                }
            }
        }
    }
}

/// Map assignee identifiers onto user ids. Entries may be ids or emails;
/// anything that matches neither is kept as typed, trimmed. Order-preserving
/// and de-duplicated so notification keys stay stable.
pub(crate) fn resolve_recipients(assigned: &[String], users: &[User]) -> Vec<String> {
    let mut recipients = Vec::new();
    for entry in assigned {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let resolved = users
            .iter()
            .find(|u| u.id == entry || u.email.eq_ignore_ascii_case(entry))
            .map(|u| u.id.clone())
            .unwrap_or_else(|| entry.to_string());
        if !recipients.contains(&resolved) {
            recipients.push(resolved);
        }
    }
    recipients
}
