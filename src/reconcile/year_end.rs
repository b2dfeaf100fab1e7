//! Year-end analysis prompt, fired once per user on December 15th.

use chrono::{DateTime, Datelike, Utc};
use tracing::{info, warn};

use crate::domain::{Notification, NotificationKind};
use crate::store::{AccountStore, NotificationStore, Page};

use super::{Reconciler, SweepOutcome};

const FIRE_MONTH: u32 = 12;
const FIRE_DAY: u32 = 15;

/// Not tied to any task or account, so the year dedup is the only guard.
fn year_end_notification(user_id: &str, year: i32, now: DateTime<Utc>) -> Notification {
    Notification {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        kind: NotificationKind::EndOfYearAnalysis,
        title: "Year-end account analysis".to_string(),
        message: format!("Time to review account health and renewals before {year} closes out"),
        related_task_id: None,
        related_account_id: None,
        is_read: false,
        scheduled_for: None,
        created_at: now,
    }
}

impl Reconciler {
    /// Prompt every user for the year-end review. Quiet except on December
    /// 15th, and at most one row per user per calendar year.
    pub async fn sweep_year_end(&self, now: DateTime<Utc>) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        let today = now.date_naive();
        if today.month() != FIRE_MONTH || today.day() != FIRE_DAY {
            return outcome;
        }
        if let Err(e) = self.sweep_year_end_inner(now, &mut outcome).await {
            outcome.errors += 1;
            warn!("year-end sweep could not load state: {e:#}");
        }
        info!(
            created = outcome.created,
            skipped = outcome.skipped,
            errors = outcome.errors,
            "year-end sweep done"
        );
        outcome
    }

    async fn sweep_year_end_inner(
        &self,
        now: DateTime<Utc>,
        outcome: &mut SweepOutcome,
    ) -> anyhow::Result<()> {
        let year = now.date_naive().year();
        let users = self.store.list_users(Page::default()).await?;
        for user in &users {
            let sent = match self
                .store
                .has_notification_in_year(&user.id, NotificationKind::EndOfYearAnalysis, year)
                .await
            {
                Ok(sent) => sent,
                Err(e) => {
                    outcome.errors += 1;
                    warn!(user_id = %user.id, "year dedup check failed: {e:#}");
                    continue;
                }
            };
            if sent {
                outcome.skipped += 1;
                continue;
            }
            let notification = year_end_notification(&user.id, year, now);
            match self.store.create_notification(&notification).await {
                Ok(true) => outcome.created += 1,
                Ok(false) => outcome.skipped += 1,
                Err(e) => {
                    outcome.errors += 1;
                    warn!(user_id = %user.id, "failed to create year-end notification: {e:#}");
                }
            }
        }
        Ok(())
    }
}
