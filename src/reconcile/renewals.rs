//! Renewal-risk sweep: derive each account's renewal date from its won
//! estimates, mirror the derived risk onto the account row, and reconcile
//! the renewal reminders.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::domain::{Account, AccountStatus, Estimate, Notification, NotificationKind};
use crate::store::{AccountStore, NotificationStore, Page};

use super::diff::{reconcile, DiffPolicy, StaleAction};
use super::{Reconciler, SweepOutcome};

/// Days ahead of a renewal date during which an account counts as at risk.
/// A renewal already in the past keeps the account at risk.
pub const RENEWAL_RISK_WINDOW_DAYS: i64 = 180;

const STATUS_WRITE_ATTEMPTS: u32 = 3;

/// Reminders are day-deduplicated rather than resurrected, and rows for
/// accounts that left the risk window are removed.
const POLICY: DiffPolicy = DiffPolicy {
    resurrect: false,
    stale: StaleAction::Delete,
};

pub fn is_at_risk(renewal: NaiveDate, today: NaiveDate) -> bool {
    (renewal - today).num_days() <= RENEWAL_RISK_WINDOW_DAYS
}

/// Latest contract end date per account. Earlier contracts are superseded
/// by the most recent renewal.
fn latest_renewal_dates(estimates: &[Estimate]) -> BTreeMap<String, NaiveDate> {
    let mut dates: BTreeMap<String, NaiveDate> = BTreeMap::new();
    for estimate in estimates {
        let Some(end) = estimate.contract_end_date else { continue };
        dates
            .entry(estimate.account_id.clone())
            .and_modify(|d| *d = (*d).max(end))
            .or_insert(end);
    }
    dates
}

fn renewal_notification(
    user_id: &str,
    account: &Account,
    renewal: NaiveDate,
    now: DateTime<Utc>,
) -> Notification {
    Notification {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        kind: NotificationKind::RenewalReminder,
        title: "Renewal approaching".to_string(),
        message: format!("'{}' is up for renewal on {}", account.name, renewal),
        related_task_id: None,
        related_account_id: Some(account.id.clone()),
        is_read: false,
        scheduled_for: None,
        created_at: now,
    }
}

impl Reconciler {
    /// Derive renewal risk for every non-archived account, mirror it onto
    /// the persisted status, and reconcile renewal reminders. Snoozes and
    /// the once-per-day rule suppress creation but never touch standing
    /// rows.
    pub async fn sweep_renewals(&self, now: DateTime<Utc>) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        if let Err(e) = self.sweep_renewals_inner(now, &mut outcome).await {
            outcome.errors += 1;
            warn!("renewal sweep could not load state: {e:#}");
        }
        info!(
            created = outcome.created,
            deleted = outcome.deleted,
            skipped = outcome.skipped,
            errors = outcome.errors,
            "renewal sweep done"
        );
        outcome
    }

    async fn sweep_renewals_inner(
        &self,
        now: DateTime<Utc>,
        outcome: &mut SweepOutcome,
    ) -> anyhow::Result<()> {
        let today = now.date_naive();
        let accounts = self.store.get_non_archived_accounts().await?;
        let estimates = self.store.get_won_estimates_with_end_dates().await?;
        let users = self.store.list_users(Page::default()).await?;
        let actual = self
            .store
            .get_notifications_by_kind(NotificationKind::RenewalReminder)
            .await?;

        let renewal_dates = latest_renewal_dates(&estimates);

        let mut desired = Vec::new();
        for account in &accounts {
            let renewal = renewal_dates.get(&account.id).copied();
            let at_risk = renewal.is_some_and(|d| is_at_risk(d, today));
            self.mirror_account_status(account, at_risk, outcome).await;
            let Some(renewal) = renewal.filter(|_| at_risk) else {
                continue;
            };
            for user in &users {
                desired.push(renewal_notification(&user.id, account, renewal, now));
            }
        }

        let mut plan = reconcile(desired, &actual, POLICY);
        let mut create = Vec::new();
        for proto in plan.create {
            let Some(account_id) = proto.related_account_id.clone() else { continue };
            match self
                .renewal_create_allowed(&proto.user_id, &account_id, now)
                .await
            {
                Ok(true) => create.push(proto),
                Ok(false) => outcome.skipped += 1,
                Err(e) => {
                    outcome.errors += 1;
                    warn!(account_id = %account_id, "renewal eligibility check failed: {e:#}");
                }
            }
        }
        plan.create = create;
        self.apply_plan(plan, outcome).await;
        Ok(())
    }

    async fn renewal_create_allowed(
        &self,
        user_id: &str,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        if self
            .store
            .is_snoozed(NotificationKind::RenewalReminder, Some(account_id), now)
            .await?
        {
            return Ok(false);
        }
        let already_today = self
            .store
            .has_notification_on_day(
                user_id,
                NotificationKind::RenewalReminder,
                account_id,
                now.date_naive(),
            )
            .await?;
        Ok(!already_today)
    }

    /// Keep the persisted status in step with the derived risk. Transient
    /// write failures are retried with a doubling delay.
    async fn mirror_account_status(
        &self,
        account: &Account,
        at_risk: bool,
        outcome: &mut SweepOutcome,
    ) {
        let target = if at_risk {
            AccountStatus::AtRisk
        } else {
            AccountStatus::Active
        };
        if account.status == target || account.status == AccountStatus::Archived {
            return;
        }

        let mut delay = Duration::from_millis(50);
        for attempt in 1..=STATUS_WRITE_ATTEMPTS {
            match self.store.set_account_status(&account.id, target).await {
                Ok(_) => {
                    info!(account_id = %account.id, status = %target, "account status mirrored");
                    return;
                }
                Err(e) if attempt < STATUS_WRITE_ATTEMPTS => {
                    warn!(account_id = %account.id, attempt, "status write failed, retrying: {e:#}");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    outcome.errors += 1;
                    warn!(
                        account_id = %account.id,
                        "status write failed after {STATUS_WRITE_ATTEMPTS} attempts: {e:#}"
                    );
                }
            }
        }
    }
}
