//! Neglected-account sweep.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::domain::{Account, Notification, NotificationKind, User};
use crate::store::{AccountStore, NotificationStore, Page};

use super::diff::{reconcile, DiffPolicy, StaleAction};
use super::{Reconciler, SweepOutcome};

/// Interaction gap, in days, after which a segment A or B account counts
/// as neglected.
const KEY_SEGMENT_GAP_DAYS: i64 = 30;
/// Gap for every other segment. A missing segment is treated as C.
const DEFAULT_GAP_DAYS: i64 = 90;

const POLICY: DiffPolicy = DiffPolicy {
    resurrect: false,
    stale: StaleAction::Delete,
};

fn neglect_threshold(segment: Option<&str>) -> i64 {
    match segment.unwrap_or("C").trim().to_ascii_uppercase().as_str() {
        "A" | "B" => KEY_SEGMENT_GAP_DAYS,
        _ => DEFAULT_GAP_DAYS,
    }
}

/// Days since the account was last touched. Accounts with no recorded
/// interaction are measured from their creation date.
fn neglect_gap_days(account: &Account, today: NaiveDate) -> i64 {
    let anchor = account
        .last_interaction_date
        .unwrap_or_else(|| account.created_at.date_naive());
    (today - anchor).num_days()
}

/// Account-level neglect predicate. The kind-level snooze table is checked
/// separately, in the sweep.
fn is_neglected(account: &Account, today: NaiveDate) -> bool {
    if account
        .icp_status
        .as_deref()
        .is_some_and(|s| s.trim().eq_ignore_ascii_case("na"))
    {
        return false;
    }
    if account.snoozed_until.is_some_and(|until| until >= today) {
        return false;
    }
    neglect_gap_days(account, today) > neglect_threshold(account.segment.as_deref())
}

fn neglect_notification(
    user: &User,
    account: &Account,
    gap: i64,
    now: DateTime<Utc>,
) -> Notification {
    Notification {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        kind: NotificationKind::NeglectedAccount,
        title: "Account needs attention".to_string(),
        message: format!("No interaction with '{}' in {} days", account.name, gap),
        related_task_id: None,
        related_account_id: Some(account.id.clone()),
        is_read: false,
        scheduled_for: None,
        created_at: now,
    }
}

impl Reconciler {
    /// Reconcile neglected-account notifications. An account is neglected
    /// when its interaction gap exceeds the segment threshold and nothing
    /// suppresses it; accounts that stop being neglected have their unread
    /// rows removed.
    pub async fn sweep_neglected(&self, now: DateTime<Utc>) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        if let Err(e) = self.sweep_neglected_inner(now, &mut outcome).await {
            outcome.errors += 1;
            warn!("neglect sweep could not load state: {e:#}");
        }
        info!(
            created = outcome.created,
            deleted = outcome.deleted,
            skipped = outcome.skipped,
            errors = outcome.errors,
            "neglect sweep done"
        );
        outcome
    }

    async fn sweep_neglected_inner(
        &self,
        now: DateTime<Utc>,
        outcome: &mut SweepOutcome,
    ) -> anyhow::Result<()> {
        let today = now.date_naive();
        let accounts = self.store.get_non_archived_accounts().await?;
        let users = self.store.list_users(Page::default()).await?;
        let actual = self
            .store
            .get_notifications_by_kind(NotificationKind::NeglectedAccount)
            .await?;

        let mut desired = Vec::new();
        for account in &accounts {
            if !is_neglected(account, today) {
                continue;
            }
            match self
                .store
                .is_snoozed(NotificationKind::NeglectedAccount, Some(&account.id), now)
                .await
            {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    outcome.errors += 1;
                    warn!(account_id = %account.id, "snooze check failed: {e:#}");
                    continue;
                }
            }
            let gap = neglect_gap_days(account, today);
            for user in &users {
                desired.push(neglect_notification(user, account, gap, now));
            }
        }

        let mut plan = reconcile(desired, &actual, POLICY);
        let mut create = Vec::new();
        for proto in plan.create {
            let Some(account_id) = proto.related_account_id.clone() else { continue };
            match self
                .store
                .has_notification_on_day(
                    &proto.user_id,
                    NotificationKind::NeglectedAccount,
                    &account_id,
                    today,
                )
                .await
            {
                Ok(false) => create.push(proto),
                Ok(true) => outcome.skipped += 1,
                Err(e) => {
                    outcome.errors += 1;
                    warn!(account_id = %account_id, "neglect dedup check failed: {e:#}");
                }
            }
        }
        plan.create = create;
        self.apply_plan(plan, outcome).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::domain::NotificationSnooze;
    use crate::store::NotificationFilter;
    use crate::testing::{at_noon, day, seed_account, seed_user, setup_store};

    #[test]
    fn test_threshold_by_segment() {
        assert_eq!(neglect_threshold(Some("A")), 30);
        assert_eq!(neglect_threshold(Some(" b ")), 30);
        assert_eq!(neglect_threshold(Some("C")), 90);
        assert_eq!(neglect_threshold(Some("D")), 90);
        assert_eq!(neglect_threshold(Some("unknown")), 90);
        assert_eq!(neglect_threshold(None), 90);
    }

    #[test]
    fn test_key_segment_gap_boundary() {
        let today = day(2026, 3, 2);
        let mut account = Account::new("Globex");
        account.segment = Some("A".to_string());

        account.last_interaction_date = Some(today - Duration::days(30));
        assert!(!is_neglected(&account, today), "30 days is still fine");
        account.last_interaction_date = Some(today - Duration::days(31));
        assert!(is_neglected(&account, today));

        account.segment = Some("D".to_string());
        assert!(!is_neglected(&account, today), "other segments get 90 days");
        account.last_interaction_date = Some(today - Duration::days(91));
        assert!(is_neglected(&account, today));
    }

    #[test]
    fn test_icp_na_and_account_snooze_suppress() {
        let today = day(2026, 3, 2);
        let mut account = Account::new("Globex");
        account.segment = Some("A".to_string());
        account.last_interaction_date = Some(day(2025, 1, 1));
        assert!(is_neglected(&account, today));

        account.icp_status = Some("NA".to_string());
        assert!(!is_neglected(&account, today));
        account.icp_status = Some("qualified".to_string());
        assert!(is_neglected(&account, today));

        account.snoozed_until = Some(today);
        assert!(!is_neglected(&account, today), "snoozed through today");
        account.snoozed_until = Some(day(2026, 3, 1));
        assert!(is_neglected(&account, today), "snooze expired yesterday");
    }

    #[test]
    fn test_untouched_account_measured_from_creation() {
        let today = day(2026, 3, 2);
        let mut account = Account::new("Globex");
        account.created_at = at_noon(day(2025, 10, 1));
        assert!(is_neglected(&account, today));

        account.created_at = at_noon(day(2026, 2, 1));
        assert!(!is_neglected(&account, today));
    }

    #[tokio::test]
    async fn test_key_segments_notify_sooner() {
        let h = setup_store().await;
        let store = h.crm();
        let reconciler = Reconciler::new(store.clone());
        seed_user(store.as_ref(), "ana@example.test").await;
        let now = at_noon(day(2026, 3, 2));
        let stale_date = day(2026, 1, 30);

        let key = seed_account(store.as_ref(), "Globex", |a| {
            a.segment = Some("A".to_string());
            a.last_interaction_date = Some(stale_date);
        })
        .await;
        seed_account(store.as_ref(), "Initech", |a| {
            a.segment = Some("D".to_string());
            a.last_interaction_date = Some(stale_date);
        })
        .await;

        let outcome = reconciler.sweep_neglected(now).await;
        assert_eq!(outcome.created, 1, "only the segment A account fires at 31 days");

        let rows = store
            .list_notifications(&NotificationFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].related_account_id.as_deref(), Some(key.id.as_str()));
        assert!(rows[0].message.contains("31 days"));
    }

    #[tokio::test]
    async fn test_kind_snooze_suppresses_and_deletes_stale_rows() {
        let h = setup_store().await;
        let store = h.crm();
        let reconciler = Reconciler::new(store.clone());
        seed_user(store.as_ref(), "ana@example.test").await;
        let now = at_noon(day(2026, 3, 2));

        let account = seed_account(store.as_ref(), "Globex", |a| {
            a.segment = Some("A".to_string());
            a.last_interaction_date = Some(day(2025, 12, 1));
        })
        .await;

        let first = reconciler.sweep_neglected(now).await;
        assert_eq!(first.created, 1);

        // A global snooze for the kind covers every account.
        let snooze = NotificationSnooze::new(
            NotificationKind::NeglectedAccount,
            None,
            at_noon(day(2026, 4, 1)),
            "ana",
        );
        store.create_snooze(&snooze).await.unwrap();

        let second = reconciler.sweep_neglected(now).await;
        assert_eq!(second.deleted, 1, "suppressed accounts lose their unread rows");

        let unread = store
            .list_notifications(
                &NotificationFilter {
                    related_account_id: Some(account.id.clone()),
                    is_read: Some(false),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert!(unread.is_empty());
    }

    #[tokio::test]
    async fn test_dismissed_row_returns_next_day() {
        let h = setup_store().await;
        let store = h.crm();
        let reconciler = Reconciler::new(store.clone());
        seed_user(store.as_ref(), "ana@example.test").await;
        let now = at_noon(day(2026, 3, 2));

        seed_account(store.as_ref(), "Globex", |a| {
            a.segment = Some("A".to_string());
            a.last_interaction_date = Some(day(2025, 12, 1));
        })
        .await;

        reconciler.sweep_neglected(now).await;
        let rows = store
            .list_notifications(&NotificationFilter::default(), Page::default())
            .await
            .unwrap();
        store.mark_notification_read(&rows[0].id).await.unwrap();

        let same_day = reconciler.sweep_neglected(now).await;
        assert_eq!(same_day.created, 0);
        assert_eq!(same_day.skipped, 1);

        let next_day = reconciler.sweep_neglected(at_noon(day(2026, 3, 3))).await;
        assert_eq!(next_day.created, 1);
    }

    #[tokio::test]
    async fn test_interaction_clears_the_row() {
        let h = setup_store().await;
        let store = h.crm();
        let reconciler = Reconciler::new(store.clone());
        seed_user(store.as_ref(), "ana@example.test").await;
        let now = at_noon(day(2026, 3, 2));

        let mut account = seed_account(store.as_ref(), "Globex", |a| {
            a.segment = Some("A".to_string());
            a.last_interaction_date = Some(day(2025, 12, 1));
        })
        .await;

        reconciler.sweep_neglected(now).await;

        account.last_interaction_date = Some(day(2026, 3, 1));
        store.update_account(&account).await.unwrap();
        let outcome = reconciler.sweep_neglected(now).await;
        assert_eq!(outcome.deleted, 1);
    }
}
