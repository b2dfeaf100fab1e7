use super::*;

use std::collections::BTreeMap;

use chrono::Datelike;

use crate::domain::{AnswerType, AnswerValue, ScorecardQuestion, SequenceStep};
use crate::scorecard::score_response;
use crate::store::{
    AccountStore, NotificationStore, ScorecardStore, SequenceStore, TaskStore,
};

async fn setup_test_store() -> (SqliteStore, tempfile::NamedTempFile) {
    let db_file = tempfile::NamedTempFile::new().unwrap();
    let store = SqliteStore::new(db_file.path().to_str().unwrap())
        .await
        .unwrap();
    (store, db_file)
}

fn make_task(title: &str) -> Task {
    Task::new(title)
}

fn make_account(name: &str) -> Account {
    Account::new(name)
}

fn make_overdue(user_id: &str, task_id: &str) -> Notification {
    Notification::for_task(
        user_id,
        NotificationKind::TaskOverdue,
        "Task overdue",
        "This task is past due",
        task_id,
    )
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ==================== Task Tests ====================

#[tokio::test]
async fn test_create_and_get_task_roundtrip() {
    let (store, _db) = setup_test_store().await;

    let mut task = make_task("Call the champion");
    task.description = Some("Ask about the Q3 rollout".to_string());
    task.assigned_to = vec!["user-1".to_string(), "user-2".to_string()];
    task.due_date = Some(day(2026, 3, 15));
    task.due_time = Some("14:30".to_string());
    task.priority = TaskPriority::Major;
    task.category = Some("outreach".to_string());
    task.labels = vec!["q3".to_string(), "expansion".to_string()];
    task.order = 7;

    store.create_task(&task).await.unwrap();

    let fetched = store.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(fetched.title, "Call the champion");
    assert_eq!(fetched.description.as_deref(), Some("Ask about the Q3 rollout"));
    assert_eq!(fetched.assigned_to, vec!["user-1", "user-2"]);
    assert_eq!(fetched.due_date, Some(day(2026, 3, 15)));
    assert_eq!(fetched.due_time.as_deref(), Some("14:30"));
    assert_eq!(fetched.priority, TaskPriority::Major);
    assert_eq!(fetched.status, TaskStatus::Todo);
    assert_eq!(fetched.labels, vec!["q3", "expansion"]);
    assert_eq!(fetched.order, 7);
    assert!(fetched.completed_date.is_none());
}

#[tokio::test]
async fn test_recurrence_survives_storage() {
    let (store, _db) = setup_test_store().await;

    let mut task = make_task("Weekly sync");
    task.is_recurring = true;
    task.recurrence = Some(Recurrence {
        pattern: crate::domain::RecurrencePattern::Weekly,
        interval: 1,
        days_of_week: vec![1, 3],
        day_of_month: None,
        end_date: Some(day(2026, 12, 31)),
        count: None,
    });
    task.next_recurrence_date = Some(day(2026, 3, 2));

    store.create_task(&task).await.unwrap();

    let fetched = store.get_task(&task.id).await.unwrap().unwrap();
    assert!(fetched.is_recurring);
    let rec = fetched.recurrence.unwrap();
    assert_eq!(rec.days_of_week, vec![1, 3]);
    assert_eq!(rec.end_date, Some(day(2026, 12, 31)));
    assert_eq!(fetched.next_recurrence_date, Some(day(2026, 3, 2)));
}

#[tokio::test]
async fn test_update_task_missing_row_returns_false() {
    let (store, _db) = setup_test_store().await;

    let task = make_task("Never created");
    let updated = store.update_task(&task).await.unwrap();
    assert!(!updated);
}

#[tokio::test]
async fn test_upsert_task_overwrites_fields() {
    let (store, _db) = setup_test_store().await;

    let mut task = make_task("Draft proposal");
    store.create_task(&task).await.unwrap();

    task.title = "Draft and send proposal".to_string();
    task.status = TaskStatus::InProgress;
    store.upsert_task(&task).await.unwrap();

    let fetched = store.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(fetched.title, "Draft and send proposal");
    assert_eq!(fetched.status, TaskStatus::InProgress);

    let all = store.get_all_tasks().await.unwrap();
    assert_eq!(all.len(), 1, "Upsert on an existing id must not add a row");
}

#[tokio::test]
async fn test_delete_task() {
    let (store, _db) = setup_test_store().await;

    let task = make_task("Throwaway");
    store.create_task(&task).await.unwrap();

    assert!(store.delete_task(&task.id).await.unwrap());
    assert!(store.get_task(&task.id).await.unwrap().is_none());
    assert!(!store.delete_task(&task.id).await.unwrap());
}

#[tokio::test]
async fn test_list_tasks_filters_by_status_and_assignee() {
    let (store, _db) = setup_test_store().await;

    let mut t1 = make_task("For Alice");
    t1.assigned_to = vec!["alice".to_string(), "bob".to_string()];
    let mut t2 = make_task("For Bob only");
    t2.assigned_to = vec!["bob".to_string()];
    t2.status = TaskStatus::InProgress;
    let mut t3 = make_task("Unassigned");
    t3.status = TaskStatus::InProgress;

    store.create_task(&t1).await.unwrap();
    store.create_task(&t2).await.unwrap();
    store.create_task(&t3).await.unwrap();

    let filter = TaskFilter {
        assigned_to: Some("bob".to_string()),
        ..Default::default()
    };
    let bobs = store.list_tasks(&filter, Page::default()).await.unwrap();
    assert_eq!(bobs.len(), 2);

    let filter = TaskFilter {
        status: Some(TaskStatus::InProgress),
        assigned_to: Some("bob".to_string()),
        ..Default::default()
    };
    let in_progress = store.list_tasks(&filter, Page::default()).await.unwrap();
    assert_eq!(in_progress.len(), 1);
    assert_eq!(in_progress[0].title, "For Bob only");
}

#[tokio::test]
async fn test_assignee_filter_does_not_match_substrings() {
    let (store, _db) = setup_test_store().await;

    let mut task = make_task("Handled by bobby");
    task.assigned_to = vec!["bobby".to_string()];
    store.create_task(&task).await.unwrap();

    let filter = TaskFilter {
        assigned_to: Some("bob".to_string()),
        ..Default::default()
    };
    let hits = store.list_tasks(&filter, Page::default()).await.unwrap();
    assert!(
        hits.is_empty(),
        "'bob' must not match the assignee 'bobby'"
    );
}

#[tokio::test]
async fn test_list_tasks_ordered_by_position() {
    let (store, _db) = setup_test_store().await;

    for (title, order) in [("third", 30), ("first", 10), ("second", 20)] {
        let mut task = make_task(title);
        task.order = order;
        store.create_task(&task).await.unwrap();
    }

    let tasks = store
        .list_tasks(&TaskFilter::default(), Page::default())
        .await
        .unwrap();
    let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_get_tasks_blocked_by() {
    let (store, _db) = setup_test_store().await;

    let gate = make_task("Gate");
    let mut waiting1 = make_task("Waiting A");
    waiting1.status = TaskStatus::Blocked;
    waiting1.blocked_by_task_id = Some(gate.id.clone());
    let mut waiting2 = make_task("Waiting B");
    waiting2.status = TaskStatus::Blocked;
    waiting2.blocked_by_task_id = Some(gate.id.clone());
    let unrelated = make_task("Unrelated");

    store.create_task(&gate).await.unwrap();
    store.create_task(&waiting1).await.unwrap();
    store.create_task(&waiting2).await.unwrap();
    store.create_task(&unrelated).await.unwrap();

    let blocked = store.get_tasks_blocked_by(&gate.id).await.unwrap();
    assert_eq!(blocked.len(), 2);
    assert!(blocked.iter().all(|t| t.blocked_by_task_id.as_deref() == Some(gate.id.as_str())));
}

#[tokio::test]
async fn test_get_open_tasks_with_due_dates_skips_done_and_undated() {
    let (store, _db) = setup_test_store().await;

    let mut due_open = make_task("Open with date");
    due_open.due_date = Some(day(2026, 4, 1));
    let mut due_done = make_task("Completed with date");
    due_done.due_date = Some(day(2026, 4, 2));
    due_done.status = TaskStatus::Completed;
    let undated = make_task("No date");

    store.create_task(&due_open).await.unwrap();
    store.create_task(&due_done).await.unwrap();
    store.create_task(&undated).await.unwrap();

    let open = store.get_open_tasks_with_due_dates().await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].title, "Open with date");
}

#[tokio::test]
async fn test_apply_order_changes_updates_all_rows() {
    let (store, _db) = setup_test_store().await;

    let a = make_task("a");
    let b = make_task("b");
    let c = make_task("c");
    store.create_task(&a).await.unwrap();
    store.create_task(&b).await.unwrap();
    store.create_task(&c).await.unwrap();

    store
        .apply_order_changes(&[(a.id.clone(), 2), (b.id.clone(), 0), (c.id.clone(), 1)])
        .await
        .unwrap();

    assert_eq!(store.get_task(&a.id).await.unwrap().unwrap().order, 2);
    assert_eq!(store.get_task(&b.id).await.unwrap().unwrap().order, 0);
    assert_eq!(store.get_task(&c.id).await.unwrap().unwrap().order, 1);

    // Empty change set is a no-op, not an error.
    store.apply_order_changes(&[]).await.unwrap();
}

// ==================== Account Tests ====================

#[tokio::test]
async fn test_account_roundtrip_and_status_write() {
    let (store, _db) = setup_test_store().await;

    let mut account = make_account("Initech");
    account.segment = Some("A".to_string());
    account.icp_status = Some("fit".to_string());
    account.last_interaction_date = Some(day(2026, 1, 20));
    store.create_account(&account).await.unwrap();

    let fetched = store.get_account(&account.id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "Initech");
    assert_eq!(fetched.segment.as_deref(), Some("A"));
    assert_eq!(fetched.status, AccountStatus::Active);
    assert_eq!(fetched.last_interaction_date, Some(day(2026, 1, 20)));

    assert!(store
        .set_account_status(&account.id, AccountStatus::AtRisk)
        .await
        .unwrap());
    let flagged = store.get_account(&account.id).await.unwrap().unwrap();
    assert_eq!(flagged.status, AccountStatus::AtRisk);
}

#[tokio::test]
async fn test_list_accounts_filters_by_segment() {
    let (store, _db) = setup_test_store().await;

    let mut a1 = make_account("Segment A shop");
    a1.segment = Some("A".to_string());
    let mut a2 = make_account("Segment B shop");
    a2.segment = Some("B".to_string());
    store.create_account(&a1).await.unwrap();
    store.create_account(&a2).await.unwrap();

    let filter = AccountFilter {
        segment: Some("A".to_string()),
        ..Default::default()
    };
    let hits = store.list_accounts(&filter, Page::default()).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "Segment A shop");
}

#[tokio::test]
async fn test_get_non_archived_accounts() {
    let (store, _db) = setup_test_store().await;

    let live = make_account("Live");
    let mut gone = make_account("Gone");
    gone.status = AccountStatus::Archived;
    store.create_account(&live).await.unwrap();
    store.create_account(&gone).await.unwrap();

    let active = store.get_non_archived_accounts().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].name, "Live");
}

#[tokio::test]
async fn test_contact_crud_and_account_filter() {
    let (store, _db) = setup_test_store().await;

    let account = make_account("Hooli");
    store.create_account(&account).await.unwrap();

    let mut contact = Contact::new(&account.id, "Jared");
    contact.last_name = "Dunn".to_string();
    contact.email = Some("jared@hooli.test".to_string());
    store.create_contact(&contact).await.unwrap();

    let other = Contact::new("some-other-account", "Gavin");
    store.create_contact(&other).await.unwrap();

    let filter = ContactFilter {
        account_id: Some(account.id.clone()),
        ..Default::default()
    };
    let contacts = store.list_contacts(&filter, Page::default()).await.unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].first_name, "Jared");

    contact.title = Some("Head of Revenue".to_string());
    assert!(store.update_contact(&contact).await.unwrap());
    let updated = store.get_contact(&contact.id).await.unwrap().unwrap();
    assert_eq!(updated.title.as_deref(), Some("Head of Revenue"));

    assert!(store.delete_contact(&contact.id).await.unwrap());
    assert!(store.get_contact(&contact.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_users_sorted_by_email() {
    let (store, _db) = setup_test_store().await;

    store
        .create_user(&User::new("zoe@example.test", "Zoe"))
        .await
        .unwrap();
    store
        .create_user(&User::new("amir@example.test", "Amir"))
        .await
        .unwrap();

    let users = store.list_users(Page::default()).await.unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].email, "amir@example.test");
    assert_eq!(users[1].email, "zoe@example.test");
}

#[tokio::test]
async fn test_get_won_estimates_with_end_dates() {
    let (store, _db) = setup_test_store().await;

    let account = make_account("Renewals Inc");
    store.create_account(&account).await.unwrap();

    let mut won_dated = Estimate::new(&account.id, Estimate::STATUS_WON);
    won_dated.contract_end_date = Some(day(2026, 9, 30));
    won_dated.amount = Some(12_000.0);
    let won_undated = Estimate::new(&account.id, Estimate::STATUS_WON);
    let mut lost = Estimate::new(&account.id, "lost");
    lost.contract_end_date = Some(day(2026, 9, 30));

    store.create_estimate(&won_dated).await.unwrap();
    store.create_estimate(&won_undated).await.unwrap();
    store.create_estimate(&lost).await.unwrap();

    let renewals = store.get_won_estimates_with_end_dates().await.unwrap();
    assert_eq!(renewals.len(), 1);
    assert_eq!(renewals[0].id, won_dated.id);
    assert_eq!(renewals[0].amount, Some(12_000.0));
}

// ==================== Notification Tests ====================

#[tokio::test]
async fn test_duplicate_unread_notification_bounces_off() {
    let (store, _db) = setup_test_store().await;

    let first = make_overdue("user-1", "task-1");
    assert!(store.create_notification(&first).await.unwrap());

    let duplicate = make_overdue("user-1", "task-1");
    assert!(
        !store.create_notification(&duplicate).await.unwrap(),
        "Second unread row for the same (user, kind, task) must be rejected"
    );

    // Once the original is read it leaves the unique index, so a fresh
    // occurrence inserts cleanly and history keeps both rows.
    assert!(store.mark_notification_read(&first.id).await.unwrap());
    let third = make_overdue("user-1", "task-1");
    assert!(store.create_notification(&third).await.unwrap());

    let filter = NotificationFilter {
        user_id: Some("user-1".to_string()),
        ..Default::default()
    };
    let all = store
        .list_notifications(&filter, Page::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_unread_dedup_is_scoped_per_user_and_task() {
    let (store, _db) = setup_test_store().await;

    assert!(store
        .create_notification(&make_overdue("user-1", "task-1"))
        .await
        .unwrap());
    assert!(store
        .create_notification(&make_overdue("user-2", "task-1"))
        .await
        .unwrap());
    assert!(store
        .create_notification(&make_overdue("user-1", "task-2"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_mark_task_due_notifications_read_keeps_fired_bucket() {
    let (store, _db) = setup_test_store().await;

    let stale = Notification::for_task(
        "user-1",
        NotificationKind::TaskDueToday,
        "Due today",
        "Task is due today",
        "task-1",
    );
    let current = make_overdue("user-1", "task-1");
    let assigned = Notification::for_task(
        "user-1",
        NotificationKind::TaskAssigned,
        "Assigned",
        "You were assigned",
        "task-1",
    );
    store.create_notification(&stale).await.unwrap();
    store.create_notification(&current).await.unwrap();
    store.create_notification(&assigned).await.unwrap();

    let cleared = store
        .mark_task_due_notifications_read("task-1", Some(NotificationKind::TaskOverdue))
        .await
        .unwrap();
    assert_eq!(cleared, 1);

    let stale_after = store.get_notification(&stale.id).await.unwrap().unwrap();
    assert!(stale_after.is_read, "Superseded bucket should be marked read");
    let current_after = store.get_notification(&current.id).await.unwrap().unwrap();
    assert!(!current_after.is_read, "Fired bucket must stay unread");
    let assigned_after = store.get_notification(&assigned.id).await.unwrap().unwrap();
    assert!(
        !assigned_after.is_read,
        "Non due-date kinds are not part of the supersession"
    );
}

#[tokio::test]
async fn test_mark_task_due_notifications_read_all_kinds_on_completion() {
    let (store, _db) = setup_test_store().await;

    store
        .create_notification(&make_overdue("user-1", "task-9"))
        .await
        .unwrap();
    store
        .create_notification(&Notification::for_task(
            "user-2",
            NotificationKind::TaskDueToday,
            "Due today",
            "Task is due today",
            "task-9",
        ))
        .await
        .unwrap();

    let cleared = store
        .mark_task_due_notifications_read("task-9", None)
        .await
        .unwrap();
    assert_eq!(cleared, 2);
}

#[tokio::test]
async fn test_get_due_date_notifications_excludes_other_kinds() {
    let (store, _db) = setup_test_store().await;

    store
        .create_notification(&make_overdue("user-1", "task-1"))
        .await
        .unwrap();
    store
        .create_notification(&Notification::for_account(
            "user-1",
            NotificationKind::NeglectedAccount,
            "Quiet account",
            "No touch in a while",
            "acct-1",
        ))
        .await
        .unwrap();

    let due = store.get_due_date_notifications().await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].kind, NotificationKind::TaskOverdue);
}

#[tokio::test]
async fn test_mark_unread_resurrects_row() {
    let (store, _db) = setup_test_store().await;

    let n = make_overdue("user-1", "task-1");
    store.create_notification(&n).await.unwrap();
    store.mark_notification_read(&n.id).await.unwrap();

    assert!(store.mark_notification_unread(&n.id).await.unwrap());
    let fetched = store.get_notification(&n.id).await.unwrap().unwrap();
    assert!(!fetched.is_read);
}

#[tokio::test]
async fn test_has_notification_on_day() {
    let (store, _db) = setup_test_store().await;

    let n = Notification::for_account(
        "user-1",
        NotificationKind::RenewalReminder,
        "Renewal closing in",
        "Contract ends soon",
        "acct-1",
    );
    store.create_notification(&n).await.unwrap();

    let today = Utc::now().date_naive();
    assert!(store
        .has_notification_on_day("user-1", NotificationKind::RenewalReminder, "acct-1", today)
        .await
        .unwrap());
    assert!(!store
        .has_notification_on_day(
            "user-1",
            NotificationKind::RenewalReminder,
            "acct-1",
            today.pred_opt().unwrap(),
        )
        .await
        .unwrap());
    assert!(!store
        .has_notification_on_day("user-2", NotificationKind::RenewalReminder, "acct-1", today)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_has_notification_in_year() {
    let (store, _db) = setup_test_store().await;

    let n = Notification::for_account(
        "user-1",
        NotificationKind::EndOfYearAnalysis,
        "Year in review",
        "Your year with this book of business",
        "acct-1",
    );
    store.create_notification(&n).await.unwrap();

    let this_year = Utc::now().date_naive().year();
    assert!(store
        .has_notification_in_year("user-1", NotificationKind::EndOfYearAnalysis, this_year)
        .await
        .unwrap());
    assert!(!store
        .has_notification_in_year("user-1", NotificationKind::EndOfYearAnalysis, this_year - 1)
        .await
        .unwrap());
}

// ==================== Snooze Tests ====================

#[tokio::test]
async fn test_account_scoped_snooze() {
    let (store, _db) = setup_test_store().await;

    let until = Utc::now() + chrono::Duration::days(7);
    let snooze = NotificationSnooze::new(
        NotificationKind::NeglectedAccount,
        Some("acct-1"),
        until,
        "user-1",
    );
    store.create_snooze(&snooze).await.unwrap();

    let now = Utc::now();
    assert!(store
        .is_snoozed(NotificationKind::NeglectedAccount, Some("acct-1"), now)
        .await
        .unwrap());
    assert!(!store
        .is_snoozed(NotificationKind::NeglectedAccount, Some("acct-2"), now)
        .await
        .unwrap());
    assert!(!store
        .is_snoozed(NotificationKind::RenewalReminder, Some("acct-1"), now)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_global_snooze_covers_every_account() {
    let (store, _db) = setup_test_store().await;

    let until = Utc::now() + chrono::Duration::days(1);
    let snooze =
        NotificationSnooze::new(NotificationKind::RenewalReminder, None, until, "user-1");
    store.create_snooze(&snooze).await.unwrap();

    let now = Utc::now();
    assert!(store
        .is_snoozed(NotificationKind::RenewalReminder, Some("any-acct"), now)
        .await
        .unwrap());
    assert!(store
        .is_snoozed(NotificationKind::RenewalReminder, None, now)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_expired_snooze_is_ignored() {
    let (store, _db) = setup_test_store().await;

    let until = Utc::now() - chrono::Duration::hours(1);
    let snooze = NotificationSnooze::new(
        NotificationKind::NeglectedAccount,
        Some("acct-1"),
        until,
        "user-1",
    );
    store.create_snooze(&snooze).await.unwrap();

    assert!(!store
        .is_snoozed(NotificationKind::NeglectedAccount, Some("acct-1"), Utc::now())
        .await
        .unwrap());

    assert!(store.delete_snooze(&snooze.id).await.unwrap());
    assert!(store.list_snoozes(Page::default()).await.unwrap().is_empty());
}

// ==================== Sequence Tests ====================

#[tokio::test]
async fn test_sequence_template_roundtrip() {
    let (store, _db) = setup_test_store().await;

    let steps = vec![
        SequenceStep {
            step_number: 1,
            action_type: "call".to_string(),
            days_after_previous: 0,
            instructions: Some("Intro call".to_string()),
        },
        SequenceStep {
            step_number: 2,
            action_type: "email".to_string(),
            days_after_previous: 3,
            instructions: None,
        },
    ];
    let template = SequenceTemplate::new("Onboarding", steps);
    store.create_sequence_template(&template).await.unwrap();

    let fetched = store
        .get_sequence_template(&template.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.name, "Onboarding");
    assert_eq!(fetched.steps.len(), 2);
    assert_eq!(fetched.steps[1].days_after_previous, 3);
    assert_eq!(fetched.steps[1].instructions, None);
}

#[tokio::test]
async fn test_list_enrollments_by_account() {
    let (store, _db) = setup_test_store().await;

    let template = SequenceTemplate::new("Outreach", Vec::new());
    store.create_sequence_template(&template).await.unwrap();

    let e1 = SequenceEnrollment::new(&template.id, "acct-1", day(2026, 2, 1));
    let e2 = SequenceEnrollment::new(&template.id, "acct-2", day(2026, 2, 2));
    store.create_enrollment(&e1).await.unwrap();
    store.create_enrollment(&e2).await.unwrap();

    let filter = EnrollmentFilter {
        account_id: Some("acct-1".to_string()),
        ..Default::default()
    };
    let hits = store
        .list_enrollments(&filter, Page::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].started_date, day(2026, 2, 1));

    assert!(store.delete_enrollment(&e2.id).await.unwrap());
    assert!(store.get_enrollment(&e2.id).await.unwrap().is_none());
}

// ==================== Scorecard Tests ====================

fn yes_no_question(id: &str, section: &str, weight: f64) -> ScorecardQuestion {
    ScorecardQuestion {
        id: id.to_string(),
        section: section.to_string(),
        text: format!("Question {}", id),
        answer_type: AnswerType::YesNo,
        weight,
        options: Vec::new(),
    }
}

#[tokio::test]
async fn test_publish_template_revision_retires_current() {
    let (store, _db) = setup_test_store().await;

    let v1 = crate::domain::ScorecardTemplate::new(
        "Deal review",
        vec![yes_no_question("q1", "Qualification", 1.0)],
    );
    store.create_scorecard_template(&v1).await.unwrap();

    let v2 = v1.next_version(
        "Deal review",
        vec![
            yes_no_question("q1", "Qualification", 1.0),
            yes_no_question("q2", "Qualification", 2.0),
        ],
    );
    store.publish_template_revision(&v2).await.unwrap();

    let old = store.get_scorecard_template(&v1.id).await.unwrap().unwrap();
    assert!(!old.is_current_version);
    let new = store.get_scorecard_template(&v2.id).await.unwrap().unwrap();
    assert!(new.is_current_version);
    assert_eq!(new.version_number, 2);
    assert_eq!(new.parent_template_id.as_deref(), Some(v1.id.as_str()));

    let current = store
        .list_scorecard_templates(true, Page::default())
        .await
        .unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].id, v2.id);

    let all = store
        .list_scorecard_templates(false, Page::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_third_revision_still_leaves_one_current() {
    let (store, _db) = setup_test_store().await;

    let v1 = crate::domain::ScorecardTemplate::new("QBR", vec![yes_no_question("q1", "s", 1.0)]);
    store.create_scorecard_template(&v1).await.unwrap();
    let v2 = v1.next_version("QBR", vec![yes_no_question("q1", "s", 1.0)]);
    store.publish_template_revision(&v2).await.unwrap();
    let v3 = v2.next_version("QBR", vec![yes_no_question("q1", "s", 1.0)]);
    store.publish_template_revision(&v3).await.unwrap();

    let current = store
        .list_scorecard_templates(true, Page::default())
        .await
        .unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].id, v3.id);
    assert_eq!(current[0].version_number, 3);
}

#[tokio::test]
async fn test_scorecard_response_roundtrip() {
    let (store, _db) = setup_test_store().await;

    let template = crate::domain::ScorecardTemplate::new(
        "Health check",
        vec![
            yes_no_question("q1", "Adoption", 1.0),
            yes_no_question("q2", "Adoption", 1.0),
        ],
    );
    store.create_scorecard_template(&template).await.unwrap();

    let mut answers = BTreeMap::new();
    answers.insert("q1".to_string(), AnswerValue::YesNo(true));
    answers.insert("q2".to_string(), AnswerValue::YesNo(false));
    let response = score_response(&template, "acct-1", answers, Utc::now());
    store.create_scorecard_response(&response).await.unwrap();

    let fetched = store
        .get_scorecard_response(&response.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.account_id, "acct-1");
    assert_eq!(fetched.template_id, template.id);
    assert_eq!(fetched.normalized_score, 50);
    assert!(!fetched.is_pass);
    assert_eq!(fetched.question_scores.len(), 2);
    assert_eq!(fetched.answers.len(), 2);

    let filter = ResponseFilter {
        account_id: Some("acct-1".to_string()),
        ..Default::default()
    };
    let listed = store
        .list_scorecard_responses(&filter, Page::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

// ==================== Reopen Tests ====================

#[tokio::test]
async fn test_reopen_preserves_rows_and_migrations_are_idempotent() {
    let db_file = tempfile::NamedTempFile::new().unwrap();
    let path = db_file.path().to_str().unwrap().to_string();

    let task_id = {
        let store = SqliteStore::new(&path).await.unwrap();
        let task = make_task("Survives reopen");
        store.create_task(&task).await.unwrap();
        task.id
    };

    let store = SqliteStore::new(&path).await.unwrap();
    let fetched = store.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(fetched.title, "Survives reopen");
}
