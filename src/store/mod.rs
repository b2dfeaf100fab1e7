//! Persistence gateway: focused store traits plus the SQLite implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{
    Account, AccountStatus, Contact, Estimate, Notification, NotificationKind,
    NotificationSnooze, ScorecardResponse, ScorecardTemplate, SequenceEnrollment,
    SequenceTemplate, Task, TaskPriority, TaskStatus, User,
};

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Hard cap on rows returned by any list query.
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Window into a list query. Limits are clamped to [`MAX_PAGE_SIZE`].
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: MAX_PAGE_SIZE,
            offset: 0,
        }
    }
}

/// Equality filters for task listings. `assigned_to` matches membership in
/// the task's assignee set.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assigned_to: Option<String>,
    pub related_account_id: Option<String>,
    pub category: Option<String>,
    pub blocked_by_task_id: Option<String>,
    pub sequence_enrollment_id: Option<String>,
    pub is_recurring: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub status: Option<AccountStatus>,
    pub segment: Option<String>,
    pub icp_status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactFilter {
    pub account_id: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EstimateFilter {
    pub account_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub user_id: Option<String>,
    pub kind: Option<NotificationKind>,
    pub is_read: Option<bool>,
    pub related_task_id: Option<String>,
    pub related_account_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EnrollmentFilter {
    pub template_id: Option<String>,
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ResponseFilter {
    pub account_id: Option<String>,
    pub template_id: Option<String>,
}

/// Task rows plus the queries the lifecycle manager and sweeps lean on.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, task: &Task) -> anyhow::Result<()>;
    async fn upsert_task(&self, task: &Task) -> anyhow::Result<()>;
    async fn get_task(&self, id: &str) -> anyhow::Result<Option<Task>>;
    /// Full-row update by id. Returns false when the row does not exist.
    async fn update_task(&self, task: &Task) -> anyhow::Result<bool>;
    async fn delete_task(&self, id: &str) -> anyhow::Result<bool>;
    async fn list_tasks(&self, filter: &TaskFilter, page: Page) -> anyhow::Result<Vec<Task>>;
    async fn get_all_tasks(&self) -> anyhow::Result<Vec<Task>>;
    /// Tasks whose `blocked_by_task_id` points at the given task.
    async fn get_tasks_blocked_by(&self, task_id: &str) -> anyhow::Result<Vec<Task>>;
    /// Non-completed tasks that carry a due date, for due-date bucketing.
    async fn get_open_tasks_with_due_dates(&self) -> anyhow::Result<Vec<Task>>;
    /// Apply `(id, order)` pairs as one transaction.
    async fn apply_order_changes(&self, changes: &[(String, i64)]) -> anyhow::Result<()>;
}

/// Accounts plus the satellite collections that hang off them.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create_account(&self, account: &Account) -> anyhow::Result<()>;
    async fn upsert_account(&self, account: &Account) -> anyhow::Result<()>;
    async fn get_account(&self, id: &str) -> anyhow::Result<Option<Account>>;
    async fn update_account(&self, account: &Account) -> anyhow::Result<bool>;
    /// Narrow status write used by the renewal status mirror.
    async fn set_account_status(&self, id: &str, status: AccountStatus) -> anyhow::Result<bool>;
    async fn delete_account(&self, id: &str) -> anyhow::Result<bool>;
    async fn list_accounts(
        &self,
        filter: &AccountFilter,
        page: Page,
    ) -> anyhow::Result<Vec<Account>>;
    async fn get_non_archived_accounts(&self) -> anyhow::Result<Vec<Account>>;

    async fn create_contact(&self, contact: &Contact) -> anyhow::Result<()>;
    async fn upsert_contact(&self, contact: &Contact) -> anyhow::Result<()>;
    async fn get_contact(&self, id: &str) -> anyhow::Result<Option<Contact>>;
    async fn update_contact(&self, contact: &Contact) -> anyhow::Result<bool>;
    async fn delete_contact(&self, id: &str) -> anyhow::Result<bool>;
    async fn list_contacts(
        &self,
        filter: &ContactFilter,
        page: Page,
    ) -> anyhow::Result<Vec<Contact>>;

    async fn create_user(&self, user: &User) -> anyhow::Result<()>;
    async fn upsert_user(&self, user: &User) -> anyhow::Result<()>;
    async fn get_user(&self, id: &str) -> anyhow::Result<Option<User>>;
    async fn delete_user(&self, id: &str) -> anyhow::Result<bool>;
    async fn list_users(&self, page: Page) -> anyhow::Result<Vec<User>>;

    async fn create_estimate(&self, estimate: &Estimate) -> anyhow::Result<()>;
    async fn upsert_estimate(&self, estimate: &Estimate) -> anyhow::Result<()>;
    async fn get_estimate(&self, id: &str) -> anyhow::Result<Option<Estimate>>;
    async fn update_estimate(&self, estimate: &Estimate) -> anyhow::Result<bool>;
    async fn delete_estimate(&self, id: &str) -> anyhow::Result<bool>;
    async fn list_estimates(
        &self,
        filter: &EstimateFilter,
        page: Page,
    ) -> anyhow::Result<Vec<Estimate>>;
    /// Won estimates that carry a contract end date, for the renewal sweep.
    async fn get_won_estimates_with_end_dates(&self) -> anyhow::Result<Vec<Estimate>>;
}

/// Notifications and their snooze windows.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a notification. Returns false when an identical unread row
    /// already exists (unique-index hit), which callers treat as a no-op.
    async fn create_notification(&self, notification: &Notification) -> anyhow::Result<bool>;
    async fn get_notification(&self, id: &str) -> anyhow::Result<Option<Notification>>;
    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
        page: Page,
    ) -> anyhow::Result<Vec<Notification>>;
    /// Every row of a kind, read or not, for sweep reconciliation.
    async fn get_notifications_by_kind(
        &self,
        kind: NotificationKind,
    ) -> anyhow::Result<Vec<Notification>>;
    /// All rows of the three due-date kinds.
    async fn get_due_date_notifications(&self) -> anyhow::Result<Vec<Notification>>;
    async fn mark_notification_read(&self, id: &str) -> anyhow::Result<bool>;
    async fn mark_notification_unread(&self, id: &str) -> anyhow::Result<bool>;
    async fn delete_notification(&self, id: &str) -> anyhow::Result<bool>;
    /// Mark a task's unread due-date notifications read, optionally keeping
    /// one kind untouched (the bucket that just fired).
    async fn mark_task_due_notifications_read(
        &self,
        task_id: &str,
        keep: Option<NotificationKind>,
    ) -> anyhow::Result<i64>;
    /// Whether a row of this kind was created for the user/account on `day`.
    async fn has_notification_on_day(
        &self,
        user_id: &str,
        kind: NotificationKind,
        account_id: &str,
        day: NaiveDate,
    ) -> anyhow::Result<bool>;
    /// Whether a row of this kind was created for the user during `year`.
    async fn has_notification_in_year(
        &self,
        user_id: &str,
        kind: NotificationKind,
        year: i32,
    ) -> anyhow::Result<bool>;

    async fn create_snooze(&self, snooze: &NotificationSnooze) -> anyhow::Result<()>;
    async fn delete_snooze(&self, id: &str) -> anyhow::Result<bool>;
    async fn list_snoozes(&self, page: Page) -> anyhow::Result<Vec<NotificationSnooze>>;
    /// Active snooze check. An account-scoped row suppresses that account;
    /// a row without an account suppresses the kind globally.
    async fn is_snoozed(
        &self,
        kind: NotificationKind,
        account_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait SequenceStore: Send + Sync {
    async fn create_sequence_template(&self, template: &SequenceTemplate) -> anyhow::Result<()>;
    async fn get_sequence_template(&self, id: &str)
        -> anyhow::Result<Option<SequenceTemplate>>;
    async fn update_sequence_template(&self, template: &SequenceTemplate)
        -> anyhow::Result<bool>;
    async fn delete_sequence_template(&self, id: &str) -> anyhow::Result<bool>;
    async fn list_sequence_templates(&self, page: Page)
        -> anyhow::Result<Vec<SequenceTemplate>>;

    async fn create_enrollment(&self, enrollment: &SequenceEnrollment) -> anyhow::Result<()>;
    async fn get_enrollment(&self, id: &str) -> anyhow::Result<Option<SequenceEnrollment>>;
    async fn delete_enrollment(&self, id: &str) -> anyhow::Result<bool>;
    async fn list_enrollments(
        &self,
        filter: &EnrollmentFilter,
        page: Page,
    ) -> anyhow::Result<Vec<SequenceEnrollment>>;
}

#[async_trait]
pub trait ScorecardStore: Send + Sync {
    async fn create_scorecard_template(&self, template: &ScorecardTemplate)
        -> anyhow::Result<()>;
    async fn get_scorecard_template(
        &self,
        id: &str,
    ) -> anyhow::Result<Option<ScorecardTemplate>>;
    /// Insert a new template version and retire the lineage's current one,
    /// atomically.
    async fn publish_template_revision(
        &self,
        revision: &ScorecardTemplate,
    ) -> anyhow::Result<()>;
    async fn delete_scorecard_template(&self, id: &str) -> anyhow::Result<bool>;
    async fn list_scorecard_templates(
        &self,
        current_only: bool,
        page: Page,
    ) -> anyhow::Result<Vec<ScorecardTemplate>>;

    async fn create_scorecard_response(&self, response: &ScorecardResponse)
        -> anyhow::Result<()>;
    async fn get_scorecard_response(
        &self,
        id: &str,
    ) -> anyhow::Result<Option<ScorecardResponse>>;
    async fn delete_scorecard_response(&self, id: &str) -> anyhow::Result<bool>;
    async fn list_scorecard_responses(
        &self,
        filter: &ResponseFilter,
        page: Page,
    ) -> anyhow::Result<Vec<ScorecardResponse>>;
}

/// Facade trait so call sites can hold an `Arc<dyn CrmStore>` while focused
/// code depends on the narrower store traits.
pub trait CrmStore:
    Send + Sync + TaskStore + AccountStore + NotificationStore + SequenceStore + ScorecardStore
{
}

impl<T> CrmStore for T where
    T: Send + Sync + TaskStore + AccountStore + NotificationStore + SequenceStore + ScorecardStore
{
}
