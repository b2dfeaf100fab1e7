use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::domain::{
    Account, AccountStatus, Contact, Estimate, Notification, NotificationKind,
    NotificationSnooze, Recurrence, ScorecardResponse, ScorecardTemplate, SequenceEnrollment,
    SequenceTemplate, Task, TaskPriority, TaskStatus, User,
};

use super::{
    AccountFilter, ContactFilter, EnrollmentFilter, EstimateFilter, NotificationFilter, Page,
    ResponseFilter, TaskFilter,
};

mod accounts;
mod migrations;
mod notifications;
mod scorecards;
mod sequences;
mod tasks;

#[cfg(test)]
mod tests;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(db_path: &str) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        migrations::migrate_crm(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }
}

// ==================== Column codecs ====================

fn parse_utc(raw: &str) -> DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_utc_opt(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| {
        chrono::DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

fn parse_date_opt(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Assignees are stored as a comma-joined list.
fn join_ids(ids: &[String]) -> String {
    ids.join(",")
}

fn split_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation)
}

// ==================== Row decoders ====================

fn row_to_task(row: &SqliteRow) -> Task {
    let assigned_raw: String = row.get("assigned_to");
    let labels_raw: String = row.get("labels");
    let recurrence_raw: Option<String> = row.get("recurrence_json");
    let status_raw: String = row.get("status");
    let priority_raw: String = row.get("priority");
    let created_str: String = row.get("created_at");
    let updated_str: String = row.get("updated_at");

    Task {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        assigned_to: split_ids(&assigned_raw),
        due_date: parse_date_opt(row.get("due_date")),
        due_time: row.get("due_time"),
        priority: TaskPriority::parse(&priority_raw).unwrap_or_default(),
        status: TaskStatus::parse(&status_raw).unwrap_or_default(),
        category: row.get("category"),
        related_account_id: row.get("related_account_id"),
        labels: serde_json::from_str(&labels_raw).unwrap_or_default(),
        order: row.get("task_order"),
        is_recurring: row.get::<i64, _>("is_recurring") != 0,
        recurrence: recurrence_raw.and_then(|s| serde_json::from_str::<Recurrence>(&s).ok()),
        next_recurrence_date: parse_date_opt(row.get("next_recurrence_date")),
        blocked_by_task_id: row.get("blocked_by_task_id"),
        sequence_enrollment_id: row.get("sequence_enrollment_id"),
        sequence_step_number: row
            .get::<Option<i64>, _>("sequence_step_number")
            .map(|n| n.max(0) as u32),
        completed_date: parse_utc_opt(row.get("completed_date")),
        created_at: parse_utc(&created_str),
        updated_at: parse_utc(&updated_str),
    }
}

fn row_to_account(row: &SqliteRow) -> Account {
    let status_raw: String = row.get("status");
    let created_str: String = row.get("created_at");
    let updated_str: String = row.get("updated_at");

    Account {
        id: row.get("id"),
        name: row.get("name"),
        status: AccountStatus::parse(&status_raw).unwrap_or_default(),
        segment: row.get("segment"),
        icp_status: row.get("icp_status"),
        last_interaction_date: parse_date_opt(row.get("last_interaction_date")),
        snoozed_until: parse_date_opt(row.get("snoozed_until")),
        created_at: parse_utc(&created_str),
        updated_at: parse_utc(&updated_str),
    }
}

fn row_to_contact(row: &SqliteRow) -> Contact {
    let created_str: String = row.get("created_at");
    let updated_str: String = row.get("updated_at");

    Contact {
        id: row.get("id"),
        account_id: row.get("account_id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        phone: row.get("phone"),
        title: row.get("title"),
        created_at: parse_utc(&created_str),
        updated_at: parse_utc(&updated_str),
    }
}

fn row_to_user(row: &SqliteRow) -> User {
    let created_str: String = row.get("created_at");

    User {
        id: row.get("id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        created_at: parse_utc(&created_str),
    }
}

fn row_to_estimate(row: &SqliteRow) -> Estimate {
    let created_str: String = row.get("created_at");

    Estimate {
        id: row.get("id"),
        account_id: row.get("account_id"),
        status: row.get("status"),
        amount: row.get("amount"),
        contract_end_date: parse_date_opt(row.get("contract_end_date")),
        created_at: parse_utc(&created_str),
    }
}

fn row_to_notification(row: &SqliteRow) -> Notification {
    let kind_raw: String = row.get("kind");
    let created_str: String = row.get("created_at");

    Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: NotificationKind::parse(&kind_raw).unwrap_or(NotificationKind::TaskReminder),
        title: row.get("title"),
        message: row.get("message"),
        related_task_id: row.get("related_task_id"),
        related_account_id: row.get("related_account_id"),
        is_read: row.get::<i64, _>("is_read") != 0,
        scheduled_for: parse_utc_opt(row.get("scheduled_for")),
        created_at: parse_utc(&created_str),
    }
}

fn row_to_snooze(row: &SqliteRow) -> NotificationSnooze {
    let kind_raw: String = row.get("kind");
    let until_str: String = row.get("snoozed_until");
    let created_str: String = row.get("created_at");

    NotificationSnooze {
        id: row.get("id"),
        kind: NotificationKind::parse(&kind_raw).unwrap_or(NotificationKind::TaskReminder),
        related_account_id: row.get("related_account_id"),
        snoozed_until: parse_utc(&until_str),
        snoozed_by: row.get("snoozed_by"),
        created_at: parse_utc(&created_str),
    }
}

fn row_to_sequence_template(row: &SqliteRow) -> SequenceTemplate {
    let steps_raw: String = row.get("steps_json");
    let created_str: String = row.get("created_at");

    SequenceTemplate {
        id: row.get("id"),
        name: row.get("name"),
        steps: serde_json::from_str(&steps_raw).unwrap_or_default(),
        created_at: parse_utc(&created_str),
    }
}

fn row_to_enrollment(row: &SqliteRow) -> SequenceEnrollment {
    let started_str: String = row.get("started_date");
    let created_str: String = row.get("created_at");

    SequenceEnrollment {
        id: row.get("id"),
        template_id: row.get("template_id"),
        account_id: row.get("account_id"),
        started_date: NaiveDate::parse_from_str(&started_str, "%Y-%m-%d")
            .unwrap_or_else(|_| Utc::now().date_naive()),
        created_at: parse_utc(&created_str),
    }
}

fn row_to_scorecard_template(row: &SqliteRow) -> ScorecardTemplate {
    let questions_raw: String = row.get("questions_json");
    let created_str: String = row.get("created_at");

    ScorecardTemplate {
        id: row.get("id"),
        name: row.get("name"),
        questions: serde_json::from_str(&questions_raw).unwrap_or_default(),
        pass_threshold: row.get("pass_threshold"),
        version_number: row.get::<i64, _>("version_number").max(1) as u32,
        parent_template_id: row.get("parent_template_id"),
        is_current_version: row.get::<i64, _>("is_current_version") != 0,
        created_at: parse_utc(&created_str),
    }
}

fn row_to_scorecard_response(row: &SqliteRow) -> ScorecardResponse {
    let answers_raw: String = row.get("answers_json");
    let question_scores_raw: String = row.get("question_scores_json");
    let section_scores_raw: String = row.get("section_scores_json");
    let created_str: String = row.get("created_at");

    ScorecardResponse {
        id: row.get("id"),
        account_id: row.get("account_id"),
        template_id: row.get("template_id"),
        answers: serde_json::from_str(&answers_raw).unwrap_or_default(),
        question_scores: serde_json::from_str(&question_scores_raw).unwrap_or_default(),
        section_scores: serde_json::from_str(&section_scores_raw).unwrap_or_default(),
        total_score: row.get("total_score"),
        max_score: row.get("max_score"),
        normalized_score: row.get::<i64, _>("normalized_score").max(0) as u32,
        is_pass: row.get::<i64, _>("is_pass") != 0,
        created_at: parse_utc(&created_str),
    }
}
