use sqlx::SqlitePool;
use tracing::info;

pub(crate) async fn migrate_crm(pool: &SqlitePool) -> anyhow::Result<()> {
    // Create tables
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            assigned_to TEXT NOT NULL DEFAULT '',
            due_date TEXT,
            due_time TEXT,
            priority TEXT NOT NULL DEFAULT 'normal',
            status TEXT NOT NULL DEFAULT 'todo',
            category TEXT,
            related_account_id TEXT,
            labels TEXT NOT NULL DEFAULT '[]',
            task_order INTEGER NOT NULL DEFAULT 0,
            is_recurring INTEGER NOT NULL DEFAULT 0,
            recurrence_json TEXT,
            blocked_by_task_id TEXT,
            completed_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tasks_due_open
            ON tasks(due_date) WHERE status != 'completed' AND due_date IS NOT NULL",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tasks_blocked_by ON tasks(blocked_by_task_id)",
    )
    .execute(pool)
    .await?;

    // --- Sequence expansion migrations ---
    // Tasks created from a sequence remember their origin step.
    let _ = sqlx::query("ALTER TABLE tasks ADD COLUMN sequence_enrollment_id TEXT")
        .execute(pool)
        .await; // Ignore error if exists
    let _ = sqlx::query("ALTER TABLE tasks ADD COLUMN sequence_step_number INTEGER")
        .execute(pool)
        .await;
    let _ = sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tasks_enrollment ON tasks(sequence_enrollment_id)",
    )
    .execute(pool)
    .await;

    // --- Recurrence bookkeeping migration ---
    let _ = sqlx::query("ALTER TABLE tasks ADD COLUMN next_recurrence_date TEXT")
        .execute(pool)
        .await;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            segment TEXT,
            icp_status TEXT,
            last_interaction_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_accounts_status ON accounts(status)")
        .execute(pool)
        .await?;

    // Migration: per-account suppression for the neglect sweep.
    let _ = sqlx::query("ALTER TABLE accounts ADD COLUMN snoozed_until TEXT")
        .execute(pool)
        .await;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS contacts (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL DEFAULT '',
            email TEXT,
            phone TEXT,
            title TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_contacts_account ON contacts(account_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS estimates (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft',
            amount REAL,
            contract_end_date TEXT,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_estimates_account ON estimates(account_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_estimates_renewal
            ON estimates(contract_end_date)
            WHERE status = 'won' AND contract_end_date IS NOT NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            related_task_id TEXT,
            related_account_id TEXT,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notifications_kind ON notifications(kind)")
        .execute(pool)
        .await?;

    // One unread row per (user, kind, target). Read rows fall out of the
    // index, so history accumulates while duplicates bounce off the insert.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_notifications_unread_task
            ON notifications(user_id, kind, related_task_id)
            WHERE is_read = 0 AND related_task_id IS NOT NULL",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_notifications_unread_account
            ON notifications(user_id, kind, related_account_id)
            WHERE is_read = 0 AND related_account_id IS NOT NULL",
    )
    .execute(pool)
    .await?;

    // Migration: scheduled delivery time for reminder rows.
    let _ = sqlx::query("ALTER TABLE notifications ADD COLUMN scheduled_for TEXT")
        .execute(pool)
        .await;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS notification_snoozes (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            related_account_id TEXT,
            snoozed_until TEXT NOT NULL,
            snoozed_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_snoozes_kind
            ON notification_snoozes(kind, snoozed_until)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sequence_templates (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            steps_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sequence_enrollments (
            id TEXT PRIMARY KEY,
            template_id TEXT NOT NULL,
            account_id TEXT NOT NULL,
            started_date TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_account
            ON sequence_enrollments(account_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS scorecard_templates (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            questions_json TEXT NOT NULL DEFAULT '[]',
            pass_threshold REAL NOT NULL DEFAULT 70,
            version_number INTEGER NOT NULL DEFAULT 1,
            parent_template_id TEXT,
            is_current_version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scorecard_templates_lineage
            ON scorecard_templates(parent_template_id)",
    )
    .execute(pool)
    .await?;

    // At most one current version per lineage (root id doubles as lineage key).
    let _ = sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_scorecard_templates_current
            ON scorecard_templates(COALESCE(parent_template_id, id))
            WHERE is_current_version = 1",
    )
    .execute(pool)
    .await;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS scorecard_responses (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            template_id TEXT NOT NULL,
            answers_json TEXT NOT NULL DEFAULT '{}',
            question_scores_json TEXT NOT NULL DEFAULT '[]',
            section_scores_json TEXT NOT NULL DEFAULT '{}',
            total_score REAL NOT NULL DEFAULT 0,
            max_score REAL NOT NULL DEFAULT 0,
            normalized_score INTEGER NOT NULL DEFAULT 0,
            is_pass INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scorecard_responses_account
            ON scorecard_responses(account_id, created_at)",
    )
    .execute(pool)
    .await?;

    info!("database migration complete");
    Ok(())
}
