use super::*;

use crate::store::NotificationStore;

#[async_trait]
impl NotificationStore for SqliteStore {
    async fn create_notification(&self, notification: &Notification) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, title, message, related_task_id,
                related_account_id, is_read, scheduled_for, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&notification.id)
        .bind(&notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.related_task_id)
        .bind(&notification.related_account_id)
        .bind(notification.is_read as i32)
        .bind(notification.scheduled_for.map(|t| t.to_rfc3339()))
        .bind(notification.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            // An identical unread row already exists; the sweep treats this
            // as already-notified.
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_notification(&self, id: &str) -> anyhow::Result<Option<Notification>> {
        let row = sqlx::query("SELECT * FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_notification(&r)))
    }

    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
        page: Page,
    ) -> anyhow::Result<Vec<Notification>> {
        let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM notifications WHERE 1=1");
        if let Some(user_id) = &filter.user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(kind) = filter.kind {
            qb.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(is_read) = filter.is_read {
            qb.push(" AND is_read = ").push_bind(is_read as i32);
        }
        if let Some(task_id) = &filter.related_task_id {
            qb.push(" AND related_task_id = ").push_bind(task_id);
        }
        if let Some(account_id) = &filter.related_account_id {
            qb.push(" AND related_account_id = ").push_bind(account_id);
        }
        qb.push(" ORDER BY created_at DESC");
        qb.push(" LIMIT ").push_bind(page.limit);
        qb.push(" OFFSET ").push_bind(page.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_notification).collect())
    }

    async fn get_notifications_by_kind(
        &self,
        kind: NotificationKind,
    ) -> anyhow::Result<Vec<Notification>> {
        let rows = sqlx::query("SELECT * FROM notifications WHERE kind = ?")
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_notification).collect())
    }

    async fn get_due_date_notifications(&self) -> anyhow::Result<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT * FROM notifications
             WHERE kind IN ('task_overdue', 'task_due_today', 'task_reminder')",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_notification).collect())
    }

    async fn mark_notification_read(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_notification_unread(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE notifications SET is_read = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_notification(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_task_due_notifications_read(
        &self,
        task_id: &str,
        keep: Option<NotificationKind>,
    ) -> anyhow::Result<i64> {
        let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(
            "UPDATE notifications SET is_read = 1
             WHERE related_task_id = ",
        );
        qb.push_bind(task_id);
        qb.push(" AND is_read = 0 AND kind IN ('task_overdue', 'task_due_today', 'task_reminder')");
        if let Some(kind) = keep {
            qb.push(" AND kind != ").push_bind(kind.as_str());
        }
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() as i64)
    }

    async fn has_notification_on_day(
        &self,
        user_id: &str,
        kind: NotificationKind,
        account_id: &str,
        day: NaiveDate,
    ) -> anyhow::Result<bool> {
        // created_at is RFC3339, so the first ten chars are the calendar day.
        let hit: Option<i64> = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM notifications
             WHERE user_id = ? AND kind = ? AND related_account_id = ?
               AND substr(created_at, 1, 10) = ?
             LIMIT 1",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(account_id)
        .bind(date_str(day))
        .fetch_optional(&self.pool)
        .await?;
        Ok(hit.is_some())
    }

    async fn has_notification_in_year(
        &self,
        user_id: &str,
        kind: NotificationKind,
        year: i32,
    ) -> anyhow::Result<bool> {
        let hit: Option<i64> = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM notifications
             WHERE user_id = ? AND kind = ? AND substr(created_at, 1, 4) = ?
             LIMIT 1",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(format!("{year:04}"))
        .fetch_optional(&self.pool)
        .await?;
        Ok(hit.is_some())
    }

    // ==================== Snoozes ====================

    async fn create_snooze(&self, snooze: &NotificationSnooze) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO notification_snoozes (id, kind, related_account_id, snoozed_until,
                snoozed_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&snooze.id)
        .bind(snooze.kind.as_str())
        .bind(&snooze.related_account_id)
        .bind(snooze.snoozed_until.to_rfc3339())
        .bind(&snooze.snoozed_by)
        .bind(snooze.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_snooze(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM notification_snoozes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_snoozes(&self, page: Page) -> anyhow::Result<Vec<NotificationSnooze>> {
        let rows = sqlx::query(
            "SELECT * FROM notification_snoozes ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_snooze).collect())
    }

    async fn is_snoozed(
        &self,
        kind: NotificationKind,
        account_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let hit: Option<i64> = match account_id {
            Some(account_id) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT 1 FROM notification_snoozes
                     WHERE kind = ? AND snoozed_until > ?
                       AND (related_account_id IS NULL OR related_account_id = ?)
                     LIMIT 1",
                )
                .bind(kind.as_str())
                .bind(now.to_rfc3339())
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT 1 FROM notification_snoozes
                     WHERE kind = ? AND snoozed_until > ? AND related_account_id IS NULL
                     LIMIT 1",
                )
                .bind(kind.as_str())
                .bind(now.to_rfc3339())
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(hit.is_some())
    }
}
