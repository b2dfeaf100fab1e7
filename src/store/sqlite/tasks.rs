use super::*;

use crate::store::TaskStore;

fn labels_json(task: &Task) -> String {
    serde_json::to_string(&task.labels).unwrap_or_else(|_| "[]".to_string())
}

fn recurrence_json(task: &Task) -> Option<String> {
    task.recurrence
        .as_ref()
        .and_then(|r| serde_json::to_string(r).ok())
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn create_task(&self, task: &Task) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO tasks (id, title, description, assigned_to, due_date, due_time,
                priority, status, category, related_account_id, labels, task_order,
                is_recurring, recurrence_json, next_recurrence_date, blocked_by_task_id,
                sequence_enrollment_id, sequence_step_number, completed_date,
                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(join_ids(&task.assigned_to))
        .bind(task.due_date.map(date_str))
        .bind(&task.due_time)
        .bind(task.priority.as_str())
        .bind(task.status.as_str())
        .bind(&task.category)
        .bind(&task.related_account_id)
        .bind(labels_json(task))
        .bind(task.order)
        .bind(task.is_recurring as i32)
        .bind(recurrence_json(task))
        .bind(task.next_recurrence_date.map(date_str))
        .bind(&task.blocked_by_task_id)
        .bind(&task.sequence_enrollment_id)
        .bind(task.sequence_step_number.map(|n| n as i64))
        .bind(task.completed_date.map(|t| t.to_rfc3339()))
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_task(&self, task: &Task) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO tasks (id, title, description, assigned_to, due_date, due_time,
                priority, status, category, related_account_id, labels, task_order,
                is_recurring, recurrence_json, next_recurrence_date, blocked_by_task_id,
                sequence_enrollment_id, sequence_step_number, completed_date,
                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                assigned_to = excluded.assigned_to,
                due_date = excluded.due_date,
                due_time = excluded.due_time,
                priority = excluded.priority,
                status = excluded.status,
                category = excluded.category,
                related_account_id = excluded.related_account_id,
                labels = excluded.labels,
                task_order = excluded.task_order,
                is_recurring = excluded.is_recurring,
                recurrence_json = excluded.recurrence_json,
                next_recurrence_date = excluded.next_recurrence_date,
                blocked_by_task_id = excluded.blocked_by_task_id,
                sequence_enrollment_id = excluded.sequence_enrollment_id,
                sequence_step_number = excluded.sequence_step_number,
                completed_date = excluded.completed_date,
                updated_at = excluded.updated_at",
        )
        .bind(&task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(join_ids(&task.assigned_to))
        .bind(task.due_date.map(date_str))
        .bind(&task.due_time)
        .bind(task.priority.as_str())
        .bind(task.status.as_str())
        .bind(&task.category)
        .bind(&task.related_account_id)
        .bind(labels_json(task))
        .bind(task.order)
        .bind(task.is_recurring as i32)
        .bind(recurrence_json(task))
        .bind(task.next_recurrence_date.map(date_str))
        .bind(&task.blocked_by_task_id)
        .bind(&task.sequence_enrollment_id)
        .bind(task.sequence_step_number.map(|n| n as i64))
        .bind(task.completed_date.map(|t| t.to_rfc3339()))
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, id: &str) -> anyhow::Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_task(&r)))
    }

    async fn update_task(&self, task: &Task) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET
                title = ?, description = ?, assigned_to = ?, due_date = ?, due_time = ?,
                priority = ?, status = ?, category = ?, related_account_id = ?, labels = ?,
                task_order = ?, is_recurring = ?, recurrence_json = ?,
                next_recurrence_date = ?, blocked_by_task_id = ?,
                sequence_enrollment_id = ?, sequence_step_number = ?, completed_date = ?,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(join_ids(&task.assigned_to))
        .bind(task.due_date.map(date_str))
        .bind(&task.due_time)
        .bind(task.priority.as_str())
        .bind(task.status.as_str())
        .bind(&task.category)
        .bind(&task.related_account_id)
        .bind(labels_json(task))
        .bind(task.order)
        .bind(task.is_recurring as i32)
        .bind(recurrence_json(task))
        .bind(task.next_recurrence_date.map(date_str))
        .bind(&task.blocked_by_task_id)
        .bind(&task.sequence_enrollment_id)
        .bind(task.sequence_step_number.map(|n| n as i64))
        .bind(task.completed_date.map(|t| t.to_rfc3339()))
        .bind(task.updated_at.to_rfc3339())
        .bind(&task.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_task(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_tasks(&self, filter: &TaskFilter, page: Page) -> anyhow::Result<Vec<Task>> {
        let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM tasks WHERE 1=1");
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(priority) = filter.priority {
            qb.push(" AND priority = ").push_bind(priority.as_str());
        }
        if let Some(user_id) = &filter.assigned_to {
            qb.push(" AND ',' || assigned_to || ',' LIKE '%,' || ")
                .push_bind(user_id)
                .push(" || ',%'");
        }
        if let Some(account_id) = &filter.related_account_id {
            qb.push(" AND related_account_id = ").push_bind(account_id);
        }
        if let Some(category) = &filter.category {
            qb.push(" AND category = ").push_bind(category);
        }
        if let Some(blocker) = &filter.blocked_by_task_id {
            qb.push(" AND blocked_by_task_id = ").push_bind(blocker);
        }
        if let Some(enrollment_id) = &filter.sequence_enrollment_id {
            qb.push(" AND sequence_enrollment_id = ").push_bind(enrollment_id);
        }
        if let Some(is_recurring) = filter.is_recurring {
            qb.push(" AND is_recurring = ").push_bind(is_recurring as i32);
        }
        qb.push(" ORDER BY task_order ASC, created_at ASC");
        qb.push(" LIMIT ").push_bind(page.limit);
        qb.push(" OFFSET ").push_bind(page.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_task).collect())
    }

    async fn get_all_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks ORDER BY task_order ASC, created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_task).collect())
    }

    async fn get_tasks_blocked_by(&self, task_id: &str) -> anyhow::Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE blocked_by_task_id = ?")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_task).collect())
    }

    async fn get_open_tasks_with_due_dates(&self) -> anyhow::Result<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT * FROM tasks
             WHERE status != 'completed' AND due_date IS NOT NULL
             ORDER BY due_date ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_task).collect())
    }

    async fn apply_order_changes(&self, changes: &[(String, i64)]) -> anyhow::Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for (id, order) in changes {
            sqlx::query("UPDATE tasks SET task_order = ?, updated_at = ? WHERE id = ?")
                .bind(order)
                .bind(&now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
