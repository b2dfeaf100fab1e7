use super::*;

use crate::store::SequenceStore;

fn steps_json(template: &SequenceTemplate) -> String {
    serde_json::to_string(&template.steps).unwrap_or_else(|_| "[]".to_string())
}

#[async_trait]
impl SequenceStore for SqliteStore {
    async fn create_sequence_template(&self, template: &SequenceTemplate) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO sequence_templates (id, name, steps_json, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&template.id)
        .bind(&template.name)
        .bind(steps_json(template))
        .bind(template.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_sequence_template(
        &self,
        id: &str,
    ) -> anyhow::Result<Option<SequenceTemplate>> {
        let row = sqlx::query("SELECT * FROM sequence_templates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_sequence_template(&r)))
    }

    async fn update_sequence_template(
        &self,
        template: &SequenceTemplate,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE sequence_templates SET name = ?, steps_json = ? WHERE id = ?",
        )
        .bind(&template.name)
        .bind(steps_json(template))
        .bind(&template.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_sequence_template(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM sequence_templates WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_sequence_templates(
        &self,
        page: Page,
    ) -> anyhow::Result<Vec<SequenceTemplate>> {
        let rows = sqlx::query(
            "SELECT * FROM sequence_templates ORDER BY name ASC LIMIT ? OFFSET ?",
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_sequence_template).collect())
    }

    async fn create_enrollment(&self, enrollment: &SequenceEnrollment) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO sequence_enrollments (id, template_id, account_id, started_date,
                created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&enrollment.id)
        .bind(&enrollment.template_id)
        .bind(&enrollment.account_id)
        .bind(date_str(enrollment.started_date))
        .bind(enrollment.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_enrollment(&self, id: &str) -> anyhow::Result<Option<SequenceEnrollment>> {
        let row = sqlx::query("SELECT * FROM sequence_enrollments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_enrollment(&r)))
    }

    async fn delete_enrollment(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM sequence_enrollments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_enrollments(
        &self,
        filter: &EnrollmentFilter,
        page: Page,
    ) -> anyhow::Result<Vec<SequenceEnrollment>> {
        let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM sequence_enrollments WHERE 1=1");
        if let Some(template_id) = &filter.template_id {
            qb.push(" AND template_id = ").push_bind(template_id);
        }
        if let Some(account_id) = &filter.account_id {
            qb.push(" AND account_id = ").push_bind(account_id);
        }
        qb.push(" ORDER BY created_at DESC");
        qb.push(" LIMIT ").push_bind(page.limit);
        qb.push(" OFFSET ").push_bind(page.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_enrollment).collect())
    }
}
