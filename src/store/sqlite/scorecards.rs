use super::*;

use crate::store::ScorecardStore;

fn questions_json(template: &ScorecardTemplate) -> String {
    serde_json::to_string(&template.questions).unwrap_or_else(|_| "[]".to_string())
}

async fn insert_template<'e, E>(executor: E, template: &ScorecardTemplate) -> anyhow::Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO scorecard_templates (id, name, questions_json, pass_threshold,
            version_number, parent_template_id, is_current_version, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&template.id)
    .bind(&template.name)
    .bind(questions_json(template))
    .bind(template.pass_threshold)
    .bind(template.version_number as i64)
    .bind(&template.parent_template_id)
    .bind(template.is_current_version as i32)
    .bind(template.created_at.to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl ScorecardStore for SqliteStore {
    async fn create_scorecard_template(
        &self,
        template: &ScorecardTemplate,
    ) -> anyhow::Result<()> {
        insert_template(&self.pool, template).await
    }

    async fn get_scorecard_template(
        &self,
        id: &str,
    ) -> anyhow::Result<Option<ScorecardTemplate>> {
        let row = sqlx::query("SELECT * FROM scorecard_templates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_scorecard_template(&r)))
    }

    async fn publish_template_revision(
        &self,
        revision: &ScorecardTemplate,
    ) -> anyhow::Result<()> {
        let lineage_root = revision
            .parent_template_id
            .clone()
            .unwrap_or_else(|| revision.id.clone());

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE scorecard_templates SET is_current_version = 0
             WHERE is_current_version = 1
               AND (id = ? OR parent_template_id = ?)",
        )
        .bind(&lineage_root)
        .bind(&lineage_root)
        .execute(&mut *tx)
        .await?;
        insert_template(&mut *tx, revision).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_scorecard_template(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM scorecard_templates WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_scorecard_templates(
        &self,
        current_only: bool,
        page: Page,
    ) -> anyhow::Result<Vec<ScorecardTemplate>> {
        let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM scorecard_templates WHERE 1=1");
        if current_only {
            qb.push(" AND is_current_version = 1");
        }
        qb.push(" ORDER BY name ASC, version_number DESC");
        qb.push(" LIMIT ").push_bind(page.limit);
        qb.push(" OFFSET ").push_bind(page.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_scorecard_template).collect())
    }

    async fn create_scorecard_response(
        &self,
        response: &ScorecardResponse,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO scorecard_responses (id, account_id, template_id, answers_json,
                question_scores_json, section_scores_json, total_score, max_score,
                normalized_score, is_pass, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&response.id)
        .bind(&response.account_id)
        .bind(&response.template_id)
        .bind(serde_json::to_string(&response.answers).unwrap_or_else(|_| "{}".to_string()))
        .bind(
            serde_json::to_string(&response.question_scores)
                .unwrap_or_else(|_| "[]".to_string()),
        )
        .bind(
            serde_json::to_string(&response.section_scores)
                .unwrap_or_else(|_| "{}".to_string()),
        )
        .bind(response.total_score)
        .bind(response.max_score)
        .bind(response.normalized_score as i64)
        .bind(response.is_pass as i32)
        .bind(response.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_scorecard_response(
        &self,
        id: &str,
    ) -> anyhow::Result<Option<ScorecardResponse>> {
        let row = sqlx::query("SELECT * FROM scorecard_responses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_scorecard_response(&r)))
    }

    async fn delete_scorecard_response(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM scorecard_responses WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_scorecard_responses(
        &self,
        filter: &ResponseFilter,
        page: Page,
    ) -> anyhow::Result<Vec<ScorecardResponse>> {
        let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM scorecard_responses WHERE 1=1");
        if let Some(account_id) = &filter.account_id {
            qb.push(" AND account_id = ").push_bind(account_id);
        }
        if let Some(template_id) = &filter.template_id {
            qb.push(" AND template_id = ").push_bind(template_id);
        }
        qb.push(" ORDER BY created_at DESC");
        qb.push(" LIMIT ").push_bind(page.limit);
        qb.push(" OFFSET ").push_bind(page.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_scorecard_response).collect())
    }
}
