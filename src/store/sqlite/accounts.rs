use super::*;

use crate::store::AccountStore;

#[async_trait]
impl AccountStore for SqliteStore {
    async fn create_account(&self, account: &Account) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO accounts (id, name, status, segment, icp_status,
                last_interaction_date, snoozed_until, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&account.id)
        .bind(&account.name)
        .bind(account.status.as_str())
        .bind(&account.segment)
        .bind(&account.icp_status)
        .bind(account.last_interaction_date.map(date_str))
        .bind(account.snoozed_until.map(date_str))
        .bind(account.created_at.to_rfc3339())
        .bind(account.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_account(&self, account: &Account) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO accounts (id, name, status, segment, icp_status,
                last_interaction_date, snoozed_until, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                segment = excluded.segment,
                icp_status = excluded.icp_status,
                last_interaction_date = excluded.last_interaction_date,
                snoozed_until = excluded.snoozed_until,
                updated_at = excluded.updated_at",
        )
        .bind(&account.id)
        .bind(&account.name)
        .bind(account.status.as_str())
        .bind(&account.segment)
        .bind(&account.icp_status)
        .bind(account.last_interaction_date.map(date_str))
        .bind(account.snoozed_until.map(date_str))
        .bind(account.created_at.to_rfc3339())
        .bind(account.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_account(&self, id: &str) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_account(&r)))
    }

    async fn update_account(&self, account: &Account) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE accounts SET
                name = ?, status = ?, segment = ?, icp_status = ?,
                last_interaction_date = ?, snoozed_until = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&account.name)
        .bind(account.status.as_str())
        .bind(&account.segment)
        .bind(&account.icp_status)
        .bind(account.last_interaction_date.map(date_str))
        .bind(account.snoozed_until.map(date_str))
        .bind(account.updated_at.to_rfc3339())
        .bind(&account.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_account_status(&self, id: &str, status: AccountStatus) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE accounts SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_account(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_accounts(
        &self,
        filter: &AccountFilter,
        page: Page,
    ) -> anyhow::Result<Vec<Account>> {
        let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM accounts WHERE 1=1");
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(segment) = &filter.segment {
            qb.push(" AND segment = ").push_bind(segment);
        }
        if let Some(icp) = &filter.icp_status {
            qb.push(" AND icp_status = ").push_bind(icp);
        }
        qb.push(" ORDER BY name ASC");
        qb.push(" LIMIT ").push_bind(page.limit);
        qb.push(" OFFSET ").push_bind(page.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_account).collect())
    }

    async fn get_non_archived_accounts(&self) -> anyhow::Result<Vec<Account>> {
        let rows = sqlx::query("SELECT * FROM accounts WHERE status != 'archived'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_account).collect())
    }

    // ==================== Contacts ====================

    async fn create_contact(&self, contact: &Contact) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO contacts (id, account_id, first_name, last_name, email, phone,
                title, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&contact.id)
        .bind(&contact.account_id)
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(&contact.title)
        .bind(contact.created_at.to_rfc3339())
        .bind(contact.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_contact(&self, contact: &Contact) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO contacts (id, account_id, first_name, last_name, email, phone,
                title, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                account_id = excluded.account_id,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                email = excluded.email,
                phone = excluded.phone,
                title = excluded.title,
                updated_at = excluded.updated_at",
        )
        .bind(&contact.id)
        .bind(&contact.account_id)
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(&contact.title)
        .bind(contact.created_at.to_rfc3339())
        .bind(contact.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_contact(&self, id: &str) -> anyhow::Result<Option<Contact>> {
        let row = sqlx::query("SELECT * FROM contacts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_contact(&r)))
    }

    async fn update_contact(&self, contact: &Contact) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE contacts SET
                account_id = ?, first_name = ?, last_name = ?, email = ?, phone = ?,
                title = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&contact.account_id)
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(&contact.title)
        .bind(contact.updated_at.to_rfc3339())
        .bind(&contact.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_contact(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_contacts(
        &self,
        filter: &ContactFilter,
        page: Page,
    ) -> anyhow::Result<Vec<Contact>> {
        let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM contacts WHERE 1=1");
        if let Some(account_id) = &filter.account_id {
            qb.push(" AND account_id = ").push_bind(account_id);
        }
        if let Some(email) = &filter.email {
            qb.push(" AND email = ").push_bind(email);
        }
        qb.push(" ORDER BY last_name ASC, first_name ASC");
        qb.push(" LIMIT ").push_bind(page.limit);
        qb.push(" OFFSET ").push_bind(page.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_contact).collect())
    }

    // ==================== Users ====================

    async fn create_user(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, full_name, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_user(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, full_name, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                full_name = excluded.full_name",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user(&self, id: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_user(&r)))
    }

    async fn delete_user(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self, page: Page) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY email ASC LIMIT ? OFFSET ?")
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_user).collect())
    }

    // ==================== Estimates ====================

    async fn create_estimate(&self, estimate: &Estimate) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO estimates (id, account_id, status, amount, contract_end_date,
                created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&estimate.id)
        .bind(&estimate.account_id)
        .bind(&estimate.status)
        .bind(estimate.amount)
        .bind(estimate.contract_end_date.map(date_str))
        .bind(estimate.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_estimate(&self, estimate: &Estimate) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO estimates (id, account_id, status, amount, contract_end_date,
                created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                account_id = excluded.account_id,
                status = excluded.status,
                amount = excluded.amount,
                contract_end_date = excluded.contract_end_date",
        )
        .bind(&estimate.id)
        .bind(&estimate.account_id)
        .bind(&estimate.status)
        .bind(estimate.amount)
        .bind(estimate.contract_end_date.map(date_str))
        .bind(estimate.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_estimate(&self, id: &str) -> anyhow::Result<Option<Estimate>> {
        let row = sqlx::query("SELECT * FROM estimates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_estimate(&r)))
    }

    async fn update_estimate(&self, estimate: &Estimate) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE estimates SET
                account_id = ?, status = ?, amount = ?, contract_end_date = ?
             WHERE id = ?",
        )
        .bind(&estimate.account_id)
        .bind(&estimate.status)
        .bind(estimate.amount)
        .bind(estimate.contract_end_date.map(date_str))
        .bind(&estimate.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_estimate(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM estimates WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_estimates(
        &self,
        filter: &EstimateFilter,
        page: Page,
    ) -> anyhow::Result<Vec<Estimate>> {
        let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM estimates WHERE 1=1");
        if let Some(account_id) = &filter.account_id {
            qb.push(" AND account_id = ").push_bind(account_id);
        }
        if let Some(status) = &filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        qb.push(" ORDER BY created_at DESC");
        qb.push(" LIMIT ").push_bind(page.limit);
        qb.push(" OFFSET ").push_bind(page.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_estimate).collect())
    }

    async fn get_won_estimates_with_end_dates(&self) -> anyhow::Result<Vec<Estimate>> {
        let rows = sqlx::query(
            "SELECT * FROM estimates
             WHERE status = 'won' AND contract_end_date IS NOT NULL
             ORDER BY contract_end_date ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_estimate).collect())
    }
}
