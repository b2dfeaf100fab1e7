//! Test infrastructure: isolated temp-file stores plus seed helpers.
//!
//! Each harness creates its own SQLite file, so tests run in parallel
//! without stepping on each other.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::domain::{Account, Estimate, Task, User};
use crate::store::sqlite::SqliteStore;
use crate::store::{AccountStore, CrmStore, TaskStore};

/// A store backed by its own temp file. The database goes away when this
/// drops.
pub struct StoreHarness {
    pub store: Arc<SqliteStore>,
    _db_file: tempfile::NamedTempFile,
}

impl StoreHarness {
    pub fn crm(&self) -> Arc<dyn CrmStore> {
        self.store.clone()
    }
}

pub async fn setup_store() -> StoreHarness {
    let db_file = tempfile::NamedTempFile::new().unwrap();
    let db_path = db_file.path().to_str().unwrap().to_string();
    let store = Arc::new(SqliteStore::new(&db_path).await.unwrap());
    StoreHarness {
        store,
        _db_file: db_file,
    }
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at_noon(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
}

pub async fn seed_user(store: &dyn CrmStore, email: &str) -> User {
    let name = email.split('@').next().unwrap_or(email);
    let user = User::new(email, name);
    store.create_user(&user).await.unwrap();
    user
}

pub async fn seed_account<F>(store: &dyn CrmStore, name: &str, configure: F) -> Account
where
    F: FnOnce(&mut Account),
{
    let mut account = Account::new(name);
    configure(&mut account);
    store.create_account(&account).await.unwrap();
    account
}

pub async fn seed_task<F>(store: &dyn CrmStore, title: &str, configure: F) -> Task
where
    F: FnOnce(&mut Task),
{
    let mut task = Task::new(title);
    configure(&mut task);
    store.create_task(&task).await.unwrap();
    task
}

pub async fn seed_won_estimate(
    store: &dyn CrmStore,
    account_id: &str,
    contract_end: NaiveDate,
) -> Estimate {
    let mut estimate = Estimate::new(account_id, Estimate::STATUS_WON);
    estimate.contract_end_date = Some(contract_end);
    store.create_estimate(&estimate).await.unwrap();
    estimate
}
