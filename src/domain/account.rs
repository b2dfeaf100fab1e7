use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Active,
    AtRisk,
    Archived,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::AtRisk => "at_risk",
            AccountStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Some(AccountStatus::Active),
            "at_risk" | "at-risk" => Some(AccountStatus::AtRisk),
            "archived" => Some(AccountStatus::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: AccountStatus,
    /// Engagement tier A-D. Missing is treated as C by the neglect sweep.
    #[serde(default)]
    pub segment: Option<String>,
    /// "na" excludes the account from neglect checks.
    #[serde(default)]
    pub icp_status: Option<String>,
    #[serde(default)]
    pub last_interaction_date: Option<NaiveDate>,
    /// Per-account neglect snooze.
    #[serde(default)]
    pub snoozed_until: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            status: AccountStatus::default(),
            segment: None,
            icp_status: None,
            last_interaction_date: None,
            snoozed_until: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub account_id: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(account_id: &str, first_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            first_name: first_name.to_string(),
            last_name: String::new(),
            email: None,
            phone: None,
            title: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Won estimates drive renewal dates: an account renews at the latest
/// contract end date across its won estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Estimate {
    pub id: String,
    pub account_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub contract_end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Estimate {
    pub const STATUS_WON: &'static str = "won";

    pub fn new(account_id: &str, status: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            status: status.to_string(),
            amount: None,
            contract_end_date: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, full_name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            full_name: full_name.to_string(),
            created_at: Utc::now(),
        }
    }
}
