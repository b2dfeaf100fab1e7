use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One step of an outreach sequence. `days_after_previous` is the gap from
/// the prior step; the first step's gap counts from the enrollment start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStep {
    pub step_number: u32,
    #[serde(default)]
    pub action_type: String,
    #[serde(default)]
    pub days_after_previous: i64,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub steps: Vec<SequenceStep>,
    pub created_at: DateTime<Utc>,
}

impl SequenceTemplate {
    pub fn new(name: &str, steps: Vec<SequenceStep>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            steps,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceEnrollment {
    pub id: String,
    pub template_id: String,
    pub account_id: String,
    pub started_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl SequenceEnrollment {
    pub fn new(template_id: &str, account_id: &str, started_date: NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            template_id: template_id.to_string(),
            account_id: account_id.to_string(),
            started_date,
            created_at: Utc::now(),
        }
    }
}
