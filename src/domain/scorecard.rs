//! Scorecard templates, versioning metadata, and submitted responses.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PASS_THRESHOLD: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerType {
    #[serde(rename = "yes_no")]
    YesNo,
    #[serde(rename = "scale_1_5")]
    Scale1To5,
    #[serde(rename = "scale_1_10")]
    Scale1To10,
    #[serde(rename = "single_select")]
    SingleSelect,
    #[serde(rename = "multi_select")]
    MultiSelect,
}

impl AnswerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerType::YesNo => "yes_no",
            AnswerType::Scale1To5 => "scale_1_5",
            AnswerType::Scale1To10 => "scale_1_10",
            AnswerType::SingleSelect => "single_select",
            AnswerType::MultiSelect => "multi_select",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorecardOption {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorecardQuestion {
    pub id: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub text: String,
    pub answer_type: AnswerType,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub options: Vec<ScorecardOption>,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorecardTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub questions: Vec<ScorecardQuestion>,
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
    #[serde(default = "default_version_number")]
    pub version_number: u32,
    /// Root of the version lineage; None on the original.
    #[serde(default)]
    pub parent_template_id: Option<String>,
    #[serde(default = "default_is_current")]
    pub is_current_version: bool,
    pub created_at: DateTime<Utc>,
}

fn default_pass_threshold() -> f64 {
    DEFAULT_PASS_THRESHOLD
}
fn default_version_number() -> u32 {
    1
}
fn default_is_current() -> bool {
    true
}

impl ScorecardTemplate {
    pub fn new(name: &str, questions: Vec<ScorecardQuestion>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            questions,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            version_number: 1,
            parent_template_id: None,
            is_current_version: true,
            created_at: Utc::now(),
        }
    }

    /// Build the replacement row for a content edit: same lineage, next
    /// version number, current flag set. The caller persists both rows.
    pub fn next_version(&self, name: &str, questions: Vec<ScorecardQuestion>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            questions,
            pass_threshold: self.pass_threshold,
            version_number: self.version_number + 1,
            parent_template_id: Some(
                self.parent_template_id
                    .clone()
                    .unwrap_or_else(|| self.id.clone()),
            ),
            is_current_version: true,
            created_at: Utc::now(),
        }
    }
}

/// A submitted answer. Untagged so transport JSON stays plain:
/// `true`, `4`, `"opt-2"`, or `["opt-1","opt-3"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    YesNo(bool),
    Number(f64),
    Choice(String),
    Choices(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionScore {
    pub question_id: String,
    pub section: String,
    pub score: f64,
    pub max_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorecardResponse {
    pub id: String,
    pub account_id: String,
    pub template_id: String,
    #[serde(default)]
    pub answers: BTreeMap<String, AnswerValue>,
    #[serde(default)]
    pub question_scores: Vec<QuestionScore>,
    #[serde(default)]
    pub section_scores: BTreeMap<String, f64>,
    pub total_score: f64,
    pub max_score: f64,
    /// 0-100, rounded half-up, 0 when nothing is scoreable.
    pub normalized_score: u32,
    pub is_pass: bool,
    pub created_at: DateTime<Utc>,
}
