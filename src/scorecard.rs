//! Scorecard scoring engine.
//!
//! Scoring is pure: a template plus a map of submitted answers yields a
//! fully computed [`ScorecardResponse`]. Persistence and template version
//! bookkeeping live in the store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AnswerType, AnswerValue, QuestionScore, ScorecardQuestion, ScorecardResponse,
    ScorecardTemplate,
};

/// Section whose questions are tracked for display but never scored.
pub const EXCLUDED_SECTION: &str = "Win Rate";

/// Score a set of answers against a template version.
///
/// Unanswered questions earn 0 but still contribute to the maximum, so
/// skipping a question lowers the normalized score.
pub fn score_response(
    template: &ScorecardTemplate,
    account_id: &str,
    answers: BTreeMap<String, AnswerValue>,
    now: DateTime<Utc>,
) -> ScorecardResponse {
    let mut question_scores = Vec::new();
    let mut section_scores: BTreeMap<String, f64> = BTreeMap::new();
    let mut total_score = 0.0;
    let mut max_score = 0.0;

    for question in &template.questions {
        if question.section == EXCLUDED_SECTION {
            continue;
        }
        let scored = score_question(question, answers.get(&question.id));
        total_score += scored.score;
        max_score += scored.max_score;
        *section_scores.entry(scored.section.clone()).or_insert(0.0) += scored.score;
        question_scores.push(scored);
    }

    let normalized_score = normalized(total_score, max_score);
    ScorecardResponse {
        id: Uuid::new_v4().to_string(),
        account_id: account_id.to_string(),
        template_id: template.id.clone(),
        answers,
        question_scores,
        section_scores,
        total_score,
        max_score,
        normalized_score,
        is_pass: f64::from(normalized_score) >= template.pass_threshold,
        created_at: now,
    }
}

fn score_question(question: &ScorecardQuestion, answer: Option<&AnswerValue>) -> QuestionScore {
    let (earned, possible) = match question.answer_type {
        AnswerType::YesNo => (if is_yes(answer) { 1.0 } else { 0.0 }, 1.0),
        AnswerType::Scale1To5 => (numeric(answer).clamp(0.0, 5.0), 5.0),
        AnswerType::Scale1To10 => (numeric(answer).clamp(0.0, 10.0), 10.0),
        AnswerType::SingleSelect => (
            selected_option_weight(question, answer),
            question
                .options
                .iter()
                .map(|o| o.weight)
                .fold(0.0, f64::max),
        ),
        AnswerType::MultiSelect => (
            selected_option_weights_sum(question, answer),
            question.options.iter().map(|o| o.weight).sum(),
        ),
    };
    QuestionScore {
        question_id: question.id.clone(),
        section: question.section.clone(),
        score: question.weight * earned,
        max_score: question.weight * possible,
    }
}

/// Round to a whole percentage. A zero or empty maximum scores 0, never NaN.
fn normalized(total: f64, possible: f64) -> u32 {
    if possible <= 0.0 {
        return 0;
    }
    (100.0 * total / possible).round().max(0.0) as u32
}

fn is_yes(answer: Option<&AnswerValue>) -> bool {
    match answer {
        Some(AnswerValue::YesNo(b)) => *b,
        Some(AnswerValue::Number(n)) => *n != 0.0,
        Some(AnswerValue::Choice(s)) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "yes" | "true" | "y" | "1")
        }
        _ => false,
    }
}

/// Numeric coercion for scale questions. Clients sometimes send `"4"`.
fn numeric(answer: Option<&AnswerValue>) -> f64 {
    match answer {
        Some(AnswerValue::Number(n)) => *n,
        Some(AnswerValue::YesNo(true)) => 1.0,
        Some(AnswerValue::Choice(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Options match by id first, label as a fallback for older clients.
fn selected_option_weight(question: &ScorecardQuestion, answer: Option<&AnswerValue>) -> f64 {
    let key = match answer {
        Some(AnswerValue::Choice(s)) => s.as_str(),
        _ => return 0.0,
    };
    question
        .options
        .iter()
        .find(|o| o.id == key || o.label == key)
        .map(|o| o.weight)
        .unwrap_or(0.0)
}

fn selected_option_weights_sum(
    question: &ScorecardQuestion,
    answer: Option<&AnswerValue>,
) -> f64 {
    let keys: Vec<&str> = match answer {
        Some(AnswerValue::Choices(values)) => values.iter().map(String::as_str).collect(),
        Some(AnswerValue::Choice(s)) => vec![s.as_str()],
        _ => return 0.0,
    };
    question
        .options
        .iter()
        .filter(|o| keys.contains(&o.id.as_str()) || keys.contains(&o.label.as_str()))
        .map(|o| o.weight)
        .sum()
}
