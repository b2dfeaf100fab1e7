//! Expands a sequence template into its chain of tasks: cumulative day
//! offsets from the enrollment start, first task open, every later task
//! blocked by the one before it.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::{info, warn};

use crate::domain::{SequenceEnrollment, SequenceStep, SequenceTemplate, Task, TaskStatus};
use crate::store::{CrmStore, SequenceStore, TaskStore};

/// Task titles for the action types templates use. Anything else falls back
/// to "Step N".
const ACTION_LABELS: &[(&str, &str)] = &[
    ("call", "Call"),
    ("email", "Email"),
    ("linkedin", "LinkedIn touch"),
    ("meeting", "Meeting"),
    ("demo", "Demo"),
    ("follow_up", "Follow up"),
];

fn step_title(step: &SequenceStep) -> String {
    ACTION_LABELS
        .iter()
        .find(|(key, _)| *key == step.action_type)
        .map(|(_, label)| (*label).to_string())
        .unwrap_or_else(|| format!("Step {}", step.step_number))
}

pub struct SequenceExpander {
    store: Arc<dyn CrmStore>,
}

impl SequenceExpander {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    /// Enroll an account in a template: persist the enrollment, then expand
    /// it into the task chain.
    pub async fn enroll(
        &self,
        template_id: &str,
        account_id: &str,
        started_date: NaiveDate,
    ) -> anyhow::Result<(SequenceEnrollment, Vec<Task>)> {
        let Some(template) = self.store.get_sequence_template(template_id).await? else {
            anyhow::bail!("sequence template not found: {template_id}");
        };

        let enrollment = SequenceEnrollment::new(template_id, account_id, started_date);
        self.store.create_enrollment(&enrollment).await?;
        info!(
            enrollment_id = %enrollment.id,
            template = %template.name,
            account_id = %account_id,
            "enrolled account in sequence"
        );

        let tasks = self.expand(&enrollment, &template).await;
        Ok((enrollment, tasks))
    }

    /// Create the tasks for an enrollment. Steps run in step-number order;
    /// each step's `days_after_previous` accumulates onto the offset from
    /// `started_date`. A step that fails to persist is logged and skipped,
    /// and the chain continues from the last task that did.
    pub async fn expand(
        &self,
        enrollment: &SequenceEnrollment,
        template: &SequenceTemplate,
    ) -> Vec<Task> {
        let mut steps: Vec<&SequenceStep> = template.steps.iter().collect();
        steps.sort_by_key(|s| s.step_number);

        let mut created: Vec<Task> = Vec::new();
        let mut offset_days: i64 = 0;

        for step in steps {
            offset_days += step.days_after_previous;

            let mut task = Task::new(&step_title(step));
            task.description = step.instructions.clone();
            task.due_date = Some(enrollment.started_date + Duration::days(offset_days));
            task.related_account_id = Some(enrollment.account_id.clone());
            task.sequence_enrollment_id = Some(enrollment.id.clone());
            task.sequence_step_number = Some(step.step_number);
            match created.last() {
                Some(previous) => {
                    task.status = TaskStatus::Blocked;
                    task.blocked_by_task_id = Some(previous.id.clone());
                }
                None => task.status = TaskStatus::Todo,
            }

            match self.store.create_task(&task).await {
                Ok(()) => {
                    info!(
                        enrollment_id = %enrollment.id,
                        step = step.step_number,
                        due = %task.due_date.unwrap_or(enrollment.started_date),
                        "created sequence task"
                    );
                    created.push(task);
                }
                Err(e) => {
                    warn!(
                        enrollment_id = %enrollment.id,
                        step = step.step_number,
                        "failed to create sequence task, skipping step: {e:#}"
                    );
                }
            }
        }

        created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SequenceStore, SqliteStore, TaskStore};
    use crate::tasks::TaskLifecycle;
    use chrono::Utc;

    async fn setup() -> (SequenceExpander, Arc<SqliteStore>, tempfile::NamedTempFile) {
        let db_file = tempfile::NamedTempFile::new().unwrap();
        let store = Arc::new(
            SqliteStore::new(db_file.path().to_str().unwrap())
                .await
                .unwrap(),
        );
        let expander = SequenceExpander::new(store.clone());
        (expander, store, db_file)
    }

    fn step(number: u32, action: &str, days_after_previous: i64) -> SequenceStep {
        SequenceStep {
            step_number: number,
            action_type: action.to_string(),
            days_after_previous,
            instructions: None,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_expand_accumulates_day_offsets() {
        let (expander, store, _db) = setup().await;

        let template = SequenceTemplate::new(
            "Outreach",
            vec![step(1, "call", 0), step(2, "email", 3), step(3, "follow_up", 7)],
        );
        store.create_sequence_template(&template).await.unwrap();

        let start = day(2026, 3, 2);
        let (_, tasks) = expander
            .enroll(&template.id, "acct-1", start)
            .await
            .unwrap();

        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].due_date, Some(day(2026, 3, 2)));
        assert_eq!(tasks[1].due_date, Some(day(2026, 3, 5)));
        assert_eq!(tasks[2].due_date, Some(day(2026, 3, 12)));
    }

    #[tokio::test]
    async fn test_expand_builds_a_linear_blocked_chain() {
        let (expander, store, _db) = setup().await;

        let template = SequenceTemplate::new(
            "Chain",
            vec![step(1, "call", 0), step(2, "email", 2), step(3, "demo", 2)],
        );
        store.create_sequence_template(&template).await.unwrap();

        let (enrollment, tasks) = expander
            .enroll(&template.id, "acct-1", day(2026, 4, 1))
            .await
            .unwrap();

        assert_eq!(tasks[0].status, TaskStatus::Todo);
        assert!(tasks[0].blocked_by_task_id.is_none());
        assert_eq!(tasks[1].status, TaskStatus::Blocked);
        assert_eq!(
            tasks[1].blocked_by_task_id.as_deref(),
            Some(tasks[0].id.as_str())
        );
        assert_eq!(
            tasks[2].blocked_by_task_id.as_deref(),
            Some(tasks[1].id.as_str())
        );
        for task in &tasks {
            assert_eq!(
                task.sequence_enrollment_id.as_deref(),
                Some(enrollment.id.as_str())
            );
            assert_eq!(task.related_account_id.as_deref(), Some("acct-1"));
        }
    }

    #[tokio::test]
    async fn test_steps_expand_in_step_number_order() {
        let (expander, store, _db) = setup().await;

        // Steps listed out of order in the template.
        let template = SequenceTemplate::new(
            "Shuffled",
            vec![step(3, "demo", 5), step(1, "call", 0), step(2, "email", 2)],
        );
        store.create_sequence_template(&template).await.unwrap();

        let (_, tasks) = expander
            .enroll(&template.id, "acct-1", day(2026, 5, 1))
            .await
            .unwrap();

        let numbers: Vec<u32> = tasks
            .iter()
            .filter_map(|t| t.sequence_step_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(tasks[2].due_date, Some(day(2026, 5, 8)));
    }

    #[tokio::test]
    async fn test_unknown_action_type_falls_back_to_step_number() {
        let (expander, store, _db) = setup().await;

        let template = SequenceTemplate::new(
            "Custom",
            vec![step(1, "call", 0), step(2, "carrier_pigeon", 1)],
        );
        store.create_sequence_template(&template).await.unwrap();

        let (_, tasks) = expander
            .enroll(&template.id, "acct-1", day(2026, 6, 1))
            .await
            .unwrap();

        assert_eq!(tasks[0].title, "Call");
        assert_eq!(tasks[1].title, "Step 2");
    }

    #[tokio::test]
    async fn test_empty_template_creates_no_tasks() {
        let (expander, store, _db) = setup().await;

        let template = SequenceTemplate::new("Empty", Vec::new());
        store.create_sequence_template(&template).await.unwrap();

        let (_, tasks) = expander
            .enroll(&template.id, "acct-1", day(2026, 7, 1))
            .await
            .unwrap();
        assert!(tasks.is_empty());
        assert!(store.get_all_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_completing_a_step_unblocks_the_next() {
        let (expander, store, _db) = setup().await;

        let template =
            SequenceTemplate::new("Two step", vec![step(1, "call", 0), step(2, "email", 3)]);
        store.create_sequence_template(&template).await.unwrap();

        let (_, tasks) = expander
            .enroll(&template.id, "acct-1", Utc::now().date_naive())
            .await
            .unwrap();

        let lifecycle = TaskLifecycle::new(store.clone());
        lifecycle
            .change_status(&tasks[0].id, TaskStatus::Completed, None, Utc::now())
            .await
            .unwrap();

        let second = store.get_task(&tasks[1].id).await.unwrap().unwrap();
        assert_eq!(second.status, TaskStatus::Todo);
    }

    #[test]
    fn test_step_title_lookup() {
        assert_eq!(step_title(&step(1, "call", 0)), "Call");
        assert_eq!(step_title(&step(4, "linkedin", 0)), "LinkedIn touch");
        assert_eq!(step_title(&step(7, "smoke_signal", 0)), "Step 7");
    }
}
