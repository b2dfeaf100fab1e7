//! Core CRM entities shared by the store, the sweeps, and the HTTP layer.

mod account;
mod notification;
mod scorecard;
mod sequence;
mod task;

pub use account::{Account, AccountStatus, Contact, Estimate, User};
pub use notification::{
    Notification, NotificationKey, NotificationKind, NotificationSnooze, NotificationTarget,
};
pub use scorecard::{
    AnswerType, AnswerValue, QuestionScore, ScorecardOption, ScorecardQuestion, ScorecardResponse,
    ScorecardTemplate,
};
pub use sequence::{SequenceEnrollment, SequenceStep, SequenceTemplate};
pub use task::{Recurrence, RecurrencePattern, Task, TaskPriority, TaskStatus};
