use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use crate::config::HttpConfig;
use crate::domain::{
    Account, AccountStatus, AnswerValue, Notification, NotificationKind, NotificationSnooze,
    ScorecardQuestion, ScorecardTemplate, SequenceTemplate, Task, TaskPriority, TaskStatus,
    User,
};
use crate::heartbeat::HeartbeatTelemetry;
use crate::reconcile::{resolve_recipients, Reconciler};
use crate::scorecard::score_response;
use crate::sequences::SequenceExpander;
use crate::store::{
    AccountFilter, AccountStore, ContactFilter, CrmStore, EnrollmentFilter, EstimateFilter,
    NotificationFilter, NotificationStore, Page, ResponseFilter, ScorecardStore, SequenceStore,
    TaskFilter, TaskStore,
};
use crate::tasks::TaskLifecycle;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn CrmStore>,
    pub lifecycle: Arc<TaskLifecycle>,
    pub expander: Arc<SequenceExpander>,
    pub reconciler: Arc<Reconciler>,
    pub telemetry: Arc<HeartbeatTelemetry>,
    pub started_at: Instant,
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

type ApiResponse = (StatusCode, Json<Value>);

fn ok(data: Value) -> ApiResponse {
    (StatusCode::OK, Json(json!({"success": true, "data": data})))
}

fn created(data: Value) -> ApiResponse {
    (
        StatusCode::CREATED,
        Json(json!({"success": true, "data": data})),
    )
}

fn ok_list<T: Serialize>(items: Vec<T>) -> ApiResponse {
    (
        StatusCode::OK,
        Json(json!({"success": true, "count": items.len(), "data": items})),
    )
}

fn bad_request(message: impl std::fmt::Display) -> ApiResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"success": false, "error": message.to_string()})),
    )
}

fn not_found(what: &str, id: &str) -> ApiResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"success": false, "error": format!("{what} not found: {id}")})),
    )
}

fn internal(e: anyhow::Error) -> ApiResponse {
    error!("request failed: {e:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"success": false, "error": format!("{e:#}")})),
    )
}

// ---------------------------------------------------------------------------
// JSON payload helpers
// ---------------------------------------------------------------------------

/// POST body for collection endpoints.
#[derive(Deserialize)]
struct ActionBody {
    action: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Serialize)]
struct BulkOutcome {
    upserted: usize,
    failed: usize,
    errors: Vec<String>,
}

impl BulkOutcome {
    fn record_failure(&mut self, error: String) {
        self.failed += 1;
        if self.errors.len() < 10 {
            self.errors.push(error);
        }
    }
}

/// Deserialize a client payload into a domain row, minting the id and
/// stamping timestamps when the client leaves them out.
fn hydrate_new<T: DeserializeOwned>(data: Value) -> anyhow::Result<T> {
    let Value::Object(mut obj) = data else {
        anyhow::bail!("expected a JSON object");
    };
    let id_blank = obj
        .get("id")
        .and_then(Value::as_str)
        .map(|s| s.trim().is_empty())
        .unwrap_or(true);
    if id_blank {
        obj.insert("id".to_string(), json!(uuid::Uuid::new_v4().to_string()));
    }
    let now = json!(Utc::now());
    obj.entry("created_at").or_insert_with(|| now.clone());
    obj.entry("updated_at").or_insert_with(|| now.clone());
    Ok(serde_json::from_value(Value::Object(obj))?)
}

/// Overlay a partial update onto the stored row. `id` and `created_at` stay
/// as they are; `updated_at` is stamped.
fn merge_patch<T: Serialize + DeserializeOwned>(current: &T, patch: Value) -> anyhow::Result<T> {
    let Value::Object(patch_obj) = patch else {
        anyhow::bail!("expected a JSON object");
    };
    let mut value = serde_json::to_value(current)?;
    let Some(obj) = value.as_object_mut() else {
        anyhow::bail!("row did not serialize to an object");
    };
    for (key, item) in patch_obj {
        if key == "id" || key == "created_at" {
            continue;
        }
        obj.insert(key, item);
    }
    obj.insert("updated_at".to_string(), json!(Utc::now()));
    Ok(serde_json::from_value(value)?)
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: ApiState, cors: CorsLayer) -> Router {
    let api = Router::new()
        .route("/api/status", get(api_status))
        .route("/api/jobs", get(api_jobs))
        .route("/api/tasks", get(api_tasks_list).post(api_tasks_action))
        .route(
            "/api/tasks/{id}",
            get(api_task_get).put(api_task_update).delete(api_task_delete),
        )
        .route("/api/tasks/{id}/status", post(api_task_status))
        .route("/api/tasks/{id}/cycle-priority", post(api_task_cycle_priority))
        .route(
            "/api/accounts",
            get(api_accounts_list).post(api_accounts_action),
        )
        .route(
            "/api/accounts/{id}",
            get(api_account_get)
                .put(api_account_update)
                .delete(api_account_delete),
        )
        .route(
            "/api/contacts",
            get(api_contacts_list).post(api_contacts_action),
        )
        .route(
            "/api/contacts/{id}",
            axum::routing::put(api_contact_update).delete(api_contact_delete),
        )
        .route("/api/users", get(api_users_list).post(api_users_action))
        .route("/api/users/{id}", axum::routing::delete(api_user_delete))
        .route(
            "/api/estimates",
            get(api_estimates_list).post(api_estimates_action),
        )
        .route(
            "/api/estimates/{id}",
            axum::routing::put(api_estimate_update).delete(api_estimate_delete),
        )
        .route("/api/notifications", get(api_notifications_list))
        .route(
            "/api/notifications/{id}",
            axum::routing::delete(api_notification_delete),
        )
        .route("/api/notifications/{id}/read", post(api_notification_read))
        .route("/api/snoozes", get(api_snoozes_list).post(api_snooze_create))
        .route("/api/snoozes/{id}", axum::routing::delete(api_snooze_delete))
        .route(
            "/api/sequence-templates",
            get(api_sequence_templates_list).post(api_sequence_templates_action),
        )
        .route(
            "/api/sequence-templates/{id}",
            get(api_sequence_template_get)
                .put(api_sequence_template_update)
                .delete(api_sequence_template_delete),
        )
        .route("/api/sequence-enrollments", get(api_enrollments_list))
        .route(
            "/api/sequence-enrollments/{id}",
            axum::routing::delete(api_enrollment_delete),
        )
        .route("/api/enrollments", post(api_enroll))
        .route(
            "/api/scorecard-templates",
            get(api_scorecard_templates_list).post(api_scorecard_templates_action),
        )
        .route(
            "/api/scorecard-templates/{id}",
            get(api_scorecard_template_get).delete(api_scorecard_template_delete),
        )
        .route(
            "/api/scorecard-responses",
            get(api_scorecard_responses_list),
        )
        .route(
            "/api/scorecard-responses/{id}",
            axum::routing::delete(api_scorecard_response_delete),
        )
        .route("/api/scorecards/submit", post(api_scorecard_submit))
        .route("/api/reconcile/{sweep}", post(api_trigger_sweep));

    Router::new()
        .route("/health", get(health_handler))
        .merge(api)
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn api_status(State(app): State<ApiState>) -> ApiResponse {
    ok(json!({
        "uptime_secs": app.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn api_jobs(State(app): State<ApiState>) -> ApiResponse {
    ok_list(app.telemetry.snapshots())
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TaskListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    status: Option<String>,
    priority: Option<String>,
    assigned_to: Option<String>,
    account_id: Option<String>,
    category: Option<String>,
    blocked_by: Option<String>,
    enrollment_id: Option<String>,
    recurring: Option<bool>,
}

async fn api_tasks_list(
    State(app): State<ApiState>,
    Query(q): Query<TaskListQuery>,
) -> ApiResponse {
    let mut filter = TaskFilter::default();
    if let Some(raw) = &q.status {
        match TaskStatus::parse(raw) {
            Some(status) => filter.status = Some(status),
            None => return bad_request(format!("unknown status: {raw}")),
        }
    }
    if let Some(raw) = &q.priority {
        match TaskPriority::parse(raw) {
            Some(priority) => filter.priority = Some(priority),
            None => return bad_request(format!("unknown priority: {raw}")),
        }
    }
    filter.assigned_to = q.assigned_to;
    filter.related_account_id = q.account_id;
    filter.category = q.category;
    filter.blocked_by_task_id = q.blocked_by;
    filter.sequence_enrollment_id = q.enrollment_id;
    filter.is_recurring = q.recurring;

    match app.store.list_tasks(&filter, Page::new(q.limit, q.offset)).await {
        Ok(tasks) => ok_list(tasks),
        Err(e) => internal(e),
    }
}

async fn api_task_get(State(app): State<ApiState>, Path(id): Path<String>) -> ApiResponse {
    match app.store.get_task(&id).await {
        Ok(Some(task)) => ok(json!(task)),
        Ok(None) => not_found("task", &id),
        Err(e) => internal(e),
    }
}

async fn api_tasks_action(
    State(app): State<ApiState>,
    Json(body): Json<ActionBody>,
) -> ApiResponse {
    match body.action.as_str() {
        "create" | "upsert" => {
            let task: Task = match hydrate_new(body.data) {
                Ok(task) => task,
                Err(e) => return bad_request(e),
            };
            let previous = match app.store.get_task(&task.id).await {
                Ok(existing) => existing,
                Err(e) => return internal(e),
            };
            if body.action == "create" && previous.is_some() {
                return bad_request(format!("task already exists: {}", task.id));
            }
            let result = if previous.is_some() {
                app.store.upsert_task(&task).await
            } else {
                app.store.create_task(&task).await
            };
            match result {
                Ok(()) => {
                    let before = previous.map(|p| p.assigned_to).unwrap_or_default();
                    notify_assignees(&app, &task, &before).await;
                    sync_due_notifications(&app, &task).await;
                    created(json!(task))
                }
                Err(e) => internal(e),
            }
        }
        "bulk_upsert" => {
            let Value::Array(items) = body.data else {
                return bad_request("bulk_upsert expects an array");
            };
            let mut outcome = BulkOutcome::default();
            for item in items {
                match hydrate_new::<Task>(item) {
                    Ok(task) => match app.store.upsert_task(&task).await {
                        Ok(()) => outcome.upserted += 1,
                        Err(e) => outcome.record_failure(format!("{e:#}")),
                    },
                    Err(e) => outcome.record_failure(format!("{e:#}")),
                }
            }
            info!(
                upserted = outcome.upserted,
                failed = outcome.failed,
                "bulk task upsert"
            );
            ok(json!(outcome))
        }
        other => bad_request(format!("unknown action: {other}")),
    }
}

async fn api_task_update(
    State(app): State<ApiState>,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> ApiResponse {
    if patch.get("status").is_some() {
        return bad_request("status changes go through POST /api/tasks/{id}/status");
    }
    if patch.get("order").is_some() {
        return bad_request("order is derived from priority and due date");
    }
    let current = match app.store.get_task(&id).await {
        Ok(Some(task)) => task,
        Ok(None) => return not_found("task", &id),
        Err(e) => return internal(e),
    };
    let before = current.assigned_to.clone();
    let updated: Task = match merge_patch(&current, patch) {
        Ok(task) => task,
        Err(e) => return bad_request(e),
    };
    match app.store.update_task(&updated).await {
        Ok(true) => {
            notify_assignees(&app, &updated, &before).await;
            sync_due_notifications(&app, &updated).await;
            ok(json!(updated))
        }
        Ok(false) => not_found("task", &id),
        Err(e) => internal(e),
    }
}

async fn api_task_delete(State(app): State<ApiState>, Path(id): Path<String>) -> ApiResponse {
    match app.store.delete_task(&id).await {
        Ok(true) => ok(json!({"deleted": id})),
        Ok(false) => not_found("task", &id),
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    acting_user: Option<String>,
}

async fn api_task_status(
    State(app): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> ApiResponse {
    let Some(new_status) = TaskStatus::parse(&body.status) else {
        return bad_request(format!("unknown status: {}", body.status));
    };
    match app.store.get_task(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("task", &id),
        Err(e) => return internal(e),
    }
    match app
        .lifecycle
        .change_status(&id, new_status, body.acting_user.as_deref(), Utc::now())
        .await
    {
        Ok(change) => ok(json!({
            "task": change.task,
            "unblocked": change.unblocked,
            "spawned": change.spawned,
        })),
        Err(e) => bad_request(e),
    }
}

async fn api_task_cycle_priority(
    State(app): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResponse {
    match app.store.get_task(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("task", &id),
        Err(e) => return internal(e),
    }
    match app.lifecycle.cycle_priority(&id, Utc::now()).await {
        Ok(task) => ok(json!(task)),
        Err(e) => internal(e),
    }
}

/// Ping users who just landed on the task's assignee list.
async fn notify_assignees(app: &ApiState, task: &Task, before: &[String]) {
    if task.assigned_to.is_empty() {
        return;
    }
    let users = match app.store.list_users(Page::default()).await {
        Ok(users) => users,
        Err(e) => {
            warn!(task_id = %task.id, "could not load users for assignment ping: {e:#}");
            return;
        }
    };
    let previous = resolve_recipients(before, &users);
    for user_id in resolve_recipients(&task.assigned_to, &users) {
        if previous.contains(&user_id) {
            continue;
        }
        let notification = Notification::for_task(
            &user_id,
            NotificationKind::TaskAssigned,
            "Task assigned",
            &format!("You were assigned '{}'", task.title),
            &task.id,
        );
        match app.store.create_notification(&notification).await {
            Ok(true) => info!(task_id = %task.id, user_id = %user_id, "assignment notification"),
            Ok(false) => {}
            Err(e) => {
                warn!(task_id = %task.id, "could not create assignment notification: {e:#}");
            }
        }
    }
}

async fn sync_due_notifications(app: &ApiState, task: &Task) {
    let today = Utc::now().date_naive();
    if let Err(e) = app.reconciler.sync_task_notifications(task, None, today).await {
        warn!(task_id = %task.id, "due-date notification sync failed: {e:#}");
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AccountListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    status: Option<String>,
    segment: Option<String>,
    icp_status: Option<String>,
}

async fn api_accounts_list(
    State(app): State<ApiState>,
    Query(q): Query<AccountListQuery>,
) -> ApiResponse {
    let mut filter = AccountFilter::default();
    if let Some(raw) = &q.status {
        match AccountStatus::parse(raw) {
            Some(status) => filter.status = Some(status),
            None => return bad_request(format!("unknown status: {raw}")),
        }
    }
    filter.segment = q.segment;
    filter.icp_status = q.icp_status;
    match app
        .store
        .list_accounts(&filter, Page::new(q.limit, q.offset))
        .await
    {
        Ok(accounts) => ok_list(accounts),
        Err(e) => internal(e),
    }
}

async fn api_account_get(State(app): State<ApiState>, Path(id): Path<String>) -> ApiResponse {
    match app.store.get_account(&id).await {
        Ok(Some(account)) => ok(json!(account)),
        Ok(None) => not_found("account", &id),
        Err(e) => internal(e),
    }
}

async fn api_accounts_action(
    State(app): State<ApiState>,
    Json(body): Json<ActionBody>,
) -> ApiResponse {
    match body.action.as_str() {
        "create" | "upsert" => {
            let account: Account = match hydrate_new(body.data) {
                Ok(account) => account,
                Err(e) => return bad_request(e),
            };
            let exists = match app.store.get_account(&account.id).await {
                Ok(existing) => existing.is_some(),
                Err(e) => return internal(e),
            };
            if body.action == "create" && exists {
                return bad_request(format!("account already exists: {}", account.id));
            }
            let result = if exists {
                app.store.upsert_account(&account).await
            } else {
                app.store.create_account(&account).await
            };
            match result {
                Ok(()) => created(json!(account)),
                Err(e) => internal(e),
            }
        }
        "bulk_upsert" => {
            let Value::Array(items) = body.data else {
                return bad_request("bulk_upsert expects an array");
            };
            let mut outcome = BulkOutcome::default();
            for item in items {
                match hydrate_new::<Account>(item) {
                    Ok(account) => match app.store.upsert_account(&account).await {
                        Ok(()) => outcome.upserted += 1,
                        Err(e) => outcome.record_failure(format!("{e:#}")),
                    },
                    Err(e) => outcome.record_failure(format!("{e:#}")),
                }
            }
            info!(
                upserted = outcome.upserted,
                failed = outcome.failed,
                "bulk account upsert"
            );
            ok(json!(outcome))
        }
        other => bad_request(format!("unknown action: {other}")),
    }
}

async fn api_account_update(
    State(app): State<ApiState>,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> ApiResponse {
    let current = match app.store.get_account(&id).await {
        Ok(Some(account)) => account,
        Ok(None) => return not_found("account", &id),
        Err(e) => return internal(e),
    };
    let updated: Account = match merge_patch(&current, patch) {
        Ok(account) => account,
        Err(e) => return bad_request(e),
    };
    match app.store.update_account(&updated).await {
        Ok(true) => ok(json!(updated)),
        Ok(false) => not_found("account", &id),
        Err(e) => internal(e),
    }
}

async fn api_account_delete(State(app): State<ApiState>, Path(id): Path<String>) -> ApiResponse {
    match app.store.delete_account(&id).await {
        Ok(true) => ok(json!({"deleted": id})),
        Ok(false) => not_found("account", &id),
        Err(e) => internal(e),
    }
}

// ---------------------------------------------------------------------------
// Contacts
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ContactListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    account_id: Option<String>,
    email: Option<String>,
}

async fn api_contacts_list(
    State(app): State<ApiState>,
    Query(q): Query<ContactListQuery>,
) -> ApiResponse {
    let filter = ContactFilter {
        account_id: q.account_id,
        email: q.email,
    };
    match app
        .store
        .list_contacts(&filter, Page::new(q.limit, q.offset))
        .await
    {
        Ok(contacts) => ok_list(contacts),
        Err(e) => internal(e),
    }
}

async fn api_contacts_action(
    State(app): State<ApiState>,
    Json(body): Json<ActionBody>,
) -> ApiResponse {
    match body.action.as_str() {
        "create" | "upsert" => {
            let contact: crate::domain::Contact = match hydrate_new(body.data) {
                Ok(contact) => contact,
                Err(e) => return bad_request(e),
            };
            let exists = match app.store.get_contact(&contact.id).await {
                Ok(existing) => existing.is_some(),
                Err(e) => return internal(e),
            };
            if body.action == "create" && exists {
                return bad_request(format!("contact already exists: {}", contact.id));
            }
            let result = if exists {
                app.store.upsert_contact(&contact).await
            } else {
                app.store.create_contact(&contact).await
            };
            match result {
                Ok(()) => created(json!(contact)),
                Err(e) => internal(e),
            }
        }
        "bulk_upsert" => {
            let Value::Array(items) = body.data else {
                return bad_request("bulk_upsert expects an array");
            };
            let mut outcome = BulkOutcome::default();
            for item in items {
                match hydrate_new::<crate::domain::Contact>(item) {
                    Ok(contact) => match app.store.upsert_contact(&contact).await {
                        Ok(()) => outcome.upserted += 1,
                        Err(e) => outcome.record_failure(format!("{e:#}")),
                    },
                    Err(e) => outcome.record_failure(format!("{e:#}")),
                }
            }
            ok(json!(outcome))
        }
        other => bad_request(format!("unknown action: {other}")),
    }
}

async fn api_contact_update(
    State(app): State<ApiState>,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> ApiResponse {
    let current = match app.store.get_contact(&id).await {
        Ok(Some(contact)) => contact,
        Ok(None) => return not_found("contact", &id),
        Err(e) => return internal(e),
    };
    let updated: crate::domain::Contact = match merge_patch(&current, patch) {
        Ok(contact) => contact,
        Err(e) => return bad_request(e),
    };
    match app.store.update_contact(&updated).await {
        Ok(true) => ok(json!(updated)),
        Ok(false) => not_found("contact", &id),
        Err(e) => internal(e),
    }
}

async fn api_contact_delete(State(app): State<ApiState>, Path(id): Path<String>) -> ApiResponse {
    match app.store.delete_contact(&id).await {
        Ok(true) => ok(json!({"deleted": id})),
        Ok(false) => not_found("contact", &id),
        Err(e) => internal(e),
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn api_users_list(State(app): State<ApiState>, Query(q): Query<ListQuery>) -> ApiResponse {
    match app.store.list_users(Page::new(q.limit, q.offset)).await {
        Ok(users) => ok_list(users),
        Err(e) => internal(e),
    }
}

async fn api_users_action(
    State(app): State<ApiState>,
    Json(body): Json<ActionBody>,
) -> ApiResponse {
    match body.action.as_str() {
        "create" | "upsert" => {
            let user: User = match hydrate_new(body.data) {
                Ok(user) => user,
                Err(e) => return bad_request(e),
            };
            if user.email.trim().is_empty() {
                return bad_request("user email must not be empty");
            }
            let exists = match app.store.get_user(&user.id).await {
                Ok(existing) => existing.is_some(),
                Err(e) => return internal(e),
            };
            if body.action == "create" && exists {
                return bad_request(format!("user already exists: {}", user.id));
            }
            let result = if exists {
                app.store.upsert_user(&user).await
            } else {
                app.store.create_user(&user).await
            };
            match result {
                Ok(()) => created(json!(user)),
                Err(e) => internal(e),
            }
        }
        other => bad_request(format!("unknown action: {other}")),
    }
}

async fn api_user_delete(State(app): State<ApiState>, Path(id): Path<String>) -> ApiResponse {
    match app.store.delete_user(&id).await {
        Ok(true) => ok(json!({"deleted": id})),
        Ok(false) => not_found("user", &id),
        Err(e) => internal(e),
    }
}

// ---------------------------------------------------------------------------
// Estimates
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct EstimateListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    account_id: Option<String>,
    status: Option<String>,
}

async fn api_estimates_list(
    State(app): State<ApiState>,
    Query(q): Query<EstimateListQuery>,
) -> ApiResponse {
    let filter = EstimateFilter {
        account_id: q.account_id,
        status: q.status,
    };
    match app
        .store
        .list_estimates(&filter, Page::new(q.limit, q.offset))
        .await
    {
        Ok(estimates) => ok_list(estimates),
        Err(e) => internal(e),
    }
}

async fn api_estimates_action(
    State(app): State<ApiState>,
    Json(body): Json<ActionBody>,
) -> ApiResponse {
    match body.action.as_str() {
        "create" | "upsert" => {
            let estimate: crate::domain::Estimate = match hydrate_new(body.data) {
                Ok(estimate) => estimate,
                Err(e) => return bad_request(e),
            };
            let exists = match app.store.get_estimate(&estimate.id).await {
                Ok(existing) => existing.is_some(),
                Err(e) => return internal(e),
            };
            if body.action == "create" && exists {
                return bad_request(format!("estimate already exists: {}", estimate.id));
            }
            let result = if exists {
                app.store.upsert_estimate(&estimate).await
            } else {
                app.store.create_estimate(&estimate).await
            };
            match result {
                Ok(()) => created(json!(estimate)),
                Err(e) => internal(e),
            }
        }
        "bulk_upsert" => {
            let Value::Array(items) = body.data else {
                return bad_request("bulk_upsert expects an array");
            };
            let mut outcome = BulkOutcome::default();
            for item in items {
                match hydrate_new::<crate::domain::Estimate>(item) {
                    Ok(estimate) => match app.store.upsert_estimate(&estimate).await {
                        Ok(()) => outcome.upserted += 1,
                        Err(e) => outcome.record_failure(format!("{e:#}")),
                    },
                    Err(e) => outcome.record_failure(format!("{e:#}")),
                }
            }
            ok(json!(outcome))
        }
        other => bad_request(format!("unknown action: {other}")),
    }
}

async fn api_estimate_update(
    State(app): State<ApiState>,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> ApiResponse {
    let current = match app.store.get_estimate(&id).await {
        Ok(Some(estimate)) => estimate,
        Ok(None) => return not_found("estimate", &id),
        Err(e) => return internal(e),
    };
    let updated: crate::domain::Estimate = match merge_patch(&current, patch) {
        Ok(estimate) => estimate,
        Err(e) => return bad_request(e),
    };
    match app.store.update_estimate(&updated).await {
        Ok(true) => ok(json!(updated)),
        Ok(false) => not_found("estimate", &id),
        Err(e) => internal(e),
    }
}

async fn api_estimate_delete(State(app): State<ApiState>, Path(id): Path<String>) -> ApiResponse {
    match app.store.delete_estimate(&id).await {
        Ok(true) => ok(json!({"deleted": id})),
        Ok(false) => not_found("estimate", &id),
        Err(e) => internal(e),
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct NotificationListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    user_id: Option<String>,
    kind: Option<String>,
    unread: Option<bool>,
    task_id: Option<String>,
    account_id: Option<String>,
}

async fn api_notifications_list(
    State(app): State<ApiState>,
    Query(q): Query<NotificationListQuery>,
) -> ApiResponse {
    let mut filter = NotificationFilter::default();
    if let Some(raw) = &q.kind {
        match NotificationKind::parse(raw) {
            Some(kind) => filter.kind = Some(kind),
            None => return bad_request(format!("unknown notification kind: {raw}")),
        }
    }
    filter.user_id = q.user_id;
    filter.is_read = q.unread.map(|unread| !unread);
    filter.related_task_id = q.task_id;
    filter.related_account_id = q.account_id;
    match app
        .store
        .list_notifications(&filter, Page::new(q.limit, q.offset))
        .await
    {
        Ok(notifications) => ok_list(notifications),
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
struct ReadBody {
    #[serde(default = "default_read")]
    read: bool,
}

fn default_read() -> bool {
    true
}

async fn api_notification_read(
    State(app): State<ApiState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResponse {
    let read = if body.is_empty() {
        true
    } else {
        match serde_json::from_slice::<ReadBody>(&body) {
            Ok(parsed) => parsed.read,
            Err(e) => return bad_request(e),
        }
    };
    let result = if read {
        app.store.mark_notification_read(&id).await
    } else {
        app.store.mark_notification_unread(&id).await
    };
    match result {
        Ok(true) => ok(json!({"id": id, "is_read": read})),
        Ok(false) => not_found("notification", &id),
        Err(e) => internal(e),
    }
}

async fn api_notification_delete(
    State(app): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResponse {
    match app.store.delete_notification(&id).await {
        Ok(true) => ok(json!({"deleted": id})),
        Ok(false) => not_found("notification", &id),
        Err(e) => internal(e),
    }
}

// ---------------------------------------------------------------------------
// Snoozes
// ---------------------------------------------------------------------------

async fn api_snoozes_list(State(app): State<ApiState>, Query(q): Query<ListQuery>) -> ApiResponse {
    match app.store.list_snoozes(Page::new(q.limit, q.offset)).await {
        Ok(snoozes) => ok_list(snoozes),
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
struct SnoozeBody {
    kind: String,
    #[serde(default)]
    related_account_id: Option<String>,
    snoozed_until: DateTime<Utc>,
    #[serde(default)]
    snoozed_by: Option<String>,
}

async fn api_snooze_create(
    State(app): State<ApiState>,
    Json(body): Json<SnoozeBody>,
) -> ApiResponse {
    let Some(kind) = NotificationKind::parse(&body.kind) else {
        return bad_request(format!("unknown notification kind: {}", body.kind));
    };
    let snooze = NotificationSnooze::new(
        kind,
        body.related_account_id.as_deref(),
        body.snoozed_until,
        body.snoozed_by.as_deref().unwrap_or("api"),
    );
    match app.store.create_snooze(&snooze).await {
        Ok(()) => created(json!(snooze)),
        Err(e) => internal(e),
    }
}

async fn api_snooze_delete(State(app): State<ApiState>, Path(id): Path<String>) -> ApiResponse {
    match app.store.delete_snooze(&id).await {
        Ok(true) => ok(json!({"deleted": id})),
        Ok(false) => not_found("snooze", &id),
        Err(e) => internal(e),
    }
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

async fn api_sequence_templates_list(
    State(app): State<ApiState>,
    Query(q): Query<ListQuery>,
) -> ApiResponse {
    match app
        .store
        .list_sequence_templates(Page::new(q.limit, q.offset))
        .await
    {
        Ok(templates) => ok_list(templates),
        Err(e) => internal(e),
    }
}

async fn api_sequence_template_get(
    State(app): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResponse {
    match app.store.get_sequence_template(&id).await {
        Ok(Some(template)) => ok(json!(template)),
        Ok(None) => not_found("sequence template", &id),
        Err(e) => internal(e),
    }
}

async fn api_sequence_templates_action(
    State(app): State<ApiState>,
    Json(body): Json<ActionBody>,
) -> ApiResponse {
    match body.action.as_str() {
        "create" => {
            let template: SequenceTemplate = match hydrate_new(body.data) {
                Ok(template) => template,
                Err(e) => return bad_request(e),
            };
            match app.store.create_sequence_template(&template).await {
                Ok(()) => created(json!(template)),
                Err(e) => internal(e),
            }
        }
        other => bad_request(format!("unknown action: {other}")),
    }
}

async fn api_sequence_template_update(
    State(app): State<ApiState>,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> ApiResponse {
    let current = match app.store.get_sequence_template(&id).await {
        Ok(Some(template)) => template,
        Ok(None) => return not_found("sequence template", &id),
        Err(e) => return internal(e),
    };
    let updated: SequenceTemplate = match merge_patch(&current, patch) {
        Ok(template) => template,
        Err(e) => return bad_request(e),
    };
    match app.store.update_sequence_template(&updated).await {
        Ok(true) => ok(json!(updated)),
        Ok(false) => not_found("sequence template", &id),
        Err(e) => internal(e),
    }
}

async fn api_sequence_template_delete(
    State(app): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResponse {
    match app.store.delete_sequence_template(&id).await {
        Ok(true) => ok(json!({"deleted": id})),
        Ok(false) => not_found("sequence template", &id),
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
struct EnrollmentListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    template_id: Option<String>,
    account_id: Option<String>,
}

async fn api_enrollments_list(
    State(app): State<ApiState>,
    Query(q): Query<EnrollmentListQuery>,
) -> ApiResponse {
    let filter = EnrollmentFilter {
        template_id: q.template_id,
        account_id: q.account_id,
    };
    match app
        .store
        .list_enrollments(&filter, Page::new(q.limit, q.offset))
        .await
    {
        Ok(enrollments) => ok_list(enrollments),
        Err(e) => internal(e),
    }
}

async fn api_enrollment_delete(
    State(app): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResponse {
    match app.store.delete_enrollment(&id).await {
        Ok(true) => ok(json!({"deleted": id})),
        Ok(false) => not_found("enrollment", &id),
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
struct EnrollBody {
    template_id: String,
    account_id: String,
    #[serde(default)]
    started_date: Option<NaiveDate>,
}

/// Enroll an account in a sequence and expand the task chain.
async fn api_enroll(State(app): State<ApiState>, Json(body): Json<EnrollBody>) -> ApiResponse {
    match app.store.get_sequence_template(&body.template_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("sequence template", &body.template_id),
        Err(e) => return internal(e),
    }
    match app.store.get_account(&body.account_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("account", &body.account_id),
        Err(e) => return internal(e),
    }
    let started = body.started_date.unwrap_or_else(|| Utc::now().date_naive());
    match app
        .expander
        .enroll(&body.template_id, &body.account_id, started)
        .await
    {
        Ok((enrollment, tasks)) => created(json!({"enrollment": enrollment, "tasks": tasks})),
        Err(e) => internal(e),
    }
}

// ---------------------------------------------------------------------------
// Scorecards
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ScorecardTemplateListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    /// Defaults to current versions only; pass current=false for history.
    current: Option<bool>,
}

async fn api_scorecard_templates_list(
    State(app): State<ApiState>,
    Query(q): Query<ScorecardTemplateListQuery>,
) -> ApiResponse {
    let current_only = q.current.unwrap_or(true);
    match app
        .store
        .list_scorecard_templates(current_only, Page::new(q.limit, q.offset))
        .await
    {
        Ok(templates) => ok_list(templates),
        Err(e) => internal(e),
    }
}

async fn api_scorecard_template_get(
    State(app): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResponse {
    match app.store.get_scorecard_template(&id).await {
        Ok(Some(template)) => ok(json!(template)),
        Ok(None) => not_found("scorecard template", &id),
        Err(e) => internal(e),
    }
}

async fn api_scorecard_templates_action(
    State(app): State<ApiState>,
    Json(body): Json<ActionBody>,
) -> ApiResponse {
    match body.action.as_str() {
        "create" => {
            let template: ScorecardTemplate = match hydrate_new(body.data) {
                Ok(template) => template,
                Err(e) => return bad_request(e),
            };
            match app.store.create_scorecard_template(&template).await {
                Ok(()) => created(json!(template)),
                Err(e) => internal(e),
            }
        }
        "update_with_version" => {
            let Some(id) = body.data.get("id").and_then(Value::as_str).map(String::from)
            else {
                return bad_request("update_with_version needs the id of the current version");
            };
            let current = match app.store.get_scorecard_template(&id).await {
                Ok(Some(template)) => template,
                Ok(None) => return not_found("scorecard template", &id),
                Err(e) => return internal(e),
            };
            let name = body
                .data
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(&current.name)
                .to_string();
            let questions: Vec<ScorecardQuestion> = match body.data.get("questions") {
                Some(raw) => match serde_json::from_value(raw.clone()) {
                    Ok(questions) => questions,
                    Err(e) => return bad_request(e),
                },
                None => current.questions.clone(),
            };
            let mut revision = current.next_version(&name, questions);
            if let Some(threshold) = body.data.get("pass_threshold").and_then(Value::as_f64) {
                revision.pass_threshold = threshold;
            }
            match app.store.publish_template_revision(&revision).await {
                Ok(()) => {
                    info!(
                        template_id = %revision.id,
                        version = revision.version_number,
                        "published scorecard template revision"
                    );
                    created(json!(revision))
                }
                Err(e) => internal(e),
            }
        }
        other => bad_request(format!("unknown action: {other}")),
    }
}

async fn api_scorecard_template_delete(
    State(app): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResponse {
    match app.store.delete_scorecard_template(&id).await {
        Ok(true) => ok(json!({"deleted": id})),
        Ok(false) => not_found("scorecard template", &id),
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
struct ResponseListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    account_id: Option<String>,
    template_id: Option<String>,
}

async fn api_scorecard_responses_list(
    State(app): State<ApiState>,
    Query(q): Query<ResponseListQuery>,
) -> ApiResponse {
    let filter = ResponseFilter {
        account_id: q.account_id,
        template_id: q.template_id,
    };
    match app
        .store
        .list_scorecard_responses(&filter, Page::new(q.limit, q.offset))
        .await
    {
        Ok(responses) => ok_list(responses),
        Err(e) => internal(e),
    }
}

async fn api_scorecard_response_delete(
    State(app): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResponse {
    match app.store.delete_scorecard_response(&id).await {
        Ok(true) => ok(json!({"deleted": id})),
        Ok(false) => not_found("scorecard response", &id),
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
struct SubmitBody {
    template_id: String,
    account_id: String,
    #[serde(default)]
    answers: BTreeMap<String, AnswerValue>,
}

async fn api_scorecard_submit(
    State(app): State<ApiState>,
    Json(body): Json<SubmitBody>,
) -> ApiResponse {
    let template = match app.store.get_scorecard_template(&body.template_id).await {
        Ok(Some(template)) => template,
        Ok(None) => return not_found("scorecard template", &body.template_id),
        Err(e) => return internal(e),
    };
    let response = score_response(&template, &body.account_id, body.answers, Utc::now());
    match app.store.create_scorecard_response(&response).await {
        Ok(()) => {
            info!(
                account_id = %response.account_id,
                score = response.normalized_score,
                pass = response.is_pass,
                "scorecard submitted"
            );
            created(json!(response))
        }
        Err(e) => internal(e),
    }
}

// ---------------------------------------------------------------------------
// Reconcile triggers
// ---------------------------------------------------------------------------

async fn api_trigger_sweep(
    State(app): State<ApiState>,
    Path(sweep): Path<String>,
) -> ApiResponse {
    let now = Utc::now();
    let outcome = match sweep.as_str() {
        "overdue" => app.reconciler.sweep_overdue(now.date_naive()).await,
        "renewals" => app.reconciler.sweep_renewals(now).await,
        "neglected" => app.reconciler.sweep_neglected(now).await,
        "year-end" => app.reconciler.sweep_year_end(now).await,
        "all" => app.reconciler.run_sweeps(now).await,
        other => return bad_request(format!("unknown sweep: {other}")),
    };
    ok(json!(outcome))
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

pub async fn start_api_server(state: ApiState, config: &HttpConfig) -> anyhow::Result<()> {
    let app = build_router(state, cors_layer(&config.cors_origins));

    let ip: std::net::IpAddr = config
        .bind
        .parse()
        .unwrap_or_else(|_| std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));
    let addr = std::net::SocketAddr::new(ip, config.port);
    info!("API server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("could not install ctrl-c handler: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
