//! HTTP handlers for `/api/*`.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::Caller;
use crate::error::AppError;
use crate::server::AppState;
use crate::stats::{self, DashboardStats, Performance, Period};
use crate::store::{TaskFilter, TaskPage};
use crate::task::{NewTask, Task, TaskCategory, TaskPatch, TaskPriority, TaskStatus};
use crate::user::{NewUser, User, UserStats, UserWithStats};

type ApiResult<T> = Result<T, AppError>;

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

/// Empty bodies decode to `T::default()`.
fn optional_body<T: DeserializeOwned + Default>(bytes: &Bytes) -> ApiResult<T> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes).map_err(|e| AppError::Validation(format!("Invalid JSON body: {e}")))
}

/// [`Query`] that rejects with a JSON `{error}` body.
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|rejection| AppError::Validation(rejection.body_text()))
    }
}

/// The `{id}` path segment, rejecting with a JSON `{error}` body.
#[derive(Debug)]
pub struct TaskId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for TaskId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<String>::from_request_parts(parts, state)
            .await
            .map(|Path(id)| Self(id))
            .map_err(|rejection| AppError::Validation(rejection.body_text()))
    }
}

// Tasks

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    status: Option<TaskStatus>,
    priority: Option<TaskPriority>,
    category: Option<TaskCategory>,
    assigned_to: Option<String>,
    search: Option<String>,
    due_from: Option<DateTime<Utc>>,
    due_to: Option<DateTime<Utc>>,
    page: Option<usize>,
    page_size: Option<usize>,
}

/// Users are always pinned to their own tasks; admins may narrow by assignee.
fn scoped_filter(caller: &Caller, assigned_to: Option<String>) -> TaskFilter {
    TaskFilter {
        assigned_to: if caller.is_admin() {
            assigned_to
        } else {
            Some(caller.user_id.clone())
        },
        ..TaskFilter::default()
    }
}

/// GET /api/tasks
pub async fn list_tasks(
    caller: Caller,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Json<TaskPage>> {
    let filter = TaskFilter {
        status: query.status,
        priority: query.priority,
        category: query.category,
        search: query.search,
        due_from: query.due_from,
        due_to: query.due_to,
        ..scoped_filter(&caller, query.assigned_to)
    };
    let page_size = state.page_size(query.page_size);
    Ok(Json(state.store.list_tasks(&filter, query.page.unwrap_or(1), page_size)))
}

/// POST /api/tasks
pub async fn create_task(
    caller: Caller,
    State(state): State<AppState>,
    payload: Result<Json<NewTask>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    caller.require_admin()?;
    let input = json_body(payload)?;
    let task = state
        .write_store(move |store| store.add_task(input, &caller.user_id, Utc::now()))
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    caller: Caller,
    State(state): State<AppState>,
    TaskId(id): TaskId,
) -> ApiResult<Json<Task>> {
    let task = state
        .store
        .get_task(&id)
        .ok_or_else(|| AppError::task_not_found(&id))?;
    caller.require_view(&task)?;
    Ok(Json(task))
}

/// What a caller may change on `task`. Admins edit anything; the assignee
/// only responds to the task and reports hours.
fn authorize_patch(caller: &Caller, patch: &TaskPatch, task: &Task) -> ApiResult<()> {
    if caller.is_admin() {
        return Ok(());
    }
    caller.require_assignee(task)?;
    if !patch.is_assignee_patch() {
        return Err(AppError::Forbidden("Only admins can edit task details".into()));
    }
    match patch.status {
        Some(TaskStatus::Pending | TaskStatus::Cancelled) => Err(AppError::Forbidden(
            "Only admins can reassign or cancel tasks".into(),
        )),
        _ => Ok(()),
    }
}

async fn update(state: &AppState, caller: Caller, id: String, patch: TaskPatch) -> ApiResult<Json<Task>> {
    let task = state
        .write_store(move |store| {
            store.update_task(&id, &patch, Utc::now(), |task| authorize_patch(&caller, &patch, task))
        })
        .await?;
    Ok(Json(task))
}

/// PATCH /api/tasks/{id}
pub async fn patch_task(
    caller: Caller,
    State(state): State<AppState>,
    TaskId(id): TaskId,
    payload: Result<Json<TaskPatch>, JsonRejection>,
) -> ApiResult<Json<Task>> {
    let patch = json_body(payload)?;
    update(&state, caller, id, patch).await
}

#[derive(Debug, Deserialize)]
pub struct PatchByBody {
    #[serde(default)]
    id: String,
    #[serde(flatten)]
    patch: TaskPatch,
}

/// PATCH /api/tasks with the task id inside the body.
pub async fn patch_task_by_body(
    caller: Caller,
    State(state): State<AppState>,
    payload: Result<Json<PatchByBody>, JsonRejection>,
) -> ApiResult<Json<Task>> {
    let PatchByBody { id, patch } = json_body(payload)?;
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::Validation("id is required".into()));
    }
    update(&state, caller, id.to_string(), patch).await
}

/// DELETE /api/tasks/{id}
pub async fn delete_task(
    caller: Caller,
    State(state): State<AppState>,
    TaskId(id): TaskId,
) -> ApiResult<Json<Value>> {
    caller.require_admin()?;
    let removed = state.write_store(move |store| store.delete_task(&id)).await?;
    Ok(Json(json!({ "success": true, "id": removed.id })))
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    id: Option<String>,
}

/// DELETE /api/tasks?id=
pub async fn delete_task_by_query(
    caller: Caller,
    state: State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> ApiResult<Json<Value>> {
    let id = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::Validation("id is required".into()))?;
    delete_task(caller, state, TaskId(id)).await
}

// Task actions

async fn respond(state: &AppState, caller: Caller, id: String, patch: TaskPatch) -> ApiResult<Json<Task>> {
    let task = state
        .write_store(move |store| {
            store.update_task(&id, &patch, Utc::now(), |task| caller.require_assignee(task))
        })
        .await?;
    Ok(Json(task))
}

/// POST /api/tasks/{id}/accept
pub async fn accept_task(
    caller: Caller,
    State(state): State<AppState>,
    TaskId(id): TaskId,
) -> ApiResult<Json<Task>> {
    respond(&state, caller, id, TaskPatch::status(TaskStatus::Accepted)).await
}

#[derive(Debug, Default, Deserialize)]
pub struct DeclineBody {
    #[serde(default)]
    reason: String,
}

/// POST /api/tasks/{id}/decline
pub async fn decline_task(
    caller: Caller,
    State(state): State<AppState>,
    TaskId(id): TaskId,
    body: Bytes,
) -> ApiResult<Json<Task>> {
    let DeclineBody { reason } = optional_body(&body)?;
    let patch = TaskPatch {
        decline_reason: Some(reason),
        ..TaskPatch::status(TaskStatus::Declined)
    };
    respond(&state, caller, id, patch).await
}

/// POST /api/tasks/{id}/start
pub async fn start_task(
    caller: Caller,
    State(state): State<AppState>,
    TaskId(id): TaskId,
) -> ApiResult<Json<Task>> {
    respond(&state, caller, id, TaskPatch::status(TaskStatus::InProgress)).await
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteBody {
    actual_hours: Option<f64>,
}

/// POST /api/tasks/{id}/complete
pub async fn complete_task(
    caller: Caller,
    State(state): State<AppState>,
    TaskId(id): TaskId,
    body: Bytes,
) -> ApiResult<Json<Task>> {
    let CompleteBody { actual_hours } = optional_body(&body)?;
    let patch = TaskPatch {
        actual_hours,
        ..TaskPatch::status(TaskStatus::Completed)
    };
    respond(&state, caller, id, patch).await
}

/// POST /api/tasks/{id}/cancel
pub async fn cancel_task(
    caller: Caller,
    State(state): State<AppState>,
    TaskId(id): TaskId,
) -> ApiResult<Json<Task>> {
    caller.require_admin()?;
    let task = state
        .write_store(move |store| {
            store.update_task(&id, &TaskPatch::status(TaskStatus::Cancelled), Utc::now(), |_| Ok(()))
        })
        .await?;
    Ok(Json(task))
}

// Reporting

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceQuery {
    period: Option<String>,
    user_id: Option<String>,
}

/// GET /api/performance?period=week|month|6months
pub async fn performance(
    caller: Caller,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PerformanceQuery>,
) -> ApiResult<Json<Performance>> {
    let period = Period::parse(query.period.as_deref())?;
    let target = match query.user_id {
        Some(id) if id != caller.user_id => {
            caller.require_admin()?;
            id
        }
        _ => caller.user_id.clone(),
    };
    let filter = TaskFilter {
        assigned_to: Some(target),
        ..TaskFilter::default()
    };
    let tasks = state.store.tasks_where(&filter);
    Ok(Json(stats::performance(&tasks, period, Utc::now())))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    assigned_to: Option<String>,
}

/// GET /api/stats
pub async fn dashboard_stats(
    caller: Caller,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<StatsQuery>,
) -> ApiResult<Json<DashboardStats>> {
    let tasks = state.store.tasks_where(&scoped_filter(&caller, query.assigned_to));
    Ok(Json(stats::dashboard(&tasks, Utc::now())))
}

// Users

fn with_stats(state: &AppState, user: User) -> UserWithStats {
    let filter = TaskFilter {
        assigned_to: Some(user.id.clone()),
        ..TaskFilter::default()
    };
    let tasks = state.store.tasks_where(&filter);
    UserWithStats {
        stats: UserStats::compute(&tasks, Utc::now()),
        user,
    }
}

/// GET /api/users
pub async fn list_users(
    caller: Caller,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<UserWithStats>>> {
    caller.require_admin()?;
    let users = state
        .store
        .users()
        .into_iter()
        .map(|u| with_stats(&state, u))
        .collect();
    Ok(Json(users))
}

/// POST /api/users
pub async fn create_user(
    caller: Caller,
    State(state): State<AppState>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<User>)> {
    caller.require_admin()?;
    let input = json_body(payload)?;
    let user = state
        .write_store(move |store| store.add_user(input, Utc::now()))
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/users/me
pub async fn current_user(
    caller: Caller,
    State(state): State<AppState>,
) -> ApiResult<Json<UserWithStats>> {
    let user = state
        .store
        .get_user(&caller.user_id)
        .ok_or_else(|| AppError::user_not_found(&caller.user_id))?;
    Ok(Json(with_stats(&state, user)))
}

// Reminders

#[derive(Debug, Default, Deserialize)]
pub struct SmsReminder {
    #[serde(default)]
    phone: String,
    #[serde(default)]
    message: String,
}

/// POST /api/send-sms-reminder
pub async fn send_sms_reminder(
    _caller: Caller,
    State(state): State<AppState>,
    payload: Result<Json<SmsReminder>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let SmsReminder { phone, message } = json_body(payload)?;
    if phone.trim().is_empty() || message.trim().is_empty() {
        return Err(AppError::Validation("phone and message are required".into()));
    }
    state.sms.send(phone.trim(), &message).await?;
    Ok(Json(json!({ "success": true })))
}
