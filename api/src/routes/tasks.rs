use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;

use taskdeck_core::tasks::{
    CreateTaskRequest, Task, TaskListResponse, UpdateTaskRequest, validate_description,
    validate_title,
};

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::tasks::TaskStore;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task)
                .put(update_task)
                .patch(update_task)
                .delete(delete_task),
        )
        .route("/tasks/{id}/complete", patch(toggle_complete))
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ListTasksParams {
    /// Filter by completion status; omit for all tasks
    pub completed: Option<bool>,
}

#[utoipa::path(
    post,
    path = "/tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 422, description = "Validation error", body = taskdeck_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "tasks"
)]
pub async fn create_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_title(&req.title).map_err(|message| field_error(message, "title"))?;
    validate_description(&req.description).map_err(|message| field_error(message, "description"))?;

    let task = TaskStore::new(&state.db).create(&user.user_id, &req).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    get,
    path = "/tasks",
    params(ListTasksParams),
    responses(
        (status = 200, description = "Tasks for the current user", body = TaskListResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "tasks"
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<ListTasksParams>,
) -> Result<Json<TaskListResponse>, AppError> {
    let tasks = TaskStore::new(&state.db)
        .list(&user.user_id, params.completed)
        .await?;
    let total = tasks.len();
    Ok(Json(TaskListResponse { tasks, total }))
}

#[utoipa::path(
    get,
    path = "/tasks/{id}",
    params(("id" = i64, Path, description = "Task identifier")),
    responses(
        (status = 200, description = "Task", body = Task),
        (status = 404, description = "Task not found", body = taskdeck_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "tasks"
)]
pub async fn get_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    let task = TaskStore::new(&state.db)
        .get(id, &user.user_id)
        .await?
        .ok_or_else(|| task_not_found(id))?;
    Ok(Json(task))
}

#[utoipa::path(
    put,
    path = "/tasks/{id}",
    params(("id" = i64, Path, description = "Task identifier")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Updated task", body = Task),
        (status = 404, description = "Task not found", body = taskdeck_core::error::ApiError),
        (status = 422, description = "Validation error", body = taskdeck_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "tasks"
)]
pub async fn update_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    if let Some(title) = &req.title {
        validate_title(title).map_err(|message| field_error(message, "title"))?;
    }
    if let Some(description) = &req.description {
        validate_description(description).map_err(|message| field_error(message, "description"))?;
    }

    let task = TaskStore::new(&state.db)
        .update(id, &user.user_id, &req)
        .await?
        .ok_or_else(|| task_not_found(id))?;
    Ok(Json(task))
}

/// Flips completion status rather than setting it, so the same request
/// reopens a finished task.
#[utoipa::path(
    patch,
    path = "/tasks/{id}/complete",
    params(("id" = i64, Path, description = "Task identifier")),
    responses(
        (status = 200, description = "Task with completion toggled", body = Task),
        (status = 404, description = "Task not found", body = taskdeck_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "tasks"
)]
pub async fn toggle_complete(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    let task = TaskStore::new(&state.db)
        .toggle_completion(id, &user.user_id)
        .await?
        .ok_or_else(|| task_not_found(id))?;
    Ok(Json(task))
}

/// Idempotent: deleting an absent or foreign task still returns 204.
#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    params(("id" = i64, Path, description = "Task identifier")),
    responses(
        (status = 204, description = "Task deleted (or was already absent)")
    ),
    security(("bearer_auth" = [])),
    tag = "tasks"
)]
pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    TaskStore::new(&state.db).delete(id, &user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn task_not_found(id: i64) -> AppError {
    AppError::NotFound {
        message: format!("Task {id} not found"),
    }
}

fn field_error(message: String, field: &str) -> AppError {
    AppError::Validation {
        message,
        field: Some(field.to_string()),
        received: None,
    }
}
