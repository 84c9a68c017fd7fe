use chrono::{DateTime, Utc};
use sqlx::PgPool;
use taskdeck_core::tasks::{CreateTaskRequest, Task, UpdateTaskRequest};

/// Ownership-scoped task persistence. Every query is conjoined with a
/// `user_id` equality filter; a row belonging to another owner is
/// indistinguishable from a missing one.
pub struct TaskStore<'a> {
    pool: &'a PgPool,
}

impl<'a> TaskStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: &str, req: &CreateTaskRequest) -> Result<Task, sqlx::Error> {
        let row = sqlx::query_as::<_, TaskRow>(
            "INSERT INTO tasks (user_id, title, description, completed) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, user_id, title, description, completed, created_at, updated_at",
        )
        .bind(user_id)
        .bind(req.title.trim())
        .bind(req.description.trim())
        .bind(req.completed)
        .fetch_one(self.pool)
        .await?;

        tracing::info!(task_id = row.id, user_id = %user_id, "created task");
        Ok(row.into_task())
    }

    pub async fn get(&self, id: i64, user_id: &str) -> Result<Option<Task>, sqlx::Error> {
        let row = sqlx::query_as::<_, TaskRow>(
            "SELECT id, user_id, title, description, completed, created_at, updated_at \
             FROM tasks WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(TaskRow::into_task))
    }

    pub async fn list(
        &self,
        user_id: &str,
        completed: Option<bool>,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT id, user_id, title, description, completed, created_at, updated_at \
             FROM tasks \
             WHERE user_id = $1 AND ($2::boolean IS NULL OR completed = $2) \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(completed)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(TaskRow::into_task).collect())
    }

    /// Apply only the provided fields. `updated_at` is refreshed even when
    /// no field changes. Returns None when no row matches id+owner.
    pub async fn update(
        &self,
        id: i64,
        user_id: &str,
        req: &UpdateTaskRequest,
    ) -> Result<Option<Task>, sqlx::Error> {
        let row = sqlx::query_as::<_, TaskRow>(
            "UPDATE tasks SET \
                 title = COALESCE($3, title), \
                 description = COALESCE($4, description), \
                 completed = COALESCE($5, completed), \
                 updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, title, description, completed, created_at, updated_at",
        )
        .bind(id)
        .bind(user_id)
        .bind(req.title.as_deref().map(str::trim))
        .bind(req.description.as_deref().map(str::trim))
        .bind(req.completed)
        .fetch_optional(self.pool)
        .await?;

        if row.is_some() {
            tracing::info!(task_id = id, user_id = %user_id, "updated task");
        }
        Ok(row.map(TaskRow::into_task))
    }

    pub async fn toggle_completion(
        &self,
        id: i64,
        user_id: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        let row = sqlx::query_as::<_, TaskRow>(
            "UPDATE tasks SET completed = NOT completed, updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, title, description, completed, created_at, updated_at",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(TaskRow::into_task))
    }

    /// Idempotent: deleting an absent or foreign row returns false rather
    /// than erroring.
    pub async fn delete(&self, id: i64, user_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(task_id = id, user_id = %user_id, "deleted task");
        }
        Ok(deleted)
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    user_id: String,
    title: String,
    description: String,
    completed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_task(self) -> Task {
        Task {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            completed: self.completed,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
