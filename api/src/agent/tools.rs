use serde::Serialize;
use serde_json::{Map, Value, json};
use sqlx::PgPool;
use taskdeck_core::tasks::{CreateTaskRequest, Task, UpdateTaskRequest, validate_title};

use crate::store::tasks::TaskStore;

/// Uniform outcome envelope returned by every tool operation. Tools never
/// propagate errors into the agent loop; any fault becomes a failed result
/// the model can explain or recover from.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        ToolResult {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        ToolResult {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Failure that still carries a data payload, e.g. disambiguation
    /// candidates for an ambiguous name match.
    pub fn fail_with(error: impl Into<String>, data: Value) -> Self {
        ToolResult {
            success: false,
            data: Some(data),
            error: Some(error.into()),
        }
    }
}

/// Seam between the agent loop and storage. The production implementation
/// is `TaskTools`; tests substitute a scripted fake.
pub trait ToolExecutor: Send + Sync {
    fn execute(
        &self,
        name: &str,
        args: Map<String, Value>,
    ) -> impl Future<Output = ToolResult> + Send;
}

/// The only layer permitted to touch the data store on behalf of the agent.
/// Owner identity comes from the verified JWT, never from model output.
pub struct TaskTools<'a> {
    pool: &'a PgPool,
    user_id: &'a str,
}

impl<'a> TaskTools<'a> {
    pub fn new(pool: &'a PgPool, user_id: &'a str) -> Self {
        Self { pool, user_id }
    }

    fn store(&self) -> TaskStore<'a> {
        TaskStore::new(self.pool)
    }

    async fn add_task(&self, args: &Map<String, Value>) -> ToolResult {
        let title = str_arg(args, "title").trim().to_string();
        if let Err(msg) = validate_title(&title) {
            return ToolResult::fail(format!("Task {msg}"));
        }
        let description = str_arg(args, "description").trim().to_string();

        let req = CreateTaskRequest {
            title,
            description,
            completed: false,
        };
        match self.store().create(self.user_id, &req).await {
            Ok(task) => ToolResult::ok(json!({
                "id": task.id,
                "title": task.title,
                "description": task.description,
                "completed": task.completed,
            })),
            Err(err) => {
                tracing::error!(error = %err, "add_task failed");
                ToolResult::fail("Failed to add task")
            }
        }
    }

    async fn list_tasks(&self, args: &Map<String, Value>) -> ToolResult {
        let status = str_arg(args, "status");
        let completed = match status {
            "pending" => Some(false),
            "completed" => Some(true),
            _ => None,
        };

        match self.store().list(self.user_id, completed).await {
            Ok(tasks) => ToolResult::ok(json!({
                "tasks": tasks
                    .iter()
                    .map(|t| json!({
                        "id": t.id,
                        "title": t.title,
                        "description": t.description,
                        "completed": t.completed,
                    }))
                    .collect::<Vec<_>>(),
                "total": tasks.len(),
                "filter": if status.is_empty() { "all" } else { status },
            })),
            Err(err) => {
                tracing::error!(error = %err, "list_tasks failed");
                ToolResult::fail("Failed to list tasks")
            }
        }
    }

    async fn update_task(&self, args: &Map<String, Value>) -> ToolResult {
        let Some(task_id) = id_arg(args) else {
            return ToolResult::fail("task_id is required");
        };

        let title = args
            .get("title")
            .and_then(Value::as_str)
            .map(|t| t.trim().to_string());
        if let Some(title) = &title {
            if let Err(msg) = validate_title(title) {
                return ToolResult::fail(format!("Task {msg}"));
            }
        }
        let description = args
            .get("description")
            .and_then(Value::as_str)
            .map(|d| d.trim().to_string());

        let req = UpdateTaskRequest {
            title,
            description,
            completed: None,
        };
        match self.store().update(task_id, self.user_id, &req).await {
            Ok(Some(task)) => ToolResult::ok(json!({
                "id": task.id,
                "title": task.title,
                "description": task.description,
                "completed": task.completed,
            })),
            Ok(None) => ToolResult::fail(format!(
                "Task {task_id} not found or you don't have permission"
            )),
            Err(err) => {
                tracing::error!(error = %err, "update_task failed");
                ToolResult::fail("Failed to update task")
            }
        }
    }

    async fn complete_task(&self, args: &Map<String, Value>) -> ToolResult {
        let Some(task_id) = id_arg(args) else {
            return ToolResult::fail("task_id is required");
        };

        let req = UpdateTaskRequest {
            completed: Some(true),
            ..Default::default()
        };
        match self.store().update(task_id, self.user_id, &req).await {
            Ok(Some(task)) => ToolResult::ok(json!({
                "id": task.id,
                "title": task.title,
                "completed": task.completed,
                "message": format!("Task '{}' marked as completed", task.title),
            })),
            Ok(None) => ToolResult::fail(format!(
                "Task {task_id} not found or you don't have permission"
            )),
            Err(err) => {
                tracing::error!(error = %err, "complete_task failed");
                ToolResult::fail("Failed to complete task")
            }
        }
    }

    async fn delete_task(&self, args: &Map<String, Value>) -> ToolResult {
        let Some(task_id) = id_arg(args) else {
            return ToolResult::fail("task_id is required");
        };

        let task = match self.store().get(task_id, self.user_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                return ToolResult::fail(format!(
                    "Task {task_id} not found or you don't have permission"
                ));
            }
            Err(err) => {
                tracing::error!(error = %err, "delete_task lookup failed");
                return ToolResult::fail("Failed to delete task");
            }
        };

        match self.store().delete(task_id, self.user_id).await {
            Ok(true) => ToolResult::ok(json!({
                "id": task_id,
                "title": task.title,
                "message": format!("Task '{}' has been deleted", task.title),
            })),
            Ok(false) => ToolResult::fail(format!("Failed to delete task {task_id}")),
            Err(err) => {
                tracing::error!(error = %err, "delete_task failed");
                ToolResult::fail("Failed to delete task")
            }
        }
    }

    async fn delete_task_by_name(&self, args: &Map<String, Value>) -> ToolResult {
        let task_name = str_arg(args, "task_name");
        let tasks = match self.store().list(self.user_id, None).await {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::error!(error = %err, "delete_task_by_name lookup failed");
                return ToolResult::fail("Failed to delete task");
            }
        };

        let task = match resolve_by_name(&tasks, task_name, false) {
            NameMatch::None => {
                return ToolResult::fail(format!("No task found matching '{task_name}'"));
            }
            NameMatch::Ambiguous(candidates) => {
                return ambiguous_result(task_name, &candidates, "delete");
            }
            NameMatch::One(task) => task.clone(),
        };

        match self.store().delete(task.id, self.user_id).await {
            Ok(true) => ToolResult::ok(json!({
                "id": task.id,
                "title": task.title,
                "message": format!("Task '{}' has been deleted", task.title),
            })),
            Ok(false) => ToolResult::fail(format!("Failed to delete task '{}'", task.title)),
            Err(err) => {
                tracing::error!(error = %err, "delete_task_by_name failed");
                ToolResult::fail("Failed to delete task")
            }
        }
    }

    async fn complete_task_by_name(&self, args: &Map<String, Value>) -> ToolResult {
        let task_name = str_arg(args, "task_name");
        let tasks = match self.store().list(self.user_id, None).await {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::error!(error = %err, "complete_task_by_name lookup failed");
                return ToolResult::fail("Failed to complete task");
            }
        };

        // only pending tasks are candidates for completion
        let task = match resolve_by_name(&tasks, task_name, true) {
            NameMatch::None => {
                return ToolResult::fail(format!("No pending task found matching '{task_name}'"));
            }
            NameMatch::Ambiguous(candidates) => {
                return ambiguous_result(task_name, &candidates, "complete");
            }
            NameMatch::One(task) => task.clone(),
        };

        let req = UpdateTaskRequest {
            completed: Some(true),
            ..Default::default()
        };
        match self.store().update(task.id, self.user_id, &req).await {
            Ok(Some(updated)) => ToolResult::ok(json!({
                "id": updated.id,
                "title": updated.title,
                "completed": true,
                "message": format!("Task '{}' marked as completed", updated.title),
            })),
            Ok(None) => ToolResult::fail(format!("Failed to complete task '{}'", task.title)),
            Err(err) => {
                tracing::error!(error = %err, "complete_task_by_name failed");
                ToolResult::fail("Failed to complete task")
            }
        }
    }
}

impl ToolExecutor for TaskTools<'_> {
    async fn execute(&self, name: &str, args: Map<String, Value>) -> ToolResult {
        let args_json = Value::Object(args.clone());
        tracing::info!(tool = name, args = %args_json, "dispatching tool");
        match name {
            "add_task" => self.add_task(&args).await,
            "list_tasks" => self.list_tasks(&args).await,
            "update_task" => self.update_task(&args).await,
            "complete_task" => self.complete_task(&args).await,
            "delete_task" => self.delete_task(&args).await,
            "delete_task_by_name" => self.delete_task_by_name(&args).await,
            "complete_task_by_name" => self.complete_task_by_name(&args).await,
            other => ToolResult::fail(format!("Unknown tool: {other}")),
        }
    }
}

fn str_arg<'m>(args: &'m Map<String, Value>, key: &str) -> &'m str {
    args.get(key).and_then(Value::as_str).unwrap_or("")
}

fn id_arg(args: &Map<String, Value>) -> Option<i64> {
    args.get("task_id").and_then(Value::as_i64)
}

enum NameMatch<'t> {
    None,
    One(&'t Task),
    Ambiguous(Vec<&'t Task>),
}

/// Case-insensitive substring match over the owner's tasks. With
/// `pending_only`, completed tasks are not considered.
fn resolve_by_name<'t>(tasks: &'t [Task], name: &str, pending_only: bool) -> NameMatch<'t> {
    let needle = name.trim().to_lowercase();
    let mut matches: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.title.to_lowercase().contains(&needle))
        .filter(|t| !pending_only || !t.completed)
        .collect();

    match matches.len() {
        0 => NameMatch::None,
        1 => NameMatch::One(matches.remove(0)),
        _ => NameMatch::Ambiguous(matches),
    }
}

/// Ambiguity is never resolved automatically: list the candidates so the
/// model can ask the user which one was meant, and take no action.
fn ambiguous_result(name: &str, candidates: &[&Task], action: &str) -> ToolResult {
    let listing = candidates
        .iter()
        .map(|t| format!("'{}' (ID: {})", t.title, t.id))
        .collect::<Vec<_>>()
        .join(", ");
    ToolResult::fail_with(
        format!(
            "Multiple tasks match '{name}': {listing}. Please specify which one to {action} \
             by using the exact name or ID."
        ),
        json!({
            "matching_tasks": candidates
                .iter()
                .map(|t| json!({"id": t.id, "title": t.title}))
                .collect::<Vec<_>>(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn task(id: i64, title: &str, completed: bool) -> Task {
        Task {
            id,
            user_id: "user-1".to_string(),
            title: title.to_string(),
            description: String::new(),
            completed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn name_match_is_case_insensitive_substring() {
        let tasks = vec![task(1, "Buy milk", false), task(2, "Call dentist", false)];
        assert!(matches!(
            resolve_by_name(&tasks, "MILK", false),
            NameMatch::One(t) if t.id == 1
        ));
        assert!(matches!(
            resolve_by_name(&tasks, "  dentist ", false),
            NameMatch::One(t) if t.id == 2
        ));
    }

    #[test]
    fn zero_matches_yields_none() {
        let tasks = vec![task(1, "Buy milk", false)];
        assert!(matches!(
            resolve_by_name(&tasks, "groceries", false),
            NameMatch::None
        ));
    }

    #[test]
    fn multiple_matches_yield_all_candidates() {
        let tasks = vec![
            task(1, "Buy milk", false),
            task(2, "Buy milk and eggs", false),
            task(3, "Call dentist", false),
        ];
        match resolve_by_name(&tasks, "buy milk", false) {
            NameMatch::Ambiguous(candidates) => {
                let ids: Vec<i64> = candidates.iter().map(|t| t.id).collect();
                assert_eq!(ids, [1, 2]);
            }
            _ => panic!("expected ambiguous match"),
        }
    }

    #[test]
    fn pending_only_skips_completed_tasks() {
        let tasks = vec![task(1, "Buy milk", true), task(2, "Buy milk again", false)];
        assert!(matches!(
            resolve_by_name(&tasks, "buy milk", true),
            NameMatch::One(t) if t.id == 2
        ));
        let all_done = vec![task(1, "Buy milk", true)];
        assert!(matches!(
            resolve_by_name(&all_done, "buy milk", true),
            NameMatch::None
        ));
    }

    #[test]
    fn ambiguous_result_lists_candidates_and_takes_no_action() {
        let t1 = task(1, "Buy milk", false);
        let t2 = task(2, "Buy milk and eggs", false);
        let result = ambiguous_result("buy milk", &[&t1, &t2], "delete");
        assert!(!result.success);
        let data = result.data.expect("candidates payload");
        let listed = data["matching_tasks"].as_array().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["id"], 1);
        assert_eq!(listed[1]["title"], "Buy milk and eggs");
        assert!(result.error.unwrap().contains("Multiple tasks match"));
    }

    #[tokio::test]
    async fn unknown_tools_fail_without_touching_storage() {
        // lazy pool never connects; the unknown-tool path must not query
        let pool = PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        let tools = TaskTools::new(&pool, "user-1");
        let result = tools.execute("rename_task", Map::new()).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Unknown tool: rename_task"));
        assert!(result.data.is_none());
    }

    #[test]
    fn id_arg_reads_integers_only() {
        let mut args = Map::new();
        args.insert("task_id".to_string(), json!(7));
        assert_eq!(id_arg(&args), Some(7));
        args.insert("task_id".to_string(), json!("7"));
        assert_eq!(id_arg(&args), None);
    }
}
