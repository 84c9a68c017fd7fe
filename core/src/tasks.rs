use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Maximum length of a task title in characters.
pub const TITLE_MAX_LEN: usize = 200;
/// Maximum length of a task description in characters.
pub const DESCRIPTION_MAX_LEN: usize = 1000;

/// A task owned by a single user. The owner is an opaque identifier taken
/// from the verified JWT `sub` claim — there is no foreign key to a user
/// table, and every query against tasks is filtered by it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Task {
    /// Unique task identifier (server-assigned)
    pub id: i64,
    /// Owner identifier from the JWT (opaque, no FK constraint)
    pub user_id: String,
    /// Task title (1–200 characters)
    pub title: String,
    /// Optional task details (up to 1000 characters)
    pub description: String,
    /// Completion status
    pub completed: bool,
    /// Creation timestamp (UTC)
    pub created_at: DateTime<Utc>,
    /// Last update timestamp (UTC) — refreshed on every mutation
    pub updated_at: DateTime<Utc>,
}

/// Request to create a task. Owner and timestamps are server-assigned.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
}

/// Partial update — only the provided fields are applied. A field that is
/// absent (or null) leaves the stored value untouched. The update always
/// refreshes `updated_at`, even when no field changes.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
    pub total: usize,
}

/// Validate a task title: non-blank, at most 200 characters.
pub fn validate_title(title: &str) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("title must not be empty".to_string());
    }
    if title.chars().count() > TITLE_MAX_LEN {
        return Err(format!("title must be at most {TITLE_MAX_LEN} characters"));
    }
    Ok(())
}

/// Validate a task description: at most 1000 characters.
pub fn validate_description(description: &str) -> Result<(), String> {
    if description.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(format!(
            "description must be at most {DESCRIPTION_MAX_LEN} characters"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_must_not_be_blank() {
        assert!(validate_title("Buy milk").is_ok());
        assert!(validate_title("").is_err());
        assert!(validate_title("   ").is_err());
    }

    #[test]
    fn title_length_is_bounded_in_characters() {
        assert!(validate_title(&"x".repeat(TITLE_MAX_LEN)).is_ok());
        assert!(validate_title(&"x".repeat(TITLE_MAX_LEN + 1)).is_err());
        // multi-byte characters count as one
        assert!(validate_title(&"ü".repeat(TITLE_MAX_LEN)).is_ok());
    }

    #[test]
    fn description_may_be_empty_but_is_bounded() {
        assert!(validate_description("").is_ok());
        assert!(validate_description(&"x".repeat(DESCRIPTION_MAX_LEN)).is_ok());
        assert!(validate_description(&"x".repeat(DESCRIPTION_MAX_LEN + 1)).is_err());
    }
}
