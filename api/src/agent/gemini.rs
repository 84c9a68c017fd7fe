use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{AgentError, ChatModel, SYSTEM_PROMPT};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// One turn in the model transcript. Roles are "user" and "model";
/// tool results travel back as a "user" turn of functionResponse parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Content {
            role: "user".to_string(),
            parts,
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Content {
            role: "model".to_string(),
            parts,
        }
    }

    /// Concatenated text parts, or None when the turn has no text.
    pub fn text(&self) -> Option<String> {
        let text: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text.join(""))
        }
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts
            .iter()
            .filter_map(|p| p.function_call.as_ref())
            .collect()
    }
}

/// A single content part: plain text, a tool-call request from the model,
/// or a tool result fed back to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn function_response(name: impl Into<String>, response: Value) -> Self {
        Part {
            function_response: Some(FunctionResponse {
                name: name.into(),
                response,
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: SystemInstruction,
    contents: &'a [Content],
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Serialize)]
struct FunctionDeclaration {
    name: &'static str,
    description: &'static str,
    parameters: Value,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// The fixed seven-operation tool schema exposed to the model.
fn tool_declarations() -> Vec<FunctionDeclaration> {
    vec![
        FunctionDeclaration {
            name: "add_task",
            description: "Add a new task for the user",
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "title": {"type": "STRING", "description": "The task title (required)"},
                    "description": {"type": "STRING", "description": "Optional task description"},
                },
                "required": ["title"],
            }),
        },
        FunctionDeclaration {
            name: "list_tasks",
            description: "List tasks for the user with optional status filter",
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "status": {
                        "type": "STRING",
                        "description": "Filter by status: 'pending', 'completed', or 'all'",
                        "enum": ["pending", "completed", "all"],
                    },
                },
            }),
        },
        FunctionDeclaration {
            name: "update_task",
            description: "Update task details (title and/or description)",
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "task_id": {"type": "INTEGER", "description": "ID of the task to update"},
                    "title": {"type": "STRING", "description": "New task title"},
                    "description": {"type": "STRING", "description": "New task description"},
                },
                "required": ["task_id"],
            }),
        },
        FunctionDeclaration {
            name: "complete_task",
            description: "Mark a task as completed",
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "task_id": {"type": "INTEGER", "description": "ID of the task to complete"},
                },
                "required": ["task_id"],
            }),
        },
        FunctionDeclaration {
            name: "delete_task",
            description: "Delete a task by ID",
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "task_id": {"type": "INTEGER", "description": "ID of the task to delete"},
                },
                "required": ["task_id"],
            }),
        },
        FunctionDeclaration {
            name: "delete_task_by_name",
            description: "Delete a task by its name/title. Use this when the user refers \
                          to a task by name instead of ID.",
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "task_name": {
                        "type": "STRING",
                        "description": "Name/title of the task to delete (partial match supported)",
                    },
                },
                "required": ["task_name"],
            }),
        },
        FunctionDeclaration {
            name: "complete_task_by_name",
            description: "Mark a task as completed by its name/title. Use this when the \
                          user refers to a task by name instead of ID.",
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "task_name": {
                        "type": "STRING",
                        "description": "Name/title of the task to complete (partial match supported)",
                    },
                },
                "required": ["task_name"],
            }),
        },
    ]
}

/// Classify a provider failure: quota exhaustion is surfaced distinctly so
/// the HTTP boundary can map it to 429 instead of a generic 500.
fn classify_provider_error(status: Option<u16>, detail: &str) -> AgentError {
    let quota = status == Some(429)
        || detail.contains("RESOURCE_EXHAUSTED")
        || detail.to_lowercase().contains("quota");
    if quota {
        AgentError::QuotaExceeded(detail.to_string())
    } else {
        AgentError::Provider(detail.to_string())
    }
}

/// Hosted-model client for the Gemini generateContent API.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        GeminiClient {
            http: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

impl ChatModel for GeminiClient {
    async fn generate(&self, contents: &[Content]) -> Result<Content, AgentError> {
        let request = GenerateContentRequest {
            system_instruction: SystemInstruction {
                parts: vec![Part::text(SYSTEM_PROMPT)],
            },
            contents,
            tools: vec![Tool {
                function_declarations: tool_declarations(),
            }],
        };

        let url = format!(
            "{GEMINI_BASE_URL}/models/{model}:generateContent",
            model = self.model
        );
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_provider_error(None, &format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "Gemini API error");
            return Err(classify_provider_error(
                Some(status.as_u16()),
                &format!("status {status}: {body}"),
            ));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("invalid response body: {e}")))?;

        Ok(parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .unwrap_or_else(|| Content::model(Vec::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_is_quota_exhaustion() {
        assert!(matches!(
            classify_provider_error(Some(429), "too many requests"),
            AgentError::QuotaExceeded(_)
        ));
    }

    #[test]
    fn resource_exhausted_marker_is_quota_exhaustion() {
        assert!(matches!(
            classify_provider_error(Some(400), "RESOURCE_EXHAUSTED: free tier limit"),
            AgentError::QuotaExceeded(_)
        ));
        assert!(matches!(
            classify_provider_error(None, "Quota exceeded for model"),
            AgentError::QuotaExceeded(_)
        ));
    }

    #[test]
    fn other_faults_are_generic_provider_errors() {
        assert!(matches!(
            classify_provider_error(Some(500), "internal error"),
            AgentError::Provider(_)
        ));
        assert!(matches!(
            classify_provider_error(None, "connection reset by peer"),
            AgentError::Provider(_)
        ));
    }

    #[test]
    fn parts_serialize_in_camel_case() {
        let part = Part::function_response("add_task", json!({"result": {"id": 1}}));
        let value = serde_json::to_value(&part).unwrap();
        assert!(value.get("functionResponse").is_some());
        assert!(value.get("function_response").is_none());
    }

    #[test]
    fn function_calls_deserialize_from_camel_case() {
        let content: Content = serde_json::from_value(json!({
            "role": "model",
            "parts": [{"functionCall": {"name": "add_task", "args": {"title": "Buy milk"}}}],
        }))
        .unwrap();
        let calls = content.function_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "add_task");
        assert_eq!(calls[0].args.get("title"), Some(&json!("Buy milk")));
    }

    #[test]
    fn declared_tool_registry_is_fixed() {
        let names: Vec<&str> = tool_declarations().iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            [
                "add_task",
                "list_tasks",
                "update_task",
                "complete_task",
                "delete_task",
                "delete_task_by_name",
                "complete_task_by_name",
            ]
        );
    }

    #[test]
    fn content_text_joins_text_parts_only() {
        let content = Content::model(vec![
            Part::text("Hello"),
            Part::function_response("x", json!({})),
            Part::text(" world"),
        ]);
        assert_eq!(content.text().as_deref(), Some("Hello world"));
        assert_eq!(Content::model(Vec::new()).text(), None);
    }
}
