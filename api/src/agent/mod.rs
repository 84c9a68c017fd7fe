//! Bounded tool-calling loop between the hosted chat model and the task
//! tools. The model proposes function calls; this module executes them,
//! feeds the results back, and extracts the final text reply.

pub mod gemini;
pub mod tools;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use taskdeck_core::chat::{Message, MessageRole};
use thiserror::Error;

use gemini::{Content, Part};
use tools::ToolExecutor;

/// Hard cap on model round-trips per user message. Prevents a confused
/// model from looping on tool calls forever.
pub const MAX_ITERATIONS: usize = 5;

/// Reply used when the loop ends without the model producing any text.
pub const FALLBACK_REPLY: &str = "I processed your request.";

pub const SYSTEM_PROMPT: &str = "\
You are a helpful task management assistant. You help users manage their \
personal to-do list through natural conversation.

You have tools to add, list, update, complete, and delete tasks. Use them \
whenever the user asks to change or inspect their tasks; never pretend to \
have performed an action without calling the matching tool.

Rules:
- When the user refers to a task by its name or a phrase from its title, \
use delete_task_by_name or complete_task_by_name rather than guessing an ID.
- When the user gives an explicit numeric ID, use the ID-based tools.
- If a by-name tool reports multiple matching tasks, do not pick one: list \
the candidates and ask the user which one they meant.
- After a tool succeeds, confirm briefly what was done, naming the task.
- If a tool fails, explain the failure plainly and suggest what to try next.
- Keep replies short and conversational. Do not output JSON or tool syntax.

Examples:
- \"add buy milk to my list\" -> add_task(title: \"Buy milk\")
- \"what's left to do?\" -> list_tasks(status: \"pending\")
- \"I finished the dentist thing\" -> complete_task_by_name(task_name: \"dentist\")
- \"delete task 12\" -> delete_task(task_id: 12)";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent not configured: {0}")]
    NotConfigured(String),
    #[error("model quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("model provider error: {0}")]
    Provider(String),
}

/// Seam to the hosted model. Production uses [`gemini::GeminiClient`];
/// tests script replies through a fake.
pub trait ChatModel: Send + Sync {
    fn generate(
        &self,
        contents: &[Content],
    ) -> impl Future<Output = Result<Content, AgentError>> + Send;
}

/// One executed tool call, kept for persistence alongside the reply so the
/// conversation transcript shows what the assistant actually did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub tool_args: Value,
    pub tool_result: Value,
    pub success: bool,
}

pub struct AgentService<M: ChatModel> {
    model: M,
}

impl<M: ChatModel> AgentService<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Run the tool loop for one user message. Returns the final reply text
    /// and the tool calls executed along the way, in order.
    pub async fn run(
        &self,
        tools: &impl ToolExecutor,
        user_message: &str,
        history: &[Message],
    ) -> Result<(String, Vec<ToolCallRecord>), AgentError> {
        let mut contents = build_transcript(history, user_message);
        let mut records: Vec<ToolCallRecord> = Vec::new();
        let mut last_text: Option<String> = None;

        for iteration in 0..MAX_ITERATIONS {
            let reply = self.model.generate(&contents).await?;
            if reply.parts.is_empty() {
                break;
            }

            if let Some(text) = reply.text() {
                last_text = Some(text);
            }

            let calls: Vec<_> = reply.function_calls().into_iter().cloned().collect();
            if calls.is_empty() {
                match last_text {
                    Some(text) => return Ok((text, records)),
                    None => break,
                }
            }

            tracing::debug!(iteration, calls = calls.len(), "executing tool calls");
            let mut response_parts = Vec::with_capacity(calls.len());
            for call in &calls {
                let mut args = call.args.clone();
                coerce_tool_args(&mut args);

                let result = tools.execute(&call.name, args.clone()).await;
                let payload = if result.success {
                    json!({"result": result.data})
                } else {
                    json!({"error": result.error})
                };
                records.push(ToolCallRecord {
                    tool_name: call.name.clone(),
                    tool_args: Value::Object(args),
                    tool_result: payload.clone(),
                    success: result.success,
                });
                response_parts.push(Part::function_response(call.name.clone(), payload));
            }

            contents.push(reply);
            contents.push(Content::user(response_parts));
        }

        let reply = last_text.unwrap_or_else(|| FALLBACK_REPLY.to_string());
        Ok((reply, records))
    }
}

/// Replay stored history as model transcript turns, then append the new
/// user message. Assistant and tool messages both map to the "model" role.
fn build_transcript(history: &[Message], user_message: &str) -> Vec<Content> {
    let mut contents: Vec<Content> = history
        .iter()
        .map(|m| {
            let part = Part::text(m.content.clone());
            match m.role {
                MessageRole::User => Content::user(vec![part]),
                MessageRole::Assistant | MessageRole::Tool => Content::model(vec![part]),
            }
        })
        .collect();
    contents.push(Content::user(vec![Part::text(user_message)]));
    contents
}

/// Models sometimes emit numeric arguments as strings. Coerce a stringly
/// `task_id` back to an integer before dispatch.
fn coerce_tool_args(args: &mut Map<String, Value>) {
    if let Some(Value::String(raw)) = args.get("task_id") {
        if let Ok(id) = raw.trim().parse::<i64>() {
            args.insert("task_id".to_string(), json!(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gemini::FunctionCall;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tools::ToolResult;

    struct FakeModel {
        replies: Mutex<VecDeque<Result<Content, AgentError>>>,
    }

    impl FakeModel {
        fn new(replies: Vec<Result<Content, AgentError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
            }
        }
    }

    impl ChatModel for FakeModel {
        async fn generate(&self, _contents: &[Content]) -> Result<Content, AgentError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Content::model(Vec::new())))
        }
    }

    #[derive(Default)]
    struct FakeTools {
        calls: Mutex<Vec<(String, Map<String, Value>)>>,
        results: Mutex<VecDeque<ToolResult>>,
    }

    impl FakeTools {
        fn scripted(results: Vec<ToolResult>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                results: Mutex::new(results.into()),
            }
        }

        fn recorded_calls(&self) -> Vec<(String, Map<String, Value>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ToolExecutor for FakeTools {
        async fn execute(&self, name: &str, args: Map<String, Value>) -> ToolResult {
            self.calls.lock().unwrap().push((name.to_string(), args));
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ToolResult::ok(json!({"ok": true})))
        }
    }

    fn call_content(name: &str, args: Value) -> Content {
        let Value::Object(args) = args else {
            panic!("args must be an object");
        };
        Content::model(vec![Part {
            function_call: Some(FunctionCall {
                name: name.to_string(),
                args,
            }),
            ..Default::default()
        }])
    }

    fn text_content(text: &str) -> Content {
        Content::model(vec![Part::text(text)])
    }

    fn message(role: MessageRole, content: &str) -> Message {
        Message {
            id: 1,
            conversation_id: 1,
            role,
            content: content.to_string(),
            extra_data: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn plain_text_reply_ends_the_loop_immediately() {
        let model = FakeModel::new(vec![Ok(text_content("You have 3 tasks."))]);
        let tools = FakeTools::default();
        let (reply, records) = AgentService::new(model)
            .run(&tools, "how many tasks?", &[])
            .await
            .unwrap();
        assert_eq!(reply, "You have 3 tasks.");
        assert!(records.is_empty());
        assert!(tools.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn tool_call_is_executed_then_final_text_returned() {
        let model = FakeModel::new(vec![
            Ok(call_content("add_task", json!({"title": "Buy milk"}))),
            Ok(text_content("Added 'Buy milk' to your list.")),
        ]);
        let tools = FakeTools::scripted(vec![ToolResult::ok(json!({"id": 1, "title": "Buy milk"}))]);

        let (reply, records) = AgentService::new(model)
            .run(&tools, "add buy milk", &[])
            .await
            .unwrap();

        assert_eq!(reply, "Added 'Buy milk' to your list.");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tool_name, "add_task");
        assert!(records[0].success);
        assert_eq!(records[0].tool_result["result"]["id"], 1);

        let calls = tools.recorded_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.get("title"), Some(&json!("Buy milk")));
    }

    #[tokio::test]
    async fn loop_stops_after_five_iterations_with_fallback() {
        let replies = (0..10)
            .map(|_| Ok(call_content("list_tasks", json!({}))))
            .collect();
        let model = FakeModel::new(replies);
        let tools = FakeTools::default();

        let (reply, records) = AgentService::new(model)
            .run(&tools, "loop forever", &[])
            .await
            .unwrap();

        assert_eq!(reply, FALLBACK_REPLY);
        assert_eq!(records.len(), MAX_ITERATIONS);
        assert_eq!(tools.recorded_calls().len(), MAX_ITERATIONS);
    }

    #[tokio::test]
    async fn quota_errors_propagate_without_a_reply() {
        let model = FakeModel::new(vec![Err(AgentError::QuotaExceeded(
            "RESOURCE_EXHAUSTED".to_string(),
        ))]);
        let tools = FakeTools::default();
        let err = AgentService::new(model)
            .run(&tools, "hi", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::QuotaExceeded(_)));
    }

    #[tokio::test]
    async fn stringly_task_ids_are_coerced_to_integers() {
        let model = FakeModel::new(vec![
            Ok(call_content("complete_task", json!({"task_id": "7"}))),
            Ok(text_content("Done.")),
        ]);
        let tools = FakeTools::default();

        AgentService::new(model)
            .run(&tools, "complete task 7", &[])
            .await
            .unwrap();

        let calls = tools.recorded_calls();
        assert_eq!(calls[0].1.get("task_id"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn failed_tool_calls_are_recorded_as_failures() {
        let model = FakeModel::new(vec![
            Ok(call_content("delete_task", json!({"task_id": 99}))),
            Ok(text_content("I couldn't find that task.")),
        ]);
        let tools = FakeTools::scripted(vec![ToolResult::fail("Task 99 not found")]);

        let (_, records) = AgentService::new(model)
            .run(&tools, "delete task 99", &[])
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert_eq!(records[0].tool_result["error"], "Task 99 not found");
    }

    #[tokio::test]
    async fn multiple_calls_in_one_turn_run_in_order() {
        let model = FakeModel::new(vec![
            Ok(Content::model(vec![
                Part {
                    function_call: Some(FunctionCall {
                        name: "add_task".to_string(),
                        args: json!({"title": "A"}).as_object().unwrap().clone(),
                    }),
                    ..Default::default()
                },
                Part {
                    function_call: Some(FunctionCall {
                        name: "add_task".to_string(),
                        args: json!({"title": "B"}).as_object().unwrap().clone(),
                    }),
                    ..Default::default()
                },
            ])),
            Ok(text_content("Added both.")),
        ]);
        let tools = FakeTools::default();

        let (reply, records) = AgentService::new(model)
            .run(&tools, "add A and B", &[])
            .await
            .unwrap();

        assert_eq!(reply, "Added both.");
        assert_eq!(records.len(), 2);
        let calls = tools.recorded_calls();
        assert_eq!(calls[0].1.get("title"), Some(&json!("A")));
        assert_eq!(calls[1].1.get("title"), Some(&json!("B")));
    }

    #[test]
    fn transcript_maps_roles_and_appends_user_message() {
        let history = vec![
            message(MessageRole::User, "add buy milk"),
            message(MessageRole::Tool, "Tool: add_task"),
            message(MessageRole::Assistant, "Added 'Buy milk'."),
        ];
        let transcript = build_transcript(&history, "now list them");
        let roles: Vec<&str> = transcript.iter().map(|c| c.role.as_str()).collect();
        assert_eq!(roles, ["user", "model", "model", "user"]);
        assert_eq!(
            transcript.last().unwrap().text().as_deref(),
            Some("now list them")
        );
    }

    #[test]
    fn coercion_leaves_non_numeric_ids_alone() {
        let mut args = json!({"task_id": "abc"}).as_object().unwrap().clone();
        coerce_tool_args(&mut args);
        assert_eq!(args.get("task_id"), Some(&json!("abc")));

        let mut args = json!({"task_id": 5}).as_object().unwrap().clone();
        coerce_tool_args(&mut args);
        assert_eq!(args.get("task_id"), Some(&json!(5)));
    }
}
