use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Maximum length of a conversation title.
pub const CONVERSATION_TITLE_MAX_LEN: usize = 255;
/// Maximum length of a single chat message.
pub const MESSAGE_MAX_LEN: usize = 10_000;
/// Default window of messages replayed to the agent.
pub const DEFAULT_HISTORY_LIMIT: i64 = 20;

/// Who produced a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "tool" => Some(MessageRole::Tool),
            _ => None,
        }
    }
}

/// A chat session owned by a single user. Deleting a conversation cascades
/// to its messages.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Conversation {
    pub id: i64,
    /// Owner identifier from the JWT (opaque, no FK constraint)
    pub user_id: String,
    /// Auto-generated from the first user message unless set explicitly
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub message_count: i64,
}

/// A single message in a conversation. Append-only; ordering by creation
/// timestamp ascending is the canonical replay order.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: MessageRole,
    pub content: String,
    /// Structured side data (tool name/arguments/result for tool messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
}

/// One page of conversations plus the owner's overall conversation count,
/// so clients can paginate without a separate count request.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationListResponse {
    pub conversations: Vec<Conversation>,
    pub total: i64,
}

/// Body of `POST /chat/conversations/{id}/messages` and `POST /chat/message`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatMessageRequest {
    pub content: String,
}

/// Chat endpoint response: the assistant's final reply plus the refreshed
/// message window for the conversation.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: i64,
    pub messages: Vec<Message>,
}

/// Validate a chat message body: non-blank, bounded length.
pub fn validate_message_content(content: &str) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("content must not be empty".to_string());
    }
    if content.chars().count() > MESSAGE_MAX_LEN {
        return Err(format!(
            "content must be at most {MESSAGE_MAX_LEN} characters"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_string_roundtrip() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::Tool] {
            assert_eq!(MessageRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(MessageRole::parse("system"), None);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn conversation_list_total_is_independent_of_page_length() {
        let response = ConversationListResponse {
            conversations: Vec::new(),
            total: 5,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["total"], 5);
        assert_eq!(value["conversations"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn message_content_is_validated() {
        assert!(validate_message_content("add a task").is_ok());
        assert!(validate_message_content("  ").is_err());
        assert!(validate_message_content(&"x".repeat(MESSAGE_MAX_LEN + 1)).is_err());
    }
}
