use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use taskdeck_core::chat::{
    ChatMessageRequest, ChatResponse, Conversation, ConversationListResponse,
    CreateConversationRequest, Message, MessageRole, validate_message_content,
};

use crate::agent::AgentError;
use crate::agent::tools::TaskTools;
use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::chat::ChatStore;

/// Titles auto-generated from the first user message are cut to this many
/// characters before an ellipsis is appended.
const AUTO_TITLE_MAX_LEN: usize = 50;

/// Default number of messages returned by the message listing endpoint.
const DEFAULT_MESSAGE_PAGE: i64 = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/chat/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/chat/conversations/{id}",
            get(get_conversation).delete(delete_conversation),
        )
        .route(
            "/chat/conversations/{id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/chat/message", post(quick_message))
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ListConversationsParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ListMessagesParams {
    pub limit: Option<i64>,
}

/// Body of `POST /chat/message`. Reuses an existing conversation when the
/// id resolves for this owner, otherwise starts a fresh one.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct QuickMessageRequest {
    pub content: String,
    pub conversation_id: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/chat/conversations",
    request_body = CreateConversationRequest,
    responses(
        (status = 201, description = "Conversation created", body = Conversation)
    ),
    security(("bearer_auth" = [])),
    tag = "chat"
)]
pub async fn create_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Option<Json<CreateConversationRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let title = body.as_ref().and_then(|b| b.title.as_deref());
    let conversation = ChatStore::new(&state.db)
        .create_conversation(&user.user_id, title)
        .await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

#[utoipa::path(
    get,
    path = "/chat/conversations",
    params(ListConversationsParams),
    responses(
        (status = 200, description = "Conversations, newest first", body = ConversationListResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "chat"
)]
pub async fn list_conversations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<ListConversationsParams>,
) -> Result<Json<ConversationListResponse>, AppError> {
    let limit = clamp_page(params.limit, 20);
    let offset = params.offset.filter(|o| *o >= 0).unwrap_or(0);
    let store = ChatStore::new(&state.db);
    let conversations = store
        .list_conversations(&user.user_id, limit, offset)
        .await?;
    // overall count, not the page length
    let total = store.count_conversations(&user.user_id).await?;
    Ok(Json(ConversationListResponse {
        conversations,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/chat/conversations/{id}",
    params(("id" = i64, Path, description = "Conversation identifier")),
    responses(
        (status = 200, description = "Conversation", body = Conversation),
        (status = 404, description = "Conversation not found", body = taskdeck_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "chat"
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Conversation>, AppError> {
    let conversation = ChatStore::new(&state.db)
        .get_conversation(id, &user.user_id)
        .await?
        .ok_or_else(|| conversation_not_found(id))?;
    Ok(Json(conversation))
}

#[utoipa::path(
    delete,
    path = "/chat/conversations/{id}",
    params(("id" = i64, Path, description = "Conversation identifier")),
    responses(
        (status = 204, description = "Conversation and its messages deleted"),
        (status = 404, description = "Conversation not found", body = taskdeck_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "chat"
)]
pub async fn delete_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let deleted = ChatStore::new(&state.db)
        .delete_conversation(id, &user.user_id)
        .await?;
    if !deleted {
        return Err(conversation_not_found(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/chat/conversations/{id}/messages",
    params(
        ("id" = i64, Path, description = "Conversation identifier"),
        ListMessagesParams,
    ),
    responses(
        (status = 200, description = "Messages in ascending creation order", body = [Message]),
        (status = 404, description = "Conversation not found", body = taskdeck_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "chat"
)]
pub async fn list_messages(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Query(params): Query<ListMessagesParams>,
) -> Result<Json<Vec<Message>>, AppError> {
    let store = ChatStore::new(&state.db);
    store
        .get_conversation(id, &user.user_id)
        .await?
        .ok_or_else(|| conversation_not_found(id))?;

    let limit = clamp_page(params.limit, DEFAULT_MESSAGE_PAGE);
    let messages = store.load_history(id, Some(limit)).await?;
    Ok(Json(messages))
}

#[utoipa::path(
    post,
    path = "/chat/conversations/{id}/messages",
    params(("id" = i64, Path, description = "Conversation identifier")),
    request_body = ChatMessageRequest,
    responses(
        (status = 200, description = "Assistant reply and refreshed messages", body = ChatResponse),
        (status = 404, description = "Conversation not found", body = taskdeck_core::error::ApiError),
        (status = 422, description = "Validation error", body = taskdeck_core::error::ApiError),
        (status = 429, description = "Model quota exceeded", body = taskdeck_core::error::ApiError),
        (status = 500, description = "Agent not configured or failed", body = taskdeck_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "chat"
)]
pub async fn send_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(req): Json<ChatMessageRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    validate_content(&req.content)?;

    let conversation = ChatStore::new(&state.db)
        .get_conversation(id, &user.user_id)
        .await?
        .ok_or_else(|| conversation_not_found(id))?;

    let response = run_agent_turn(&state, &user, conversation, &req.content).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/chat/message",
    request_body = QuickMessageRequest,
    responses(
        (status = 200, description = "Assistant reply and refreshed messages", body = ChatResponse),
        (status = 422, description = "Validation error", body = taskdeck_core::error::ApiError),
        (status = 429, description = "Model quota exceeded", body = taskdeck_core::error::ApiError),
        (status = 500, description = "Agent not configured or failed", body = taskdeck_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "chat"
)]
pub async fn quick_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<QuickMessageRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    validate_content(&req.content)?;

    let conversation = ChatStore::new(&state.db)
        .get_or_create_conversation(&user.user_id, req.conversation_id)
        .await?;

    let response = run_agent_turn(&state, &user, conversation, &req.content).await?;
    Ok(Json(response))
}

/// One full assistant turn: persist the user message, run the tool loop,
/// persist what it did, and return the refreshed message window.
async fn run_agent_turn(
    state: &AppState,
    user: &AuthenticatedUser,
    conversation: Conversation,
    content: &str,
) -> Result<ChatResponse, AppError> {
    let agent = state.agent.as_ref().ok_or_else(|| {
        AgentError::NotConfigured("GEMINI_API_KEY is not set".to_string())
    })?;
    let store = ChatStore::new(&state.db);

    let user_message = store
        .save_message(conversation.id, MessageRole::User, content, None)
        .await?;

    // first user message names the conversation
    if conversation.title == "New Conversation" {
        store
            .update_title(conversation.id, &user.user_id, &truncate_title(content))
            .await?;
    }

    // replay window excludes the message we just saved; it is passed to the
    // agent separately as the current turn
    let mut history = store.load_history(conversation.id, None).await?;
    if history.last().is_some_and(|m| m.id == user_message.id) {
        history.pop();
    }

    let tools = TaskTools::new(&state.db, &user.user_id);
    let (reply, tool_calls) = agent.run(&tools, content, &history).await?;

    for record in &tool_calls {
        store
            .save_message(
                conversation.id,
                MessageRole::Tool,
                &format!("Tool: {}", record.tool_name),
                serde_json::to_value(record).ok(),
            )
            .await?;
    }
    store
        .save_message(conversation.id, MessageRole::Assistant, &reply, None)
        .await?;

    tracing::info!(
        conversation_id = conversation.id,
        tool_calls = tool_calls.len(),
        "completed assistant turn"
    );

    let messages = store.load_history(conversation.id, None).await?;
    Ok(ChatResponse {
        response: reply,
        conversation_id: conversation.id,
        messages,
    })
}

fn validate_content(content: &str) -> Result<(), AppError> {
    validate_message_content(content).map_err(|message| AppError::Validation {
        message,
        field: Some("content".to_string()),
        received: None,
    })
}

fn conversation_not_found(id: i64) -> AppError {
    AppError::NotFound {
        message: format!("Conversation {id} not found"),
    }
}

fn clamp_page(limit: Option<i64>, default: i64) -> i64 {
    match limit {
        Some(n) if n > 0 => n.min(100),
        _ => default,
    }
}

/// First-message titles are cut at 50 characters with a trailing ellipsis.
fn truncate_title(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= AUTO_TITLE_MAX_LEN {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(AUTO_TITLE_MAX_LEN).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_titles_pass_through() {
        assert_eq!(truncate_title("add buy milk"), "add buy milk");
        assert_eq!(truncate_title("  padded  "), "padded");
    }

    #[test]
    fn long_titles_are_truncated_with_ellipsis() {
        let long = "a".repeat(80);
        let title = truncate_title(&long);
        assert_eq!(title.chars().count(), AUTO_TITLE_MAX_LEN + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let long = "ü".repeat(60);
        let title = truncate_title(&long);
        assert_eq!(title.chars().count(), AUTO_TITLE_MAX_LEN + 3);
    }

    #[test]
    fn page_limits_are_clamped() {
        assert_eq!(clamp_page(None, 20), 20);
        assert_eq!(clamp_page(Some(0), 20), 20);
        assert_eq!(clamp_page(Some(-5), 50), 50);
        assert_eq!(clamp_page(Some(30), 20), 30);
        assert_eq!(clamp_page(Some(500), 20), 100);
    }
}
