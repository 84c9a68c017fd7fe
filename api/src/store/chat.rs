use chrono::{DateTime, Utc};
use sqlx::PgPool;
use taskdeck_core::chat::{
    CONVERSATION_TITLE_MAX_LEN, Conversation, DEFAULT_HISTORY_LIMIT, Message, MessageRole,
};

/// Conversation and message persistence, scoped by owner identifier.
/// Messages are append-only; prior messages are never mutated.
pub struct ChatStore<'a> {
    pool: &'a PgPool,
}

impl<'a> ChatStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_conversation(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<Conversation, sqlx::Error> {
        let title = clamp_title(title.unwrap_or("New Conversation"));
        let row = sqlx::query_as::<_, ConversationRow>(
            "INSERT INTO conversations (user_id, title) VALUES ($1, $2) \
             RETURNING id, user_id, title, created_at",
        )
        .bind(user_id)
        .bind(&title)
        .fetch_one(self.pool)
        .await?;

        tracing::info!(conversation_id = row.id, user_id = %user_id, "created conversation");
        Ok(row.into_conversation(0))
    }

    pub async fn get_conversation(
        &self,
        id: i64,
        user_id: &str,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        let row = sqlx::query_as::<_, ConversationCountRow>(
            "SELECT c.id, c.user_id, c.title, c.created_at, COUNT(m.id) AS message_count \
             FROM conversations c \
             LEFT JOIN messages m ON m.conversation_id = c.id \
             WHERE c.id = $1 AND c.user_id = $2 \
             GROUP BY c.id, c.user_id, c.title, c.created_at",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(ConversationCountRow::into_conversation))
    }

    pub async fn list_conversations(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ConversationCountRow>(
            "SELECT c.id, c.user_id, c.title, c.created_at, COUNT(m.id) AS message_count \
             FROM conversations c \
             LEFT JOIN messages m ON m.conversation_id = c.id \
             WHERE c.user_id = $1 \
             GROUP BY c.id, c.user_id, c.title, c.created_at \
             ORDER BY c.created_at DESC, c.id DESC \
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(ConversationCountRow::into_conversation)
            .collect())
    }

    /// Total conversations for this owner, independent of paging.
    pub async fn count_conversations(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM conversations WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool)
            .await
    }

    /// Reuse an existing conversation when the id resolves for this owner,
    /// otherwise start a fresh one.
    pub async fn get_or_create_conversation(
        &self,
        user_id: &str,
        id: Option<i64>,
    ) -> Result<Conversation, sqlx::Error> {
        if let Some(id) = id {
            if let Some(conversation) = self.get_conversation(id, user_id).await? {
                return Ok(conversation);
            }
            tracing::warn!(conversation_id = id, "conversation not found, creating new");
        }
        self.create_conversation(user_id, None).await
    }

    pub async fn update_title(
        &self,
        id: i64,
        user_id: &str,
        title: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE conversations SET title = $3 WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .bind(clamp_title(title))
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes the conversation and, via cascade, all its messages.
    /// Foreign or absent conversations return false.
    pub async fn delete_conversation(&self, id: i64, user_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(conversation_id = id, "deleted conversation");
        }
        Ok(deleted)
    }

    pub async fn save_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
        extra_data: Option<serde_json::Value>,
    ) -> Result<Message, sqlx::Error> {
        let row = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO messages (conversation_id, role, content, extra_data) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, conversation_id, role, content, extra_data, created_at",
        )
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(extra_data)
        .fetch_one(self.pool)
        .await?;

        tracing::debug!(
            message_id = row.id,
            conversation_id,
            role = role.as_str(),
            "saved message"
        );
        Ok(row.into_message())
    }

    /// The most recent `limit` messages (default 20) in ascending creation
    /// order: fetch newest-first, then reverse, so the cap keeps the most
    /// recent window rather than the oldest.
    pub async fn load_history(
        &self,
        conversation_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, sqlx::Error> {
        let limit = normalize_history_limit(limit);
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, conversation_id, role, content, extra_data, created_at \
             FROM messages WHERE conversation_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2",
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        let mut messages: Vec<Message> = rows.into_iter().map(MessageRow::into_message).collect();
        messages.reverse();
        Ok(messages)
    }
}

fn clamp_title(title: &str) -> String {
    title.chars().take(CONVERSATION_TITLE_MAX_LEN).collect()
}

fn normalize_history_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(n) if n > 0 => n,
        _ => DEFAULT_HISTORY_LIMIT,
    }
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: i64,
    user_id: String,
    title: String,
    created_at: DateTime<Utc>,
}

impl ConversationRow {
    fn into_conversation(self, message_count: i64) -> Conversation {
        Conversation {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            created_at: self.created_at,
            message_count,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ConversationCountRow {
    id: i64,
    user_id: String,
    title: String,
    created_at: DateTime<Utc>,
    message_count: i64,
}

impl ConversationCountRow {
    fn into_conversation(self) -> Conversation {
        Conversation {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            created_at: self.created_at,
            message_count: self.message_count,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    conversation_id: i64,
    role: String,
    content: String,
    extra_data: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    fn into_message(self) -> Message {
        Message {
            id: self.id,
            conversation_id: self.conversation_id,
            // rows are only ever written through save_message, so the role
            // string always parses; fall back to assistant if it does not
            role: MessageRole::parse(&self.role).unwrap_or(MessageRole::Assistant),
            content: self.content,
            extra_data: self.extra_data,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_are_clamped_to_255_characters() {
        assert_eq!(clamp_title("short"), "short");
        let long = "x".repeat(400);
        assert_eq!(clamp_title(&long).chars().count(), 255);
    }

    #[test]
    fn history_limit_defaults_and_rejects_nonpositive() {
        assert_eq!(normalize_history_limit(None), DEFAULT_HISTORY_LIMIT);
        assert_eq!(normalize_history_limit(Some(0)), DEFAULT_HISTORY_LIMIT);
        assert_eq!(normalize_history_limit(Some(-3)), DEFAULT_HISTORY_LIMIT);
        assert_eq!(normalize_history_limit(Some(50)), 50);
    }
}
