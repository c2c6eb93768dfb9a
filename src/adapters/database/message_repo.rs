use crate::adapters::database::DbPool;
use crate::adapters::database::records::MessageRecord;
use crate::adapters::ledger::{LedgerError, MessageLedger};
use crate::domain::message::{Message, MessageId, MessageStatus, Transition};
use async_trait::async_trait;

const SELECT_COLUMNS: &str = "message_id, a_address, b_address, body, encoded_body, data_coding, status, \
                              description, raw_response, created_at, updated_at";

/// Postgres-backed ledger over the `messages` table.
#[derive(Clone, Debug)]
pub struct PgMessageLedger {
    pool: DbPool,
}

impl PgMessageLedger {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Escapes `LIKE` wildcards so the pattern matches literally.
fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len() + 2);
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl MessageLedger for PgMessageLedger {
    #[tracing::instrument(level = "debug", skip(self, message), fields(message_id = %message.message_id))]
    async fn insert(&self, message: &Message) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r"
            INSERT INTO messages
                (message_id, a_address, b_address, body, encoded_body, data_coding, status,
                 description, raw_response, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(message.message_id.as_str())
        .bind(&message.a_address)
        .bind(&message.b_address)
        .bind(&message.body)
        .bind(message.encoded_body.as_deref())
        .bind(i16::from(message.data_coding))
        .bind(message.status.as_str())
        .bind(&message.description)
        .bind(message.raw_response.as_deref())
        .bind(message.created_at)
        .bind(message.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23505") => {
                // Unique violation: ids are never reassigned
                Err(LedgerError::Duplicate(message.message_id.clone()))
            }
            Err(e) => Err(LedgerError::Unavailable(e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_by_message_id(&self, id: &MessageId) -> Result<Option<Message>, LedgerError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages WHERE message_id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        record.map(Message::try_from).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, description))]
    async fn update_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
        description: &str,
    ) -> Result<Transition, LedgerError> {
        let allowed_from: Vec<&str> = MessageStatus::predecessors(status).into_iter().map(MessageStatus::as_str).collect();

        // Guarded single-row update: the WHERE clause enforces the state machine atomically
        let updated = sqlx::query(
            r"
            UPDATE messages
            SET status = $2, description = $3, updated_at = NOW()
            WHERE message_id = $1 AND status = ANY($4)
            ",
        )
        .bind(id.as_str())
        .bind(status.as_str())
        .bind(description)
        .bind(allowed_from.as_slice())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            return Ok(Transition::Applied);
        }

        let current: Option<String> = sqlx::query_scalar("SELECT status FROM messages WHERE message_id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let current = current.ok_or_else(|| LedgerError::NotFound(id.clone()))?;
        let current = current.parse::<MessageStatus>().map_err(|e| LedgerError::Corrupt(format!("{id}: {e}")))?;
        Ok(current.transition(status))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_by_response_pattern(&self, pattern: &str) -> Result<Option<Message>, LedgerError> {
        if pattern.is_empty() {
            return Ok(None);
        }

        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages \
             WHERE raw_response LIKE '%' || $1 || '%' \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(escape_like(pattern))
        .fetch_optional(&self.pool)
        .await?;

        record.map(Message::try_from).transpose()
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
