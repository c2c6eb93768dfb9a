use crate::domain::message::{Message, MessageId, MessageStatus, Transition};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;

pub use memory::InMemoryLedger;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    #[error("ledger store unavailable: {0}")]
    Offline(String),
    #[error("message id already recorded: {0}")]
    Duplicate(MessageId),
    #[error("no ledger record for message id {0}")]
    NotFound(MessageId),
    #[error("corrupt ledger record: {0}")]
    Corrupt(String),
}

/// Durable, append/update-only record of every message the gateway handled.
///
/// Records are never deleted. Writes touch a single message and need no cross-row locking.
#[async_trait]
pub trait MessageLedger: Send + Sync + std::fmt::Debug + 'static {
    /// Appends a new record.
    ///
    /// # Errors
    /// Returns `LedgerError::Duplicate` if the id is already recorded, or
    /// `LedgerError::Unavailable` if the store cannot be reached.
    async fn insert(&self, message: &Message) -> Result<(), LedgerError>;

    async fn find_by_message_id(&self, id: &MessageId) -> Result<Option<Message>, LedgerError>;

    /// Moves a record to `status` if the state machine allows it.
    ///
    /// Repeating the same update is a no-op reported as `Transition::Unchanged`.
    ///
    /// # Errors
    /// Returns `LedgerError::NotFound` if no record has this id.
    async fn update_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
        description: &str,
    ) -> Result<Transition, LedgerError>;

    /// Finds the most recent record whose stored backend response contains `pattern`.
    ///
    /// Only used to resolve cancel requests for backends that never returned a usable
    /// message id. Gated behind `--legacy-response-lookup`.
    async fn find_by_response_pattern(&self, pattern: &str) -> Result<Option<Message>, LedgerError>;

    async fn ping(&self) -> Result<(), LedgerError>;
}
