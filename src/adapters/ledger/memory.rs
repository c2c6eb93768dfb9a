use crate::adapters::ledger::{LedgerError, MessageLedger};
use crate::domain::message::{Message, MessageId, MessageStatus, Transition};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;

/// Process-local ledger for lab deployments and tests.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: DashMap<MessageId, Message>,
    offline: AtomicBool,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail as if the store were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copies every record, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        let mut all: Vec<Message> = self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.message_id.cmp(&b.message_id)));
        all
    }

    fn check_online(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Offline("in-memory ledger marked offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageLedger for InMemoryLedger {
    async fn insert(&self, message: &Message) -> Result<(), LedgerError> {
        self.check_online()?;
        match self.records.entry(message.message_id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::Duplicate(message.message_id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(message.clone());
                Ok(())
            }
        }
    }

    async fn find_by_message_id(&self, id: &MessageId) -> Result<Option<Message>, LedgerError> {
        self.check_online()?;
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn update_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
        description: &str,
    ) -> Result<Transition, LedgerError> {
        self.check_online()?;
        let mut record = self.records.get_mut(id).ok_or_else(|| LedgerError::NotFound(id.clone()))?;

        let transition = record.status.transition(status);
        if transition == Transition::Applied {
            record.status = status;
            description.clone_into(&mut record.description);
            record.updated_at = OffsetDateTime::now_utc();
        }
        Ok(transition)
    }

    async fn find_by_response_pattern(&self, pattern: &str) -> Result<Option<Message>, LedgerError> {
        self.check_online()?;
        if pattern.is_empty() {
            return Ok(None);
        }
        Ok(self
            .records
            .iter()
            .filter(|r| r.raw_response.as_deref().is_some_and(|raw| raw.contains(pattern)))
            .max_by(|a, b| a.created_at.cmp(&b.created_at))
            .map(|r| r.value().clone()))
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        self.check_online()
    }
}
