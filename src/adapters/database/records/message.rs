use crate::adapters::ledger::LedgerError;
use crate::domain::message::{Message, MessageId, MessageStatus};
use time::OffsetDateTime;

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRecord {
    pub(crate) message_id: String,
    pub(crate) a_address: String,
    pub(crate) b_address: String,
    pub(crate) body: String,
    pub(crate) encoded_body: Option<String>,
    pub(crate) data_coding: i16,
    pub(crate) status: String,
    pub(crate) description: String,
    pub(crate) raw_response: Option<String>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for Message {
    type Error = LedgerError;

    fn try_from(record: MessageRecord) -> Result<Self, Self::Error> {
        let status = record
            .status
            .parse::<MessageStatus>()
            .map_err(|e| LedgerError::Corrupt(format!("{}: {e}", record.message_id)))?;
        let data_coding = u8::try_from(record.data_coding)
            .map_err(|_| LedgerError::Corrupt(format!("{}: data_coding {}", record.message_id, record.data_coding)))?;

        Ok(Self {
            message_id: MessageId::new(record.message_id),
            a_address: record.a_address,
            b_address: record.b_address,
            body: record.body,
            encoded_body: record.encoded_body,
            data_coding,
            status,
            description: record.description,
            raw_response: record.raw_response,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}
