use crate::domain::message::MessageId;

/// Outcome of handing one message to a backend.
///
/// Carries no reference to the ledger; callers correlate it to a record themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResult {
    pub success: bool,
    pub message_id: Option<MessageId>,
    pub raw_response: Option<String>,
    pub error: Option<String>,
    /// Body as actually put on the wire when the backend needed it re-encoded.
    pub encoded_body: Option<String>,
}

impl TransportResult {
    #[must_use]
    pub const fn accepted(message_id: Option<MessageId>, raw_response: Option<String>) -> Self {
        Self { success: true, message_id, raw_response, error: None, encoded_body: None }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>, raw_response: Option<String>) -> Self {
        Self { success: false, message_id: None, raw_response, error: Some(error.into()), encoded_body: None }
    }

    #[must_use]
    pub fn with_encoded_body(mut self, encoded_body: String) -> Self {
        self.encoded_body = Some(encoded_body);
        self
    }

    /// Human-readable summary for logs and envelopes.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.success {
            "Message sent successfully".to_string()
        } else {
            self.error.clone().unwrap_or_else(|| "Message submission failed".to_string())
        }
    }
}

/// Backend acknowledgement of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub raw_response: Option<String>,
}
