use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Opaque message identifier. Assigned by the backend on submission, or generated locally
/// when the backend never returned one (e.g. the submission failed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a locally-assigned identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lifecycle of a message in the ledger.
///
/// ```text
/// Submitted -> Sent -> Delivered*
///     |          |---> Failed*
///     |          '---> Cancelled*
///     |---> Delivered* | Failed* | Cancelled*
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageStatus {
    Submitted,
    Sent,
    Delivered,
    Failed,
    Cancelled,
}

impl MessageStatus {
    pub const ALL: [Self; 5] = [Self::Submitted, Self::Sent, Self::Delivered, Self::Failed, Self::Cancelled];

    /// States from which `next` may be reached.
    #[must_use]
    pub fn predecessors(next: Self) -> Vec<Self> {
        Self::ALL.into_iter().filter(|s| s.can_transition_to(next)).collect()
    }

    /// Numeric code carried in the `Status` element of response envelopes.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Submitted => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Failed => 3,
            Self::Cancelled => 4,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Submitted),
            1 => Some(Self::Sent),
            2 => Some(Self::Delivered),
            3 => Some(Self::Failed),
            4 => Some(Self::Cancelled),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    /// Staying in the same state is not a transition; see [`MessageStatus::transition`].
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Submitted, Self::Sent | Self::Delivered | Self::Failed | Self::Cancelled)
                | (Self::Sent, Self::Delivered | Self::Failed | Self::Cancelled)
        )
    }

    /// Classifies a requested status change against the state machine.
    #[must_use]
    pub const fn transition(self, next: Self) -> Transition {
        if self as u8 == next as u8 {
            Transition::Unchanged
        } else if self.can_transition_to(next) {
            Transition::Applied
        } else {
            Transition::Rejected { current: self }
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(Self::Submitted),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

/// Outcome of a status update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The record already had the requested status; nothing was written.
    Unchanged,
    /// The state machine forbids the move; the record was left as-is.
    Rejected { current: MessageStatus },
}

/// A message as the caller asked for it, before any backend has seen it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundSms {
    pub a_address: String,
    pub b_address: String,
    pub body: String,
    pub data_coding: u8,
}

/// A ledger record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_id: MessageId,
    pub a_address: String,
    pub b_address: String,
    pub body: String,
    /// Base64 form of `body` as handed to REST backends.
    pub encoded_body: Option<String>,
    pub data_coding: u8,
    pub status: MessageStatus,
    pub description: String,
    /// Verbatim backend response, kept for audit and the legacy cancel lookup.
    pub raw_response: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Message {
    #[must_use]
    pub fn new(
        message_id: MessageId,
        sms: &OutboundSms,
        status: MessageStatus,
        description: impl Into<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            message_id,
            a_address: sms.a_address.clone(),
            b_address: sms.b_address.clone(),
            body: sms.body.clone(),
            encoded_body: None,
            data_coding: sms.data_coding,
            status,
            description: description.into(),
            raw_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_encoded_body(mut self, encoded_body: Option<String>) -> Self {
        self.encoded_body = encoded_body;
        self
    }

    #[must_use]
    pub fn with_raw_response(mut self, raw_response: Option<String>) -> Self {
        self.raw_response = raw_response;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [MessageStatus; 5] = MessageStatus::ALL;

    #[test]
    fn test_terminal_states_never_move() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn test_allowed_transitions() {
        use MessageStatus::*;
        assert!(Submitted.can_transition_to(Delivered));
        assert!(Submitted.can_transition_to(Failed));
        assert!(Submitted.can_transition_to(Cancelled));
        assert!(Submitted.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Cancelled));
        assert!(Sent.can_transition_to(Delivered));
        assert!(!Sent.can_transition_to(Submitted));
    }

    #[test]
    fn test_predecessors() {
        assert_eq!(
            MessageStatus::predecessors(MessageStatus::Cancelled),
            vec![MessageStatus::Submitted, MessageStatus::Sent]
        );
        assert!(MessageStatus::predecessors(MessageStatus::Submitted).is_empty());
    }

    #[test]
    fn test_transition_classification() {
        use MessageStatus::*;
        assert_eq!(Submitted.transition(Submitted), Transition::Unchanged);
        assert_eq!(Delivered.transition(Delivered), Transition::Unchanged);
        assert_eq!(Submitted.transition(Delivered), Transition::Applied);
        assert_eq!(Delivered.transition(Cancelled), Transition::Rejected { current: Delivered });
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<MessageStatus>(), Ok(status));
            assert_eq!(MessageStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(MessageStatus::from_code(9), None);
        assert!("Cancelado".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(MessageId::generate(), MessageId::generate());
    }
}
