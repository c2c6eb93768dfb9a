use crate::adapters::ledger::{LedgerError, MessageLedger};
use crate::adapters::transport::Transport;
use crate::domain::address;
use crate::domain::delivery::TransportResult;
use crate::domain::message::{Message, MessageId, MessageStatus, OutboundSms, Transition};
use crate::domain::request::{CancelRequest, SendRequest};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    submitted_total: Counter<u64>,
    cancelled_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("sms-gateway");
        Self {
            submitted_total: meter
                .u64_counter("smsgw_messages_submitted_total")
                .with_description("Messages handled by the send path, by outcome")
                .build(),
            cancelled_total: meter
                .u64_counter("smsgw_messages_cancelled_total")
                .with_description("Cancel requests, by outcome")
                .build(),
        }
    }
}

/// Which address of a submission failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressField {
    Origin,
    Destination,
}

impl AddressField {
    /// Wire element name.
    #[must_use]
    pub const fn element(self) -> &'static str {
        match self {
            Self::Origin => "aAddress",
            Self::Destination => "bAddress",
        }
    }
}

impl fmt::Display for AddressField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Rejected before any backend or ledger call.
    InvalidAddress(AddressField),
    /// The backend was called (or the call was cancelled) and the attempt was recorded under
    /// `message_id`, unless `ledger_error` says the write failed.
    Dispatched { message_id: MessageId, result: TransportResult, ledger_error: Option<String> },
    /// The dispatch task died before producing a result. Nothing was recorded.
    Aborted(String),
}

impl SendOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Dispatched { result, .. } if result.success)
    }

    #[must_use]
    pub const fn message_id(&self) -> Option<&MessageId> {
        match self {
            Self::Dispatched { message_id, .. } => Some(message_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Found(Message),
    NotFound,
    LedgerUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled { message_id: MessageId, ledger_error: Option<String> },
    MissingFields,
    NotFound,
    AddressMismatch,
    NotCancellable(MessageStatus),
    BackendRejected(String),
    LedgerUnavailable(String),
}

/// Checks both addresses, origin first.
///
/// # Errors
/// Returns the first field that is not a valid address.
pub fn check_addresses(sms: &OutboundSms) -> Result<(), AddressField> {
    if !address::validate(&sms.a_address) {
        return Err(AddressField::Origin);
    }
    if !address::validate(&sms.b_address) {
        return Err(AddressField::Destination);
    }
    Ok(())
}

/// Description stored when a status is learned from the backend.
const fn refreshed_description(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Submitted => "Message submitted",
        MessageStatus::Sent => "Message sent to the network",
        MessageStatus::Delivered => "Message delivered",
        MessageStatus::Failed => "Message delivery failed",
        MessageStatus::Cancelled => "Message cancelled",
    }
}

/// Send, query and cancel against the active transport, recording every attempt in the ledger.
#[derive(Clone, Debug)]
pub struct GatewayService {
    ledger: Arc<dyn MessageLedger>,
    transport: Arc<dyn Transport>,
    system_identity: String,
    legacy_response_lookup: bool,
    metrics: Metrics,
}

impl GatewayService {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn MessageLedger>,
        transport: Arc<dyn Transport>,
        system_identity: String,
        legacy_response_lookup: bool,
    ) -> Self {
        Self { ledger, transport, system_identity, legacy_response_lookup, metrics: Metrics::new() }
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Validates, submits and records one message.
    #[tracing::instrument(skip(self, request), fields(b_address = %request.b_address, transport = self.transport.name()))]
    pub async fn send(&self, request: SendRequest) -> SendOutcome {
        let sms = OutboundSms {
            a_address: request.a_address.unwrap_or_else(|| self.system_identity.clone()),
            b_address: request.b_address,
            body: request.body,
            data_coding: request.data_coding,
        };

        if let Err(field) = check_addresses(&sms) {
            tracing::info!(field = %field, "Rejected submission with invalid address");
            self.metrics.submitted_total.add(1, &[KeyValue::new("status", "invalid")]);
            return SendOutcome::InvalidAddress(field);
        }

        // Detached: the ledger write must survive the request future being dropped
        let gateway = self.clone();
        let handle = tokio::spawn(
            async move {
                let result = gateway.transport.submit(&sms).await;
                gateway.record(&sms, result).await
            }
            .in_current_span(),
        );
        handle.await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Send task failed");
            SendOutcome::Aborted(e.to_string())
        })
    }

    /// Writes the outcome of a backend call to the ledger.
    ///
    /// The record is keyed by the backend's message id, or a fresh local id when the backend
    /// gave none or reused one already on file. A ledger failure is reported alongside the
    /// delivery result, never instead of it.
    pub(crate) async fn record(&self, sms: &OutboundSms, result: TransportResult) -> SendOutcome {
        let message_id = result.message_id.clone().unwrap_or_else(MessageId::generate);
        let status = if result.success { MessageStatus::Submitted } else { MessageStatus::Failed };
        self.metrics.submitted_total.add(1, &[KeyValue::new("status", status.as_str())]);

        let message = Message::new(message_id, sms, status, result.summary())
            .with_encoded_body(result.encoded_body.clone())
            .with_raw_response(result.raw_response.clone());

        let (message_id, inserted) = self.store(message).await;
        let ledger_error = match inserted {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(error = %e, message_id = %message_id, delivered = result.success, "Failed to record message");
                Some(e.to_string())
            }
        };

        if result.success {
            tracing::info!(message_id = %message_id, "Message submitted");
        } else {
            tracing::warn!(message_id = %message_id, error = ?result.error, "Message submission failed");
        }

        SendOutcome::Dispatched { message_id, result, ledger_error }
    }

    /// Inserts `message`, moving it under a local id if the backend id is already taken. The
    /// backend id is kept at the front of `raw_response`.
    async fn store(&self, message: Message) -> (MessageId, Result<(), LedgerError>) {
        match self.ledger.insert(&message).await {
            Err(LedgerError::Duplicate(backend_id)) => {
                let local_id = MessageId::generate();
                tracing::warn!(%backend_id, message_id = %local_id, "Backend reused a recorded message id; storing under a local id");
                let raw_response = Some(match message.raw_response.as_deref() {
                    Some(raw) => format!("backend message_id={backend_id}; {raw}"),
                    None => format!("backend message_id={backend_id}"),
                });
                let message = Message { message_id: local_id.clone(), raw_response, ..message };
                let inserted = self.ledger.insert(&message).await;
                (local_id, inserted)
            }
            other => (message.message_id, other),
        }
    }

    /// Looks up a message, refreshing a non-terminal status from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn query(&self, message_id: &str) -> QueryOutcome {
        let id = MessageId::new(message_id.trim());
        if id.as_str().is_empty() {
            return QueryOutcome::NotFound;
        }

        let mut message = match self.ledger.find_by_message_id(&id).await {
            Ok(Some(message)) => message,
            Ok(None) => return QueryOutcome::NotFound,
            Err(e) => {
                tracing::error!(error = %e, "Ledger lookup failed");
                return QueryOutcome::LedgerUnavailable(e.to_string());
            }
        };

        if !message.status.is_terminal() {
            self.refresh(&mut message).await;
        }
        QueryOutcome::Found(message)
    }

    async fn refresh(&self, message: &mut Message) {
        let latest = match self.transport.query(&message.message_id, &message.a_address).await {
            Ok(status) => status,
            Err(e) => {
                tracing::debug!(error = %e, "Backend status query failed; answering with stored status");
                return;
            }
        };
        if latest == message.status {
            return;
        }

        let description = refreshed_description(latest);
        match self.ledger.update_status(&message.message_id, latest, description).await {
            Ok(Transition::Applied) => {
                tracing::info!(from = %message.status, to = %latest, "Status refreshed from backend");
                message.status = latest;
                message.description = description.to_string();
            }
            Ok(Transition::Unchanged) => {}
            Ok(Transition::Rejected { current }) => {
                tracing::debug!(current = %current, reported = %latest, "Ignoring backend status");
            }
            Err(e) => tracing::error!(error = %e, "Failed to record refreshed status"),
        }
    }

    /// Cancels a message that has not reached a terminal state.
    ///
    /// The backend is asked first; the ledger only changes once the backend agreed.
    #[tracing::instrument(skip(self, request), fields(message_id = ?request.message_id))]
    pub async fn cancel(&self, request: CancelRequest) -> CancelOutcome {
        let outcome = self.cancel_inner(request).await;
        let label = match &outcome {
            CancelOutcome::Cancelled { .. } => "cancelled",
            CancelOutcome::BackendRejected(_) => "backend_rejected",
            CancelOutcome::LedgerUnavailable(_) => "ledger_unavailable",
            _ => "rejected",
        };
        self.metrics.cancelled_total.add(1, &[KeyValue::new("status", label)]);
        outcome
    }

    async fn cancel_inner(&self, request: CancelRequest) -> CancelOutcome {
        let (Some(message_id), Some(a_address)) = (request.message_id, request.a_address) else {
            return CancelOutcome::MissingFields;
        };

        let message = match self.lookup_for_cancel(&MessageId::new(message_id)).await {
            Ok(Some(message)) => message,
            Ok(None) => return CancelOutcome::NotFound,
            Err(e) => {
                tracing::error!(error = %e, "Ledger lookup failed");
                return CancelOutcome::LedgerUnavailable(e.to_string());
            }
        };

        if message.a_address != a_address {
            tracing::info!("Cancel rejected: aAddress does not own the message");
            return CancelOutcome::AddressMismatch;
        }
        if message.status.is_terminal() {
            return CancelOutcome::NotCancellable(message.status);
        }

        if let Err(e) = self.transport.cancel(&message.message_id, &message.a_address).await {
            tracing::warn!(error = %e, "Backend refused cancel");
            return CancelOutcome::BackendRejected(e.to_string());
        }

        match self.ledger.update_status(&message.message_id, MessageStatus::Cancelled, "Message cancelled").await {
            Ok(Transition::Applied | Transition::Unchanged) => {
                tracing::info!(message_id = %message.message_id, "Message cancelled");
                CancelOutcome::Cancelled { message_id: message.message_id, ledger_error: None }
            }
            // Reached a terminal state between the lookup and the update
            Ok(Transition::Rejected { current }) => CancelOutcome::NotCancellable(current),
            Err(e) => {
                tracing::error!(error = %e, "Backend cancelled the message but the ledger update failed");
                CancelOutcome::Cancelled { message_id: message.message_id, ledger_error: Some(e.to_string()) }
            }
        }
    }

    async fn lookup_for_cancel(&self, id: &MessageId) -> Result<Option<Message>, LedgerError> {
        if let Some(message) = self.ledger.find_by_message_id(id).await? {
            return Ok(Some(message));
        }
        if !self.legacy_response_lookup {
            return Ok(None);
        }
        let found = self.ledger.find_by_response_pattern(id.as_str()).await?;
        if found.is_some() {
            tracing::debug!("Resolved cancel target through stored backend response");
        }
        Ok(found)
    }
}
