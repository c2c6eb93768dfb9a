#![allow(clippy::unwrap_used)]

use crate::adapters::transport::{Transport, TransportError};
use crate::domain::delivery::{Ack, TransportResult};
use crate::domain::message::{MessageId, MessageStatus, OutboundSms};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-process backend with scripted answers.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    pub(crate) failing: HashSet<String>,
    pub(crate) delay: Duration,
    pub(crate) query_status: Option<MessageStatus>,
    pub(crate) reject_cancel: bool,
    /// Answers every submit with this id instead of a fresh one.
    pub(crate) fixed_id: Option<&'static str>,
    pub(crate) next_id: AtomicUsize,
    pub(crate) in_flight: AtomicUsize,
    pub(crate) peak_in_flight: AtomicUsize,
    pub(crate) submitted: Mutex<Vec<OutboundSms>>,
    pub(crate) cancelled: Mutex<Vec<MessageId>>,
}

impl ScriptedTransport {
    pub(crate) fn failing_for(addresses: &[&str]) -> Self {
        Self { failing: addresses.iter().map(|a| (*a).to_string()).collect(), ..Self::default() }
    }

    pub(crate) fn submit_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn submit(&self, sms: &OutboundSms) -> TransportResult {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.submitted.lock().unwrap().push(sms.clone());
        if self.failing.contains(&sms.b_address) {
            return TransportResult::failed("ESME_RSUBMITFAIL", Some("submit_sm_resp 0x45".into()));
        }
        let id = match self.fixed_id {
            Some(id) => id.to_string(),
            None => format!("SMSC-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        };
        TransportResult::accepted(Some(MessageId::new(id.clone())), Some(format!("message_id={id}")))
    }

    async fn query(&self, _message_id: &MessageId, _a_address: &str) -> Result<MessageStatus, TransportError> {
        self.query_status.ok_or_else(|| TransportError::Rejected("query not supported".into()))
    }

    async fn cancel(&self, message_id: &MessageId, _a_address: &str) -> Result<Ack, TransportError> {
        if self.reject_cancel {
            return Err(TransportError::Rejected("cancel_sm failed".into()));
        }
        self.cancelled.lock().unwrap().push(message_id.clone());
        Ok(Ack { raw_response: None })
    }
}
