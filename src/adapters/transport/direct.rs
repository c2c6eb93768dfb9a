use crate::adapters::smpp::{BindCredentials, MessageState, ShortMessage, SmppConnector, SmppError, SmppSession};
use crate::adapters::transport::{Transport, TransportError, bounded};
use crate::domain::delivery::{Ack, TransportResult};
use crate::domain::message::{MessageId, MessageStatus, OutboundSms};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Delivers over a fresh SMPP session per call: connect, bind, operate, unbind.
#[derive(Debug, Clone)]
pub struct DirectTransport {
    connector: Arc<dyn SmppConnector>,
    credentials: BindCredentials,
    timeout: Duration,
}

impl DirectTransport {
    #[must_use]
    pub fn new(connector: Arc<dyn SmppConnector>, credentials: BindCredentials, timeout: Duration) -> Self {
        Self { connector, credentials, timeout }
    }

    async fn open(&self) -> Result<Box<dyn SmppSession>, SmppError> {
        let mut session = self.connector.connect().await?;
        if let Err(e) = session.bind_transmitter(&self.credentials).await {
            close(session.as_mut()).await;
            return Err(e);
        }
        Ok(session)
    }

    async fn submit_once(&self, sm: &ShortMessage) -> Result<String, TransportError> {
        let mut session = self.open().await?;
        let result = session.submit_sm(sm).await;
        close(session.as_mut()).await;
        Ok(result?)
    }

    async fn query_once(&self, message_id: &str, a_address: &str) -> Result<MessageState, TransportError> {
        let mut session = self.open().await?;
        let result = session.query_sm(message_id, a_address).await;
        close(session.as_mut()).await;
        Ok(result?)
    }

    async fn cancel_once(&self, message_id: &str, a_address: &str) -> Result<(), TransportError> {
        let mut session = self.open().await?;
        let result = session.cancel_sm(message_id, a_address).await;
        close(session.as_mut()).await;
        Ok(result?)
    }
}

/// Unbinds regardless of how the operation went. An unbind failure does not change the outcome.
async fn close(session: &mut dyn SmppSession) {
    if let Err(e) = session.unbind().await {
        tracing::debug!(error = %e, "SMPP unbind failed");
    }
}

const fn status_from_state(state: MessageState) -> MessageStatus {
    match state {
        MessageState::Enroute | MessageState::Accepted => MessageStatus::Sent,
        MessageState::Delivered => MessageStatus::Delivered,
        MessageState::Deleted => MessageStatus::Cancelled,
        MessageState::Expired | MessageState::Undeliverable | MessageState::Rejected => MessageStatus::Failed,
        MessageState::Unknown => MessageStatus::Submitted,
    }
}

#[async_trait]
impl Transport for DirectTransport {
    fn name(&self) -> &'static str {
        "smpp"
    }

    #[tracing::instrument(level = "debug", skip(self, sms), fields(b_address = %sms.b_address))]
    async fn submit(&self, sms: &OutboundSms) -> TransportResult {
        let sm = ShortMessage::new(&sms.a_address, &sms.b_address, &sms.body, sms.data_coding);

        match bounded(self.timeout, self.submit_once(&sm)).await {
            Ok(id) => TransportResult::accepted(Some(MessageId::new(id.clone())), Some(id)),
            Err(e) => {
                tracing::warn!(error = %e, "SMPP submit failed");
                TransportResult::failed(e.to_string(), None)
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn query(&self, message_id: &MessageId, a_address: &str) -> Result<MessageStatus, TransportError> {
        let state = bounded(self.timeout, self.query_once(message_id.as_str(), a_address)).await?;
        Ok(status_from_state(state))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn cancel(&self, message_id: &MessageId, a_address: &str) -> Result<Ack, TransportError> {
        bounded(self.timeout, self.cancel_once(message_id.as_str(), a_address)).await?;
        Ok(Ack { raw_response: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Script {
        fail_bind: bool,
        fail_submit: bool,
        hang_submit: bool,
        state: Option<MessageState>,
    }

    #[derive(Debug, Default)]
    struct Calls {
        unbinds: AtomicUsize,
        submitted: Mutex<Vec<ShortMessage>>,
    }

    #[derive(Debug)]
    struct FakeConnector {
        script: Arc<Script>,
        calls: Arc<Calls>,
    }

    struct FakeSession {
        script: Arc<Script>,
        calls: Arc<Calls>,
    }

    #[async_trait]
    impl SmppSession for FakeSession {
        async fn bind_transmitter(&mut self, credentials: &BindCredentials) -> Result<(), SmppError> {
            assert_eq!(credentials.system_id, "GW");
            if self.script.fail_bind {
                return Err(SmppError::Status { command: "bind_transmitter", status: 0x0E });
            }
            Ok(())
        }

        async fn submit_sm(&mut self, sm: &ShortMessage) -> Result<String, SmppError> {
            if self.script.hang_submit {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if self.script.fail_submit {
                return Err(SmppError::Status { command: "submit_sm", status: 0x0B });
            }
            self.calls.submitted.lock().unwrap().push(sm.clone());
            Ok("smsc-1".to_string())
        }

        async fn query_sm(&mut self, _message_id: &str, _source_addr: &str) -> Result<MessageState, SmppError> {
            self.script.state.ok_or(SmppError::Status { command: "query_sm", status: 0x67 })
        }

        async fn cancel_sm(&mut self, _message_id: &str, _source_addr: &str) -> Result<(), SmppError> {
            Ok(())
        }

        async fn unbind(&mut self) -> Result<(), SmppError> {
            self.calls.unbinds.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl SmppConnector for FakeConnector {
        async fn connect(&self) -> Result<Box<dyn SmppSession>, SmppError> {
            Ok(Box::new(FakeSession { script: Arc::clone(&self.script), calls: Arc::clone(&self.calls) }))
        }
    }

    fn fake_transport(script: Script) -> (DirectTransport, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let connector = FakeConnector { script: Arc::new(script), calls: Arc::clone(&calls) };
        let credentials = BindCredentials { system_id: "GW".into(), password: "pw".into(), system_type: String::new() };
        (DirectTransport::new(Arc::new(connector), credentials, Duration::from_millis(200)), calls)
    }

    fn sms() -> OutboundSms {
        OutboundSms { a_address: "SYS1".into(), b_address: "447700900123".into(), body: "Hello".into(), data_coding: 0 }
    }

    #[tokio::test]
    async fn test_submit_sends_plain_body_and_unbinds() {
        let (transport, calls) = fake_transport(Script::default());
        let result = transport.submit(&sms()).await;

        assert!(result.success);
        assert_eq!(result.message_id, Some(MessageId::new("smsc-1")));
        assert_eq!(result.encoded_body, None);
        assert_eq!(calls.submitted.lock().unwrap()[0].octets, b"Hello");
        assert_eq!(calls.unbinds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unbinds_after_failed_submit() {
        let (transport, calls) = fake_transport(Script { fail_submit: true, ..Script::default() });
        let result = transport.submit(&sms()).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("submit_sm"));
        assert_eq!(calls.unbinds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unbinds_after_failed_bind() {
        let (transport, calls) = fake_transport(Script { fail_bind: true, ..Script::default() });
        assert!(!transport.submit(&sms()).await.success);
        assert_eq!(calls.unbinds.load(Ordering::SeqCst), 1);
        assert!(calls.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_timeout_is_failure() {
        let (transport, _) = fake_transport(Script { hang_submit: true, ..Script::default() });
        let result = transport.submit(&sms()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_query_maps_state() {
        let (transport, calls) = fake_transport(Script { state: Some(MessageState::Delivered), ..Script::default() });
        let status = transport.query(&MessageId::new("smsc-1"), "SYS1").await.unwrap();
        assert_eq!(status, MessageStatus::Delivered);
        assert_eq!(calls.unbinds.load(Ordering::SeqCst), 1);

        let (transport, _) = fake_transport(Script::default());
        assert!(transport.query(&MessageId::new("smsc-1"), "SYS1").await.is_err());
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(status_from_state(MessageState::Enroute), MessageStatus::Sent);
        assert_eq!(status_from_state(MessageState::Undeliverable), MessageStatus::Failed);
        assert_eq!(status_from_state(MessageState::Deleted), MessageStatus::Cancelled);
        assert_eq!(status_from_state(MessageState::Unknown), MessageStatus::Submitted);
    }
}
