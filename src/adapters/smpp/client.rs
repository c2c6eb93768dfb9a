use crate::adapters::smpp::{BindCredentials, MessageState, SHORT_MESSAGE_MAX, ShortMessage, SmppError, SmppSession};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rusmpp::pdus::{BindTransmitter, CancelSm, QuerySm, SubmitSm};
use rusmpp::tokio_codec::CommandCodec;
use rusmpp::types::{COctetString, OctetString};
use rusmpp::values::{DataCoding, InterfaceVersion, Npi, Ton};
use rusmpp::{Command, CommandId, CommandStatus, Pdu};
use std::fmt;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Framed;

/// SMPP session over any byte stream, framed by `rusmpp`'s command codec.
pub struct SmppClient<S> {
    framed: Framed<S, CommandCodec>,
    sequence: u32,
}

impl<S> fmt::Debug for SmppClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmppClient").field("sequence", &self.sequence).finish_non_exhaustive()
    }
}

fn c_octet<const MIN: usize, const MAX: usize>(
    field: &'static str,
    value: &str,
) -> Result<COctetString<MIN, MAX>, SmppError> {
    COctetString::from_str(value).map_err(|e| SmppError::InvalidField { field, reason: e.to_string() })
}

impl<S> SmppClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    #[must_use]
    pub fn new(stream: S) -> Self {
        Self { framed: Framed::new(stream, CommandCodec::new()), sequence: 0 }
    }

    fn next_sequence(&mut self) -> u32 {
        // Sequence numbers run 0x00000001..=0x7FFFFFFF
        self.sequence = if self.sequence >= 0x7FFF_FFFF { 1 } else { self.sequence + 1 };
        self.sequence
    }

    async fn send(&mut self, command: Command) -> Result<(), SmppError> {
        self.framed.send(command).await.map_err(|e| SmppError::Codec(e.to_string()))
    }

    /// Sends `pdu` and waits for the matching response, answering any `enquire_link` the SMSC
    /// sends in between.
    async fn call(
        &mut self,
        command: &'static str,
        pdu: impl Into<Pdu> + Send,
        expected: CommandId,
    ) -> Result<Command, SmppError> {
        let sequence = self.next_sequence();
        self.send(Command::new(CommandStatus::EsmeRok, sequence, pdu)).await?;

        loop {
            let response = match self.framed.next().await {
                Some(Ok(response)) => response,
                Some(Err(e)) => return Err(SmppError::Codec(e.to_string())),
                None => return Err(SmppError::Closed),
            };

            match response.id() {
                CommandId::EnquireLink => {
                    let link = Command::new(CommandStatus::EsmeRok, response.sequence_number(), Pdu::EnquireLinkResp);
                    self.send(link).await?;
                }
                CommandId::GenericNack => {
                    return Err(SmppError::Status { command, status: u32::from(response.status()) });
                }
                id if id == expected && response.sequence_number() == sequence => {
                    if response.status() != CommandStatus::EsmeRok {
                        return Err(SmppError::Status { command, status: u32::from(response.status()) });
                    }
                    return Ok(response);
                }
                other => return Err(SmppError::Unexpected(format!("{other:?}"))),
            }
        }
    }
}

#[async_trait]
impl<S> SmppSession for SmppClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn bind_transmitter(&mut self, credentials: &BindCredentials) -> Result<(), SmppError> {
        let bind = BindTransmitter::builder()
            .system_id(c_octet("system_id", &credentials.system_id)?)
            .password(c_octet("password", &credentials.password)?)
            .system_type(c_octet("system_type", &credentials.system_type)?)
            .interface_version(InterfaceVersion::Smpp3_4)
            .build();
        self.call("bind_transmitter", bind, CommandId::BindTransmitterResp).await?;
        Ok(())
    }

    async fn submit_sm(&mut self, sm: &ShortMessage) -> Result<String, SmppError> {
        if sm.octets.len() > SHORT_MESSAGE_MAX {
            return Err(SmppError::TooLong(sm.octets.len()));
        }
        let short_message = OctetString::new(sm.octets.clone())
            .map_err(|e| SmppError::InvalidField { field: "short_message", reason: e.to_string() })?;

        let submit = SubmitSm::builder()
            .source_addr_ton(Ton::International)
            .source_addr_npi(Npi::Isdn)
            .source_addr(c_octet("source_addr", &sm.source_addr)?)
            .dest_addr_ton(Ton::International)
            .dest_addr_npi(Npi::Isdn)
            .destination_addr(c_octet("destination_addr", &sm.destination_addr)?)
            .data_coding(DataCoding::from(sm.data_coding))
            .short_message(short_message)
            .build();

        let response = self.call("submit_sm", submit, CommandId::SubmitSmResp).await?;
        match response.pdu() {
            Some(Pdu::SubmitSmResp(resp)) => Ok(resp.message_id().to_string()),
            _ => Err(SmppError::Unexpected("submit_sm_resp without a body".into())),
        }
    }

    async fn query_sm(&mut self, message_id: &str, source_addr: &str) -> Result<MessageState, SmppError> {
        let query = QuerySm::builder()
            .message_id(c_octet("message_id", message_id)?)
            .source_addr_ton(Ton::International)
            .source_addr_npi(Npi::Isdn)
            .source_addr(c_octet("source_addr", source_addr)?)
            .build();

        let response = self.call("query_sm", query, CommandId::QuerySmResp).await?;
        match response.pdu() {
            Some(Pdu::QuerySmResp(resp)) => Ok(MessageState::from_wire(u8::from(resp.message_state))),
            _ => Err(SmppError::Unexpected("query_sm_resp without a body".into())),
        }
    }

    async fn cancel_sm(&mut self, message_id: &str, source_addr: &str) -> Result<(), SmppError> {
        let cancel = CancelSm::builder()
            .message_id(c_octet("message_id", message_id)?)
            .source_addr_ton(Ton::International)
            .source_addr_npi(Npi::Isdn)
            .source_addr(c_octet("source_addr", source_addr)?)
            .build();
        self.call("cancel_sm", cancel, CommandId::CancelSmResp).await?;
        Ok(())
    }

    async fn unbind(&mut self) -> Result<(), SmppError> {
        let result = self.call("unbind", Pdu::Unbind, CommandId::UnbindResp).await;
        // Close the socket whether or not the SMSC acknowledged
        let _ = self.framed.get_mut().shutdown().await;
        result.map(|_| ())
    }
}
