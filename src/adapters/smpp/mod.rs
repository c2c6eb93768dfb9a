//! SMPP 3.4 transmitter sessions.
//!
//! PDU framing and encoding come from `rusmpp`; this module only exposes the handful of
//! operations the gateway needs behind [`SmppSession`], so the transport can be driven by a fake
//! session in tests. Sessions are short-lived; there is no keep-alive or pooling.

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;

pub mod client;

pub use client::SmppClient;

/// Largest body that fits the `short_message` field of a single `submit_sm`.
pub const SHORT_MESSAGE_MAX: usize = 254;
const DATA_CODING_UCS2: u8 = 0x08;

#[derive(Error, Debug)]
pub enum SmppError {
    #[error("SMPP I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SMPP codec error: {0}")]
    Codec(String),
    #[error("{command} rejected by SMSC with command_status 0x{status:08X}")]
    Status { command: &'static str, status: u32 },
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("unexpected PDU {0}")]
    Unexpected(String),
    #[error("SMSC closed the connection")]
    Closed,
    #[error("message too long for a single submit_sm: {0} octets")]
    TooLong(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindCredentials {
    pub system_id: String,
    pub password: String,
    pub system_type: String,
}

/// One message as handed to `submit_sm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortMessage {
    pub source_addr: String,
    pub destination_addr: String,
    pub data_coding: u8,
    pub octets: Vec<u8>,
}

impl ShortMessage {
    /// Encodes `text` for `data_coding`: UCS-2 big-endian for 0x08, the raw bytes otherwise.
    #[must_use]
    pub fn new(source_addr: &str, destination_addr: &str, text: &str, data_coding: u8) -> Self {
        let octets = if data_coding == DATA_CODING_UCS2 {
            text.encode_utf16().flat_map(u16::to_be_bytes).collect()
        } else {
            text.as_bytes().to_vec()
        };
        Self { source_addr: source_addr.to_string(), destination_addr: destination_addr.to_string(), data_coding, octets }
    }
}

/// Message state reported by `query_sm_resp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Enroute,
    Delivered,
    Expired,
    Deleted,
    Undeliverable,
    Accepted,
    Unknown,
    Rejected,
}

impl MessageState {
    /// Maps the wire value of `message_state`. Values outside 1..=8 are reported as `Unknown`.
    #[must_use]
    pub const fn from_wire(value: u8) -> Self {
        match value {
            1 => Self::Enroute,
            2 => Self::Delivered,
            3 => Self::Expired,
            4 => Self::Deleted,
            5 => Self::Undeliverable,
            6 => Self::Accepted,
            8 => Self::Rejected,
            _ => Self::Unknown,
        }
    }
}

/// One bound session to an SMSC.
#[async_trait]
pub trait SmppSession: Send {
    async fn bind_transmitter(&mut self, credentials: &BindCredentials) -> Result<(), SmppError>;

    /// Submits a message and returns the SMSC-assigned `message_id`.
    async fn submit_sm(&mut self, sm: &ShortMessage) -> Result<String, SmppError>;

    async fn query_sm(&mut self, message_id: &str, source_addr: &str) -> Result<MessageState, SmppError>;

    async fn cancel_sm(&mut self, message_id: &str, source_addr: &str) -> Result<(), SmppError>;

    /// Unbinds and closes the underlying connection.
    async fn unbind(&mut self) -> Result<(), SmppError>;
}

/// Opens new sessions on demand.
#[async_trait]
pub trait SmppConnector: Send + Sync + std::fmt::Debug {
    async fn connect(&self) -> Result<Box<dyn SmppSession>, SmppError>;
}

#[derive(Clone, Debug)]
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self { address: format!("{host}:{port}") }
    }
}

#[async_trait]
impl SmppConnector for TcpConnector {
    #[tracing::instrument(level = "debug", skip(self), fields(smsc = %self.address))]
    async fn connect(&self) -> Result<Box<dyn SmppSession>, SmppError> {
        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(SmppClient::new(stream)))
    }
}
