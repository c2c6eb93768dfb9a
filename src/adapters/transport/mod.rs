//! Delivery backends.
//!
//! Every backend is reached through [`Transport`]. The gateway holds one `Arc<dyn Transport>`
//! chosen at startup; nothing downstream knows which variant is active.

use crate::adapters::smpp::{BindCredentials, SmppError, TcpConnector};
use crate::config::{Config, ConfigError, TransportKind};
use crate::domain::delivery::{Ack, TransportResult};
use crate::domain::message::{MessageId, MessageStatus, OutboundSms};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod direct;
pub mod rest;
pub mod tunnel;

pub use direct::DirectTransport;
pub use rest::{ReqwestExchange, RestTransport};
pub use tunnel::SshCurlExchange;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Smpp(#[from] SmppError),
    #[error("HTTP exchange failed: {0}")]
    Http(String),
    #[error("tunnel command failed: {0}")]
    Tunnel(String),
    #[error("backend rejected the request: {0}")]
    Rejected(String),
    #[error("unreadable backend response: {0}")]
    Malformed(String),
}

/// Uniform submit/query/cancel capability over one delivery backend.
///
/// Implementations hold only immutable per-call configuration and must bound every call
/// with their configured timeout.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Short backend label for logs and metrics.
    fn name(&self) -> &'static str;

    /// Hands one message to the backend. Failures are reported in the result, never raised.
    async fn submit(&self, sms: &OutboundSms) -> TransportResult;

    async fn query(&self, message_id: &MessageId, a_address: &str) -> Result<MessageStatus, TransportError>;

    async fn cancel(&self, message_id: &MessageId, a_address: &str) -> Result<Ack, TransportError>;
}

/// Runs `call` under `limit`, mapping expiry to [`TransportError::Timeout`].
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    tokio::time::timeout(limit, call).await.unwrap_or(Err(TransportError::Timeout(limit)))
}

/// Builds the transport selected by `--transport`.
///
/// # Errors
/// Returns `ConfigError` if the selected backend is missing required settings.
pub fn build(config: &Config) -> Result<Arc<dyn Transport>, ConfigError> {
    config.validate()?;
    let timeout = Duration::from_secs(config.transport.timeout_secs);

    let transport: Arc<dyn Transport> = match config.transport.kind {
        TransportKind::Smpp => {
            let host = config.smpp.host.as_deref().ok_or(ConfigError::Missing("smpp-host"))?;
            let credentials = BindCredentials {
                system_id: config.smpp.system_id.clone(),
                password: config.smpp.password.clone(),
                system_type: config.smpp.system_type.clone(),
            };
            Arc::new(DirectTransport::new(Arc::new(TcpConnector::new(host, config.smpp.port)), credentials, timeout))
        }
        TransportKind::Proxy => {
            let exchange = ReqwestExchange::new(timeout).map_err(|e| ConfigError::Invalid {
                name: "transport",
                reason: format!("cannot build HTTP client: {e}"),
            })?;
            Arc::new(RestTransport::new("proxy", exchange, &config.proxy, timeout)?)
        }
        TransportKind::Tunnel => {
            let exchange = SshCurlExchange::new(&config.tunnel)?;
            Arc::new(RestTransport::new("tunnel", exchange, &config.proxy, timeout)?)
        }
    };

    tracing::info!(transport = transport.name(), timeout_secs = timeout.as_secs(), "Transport configured");
    Ok(transport)
}
