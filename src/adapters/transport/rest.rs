use crate::adapters::transport::{Transport, TransportError, bounded};
use crate::config::{ConfigError, ProxyConfig};
use crate::domain::delivery::{Ack, TransportResult};
use crate::domain::message::{MessageId, MessageStatus, OutboundSms};
use crate::envelope::{self, ResponseEnvelope};
use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// One fully addressed request to the REST backend.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub method: Method,
    pub url: String,
    pub bearer_token: String,
    pub content_type: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExchangeResponse {
    pub status: u16,
    pub body: String,
}

impl ExchangeResponse {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// How a request physically reaches the REST backend.
#[async_trait]
pub trait HttpExchange: Send + Sync + std::fmt::Debug {
    /// Performs the request. Only transport-level problems are errors; every HTTP status is a response.
    async fn exchange(&self, request: ExchangeRequest) -> Result<ExchangeResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestExchange {
    client: reqwest::Client,
}

impl ReqwestExchange {
    /// # Errors
    /// Returns the underlying `reqwest` error if the client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpExchange for ReqwestExchange {
    async fn exchange(&self, request: ExchangeRequest) -> Result<ExchangeResponse, TransportError> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        let mut builder = builder
            .header(AUTHORIZATION, format!("Bearer {}", request.bearer_token))
            .header(CONTENT_TYPE, request.content_type);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| TransportError::Http(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(ExchangeResponse { status, body })
    }
}

/// Talks to an `AoSms*` REST backend through any [`HttpExchange`].
///
/// Message bodies are sent base64-encoded; the encoded form is returned in the result so it
/// can be recorded.
#[derive(Debug, Clone)]
pub struct RestTransport<E> {
    name: &'static str,
    exchange: E,
    bearer_token: String,
    content_type: String,
    send_url: Url,
    query_url: Url,
    cancel_url: Url,
    timeout: Duration,
}

fn endpoint_url(base_url: &str, endpoint: &str) -> Result<Url, ConfigError> {
    let joined = format!("{}/{}", base_url.trim_end_matches('/'), endpoint.trim_start_matches('/'));
    Url::parse(&joined).map_err(|e| ConfigError::Invalid { name: "proxy-base-url", reason: format!("{joined}: {e}") })
}

impl<E: HttpExchange> RestTransport<E> {
    /// # Errors
    /// Returns `ConfigError` if the base URL or token is missing, or an endpoint URL is invalid.
    pub fn new(name: &'static str, exchange: E, config: &ProxyConfig, timeout: Duration) -> Result<Self, ConfigError> {
        let base_url = config.base_url.as_deref().ok_or(ConfigError::Missing("proxy-base-url"))?;
        let bearer_token = config.token.clone().ok_or(ConfigError::Missing("proxy-token"))?;
        Ok(Self {
            name,
            exchange,
            bearer_token,
            content_type: config.content_type.clone(),
            send_url: endpoint_url(base_url, &config.send_endpoint)?,
            query_url: endpoint_url(base_url, &config.query_endpoint)?,
            cancel_url: endpoint_url(base_url, &config.cancel_endpoint)?,
            timeout,
        })
    }

    fn request(&self, method: Method, url: &Url, body: Option<String>) -> ExchangeRequest {
        ExchangeRequest {
            method,
            url: url.to_string(),
            bearer_token: self.bearer_token.clone(),
            content_type: self.content_type.clone(),
            body,
        }
    }

    async fn call(&self, request: ExchangeRequest) -> Result<ExchangeResponse, TransportError> {
        bounded(self.timeout, self.exchange.exchange(request)).await
    }

    /// Decodes a response that must be a 2xx carrying a success envelope.
    fn expect_success(response: &ExchangeResponse) -> Result<ResponseEnvelope, TransportError> {
        if !response.is_success() {
            return Err(TransportError::Rejected(format!("backend returned HTTP {}", response.status)));
        }
        let parsed = envelope::decode_response(&response.body).map_err(|e| TransportError::Malformed(e.to_string()))?;
        if !parsed.is_success() {
            return Err(TransportError::Rejected(parsed.description));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl<E: HttpExchange> Transport for RestTransport<E> {
    fn name(&self) -> &'static str {
        self.name
    }

    #[tracing::instrument(level = "debug", skip(self, sms), fields(transport = self.name, b_address = %sms.b_address))]
    async fn submit(&self, sms: &OutboundSms) -> TransportResult {
        let (xml, encoded) = envelope::encode_send_request(sms, true);
        let encoded = encoded.unwrap_or_default();

        let result = match self.call(self.request(Method::Post, &self.send_url, Some(xml))).await {
            Err(e) => {
                tracing::warn!(error = %e, "REST submit failed");
                TransportResult::failed(e.to_string(), None)
            }
            Ok(response) if !response.is_success() => {
                tracing::warn!(status = response.status, "REST backend rejected submit");
                TransportResult::failed(format!("backend returned HTTP {}", response.status), Some(response.body))
            }
            Ok(response) => match envelope::decode_response(&response.body) {
                Ok(parsed) if !parsed.is_success() => TransportResult::failed(parsed.description, Some(response.body)),
                Ok(parsed) => {
                    let id = parsed.message_id().map(MessageId::new);
                    TransportResult::accepted(id, Some(response.body))
                }
                // A 2xx without a readable envelope still counts as accepted
                Err(_) => TransportResult::accepted(None, Some(response.body)),
            },
        };
        result.with_encoded_body(encoded)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(transport = self.name))]
    async fn query(&self, message_id: &MessageId, _a_address: &str) -> Result<MessageStatus, TransportError> {
        let mut url = self.query_url.clone();
        url.query_pairs_mut().append_pair("message_id", message_id.as_str());

        let response = self.call(self.request(Method::Get, &url, None)).await?;
        let parsed = Self::expect_success(&response)?;
        parsed
            .status_code()
            .and_then(MessageStatus::from_code)
            .ok_or_else(|| TransportError::Malformed(format!("unknown Status {:?}", parsed.result_list.result.status)))
    }

    #[tracing::instrument(level = "debug", skip(self), fields(transport = self.name))]
    async fn cancel(&self, message_id: &MessageId, a_address: &str) -> Result<Ack, TransportError> {
        let xml = envelope::encode_cancel_request(message_id.as_str(), a_address);
        let response = self.call(self.request(Method::Post, &self.cancel_url, Some(xml))).await?;
        Self::expect_success(&response)?;
        Ok(Ack { raw_response: Some(response.body) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{CODE_FAILURE, CODE_SUCCESS, ResponseEnvelope};
    use axum::{
        Router,
        extract::{Query, State},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Backend {
        seen: Arc<Mutex<Vec<(String, String)>>>,
        reject: bool,
    }

    async fn send(State(backend): State<Backend>, headers: HeaderMap, body: String) -> (StatusCode, String) {
        let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or_default().to_string();
        backend.seen.lock().unwrap().push((auth, body));
        if backend.reject {
            return (StatusCode::BAD_GATEWAY, "upstream down".to_string());
        }
        let env = ResponseEnvelope::new(CODE_SUCCESS, "No Error", Some("proxy-77"), 0, "Message sent successfully");
        (StatusCode::OK, envelope::encode_send_response(&env))
    }

    async fn query(Query(params): Query<HashMap<String, String>>) -> String {
        let id = params.get("message_id").cloned().unwrap_or_default();
        let env = if id == "proxy-77" {
            ResponseEnvelope::new(CODE_SUCCESS, "No Error", Some(&id), 2, "Delivered")
        } else {
            ResponseEnvelope::new(CODE_FAILURE, "Message not found", None, 3, "Message ID not found")
        };
        envelope::encode_send_response(&env)
    }

    async fn cancel(body: String) -> String {
        let req = envelope::decode_cancel(body.as_bytes()).unwrap();
        let env = ResponseEnvelope::new(CODE_SUCCESS, "No Error", req.message_id.as_deref(), 4, "Cancelled");
        envelope::encode_cancel_response(&env)
    }

    async fn spawn_backend(backend: Backend) -> String {
        let app = Router::new()
            .route("/sendMessage", post(send))
            .route("/queryMessage", get(query))
            .route("/cancelMessage", post(cancel))
            .with_state(backend);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn proxy_config(base_url: String) -> ProxyConfig {
        ProxyConfig { base_url: Some(base_url), token: Some("s3cret".into()), ..ProxyConfig::default() }
    }

    fn transport(base_url: String) -> RestTransport<ReqwestExchange> {
        let timeout = Duration::from_secs(5);
        RestTransport::new("proxy", ReqwestExchange::new(timeout).unwrap(), &proxy_config(base_url), timeout).unwrap()
    }

    fn sms() -> OutboundSms {
        OutboundSms { a_address: "SYS1".into(), b_address: "447700900123".into(), body: "Hello".into(), data_coding: 0 }
    }

    #[test]
    fn test_endpoint_url_joins_cleanly() {
        assert_eq!(endpoint_url("http://p.local/", "/sendMessage").unwrap().as_str(), "http://p.local/sendMessage");
        assert_eq!(endpoint_url("http://p.local/api", "queryMessage").unwrap().as_str(), "http://p.local/api/queryMessage");
        assert!(endpoint_url("not a url", "/x").is_err());
    }

    #[tokio::test]
    async fn test_submit_posts_base64_body_with_bearer() {
        let backend = Backend::default();
        let base = spawn_backend(backend.clone()).await;
        let result = transport(base).submit(&sms()).await;

        assert!(result.success);
        assert_eq!(result.message_id, Some(MessageId::new("proxy-77")));
        assert_eq!(result.encoded_body.as_deref(), Some("SGVsbG8="));
        assert!(result.raw_response.unwrap().contains("<MessageId>proxy-77</MessageId>"));

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].0, "Bearer s3cret");
        assert!(seen[0].1.contains("<Message>SGVsbG8=</Message>"));
        assert!(seen[0].1.contains("<Encoding>base64</Encoding>"));
    }

    #[tokio::test]
    async fn test_non_2xx_is_failure_with_raw_body() {
        let base = spawn_backend(Backend { reject: true, ..Backend::default() }).await;
        let result = transport(base).submit(&sms()).await;

        assert!(!result.success);
        assert_eq!(result.raw_response.as_deref(), Some("upstream down"));
        assert!(result.error.unwrap().contains("502"));
        assert_eq!(result.encoded_body.as_deref(), Some("SGVsbG8="));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let result = transport(base).submit(&sms()).await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_query_and_cancel() {
        let base = spawn_backend(Backend::default()).await;
        let transport = transport(base);

        let status = transport.query(&MessageId::new("proxy-77"), "SYS1").await.unwrap();
        assert_eq!(status, MessageStatus::Delivered);

        let err = transport.query(&MessageId::new("9999"), "SYS1").await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected(ref d) if d == "Message not found"));

        let ack = transport.cancel(&MessageId::new("proxy-77"), "SYS1").await.unwrap();
        assert!(ack.raw_response.unwrap().contains("AoSmcancelResponse"));
    }
}
