#![allow(dead_code, clippy::unwrap_used, clippy::missing_panics_doc, missing_debug_implementations, unreachable_pub)]

use async_trait::async_trait;
use sms_gateway::adapters::ledger::{InMemoryLedger, MessageLedger};
use sms_gateway::adapters::transport::{Transport, TransportError};
use sms_gateway::api::{self, MgmtState};
use sms_gateway::config::Config;
use sms_gateway::domain::delivery::{Ack, TransportResult};
use sms_gateway::domain::message::{MessageId, MessageStatus, OutboundSms};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::net::TcpListener;

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("sms_gateway=debug".parse().unwrap())
            .add_directive("sqlx=warn".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

pub fn get_test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.mgmt_port = 0;
    config.smpp.system_id = "SYS1".to_string();
    config.bulk.max_concurrency = 4;
    config.bulk.timeout_secs = 5;
    config
}

/// Backend stand-in that accepts everything except the configured destinations.
#[derive(Debug, Default)]
pub struct FakeTransport {
    pub failing: HashSet<String>,
    pub delay: Duration,
    next_id: AtomicUsize,
    pub submitted: Mutex<Vec<OutboundSms>>,
    pub cancelled: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn failing_for(destinations: &[&str]) -> Self {
        Self { failing: destinations.iter().map(ToString::to_string).collect(), ..Self::default() }
    }

    pub fn submitted_to(&self) -> Vec<String> {
        self.submitted.lock().unwrap().iter().map(|sms| sms.b_address.clone()).collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn submit(&self, sms: &OutboundSms) -> TransportResult {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.submitted.lock().unwrap().push(sms.clone());
        if self.failing.contains(&sms.b_address) {
            return TransportResult::failed("ESME_RSUBMITFAIL", Some("submit_sm_resp 0x45".into()));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        TransportResult::accepted(Some(MessageId::new(format!("SMSC-{n}"))), Some("submit_sm_resp 0x0".into()))
    }

    async fn query(&self, _message_id: &MessageId, _a_address: &str) -> Result<MessageStatus, TransportError> {
        Ok(MessageStatus::Sent)
    }

    async fn cancel(&self, message_id: &MessageId, _a_address: &str) -> Result<Ack, TransportError> {
        self.cancelled.lock().unwrap().push(message_id.as_str().to_string());
        Ok(Ack { raw_response: Some("cancel_sm_resp 0x0".into()) })
    }
}

pub struct TestApp {
    pub server_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub config: Config,
    pub ledger: Arc<InMemoryLedger>,
    pub transport: Arc<FakeTransport>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(get_test_config(), FakeTransport::default()).await
    }

    pub async fn spawn_with_transport(transport: FakeTransport) -> Self {
        Self::spawn_with(get_test_config(), transport).await
    }

    pub async fn spawn_with(config: Config, transport: FakeTransport) -> Self {
        setup_tracing();

        let ledger = Arc::new(InMemoryLedger::new());
        let transport = Arc::new(transport);
        let app = sms_gateway::build_app(
            &config,
            Arc::clone(&ledger) as Arc<dyn MessageLedger>,
            Arc::clone(&transport) as Arc<dyn Transport>,
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_url = format!("http://{}", listener.local_addr().unwrap());
        let mgmt_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_url = format!("http://{}", mgmt_listener.local_addr().unwrap());

        let app_router = api::app_router(&config, app.services);
        let mgmt_router = api::mgmt_router(MgmtState { health_service: app.health_service });

        tokio::spawn(async move {
            axum::serve(listener, app_router).await.unwrap();
        });
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt_router).await.unwrap();
        });

        Self { server_url, mgmt_url, client: reqwest::Client::new(), config, ledger, transport }
    }

    pub async fn post_xml(&self, path: &str, body: &str) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.server_url))
            .header("content-type", "application/xml")
            .body(body.to_string())
            .send()
            .await
            .unwrap()
    }
}

pub fn send_request(a_address: Option<&str>, b_address: &str, message: &str) -> String {
    let origin = a_address.map(|a| format!("<aAddress>{a}</aAddress>")).unwrap_or_default();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><AoSmsRequest><AoSms>{origin}<bAddress>{b_address}</bAddress>\
         <Message>{message}</Message></AoSms></AoSmsRequest>"
    )
}

pub fn cancel_request(message_id: &str, a_address: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><AoSmcancelRequest><AoSmcancel><MessageId>{message_id}</MessageId>\
         <aAddress>{a_address}</aAddress></AoSmcancel></AoSmcancelRequest>"
    )
}
