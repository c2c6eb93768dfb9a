use crate::adapters::ledger::MessageLedger;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub struct Metrics {
    pub status: Gauge<i64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("sms-gateway");
        Self {
            status: meter
                .i64_gauge("smsgw_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    ledger: Arc<dyn MessageLedger>,
    ping_timeout: Duration,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(ledger: Arc<dyn MessageLedger>, ping_timeout: Duration) -> Self {
        Self { ledger, ping_timeout, metrics: Metrics::new() }
    }

    /// Checks that the ledger store answers within the probe timeout.
    ///
    /// # Errors
    /// Returns a string describing the failure if the ledger is unreachable.
    pub async fn check_ledger(&self) -> Result<(), String> {
        match timeout(self.ping_timeout, self.ledger.ping()).await {
            Ok(Ok(())) => {
                self.metrics.status.record(1, &[KeyValue::new("component", "ledger")]);
                Ok(())
            }
            Ok(Err(e)) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "ledger")]);
                Err(format!("Ledger check failed: {e}"))
            }
            Err(_) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "ledger")]);
                Err("Ledger check timed out".to_string())
            }
        }
    }
}
