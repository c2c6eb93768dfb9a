use crate::domain::delivery::TransportResult;
use crate::domain::message::OutboundSms;
use crate::domain::request::BulkRequest;
use crate::error::AppError;
use crate::services::gateway_service::{GatewayService, SendOutcome, check_addresses};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use opentelemetry::{global, metrics::Histogram};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

const CANCELLED: &str = "cancelled";

#[derive(Clone, Debug)]
struct Metrics {
    batch_size: Histogram<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("sms-gateway");
        Self {
            batch_size: meter
                .u64_histogram("smsgw_bulk_batch_size")
                .with_description("Recipients per bulk request")
                .build(),
        }
    }
}

/// Malformed top-level bulk input. Nothing is dispatched.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BulkError {
    #[error("aAddress is required")]
    MissingOrigin,
    #[error("bAddresses must contain at least one recipient")]
    NoRecipients,
    #[error("Message is required")]
    MissingBody,
}

impl From<BulkError> for AppError {
    fn from(e: BulkError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerRecipientResult {
    pub b_address: String,
    pub outcome: SendOutcome,
}

/// Fans one body out to many recipients through the gateway's transport.
///
/// Clones share one dispatch limiter, so `max_concurrency` caps backend calls across every bulk
/// request in flight, not per request.
#[derive(Clone, Debug)]
pub struct BulkService {
    gateway: GatewayService,
    limiter: Arc<Semaphore>,
    deadline: Duration,
    metrics: Metrics,
}

impl BulkService {
    #[must_use]
    pub fn new(gateway: GatewayService, max_concurrency: usize, deadline: Duration) -> Self {
        Self { gateway, limiter: Arc::new(Semaphore::new(max_concurrency.max(1))), deadline, metrics: Metrics::new() }
    }

    /// Dispatches one send per recipient and returns exactly one result per recipient, in
    /// completion order.
    ///
    /// Children run as detached tasks. If this future is dropped, or the deadline passes, every
    /// child still waiting on the backend is cancelled and recorded as failed.
    ///
    /// # Errors
    /// Returns `BulkError` for malformed top-level input.
    #[tracing::instrument(skip(self, request), fields(recipients = request.b_addresses.len()))]
    pub async fn submit_bulk(&self, request: BulkRequest) -> Result<Vec<PerRecipientResult>, BulkError> {
        let a_address = request.a_address.filter(|a| !a.is_empty()).ok_or(BulkError::MissingOrigin)?;
        let body = request.body.filter(|b| !b.trim().is_empty()).ok_or(BulkError::MissingBody)?;
        if request.b_addresses.is_empty() {
            return Err(BulkError::NoRecipients);
        }

        let total = request.b_addresses.len();
        self.metrics.batch_size.record(u64::try_from(total).unwrap_or(u64::MAX), &[]);

        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();

        let mut pending = FuturesUnordered::new();
        for (index, b_address) in request.b_addresses.into_iter().enumerate() {
            let sms = OutboundSms {
                a_address: a_address.clone(),
                b_address: b_address.clone(),
                body: body.clone(),
                data_coding: request.data_coding,
            };
            let child = dispatch(self.gateway.clone(), sms, Arc::clone(&self.limiter), cancel.clone())
                .instrument(tracing::debug_span!("bulk_recipient", index, b_address = %b_address));
            let handle = tokio::spawn(child);
            pending.push(async move { (b_address, handle.await) });
        }

        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);

        let mut results = Vec::with_capacity(total);
        loop {
            tokio::select! {
                next = pending.next() => {
                    let Some((b_address, joined)) = next else { break };
                    let outcome = joined.unwrap_or_else(|e| {
                        tracing::error!(error = %e, "Bulk dispatch task failed");
                        SendOutcome::Aborted(e.to_string())
                    });
                    results.push(PerRecipientResult { b_address, outcome });
                }
                () = &mut deadline, if !cancel.is_cancelled() => {
                    tracing::warn!(deadline = ?self.deadline, "Bulk deadline passed; cancelling unfinished recipients");
                    cancel.cancel();
                }
            }
        }

        let succeeded = results.iter().filter(|r| r.outcome.is_success()).count();
        tracing::info!(total, succeeded, failed = total - succeeded, "Bulk request finished");
        Ok(results)
    }
}

/// One recipient: validate, wait for a slot, call the backend, record.
///
/// Cancellation only interrupts the wait and the backend call; the ledger write always happens.
async fn dispatch(
    gateway: GatewayService,
    sms: OutboundSms,
    limiter: Arc<Semaphore>,
    cancel: CancellationToken,
) -> SendOutcome {
    if let Err(field) = check_addresses(&sms) {
        return SendOutcome::InvalidAddress(field);
    }

    let transport = Arc::clone(gateway.transport());
    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => TransportResult::failed(CANCELLED, None),
        result = async {
            let Ok(_permit) = limiter.acquire().await else {
                return TransportResult::failed("dispatch limiter closed", None);
            };
            transport.submit(&sms).await
        } => result,
    };

    gateway.record(&sms, result).await
}
