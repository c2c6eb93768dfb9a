use crate::api::AppState;
use crate::envelope::{self, CODE_FAILURE, CODE_SUCCESS, ResponseEnvelope};
use crate::error::{AppError, Result};
use crate::services::gateway_service::{CancelOutcome, QueryOutcome, SendOutcome};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;

const STATUS_FAILED: u8 = 3;
const STATUS_CANCELLED: u8 = 4;

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub message_id: Option<String>,
}

fn xml(body: String) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/xml")], body)
}

/// Maps the outcome of one send onto the `AoSmsResponse` contract.
#[must_use]
pub fn send_envelope(outcome: &SendOutcome) -> ResponseEnvelope {
    match outcome {
        SendOutcome::InvalidAddress(field) => {
            ResponseEnvelope::new(CODE_FAILURE, format!("Invalid {field}"), None, STATUS_FAILED, "Invalid Address")
        }
        SendOutcome::Dispatched { message_id, result, ledger_error } if result.success => {
            let description = if ledger_error.is_some() {
                "No Error; message could not be recorded"
            } else {
                "No Error"
            };
            ResponseEnvelope::new(CODE_SUCCESS, description, Some(message_id.as_str()), 0, result.summary())
        }
        SendOutcome::Dispatched { message_id, result, .. } => ResponseEnvelope::new(
            CODE_FAILURE,
            "Message submission failed",
            Some(message_id.as_str()),
            STATUS_FAILED,
            result.summary(),
        ),
        SendOutcome::Aborted(reason) => {
            ResponseEnvelope::new(CODE_FAILURE, "Message submission failed", None, STATUS_FAILED, reason.clone())
        }
    }
}

fn query_envelope(outcome: &QueryOutcome) -> ResponseEnvelope {
    match outcome {
        QueryOutcome::Found(message) => ResponseEnvelope::new(
            CODE_SUCCESS,
            "No Error",
            Some(message.message_id.as_str()),
            message.status.code(),
            message.description.clone(),
        ),
        QueryOutcome::NotFound => {
            ResponseEnvelope::new(CODE_FAILURE, "Message not found", None, STATUS_FAILED, "Message ID not found")
        }
        QueryOutcome::LedgerUnavailable(_) => ResponseEnvelope::new(
            CODE_FAILURE,
            "Message store unavailable",
            None,
            STATUS_FAILED,
            "Message status could not be read",
        ),
    }
}

fn cancel_envelope(outcome: &CancelOutcome) -> ResponseEnvelope {
    match outcome {
        CancelOutcome::Cancelled { message_id, ledger_error } => {
            let description = if ledger_error.is_some() {
                "Message cancelled; status could not be recorded"
            } else {
                "Message cancelled successfully"
            };
            ResponseEnvelope::new(CODE_SUCCESS, "No Error", Some(message_id.as_str()), STATUS_CANCELLED, description)
        }
        CancelOutcome::MissingFields => ResponseEnvelope::new(
            CODE_FAILURE,
            "Missing MessageId or aAddress",
            None,
            STATUS_FAILED,
            "Both MessageId and aAddress are required",
        ),
        CancelOutcome::NotFound => {
            ResponseEnvelope::new(CODE_FAILURE, "Message not found", None, STATUS_FAILED, "Message ID not found")
        }
        CancelOutcome::AddressMismatch => ResponseEnvelope::new(
            CODE_FAILURE,
            "aAddress does not match the message",
            None,
            STATUS_FAILED,
            "Cancel not permitted",
        ),
        CancelOutcome::NotCancellable(status) => ResponseEnvelope::new(
            CODE_FAILURE,
            "Message cannot be cancelled",
            None,
            status.code(),
            format!("Message is already {status}"),
        ),
        CancelOutcome::BackendRejected(reason) => {
            ResponseEnvelope::new(CODE_FAILURE, "Cancel rejected by backend", None, STATUS_FAILED, reason.clone())
        }
        CancelOutcome::LedgerUnavailable(_) => ResponseEnvelope::new(
            CODE_FAILURE,
            "Message store unavailable",
            None,
            STATUS_FAILED,
            "An error occurred during cancellation",
        ),
    }
}

/// Submits one message.
///
/// # Errors
/// Returns `AppError::BadRequest` if the body is not a well-formed `AoSmsRequest`.
pub async fn send_message(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse> {
    let request = envelope::decode_send(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let outcome = state.gateway_service.send(request).await;
    Ok(xml(envelope::encode_send_response(&send_envelope(&outcome))))
}

/// Reports the stored status of a message.
///
/// # Errors
/// Returns `AppError::BadRequest` if `message_id` is absent.
pub async fn query_message(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<impl IntoResponse> {
    let message_id = params.message_id.ok_or_else(|| AppError::BadRequest("message_id is required".into()))?;
    let outcome = state.gateway_service.query(&message_id).await;
    Ok(xml(envelope::encode_send_response(&query_envelope(&outcome))))
}

/// Cancels a message that has not reached a terminal state.
///
/// # Errors
/// Returns `AppError::BadRequest` if the body is not a well-formed `AoSmcancelRequest`.
pub async fn cancel_message(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse> {
    let request = envelope::decode_cancel(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let outcome = state.gateway_service.cancel(request).await;
    Ok(xml(envelope::encode_cancel_response(&cancel_envelope(&outcome))))
}
