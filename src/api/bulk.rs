use crate::api::AppState;
use crate::api::messages::send_envelope;
use crate::envelope::{self, BulkResultEntry, BulkSendResponse};
use crate::error::{AppError, Result};
use crate::services::bulk_service::PerRecipientResult;
use axum::{Json, body::Bytes, extract::State, response::IntoResponse};

fn entry(result: &PerRecipientResult) -> BulkResultEntry {
    BulkResultEntry {
        b_address: result.b_address.clone(),
        status: if result.outcome.is_success() { "success" } else { "failed" }.to_string(),
        response: envelope::encode_send_response(&send_envelope(&result.outcome)),
        message_id: result.outcome.message_id().map(|id| id.as_str().to_string()),
    }
}

/// Sends one message to many recipients.
///
/// # Errors
/// Returns `AppError::BadRequest` for malformed JSON, a missing `aAddress` or `Message`, or an
/// empty `bAddresses` list.
pub async fn bulk_send(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse> {
    let request = envelope::decode_bulk(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let results = state.bulk_service.submit_bulk(request).await?;

    let response = BulkSendResponse { results: results.iter().map(entry).collect() };
    Ok(Json(response))
}
