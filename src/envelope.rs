//! Wire envelopes exchanged at the gateway boundary.
//!
//! Send, query and cancel use XML (`AoSmsRequest`, `AoSmcancelRequest` and their responses);
//! bulk submission uses JSON. Element names are part of the contract and must not change.

use crate::domain::message::OutboundSms;
use crate::domain::request::{BulkRequest, CancelRequest, SendRequest};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SEND_REQUEST_ROOT: &str = "AoSmsRequest";
pub const SEND_RESPONSE_ROOT: &str = "AoSmsResponse";
pub const CANCEL_REQUEST_ROOT: &str = "AoSmcancelRequest";
pub const CANCEL_RESPONSE_ROOT: &str = "AoSmcancelResponse";

pub const CODE_SUCCESS: &str = "0";
pub const CODE_FAILURE: &str = "1";

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";
const BASE64_ENCODING: &str = "base64";

/// A request body that cannot be turned into a typed request at all.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("request body is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed XML envelope: {0}")]
    Xml(String),
    #[error("expected <{expected}> envelope, found <{found}>")]
    UnexpectedRoot { expected: &'static str, found: String },
    #[error("malformed JSON envelope: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} is not valid base64")]
    Base64(&'static str),
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl From<quick_xml::de::DeError> for DecodeError {
    fn from(e: quick_xml::de::DeError) -> Self {
        Self::Xml(e.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AoSmsRequest {
    #[serde(rename = "AoSms")]
    pub ao_sms: AoSms,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AoSms {
    #[serde(rename = "aAddress", default, skip_serializing_if = "Option::is_none")]
    pub a_address: Option<String>,
    #[serde(rename = "bAddress")]
    pub b_address: String,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "DataCodingScheme", default, skip_serializing_if = "Option::is_none")]
    pub data_coding: Option<u8>,
    /// Set to `base64` when `Message` carries the re-encoded body.
    #[serde(rename = "Encoding", default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AoSmcancelRequest {
    #[serde(rename = "AoSmcancel")]
    pub ao_sm_cancel: AoSmcancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AoSmcancel {
    #[serde(rename = "MessageId", default)]
    pub message_id: Option<String>,
    #[serde(rename = "aAddress", default)]
    pub a_address: Option<String>,
}

/// Response envelope shared by send, query (`AoSmsResponse`) and cancel (`AoSmcancelResponse`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "ResultList")]
    pub result_list: ResultList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultList {
    #[serde(rename = "Result")]
    pub result: ResultEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Empty when there is no message id to report.
    #[serde(rename = "MessageId", default)]
    pub message_id: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Description", default)]
    pub description: String,
}

impl ResponseEnvelope {
    #[must_use]
    pub fn new(
        code: &str,
        description: impl Into<String>,
        message_id: Option<&str>,
        status: u8,
        result_description: impl Into<String>,
    ) -> Self {
        Self {
            code: code.to_string(),
            description: description.into(),
            result_list: ResultList {
                result: ResultEntry {
                    message_id: message_id.unwrap_or_default().to_string(),
                    status: status.to_string(),
                    description: result_description.into(),
                },
            },
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }

    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        let id = self.result_list.result.message_id.trim();
        (!id.is_empty()).then_some(id)
    }

    #[must_use]
    pub fn status_code(&self) -> Option<u8> {
        self.result_list.result.status.trim().parse().ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct BulkSendBody {
    #[serde(rename = "aAddress", default)]
    a_address: Option<String>,
    #[serde(rename = "bAddresses", default)]
    b_addresses: Vec<String>,
    #[serde(rename = "Message", default)]
    message: Option<String>,
    #[serde(rename = "DataCodingScheme", default)]
    data_coding: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSendResponse {
    pub results: Vec<BulkResultEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResultEntry {
    #[serde(rename = "bAddress")]
    pub b_address: String,
    /// `success` or `failed`.
    pub status: String,
    /// The per-recipient response envelope.
    pub response: String,
    #[serde(rename = "MessageId")]
    pub message_id: Option<String>,
}

/// Name of the first element in an XML document.
fn root_element(xml: &str) -> Result<String, DecodeError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => return Err(DecodeError::Xml("document has no root element".into())),
            Ok(_) => {}
            Err(e) => return Err(DecodeError::Xml(e.to_string())),
        }
    }
}

fn decode_xml<'de, T: Deserialize<'de>>(xml: &'de str, expected: &'static str) -> Result<T, DecodeError> {
    let found = root_element(xml)?;
    if found != expected {
        return Err(DecodeError::UnexpectedRoot { expected, found });
    }
    Ok(quick_xml::de::from_str(xml)?)
}

fn encode_xml<T: Serialize>(root: &str, value: &T) -> String {
    match quick_xml::se::to_string_with_root(root, value) {
        Ok(body) => format!("{XML_DECLARATION}{body}"),
        Err(e) => {
            // Unreachable for the envelope types defined here
            tracing::error!(error = %e, root, "Failed to serialize envelope");
            format!("{XML_DECLARATION}<{root}/>")
        }
    }
}

/// Decodes a `/sendMessage` body. Required: `bAddress` and a non-blank `Message`.
///
/// # Errors
/// Returns `DecodeError` if the body is not an `AoSmsRequest` or lacks a required element.
pub fn decode_send(bytes: &[u8]) -> Result<SendRequest, DecodeError> {
    let xml = std::str::from_utf8(bytes)?;
    let request: AoSmsRequest = decode_xml(xml, SEND_REQUEST_ROOT)?;
    let sms = request.ao_sms;

    let body = if sms.encoding.as_deref() == Some(BASE64_ENCODING) {
        let raw = STANDARD.decode(sms.message.trim()).map_err(|_| DecodeError::Base64("Message"))?;
        String::from_utf8(raw).map_err(|_| DecodeError::Base64("Message"))?
    } else {
        sms.message
    };
    if body.trim().is_empty() {
        return Err(DecodeError::Empty("Message"));
    }

    Ok(SendRequest {
        a_address: sms.a_address,
        b_address: sms.b_address,
        body,
        data_coding: sms.data_coding.unwrap_or_default(),
    })
}

/// Decodes a `/cancelMessage` body. Missing `MessageId`/`aAddress` are left for the caller to
/// answer with a structured envelope.
///
/// # Errors
/// Returns `DecodeError` if the body is not an `AoSmcancelRequest`.
pub fn decode_cancel(bytes: &[u8]) -> Result<CancelRequest, DecodeError> {
    let xml = std::str::from_utf8(bytes)?;
    let request: AoSmcancelRequest = decode_xml(xml, CANCEL_REQUEST_ROOT)?;
    let blank_to_none = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    Ok(CancelRequest {
        message_id: blank_to_none(request.ao_sm_cancel.message_id),
        a_address: blank_to_none(request.ao_sm_cancel.a_address),
    })
}

/// Decodes a `/bulkSend` JSON body. Presence of the batch-level fields is checked by the
/// fan-out engine, not here.
///
/// # Errors
/// Returns `DecodeError::Json` if the body is not a JSON object of the expected shape.
pub fn decode_bulk(bytes: &[u8]) -> Result<BulkRequest, DecodeError> {
    let body: BulkSendBody = serde_json::from_slice(bytes)?;
    Ok(BulkRequest {
        a_address: body.a_address,
        b_addresses: body.b_addresses,
        body: body.message,
        data_coding: body.data_coding,
    })
}

/// Encodes a send/query response as an `AoSmsResponse` document.
#[must_use]
pub fn encode_send_response(envelope: &ResponseEnvelope) -> String {
    encode_xml(SEND_RESPONSE_ROOT, envelope)
}

/// Encodes a cancel response as an `AoSmcancelResponse` document.
#[must_use]
pub fn encode_cancel_response(envelope: &ResponseEnvelope) -> String {
    encode_xml(CANCEL_RESPONSE_ROOT, envelope)
}

/// Builds the `AoSmsRequest` forwarded to REST backends.
///
/// With `base64_body` the message text is re-encoded and flagged with `<Encoding>base64</Encoding>`;
/// the encoded form is returned alongside so it can be recorded.
#[must_use]
pub fn encode_send_request(sms: &OutboundSms, base64_body: bool) -> (String, Option<String>) {
    let encoded = base64_body.then(|| STANDARD.encode(sms.body.as_bytes()));
    let request = AoSmsRequest {
        ao_sms: AoSms {
            a_address: Some(sms.a_address.clone()),
            b_address: sms.b_address.clone(),
            message: encoded.clone().unwrap_or_else(|| sms.body.clone()),
            data_coding: Some(sms.data_coding),
            encoding: base64_body.then(|| BASE64_ENCODING.to_string()),
        },
    };
    (encode_xml(SEND_REQUEST_ROOT, &request), encoded)
}

#[must_use]
pub fn encode_cancel_request(message_id: &str, a_address: &str) -> String {
    let request = AoSmcancelRequest {
        ao_sm_cancel: AoSmcancel { message_id: Some(message_id.to_string()), a_address: Some(a_address.to_string()) },
    };
    encode_xml(CANCEL_REQUEST_ROOT, &request)
}

/// Parses a send, query or cancel response returned by a REST backend.
///
/// # Errors
/// Returns `DecodeError` if the text is not a response envelope.
pub fn decode_response(xml: &str) -> Result<ResponseEnvelope, DecodeError> {
    let root = root_element(xml)?;
    if root != SEND_RESPONSE_ROOT && root != CANCEL_RESPONSE_ROOT {
        return Err(DecodeError::UnexpectedRoot { expected: SEND_RESPONSE_ROOT, found: root });
    }
    Ok(quick_xml::de::from_str(xml)?)
}
